//! Staged progress reporting.
//!
//! The engine pushes [`ProgressEvent`]s into a [`ProgressSink`] supplied by the
//! caller. Sinks are called from worker threads and must never block them:
//! [`ChannelProgress`] drops events when its buffer is full rather than wait.

use crossbeam::channel::{self, Receiver, Sender};
use indicatif::{ProgressBar, ProgressStyle};
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};

/// Pipeline stage an event belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Collect,
    Hash,
    Compare,
    Group,
    Complete,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Collect => "collect",
            Stage::Hash => "hash",
            Stage::Compare => "compare",
            Stage::Group => "group",
            Stage::Complete => "complete",
        };
        f.write_str(name)
    }
}

/// One progress update
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub processed: usize,
    pub total: usize,
    /// 0-100
    pub percent: u8,
    pub status: String,
    pub stage: Stage,
}

impl ProgressEvent {
    pub fn new(stage: Stage, processed: usize, total: usize, status: impl Into<String>) -> Self {
        let percent = if total == 0 {
            100
        } else {
            (processed.min(total) * 100 / total) as u8
        };
        Self {
            processed,
            total,
            percent,
            status: status.into(),
            stage,
        }
    }
}

/// Receiver of progress events
pub trait ProgressSink: Send + Sync {
    fn report(&self, event: ProgressEvent);
}

/// Discards every event
#[derive(Debug, Default, Clone, Copy)]
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn report(&self, _event: ProgressEvent) {}
}

/// Forwards events into a bounded channel, dropping them when it is full
#[derive(Debug, Clone)]
pub struct ChannelProgress {
    tx: Sender<ProgressEvent>,
}

impl ChannelProgress {
    /// Create a sink and the receiver the presentation layer drains
    pub fn bounded(capacity: usize) -> (Self, Receiver<ProgressEvent>) {
        let (tx, rx) = channel::bounded(capacity);
        (Self { tx }, rx)
    }
}

impl ProgressSink for ChannelProgress {
    fn report(&self, event: ProgressEvent) {
        // Full or disconnected: the event is simply lost
        let _ = self.tx.try_send(event);
    }
}

/// Writes events to the log
#[derive(Debug, Default, Clone, Copy)]
pub struct LogProgress;

impl ProgressSink for LogProgress {
    fn report(&self, event: ProgressEvent) {
        if matches!(event.stage, Stage::Complete) || event.processed == 0 {
            info!(
                "[{}] {}/{} ({}%) {}",
                event.stage, event.processed, event.total, event.percent, event.status
            );
        } else {
            debug!(
                "[{}] {}/{} ({}%) {}",
                event.stage, event.processed, event.total, event.percent, event.status
            );
        }
    }
}

/// Renders events on a terminal progress bar, restarting the bar per stage
pub struct ProgressBarSink {
    bar: ProgressBar,
    stage: Mutex<Option<Stage>>,
}

impl ProgressBarSink {
    pub fn new() -> Self {
        let bar = ProgressBar::new(0);
        if let Ok(style) = ProgressStyle::default_bar()
            .template("{prefix:>8} {wide_bar} {pos}/{len} ({percent}%) | {msg}")
        {
            bar.set_style(style.progress_chars("█▓▒░ "));
        }
        Self {
            bar,
            stage: Mutex::new(None),
        }
    }
}

impl Default for ProgressBarSink {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressSink for ProgressBarSink {
    fn report(&self, event: ProgressEvent) {
        let mut stage = self.stage.lock().unwrap_or_else(PoisonError::into_inner);
        if *stage != Some(event.stage) {
            *stage = Some(event.stage);
            self.bar.reset();
            self.bar.set_prefix(event.stage.to_string());
        }
        self.bar.set_length(event.total as u64);
        self.bar.set_position(event.processed as u64);

        if event.stage == Stage::Complete {
            self.bar.finish_with_message(event.status);
        } else {
            self.bar.set_message(event.status);
        }
    }
}

/// Counts completed units of one stage and forwards a throttled event stream.
///
/// An event is emitted at the start, whenever the count crosses a multiple of
/// `batch`, and when the count reaches `total`.
pub(crate) struct StageProgress<'a> {
    sink: &'a dyn ProgressSink,
    stage: Stage,
    total: usize,
    batch: usize,
    processed: AtomicUsize,
}

impl<'a> StageProgress<'a> {
    pub fn new(sink: &'a dyn ProgressSink, stage: Stage, total: usize, batch: usize) -> Self {
        Self {
            sink,
            stage,
            total,
            batch: batch.max(1),
            processed: AtomicUsize::new(0),
        }
    }

    pub fn start(&self, status: impl Into<String>) {
        self.sink
            .report(ProgressEvent::new(self.stage, 0, self.total, status));
    }

    /// Record `units` more completed units; `status` is only built when an event is sent
    pub fn advance<F: FnOnce() -> String>(&self, units: usize, status: F) {
        if units == 0 {
            return;
        }
        let before = self.processed.fetch_add(units, Ordering::Relaxed);
        let after = before + units;

        let crossed_batch = before / self.batch != after / self.batch;
        let reached_end = before < self.total && after >= self.total;
        if crossed_batch || reached_end {
            self.sink
                .report(ProgressEvent::new(self.stage, after, self.total, status()));
        }
    }

    pub fn processed(&self) -> usize {
        self.processed.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Recorder(Mutex<Vec<ProgressEvent>>);

    impl ProgressSink for Recorder {
        fn report(&self, event: ProgressEvent) {
            self.0.lock().unwrap().push(event);
        }
    }

    #[test]
    fn test_percent_computation() {
        assert_eq!(ProgressEvent::new(Stage::Hash, 5, 10, "").percent, 50);
        assert_eq!(ProgressEvent::new(Stage::Hash, 0, 0, "").percent, 100);
        assert_eq!(ProgressEvent::new(Stage::Hash, 12, 10, "").percent, 100);
        assert_eq!(ProgressEvent::new(Stage::Hash, 1, 3, "").percent, 33);
    }

    #[test]
    fn test_stage_progress_throttles() {
        let recorder = Recorder::default();
        let progress = StageProgress::new(&recorder, Stage::Hash, 12, 5);

        progress.start("begin");
        for _ in 0..12 {
            progress.advance(1, || "step".to_string());
        }

        let events = recorder.0.lock().unwrap();
        let counts: Vec<usize> = events.iter().map(|e| e.processed).collect();
        assert_eq!(counts, vec![0, 5, 10, 12]);
        assert_eq!(events.last().unwrap().percent, 100);
        assert_eq!(progress.processed(), 12);
    }

    #[test]
    fn test_stage_progress_large_steps() {
        let recorder = Recorder::default();
        let progress = StageProgress::new(&recorder, Stage::Compare, 200, 50);

        progress.advance(30, String::new);
        progress.advance(30, String::new);
        progress.advance(140, String::new);

        let counts: Vec<usize> = recorder.0.lock().unwrap().iter().map(|e| e.processed).collect();
        assert_eq!(counts, vec![60, 200]);
    }

    #[test]
    fn test_channel_progress_never_blocks() {
        let (sink, rx) = ChannelProgress::bounded(2);
        for i in 0..10 {
            sink.report(ProgressEvent::new(Stage::Hash, i, 10, "x"));
        }
        let received: Vec<_> = rx.try_iter().collect();
        assert_eq!(received.len(), 2);
        assert_eq!(received[0].processed, 0);
    }

    #[test]
    fn test_channel_progress_survives_dropped_receiver() {
        let (sink, rx) = ChannelProgress::bounded(1);
        drop(rx);
        sink.report(ProgressEvent::new(Stage::Complete, 1, 1, "done"));
    }

    #[test]
    fn test_log_progress_accepts_every_stage() {
        let sink = LogProgress;
        for stage in [Stage::Collect, Stage::Hash, Stage::Compare, Stage::Group, Stage::Complete] {
            sink.report(ProgressEvent::new(stage, 0, 2, "start"));
            sink.report(ProgressEvent::new(stage, 2, 2, "done"));
        }
    }

    #[test]
    fn test_stage_serializes_lowercase() {
        let json = serde_json::to_string(&ProgressEvent::new(Stage::Compare, 1, 2, "s")).unwrap();
        assert!(json.contains(r#""stage":"compare""#));
    }

    #[test]
    fn test_progress_bar_accepts_events() {
        let sink = ProgressBarSink::new();
        sink.report(ProgressEvent::new(Stage::Hash, 1, 4, "hashing"));
        sink.report(ProgressEvent::new(Stage::Compare, 3, 6, "comparing"));
        sink.report(ProgressEvent::new(Stage::Complete, 6, 6, "done"));
    }
}
