//! Core functionality for finding near-duplicate images.
//!
//! This library provides the components of the grouping engine:
//! - Candidate discovery under one or more directory trees
//! - Perceptual fingerprinting (pHash, aHash, dHash) with a content-keyed cache
//! - Pre-filtered all-pairs and reference-mode matching
//! - Connected-component grouping and keeper selection

// -- External Dependencies --

use log::info;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

// -- Internal Modules --
mod error;

// -- Public Re-exports --
pub use cancel::CancelToken;
pub use config::*;
pub use deduplication::{
    best_of, discard_candidates, DedupReport, ReferenceReport, SimilarityGroup,
};
pub use error::{Error, Result};
pub use matching::{ReferenceMatch, SimilarityEdge};
pub use processing::{
    ChannelProgress, FingerprintCache, ImageFingerprint, LogProgress, NoProgress,
    ProgressBarSink, ProgressEvent, ProgressSink, Stage,
};
pub use types::*;

// -- Public Modules --
pub mod cancel;
pub mod config;
pub mod deduplication;
pub mod discovery;
pub mod logging;
pub mod matching;
pub mod processing;
pub mod similarity;
pub mod types;

use processing::batch_processor::{display_name, fingerprint_images};
use processing::progress::StageProgress;
use processing::CacheSweeper;

/// Main entry point for grouping near-duplicate images.
///
/// Owns a bounded worker pool and a fingerprint cache that live as long as the
/// grouper, so repeated runs reuse both.
pub struct ImageGrouper {
    config: Config,
    pool: rayon::ThreadPool,
    cache: Option<Arc<FingerprintCache>>,
    _sweeper: Option<CacheSweeper>,
}

impl ImageGrouper {
    /// Create a grouper with its own cache (when `use_cache` is set).
    ///
    /// Fails fast on an invalid configuration, before any thread is started.
    pub fn new(config: Config) -> Result<Self> {
        config.validate()?;
        let pool = build_pool(&config)?;

        let (cache, sweeper) = if config.use_cache {
            let cache = Arc::new(FingerprintCache::new(Duration::from_secs(
                config.cache_ttl_secs,
            )));
            let sweeper =
                cache.spawn_sweeper(Duration::from_secs(config.cache_sweep_interval_secs))?;
            (Some(cache), Some(sweeper))
        } else {
            (None, None)
        };

        Ok(Self {
            config,
            pool,
            cache,
            _sweeper: sweeper,
        })
    }

    /// Create a grouper that shares an existing cache.
    ///
    /// The caller owns the cache's sweeper, if it wants one.
    pub fn with_cache(config: Config, cache: Arc<FingerprintCache>) -> Result<Self> {
        config.validate()?;
        let pool = build_pool(&config)?;
        Ok(Self {
            config,
            pool,
            cache: Some(cache),
            _sweeper: None,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn cache(&self) -> Option<&Arc<FingerprintCache>> {
        self.cache.as_ref()
    }

    /// Number of worker threads in the pool
    pub fn workers(&self) -> usize {
        self.pool.current_num_threads()
    }

    /// Discover all eligible images in the provided directories, reporting
    /// [`Stage::Collect`] progress per root
    pub fn collect_candidates<P: AsRef<Path> + Sync>(
        &self,
        roots: &[P],
        progress: &dyn ProgressSink,
    ) -> Result<Vec<PathBuf>> {
        self.pool
            .install(|| discovery::collect_candidates(roots, &self.config, progress))
    }

    /// Fingerprint `images`, compare every pair and group the similar ones.
    ///
    /// Unreadable images are reported in `failures` and left out. A cancelled
    /// run returns the groups found so far with `cancelled` set.
    pub fn run_all_pairs<P: AsRef<Path>>(
        &self,
        images: &[P],
        params: &MatchParams,
        progress: &dyn ProgressSink,
        cancel: &CancelToken,
    ) -> Result<DedupReport> {
        params.validate()?;
        let start = Instant::now();
        let images = unique_paths(images)?;

        if images.is_empty() {
            progress.report(ProgressEvent::new(Stage::Complete, 0, 0, "No images to compare"));
            return Ok(DedupReport::default());
        }

        let hashing = StageProgress::new(
            progress,
            Stage::Hash,
            images.len(),
            self.config.hash_progress_batch,
        );
        hashing.start(format!("Hashing {} images", images.len()));
        let hashed = self.pool.install(|| {
            fingerprint_images(
                &images,
                params.hash_size,
                self.cache.as_deref(),
                self.config.hash_progress_batch,
                &hashing,
                cancel,
            )
        });

        let mut report = DedupReport {
            images_hashed: hashed.fingerprints.len(),
            failures: hashed.failures,
            cancelled: hashed.cancelled,
            ..DedupReport::default()
        };
        if report.cancelled {
            return Ok(finish(progress, report, start));
        }

        let fingerprints = hashed.fingerprints;
        let n = fingerprints.len();
        let comparing = StageProgress::new(
            progress,
            Stage::Compare,
            n * n.saturating_sub(1) / 2,
            self.config.compare_progress_batch,
        );
        comparing.start(format!("Comparing {} images", n));
        let matched = self
            .pool
            .install(|| matching::find_similar_pairs(&fingerprints, params, &comparing, cancel));

        report.comparisons = matched.comparisons;
        report.comparisons_skipped = matched.skipped;
        report.cancelled = matched.cancelled;

        progress.report(ProgressEvent::new(
            Stage::Group,
            0,
            matched.edges.len(),
            format!("Grouping {} similar pairs", matched.edges.len()),
        ));
        report.groups = deduplication::build_groups(&matched.edges, &fingerprints);

        Ok(finish(progress, report, start))
    }

    /// Compare one reference image against `images`, strongest match first.
    ///
    /// If the reference itself cannot be fingerprinted the report has no
    /// matches and lists the reference under `failures`.
    pub fn run_reference_match<R: AsRef<Path>, P: AsRef<Path>>(
        &self,
        reference: R,
        images: &[P],
        params: &MatchParams,
        progress: &dyn ProgressSink,
        cancel: &CancelToken,
    ) -> Result<ReferenceReport> {
        params.validate()?;
        let reference = discovery::normalize_path(reference.as_ref())?;
        let mut report = ReferenceReport {
            reference: reference.clone(),
            ..ReferenceReport::default()
        };

        let reference_fp = match processing::fingerprint_image(
            &reference,
            params.hash_size,
            self.cache.as_deref(),
        ) {
            Ok((fingerprint, _)) => fingerprint,
            Err(e) => {
                logging::log_hash_error(&reference, &e);
                report.failures.push(HashFailure {
                    path: reference,
                    cause: e.to_string(),
                });
                progress.report(ProgressEvent::new(
                    Stage::Complete,
                    0,
                    0,
                    "Reference image could not be read",
                ));
                return Ok(report);
            }
        };

        let images: Vec<PathBuf> = unique_paths(images)?
            .into_iter()
            .filter(|path| *path != reference)
            .collect();

        let hashing = StageProgress::new(
            progress,
            Stage::Hash,
            images.len(),
            self.config.hash_progress_batch,
        );
        hashing.start(format!("Hashing {} images", images.len()));
        let hashed = self.pool.install(|| {
            fingerprint_images(
                &images,
                params.hash_size,
                self.cache.as_deref(),
                self.config.hash_progress_batch,
                &hashing,
                cancel,
            )
        });
        report.failures.extend(hashed.failures);
        report.cancelled = hashed.cancelled;

        if !hashed.cancelled {
            let comparing = StageProgress::new(
                progress,
                Stage::Compare,
                hashed.fingerprints.len(),
                self.config.compare_progress_batch,
            );
            comparing.start(format!("Comparing against {}", display_name(&reference)));
            let (matches, cancelled) = self.pool.install(|| {
                matching::rank_against_reference(
                    &reference_fp,
                    &hashed.fingerprints,
                    params,
                    &comparing,
                    cancel,
                )
            });
            report.matches = matches;
            report.cancelled = cancelled;
        }

        progress.report(ProgressEvent::new(
            Stage::Complete,
            report.matches.len(),
            report.matches.len(),
            format!("Found {} similar images", report.matches.len()),
        ));
        info!(
            "Reference match for {} found {} images{}",
            report.reference.display(),
            report.matches.len(),
            if report.cancelled { " (cancelled)" } else { "" }
        );
        Ok(report)
    }
}

fn build_pool(config: &Config) -> Result<rayon::ThreadPool> {
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(config.worker_count())
        .thread_name(|i| format!("imgsift-worker-{}", i))
        .build()?;
    Ok(pool)
}

/// Normalize and de-duplicate, keeping first occurrences
fn unique_paths<P: AsRef<Path>>(paths: &[P]) -> Result<Vec<PathBuf>> {
    let mut seen = HashSet::new();
    let mut unique = Vec::with_capacity(paths.len());
    for path in paths {
        let path = discovery::normalize_path(path.as_ref())?;
        if seen.insert(path.clone()) {
            unique.push(path);
        }
    }
    Ok(unique)
}

fn finish(progress: &dyn ProgressSink, report: DedupReport, start: Instant) -> DedupReport {
    let status = if report.cancelled {
        format!("Cancelled with {} groups", report.groups.len())
    } else {
        format!("Found {} groups", report.groups.len())
    };
    progress.report(ProgressEvent::new(
        Stage::Complete,
        report.groups.len(),
        report.groups.len(),
        status,
    ));
    info!(
        "Run finished in {:.2?}: {} images hashed, {} failed, {} groups{}",
        start.elapsed(),
        report.images_hashed,
        report.failures.len(),
        report.groups.len(),
        if report.cancelled { " (cancelled)" } else { "" }
    );
    report
}
