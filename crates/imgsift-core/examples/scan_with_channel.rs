//! Scan directories and consume progress from a channel on a separate thread,
//! the way a UI or web front-end would.
//!
//! `cargo run --example scan_with_channel -- <dir> [<dir>...]`
use imgsift_core::{CancelToken, ChannelProgress, Config, ImageGrouper, Result, Stage};
use std::path::PathBuf;

fn main() -> Result<()> {
    let roots: Vec<PathBuf> = std::env::args().skip(1).map(PathBuf::from).collect();
    if roots.is_empty() {
        eprintln!("usage: scan_with_channel <dir> [<dir>...]");
        return Ok(());
    }

    let config = Config::default();
    let params = config.match_params();
    let grouper = ImageGrouper::new(config)?;

    let (progress, events) = ChannelProgress::bounded(64);
    let consumer = std::thread::spawn(move || {
        for event in events {
            println!(
                "[{:>8}] {:>3}% {}",
                event.stage.to_string(),
                event.percent,
                event.status
            );
            if event.stage == Stage::Complete {
                break;
            }
        }
    });

    let images = grouper.collect_candidates(&roots, &progress)?;
    let report = grouper.run_all_pairs(&images, &params, &progress, &CancelToken::new())?;
    drop(progress);
    let _ = consumer.join();

    for (i, group) in report.groups.iter().enumerate() {
        println!("Group {} ({:.2}%)", i + 1, group.average_similarity);
        for member in &group.members {
            println!("  {}", member.display());
        }
    }
    Ok(())
}
