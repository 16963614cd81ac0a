use log::{debug, info};
use rayon::prelude::*;
use std::collections::HashSet;
use std::path::{Component, Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use walkdir::WalkDir;

use crate::config::Config;
use crate::error::Result;
use crate::logging::log_skipped_path;
use crate::processing::progress::{ProgressSink, Stage, StageProgress};
use crate::types::ImageFormat;

/// Collect every eligible image under `roots`.
///
/// Paths come back absolute and normalized, each at most once, in the order
/// they were first found; entries within a directory are visited by name.
/// Missing roots and unreadable directories are logged and skipped.
///
/// Reports a [`Stage::Collect`] event when the walk starts and one per
/// finished root.
pub fn collect_candidates<P: AsRef<Path>>(
    roots: &[P],
    config: &Config,
    progress: &dyn ProgressSink,
) -> Result<Vec<PathBuf>> {
    let roots: Vec<PathBuf> = roots
        .iter()
        .map(|root| normalize_path(root.as_ref()))
        .collect::<Result<_>>()?;

    let collecting = StageProgress::new(progress, Stage::Collect, roots.len(), 1);
    collecting.start(format!("Scanning {} directories", roots.len()));
    let found = AtomicUsize::new(0);

    // Walk roots in parallel; collect keeps root order
    let per_root: Vec<Vec<PathBuf>> = roots
        .par_iter()
        .map(|root| {
            let images = collect_in_directory(root, config);
            let total_found = found.fetch_add(images.len(), Ordering::Relaxed) + images.len();
            collecting.advance(1, || {
                format!("Found {} images so far ({})", total_found, root.display())
            });
            images
        })
        .collect();

    let mut seen = HashSet::new();
    let candidates: Vec<PathBuf> = per_root
        .into_iter()
        .flatten()
        .filter(|path| seen.insert(path.clone()))
        .collect();

    info!(
        "Found {} candidate images under {} roots",
        candidates.len(),
        roots.len()
    );
    Ok(candidates)
}

/// Walk one normalized root
fn collect_in_directory(root: &Path, config: &Config) -> Vec<PathBuf> {
    if !root.exists() {
        log_skipped_path(root, &"root does not exist");
        return Vec::new();
    }

    let max_depth = config.max_depth.unwrap_or(usize::MAX);
    let mut found = Vec::new();

    for entry in WalkDir::new(root)
        .max_depth(max_depth)
        .follow_links(config.follow_links)
        .sort_by_file_name()
    {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                let path = e.path().unwrap_or(root).to_path_buf();
                log_skipped_path(&path, &e);
                continue;
            }
        };

        if entry.file_type().is_file() && has_image_extension(entry.path()) {
            // Children of a normalized root are already normalized
            found.push(entry.into_path());
        }
    }

    debug!("{} images under {}", found.len(), root.display());
    found
}

/// Returns whether the path has an accepted image extension
pub fn has_image_extension(path: &Path) -> bool {
    ImageFormat::from_path(path).is_some()
}

/// Make `path` absolute and resolve `.` and `..` without touching the file
/// system, so symlinked paths keep the name the user gave them
pub fn normalize_path(path: &Path) -> Result<PathBuf> {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()?.join(path)
    };

    let mut normalized = PathBuf::new();
    for component in absolute.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                normalized.pop();
            }
            other => normalized.push(other.as_os_str()),
        }
    }
    Ok(normalized)
}
