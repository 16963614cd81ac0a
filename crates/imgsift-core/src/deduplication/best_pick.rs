//! Choosing which image of a group to keep.
//!
//! Each member is scored `0.3 * file size + 0.7 * pixel count` from the
//! current file system state; the highest score wins and the first member
//! wins a tie.

use log::{debug, warn};
use std::path::{Path, PathBuf};

const SIZE_WEIGHT: f64 = 0.3;
const RESOLUTION_WEIGHT: f64 = 0.7;

/// Keeper score of one image, or `None` if the file is gone.
///
/// An existing file whose dimensions cannot be read scores 0.
pub fn score_image(path: &Path) -> Option<f64> {
    let file_size = match std::fs::metadata(path) {
        Ok(meta) if meta.is_file() => meta.len(),
        Ok(_) => return None,
        Err(e) => {
            debug!("Not scoring {}: {}", path.display(), e);
            return None;
        }
    };

    match image::image_dimensions(path) {
        Ok((width, height)) => {
            let pixels = width as f64 * height as f64;
            Some(SIZE_WEIGHT * file_size as f64 + RESOLUTION_WEIGHT * pixels)
        }
        Err(e) => {
            warn!("Cannot read dimensions of {}: {}", path.display(), e);
            Some(0.0)
        }
    }
}

/// The member to keep, or `None` when no member exists on disk
pub fn best_of<P: AsRef<Path>>(members: &[P]) -> Option<PathBuf> {
    let mut best: Option<(&Path, f64)> = None;
    for member in members {
        let path = member.as_ref();
        let Some(score) = score_image(path) else {
            continue;
        };
        if best.map_or(true, |(_, top)| score > top) {
            best = Some((path, score));
        }
    }
    best.map(|(path, _)| path.to_path_buf())
}

/// Every member except the one [`best_of`] keeps
pub fn discard_candidates<P: AsRef<Path>>(members: &[P]) -> Vec<PathBuf> {
    let Some(keep) = best_of(members) else {
        return Vec::new();
    };
    members
        .iter()
        .map(|member| member.as_ref())
        .filter(|path| *path != keep.as_path())
        .map(Path::to_path_buf)
        .collect()
}
