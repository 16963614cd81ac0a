//! Parallel fingerprinting of a set of images.
//!
//! Images are split into chunks of `batch_size` and the chunks are spread over
//! whichever rayon pool the caller installed. Each chunk checks the cancel
//! token before it starts, so a cancelled run stops dispatching new images
//! within one chunk per worker.
//!
//! Failures are isolated per image: a file that cannot be read or decoded is
//! recorded as a [`HashFailure`] and left out of the result, never aborting
//! the batch.

use log::{debug, info};
use rayon::prelude::*;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Instant;

use super::cache::{CacheKey, FingerprintCache};
use super::crypto_hash::compute_cryptographic;
use super::perceptual::{fingerprint_from_file, hashes_from_file};
use super::progress::StageProgress;
use super::types::ImageFingerprint;
use crate::cancel::CancelToken;
use crate::error::{Error, Result};
use crate::logging::log_hash_error;
use crate::types::HashFailure;

/// Result of fingerprinting a set of images
#[derive(Debug, Default)]
pub struct HashOutcome {
    /// Successfully fingerprinted images, in input order
    pub fingerprints: Vec<ImageFingerprint>,

    /// Images left out of comparison
    pub failures: Vec<HashFailure>,

    /// How many fingerprints came from the cache
    pub cache_hits: usize,

    /// Whether some images were left unhashed because of cancellation
    pub cancelled: bool,
}

/// Fingerprint one image, consulting the cache when one is given.
///
/// Returns the fingerprint and whether it was a cache hit. A file removed
/// since discovery is reported as [`Error::FileNotFound`].
pub fn fingerprint_image(
    path: &Path,
    hash_size: u32,
    cache: Option<&FingerprintCache>,
) -> Result<(ImageFingerprint, bool)> {
    if !path.exists() {
        return Err(Error::FileNotFound(path.to_path_buf()));
    }

    let Some(cache) = cache else {
        return Ok((fingerprint_from_file(path, hash_size)?, false));
    };

    let digest = compute_cryptographic(path).map_err(|e| Error::decode(path, e))?;
    let key = CacheKey::new(digest, hash_size);

    if let Some(hashes) = cache.get(&key) {
        debug!("Cache hit for '{}'", path.display());
        return Ok((ImageFingerprint::new(path, (*hashes).clone()), true));
    }

    let hashes = hashes_from_file(path, hash_size)?;
    let hashes = cache.insert(key, hashes);
    Ok((ImageFingerprint::new(path, (*hashes).clone()), false))
}

/// Fingerprint every image in `paths` on the current rayon pool
pub(crate) fn fingerprint_images(
    paths: &[PathBuf],
    hash_size: u32,
    cache: Option<&FingerprintCache>,
    batch_size: usize,
    progress: &StageProgress<'_>,
    cancel: &CancelToken,
) -> HashOutcome {
    let start = Instant::now();
    let cache_hits = AtomicUsize::new(0);
    let skipped_batch = AtomicBool::new(false);

    info!(
        "Fingerprinting {} images in batches of {}",
        paths.len(),
        batch_size
    );

    let batches: Vec<Vec<std::result::Result<ImageFingerprint, HashFailure>>> = paths
        .par_chunks(batch_size.max(1))
        .map(|batch| {
            if cancel.is_cancelled() {
                skipped_batch.store(true, Ordering::Relaxed);
                return Vec::new();
            }
            batch
                .iter()
                .map(|path| {
                    let result = fingerprint_image(path, hash_size, cache);
                    progress.advance(1, || format!("Hashing {}", display_name(path)));

                    match result {
                        Ok((fingerprint, hit)) => {
                            if hit {
                                cache_hits.fetch_add(1, Ordering::Relaxed);
                            }
                            Ok(fingerprint)
                        }
                        Err(e) => {
                            log_hash_error(path, &e);
                            Err(HashFailure {
                                path: path.clone(),
                                cause: e.to_string(),
                            })
                        }
                    }
                })
                .collect()
        })
        .collect();

    let mut outcome = HashOutcome {
        cache_hits: cache_hits.load(Ordering::Relaxed),
        cancelled: skipped_batch.into_inner(),
        ..HashOutcome::default()
    };
    for result in batches.into_iter().flatten() {
        match result {
            Ok(fingerprint) => outcome.fingerprints.push(fingerprint),
            Err(failure) => outcome.failures.push(failure),
        }
    }

    info!(
        "Fingerprinting finished: {} ok, {} failed, {} from cache in {:.2?}{}",
        outcome.fingerprints.len(),
        outcome.failures.len(),
        outcome.cache_hits,
        start.elapsed(),
        if outcome.cancelled { " (cancelled)" } else { "" }
    );

    outcome
}

/// File name for status messages
pub(crate) fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}
