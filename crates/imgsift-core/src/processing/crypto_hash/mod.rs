//! Blake3 digest of a file's bytes.
//!
//! The digest identifies image *content* regardless of path, which is what
//! the fingerprint cache is keyed on: a renamed or copied file hits the same
//! cache entry, and an edited file misses it.
use crate::error::Result;
use blake3::Hash as Blake3Hash;

use std::{fs::File, io::Read, path::Path};

/// Compute the cryptographic hash of a file using the Blake3 algorithm
pub fn compute_cryptographic<P: AsRef<Path>>(path: P) -> Result<Blake3Hash> {
    let mut file = File::open(&path)?;
    let mut hasher = blake3::Hasher::new();

    let mut buffer = [0; 8192]; // 8KB buffer
    loop {
        let bytes_read = file.read(&mut buffer)?;
        if bytes_read == 0 {
            break;
        }
        hasher.update(&buffer[..bytes_read]);
    }

    Ok(hasher.finalize())
}
