//! # Perceptual Hashing Module
//!
//! Computes the three fingerprints used to compare images:
//!
//! 1. Perceptual hash (pHash): DCT of a `4·n` square luminance thumbnail, low
//!    frequencies thresholded at their median. Robust to scaling and
//!    recompression.
//! 2. Average hash (aHash): `n × n` thumbnail thresholded at its mean. Tracks
//!    overall tone.
//! 3. Difference hash (dHash): `(n+1) × n` thumbnail, one bit per horizontal
//!    gradient sign. Tracks edge structure.
//!
//! Every hash has `n²` bits where `n` is the configured `hash_size`.
//!
//! ## Hamming Distance Interpretation
//!
//! For the default 64-bit hashes:
//!
//! - 0-3: Nearly identical images (same image with minor modifications)
//! - 4-10: Similar images (same subject with moderate differences)
//! - >10-15: Different images
//!
//! ## References
//!
//! - "Implementation and analysis of DCT based global perceptual image hashing" by Bian Yang, et al.
//! - "Perceptual Hashing: Robust Image Identification" by Nasir Memon and Savvas A. Chatzichristofis

use image::imageops::{self, FilterType};
use image::{DynamicImage, GrayImage};
use rustdct::DctPlanner;
use std::path::Path;

use super::types::{HashBits, ImageFingerprint, ImageHashes};
use crate::error::{Error, Result};

/// The pHash thumbnail is this many times larger than the hash grid
pub const PHASH_OVERSAMPLE: u32 = 4;

/// Downscale a luminance image to exactly `width × height`
fn shrink(gray: &GrayImage, width: u32, height: u32) -> GrayImage {
    imageops::resize(gray, width, height, FilterType::Lanczos3)
}

/// Average hash: bit = 1 iff pixel ≥ mean of the `hash_size²` thumbnail
pub fn average_hash(gray: &GrayImage, hash_size: u32) -> HashBits {
    let small = shrink(gray, hash_size, hash_size);
    let pixels = small.as_raw();

    let sum: u64 = pixels.iter().map(|&p| p as u64).sum();
    let mean = sum as f64 / pixels.len() as f64;

    HashBits::from_bits(pixels.iter().map(|&p| p as f64 >= mean))
}

/// Difference hash: bit = 1 iff a pixel is darker than its right neighbour
pub fn difference_hash(gray: &GrayImage, hash_size: u32) -> HashBits {
    let small = shrink(gray, hash_size + 1, hash_size);

    let mut bits = Vec::with_capacity((hash_size * hash_size) as usize);
    for y in 0..hash_size {
        for x in 0..hash_size {
            let left = small.get_pixel(x, y)[0];
            let right = small.get_pixel(x + 1, y)[0];
            bits.push(left < right);
        }
    }

    HashBits::from_bits(bits)
}

/// Perceptual hash: bit = 1 iff a low-frequency DCT coefficient ≥ their median.
///
/// The median ignores the DC term, which only carries mean brightness and
/// would otherwise skew the split.
pub fn perceptual_hash(gray: &GrayImage, hash_size: u32) -> HashBits {
    let side = (hash_size * PHASH_OVERSAMPLE) as usize;
    let small = shrink(gray, side as u32, side as u32);

    let mut matrix: Vec<f64> = small.as_raw().iter().map(|&p| p as f64).collect();
    dct_2d(&mut matrix, side);

    // After dct_2d the matrix is transposed: coefficient (row v, col u) is at u * side + v
    let n = hash_size as usize;
    let mut low = Vec::with_capacity(n * n);
    for v in 0..n {
        for u in 0..n {
            low.push(matrix[u * side + v]);
        }
    }

    let median = median(&low[1..]);
    HashBits::from_bits(low.iter().map(|&c| c >= median))
}

/// In-place separable 2-D DCT-II of a `side × side` row-major matrix.
///
/// Leaves the result transposed, which callers index accordingly.
fn dct_2d(matrix: &mut [f64], side: usize) {
    let mut planner = DctPlanner::new();
    let dct = planner.plan_dct2(side);

    for row in matrix.chunks_exact_mut(side) {
        dct.process_dct2(row);
    }
    transpose(matrix, side);
    for row in matrix.chunks_exact_mut(side) {
        dct.process_dct2(row);
    }
}

fn transpose(matrix: &mut [f64], side: usize) {
    for y in 0..side {
        for x in (y + 1)..side {
            matrix.swap(y * side + x, x * side + y);
        }
    }
}

fn median(values: &[f64]) -> f64 {
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    }
}

/// Compute all three hashes of an image in memory
pub fn hashes_from_img(img: &DynamicImage, hash_size: u32) -> ImageHashes {
    let gray = img.to_luma8();
    ImageHashes {
        phash: perceptual_hash(&gray, hash_size),
        ahash: average_hash(&gray, hash_size),
        dhash: difference_hash(&gray, hash_size),
    }
}

/// Fingerprint an image already in memory
pub fn fingerprint_from_img<P: AsRef<Path>>(
    path: P,
    img: &DynamicImage,
    hash_size: u32,
) -> ImageFingerprint {
    ImageFingerprint::new(path.as_ref(), hashes_from_img(img, hash_size))
}

/// Decode an image file and compute its three hashes.
///
/// Any decode failure is reported as [`Error::Decode`] so callers can drop the
/// image from comparison without aborting the run.
pub fn hashes_from_file<P: AsRef<Path>>(path: P, hash_size: u32) -> Result<ImageHashes> {
    let path = path.as_ref();
    let img = image::open(path).map_err(|e| Error::decode(path, e))?;
    Ok(hashes_from_img(&img, hash_size))
}

/// Decode an image file and fingerprint it
pub fn fingerprint_from_file<P: AsRef<Path>>(path: P, hash_size: u32) -> Result<ImageFingerprint> {
    let path = path.as_ref();
    Ok(ImageFingerprint::new(path, hashes_from_file(path, hash_size)?))
}
