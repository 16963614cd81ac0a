//! Similarity scoring between two fingerprints.
//!
//! Each hash kind yields a percentage `(1 - hamming / bits) * 100`, and the
//! three percentages are blended into one confidence figure with fixed
//! weights. The perceptual hash carries the most weight because it survives
//! rescaling and recompression best.

use crate::processing::types::{HashBits, ImageFingerprint};

pub const PHASH_WEIGHT: f64 = 0.5;
pub const AHASH_WEIGHT: f64 = 0.3;
pub const DHASH_WEIGHT: f64 = 0.2;

/// Percentage of matching bits between two equal-length hashes.
///
/// # Panics
///
/// Panics if the hashes have different lengths; fingerprints compared in one
/// run always share a hash size.
pub fn hash_similarity(a: &HashBits, b: &HashBits) -> f64 {
    let len = a.len();
    let distance = a.distance(b);
    if len == 0 {
        return 100.0;
    }
    (1.0 - distance as f64 / len as f64) * 100.0
}

/// Per-kind similarity scores; an absent kind contributes nothing
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct HashSimilarities {
    pub phash: Option<f64>,
    pub ahash: Option<f64>,
    pub dhash: Option<f64>,
}

impl HashSimilarities {
    pub fn between(a: &ImageFingerprint, b: &ImageFingerprint) -> Self {
        Self {
            phash: Some(hash_similarity(&a.phash, &b.phash)),
            ahash: Some(hash_similarity(&a.ahash, &b.ahash)),
            dhash: Some(hash_similarity(&a.dhash, &b.dhash)),
        }
    }

    /// Weighted blend in [0, 100]
    pub fn combined(&self) -> f64 {
        PHASH_WEIGHT * self.phash.unwrap_or(0.0)
            + AHASH_WEIGHT * self.ahash.unwrap_or(0.0)
            + DHASH_WEIGHT * self.dhash.unwrap_or(0.0)
    }
}

/// Combined similarity of two fingerprints
pub fn combined_similarity(a: &ImageFingerprint, b: &ImageFingerprint) -> f64 {
    HashSimilarities::between(a, b).combined()
}

/// Round a percentage to two decimals for display
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processing::types::ImageHashes;
    use proptest::prelude::*;

    fn fingerprint(name: &str, p: u64, a: u64, d: u64) -> ImageFingerprint {
        ImageFingerprint::new(
            format!("/img/{}", name),
            ImageHashes {
                phash: HashBits::from_u64(p, 64),
                ahash: HashBits::from_u64(a, 64),
                dhash: HashBits::from_u64(d, 64),
            },
        )
    }

    #[test]
    fn test_hash_similarity_values() {
        let zero = HashBits::from_u64(0, 64);
        assert_eq!(hash_similarity(&zero, &zero), 100.0);
        assert_eq!(hash_similarity(&zero, &HashBits::from_u64(u64::MAX, 64)), 0.0);
        assert_eq!(hash_similarity(&zero, &HashBits::from_u64(0xF, 64)), 93.75);
    }

    #[test]
    #[should_panic(expected = "different lengths")]
    fn test_mismatched_lengths_panic() {
        hash_similarity(&HashBits::zeros(64), &HashBits::zeros(16));
    }

    #[test]
    fn test_weights_applied() {
        let scores = HashSimilarities {
            phash: Some(80.0),
            ahash: Some(50.0),
            dhash: Some(100.0),
        };
        assert!((scores.combined() - 75.0).abs() < 1e-9);
    }

    #[test]
    fn test_missing_kind_contributes_zero() {
        let scores = HashSimilarities {
            phash: Some(100.0),
            ahash: None,
            dhash: Some(100.0),
        };
        assert!((scores.combined() - 70.0).abs() < 1e-9);
        assert_eq!(HashSimilarities::default().combined(), 0.0);
    }

    #[test]
    fn test_identical_fingerprints_score_100() {
        let a = fingerprint("a.png", 0x1234, 0xFF00, 0x0F0F);
        assert!((combined_similarity(&a, &a) - 100.0).abs() < 1e-9);
    }

    #[test]
    fn test_round2() {
        assert_eq!(round2(91.666_666), 91.67);
        assert_eq!(round2(100.0), 100.0);
    }

    proptest! {
        #[test]
        fn prop_reflexive(p: u64, a: u64, d: u64) {
            let fp = fingerprint("x.png", p, a, d);
            prop_assert!((combined_similarity(&fp, &fp) - 100.0).abs() < 1e-9);
        }

        #[test]
        fn prop_symmetric_and_bounded(p1: u64, a1: u64, d1: u64, p2: u64, a2: u64, d2: u64) {
            let x = fingerprint("x.png", p1, a1, d1);
            let y = fingerprint("y.png", p2, a2, d2);
            let xy = combined_similarity(&x, &y);
            prop_assert_eq!(xy, combined_similarity(&y, &x));
            prop_assert!((0.0..=100.0 + 1e-9).contains(&xy));
        }
    }
}
