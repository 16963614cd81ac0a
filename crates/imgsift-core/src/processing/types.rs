/// HashBits and ImageFingerprint, the fixed-shape fingerprint record
///
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

const WORD_BITS: usize = 64;

/// A fixed-length bitstring packed into 64-bit words.
///
/// Bit `i` lives in word `i / 64` at position `i % 64`. Unused high bits of
/// the last word are always zero, so word-wise XOR + popcount gives the
/// Hamming distance directly.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HashBits {
    words: Vec<u64>,
    len: usize,
}

impl HashBits {
    /// All-zero bitstring of `len` bits
    pub fn zeros(len: usize) -> Self {
        Self {
            words: vec![0; len.div_ceil(WORD_BITS)],
            len,
        }
    }

    /// Build from a sequence of bits, first item is bit 0
    pub fn from_bits<I: IntoIterator<Item = bool>>(bits: I) -> Self {
        let mut words = Vec::new();
        let mut len = 0;
        for bit in bits {
            if len % WORD_BITS == 0 {
                words.push(0);
            }
            if bit {
                words[len / WORD_BITS] |= 1u64 << (len % WORD_BITS);
            }
            len += 1;
        }
        Self { words, len }
    }

    /// Build a bitstring of up to 64 bits from the low bits of `value`
    pub fn from_u64(value: u64, len: usize) -> Self {
        assert!(len <= WORD_BITS, "from_u64 supports at most 64 bits");
        let mask = if len == WORD_BITS {
            u64::MAX
        } else {
            (1u64 << len) - 1
        };
        Self {
            words: if len == 0 { Vec::new() } else { vec![value & mask] },
            len,
        }
    }

    /// Number of bits
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Read bit `index`
    pub fn get(&self, index: usize) -> bool {
        assert!(index < self.len, "bit index {} out of range", index);
        (self.words[index / WORD_BITS] >> (index % WORD_BITS)) & 1 == 1
    }

    /// Set bit `index` to `value`
    pub fn set(&mut self, index: usize, value: bool) {
        assert!(index < self.len, "bit index {} out of range", index);
        let mask = 1u64 << (index % WORD_BITS);
        if value {
            self.words[index / WORD_BITS] |= mask;
        } else {
            self.words[index / WORD_BITS] &= !mask;
        }
    }

    /// Flip bit `index`
    pub fn toggle(&mut self, index: usize) {
        let current = self.get(index);
        self.set(index, !current);
    }

    /// Number of set bits
    pub fn count_ones(&self) -> u32 {
        self.words.iter().map(|w| w.count_ones()).sum()
    }

    /// Count of differing bits.
    ///
    /// Both hashes of a run share one `hash_size`, so a length mismatch is a
    /// programming error and panics.
    pub fn distance(&self, other: &HashBits) -> u32 {
        assert_eq!(
            self.len, other.len,
            "cannot compare hashes of different lengths"
        );
        self.words
            .iter()
            .zip(&other.words)
            .map(|(a, b)| (a ^ b).count_ones())
            .sum()
    }

    /// Lowercase hex rendering, most significant nibble first
    pub fn to_hex(&self) -> String {
        let nibbles = self.len.div_ceil(4);
        let mut out = String::with_capacity(nibbles);
        for n in (0..nibbles).rev() {
            let mut value = 0u8;
            for b in 0..4 {
                let index = n * 4 + b;
                if index < self.len && self.get(index) {
                    value |= 1 << b;
                }
            }
            out.push(char::from_digit(value as u32, 16).unwrap_or('0'));
        }
        out
    }
}

impl fmt::Display for HashBits {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

/// The three hashes of one image, independent of where the image lives.
///
/// This is what the fingerprint cache stores, keyed by file content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageHashes {
    pub phash: HashBits,
    pub ahash: HashBits,
    pub dhash: HashBits,
}

/// Fingerprint of one image, identified by its normalized path
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageFingerprint {
    /// Absolute, normalized path to the image file
    pub path: PathBuf,

    /// Perceptual (DCT) hash
    pub phash: HashBits,

    /// Average hash
    pub ahash: HashBits,

    /// Difference hash
    pub dhash: HashBits,
}

impl ImageFingerprint {
    pub fn new(path: impl Into<PathBuf>, hashes: ImageHashes) -> Self {
        Self {
            path: path.into(),
            phash: hashes.phash,
            ahash: hashes.ahash,
            dhash: hashes.dhash,
        }
    }

    /// The bit length shared by all three hashes
    pub fn bit_length(&self) -> usize {
        self.phash.len()
    }
}
