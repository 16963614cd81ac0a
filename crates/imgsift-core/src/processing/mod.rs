// Core modules
mod crypto_hash;

pub mod batch_processor;
pub mod cache;
pub mod perceptual;
pub mod progress;
pub mod types;

// Expose cryptographic hash calculations
pub use crypto_hash::*;

// Reexport core functionality
pub use batch_processor::{fingerprint_image, HashOutcome};
pub use cache::{CacheKey, CacheSweeper, FingerprintCache};
pub use perceptual::{fingerprint_from_file, fingerprint_from_img, hashes_from_file};
pub use progress::{
    ChannelProgress, LogProgress, NoProgress, ProgressBarSink, ProgressEvent, ProgressSink, Stage,
};
pub use types::{HashBits, ImageFingerprint, ImageHashes};
