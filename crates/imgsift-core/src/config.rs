use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{Error, Result};

/// Log level for the application
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    /// Convert to the `log` crate's level filter
    pub fn to_level_filter(self) -> log::LevelFilter {
        match self {
            LogLevel::Error => log::LevelFilter::Error,
            LogLevel::Warn => log::LevelFilter::Warn,
            LogLevel::Info => log::LevelFilter::Info,
            LogLevel::Debug => log::LevelFilter::Debug,
            LogLevel::Trace => log::LevelFilter::Trace,
        }
    }
}

/// Smallest fingerprint grid that still yields a usable hash
pub const MIN_HASH_SIZE: u32 = 2;

/// Largest fingerprint grid accepted; the pHash thumbnail is four times this
pub const MAX_HASH_SIZE: u32 = 64;

/// Configuration for the near-duplicate search
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Similarity percentage (0-100) at or above which two images are related
    pub threshold: f64,

    /// Fingerprint grid size; each hash has `hash_size²` bits
    pub hash_size: u32,

    /// Number of worker threads (0 = one per logical core)
    pub max_workers: usize,

    /// Whether fingerprints are cached by file content between runs
    pub use_cache: bool,

    /// Seconds a cached fingerprint stays valid
    pub cache_ttl_secs: u64,

    /// Seconds between background sweeps of expired cache entries
    pub cache_sweep_interval_secs: u64,

    /// Emit a hashing progress event every this many images
    pub hash_progress_batch: usize,

    /// Emit a comparison progress event every this many comparisons
    pub compare_progress_batch: usize,

    /// Percentage points the perceptual-hash pre-filter is loosened below the threshold
    pub prefilter_slack: f64,

    /// Maximum directory depth for scanning
    pub max_depth: Option<usize>,

    /// Whether to follow symbolic links while scanning
    pub follow_links: bool,

    /// Log level
    pub log_level: LogLevel,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            threshold: 80.0,
            hash_size: 8,
            max_workers: 0, // Auto
            use_cache: true,
            cache_ttl_secs: 3600,
            cache_sweep_interval_secs: 600,
            hash_progress_batch: 5,
            compare_progress_batch: 50,
            prefilter_slack: 10.0,
            max_depth: None,
            follow_links: false,
            log_level: LogLevel::Info,
        }
    }
}

impl Config {
    /// Load configuration from a file
    pub fn from_file(path: &Path) -> Result<Self> {
        let file = std::fs::File::open(path)
            .map_err(|e| Error::Configuration(format!("Failed to open config file: {}", e)))?;

        let config: Config = serde_json::from_reader(file)
            .map_err(|e| Error::Configuration(format!("Failed to parse config file: {}", e)))?;

        Ok(config)
    }

    /// Save configuration to a file
    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        let file = std::fs::File::create(path)
            .map_err(|e| Error::Configuration(format!("Failed to create config file: {}", e)))?;

        serde_json::to_writer_pretty(file, self)?;

        Ok(())
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        self.match_params().validate()?;

        if self.cache_ttl_secs == 0 {
            return Err(Error::Configuration(
                "Cache TTL must be at least one second".to_string(),
            ));
        }

        if self.cache_sweep_interval_secs == 0 {
            return Err(Error::Configuration(
                "Cache sweep interval must be at least one second".to_string(),
            ));
        }

        if self.hash_progress_batch == 0 || self.compare_progress_batch == 0 {
            return Err(Error::Configuration(
                "Progress batch sizes must be greater than zero".to_string(),
            ));
        }

        Ok(())
    }

    /// Number of worker threads to build the pool with
    pub fn worker_count(&self) -> usize {
        if self.max_workers == 0 {
            num_cpus::get()
        } else {
            self.max_workers
        }
    }

    /// Per-run parameters derived from this configuration
    pub fn match_params(&self) -> MatchParams {
        MatchParams {
            threshold: self.threshold,
            hash_size: self.hash_size,
            prefilter_slack: self.prefilter_slack,
        }
    }
}

/// Parameters a single run is evaluated with.
///
/// Callers may vary these per request while the pool and cache owned by
/// [`crate::ImageGrouper`] stay alive.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MatchParams {
    pub threshold: f64,
    pub hash_size: u32,
    pub prefilter_slack: f64,
}

impl Default for MatchParams {
    fn default() -> Self {
        Config::default().match_params()
    }
}

impl MatchParams {
    pub fn new(threshold: f64, hash_size: u32) -> Self {
        Self {
            threshold,
            hash_size,
            ..Self::default()
        }
    }

    /// Number of bits in each of the three hashes
    pub fn bit_length(&self) -> usize {
        (self.hash_size as usize) * (self.hash_size as usize)
    }

    pub fn validate(&self) -> Result<()> {
        if !self.threshold.is_finite() || !(0.0..=100.0).contains(&self.threshold) {
            return Err(Error::Configuration(format!(
                "Similarity threshold must be between 0 and 100, got {}",
                self.threshold
            )));
        }

        if !(MIN_HASH_SIZE..=MAX_HASH_SIZE).contains(&self.hash_size) {
            return Err(Error::Configuration(format!(
                "Hash size must be between {} and {}, got {}",
                MIN_HASH_SIZE, MAX_HASH_SIZE, self.hash_size
            )));
        }

        if !self.prefilter_slack.is_finite() || self.prefilter_slack < 0.0 {
            return Err(Error::Configuration(format!(
                "Pre-filter slack must be a non-negative number, got {}",
                self.prefilter_slack
            )));
        }

        Ok(())
    }
}
