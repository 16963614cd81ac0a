use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = core::result::Result<T, Error>;

/// Custom error types for the imgsift library
#[derive(Error, Debug)]
pub enum Error {
    /// I/O operation error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Image could not be decoded and is excluded from comparison
    #[error("Failed to decode {path}: {cause}")]
    Decode { path: PathBuf, cause: String },

    /// Image vanished between discovery and hashing
    #[error("File not found: {0}")]
    FileNotFound(PathBuf),

    /// Invalid configuration error
    #[error("Invalid configuration: {0}")]
    Configuration(String),

    /// Worker pool could not be created
    #[error("Failed to build worker pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),

    /// Config or report (de)serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    /// Build a decode error for `path` from any displayable cause
    pub fn decode(path: impl Into<PathBuf>, cause: impl std::fmt::Display) -> Self {
        Error::Decode {
            path: path.into(),
            cause: cause.to_string(),
        }
    }
}
