// Error handling for dataset resolution and analytics

use thiserror::Error;

pub type Result<T> = std::result::Result<T, DatasetError>;

#[derive(Error, Debug)]
pub enum DatasetError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Unsupported version {version:?} for dataset {dataset}")]
    UnsupportedVersion { dataset: String, version: String },

    #[error("Episode {episode} not found in dataset {dataset}")]
    EpisodeNotFound { dataset: String, episode: u64 },

    #[error("Malformed metadata in dataset {dataset}: {detail}")]
    MalformedMetadata { dataset: String, detail: String },

    #[error("Fetch failed for {path} after {attempts} attempt(s): {reason}")]
    TransientFetch {
        path: String,
        attempts: u32,
        reason: String,
    },

    #[error("Missing file: {0}")]
    MissingFile(String),

    #[error("Invalid magic bytes: expected {expected:?}, got {got:?}")]
    InvalidMagic { expected: Vec<u8>, got: Vec<u8> },

    #[error("Parquet decode failed: {0}")]
    Parquet(#[from] parquet::errors::ParquetError),

    #[error("JSON decode failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Parse error: {0}")]
    ParseError(String),
}

impl DatasetError {
    pub fn malformed(dataset: &str, detail: impl Into<String>) -> Self {
        Self::MalformedMetadata {
            dataset: dataset.to_string(),
            detail: detail.into(),
        }
    }

    /// Network and storage hiccups that are worth another attempt.
    pub fn is_transient(&self) -> bool {
        match self {
            DatasetError::Io(_) => true,
            DatasetError::Http(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            DatasetError::TransientFetch { .. } => true,
            _ => false,
        }
    }
}

/// Returned by an analytic whose preconditions are not met.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("not computed: {reason}")]
pub struct NotComputed {
    pub reason: String,
}

impl NotComputed {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}
