//! Error types shared across the library
//!
//! Dataset, daemon and protocol failures are all reported through
//! [`MaxlonError`]. A lookup that finds no covering network is *not* an error;
//! resolution returns `Option` instead.

use std::path::PathBuf;
use thiserror::Error;

/// Result alias used throughout the library
pub type Result<T> = std::result::Result<T, MaxlonError>;

/// Errors raised by the dataset, engine, daemon and front-end layers
#[derive(Debug, Error)]
pub enum MaxlonError {
    /// The dataset file does not exist
    #[error("dataset not found: {}", .0.display())]
    DatasetNotFound(PathBuf),

    /// The dataset exists but cannot be parsed into any record
    #[error("dataset {} is malformed: {reason}", path.display())]
    DatasetMalformed { path: PathBuf, reason: String },

    /// The engine was asked to build from zero records
    #[error("dataset contains no network records")]
    EmptyDataset,

    /// Downloading or validating a fresh dataset failed
    #[error("dataset update failed: {0}")]
    DatasetUpdateFailed(String),

    /// Another daemon instance holds the process marker
    #[error("daemon already running (pid {pid})")]
    DaemonAlreadyRunning { pid: u32 },

    /// No live daemon could be found
    #[error("daemon not running")]
    DaemonNotRunning,

    /// A front end received a request it cannot interpret
    #[error("malformed request: {0}")]
    MalformedRequest(String),

    /// The daemon answered a request with an error
    #[error("daemon error ({code}): {message}")]
    DaemonResponse { code: String, message: String },

    /// The stop signal could not be delivered to the recorded process
    #[error("unable to signal process {pid}: {reason}")]
    ProcessSignalFailure { pid: u32, reason: String },

    /// Configuration could not be built
    #[error("configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl MaxlonError {
    /// Whether a dataset update could fix this error.
    ///
    /// Only a missing dataset is retried; malformed or empty files are fatal.
    pub fn is_dataset_missing(&self) -> bool {
        matches!(self, MaxlonError::DatasetNotFound(_))
    }
}
