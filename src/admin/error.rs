use std::path::{Path, PathBuf};

use crate::types::GraphError;
use thiserror::Error;

/// Error type for administrative operations.
#[derive(Debug, Error)]
pub enum AdminError {
    /// Custom error message.
    #[error("{0}")]
    Message(String),
    /// Core graph error.
    #[error(transparent)]
    Core(#[from] GraphError),
    /// I/O error.
    #[error(transparent)]
    Io(#[from] std::io::Error),
    /// CSV reading or writing failed.
    #[error("CSV {path}: {source}")]
    Csv {
        /// File being read or written.
        path: PathBuf,
        /// Underlying CSV error.
        source: csv::Error,
    },
}

/// Result type alias for administrative operations.
pub type Result<T> = std::result::Result<T, AdminError>;

impl AdminError {
    pub(crate) fn csv(path: impl AsRef<Path>, source: csv::Error) -> Self {
        AdminError::Csv {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }
}
