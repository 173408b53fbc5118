//! Error types for trackio-metrics
//!
//! Store errors never escape a query: the facade converts them into
//! [`QueryWarning`](crate::query::QueryWarning)s next to a partial result.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// trackio-metrics error types
#[derive(Error, Debug)]
pub enum Error {
    /// Project database file does not exist
    #[error("No data for project '{project}': {} not found", .path.display())]
    StoreNotFound {
        /// Project name
        project: String,
        /// Expected database path
        path: PathBuf,
    },

    /// Project database exists but rows cannot be read
    #[error("Corrupt store for project '{project}': {detail}")]
    StoreCorrupt {
        /// Project name
        project: String,
        /// What failed to parse
        detail: String,
    },

    /// Smoothing level outside 0..=20
    #[error("Invalid smoothing level {0}: expected 0..={max}", max = crate::config::MAX_SMOOTHING)]
    InvalidSmoothing(u8),

    /// Axis mode string not recognised
    #[error("Unknown axis mode '{0}': expected one of step, relative, wall")]
    UnknownAxisMode(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Blocking store task failed to complete
    #[error("Store task failed: {0}")]
    Task(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Build a [`Error::StoreCorrupt`] for `project` from any displayable cause.
    pub fn corrupt(project: impl Into<String>, detail: impl std::fmt::Display) -> Self {
        Self::StoreCorrupt {
            project: project.into(),
            detail: detail.to_string(),
        }
    }

    /// True for errors that mean "nothing to show" rather than a failure.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::StoreNotFound { .. })
    }
}

impl From<tokio::task::JoinError> for Error {
    fn from(err: tokio::task::JoinError) -> Self {
        Self::Task(err.to_string())
    }
}
