//! Error types for VishvaMap.

use std::path::PathBuf;

use thiserror::Error;

/// VishvaMap error type.
///
/// Fatal configuration errors and stage preconditions are reported through
/// this enum. Per-item registration failures are not errors: they are logged
/// and skipped by the stage that encountered them.
#[derive(Error, Debug)]
pub enum RefineError {
    /// Invalid configuration, raised at setup before any stage runs.
    #[error("configuration error: {0}")]
    Config(String),

    /// An output directory was requested but does not exist.
    #[error("output directory does not exist: {0}")]
    OutputDir(PathBuf),

    /// Too few submaps for the requested stage.
    #[error("not enough submaps: have {have}, need more than {min_required}")]
    InsufficientSubmaps {
        /// Number of submaps in the store.
        have: usize,
        /// Minimum count the stage requires (exclusive).
        min_required: usize,
    },

    /// Failed to parse a config or map file.
    #[error("parse error: {0}")]
    Parse(String),

    /// I/O error while reading or writing artifacts.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<serde_json::Error> for RefineError {
    fn from(e: serde_json::Error) -> Self {
        RefineError::Parse(e.to_string())
    }
}

/// Convenience result alias.
pub type Result<T> = std::result::Result<T, RefineError>;
