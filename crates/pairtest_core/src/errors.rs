//! Errors raised while persisting results or compiling filter patterns.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Errors that occur while loading or saving a results file.
#[derive(Debug, Error)]
pub enum ResultsError {
    #[error("failed to read results file '{}': {source}", .path.display())]
    Read { path: PathBuf, source: io::Error },

    #[error("failed to write results file '{}': {source}", .path.display())]
    Write { path: PathBuf, source: io::Error },

    #[error("malformed results file '{}': {source}", .path.display())]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("failed to encode results: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Errors that occur while building a [`crate::CaseFilter`].
#[derive(Debug, Error)]
pub enum FilterError {
    #[error("invalid filter pattern '{pattern}': {source}")]
    Pattern { pattern: String, source: regex::Error },
}
