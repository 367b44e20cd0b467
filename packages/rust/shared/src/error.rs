//! Error types for bomenrich.
//!
//! Library crates use [`BomError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.

use std::path::PathBuf;

/// Top-level error type for all bomenrich operations.
#[derive(Debug, thiserror::Error)]
pub enum BomError {
    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// Column inference failed; carries the header texts that were seen so
    /// the caller can report what the sheet actually looked like.
    #[error("column inference failed: {message}; headers seen: {headers:?}")]
    ColumnInference {
        message: String,
        headers: Vec<String>,
    },

    /// Transient transport failure (connection reset, timeout). The only
    /// class of error the retry policy considers retryable.
    #[error("transient network error: {0}")]
    Transient(String),

    /// Non-transient network/HTTP error.
    #[error("network error: {0}")]
    Network(String),

    /// Provider quota or rate limit exhausted. Soft-aborts the whole job.
    #[error("rate limited: {0}")]
    RateLimited(String),

    /// Lookup/format collaborator returned a failure.
    #[error("lookup error: {0}")]
    Lookup(String),

    /// Spreadsheet decoding or encoding error.
    #[error("sheet error: {message}")]
    Sheet { message: String },

    /// Checkpoint/artifact store error.
    #[error("storage error: {0}")]
    Storage(String),

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Data validation error (malformed cell, bad job id, etc.).
    #[error("validation error: {message}")]
    Validation { message: String },
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, BomError>;

impl BomError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a column-inference error carrying the observed headers.
    pub fn column_inference(msg: impl Into<String>, headers: Vec<String>) -> Self {
        Self::ColumnInference {
            message: msg.into(),
            headers,
        }
    }

    /// Create a sheet error from any displayable message.
    pub fn sheet(msg: impl Into<String>) -> Self {
        Self::Sheet {
            message: msg.into(),
        }
    }

    /// Create a validation error from any displayable message.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
        }
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// True for failures that are safe to retry as-is.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }

    /// True for quota/rate-limit failures that should soft-abort the job.
    pub fn is_rate_limit(&self) -> bool {
        matches!(self, Self::RateLimited(_))
    }
}
