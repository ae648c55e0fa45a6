//! Error types for Lingoflow.
//!
//! Library crates use [`LingoflowError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.

use std::path::PathBuf;

/// Top-level error type for all Lingoflow operations.
#[derive(Debug, thiserror::Error)]
pub enum LingoflowError {
    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// Network/HTTP transport error talking to an external service.
    #[error("network error: {0}")]
    Network(String),

    /// Response body or payload could not be decoded.
    #[error("parse error: {message}")]
    Parse { message: String },

    /// The document store rejected a request.
    #[error("store error{}: {message}", status_suffix(.status))]
    Store {
        status: Option<u16>,
        message: String,
    },

    /// The completion service failed or returned an unusable answer.
    #[error("completion error: {0}")]
    Completion(String),

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Data validation error (bad pipeline state, missing field, etc.).
    #[error("validation error: {message}")]
    Validation { message: String },
}

fn status_suffix(status: &Option<u16>) -> String {
    status.map(|s| format!(" (HTTP {s})")).unwrap_or_default()
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, LingoflowError>;

impl LingoflowError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a parse error from any displayable message.
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse {
            message: msg.into(),
        }
    }

    /// Create a store error without an HTTP status (transport-independent).
    pub fn store(msg: impl Into<String>) -> Self {
        Self::Store {
            status: None,
            message: msg.into(),
        }
    }

    /// Create a store error carrying the HTTP status the store answered with.
    pub fn store_status(status: u16, msg: impl Into<String>) -> Self {
        Self::Store {
            status: Some(status),
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
}
