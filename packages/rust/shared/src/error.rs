//! Error types for merchgen.
//!
//! Library crates use [`MerchGenError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.
//!
//! Only [`MerchGenError::PreconditionFailed`] is allowed to abort a batch run;
//! every other variant is absorbed at the narrowest boundary that can recover.

use std::path::PathBuf;

/// Top-level error type for all merchgen operations.
#[derive(Debug, thiserror::Error)]
pub enum MerchGenError {
    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// Network/HTTP error while fetching a dataset, an asset, or uploading.
    #[error("network error: {0}")]
    Network(String),

    /// Delimited-text parsing error.
    #[error("parse error: {message}")]
    Parse { message: String },

    /// A remote dataset (or the league entry pointing at it) is missing.
    #[error("data unavailable: {0}")]
    DataUnavailable(String),

    /// Database or storage layer error.
    #[error("storage error: {0}")]
    Storage(String),

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Data validation error (bad identifier, bad path, etc.).
    #[error("validation error: {message}")]
    Validation { message: String },

    /// Host document operation failed (missing node, wrong node kind, ...).
    #[error("document error: {0}")]
    Document(String),

    /// A template routine failed while customizing a document.
    #[error("template error: {0}")]
    Template(String),

    /// A batch cannot start (e.g. no open document).
    #[error("precondition failed: {0}")]
    PreconditionFailed(String),
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, MerchGenError>;

impl MerchGenError {
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

    /// Create a validation error from any displayable message.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
        }
    }

    /// Create a document error.
    pub fn document(msg: impl Into<String>) -> Self {
        Self::Document(msg.into())
    }

    /// Create a precondition error.
    pub fn precondition(msg: impl Into<String>) -> Self {
        Self::PreconditionFailed(msg.into())
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Whether this error must abort the whole batch.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::PreconditionFailed(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_formatting() {
        let err = MerchGenError::config("missing upload url");
        assert_eq!(err.to_string(), "config error: missing upload url");

        let err = MerchGenError::validation("template id contains '/'");
        assert!(err.to_string().contains("template id"));

        let err = MerchGenError::DataUnavailable("league \"NHL\" not found".into());
        assert!(err.to_string().starts_with("data unavailable"));
    }

    #[test]
    fn only_precondition_is_fatal() {
        assert!(MerchGenError::precondition("no active document").is_fatal());
        assert!(!MerchGenError::Network("HTTP 500".into()).is_fatal());
        assert!(!MerchGenError::Template("boom".into()).is_fatal());
        assert!(!MerchGenError::io("/tmp/x", std::io::Error::other("disk")).is_fatal());
    }
}
