//! Error types for nzbrelay.
//!
//! Library crates use [`RelayError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.
//!
//! Outcomes that are expected for ordinary chat traffic (a line that does not
//! match the grammar, a rejected category, a duplicate release) are *not*
//! errors and never appear here.

use std::path::PathBuf;

/// Top-level error type for all nzbrelay operations.
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// Generic network/HTTP error (client construction, transport setup).
    #[error("network error: {0}")]
    Network(String),

    /// The metadata endpoint was unreachable or answered with an error.
    #[error("metadata fetch failed: {0}")]
    Fetch(String),

    /// A resource the job depends on is absent from the metadata response.
    #[error("missing resource: {0}")]
    MissingResource(String),

    /// Streaming a remote resource to disk failed (transport or decompression).
    #[error("download failed ({url}): {cause}")]
    Download { url: String, cause: String },

    /// Upload to the re-upload endpoint failed.
    #[error("upload failed: {0}")]
    Upload(String),

    /// No destination channel could be resolved for an announcement.
    #[error("routing error: {0}")]
    Routing(String),

    /// Dedup store / database error.
    #[error("storage error: {0}")]
    Storage(String),

    /// Chat transport error (connect, register, send).
    #[error("transport error: {0}")]
    Transport(String),

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Data validation error (bad pattern, malformed value, etc.).
    #[error("validation error: {message}")]
    Validation { message: String },
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, RelayError>;

impl RelayError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a validation error from any displayable message.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
        }
    }

    /// Wrap any transfer or decompression failure for `url`.
    pub fn download(url: impl Into<String>, cause: impl std::fmt::Display) -> Self {
        Self::Download {
            url: url.into(),
            cause: cause.to_string(),
        }
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Whether the pipeline treats this error as fatal for the current job.
    ///
    /// Upload and routing failures are logged and the job carries on.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Self::Upload(_) | Self::Routing(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_formatting() {
        let err = RelayError::config("missing upload URL");
        assert_eq!(err.to_string(), "config error: missing upload URL");

        let err = RelayError::download("https://example.com/a.jpg", "connection reset");
        assert_eq!(
            err.to_string(),
            "download failed (https://example.com/a.jpg): connection reset"
        );
    }

    #[test]
    fn fatality_follows_taxonomy() {
        assert!(RelayError::Fetch("timeout".into()).is_fatal());
        assert!(RelayError::MissingResource("image URL".into()).is_fatal());
        assert!(RelayError::download("u", "eof").is_fatal());
        assert!(!RelayError::Upload("HTTP 500".into()).is_fatal());
        assert!(!RelayError::Routing("no channel".into()).is_fatal());
    }
}
