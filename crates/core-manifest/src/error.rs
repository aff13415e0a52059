//! Error types for manifest operations

use thiserror::Error;

/// Result type for manifest operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while parsing a manifest
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// A non-empty line without the `digest path` separator
    #[error("Malformed manifest line {line}: {content:?}")]
    MalformedLine { line: usize, content: String },

    /// Digest is not 64 hex characters
    #[error("Invalid SHA-256 digest: {digest:?}")]
    InvalidDigest { digest: String },
}

impl Error {
    /// Create a malformed line error (1-based line number)
    pub fn malformed_line<S: Into<String>>(line: usize, content: S) -> Self {
        Error::MalformedLine {
            line,
            content: content.into(),
        }
    }

    /// Create an invalid digest error
    pub fn invalid_digest<S: Into<String>>(digest: S) -> Self {
        Error::InvalidDigest {
            digest: digest.into(),
        }
    }
}
