//! Error types for storage backends
//!
//! Every backend maps its native failures onto [`BackendError`] so the file
//! service can treat missing objects, length mismatches and plain I/O
//! failures uniformly.

use std::fmt;
use std::io;

/// Result type alias for backend operations
pub type BackendResult<T> = std::result::Result<T, BackendError>;

/// Unified error type for backend operations
#[derive(Debug)]
pub enum BackendError {
    /// I/O error occurred during backend operation
    Io(io::Error),

    /// Object not found on backend
    NotFound { path: String, backend: String },

    /// Permission denied accessing resource
    PermissionDenied { path: String, message: String },

    /// Key is invalid or cannot be mapped onto the backend
    InvalidPath { path: String, reason: String },

    /// Streamed byte count differs from the declared length
    LengthMismatch {
        path: String,
        expected: u64,
        actual: u64,
    },

    /// Invalid configuration for backend
    InvalidConfig { backend: String, message: String },

    /// Backend operation not supported
    Unsupported { backend: String, operation: String },

    /// Generic backend error with context
    Other { backend: String, message: String },
}

impl BackendError {
    /// Shorthand for a not-found error
    pub fn not_found(path: impl Into<String>, backend: impl Into<String>) -> Self {
        BackendError::NotFound {
            path: path.into(),
            backend: backend.into(),
        }
    }

    /// Check if this error indicates the object was not found
    pub fn is_not_found(&self) -> bool {
        matches!(self, BackendError::NotFound { .. })
    }
}

impl fmt::Display for BackendError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendError::Io(err) => write!(f, "I/O error: {}", err),
            BackendError::NotFound { path, backend } => {
                write!(f, "Path not found on {}: {}", backend, path)
            }
            BackendError::PermissionDenied { path, message } => {
                write!(f, "Permission denied for {}: {}", path, message)
            }
            BackendError::InvalidPath { path, reason } => {
                write!(f, "Invalid path {:?}: {}", path, reason)
            }
            BackendError::LengthMismatch {
                path,
                expected,
                actual,
            } => {
                write!(
                    f,
                    "Length mismatch for {}: declared {} bytes, received {}",
                    path, expected, actual
                )
            }
            BackendError::InvalidConfig { backend, message } => {
                write!(f, "Invalid configuration for {}: {}", backend, message)
            }
            BackendError::Unsupported { backend, operation } => {
                write!(
                    f,
                    "Operation '{}' not supported by backend {}",
                    operation, backend
                )
            }
            BackendError::Other { backend, message } => {
                write!(f, "Backend error on {}: {}", backend, message)
            }
        }
    }
}

impl std::error::Error for BackendError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            BackendError::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<io::Error> for BackendError {
    fn from(err: io::Error) -> Self {
        // Map specific I/O errors to more specific backend errors
        match err.kind() {
            io::ErrorKind::NotFound => BackendError::NotFound {
                path: String::new(),
                backend: "unknown".to_string(),
            },
            io::ErrorKind::PermissionDenied => BackendError::PermissionDenied {
                path: String::new(),
                message: err.to_string(),
            },
            _ => BackendError::Io(err),
        }
    }
}

impl From<object_store::Error> for BackendError {
    fn from(err: object_store::Error) -> Self {
        match err {
            object_store::Error::NotFound { path, .. } => BackendError::NotFound {
                path,
                backend: "object_store".to_string(),
            },
            object_store::Error::NotSupported { source } => BackendError::Unsupported {
                backend: "object_store".to_string(),
                operation: source.to_string(),
            },
            object_store::Error::NotImplemented => BackendError::Unsupported {
                backend: "object_store".to_string(),
                operation: "not implemented".to_string(),
            },
            other => BackendError::Other {
                backend: "object_store".to_string(),
                message: other.to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = BackendError::LengthMismatch {
            path: "data/a.txt".to_string(),
            expected: 10,
            actual: 7,
        };
        assert_eq!(
            err.to_string(),
            "Length mismatch for data/a.txt: declared 10 bytes, received 7"
        );
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = io::Error::new(io::ErrorKind::NotFound, "file not found");
        let backend_err: BackendError = io_err.into();
        assert!(backend_err.is_not_found());

        let io_err = io::Error::new(io::ErrorKind::Other, "disk on fire");
        let backend_err: BackendError = io_err.into();
        assert!(matches!(backend_err, BackendError::Io(_)));
    }

    #[test]
    fn test_object_store_not_found_conversion() {
        let err = object_store::Error::NotFound {
            path: "ds/1/data/a.txt".to_string(),
            source: "missing".into(),
        };
        let backend_err: BackendError = err.into();
        assert!(matches!(
            backend_err,
            BackendError::NotFound { ref path, .. } if path == "ds/1/data/a.txt"
        ));
    }
}
