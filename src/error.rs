/*!
 * Error types for Satchel
 */

use crate::backend::BackendError;
use crate::dataset::StoredFile;
use std::io;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, FileServiceError>;

/// Exit code constants for structured process exit
pub const EXIT_SUCCESS: i32 = 0;
pub const EXIT_PARTIAL: i32 = 1;
pub const EXIT_FATAL: i32 = 2;

#[derive(Debug, Error)]
pub enum FileServiceError {
    /// Path has an empty, `.` or `..` segment, or the namespace is unusable
    #[error("Invalid path: {path}")]
    InvalidPath { path: String },

    /// File does not exist in the dataset version
    #[error("File not found: {path}")]
    NotFound { path: String },

    /// Upload ended with a different byte count than declared
    #[error("Length mismatch for {path}: declared {expected} bytes, received {actual}")]
    LengthMismatch {
        path: String,
        expected: u64,
        actual: u64,
    },

    /// Storage backend failure
    #[error("Storage error: {0}")]
    Backend(BackendError),

    /// The file was stored but recording its checksum failed
    #[error("{} was stored but its manifest was not updated: {source}", .stored.path)]
    ManifestUpdate {
        stored: Box<StoredFile>,
        #[source]
        source: Box<FileServiceError>,
    },

    /// A stored manifest could not be parsed or updated
    #[error("Manifest error: {0}")]
    Manifest(#[from] satchel_core_manifest::Error),

    /// Zip archive could not be written
    #[error("Archive error: {0}")]
    Archive(#[from] async_zip::error::ZipError),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

impl FileServiceError {
    /// Whether the caller's request caused the failure
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            FileServiceError::InvalidPath { .. }
                | FileServiceError::NotFound { .. }
                | FileServiceError::LengthMismatch { .. }
        )
    }

    /// Get the process exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            // The primary operation succeeded
            FileServiceError::ManifestUpdate { .. } => EXIT_PARTIAL,
            _ => EXIT_FATAL,
        }
    }

    pub(crate) fn invalid_path(path: impl Into<String>) -> Self {
        FileServiceError::InvalidPath { path: path.into() }
    }
}

impl From<BackendError> for FileServiceError {
    fn from(err: BackendError) -> Self {
        match err {
            BackendError::NotFound { path, .. } => FileServiceError::NotFound { path },
            BackendError::InvalidPath { path, .. } => FileServiceError::InvalidPath { path },
            BackendError::LengthMismatch {
                path,
                expected,
                actual,
            } => FileServiceError::LengthMismatch {
                path,
                expected,
                actual,
            },
            other => FileServiceError::Backend(other),
        }
    }
}
