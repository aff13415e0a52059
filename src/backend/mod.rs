//! Storage backends for dataset version namespaces
//!
//! A backend stores opaque byte objects keyed by a dataset version and a
//! `/`-separated relative path. It knows nothing about manifests or file
//! types; the file service layers those on top.
//!
//! # Implementations
//!
//! - [`LocalBackend`]: a directory tree on the local filesystem
//! - [`ObjectStoreBackend`]: any [`object_store::ObjectStore`] (in-memory,
//!   local, and S3/Azure/GCS behind the `s3`, `azure` and `gcs` features)
//!
//! # Example
//!
//! ```no_run
//! use satchel::backend::{Backend, LocalBackend, WriteOptions};
//! use satchel::DatasetVersion;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let backend = LocalBackend::new("/var/lib/satchel");
//!     let version = DatasetVersion::new("ds-1", "1");
//!
//!     let mut input = &b"hello"[..];
//!     let meta = backend
//!         .write(&version, "data/hello.txt", &mut input, Some(5), WriteOptions::new())
//!         .await?;
//!     println!("stored {} bytes", meta.size);
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod types;

mod local;
mod object;

// Re-export main types
pub use config::{StorageConfig, StorageKind};
pub use error::{BackendError, BackendResult};
pub use local::LocalBackend;
pub use object::ObjectStoreBackend;
pub use types::{DirEntry, FileData, ListStream, Metadata, ReadStream, WriteOptions};

use crate::dataset::DatasetVersion;
use async_trait::async_trait;
use tokio::io::AsyncRead;
use url::Url;

/// Unified backend trait for dataset storage
///
/// Implementors must be `Send + Sync`; one backend instance serves many
/// concurrent operations.
#[async_trait]
pub trait Backend: Send + Sync {
    /// Get metadata for an object
    ///
    /// # Errors
    ///
    /// Returns `BackendError::NotFound` if the object doesn't exist.
    async fn stat(&self, version: &DatasetVersion, path: &str) -> BackendResult<Metadata>;

    /// Open an object for streaming reads
    ///
    /// # Errors
    ///
    /// Returns `BackendError::NotFound` if the object doesn't exist.
    async fn read(&self, version: &DatasetVersion, path: &str) -> BackendResult<FileData>;

    /// Store an object, replacing any existing object at the same key
    ///
    /// The reader is consumed to end of stream and copied incrementally; it
    /// is never buffered whole. When `size_hint` is given it must match the
    /// number of bytes read, otherwise nothing is stored and
    /// `BackendError::LengthMismatch` is returned.
    ///
    /// If the returned future is dropped before completion no partial object
    /// remains visible.
    ///
    /// # Returns
    ///
    /// Metadata of the stored object as observed by the backend
    async fn write(
        &self,
        version: &DatasetVersion,
        path: &str,
        reader: &mut (dyn AsyncRead + Send + Unpin),
        size_hint: Option<u64>,
        options: WriteOptions,
    ) -> BackendResult<Metadata>;

    /// Delete an object
    ///
    /// # Errors
    ///
    /// May return `BackendError::NotFound` if the object doesn't exist;
    /// object stores that delete idempotently return `Ok(())` instead.
    async fn delete(&self, version: &DatasetVersion, path: &str) -> BackendResult<()>;

    /// List every object in a dataset version
    ///
    /// The stream is lazy, finite, and yields each object exactly once. Each
    /// call starts a fresh traversal. A namespace that was never written to
    /// lists as empty.
    async fn list(&self, version: &DatasetVersion) -> BackendResult<ListStream>;

    /// Check if an object exists
    async fn exists(&self, version: &DatasetVersion, path: &str) -> BackendResult<bool> {
        match self.stat(version, path).await {
            Ok(_) => Ok(true),
            Err(BackendError::NotFound { .. }) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Direct download link for an object, if the backend can serve one
    fn download_url(&self, version: &DatasetVersion, path: &str) -> Option<Url> {
        let _ = (version, path);
        None
    }

    /// Get the backend name/type (e.g., "local", "memory", "s3")
    fn backend_name(&self) -> &str;
}

/// Reject keys that could escape a dataset version namespace
pub(crate) fn check_key(version: &DatasetVersion, path: &str) -> BackendResult<()> {
    if !version.is_valid() {
        return Err(BackendError::InvalidPath {
            path: version.to_string(),
            reason: "dataset identifier and version must be single path segments".to_string(),
        });
    }
    if !crate::core::validate_path(path) {
        return Err(BackendError::InvalidPath {
            path: path.to_string(),
            reason: "empty, '.' or '..' segment".to_string(),
        });
    }
    Ok(())
}
