//! Common types for backend abstraction

use super::error::BackendResult;
use bytes::Bytes;
use futures::Stream;
use std::fmt;
use std::pin::Pin;
use std::time::SystemTime;

/// Object metadata across all backends
#[derive(Debug, Clone, PartialEq)]
pub struct Metadata {
    /// Size in bytes
    pub size: u64,

    /// Last modification time
    pub modified: Option<SystemTime>,

    /// Creation time
    pub created: Option<SystemTime>,

    /// MIME type / content type
    pub content_type: Option<String>,

    /// ETag or version marker (object stores only)
    pub etag: Option<String>,
}

impl Metadata {
    /// Create metadata for a file
    pub fn file(size: u64) -> Self {
        Self {
            size,
            modified: None,
            created: None,
            content_type: None,
            etag: None,
        }
    }

    /// Builder pattern: set modification time
    pub fn with_modified(mut self, modified: SystemTime) -> Self {
        self.modified = Some(modified);
        self
    }

    /// Builder pattern: set content type
    pub fn with_content_type(mut self, content_type: String) -> Self {
        self.content_type = Some(content_type);
        self
    }
}

/// Entry yielded by a namespace listing
#[derive(Debug, Clone)]
pub struct DirEntry {
    /// Path relative to the dataset version root, `/`-separated
    pub path: String,

    /// Entry metadata
    pub metadata: Metadata,
}

impl DirEntry {
    /// Create a new directory entry
    pub fn new(path: impl Into<String>, metadata: Metadata) -> Self {
        Self {
            path: path.into(),
            metadata,
        }
    }
}

/// Async read stream for file data
pub type ReadStream = Pin<Box<dyn Stream<Item = std::io::Result<Bytes>> + Send>>;

/// Lazy stream of listing entries
pub type ListStream = Pin<Box<dyn Stream<Item = BackendResult<DirEntry>> + Send>>;

/// An open object: metadata plus its byte stream
pub struct FileData {
    /// Metadata observed when the object was opened
    pub metadata: Metadata,

    /// Object bytes, read incrementally
    pub stream: ReadStream,
}

impl fmt::Debug for FileData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileData")
            .field("metadata", &self.metadata)
            .finish_non_exhaustive()
    }
}

/// Options for write operations
#[derive(Debug, Clone, Default)]
pub struct WriteOptions {
    /// Content type / MIME type
    pub content_type: Option<String>,
}

impl WriteOptions {
    /// Create with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Set content type
    pub fn with_content_type(mut self, content_type: String) -> Self {
        self.content_type = Some(content_type);
        self
    }
}
