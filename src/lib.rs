/*!
 * Satchel - versioned dataset file storage
 *
 * Stores, lists, reads and deletes the files of versioned datasets while
 * keeping BagIt-style checksum manifests in step:
 * - SHA-256 computed while uploads stream to storage (one pass, no buffering)
 * - Payload and tag manifests updated on every store and delete
 * - Local filesystem and object store backends (S3, Azure, GCS behind features)
 * - Streaming zip export of selected files
 *
 * Author: Shane Wall <shaneawall@gmail.com>
 */

pub mod archive;
pub mod backend;
pub mod config;
pub mod core;
pub mod dataset;
pub mod error;
pub mod logging;
pub mod manifest_store;
pub mod service;

// Re-export commonly used types
pub use archive::{ArchiveCompression, ZipSummary};
pub use config::{LogLevel, SatchelConfig};
pub use dataset::{DatasetVersion, FileType, StoredFile};
pub use error::{FileServiceError, Result};
pub use satchel_core_manifest::{Manifest, ManifestKind};
pub use service::{FileService, FileStream, ServiceConfig};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
