//! File operations on dataset versions
//!
//! [`FileService`] is the entry point callers use: it validates paths,
//! hashes uploads while they stream to the backend, keeps the checksum
//! manifests in step with every store and delete, and exports zip archives.

use crate::archive::{ArchiveCompression, ZipAssembler, ZipSummary};
use crate::backend::{Backend, BackendError, FileData, WriteOptions};
use crate::core::{ensure_valid_path, HashingReader};
use crate::dataset::{DatasetVersion, FileType, StoredFile};
use crate::error::{FileServiceError, Result};
use crate::manifest_store::ManifestStore;
use futures::stream::{Stream, StreamExt, TryStreamExt};
use satchel_core_manifest::{Manifest, ManifestKind, PAYLOAD_PREFIX};
use serde::{Deserialize, Serialize};
use std::pin::Pin;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{debug, info, instrument, warn};

/// Lazy stream of stored-file descriptors
pub type FileStream = Pin<Box<dyn Stream<Item = Result<StoredFile>> + Send>>;

/// Service-level settings
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Compression of zip export entries
    #[serde(default)]
    pub compression: ArchiveCompression,
}

/// Stores, reads, lists, deletes and exports dataset version files
pub struct FileService {
    backend: Arc<dyn Backend>,
    manifests: ManifestStore,
    archive: ZipAssembler,
}

impl FileService {
    pub fn new(backend: Arc<dyn Backend>, config: ServiceConfig) -> Self {
        Self {
            manifests: ManifestStore::new(Arc::clone(&backend)),
            archive: ZipAssembler::new(Arc::clone(&backend), config.compression),
            backend,
        }
    }

    /// Backend serving this service
    pub fn backend(&self) -> &Arc<dyn Backend> {
        &self.backend
    }

    /// Validate and prefix a caller path with its file type directory
    fn qualify(version: &DatasetVersion, file_type: FileType, path: &str) -> Result<String> {
        if !version.is_valid() {
            return Err(FileServiceError::invalid_path(version.to_string()));
        }
        ensure_valid_path(path)?;
        Ok(file_type.qualify(path))
    }

    /// Download link for data files on backends that serve them directly
    fn url_for(&self, version: &DatasetVersion, path: &str) -> Option<url::Url> {
        if path.starts_with(PAYLOAD_PREFIX) {
            self.backend.download_url(version, path)
        } else {
            None
        }
    }

    /// Store a file, hashing it in the same pass, and record its checksum
    ///
    /// The reader is consumed exactly once. When `declared_length` is given
    /// and the stream ends with a different byte count, nothing is stored
    /// and `LengthMismatch` is returned.
    ///
    /// # Errors
    ///
    /// `ManifestUpdate` means the file is stored but its manifest entry is
    /// not; the stored descriptor travels with the error. This includes the
    /// case where the backend reports a size other than the hashed length
    /// (two stores racing on one path), where the descriptor has no checksum.
    #[instrument(
        skip(self, reader, content_type),
        fields(dataset = %version, file_type = %file_type)
    )]
    pub async fn store_file<R>(
        &self,
        version: &DatasetVersion,
        file_type: FileType,
        path: &str,
        reader: R,
        declared_length: Option<u64>,
        content_type: Option<String>,
    ) -> Result<StoredFile>
    where
        R: AsyncRead + Send + Unpin,
    {
        let qualified = Self::qualify(version, file_type, path)?;

        let options = match content_type {
            Some(content_type) => WriteOptions::new().with_content_type(content_type),
            None => WriteOptions::new(),
        };

        let mut hashing = HashingReader::new(reader);
        let metadata = self
            .backend
            .write(version, &qualified, &mut hashing, declared_length, options)
            .await?;

        if !hashing.is_exhausted() {
            return Err(FileServiceError::Backend(BackendError::Other {
                backend: self.backend.backend_name().to_string(),
                message: format!("upload of {} ended before end of stream", qualified),
            }));
        }

        let digest = hashing.finalize();
        if let Some(expected) = declared_length {
            if digest.length != expected {
                return Err(FileServiceError::LengthMismatch {
                    path: qualified,
                    expected,
                    actual: digest.length,
                });
            }
        }
        // The object is in place but holds other bytes than the ones hashed,
        // e.g. a concurrent store to the same path won the race. Its checksum
        // is unknown, so the manifest is left alone.
        if metadata.size != digest.length {
            warn!(
                path = %qualified,
                hashed = digest.length,
                stored = metadata.size,
                "stored object differs from the hashed stream"
            );
            let stored = StoredFile::from_metadata(&qualified, &metadata)
                .with_url(self.url_for(version, &qualified));
            return Err(FileServiceError::ManifestUpdate {
                stored: Box::new(stored),
                source: Box::new(FileServiceError::LengthMismatch {
                    path: qualified,
                    expected: digest.length,
                    actual: metadata.size,
                }),
            });
        }

        let sha256 = digest.to_hex();
        let mut stored = StoredFile::from_metadata(&qualified, &metadata)
            .with_sha256(Some(sha256.clone()))
            .with_url(self.url_for(version, &qualified));
        stored.content_size = digest.length;

        if let Err(e) = self.manifests.upsert(version, &qualified, &sha256).await {
            warn!(path = %qualified, error = %e, "file stored but manifest update failed");
            return Err(FileServiceError::ManifestUpdate {
                stored: Box::new(stored),
                source: Box::new(e),
            });
        }

        info!(path = %qualified, bytes = digest.length, sha256 = %sha256, "file stored");
        Ok(stored)
    }

    /// Delete a file and its manifest entry
    ///
    /// A file that is already gone is not an error; its manifest entry is
    /// removed regardless.
    #[instrument(skip(self), fields(dataset = %version, file_type = %file_type))]
    pub async fn delete_file(
        &self,
        version: &DatasetVersion,
        file_type: FileType,
        path: &str,
    ) -> Result<()> {
        let qualified = Self::qualify(version, file_type, path)?;

        match self.backend.delete(version, &qualified).await {
            Ok(()) => {}
            Err(e) if e.is_not_found() => {
                debug!(path = %qualified, "file already absent");
            }
            Err(e) => return Err(e.into()),
        }

        self.manifests.remove(version, &qualified).await?;
        info!(path = %qualified, "file deleted");
        Ok(())
    }

    /// Open a file for streaming
    ///
    /// `restrict_to_public` is decided and enforced by the caller; it is only
    /// recorded on the tracing span here.
    #[instrument(skip(self), fields(dataset = %version, file_type = %file_type))]
    pub async fn get_file_data(
        &self,
        version: &DatasetVersion,
        file_type: FileType,
        path: &str,
        restrict_to_public: bool,
    ) -> Result<FileData> {
        let qualified = Self::qualify(version, file_type, path)?;
        Ok(self.backend.read(version, &qualified).await?)
    }

    /// List every file in a dataset version with its recorded checksum
    ///
    /// Files missing from their manifest, including the manifest objects
    /// themselves, have no checksum. Both manifests are read once, when the
    /// listing starts.
    #[instrument(skip(self), fields(dataset = %version))]
    pub async fn list_files(&self, version: &DatasetVersion) -> Result<FileStream> {
        if !version.is_valid() {
            return Err(FileServiceError::invalid_path(version.to_string()));
        }

        let payload = self
            .manifests
            .checksums(version, ManifestKind::Payload)
            .await?;
        let tag = self.manifests.checksums(version, ManifestKind::Tag).await?;

        let backend = Arc::clone(&self.backend);
        let version = version.clone();
        let entries = self.backend.list(&version).await?;

        let files = entries.map_err(FileServiceError::from).map_ok(move |entry| {
            let sha256 = if ManifestKind::is_manifest_file(&entry.path) {
                None
            } else {
                let checksums = match ManifestKind::for_path(&entry.path) {
                    ManifestKind::Payload => &payload,
                    ManifestKind::Tag => &tag,
                };
                checksums.get(&entry.path).cloned()
            };

            let url = if entry.path.starts_with(PAYLOAD_PREFIX) {
                backend.download_url(&version, &entry.path)
            } else {
                None
            };

            StoredFile::from_metadata(entry.path.as_str(), &entry.metadata)
                .with_sha256(sha256)
                .with_url(url)
        });

        Ok(files.boxed())
    }

    /// Stream the given files (relative to the version root) as a zip archive
    ///
    /// Every path is validated before the first byte is written. Paths that
    /// no longer exist are skipped.
    #[instrument(skip(self, paths, output), fields(dataset = %version))]
    pub async fn write_file_data_as_zip<W>(
        &self,
        version: &DatasetVersion,
        paths: &[String],
        output: W,
    ) -> Result<ZipSummary>
    where
        W: AsyncWrite + Unpin + Send,
    {
        if !version.is_valid() {
            return Err(FileServiceError::invalid_path(version.to_string()));
        }
        for path in paths {
            ensure_valid_path(path)?;
        }

        self.archive.write_zip(version, paths, output).await
    }

    /// Current contents of a dataset version manifest
    pub async fn manifest(&self, version: &DatasetVersion, kind: ManifestKind) -> Result<Manifest> {
        if !version.is_valid() {
            return Err(FileServiceError::invalid_path(version.to_string()));
        }
        self.manifests.load(version, kind).await
    }
}
