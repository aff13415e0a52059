//! Local filesystem backend implementation
//!
//! Objects live at `<root>/<dataset>/<version>/<relative path>`. Writes go to
//! a staging file under `<root>/.satchel-staging/` first and are renamed into
//! place once complete, so readers never observe a partially written object
//! and listings never see one. The staging directory name is reserved: it is
//! not accepted as a dataset identifier.

use super::error::{BackendError, BackendResult};
use super::types::{DirEntry, FileData, ListStream, Metadata, WriteOptions};
use super::{check_key, Backend};
use crate::dataset::DatasetVersion;
use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::{self, StreamExt};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::fs;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};

/// Read chunk size for object streams
const CHUNK_SIZE: usize = 64 * 1024;

/// Directory under the root holding in-flight uploads
const STAGING_DIR: &str = ".satchel-staging";

static PARTIAL_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Local filesystem backend
///
/// # Example
///
/// ```no_run
/// use satchel::backend::{Backend, LocalBackend};
/// use satchel::DatasetVersion;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let backend = LocalBackend::new("/var/lib/satchel");
///     let meta = backend
///         .stat(&DatasetVersion::new("ds-1", "1"), "data/file.txt")
///         .await?;
///     println!("Size: {} bytes", meta.size);
///     Ok(())
/// }
/// ```
#[derive(Debug, Clone)]
pub struct LocalBackend {
    /// Directory holding one subdirectory per dataset
    root: PathBuf,
}

impl LocalBackend {
    /// Create a backend rooted at `root` (created lazily on first write)
    pub fn new<P: Into<PathBuf>>(root: P) -> Self {
        Self { root: root.into() }
    }

    /// Root directory of this backend
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory of a dataset version namespace
    fn namespace_dir(&self, version: &DatasetVersion) -> PathBuf {
        self.root
            .join(&version.dataset_identifier)
            .join(&version.version_number)
    }

    fn staging_dir(&self) -> PathBuf {
        self.root.join(STAGING_DIR)
    }

    /// Reject the dataset identifier reserved for staging
    fn check_namespace(version: &DatasetVersion) -> BackendResult<()> {
        if version.dataset_identifier == STAGING_DIR {
            return Err(BackendError::InvalidPath {
                path: version.to_string(),
                reason: format!("'{}' is reserved by the local backend", STAGING_DIR),
            });
        }
        Ok(())
    }

    /// Resolve a validated key to a filesystem path
    fn resolve_path(&self, version: &DatasetVersion, path: &str) -> BackendResult<PathBuf> {
        check_key(version, path)?;
        Self::check_namespace(version)?;

        let mut resolved = self.namespace_dir(version);
        for segment in path.split('/') {
            if cfg!(windows) && segment.contains(['\\', ':']) {
                return Err(BackendError::InvalidPath {
                    path: path.to_string(),
                    reason: "path separator or drive marker in segment".to_string(),
                });
            }
            resolved.push(segment);
        }
        Ok(resolved)
    }

    fn not_found(path: &str) -> BackendError {
        BackendError::not_found(path, "local")
    }

    /// Map an I/O error for `path`, keeping not-found distinct
    fn map_io(path: &str, err: io::Error) -> BackendError {
        match err.kind() {
            io::ErrorKind::NotFound => Self::not_found(path),
            io::ErrorKind::PermissionDenied => BackendError::PermissionDenied {
                path: path.to_string(),
                message: err.to_string(),
            },
            _ => BackendError::Io(err),
        }
    }

    /// Move a finished staging file to its final path
    ///
    /// A concurrent delete may prune the parent directory between creating
    /// it and the rename; the rename is retried once after recreating it.
    async fn commit(&self, staged: &Path, target: &Path) -> io::Result<()> {
        let Some(parent) = target.parent() else {
            return fs::rename(staged, target).await;
        };

        fs::create_dir_all(parent).await?;
        match fs::rename(staged, target).await {
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                fs::create_dir_all(parent).await?;
                fs::rename(staged, target).await
            }
            result => result,
        }
    }

    /// Remove directories emptied by a delete, stopping at the namespace root
    async fn prune_empty_dirs(&self, version: &DatasetVersion, deleted: &Path) {
        let namespace = self.namespace_dir(version);
        let mut current = deleted.parent();

        while let Some(dir) = current {
            if dir == namespace || !dir.starts_with(&namespace) {
                break;
            }
            // Fails on non-empty directories, which ends the walk
            if fs::remove_dir(dir).await.is_err() {
                break;
            }
            current = dir.parent();
        }
    }
}

/// Convert std::fs::Metadata to backend Metadata
fn convert_metadata(path: &str, meta: &std::fs::Metadata) -> Metadata {
    let mut metadata = Metadata::file(meta.len());
    metadata.modified = meta.modified().ok();
    metadata.created = meta.created().ok();
    metadata.content_type = mime_guess::from_path(path).first_raw().map(str::to_string);
    metadata
}

/// Removes an in-flight upload file unless it was committed
///
/// Dropping the write future (client disconnect) drops this guard too, so
/// cancelled uploads clean up after themselves.
struct PartialFile {
    path: PathBuf,
    committed: bool,
}

impl PartialFile {
    /// Fresh staging file name, independent of the target name
    fn in_dir(staging: &Path) -> Self {
        let unique = PARTIAL_COUNTER.fetch_add(1, Ordering::Relaxed);

        Self {
            path: staging.join(format!("{}-{}", std::process::id(), unique)),
            committed: false,
        }
    }
}

impl Drop for PartialFile {
    fn drop(&mut self) {
        if !self.committed {
            let _ = std::fs::remove_file(&self.path);
        }
    }
}

/// Listing walk state: directories still to visit plus the one being read
struct Walk {
    pending: Vec<(PathBuf, String)>,
    current: Option<(fs::ReadDir, String)>,
}

impl Walk {
    fn new(namespace: PathBuf) -> Self {
        Self {
            pending: vec![(namespace, String::new())],
            current: None,
        }
    }

    /// Advance to the next file, descending into directories depth-first
    async fn next_file(&mut self) -> Option<BackendResult<DirEntry>> {
        loop {
            if self.current.is_none() {
                let (dir, prefix) = self.pending.pop()?;
                match fs::read_dir(&dir).await {
                    Ok(read_dir) => self.current = Some((read_dir, prefix)),
                    // Namespace never created, or directory pruned mid-walk
                    Err(e) if e.kind() == io::ErrorKind::NotFound => continue,
                    Err(e) => return Some(Err(BackendError::from(e))),
                }
            }

            let (read_dir, prefix) = self.current.as_mut()?;
            let prefix = prefix.clone();

            let entry = match read_dir.next_entry().await {
                Ok(Some(entry)) => entry,
                Ok(None) => {
                    self.current = None;
                    continue;
                }
                Err(e) => {
                    self.current = None;
                    return Some(Err(BackendError::from(e)));
                }
            };

            let name = entry.file_name().to_string_lossy().into_owned();
            let relative = if prefix.is_empty() {
                name
            } else {
                format!("{}/{}", prefix, name)
            };

            let meta = match entry.metadata().await {
                Ok(meta) => meta,
                Err(e) if e.kind() == io::ErrorKind::NotFound => continue,
                Err(e) => return Some(Err(BackendError::from(e))),
            };

            if meta.is_dir() {
                self.pending.push((entry.path(), relative));
                continue;
            }

            let metadata = convert_metadata(&relative, &meta);
            return Some(Ok(DirEntry::new(relative, metadata)));
        }
    }
}

#[async_trait]
impl Backend for LocalBackend {
    #[tracing::instrument(skip(self), fields(backend = "local", dataset = %version))]
    async fn stat(&self, version: &DatasetVersion, path: &str) -> BackendResult<Metadata> {
        let resolved = self.resolve_path(version, path)?;
        let meta = fs::metadata(&resolved)
            .await
            .map_err(|e| Self::map_io(path, e))?;

        if !meta.is_file() {
            return Err(Self::not_found(path));
        }

        Ok(convert_metadata(path, &meta))
    }

    #[tracing::instrument(skip(self), fields(backend = "local", dataset = %version))]
    async fn read(&self, version: &DatasetVersion, path: &str) -> BackendResult<FileData> {
        let resolved = self.resolve_path(version, path)?;
        let file = fs::File::open(&resolved)
            .await
            .map_err(|e| Self::map_io(path, e))?;

        let meta = file.metadata().await.map_err(|e| Self::map_io(path, e))?;
        if !meta.is_file() {
            return Err(Self::not_found(path));
        }

        let stream = stream::unfold(
            (file, vec![0u8; CHUNK_SIZE]),
            |(mut file, mut buffer)| async move {
                match file.read(&mut buffer).await {
                    Ok(0) => None, // EOF
                    Ok(n) => {
                        let data = Bytes::copy_from_slice(&buffer[..n]);
                        Some((Ok(data), (file, buffer)))
                    }
                    Err(e) => Some((Err(e), (file, buffer))),
                }
            },
        );

        Ok(FileData {
            metadata: convert_metadata(path, &meta),
            stream: Box::pin(stream),
        })
    }

    #[tracing::instrument(
        skip(self, reader, options),
        fields(backend = "local", dataset = %version, size_hint = ?size_hint)
    )]
    async fn write(
        &self,
        version: &DatasetVersion,
        path: &str,
        reader: &mut (dyn AsyncRead + Send + Unpin),
        size_hint: Option<u64>,
        options: WriteOptions,
    ) -> BackendResult<Metadata> {
        let resolved = self.resolve_path(version, path)?;

        let staging = self.staging_dir();
        fs::create_dir_all(&staging)
            .await
            .map_err(|e| Self::map_io(path, e))?;

        let mut partial = PartialFile::in_dir(&staging);
        let mut file = fs::File::create(&partial.path)
            .await
            .map_err(|e| Self::map_io(path, e))?;

        // One byte past the declared length is enough to detect an overrun
        let limit = size_hint.map_or(u64::MAX, |n| n.saturating_add(1));
        let mut limited = AsyncReadExt::take(reader, limit);

        let bytes_written = tokio::io::copy(&mut limited, &mut file)
            .await
            .map_err(BackendError::from)?;
        file.flush().await.map_err(BackendError::from)?;
        file.sync_all().await.map_err(BackendError::from)?;
        drop(file);

        if let Some(expected) = size_hint {
            if bytes_written != expected {
                return Err(BackendError::LengthMismatch {
                    path: path.to_string(),
                    expected,
                    actual: bytes_written,
                });
            }
        }

        self.commit(&partial.path, &resolved)
            .await
            .map_err(|e| Self::map_io(path, e))?;
        partial.committed = true;

        tracing::debug!(bytes = bytes_written, "object written");

        let meta = fs::metadata(&resolved)
            .await
            .map_err(|e| Self::map_io(path, e))?;
        let mut metadata = convert_metadata(path, &meta);
        if options.content_type.is_some() {
            metadata.content_type = options.content_type;
        }
        Ok(metadata)
    }

    #[tracing::instrument(skip(self), fields(backend = "local", dataset = %version))]
    async fn delete(&self, version: &DatasetVersion, path: &str) -> BackendResult<()> {
        let resolved = self.resolve_path(version, path)?;

        let meta = fs::metadata(&resolved)
            .await
            .map_err(|e| Self::map_io(path, e))?;
        if !meta.is_file() {
            return Err(Self::not_found(path));
        }

        fs::remove_file(&resolved)
            .await
            .map_err(|e| Self::map_io(path, e))?;

        self.prune_empty_dirs(version, &resolved).await;
        Ok(())
    }

    #[tracing::instrument(skip(self), fields(backend = "local", dataset = %version))]
    async fn list(&self, version: &DatasetVersion) -> BackendResult<ListStream> {
        if !version.is_valid() {
            return Err(BackendError::InvalidPath {
                path: version.to_string(),
                reason: "dataset identifier and version must be single path segments"
                    .to_string(),
            });
        }
        Self::check_namespace(version)?;

        let walk = Walk::new(self.namespace_dir(version));
        let stream = stream::unfold(walk, |mut walk| async move {
            walk.next_file().await.map(|item| (item, walk))
        });

        Ok(stream.boxed())
    }

    fn backend_name(&self) -> &str {
        "local"
    }
}
