//! Object store backend implementation
//!
//! Wraps any [`ObjectStore`] (in-memory, local filesystem, S3, Azure Blob,
//! Google Cloud Storage). Objects are stored under
//! `[<prefix>/]<dataset>/<version>/<relative path>`.
//!
//! Uploads stream through [`BufWriter`], which switches to a multipart
//! upload once its buffer fills; an upload that fails or is dropped before
//! completion never becomes visible.
//!
//! # Example
//!
//! ```no_run
//! use satchel::backend::{Backend, ObjectStoreBackend, WriteOptions};
//! use satchel::DatasetVersion;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let backend = ObjectStoreBackend::in_memory();
//!     let version = DatasetVersion::new("ds-1", "1");
//!
//!     let mut input = &b"hello"[..];
//!     backend
//!         .write(&version, "data/hello.txt", &mut input, Some(5), WriteOptions::new())
//!         .await?;
//!     Ok(())
//! }
//! ```

use super::error::{BackendError, BackendResult};
use super::types::{DirEntry, FileData, ListStream, Metadata, WriteOptions};
use super::{check_key, Backend};
use crate::dataset::DatasetVersion;
use async_trait::async_trait;
use futures::stream::{self, StreamExt, TryStreamExt};
use object_store::buffered::BufWriter;
use object_store::local::LocalFileSystem;
use object_store::memory::InMemory;
use object_store::{
    path::Path as ObjectPath, Attribute, Attributes, GetOptions, GetResult, ObjectMeta,
    ObjectStore,
};
use percent_encoding::percent_decode_str;
use std::path::Path;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use url::Url;

/// Listing entries buffered ahead of the consumer
const LIST_CHANNEL_CAPACITY: usize = 64;

/// Backend over an [`ObjectStore`]
#[derive(Debug)]
pub struct ObjectStoreBackend {
    store: Arc<dyn ObjectStore>,
    name: String,
    /// Prefix for all operations (like a "root" directory)
    prefix: Option<String>,
    /// Base for direct download links, ending in `/`
    public_base_url: Option<Url>,
    /// Whether the store persists the content type attribute
    store_attributes: bool,
}

impl ObjectStoreBackend {
    /// Wrap an existing store
    pub fn new(store: Arc<dyn ObjectStore>, name: impl Into<String>) -> Self {
        Self {
            store,
            name: name.into(),
            prefix: None,
            public_base_url: None,
            store_attributes: true,
        }
    }

    /// Volatile in-process store, mainly for tests
    pub fn in_memory() -> Self {
        Self::new(Arc::new(InMemory::new()), "memory")
    }

    /// Object store view of a local directory
    ///
    /// The directory must already exist. Content types are not persisted by
    /// this store and are guessed from the file extension instead.
    pub fn local(root: impl AsRef<Path>) -> BackendResult<Self> {
        let store = LocalFileSystem::new_with_prefix(root.as_ref()).map_err(|e| {
            BackendError::InvalidConfig {
                backend: "object-store-local".to_string(),
                message: format!("Failed to open {}: {}", root.as_ref().display(), e),
            }
        })?;

        let mut backend = Self::new(Arc::new(store), "object-store-local");
        backend.store_attributes = false;
        Ok(backend)
    }

    /// Amazon S3 bucket, configured from `AWS_*` environment variables
    #[cfg(feature = "s3")]
    pub fn s3(bucket: &str) -> BackendResult<Self> {
        let store = object_store::aws::AmazonS3Builder::from_env()
            .with_bucket_name(bucket)
            .build()
            .map_err(|e| BackendError::InvalidConfig {
                backend: "s3".to_string(),
                message: format!("Failed to create S3 client: {}", e),
            })?;
        Ok(Self::new(Arc::new(store), "s3"))
    }

    /// Azure Blob container, configured from `AZURE_*` environment variables
    #[cfg(feature = "azure")]
    pub fn azure(container: &str) -> BackendResult<Self> {
        let store = object_store::azure::MicrosoftAzureBuilder::from_env()
            .with_container_name(container)
            .build()
            .map_err(|e| BackendError::InvalidConfig {
                backend: "azure".to_string(),
                message: format!("Failed to create Azure client: {}", e),
            })?;
        Ok(Self::new(Arc::new(store), "azure"))
    }

    /// Google Cloud Storage bucket
    ///
    /// Authentication: GOOGLE_APPLICATION_CREDENTIALS or GOOGLE_SERVICE_ACCOUNT + GOOGLE_SERVICE_ACCOUNT_KEY
    #[cfg(feature = "gcs")]
    pub fn gcs(bucket: &str) -> BackendResult<Self> {
        let store = object_store::gcp::GoogleCloudStorageBuilder::from_env()
            .with_bucket_name(bucket)
            .build()
            .map_err(|e| BackendError::InvalidConfig {
                backend: "gcs".to_string(),
                message: format!("Failed to create GCS client: {}", e),
            })?;
        Ok(Self::new(Arc::new(store), "gcs"))
    }

    /// Place every object below `prefix`
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        let prefix = prefix.into();
        let trimmed = prefix.trim_matches('/');
        self.prefix = (!trimmed.is_empty()).then(|| trimmed.to_string());
        self
    }

    /// Serve download links below `base`
    pub fn with_public_base_url(mut self, mut base: Url) -> Self {
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        self.public_base_url = Some(base);
        self
    }

    /// Object name of a dataset version namespace, without trailing `/`
    fn namespace_name(&self, version: &DatasetVersion) -> String {
        match &self.prefix {
            Some(prefix) => format!(
                "{}/{}/{}",
                prefix, version.dataset_identifier, version.version_number
            ),
            None => format!("{}/{}", version.dataset_identifier, version.version_number),
        }
    }

    fn location(&self, version: &DatasetVersion, path: &str) -> BackendResult<ObjectPath> {
        check_key(version, path)?;
        Ok(ObjectPath::from(format!(
            "{}/{}",
            self.namespace_name(version),
            path
        )))
    }

    /// Map a store error, reporting not-found against the relative path
    fn map_err(&self, path: &str, err: object_store::Error) -> BackendError {
        match err {
            object_store::Error::NotFound { .. } => BackendError::not_found(path, &self.name),
            other => BackendError::from(other),
        }
    }

    fn convert_result(result: &GetResult) -> Metadata {
        let mut metadata = convert_object_meta(&result.meta);
        metadata.content_type = result
            .attributes
            .get(&Attribute::ContentType)
            .map(|value| value.to_string());
        if metadata.content_type.is_none() {
            metadata.content_type = guess_content_type(result.meta.location.as_ref());
        }
        metadata
    }
}

/// Convert object_store ObjectMeta to Backend Metadata
fn convert_object_meta(meta: &ObjectMeta) -> Metadata {
    let mut metadata = Metadata::file(meta.size as u64);
    metadata.modified = Some(meta.last_modified.into());
    metadata.etag = meta.e_tag.clone();
    metadata
}

fn guess_content_type(name: &str) -> Option<String> {
    mime_guess::from_path(name).first_raw().map(str::to_string)
}

/// Relative path of `location` inside `namespace`, percent-decoded
fn relative_path(namespace: &ObjectPath, location: &ObjectPath) -> Option<String> {
    let parts: Vec<String> = location
        .prefix_match(namespace)?
        .map(|part| {
            percent_decode_str(part.as_ref())
                .decode_utf8_lossy()
                .into_owned()
        })
        .collect();

    (!parts.is_empty()).then(|| parts.join("/"))
}

#[async_trait]
impl Backend for ObjectStoreBackend {
    #[tracing::instrument(skip(self), fields(backend = %self.name, dataset = %version))]
    async fn stat(&self, version: &DatasetVersion, path: &str) -> BackendResult<Metadata> {
        let location = self.location(version, path)?;
        let options = GetOptions {
            head: true,
            ..Default::default()
        };

        let result = self
            .store
            .get_opts(&location, options)
            .await
            .map_err(|e| self.map_err(path, e))?;

        Ok(Self::convert_result(&result))
    }

    #[tracing::instrument(skip(self), fields(backend = %self.name, dataset = %version))]
    async fn read(&self, version: &DatasetVersion, path: &str) -> BackendResult<FileData> {
        let location = self.location(version, path)?;

        let result = self
            .store
            .get(&location)
            .await
            .map_err(|e| self.map_err(path, e))?;

        let metadata = Self::convert_result(&result);
        let stream = result
            .into_stream()
            .map_err(std::io::Error::other)
            .boxed();

        Ok(FileData { metadata, stream })
    }

    #[tracing::instrument(
        skip(self, reader, options),
        fields(backend = %self.name, dataset = %version, size_hint = ?size_hint)
    )]
    async fn write(
        &self,
        version: &DatasetVersion,
        path: &str,
        reader: &mut (dyn AsyncRead + Send + Unpin),
        size_hint: Option<u64>,
        options: WriteOptions,
    ) -> BackendResult<Metadata> {
        let location = self.location(version, path)?;

        let mut writer = BufWriter::new(Arc::clone(&self.store), location);
        if self.store_attributes {
            if let Some(content_type) = &options.content_type {
                let mut attributes = Attributes::new();
                attributes.insert(Attribute::ContentType, content_type.clone().into());
                writer = writer.with_attributes(attributes);
            }
        }

        // One byte past the declared length is enough to detect an overrun
        let limit = size_hint.map_or(u64::MAX, |n| n.saturating_add(1));
        let mut limited = AsyncReadExt::take(reader, limit);

        let bytes_written = match tokio::io::copy(&mut limited, &mut writer).await {
            Ok(n) => n,
            Err(e) => {
                let _ = writer.abort().await;
                return Err(BackendError::from(e));
            }
        };

        if let Some(expected) = size_hint {
            if bytes_written != expected {
                let _ = writer.abort().await;
                return Err(BackendError::LengthMismatch {
                    path: path.to_string(),
                    expected,
                    actual: bytes_written,
                });
            }
        }

        writer.shutdown().await.map_err(BackendError::from)?;
        tracing::debug!(bytes = bytes_written, "object written");

        let mut metadata = self.stat(version, path).await?;
        if options.content_type.is_some() {
            metadata.content_type = options.content_type;
        }
        Ok(metadata)
    }

    #[tracing::instrument(skip(self), fields(backend = %self.name, dataset = %version))]
    async fn delete(&self, version: &DatasetVersion, path: &str) -> BackendResult<()> {
        let location = self.location(version, path)?;
        self.store
            .delete(&location)
            .await
            .map_err(|e| self.map_err(path, e))
    }

    #[tracing::instrument(skip(self), fields(backend = %self.name, dataset = %version))]
    async fn list(&self, version: &DatasetVersion) -> BackendResult<ListStream> {
        if !version.is_valid() {
            return Err(BackendError::InvalidPath {
                path: version.to_string(),
                reason: "dataset identifier and version must be single path segments"
                    .to_string(),
            });
        }

        // object_store's list() borrows the store, so a task owns the
        // traversal and hands entries over a bounded channel
        let namespace = ObjectPath::from(self.namespace_name(version));
        let store = Arc::clone(&self.store);
        let (tx, rx) = tokio::sync::mpsc::channel(LIST_CHANNEL_CAPACITY);

        tokio::spawn(async move {
            let mut listing = store.list(Some(&namespace));
            while let Some(item) = listing.next().await {
                let entry = match item {
                    Ok(meta) => match relative_path(&namespace, &meta.location) {
                        Some(path) => {
                            let mut metadata = convert_object_meta(&meta);
                            metadata.content_type = guess_content_type(&path);
                            Ok(DirEntry::new(path, metadata))
                        }
                        None => continue,
                    },
                    Err(e) => Err(BackendError::from(e)),
                };

                // Receiver dropped: consumer stopped listening
                if tx.send(entry).await.is_err() {
                    break;
                }
            }
        });

        let stream = stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|entry| (entry, rx))
        });
        Ok(stream.boxed())
    }

    fn download_url(&self, version: &DatasetVersion, path: &str) -> Option<Url> {
        let mut url = self.public_base_url.clone()?;
        check_key(version, path).ok()?;

        // Appended segment by segment: a key like `doi:10.5878/...` must not
        // be read as an absolute URL
        let prefix = self.prefix.as_deref().unwrap_or_default();
        url.path_segments_mut()
            .ok()?
            .pop_if_empty()
            .extend(prefix.split('/').filter(|segment| !segment.is_empty()))
            .push(&version.dataset_identifier)
            .push(&version.version_number)
            .extend(path.split('/'));
        Some(url)
    }

    fn backend_name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use tempfile::TempDir;

    fn version() -> DatasetVersion {
        DatasetVersion::new("ds-1", "1")
    }

    async fn put(backend: &ObjectStoreBackend, path: &str, data: &[u8]) -> Metadata {
        let mut input = data;
        backend
            .write(&version(), path, &mut input, Some(data.len() as u64), WriteOptions::new())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_in_memory_round_trip_with_content_type() {
        let backend = ObjectStoreBackend::in_memory();
        let mut input = &b"{\"a\":1}"[..];
        let meta = backend
            .write(
                &version(),
                "data/a.json",
                &mut input,
                Some(7),
                WriteOptions::new().with_content_type("application/x-custom".to_string()),
            )
            .await
            .unwrap();
        assert_eq!(meta.size, 7);

        let data = backend.read(&version(), "data/a.json").await.unwrap();
        assert_eq!(
            data.metadata.content_type.as_deref(),
            Some("application/x-custom")
        );
        let chunks: Vec<Bytes> = data.stream.try_collect().await.unwrap();
        assert_eq!(chunks.concat(), b"{\"a\":1}");

        let stat = backend.stat(&version(), "data/a.json").await.unwrap();
        assert_eq!(stat.content_type.as_deref(), Some("application/x-custom"));
    }

    #[tokio::test]
    async fn test_length_mismatch_stores_nothing() {
        let backend = ObjectStoreBackend::in_memory();
        let mut input = &b"abc"[..];
        let err = backend
            .write(&version(), "data/a.txt", &mut input, Some(5), WriteOptions::new())
            .await
            .unwrap_err();

        assert!(matches!(err, BackendError::LengthMismatch { actual: 3, .. }));
        assert!(!backend.exists(&version(), "data/a.txt").await.unwrap());
    }

    #[tokio::test]
    async fn test_not_found_reports_relative_path() {
        let backend = ObjectStoreBackend::in_memory();
        let err = backend.read(&version(), "data/missing").await.unwrap_err();

        match err {
            BackendError::NotFound { path, backend } => {
                assert_eq!(path, "data/missing");
                assert_eq!(backend, "memory");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_list_is_scoped_to_namespace() {
        let backend = ObjectStoreBackend::in_memory().with_prefix("/root/");
        put(&backend, "data/a b.txt", b"1").await;
        put(&backend, "data/sub/c%d.txt", b"22").await;
        put(&backend, "manifest-sha256.txt", b"333").await;

        let mut other = &b"x"[..];
        backend
            .write(
                &DatasetVersion::new("ds-1", "10"),
                "data/other.txt",
                &mut other,
                None,
                WriteOptions::new(),
            )
            .await
            .unwrap();

        let mut entries: Vec<(String, u64)> = backend
            .list(&version())
            .await
            .unwrap()
            .map_ok(|e| (e.path, e.metadata.size))
            .try_collect()
            .await
            .unwrap();
        entries.sort();

        assert_eq!(
            entries,
            vec![
                ("data/a b.txt".to_string(), 1),
                ("data/sub/c%d.txt".to_string(), 2),
                ("manifest-sha256.txt".to_string(), 3),
            ]
        );
    }

    #[tokio::test]
    async fn test_list_empty_namespace() {
        let backend = ObjectStoreBackend::in_memory();
        let entries: Vec<DirEntry> = backend
            .list(&version())
            .await
            .unwrap()
            .try_collect()
            .await
            .unwrap();
        assert!(entries.is_empty());
    }

    #[tokio::test]
    async fn test_local_object_store_ignores_attributes() {
        let temp_dir = TempDir::new().unwrap();
        let backend = ObjectStoreBackend::local(temp_dir.path()).unwrap();

        let mut input = &b"hello"[..];
        backend
            .write(
                &version(),
                "data/hello.txt",
                &mut input,
                Some(5),
                WriteOptions::new().with_content_type("text/x-custom".to_string()),
            )
            .await
            .unwrap();

        let stat = backend.stat(&version(), "data/hello.txt").await.unwrap();
        assert_eq!(stat.size, 5);
        assert_eq!(stat.content_type.as_deref(), Some("text/plain"));
        assert!(temp_dir.path().join("ds-1/1/data/hello.txt").exists());
    }

    #[test]
    fn test_download_url() {
        let backend = ObjectStoreBackend::in_memory()
            .with_prefix("bucket-root")
            .with_public_base_url(Url::parse("https://cdn.example.org/files").unwrap());

        let url = backend.download_url(&version(), "data/a.txt").unwrap();
        assert_eq!(
            url.as_str(),
            "https://cdn.example.org/files/bucket-root/ds-1/1/data/a.txt"
        );

        assert!(ObjectStoreBackend::in_memory()
            .download_url(&version(), "data/a.txt")
            .is_none());
        assert!(backend.download_url(&version(), "../x").is_none());
    }

    #[test]
    fn test_download_url_keeps_base_for_scheme_like_identifier() {
        let backend = ObjectStoreBackend::in_memory()
            .with_public_base_url(Url::parse("https://f.example.org/files/").unwrap());
        let version = DatasetVersion::new("doi:10.5878", "1");

        let url = backend.download_url(&version, "data/a b.txt").unwrap();
        assert_eq!(
            url.as_str(),
            "https://f.example.org/files/doi:10.5878/1/data/a%20b.txt"
        );
    }

    #[test]
    fn test_relative_path_decodes_parts() {
        let namespace = ObjectPath::from("p/ds/1");
        let location = ObjectPath::from("p/ds/1/data/a b.txt");
        assert_eq!(
            relative_path(&namespace, &location).as_deref(),
            Some("data/a b.txt")
        );
        assert!(relative_path(&namespace, &ObjectPath::from("p/ds/10/x")).is_none());
    }
}
