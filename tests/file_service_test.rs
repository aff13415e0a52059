//! Integration tests for FileService over both storage backends
//!
//! Covers the store/get/list/delete round trips, manifest bookkeeping,
//! path validation and concurrent uploads.

use async_trait::async_trait;
use bytes::Bytes;
use futures::TryStreamExt;
use satchel::backend::{
    Backend, BackendError, BackendResult, FileData, ListStream, LocalBackend, Metadata,
    ObjectStoreBackend, WriteOptions,
};
use satchel::{
    logging, DatasetVersion, FileService, FileServiceError, FileType, ManifestKind, ServiceConfig,
    StoredFile,
};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use tempfile::TempDir;
use tokio::io::AsyncRead;

fn sha256(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

fn version() -> DatasetVersion {
    DatasetVersion::new("dataset-42", "3")
}

/// One service per backend kind; the TempDir keeps the local root alive
fn services() -> (Vec<FileService>, TempDir) {
    logging::init_test_logging();
    let temp_dir = TempDir::new().unwrap();
    let backends: Vec<Arc<dyn Backend>> = vec![
        Arc::new(LocalBackend::new(temp_dir.path())),
        Arc::new(ObjectStoreBackend::in_memory()),
    ];
    let services = backends
        .into_iter()
        .map(|backend| FileService::new(backend, ServiceConfig::default()))
        .collect();
    (services, temp_dir)
}

async fn read_file(service: &FileService, file_type: FileType, path: &str) -> Vec<u8> {
    let data = service
        .get_file_data(&version(), file_type, path, false)
        .await
        .unwrap();
    let chunks: Vec<Bytes> = data.stream.try_collect().await.unwrap();
    chunks.concat()
}

async fn list(service: &FileService) -> Vec<StoredFile> {
    let mut files: Vec<StoredFile> = service
        .list_files(&version())
        .await
        .unwrap()
        .try_collect()
        .await
        .unwrap();
    files.sort_by(|a, b| a.path.cmp(&b.path));
    files
}

#[tokio::test]
async fn test_store_then_get_round_trip() {
    let (services, _temp_dir) = services();
    let large: Vec<u8> = (0..300_000u32).map(|i| (i % 251) as u8).collect();

    let cases: Vec<(&str, Vec<u8>)> = vec![
        ("a.txt", b"hello world".to_vec()),
        ("nested/dir/b.bin", large),
        ("empty.dat", Vec::new()),
        ("with space & 100%.csv", b"x,y\n1,2\n".to_vec()),
    ];

    for service in &services {
        for (path, content) in &cases {
            let stored = service
                .store_file(
                    &version(),
                    FileType::Data,
                    path,
                    &content[..],
                    Some(content.len() as u64),
                    None,
                )
                .await
                .unwrap();

            assert_eq!(stored.path, format!("data/{}", path));
            assert_eq!(stored.content_size, content.len() as u64);
            assert_eq!(stored.sha256.as_deref(), Some(sha256(content).as_str()));

            assert_eq!(&read_file(service, FileType::Data, path).await, content);
        }
    }
}

#[tokio::test]
async fn test_overwrite_replaces_content_and_digest() {
    let (services, _temp_dir) = services();

    for service in &services {
        for content in [&b"first"[..], &b"second version"[..]] {
            service
                .store_file(&version(), FileType::Data, "a.txt", content, None, None)
                .await
                .unwrap();
        }

        assert_eq!(read_file(service, FileType::Data, "a.txt").await, b"second version");
        let payload = service
            .manifest(&version(), ManifestKind::Payload)
            .await
            .unwrap();
        assert_eq!(payload.len(), 1);
        assert_eq!(
            payload.get("data/a.txt"),
            Some(sha256(b"second version").as_str())
        );
    }
}

#[tokio::test]
async fn test_manifest_follows_store_and_delete() {
    let (services, _temp_dir) = services();

    for service in &services {
        service
            .store_file(&version(), FileType::Data, "p/q.txt", &b"payload"[..], Some(7), None)
            .await
            .unwrap();

        let payload = service
            .manifest(&version(), ManifestKind::Payload)
            .await
            .unwrap();
        assert_eq!(payload.get("data/p/q.txt"), Some(sha256(b"payload").as_str()));
        assert!(service
            .manifest(&version(), ManifestKind::Tag)
            .await
            .unwrap()
            .is_empty());

        service
            .delete_file(&version(), FileType::Data, "p/q.txt")
            .await
            .unwrap();

        let payload = service
            .manifest(&version(), ManifestKind::Payload)
            .await
            .unwrap();
        assert!(payload.get("data/p/q.txt").is_none());
        assert!(list(service).await.is_empty());

        let err = service
            .get_file_data(&version(), FileType::Data, "p/q.txt", false)
            .await
            .unwrap_err();
        assert!(matches!(err, FileServiceError::NotFound { .. }));
    }
}

#[tokio::test]
async fn test_delete_of_missing_file_succeeds() {
    let (services, _temp_dir) = services();

    for service in &services {
        service
            .delete_file(&version(), FileType::Documentation, "never-stored.md")
            .await
            .unwrap();
    }
}

#[tokio::test]
async fn test_list_merges_manifest_checksums() {
    let (services, _temp_dir) = services();

    for service in &services {
        service
            .store_file(&version(), FileType::Data, "a.txt", &b"alpha"[..], Some(5), None)
            .await
            .unwrap();
        service
            .store_file(
                &version(),
                FileType::Documentation,
                "readme.txt",
                &b"read me"[..],
                Some(7),
                None,
            )
            .await
            .unwrap();

        let files = list(service).await;
        let summary: Vec<(&str, Option<&str>)> = files
            .iter()
            .map(|f| (f.path.as_str(), f.sha256.as_deref()))
            .collect();

        let alpha = sha256(b"alpha");
        let readme = sha256(b"read me");
        assert_eq!(
            summary,
            vec![
                ("data/a.txt", Some(alpha.as_str())),
                ("documentation/readme.txt", Some(readme.as_str())),
                ("manifest-sha256.txt", None),
                ("tagmanifest-sha256.txt", None),
            ]
        );

        let data_file = &files[0];
        assert_eq!(data_file.content_size, 5);
        assert_eq!(data_file.content_type.as_deref(), Some("text/plain"));
    }
}

#[tokio::test]
async fn test_listing_is_restartable() {
    let (services, _temp_dir) = services();

    for service in &services {
        for i in 0..10 {
            let path = format!("f{i}.txt");
            service
                .store_file(&version(), FileType::Data, &path, path.as_bytes(), None, None)
                .await
                .unwrap();
        }

        let first = list(service).await;
        let second = list(service).await;
        assert_eq!(first.len(), 11);
        assert_eq!(
            first.iter().map(|f| &f.path).collect::<Vec<_>>(),
            second.iter().map(|f| &f.path).collect::<Vec<_>>()
        );
    }
}

#[tokio::test]
async fn test_versions_are_isolated() {
    let (services, _temp_dir) = services();
    let other = DatasetVersion::new("dataset-42", "4");

    for service in &services {
        service
            .store_file(&version(), FileType::Data, "a.txt", &b"v3"[..], None, None)
            .await
            .unwrap();

        let files: Vec<StoredFile> = service
            .list_files(&other)
            .await
            .unwrap()
            .try_collect()
            .await
            .unwrap();
        assert!(files.is_empty());
        assert!(service
            .manifest(&other, ManifestKind::Payload)
            .await
            .unwrap()
            .is_empty());
    }
}

/// Fails the test if the service touches storage at all
struct UntouchableBackend;

#[async_trait]
impl Backend for UntouchableBackend {
    async fn stat(&self, _: &DatasetVersion, path: &str) -> BackendResult<Metadata> {
        panic!("backend touched: stat {path}")
    }

    async fn read(&self, _: &DatasetVersion, path: &str) -> BackendResult<FileData> {
        panic!("backend touched: read {path}")
    }

    async fn write(
        &self,
        _: &DatasetVersion,
        path: &str,
        _: &mut (dyn AsyncRead + Send + Unpin),
        _: Option<u64>,
        _: WriteOptions,
    ) -> BackendResult<Metadata> {
        panic!("backend touched: write {path}")
    }

    async fn delete(&self, _: &DatasetVersion, path: &str) -> BackendResult<()> {
        panic!("backend touched: delete {path}")
    }

    async fn list(&self, version: &DatasetVersion) -> BackendResult<ListStream> {
        panic!("backend touched: list {version}")
    }

    fn backend_name(&self) -> &str {
        "untouchable"
    }
}

#[tokio::test]
async fn test_invalid_paths_never_reach_backend() {
    let service = FileService::new(Arc::new(UntouchableBackend), ServiceConfig::default());
    let invalid = ["", "/a", "a/", "a//b", ".", "..", "a/./b", "a/../b", "../../etc/passwd"];

    for path in invalid {
        let err = service
            .store_file(&version(), FileType::Data, path, &b"x"[..], Some(1), None)
            .await
            .unwrap_err();
        assert!(matches!(err, FileServiceError::InvalidPath { .. }), "store {path:?}");

        let err = service
            .delete_file(&version(), FileType::Documentation, path)
            .await
            .unwrap_err();
        assert!(matches!(err, FileServiceError::InvalidPath { .. }), "delete {path:?}");

        let err = service
            .get_file_data(&version(), FileType::Data, path, true)
            .await
            .unwrap_err();
        assert!(matches!(err, FileServiceError::InvalidPath { .. }), "get {path:?}");
        assert!(err.is_client_error());
    }

    let err = service
        .write_file_data_as_zip(
            &version(),
            &["data/ok.txt".to_string(), "data/../x".to_string()],
            Vec::new(),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, FileServiceError::InvalidPath { ref path } if path == "data/../x"));
}

#[tokio::test]
async fn test_length_mismatch_stores_nothing() {
    let (services, _temp_dir) = services();

    for service in &services {
        let err = service
            .store_file(&version(), FileType::Data, "short.bin", &b"abc"[..], Some(4), None)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            FileServiceError::LengthMismatch {
                expected: 4,
                actual: 3,
                ..
            }
        ));
        assert!(err.is_client_error());
        assert!(list(service).await.is_empty());
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_stores_all_recorded() {
    logging::init_test_logging();
    let temp_dir = TempDir::new().unwrap();
    let backends: Vec<Arc<dyn Backend>> = vec![
        Arc::new(LocalBackend::new(temp_dir.path())),
        Arc::new(ObjectStoreBackend::in_memory()),
    ];

    for backend in backends {
        let service = Arc::new(FileService::new(backend, ServiceConfig::default()));

        let tasks: Vec<_> = (0..24)
            .map(|i| {
                let service = Arc::clone(&service);
                tokio::spawn(async move {
                    let (file_type, path) = if i % 3 == 0 {
                        (FileType::Documentation, format!("doc-{i}.md"))
                    } else {
                        (FileType::Data, format!("part-{i}.bin"))
                    };
                    let content = format!("content {i}").into_bytes();
                    service
                        .store_file(&version(), file_type, &path, &content[..], None, None)
                        .await
                })
            })
            .collect();

        for task in tasks {
            task.await.unwrap().unwrap();
        }

        let payload = service
            .manifest(&version(), ManifestKind::Payload)
            .await
            .unwrap();
        let tag = service.manifest(&version(), ManifestKind::Tag).await.unwrap();
        assert_eq!(payload.len(), 16);
        assert_eq!(tag.len(), 8);

        for i in 0..24 {
            let content = format!("content {i}").into_bytes();
            let (manifest, path) = if i % 3 == 0 {
                (&tag, format!("documentation/doc-{i}.md"))
            } else {
                (&payload, format!("data/part-{i}.bin"))
            };
            assert_eq!(manifest.get(&path), Some(sha256(&content).as_str()));
        }
    }
}

/// In-memory backend that refuses to write manifest objects
struct ManifestlessBackend {
    inner: ObjectStoreBackend,
}

#[async_trait]
impl Backend for ManifestlessBackend {
    async fn stat(&self, version: &DatasetVersion, path: &str) -> BackendResult<Metadata> {
        self.inner.stat(version, path).await
    }

    async fn read(&self, version: &DatasetVersion, path: &str) -> BackendResult<FileData> {
        self.inner.read(version, path).await
    }

    async fn write(
        &self,
        version: &DatasetVersion,
        path: &str,
        reader: &mut (dyn AsyncRead + Send + Unpin),
        size_hint: Option<u64>,
        options: WriteOptions,
    ) -> BackendResult<Metadata> {
        if ManifestKind::is_manifest_file(path) {
            return Err(BackendError::PermissionDenied {
                path: path.to_string(),
                message: "read-only root".to_string(),
            });
        }
        self.inner
            .write(version, path, reader, size_hint, options)
            .await
    }

    async fn delete(&self, version: &DatasetVersion, path: &str) -> BackendResult<()> {
        self.inner.delete(version, path).await
    }

    async fn list(&self, version: &DatasetVersion) -> BackendResult<ListStream> {
        self.inner.list(version).await
    }

    fn backend_name(&self) -> &str {
        "manifestless"
    }
}

#[tokio::test]
async fn test_manifest_failure_keeps_stored_file() {
    let backend = ManifestlessBackend {
        inner: ObjectStoreBackend::in_memory(),
    };
    let service = FileService::new(Arc::new(backend), ServiceConfig::default());

    let err = service
        .store_file(&version(), FileType::Data, "kept.txt", &b"kept"[..], Some(4), None)
        .await
        .unwrap_err();

    match &err {
        FileServiceError::ManifestUpdate { stored, source } => {
            assert_eq!(stored.path, "data/kept.txt");
            assert_eq!(stored.sha256.as_deref(), Some(sha256(b"kept").as_str()));
            assert!(matches!(**source, FileServiceError::Backend(_)));
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(!err.is_client_error());

    assert_eq!(read_file(&service, FileType::Data, "kept.txt").await, b"kept");
}

/// Backend whose writes land but report one byte more than was sent, as if
/// another store to the same path finished in between
struct RacedBackend {
    inner: ObjectStoreBackend,
}

#[async_trait]
impl Backend for RacedBackend {
    async fn stat(&self, version: &DatasetVersion, path: &str) -> BackendResult<Metadata> {
        self.inner.stat(version, path).await
    }

    async fn read(&self, version: &DatasetVersion, path: &str) -> BackendResult<FileData> {
        self.inner.read(version, path).await
    }

    async fn write(
        &self,
        version: &DatasetVersion,
        path: &str,
        reader: &mut (dyn AsyncRead + Send + Unpin),
        size_hint: Option<u64>,
        options: WriteOptions,
    ) -> BackendResult<Metadata> {
        let mut metadata = self
            .inner
            .write(version, path, reader, size_hint, options)
            .await?;
        if !ManifestKind::is_manifest_file(path) {
            metadata.size += 1;
        }
        Ok(metadata)
    }

    async fn delete(&self, version: &DatasetVersion, path: &str) -> BackendResult<()> {
        self.inner.delete(version, path).await
    }

    async fn list(&self, version: &DatasetVersion) -> BackendResult<ListStream> {
        self.inner.list(version).await
    }

    fn backend_name(&self) -> &str {
        "raced"
    }
}

#[tokio::test]
async fn test_size_disagreement_is_partial_success() {
    let backend = RacedBackend {
        inner: ObjectStoreBackend::in_memory(),
    };
    let service = FileService::new(Arc::new(backend), ServiceConfig::default());

    let err = service
        .store_file(&version(), FileType::Data, "raced.txt", &b"mine"[..], Some(4), None)
        .await
        .unwrap_err();

    match &err {
        FileServiceError::ManifestUpdate { stored, source } => {
            assert_eq!(stored.path, "data/raced.txt");
            assert_eq!(stored.content_size, 5);
            assert!(stored.sha256.is_none());
            assert!(matches!(
                **source,
                FileServiceError::LengthMismatch {
                    expected: 4,
                    actual: 5,
                    ..
                }
            ));
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(err.exit_code(), satchel::error::EXIT_PARTIAL);

    assert!(service
        .manifest(&version(), ManifestKind::Payload)
        .await
        .unwrap()
        .is_empty());
}
