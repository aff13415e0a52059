//! Checksum manifests persisted through a storage backend
//!
//! Each dataset version has a payload manifest (files under `data/`) and a
//! tag manifest (everything else), stored as objects at the version root.
//! Every change rewrites the whole manifest object. Changes to the same
//! manifest are serialized within this process by an async lock per
//! (dataset version, manifest kind), so concurrent uploads never lose an
//! entry.

use crate::backend::{Backend, WriteOptions};
use crate::dataset::DatasetVersion;
use crate::error::{FileServiceError, Result};
use bytes::Bytes;
use futures::TryStreamExt;
use satchel_core_manifest::{Manifest, ManifestKind};
use std::collections::HashMap;
use std::io;
use std::sync::{Arc, Mutex, PoisonError, Weak};
use tracing::{debug, instrument};

/// Content type of manifest objects
const MANIFEST_CONTENT_TYPE: &str = "text/plain";

type LockKey = (DatasetVersion, ManifestKind);

/// Async locks keyed by manifest, created on demand
///
/// The table holds weak references; a lock lives only while some operation
/// holds or waits on it, and dead entries are pruned on insertion.
#[derive(Debug, Default)]
struct ManifestLocks {
    table: Mutex<HashMap<LockKey, Weak<tokio::sync::Mutex<()>>>>,
}

impl ManifestLocks {
    fn lock_for(&self, version: &DatasetVersion, kind: ManifestKind) -> Arc<tokio::sync::Mutex<()>> {
        let mut table = self.table.lock().unwrap_or_else(PoisonError::into_inner);
        let key = (version.clone(), kind);

        if let Some(lock) = table.get(&key).and_then(Weak::upgrade) {
            return lock;
        }

        table.retain(|_, weak| weak.strong_count() > 0);
        let lock = Arc::new(tokio::sync::Mutex::new(()));
        table.insert(key, Arc::downgrade(&lock));
        lock
    }

    #[cfg(test)]
    fn live_entries(&self) -> usize {
        let table = self.table.lock().unwrap_or_else(PoisonError::into_inner);
        table.values().filter(|weak| weak.strong_count() > 0).count()
    }
}

/// Reads and updates the checksum manifests of dataset versions
pub struct ManifestStore {
    backend: Arc<dyn Backend>,
    locks: ManifestLocks,
}

impl ManifestStore {
    pub fn new(backend: Arc<dyn Backend>) -> Self {
        Self {
            backend,
            locks: ManifestLocks::default(),
        }
    }

    /// Load a manifest; a missing manifest object is an empty manifest
    #[instrument(skip(self), fields(dataset = %version))]
    pub async fn load(&self, version: &DatasetVersion, kind: ManifestKind) -> Result<Manifest> {
        let data = match self.backend.read(version, kind.file_name()).await {
            Ok(data) => data,
            Err(e) if e.is_not_found() => return Ok(Manifest::new()),
            Err(e) => return Err(e.into()),
        };

        let chunks: Vec<Bytes> = data.stream.try_collect().await?;
        let content = String::from_utf8(chunks.concat()).map_err(|e| {
            FileServiceError::Io(io::Error::new(io::ErrorKind::InvalidData, e))
        })?;

        Ok(Manifest::parse(&content)?)
    }

    /// Record `digest` for `path` in the manifest responsible for it
    #[instrument(skip(self), fields(dataset = %version))]
    pub async fn upsert(&self, version: &DatasetVersion, path: &str, digest: &str) -> Result<()> {
        let kind = ManifestKind::for_path(path);
        let lock = self.locks.lock_for(version, kind);
        let _guard = lock.lock().await;

        let mut manifest = self.load(version, kind).await?;
        manifest.insert(path, digest)?;
        self.persist(version, kind, &manifest).await
    }

    /// Drop the entry for `path`, deleting the manifest once it is empty
    #[instrument(skip(self), fields(dataset = %version))]
    pub async fn remove(&self, version: &DatasetVersion, path: &str) -> Result<()> {
        let kind = ManifestKind::for_path(path);
        let lock = self.locks.lock_for(version, kind);
        let _guard = lock.lock().await;

        let mut manifest = self.load(version, kind).await?;
        if manifest.remove(path).is_none() {
            debug!(%kind, "no manifest entry to remove");
            return Ok(());
        }
        self.persist(version, kind, &manifest).await
    }

    /// Digests of a manifest keyed by decoded relative path
    pub async fn checksums(
        &self,
        version: &DatasetVersion,
        kind: ManifestKind,
    ) -> Result<HashMap<String, String>> {
        let manifest = self.load(version, kind).await?;
        Ok(manifest
            .iter_decoded()
            .map(|(path, digest)| (path, digest.to_string()))
            .collect())
    }

    async fn persist(
        &self,
        version: &DatasetVersion,
        kind: ManifestKind,
        manifest: &Manifest,
    ) -> Result<()> {
        if manifest.is_empty() {
            return match self.backend.delete(version, kind.file_name()).await {
                Ok(()) => {
                    debug!(%kind, "manifest emptied and deleted");
                    Ok(())
                }
                Err(e) if e.is_not_found() => Ok(()),
                Err(e) => Err(e.into()),
            };
        }

        let content = manifest.to_manifest_string();
        let mut reader = content.as_bytes();
        self.backend
            .write(
                version,
                kind.file_name(),
                &mut reader,
                Some(content.len() as u64),
                WriteOptions::new().with_content_type(MANIFEST_CONTENT_TYPE.to_string()),
            )
            .await?;

        debug!(%kind, entries = manifest.len(), "manifest written");
        Ok(())
    }
}
