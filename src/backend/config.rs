//! Storage backend configuration
//!
//! Describes which backend serves dataset storage and builds it.

use super::error::{BackendError, BackendResult};
use super::{Backend, LocalBackend, ObjectStoreBackend};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use url::Url;

/// Kind of storage backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StorageKind {
    /// Directory tree on the local filesystem
    #[default]
    Local,

    /// Volatile in-process store
    Memory,

    /// object_store view of a local directory
    ObjectStoreLocal,

    /// Amazon S3 or S3-compatible storage
    S3,

    /// Azure Blob Storage
    Azure,

    /// Google Cloud Storage
    Gcs,
}

impl StorageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StorageKind::Local => "local",
            StorageKind::Memory => "memory",
            StorageKind::ObjectStoreLocal => "object-store-local",
            StorageKind::S3 => "s3",
            StorageKind::Azure => "azure",
            StorageKind::Gcs => "gcs",
        }
    }
}

impl fmt::Display for StorageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StorageKind {
    type Err = BackendError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "local" => Ok(StorageKind::Local),
            "memory" => Ok(StorageKind::Memory),
            "object-store-local" => Ok(StorageKind::ObjectStoreLocal),
            "s3" => Ok(StorageKind::S3),
            "azure" => Ok(StorageKind::Azure),
            "gcs" => Ok(StorageKind::Gcs),
            other => Err(BackendError::InvalidConfig {
                backend: other.to_string(),
                message: "unknown storage kind".to_string(),
            }),
        }
    }
}

/// Storage section of the service configuration
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Backend kind
    #[serde(default)]
    pub kind: StorageKind,

    /// Root directory (local kinds)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub root: Option<PathBuf>,

    /// Bucket or container name (cloud kinds)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bucket: Option<String>,

    /// Key prefix applied to every object (object store kinds)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prefix: Option<String>,

    /// Base URL serving objects directly (object store kinds)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub public_base_url: Option<Url>,
}

impl StorageConfig {
    /// Local directory storage
    pub fn local<P: Into<PathBuf>>(root: P) -> Self {
        Self {
            kind: StorageKind::Local,
            root: Some(root.into()),
            ..Default::default()
        }
    }

    /// In-memory storage
    pub fn memory() -> Self {
        Self {
            kind: StorageKind::Memory,
            ..Default::default()
        }
    }

    /// Load storage configuration from environment variables
    ///
    /// # Environment Variables
    ///
    /// - `SATCHEL_STORAGE_KIND` - local, memory, object-store-local, s3, azure, gcs (default: local)
    /// - `SATCHEL_STORAGE_ROOT` - root directory for local kinds
    /// - `SATCHEL_STORAGE_BUCKET`, `SATCHEL_STORAGE_PREFIX` - cloud bucket and key prefix
    /// - `SATCHEL_PUBLIC_BASE_URL` - base of direct download links
    pub fn from_env() -> BackendResult<Self> {
        let kind = match std::env::var("SATCHEL_STORAGE_KIND") {
            Ok(kind) => kind.parse()?,
            Err(_) => StorageKind::default(),
        };

        let public_base_url = match std::env::var("SATCHEL_PUBLIC_BASE_URL") {
            Ok(raw) => Some(Url::parse(&raw).map_err(|e| BackendError::InvalidConfig {
                backend: kind.to_string(),
                message: format!("SATCHEL_PUBLIC_BASE_URL: {}", e),
            })?),
            Err(_) => None,
        };

        Ok(Self {
            kind,
            root: std::env::var("SATCHEL_STORAGE_ROOT").ok().map(PathBuf::from),
            bucket: std::env::var("SATCHEL_STORAGE_BUCKET").ok(),
            prefix: std::env::var("SATCHEL_STORAGE_PREFIX").ok(),
            public_base_url,
        })
    }

    fn require_root(&self) -> BackendResult<PathBuf> {
        self.root.clone().ok_or_else(|| BackendError::InvalidConfig {
            backend: self.kind.to_string(),
            message: "storage root directory not set".to_string(),
        })
    }

    #[cfg(any(feature = "s3", feature = "azure", feature = "gcs"))]
    fn require_bucket(&self) -> BackendResult<&str> {
        self.bucket
            .as_deref()
            .ok_or_else(|| BackendError::InvalidConfig {
                backend: self.kind.to_string(),
                message: "bucket not set".to_string(),
            })
    }

    /// Apply prefix and download base to an object store backend
    fn finish_object_store(&self, mut backend: ObjectStoreBackend) -> ObjectStoreBackend {
        if let Some(prefix) = &self.prefix {
            backend = backend.with_prefix(prefix.clone());
        }
        if let Some(base) = &self.public_base_url {
            backend = backend.with_public_base_url(base.clone());
        }
        backend
    }

    /// Construct the configured backend
    ///
    /// # Errors
    ///
    /// Returns `BackendError::InvalidConfig` when a required setting is
    /// missing or the kind needs a cargo feature this build lacks.
    pub fn build(&self) -> BackendResult<Arc<dyn Backend>> {
        match self.kind {
            StorageKind::Local => Ok(Arc::new(LocalBackend::new(self.require_root()?))),
            StorageKind::Memory => Ok(Arc::new(
                self.finish_object_store(ObjectStoreBackend::in_memory()),
            )),
            StorageKind::ObjectStoreLocal => {
                let root = self.require_root()?;
                std::fs::create_dir_all(&root)?;
                Ok(Arc::new(
                    self.finish_object_store(ObjectStoreBackend::local(&root)?),
                ))
            }

            #[cfg(feature = "s3")]
            StorageKind::S3 => Ok(Arc::new(
                self.finish_object_store(ObjectStoreBackend::s3(self.require_bucket()?)?),
            )),

            #[cfg(feature = "azure")]
            StorageKind::Azure => Ok(Arc::new(
                self.finish_object_store(ObjectStoreBackend::azure(self.require_bucket()?)?),
            )),

            #[cfg(feature = "gcs")]
            StorageKind::Gcs => Ok(Arc::new(
                self.finish_object_store(ObjectStoreBackend::gcs(self.require_bucket()?)?),
            )),

            #[allow(unreachable_patterns)]
            other => Err(BackendError::InvalidConfig {
                backend: other.to_string(),
                message: format!("satchel was built without the '{}' feature", other),
            }),
        }
    }
}
