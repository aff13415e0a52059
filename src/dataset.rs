/*!
 * Dataset version namespaces, file types and stored-file descriptors
 */

use crate::backend::Metadata;
use crate::core::validation::validate_segment;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use url::Url;

/// Storage namespace of one dataset version
///
/// Equality is exact and case-sensitive on both fields.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DatasetVersion {
    /// Dataset identifier
    pub dataset_identifier: String,

    /// Version number within the dataset
    pub version_number: String,
}

impl DatasetVersion {
    /// Create a new dataset version identifier
    pub fn new(dataset_identifier: impl Into<String>, version_number: impl Into<String>) -> Self {
        Self {
            dataset_identifier: dataset_identifier.into(),
            version_number: version_number.into(),
        }
    }

    /// Both components are usable as a single path segment
    pub fn is_valid(&self) -> bool {
        validate_segment(&self.dataset_identifier) && validate_segment(&self.version_number)
    }
}

impl fmt::Display for DatasetVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.dataset_identifier, self.version_number)
    }
}

/// Kind of file stored in a dataset version
///
/// The variant decides the top-level directory of the file and, through it,
/// which manifest records its checksum.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum FileType {
    /// Payload file, stored under `data/`
    Data,

    /// Descriptive file, stored under `documentation/`
    Documentation,
}

impl FileType {
    /// Top-level directory for this file type
    pub fn prefix(&self) -> &'static str {
        match self {
            FileType::Data => "data",
            FileType::Documentation => "documentation",
        }
    }

    /// Prefix a caller-supplied relative path with this type's directory
    pub fn qualify(&self, path: &str) -> String {
        format!("{}/{}", self.prefix(), path)
    }
}

impl fmt::Display for FileType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.prefix())
    }
}

/// Descriptor of a file stored in a dataset version
///
/// Serializes as an RO-Crate `File` entity.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredFile {
    /// Path relative to the dataset version root (e.g. `data/a.txt`)
    #[serde(rename = "@id")]
    pub path: String,

    /// Size in bytes
    pub content_size: u64,

    /// MIME type, when known
    #[serde(rename = "encodingFormat", skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub date_created: Option<DateTime<Utc>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub date_modified: Option<DateTime<Utc>>,

    /// Lowercase hex SHA-256, populated only when known from a manifest or upload
    pub sha256: Option<String>,

    /// Direct download link for backends that can provide one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<Url>,
}

impl StoredFile {
    /// Build a descriptor from backend metadata (no checksum, no url)
    pub fn from_metadata(path: impl Into<String>, metadata: &Metadata) -> Self {
        Self {
            path: path.into(),
            content_size: metadata.size,
            content_type: metadata.content_type.clone(),
            date_created: metadata.created.map(DateTime::<Utc>::from),
            date_modified: metadata.modified.map(DateTime::<Utc>::from),
            sha256: None,
            url: None,
        }
    }

    /// Builder pattern: set checksum
    pub fn with_sha256(mut self, sha256: Option<String>) -> Self {
        self.sha256 = sha256;
        self
    }

    /// Builder pattern: set download url
    pub fn with_url(mut self, url: Option<Url>) -> Self {
        self.url = url;
        self
    }

    /// JSON value including the RO-Crate `@type` marker
    pub fn to_ro_crate_json(&self) -> serde_json::Value {
        let mut value = serde_json::to_value(self).unwrap_or(serde_json::Value::Null);
        if let Some(map) = value.as_object_mut() {
            map.insert("@type".to_string(), serde_json::Value::from("File"));
        }
        value
    }
}
