//! Checksum manifest model
//!
//! A manifest maps percent-encoded relative paths to lowercase SHA-256
//! digests. On storage it is a UTF-8 text file of `digest SP path` lines.

use crate::encoding::{decode_path, encode_path};
use crate::error::{Error, Result};
use std::collections::BTreeMap;
use std::fmt;

/// Prefix shared by every payload (data) file
pub const PAYLOAD_PREFIX: &str = "data/";

/// Hex length of a SHA-256 digest
pub const SHA256_HEX_LEN: usize = 64;

/// Which checksum ledger a file belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ManifestKind {
    /// `manifest-sha256.txt`, covers everything under `data/`
    Payload,
    /// `tagmanifest-sha256.txt`, covers every other file
    Tag,
}

impl ManifestKind {
    /// Object name of this manifest at the dataset version root
    pub fn file_name(&self) -> &'static str {
        match self {
            ManifestKind::Payload => "manifest-sha256.txt",
            ManifestKind::Tag => "tagmanifest-sha256.txt",
        }
    }

    /// Manifest responsible for a (fully prefixed) relative path
    pub fn for_path(path: &str) -> Self {
        if path.starts_with(PAYLOAD_PREFIX) {
            ManifestKind::Payload
        } else {
            ManifestKind::Tag
        }
    }

    /// Whether `path` names one of the manifest objects themselves
    pub fn is_manifest_file(path: &str) -> bool {
        path == ManifestKind::Payload.file_name() || path == ManifestKind::Tag.file_name()
    }
}

impl fmt::Display for ManifestKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ManifestKind::Payload => write!(f, "payload"),
            ManifestKind::Tag => write!(f, "tag"),
        }
    }
}

/// Checksum ledger for one dataset version and manifest kind
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Manifest {
    entries: BTreeMap<String, String>,
}

impl Manifest {
    /// Create an empty manifest
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse manifest text
    ///
    /// Each line is split at its first space. Blank lines and a trailing CR
    /// are ignored; digests are normalised to lowercase. A repeated path keeps
    /// the last digest.
    pub fn parse(content: &str) -> Result<Self> {
        let mut entries = BTreeMap::new();

        for (index, raw) in content.split('\n').enumerate() {
            let line = raw.strip_suffix('\r').unwrap_or(raw);
            if line.is_empty() {
                continue;
            }

            let (digest, path) = line
                .split_once(' ')
                .ok_or_else(|| Error::malformed_line(index + 1, line))?;

            if path.is_empty() {
                return Err(Error::malformed_line(index + 1, line));
            }

            entries.insert(path.to_string(), normalize_digest(digest)?);
        }

        Ok(Self { entries })
    }

    /// Serialize to manifest text (no trailing newline)
    pub fn to_manifest_string(&self) -> String {
        self.entries
            .iter()
            .map(|(path, digest)| format!("{} {}", digest, path))
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Set the digest for a (decoded) path, replacing any previous value
    pub fn insert(&mut self, path: &str, digest: &str) -> Result<Option<String>> {
        let digest = normalize_digest(digest)?;
        Ok(self.entries.insert(encode_path(path), digest))
    }

    /// Remove the entry for a (decoded) path
    pub fn remove(&mut self, path: &str) -> Option<String> {
        self.entries.remove(&encode_path(path))
    }

    /// Digest recorded for a (decoded) path
    pub fn get(&self, path: &str) -> Option<&str> {
        self.entries.get(&encode_path(path)).map(String::as_str)
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when the manifest has no entries
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries keyed by their encoded path, as written on disk
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries
            .iter()
            .map(|(path, digest)| (path.as_str(), digest.as_str()))
    }

    /// Entries with their paths decoded back to the original strings
    pub fn iter_decoded(&self) -> impl Iterator<Item = (String, &str)> + '_ {
        self.entries
            .iter()
            .map(|(path, digest)| (decode_path(path), digest.as_str()))
    }
}

/// Check that `digest` is 64 hex characters and lowercase it
pub fn normalize_digest(digest: &str) -> Result<String> {
    if digest.len() != SHA256_HEX_LEN || hex::decode(digest).is_err() {
        return Err(Error::invalid_digest(digest));
    }
    Ok(digest.to_ascii_lowercase())
}
