//! BagIt checksum manifests for Satchel
//!
//! Every dataset version carries two SHA-256 ledgers at its root:
//!
//! - **Payload manifest** (`manifest-sha256.txt`): files under `data/`
//! - **Tag manifest** (`tagmanifest-sha256.txt`): every other file
//!
//! This crate only models the ledgers (kinds, path encoding, text format).
//! Reading and writing them against a storage backend lives in the
//! `satchel` crate.
//!
//! # Example
//!
//! ```
//! use satchel_core_manifest::{Manifest, ManifestKind};
//!
//! let mut manifest = Manifest::new();
//! manifest
//!     .insert(
//!         "data/a.txt",
//!         "ca978112ca1bbdcafac231b39a23dc4da786eff8147c4e72b9807785afee48bb",
//!     )
//!     .unwrap();
//!
//! assert_eq!(ManifestKind::for_path("data/a.txt"), ManifestKind::Payload);
//! assert_eq!(Manifest::parse(&manifest.to_manifest_string()).unwrap(), manifest);
//! ```

pub mod encoding;
pub mod error;
pub mod manifest;

// Re-export main types for convenience
pub use encoding::{decode_path, encode_path};
pub use error::{Error, Result};
pub use manifest::{normalize_digest, Manifest, ManifestKind, PAYLOAD_PREFIX, SHA256_HEX_LEN};

/// Digest algorithm used by both manifests
pub const DIGEST_ALGORITHM: &str = "sha256";
