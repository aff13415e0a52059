/*!
 * Core building blocks shared by the storage pipeline
 */

pub mod checksum;
pub mod validation;

pub use checksum::{sha256_hex, ContentDigest, HashingReader, StreamingHasher};
pub use validation::{ensure_valid_path, validate_path, validate_segment};
