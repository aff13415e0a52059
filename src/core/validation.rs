/*!
 * Relative path validation
 */

use crate::error::{FileServiceError, Result};

/// Check a `/`-separated relative path
///
/// A path is valid when none of its segments is empty, `.` or `..`. Nothing
/// is normalised: `a//b`, `/a`, `a/` and `./a` are all rejected rather than
/// rewritten.
pub fn validate_path(path: &str) -> bool {
    path.split('/').all(validate_segment)
}

/// Check a single path segment (no `/` allowed)
pub fn validate_segment(segment: &str) -> bool {
    !matches!(segment, "" | "." | "..") && !segment.contains('/')
}

/// Like [`validate_path`], but fails with [`FileServiceError::InvalidPath`]
pub fn ensure_valid_path(path: &str) -> Result<()> {
    if validate_path(path) {
        Ok(())
    } else {
        Err(FileServiceError::invalid_path(path))
    }
}
