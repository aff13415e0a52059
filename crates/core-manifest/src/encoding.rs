//! Path encoding for manifest lines
//!
//! Manifest lines are `digest SP path`, so a path containing a line break
//! would split its own entry. Only `%`, LF and CR are escaped; everything
//! else is written literally.

/// Percent-encode a path for use as a manifest key
pub fn encode_path(path: &str) -> String {
    let mut encoded = String::with_capacity(path.len());
    for c in path.chars() {
        match c {
            '%' => encoded.push_str("%25"),
            '\n' => encoded.push_str("%0A"),
            '\r' => encoded.push_str("%0D"),
            other => encoded.push(other),
        }
    }
    encoded
}

/// Reverse [`encode_path`]
///
/// Accepts either hex case. Any other `%xx` sequence is left as-is, since
/// it can only have been written literally.
pub fn decode_path(encoded: &str) -> String {
    let mut decoded = String::with_capacity(encoded.len());
    let mut rest = encoded;

    while let Some(idx) = rest.find('%') {
        decoded.push_str(&rest[..idx]);
        let escape = rest.get(idx..idx + 3);
        let replacement = match escape {
            Some(e) if e.eq_ignore_ascii_case("%25") => Some('%'),
            Some(e) if e.eq_ignore_ascii_case("%0A") => Some('\n'),
            Some(e) if e.eq_ignore_ascii_case("%0D") => Some('\r'),
            _ => None,
        };

        match replacement {
            Some(c) => {
                decoded.push(c);
                rest = &rest[idx + 3..];
            }
            None => {
                decoded.push('%');
                rest = &rest[idx + 1..];
            }
        }
    }

    decoded.push_str(rest);
    decoded
}
