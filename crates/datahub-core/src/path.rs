//! Resource path grammar
//!
//! A path is a '/'-separated list of entry names. A leading '/' anchors the
//! path at the root of the tree; otherwise it is relative to whatever entry
//! the caller resolves it from. The empty path names that anchor itself.

use tracing::debug;

use crate::error::{HubError, Result};

/// Upper bound (exclusive) on the byte length of one entry name
pub const MAX_ENTRY_NAME_BYTES: usize = 64;

/// Upper bound (exclusive) on the byte length of a whole path
pub const MAX_PATH_BYTES: usize = 80;

const ILLEGAL_CHARS: [char; 3] = ['.', '[', ']'];

/// Returns true if `path` breaks the path grammar
pub fn is_path_malformed(path: &str) -> bool {
    validate(path).is_err()
}

/// Check `path` against the path grammar
pub fn validate(path: &str) -> Result<()> {
    let bytes = path.as_bytes();
    if bytes.len() >= MAX_PATH_BYTES {
        return Err(malformed(path, "path too long"));
    }
    if let Some(c) = path.chars().find(|c| ILLEGAL_CHARS.contains(c)) {
        return Err(malformed(path, &format!("illegal character '{}'", c)));
    }

    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'/' {
            i += 1;
        }
        let name_len = bytes[i..]
            .iter()
            .position(|&b| b == b'/')
            .unwrap_or(bytes.len() - i);
        if name_len == 0 {
            return Err(malformed(path, "path element missing"));
        }
        if name_len >= MAX_ENTRY_NAME_BYTES {
            return Err(malformed(path, "path element too long"));
        }
        i += name_len;
    }
    Ok(())
}

fn malformed(path: &str, reason: &str) -> HubError {
    debug!(path = %path, reason, "Malformed resource path");
    HubError::MalformedPath(format!("{} in '{}'", reason, path))
}

/// True if the path starts at the root of the tree
pub fn is_absolute(path: &str) -> bool {
    path.starts_with('/')
}

/// Entry names of a path, without the separators
///
/// Callers validate first; empty segments are skipped here.
pub fn segments(path: &str) -> impl Iterator<Item = &str> {
    path.split('/').filter(|s| !s.is_empty())
}

/// Append `child` to `parent` with exactly one separator
pub fn join(parent: &str, child: &str) -> String {
    let child = child.trim_start_matches('/');
    if parent.ends_with('/') {
        format!("{}{}", parent, child)
    } else {
        format!("{}/{}", parent, child)
    }
}
