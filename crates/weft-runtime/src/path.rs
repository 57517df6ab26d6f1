//! Relative path handling shared by the runtimes.

use weft_core::{Result, WeftError};

/// Normalize a path relative to the runtime root.
///
/// `.` components and repeated slashes are dropped. Empty paths, absolute
/// paths and `..` components are rejected.
pub fn normalize_relative(path: &str) -> Result<String> {
    if path.starts_with('/') || path.starts_with('\\') || has_drive_prefix(path) {
        return Err(WeftError::invalid_path(path, "path must be relative"));
    }

    let mut parts = Vec::new();
    for part in path.split(['/', '\\']) {
        match part {
            "" | "." => {}
            ".." => return Err(WeftError::invalid_path(path, "path escapes the root")),
            part if part.contains('\0') => {
                return Err(WeftError::invalid_path(path, "path contains a NUL byte"))
            }
            part => parts.push(part),
        }
    }

    if parts.is_empty() {
        return Err(WeftError::invalid_path(path, "path is empty"));
    }
    Ok(parts.join("/"))
}

/// Parent directory of a relative path, or `None` when it sits at the root.
pub fn parent_dir(path: &str) -> Option<&str> {
    let trimmed = path.trim_end_matches('/');
    let (parent, _) = trimmed.rsplit_once('/')?;
    let parent = parent.trim_end_matches('/');
    match parent {
        "" | "." => None,
        parent => Some(parent),
    }
}

fn has_drive_prefix(path: &str) -> bool {
    let bytes = path.as_bytes();
    bytes.len() >= 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':'
}
