use std::path::{Component, Path, PathBuf};

use crate::error::{Error, Result};

/// Drop the first `count` segments of an archive entry path.
///
/// Empty and `.` segments are ignored. Paths with `..` segments, roots or
/// prefixes are rejected outright, before any stripping. Returns `None` when
/// nothing remains.
pub fn strip_components(entry: &Path, count: usize) -> Result<Option<PathBuf>> {
    let mut segments = Vec::new();
    for component in entry.components() {
        match component {
            Component::Normal(segment) => segments.push(segment),
            Component::CurDir => {}
            Component::ParentDir => {
                return Err(Error::UnsafePath {
                    entry: entry.to_path_buf(),
                    reason: "contains a parent directory segment",
                });
            }
            Component::RootDir | Component::Prefix(_) => {
                return Err(Error::UnsafePath {
                    entry: entry.to_path_buf(),
                    reason: "is absolute",
                });
            }
        }
    }

    if segments.len() <= count {
        return Ok(None);
    }
    Ok(Some(segments[count..].iter().collect()))
}

/// Resolve a stripped entry path under the destination root.
pub fn resolve(root: &Path, relative: Option<&Path>) -> PathBuf {
    match relative {
        Some(relative) => root.join(relative),
        None => root.to_path_buf(),
    }
}
