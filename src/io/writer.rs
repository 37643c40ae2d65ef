//! Artifact writing.
//!
//! Each source gets its own folder under the output directory, named after
//! the source without its extension. File names are made unique across the
//! whole write by appending ` (2)`, ` (3)` and so on.

use crate::core::{ArtifactGroup, sanitize_key, strip_extension};
use crate::error::{IoError, Result};
use serde::Serialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};

const FALLBACK_FOLDER: &str = "results";

/// One file written by [`write_artifacts`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WrittenFile {
    /// Source the artifact came from.
    pub source_name: String,
    /// Full path of the written file.
    pub path: PathBuf,
    /// Bytes written.
    pub size: usize,
}

/// Writes bytes to a file, creating parent directories if needed.
///
/// # Errors
///
/// Returns an error if directory creation or file writing fails.
pub fn write_file<P: AsRef<Path>>(path: P, content: &[u8]) -> Result<()> {
    let path_ref = path.as_ref();

    if let Some(parent) = path_ref.parent()
        && !parent.exists()
    {
        std::fs::create_dir_all(parent).map_err(|e| IoError::DirectoryFailed {
            path: parent.to_string_lossy().to_string(),
            reason: e.to_string(),
        })?;
    }

    std::fs::write(path_ref, content).map_err(|e| IoError::WriteFailed {
        path: path_ref.to_string_lossy().to_string(),
        reason: e.to_string(),
    })?;

    Ok(())
}

/// Folder name for a source: extension stripped, then sanitized.
#[must_use]
pub fn folder_name(source_name: &str) -> String {
    let name = sanitize_key(&strip_extension(source_name));
    if name.is_empty() {
        FALLBACK_FOLDER.to_string()
    } else {
        name
    }
}

/// Returns `name`, or `name (i)` with the smallest `i >= 2` not yet used.
///
/// Path separators in `name` are replaced by `_`. The returned name is
/// recorded in `used`.
///
/// # Examples
///
/// ```
/// use pskit_bridge::io::unique_name;
/// use std::collections::HashSet;
///
/// let mut used = HashSet::new();
/// assert_eq!(unique_name("1abc.A.pdb", &mut used), "1abc.A.pdb");
/// assert_eq!(unique_name("1abc.A.pdb", &mut used), "1abc.A.pdb (2)");
/// ```
pub fn unique_name(name: &str, used: &mut HashSet<String>) -> String {
    let clean: String = name
        .split(['/', '\\'])
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join("_");
    if used.insert(clean.clone()) {
        return clean;
    }
    let mut i = 2;
    while used.contains(&format!("{clean} ({i})")) {
        i += 1;
    }
    let unique = format!("{clean} ({i})");
    used.insert(unique.clone());
    unique
}

/// Writes grouped artifacts below `out_dir`.
///
/// Returns the written files in group order.
///
/// # Errors
///
/// Returns an error if a directory cannot be created or a file cannot be
/// written. Files written before the failure are left in place.
pub fn write_artifacts<P: AsRef<Path>>(
    out_dir: P,
    groups: &[ArtifactGroup],
) -> Result<Vec<WrittenFile>> {
    let out_dir = out_dir.as_ref();
    let mut used = HashSet::new();
    let mut written = Vec::new();

    for group in groups {
        let folder = out_dir.join(folder_name(&group.source_name));
        for artifact in &group.items {
            let path = folder.join(unique_name(&artifact.filename, &mut used));
            write_file(&path, &artifact.bytes)?;
            tracing::debug!(path = %path.display(), size = artifact.bytes.len(), "artifact written");
            written.push(WrittenFile {
                source_name: group.source_name.clone(),
                path,
                size: artifact.bytes.len(),
            });
        }
    }

    tracing::info!(files = written.len(), out_dir = %out_dir.display(), "artifacts written");
    Ok(written)
}
