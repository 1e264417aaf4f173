//! Archive installation.
//!
//! Uploaded extension packages arrive as zip archives. Extraction is
//! done in a staging directory created inside the extensions root (same
//! filesystem, so the final move is a rename), entry paths are checked
//! against traversal, and a single wrapping folder is unwrapped so both
//! `pkg.zip/functions.so` and `pkg.zip/pkg/functions.so` layouts land in
//! the same place.

use std::fs::File;
use std::io;
use std::path::{Component, Path, PathBuf};

use tempfile::TempDir;
use zip::ZipArchive;

use crate::extension_system::error::{ExtResult, ExtensionSystemError};

/// An extracted archive, staged but not yet installed.
///
/// Dropping this before [`into_parts`](Self::into_parts) is called
/// removes the staging directory.
#[derive(Debug)]
pub struct StagedArchive {
    staging: TempDir,
    /// Directory holding the package content (the staging root, or the
    /// single wrapping folder inside it).
    content: PathBuf,
}

impl StagedArchive {
    pub fn content_dir(&self) -> &Path {
        &self.content
    }

    /// Keep the staging directory on disk and return the content path.
    /// The caller takes over cleanup of the returned staging root.
    pub fn into_parts(self) -> (PathBuf, PathBuf) {
        let content = self.content.clone();
        (self.staging.into_path(), content)
    }
}

/// Extract `archive_path` into a staging directory under `root`.
///
/// Runs the blocking zip work on the blocking pool. The archive file
/// itself is left in place; callers remove it once installation is
/// settled.
pub async fn extract_archive(archive_path: &Path, root: &Path) -> ExtResult<StagedArchive> {
    let archive_path = archive_path.to_path_buf();
    let root = root.to_path_buf();
    tokio::task::spawn_blocking(move || extract_blocking(&archive_path, &root))
        .await
        .map_err(|e| ExtensionSystemError::Archive {
            path: PathBuf::new(),
            message: format!("extraction task failed: {e}"),
        })?
}

fn extract_blocking(archive_path: &Path, root: &Path) -> ExtResult<StagedArchive> {
    let staging = TempDir::with_prefix_in(".staging-", root).map_err(|e| {
        ExtensionSystemError::io(e, "creating staging dir", root.to_path_buf())
    })?;

    let file = File::open(archive_path).map_err(|e| {
        ExtensionSystemError::io(e, "opening archive", archive_path.to_path_buf())
    })?;
    let mut archive = ZipArchive::new(file).map_err(|e| ExtensionSystemError::Archive {
        path: archive_path.to_path_buf(),
        message: format!("not a readable zip archive: {e}"),
    })?;

    for index in 0..archive.len() {
        let mut entry = archive.by_index(index).map_err(|e| ExtensionSystemError::Archive {
            path: archive_path.to_path_buf(),
            message: format!("reading entry {index}: {e}"),
        })?;

        // enclosed_name rejects absolute paths and `..` components.
        let Some(relative) = entry.enclosed_name().map(|p| p.to_path_buf()) else {
            return Err(ExtensionSystemError::Archive {
                path: archive_path.to_path_buf(),
                message: format!("entry '{}' escapes the archive root", entry.name()),
            });
        };
        debug_assert!(relative
            .components()
            .all(|c| matches!(c, Component::Normal(_))));

        let target = staging.path().join(&relative);
        if entry.is_dir() {
            std::fs::create_dir_all(&target)
                .map_err(|e| ExtensionSystemError::io(e, "creating archive dir", target))?;
            continue;
        }
        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                ExtensionSystemError::io(e, "creating archive dir", parent.to_path_buf())
            })?;
        }
        let mut out = File::create(&target)
            .map_err(|e| ExtensionSystemError::io(e, "creating archive file", target.clone()))?;
        io::copy(&mut entry, &mut out)
            .map_err(|e| ExtensionSystemError::io(e, "writing archive file", target.clone()))?;
    }

    let content = unwrap_single_folder(staging.path())?;
    Ok(StagedArchive { staging, content })
}

/// If the staging root holds exactly one directory and nothing else, the
/// package was zipped with a wrapping folder; descend into it.
fn unwrap_single_folder(staging_root: &Path) -> ExtResult<PathBuf> {
    let mut entries = Vec::new();
    let read_dir = std::fs::read_dir(staging_root).map_err(|e| {
        ExtensionSystemError::io(e, "listing staging dir", staging_root.to_path_buf())
    })?;
    for entry in read_dir {
        let entry = entry.map_err(|e| {
            ExtensionSystemError::io(e, "listing staging dir", staging_root.to_path_buf())
        })?;
        entries.push(entry.path());
    }

    match entries.as_slice() {
        [single] if single.is_dir() => Ok(single.clone()),
        _ => Ok(staging_root.to_path_buf()),
    }
}
