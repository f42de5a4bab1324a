//! All-or-nothing file replacement.
//!
//! [`write_atomic`] writes to a temporary file created next to the target
//! and renames it into place, so readers see either the old file or the new
//! one and never a partial write. The temporary file is owned by a
//! [`tempfile::NamedTempFile`], which deletes it when dropped; every exit
//! that does not end in a successful rename therefore cleans it up.

use std::fs;
use std::io::Write;
use std::path::Path;

use crate::error::{Result, StorageIoError};

/// Prefix of temporary files created beside shard files.
pub const TEMP_PREFIX: &str = ".shardline-";

/// Permission bits applied to every shard file after a write.
#[cfg(unix)]
pub const FILE_MODE: u32 = 0o644;

/// Atomically replaces `path` with `contents`.
///
/// The parent directory must already exist. Permissions of the target are
/// normalized afterwards whether or not the write succeeded.
///
/// # Errors
///
/// Returns [`StorageIoError`] if the temporary file cannot be created,
/// written, or synced, or if the rename fails. The target's contents are
/// untouched in every error case.
pub fn write_atomic(path: &Path, contents: &[u8]) -> Result<()> {
    let result = replace(path, contents);
    normalize_permissions(path);
    result
}

fn replace(path: &Path, contents: &[u8]) -> Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    let mut temp = tempfile::Builder::new()
        .prefix(TEMP_PREFIX)
        .tempfile_in(dir)
        .map_err(|e| StorageIoError::CreateTemp {
            dir: dir.to_path_buf(),
            source: e,
        })?;

    temp.write_all(contents)
        .and_then(|()| temp.as_file().sync_all())
        .map_err(|e| StorageIoError::Write {
            path: temp.path().to_path_buf(),
            source: e,
        })?;

    // A failed persist hands the temp file back inside the error; dropping
    // it removes the file.
    temp.persist(path).map_err(|e| StorageIoError::Rename {
        path: path.to_path_buf(),
        source: e.error,
    })?;

    // Make the rename itself durable. Not every platform can open a directory.
    if let Err(e) = fs::File::open(dir).and_then(|handle| handle.sync_all()) {
        tracing::debug!(dir = %dir.display(), error = %e, "could not sync directory");
    }

    Ok(())
}

#[cfg(unix)]
fn normalize_permissions(path: &Path) {
    use std::os::unix::fs::PermissionsExt;

    if !path.is_file() {
        return;
    }
    if let Err(e) = fs::set_permissions(path, fs::Permissions::from_mode(FILE_MODE)) {
        tracing::debug!(path = %path.display(), error = %e, "could not normalize permissions");
    }
}

#[cfg(not(unix))]
fn normalize_permissions(_path: &Path) {}
