//! Destination writability checks.
//!
//! Run during validation so that an unwritable output aborts the batch
//! before anything is written.

use std::fs::OpenOptions;
use std::path::Path;

use gps2shp_shared::{Gps2ShpError, Result};
use tracing::debug;

/// Check that `path` can be created or replaced.
///
/// The parent directory must exist and accept new files, since outputs are
/// written to a temp file and renamed into place. An existing file
/// must be a writable regular file, and is refused outright when
/// `overwrite` is false. Nothing is left behind on disk.
pub fn check_destination(path: &Path, overwrite: bool) -> Result<()> {
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };

    let parent_meta = std::fs::metadata(parent).map_err(|e| {
        let reason = format!("directory {} is unavailable: {e}", parent.display());
        Gps2ShpError::unwritable(path, reason)
    })?;
    if !parent_meta.is_dir() {
        return Err(Gps2ShpError::unwritable(
            path,
            format!("{} is not a directory", parent.display()),
        ));
    }

    match std::fs::symlink_metadata(path) {
        Ok(meta) => check_existing(path, &meta, overwrite)?,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => {
            return Err(Gps2ShpError::unwritable(path, format!("cannot inspect: {e}")));
        }
    }

    // Replacing an existing file still needs a temp file beside it.
    probe_directory(parent, path)?;

    debug!(path = %path.display(), "destination is writable");
    Ok(())
}

fn check_existing(path: &Path, meta: &std::fs::Metadata, overwrite: bool) -> Result<()> {
    if meta.is_dir() {
        return Err(Gps2ShpError::unwritable(path, "a directory exists at this path"));
    }
    if !overwrite {
        return Err(Gps2ShpError::unwritable(
            path,
            "file already exists and overwriting is disabled",
        ));
    }
    if meta.permissions().readonly() {
        return Err(Gps2ShpError::unwritable(path, "existing file is read-only"));
    }
    // Opening for append neither truncates nor modifies the file.
    OpenOptions::new()
        .append(true)
        .open(path)
        .map(|_| ())
        .map_err(|e| {
            let reason = format!("existing file cannot be opened for writing: {e}");
            Gps2ShpError::unwritable(path, reason)
        })
}

/// Create and remove a hidden probe file to confirm the directory accepts writes.
fn probe_directory(dir: &Path, path: &Path) -> Result<()> {
    let probe = dir.join(format!(".gps2shp-probe-{}", uuid::Uuid::now_v7()));
    match OpenOptions::new().write(true).create_new(true).open(&probe) {
        Ok(file) => {
            drop(file);
            let _ = std::fs::remove_file(&probe);
            Ok(())
        }
        Err(e) => Err(Gps2ShpError::unwritable(
            path,
            format!("cannot create files in {}: {e}", dir.display()),
        )),
    }
}
