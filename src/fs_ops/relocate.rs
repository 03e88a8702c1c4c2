//! Move a file to an exact destination path.
//!
//! Rename first. Only a cross-device failure switches to the verified copy
//! path (copy + hash check + atomic rename), after which the source is deleted.
//! Any other rename failure is returned as is, with the source untouched.
//!
//! When a cross-device relocation may replace the destination, the old file is
//! set aside first and put back if the copy or the source removal fails.

use anyhow::Result;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use super::atomic::{OnExisting, RenameFn, try_atomic_move};
use super::copy::copy_atomic;
use super::helpers::io_error_with_help;
use super::util::{is_cross_device, unique_temp_path};
use crate::context::FileContext;
use crate::stats::Stats;

/// How the data reached its destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Via {
    Rename,
    Copy,
}

#[derive(Debug)]
pub struct Relocated {
    /// Context for the file at its new path.
    pub file: FileContext,
    pub via: Via,
}

/// Relocate `file` to `dest` using `rename` as the fast path.
/// The source context is consumed; on success the returned context describes `dest`.
pub fn relocate_with(
    file: FileContext,
    dest: &Path,
    rename: RenameFn,
    on_existing: OnExisting,
    stats: &Stats,
) -> Result<Relocated> {
    let src = file.path().to_path_buf();

    let err = match rename(&src, dest, on_existing) {
        Ok(()) => {
            stats.decision_same_fs();
            stats.op_rename();
            debug!(src = %src.display(), dest = %dest.display(), "renamed");
            return Ok(Relocated {
                file: file.relocated(dest.to_path_buf())?,
                via: Via::Rename,
            });
        }
        Err(e) => e,
    };

    if !is_cross_device(&err) {
        return Err(io_error_with_help("rename", &src)(err));
    }

    stats.decision_cross_fs();
    debug!(src = %src.display(), dest = %dest.display(), "cross-device rename; copying instead");

    let expected = file.hash_tracked(stats)?;
    let aside = match on_existing {
        OnExisting::Replace => set_aside(dest)?,
        OnExisting::Fail => None,
    };

    let copied = match copy_atomic(&src, dest, Some(expected), OnExisting::Fail) {
        Ok(copied) => copied,
        Err(e) => {
            put_back(aside.as_deref(), dest);
            return Err(e);
        }
    };
    stats.hash_verified();
    stats.op_copy();

    if let Err(e) = fs::remove_file(&src) {
        // Undo the copy so the run does not leave two live copies behind.
        if let Err(undo) = fs::remove_file(dest) {
            warn!(dest = %dest.display(), error = %undo, "could not remove copy after failed source removal");
        }
        put_back(aside.as_deref(), dest);
        return Err(io_error_with_help("remove source after copy", &src)(e));
    }
    stats.op_delete();

    if let Some(old) = aside
        && let Err(e) = fs::remove_file(&old)
    {
        warn!(path = %old.display(), error = %e, "could not remove replaced destination");
    }

    drop(file);
    Ok(Relocated {
        file: FileContext::with_hash(dest, copied.hash)?,
        via: Via::Copy,
    })
}

/// Rename an existing `dest` to a hidden sibling; None when nothing is there.
fn set_aside(dest: &Path) -> Result<Option<PathBuf>> {
    match fs::symlink_metadata(dest) {
        Ok(_) => {}
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(io_error_with_help("stat destination", dest)(e)),
    }
    let dir = dest.parent().unwrap_or_else(|| Path::new("."));
    let aside = unique_temp_path(dir);
    try_atomic_move(dest, &aside)
        .map_err(io_error_with_help("set aside existing destination", dest))?;
    debug!(dest = %dest.display(), aside = %aside.display(), "existing destination set aside");
    Ok(Some(aside))
}

fn put_back(aside: Option<&Path>, dest: &Path) {
    if let Some(aside) = aside
        && let Err(e) = try_atomic_move(aside, dest)
    {
        warn!(
            dest = %dest.display(),
            aside = %aside.display(),
            error = %e,
            "could not restore the replaced destination"
        );
    }
}
