//! Atomic rename helpers.
//! - Return the raw io::Error so callers can detect cross-device failures.
//! - `OnExisting::Replace`: on Windows, removes an existing destination first.
//! - `OnExisting::Fail`: never replaces; a taken destination is `AlreadyExists`.
//! - On Unix, best-effort fsync of the destination directory after rename.

use std::fs;
use std::io;
use std::path::Path;

use super::util;

/// Whether a rename may replace whatever already sits at the destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OnExisting {
    Replace,
    Fail,
}

/// Signature of the rename primitive; swapped out in tests to simulate EXDEV.
pub type RenameFn = fn(&Path, &Path, OnExisting) -> io::Result<()>;

/// Default `RenameFn`.
pub fn rename_file(src: &Path, dst: &Path, on_existing: OnExisting) -> io::Result<()> {
    match on_existing {
        OnExisting::Replace => try_atomic_move(src, dst),
        OnExisting::Fail => try_atomic_move_new(src, dst),
    }
}

pub fn try_atomic_move(src: &Path, dst: &Path) -> io::Result<()> {
    #[cfg(windows)]
    {
        if let Err(e) = fs::remove_file(dst)
            && e.kind() != io::ErrorKind::NotFound
        {
            return Err(e);
        }
    }

    fs::rename(src, dst)?;
    sync_parent(dst);
    Ok(())
}

/// Move `src` to `dst` only if `dst` does not exist.
///
/// Links the new name first and unlinks the old one after, so the existence
/// check and the creation are one step for the filesystem. A cross-device
/// pair fails with EXDEV from the link, like a plain rename would.
pub fn try_atomic_move_new(src: &Path, dst: &Path) -> io::Result<()> {
    match fs::hard_link(src, dst) {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::AlreadyExists || util::is_cross_device(&e) => {
            return Err(e);
        }
        Err(_) => return rename_if_absent(src, dst),
    }

    if let Err(e) = fs::remove_file(src) {
        // Leave exactly one name behind: the source.
        let _ = fs::remove_file(dst);
        return Err(e);
    }
    sync_parent(dst);
    Ok(())
}

// Filesystems without hard links (FAT, some network mounts).
fn rename_if_absent(src: &Path, dst: &Path) -> io::Result<()> {
    match fs::symlink_metadata(dst) {
        Ok(_) => Err(io::Error::new(
            io::ErrorKind::AlreadyExists,
            format!("'{}' already exists", dst.display()),
        )),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            fs::rename(src, dst)?;
            sync_parent(dst);
            Ok(())
        }
        Err(e) => Err(e),
    }
}

fn sync_parent(dst: &Path) {
    if let Some(parent) = dst.parent() {
        // A failed directory fsync must not turn a completed rename into an error.
        let _ = util::fsync_dir(parent);
    }
}
