//! Verified copy-and-rename:
//! - Copies into a hidden temp sibling of the destination, hashing as it goes
//! - Fsyncs the temp file (io_copy::copy_hashing)
//! - Compares the copy's digest with the expected one
//! - Carries times and permissions over
//! - Atomically renames temp -> dest, replacing it only when asked to
//!
//! Every failure path removes the temp file; the source is never touched here.

use anyhow::{Context, Result, anyhow};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use super::atomic::{OnExisting, rename_file};
use super::helpers::io_error_with_help;
use super::io_copy::{self, CopyResult};
use super::{meta, util};
use crate::context::ContentHash;
use crate::errors::FlowError;

/// Removes the temp file on drop unless disarmed after the final rename.
struct TempGuard {
    path: PathBuf,
    armed: bool,
}

impl Drop for TempGuard {
    fn drop(&mut self) {
        if self.armed
            && let Err(e) = fs::remove_file(&self.path)
            && e.kind() != std::io::ErrorKind::NotFound
        {
            warn!(tmp = %self.path.display(), error = %e, "failed to remove temporary file");
        }
    }
}

/// Copy `src` to `dest` atomically. When `expected` is given, the copy must hash
/// to the same digest or the temp file is discarded with `HashMismatch`.
/// With `OnExisting::Fail` a destination that appeared meanwhile is kept and
/// the call fails with an `AlreadyExists` io::Error in its chain.
pub fn copy_atomic(
    src: &Path,
    dest: &Path,
    expected: Option<ContentHash>,
    on_existing: OnExisting,
) -> Result<CopyResult> {
    let dest_dir = dest
        .parent()
        .ok_or_else(|| anyhow!("destination has no parent: {}", dest.display()))?;

    fs::create_dir_all(dest_dir)
        .map_err(io_error_with_help("create destination directory", dest_dir))?;

    let src_meta = fs::metadata(src).map_err(io_error_with_help("stat source", src))?;

    let mut guard = TempGuard {
        path: util::unique_temp_path(dest_dir),
        armed: true,
    };

    let copied = io_copy::copy_hashing(src, &guard.path)
        .map_err(io_error_with_help("copy to temporary file", src))?;
    debug!(src = %src.display(), tmp = %guard.path.display(), bytes = copied.bytes, "copied to temp");

    if let Some(expected) = expected
        && expected != copied.hash
    {
        return Err(FlowError::HashMismatch {
            path: dest.to_path_buf(),
            expected: expected.to_hex(),
            actual: copied.hash.to_hex(),
        }
        .into());
    }

    meta::preserve_metadata(&src_meta, &guard.path)
        .with_context(|| format!("preserve metadata for {}", dest.display()))?;

    rename_file(&guard.path, dest, on_existing)
        .map_err(io_error_with_help("rename temporary file into", dest))?;
    guard.armed = false;

    Ok(copied)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn leftovers(dir: &Path) -> Vec<String> {
        fs::read_dir(dir)
            .unwrap()
            .filter_map(|e| e.ok())
            .map(|e| e.file_name().to_string_lossy().into_owned())
            .filter(|n| util::is_temp_name(n))
            .collect()
    }

    #[test]
    fn copies_into_new_directory() {
        let dir = tempdir().unwrap();
        let src = dir.path().join("a.txt");
        fs::write(&src, b"content").unwrap();
        let dest = dir.path().join("deep/er/a.txt");

        let res = copy_atomic(&src, &dest, None, OnExisting::Fail).unwrap();
        assert_eq!(res.bytes, 7);
        assert_eq!(fs::read(&dest).unwrap(), b"content");
        assert!(src.exists(), "copy must leave the source in place");
        assert!(leftovers(dest.parent().unwrap()).is_empty());
    }

    #[test]
    fn hash_mismatch_discards_temp_and_keeps_dest_absent() {
        let dir = tempdir().unwrap();
        let src = dir.path().join("a.txt");
        fs::write(&src, b"content").unwrap();
        let dest = dir.path().join("out/a.txt");
        let wrong = ContentHash::from_bytes([0u8; 32]);

        let err = copy_atomic(&src, &dest, Some(wrong), OnExisting::Fail).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<FlowError>(),
            Some(FlowError::HashMismatch { .. })
        ));
        assert!(!dest.exists());
        assert!(leftovers(dest.parent().unwrap()).is_empty());
    }

    #[test]
    fn replaces_existing_destination() {
        let dir = tempdir().unwrap();
        let src = dir.path().join("a.txt");
        let dest = dir.path().join("b.txt");
        fs::write(&src, b"new").unwrap();
        fs::write(&dest, b"old").unwrap();

        let expected = ContentHash::of_file(&src).unwrap();
        copy_atomic(&src, &dest, Some(expected), OnExisting::Replace).unwrap();
        assert_eq!(fs::read(&dest).unwrap(), b"new");
    }

    #[test]
    fn keeps_a_destination_that_appeared_first() {
        let dir = tempdir().unwrap();
        let src = dir.path().join("a.txt");
        let dest = dir.path().join("out/a.txt");
        fs::write(&src, b"ours").unwrap();
        fs::create_dir_all(dest.parent().unwrap()).unwrap();
        fs::write(&dest, b"theirs").unwrap();

        let err = copy_atomic(&src, &dest, None, OnExisting::Fail).unwrap_err();
        let kind = err
            .chain()
            .find_map(|c| c.downcast_ref::<std::io::Error>())
            .map(|e| e.kind());
        assert_eq!(kind, Some(std::io::ErrorKind::AlreadyExists));
        assert_eq!(fs::read(&dest).unwrap(), b"theirs");
        assert!(src.exists());
        assert!(leftovers(dest.parent().unwrap()).is_empty());
    }
}
