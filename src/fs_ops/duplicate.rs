//! Free-name search for the `rename` conflict policy.
//!
//! Appends `_N` (N = 1, 2, ...) before the extension until the name is free:
//! - "photo.jpg" -> "photo_1.jpg", "photo_2.jpg", ...
//! - ".env" -> ".env_1"
//! - "archive.tar.gz" -> "archive.tar_1.gz"
//!
//! The caller decides what "free" means: the mover claims a candidate and
//! checks the filesystem while holding the claim, then still creates the
//! target with a no-replace move.

use std::ffi::{OsStr, OsString};
use std::path::{Path, PathBuf};
use tracing::trace;

// Conservative filename limits (bytes/characters, platform-specific and approximate).
#[cfg(windows)]
const MAX_FILENAME_LEN: usize = 240;
#[cfg(not(windows))]
const MAX_FILENAME_LEN: usize = 255;

const MAX_TRIES: u64 = 100_000;

/// First `stem_N.ext` sibling of `taken` that `accept` agrees to take.
/// Candidates are offered in order, each at most once; None when every
/// candidate up to the search limit was rejected.
pub fn find_sibling<F>(taken: &Path, mut accept: F) -> Option<PathBuf>
where
    F: FnMut(&Path) -> bool,
{
    let dir = taken.parent().unwrap_or_else(|| Path::new(""));
    let name = taken.file_name()?;
    let base = Path::new(name);
    let stem: OsString = base
        .file_stem()
        .map(|s| s.to_os_string())
        .unwrap_or_else(|| name.to_os_string());
    let ext: Option<OsString> = base.extension().map(|e| e.to_os_string());

    for n in 1..=MAX_TRIES {
        let candidate = dir.join(build_name_with_suffix(&stem, ext.as_deref(), &format!("_{n}")));
        if accept(&candidate) {
            return Some(candidate);
        }
        if n == 3 {
            trace!(name = ?name, dir = %dir.display(), "multiple collisions while searching for a free name");
        }
    }
    None
}

#[cfg(unix)]
fn name_len_units(s: &OsStr) -> usize {
    use std::os::unix::ffi::OsStrExt;
    s.as_bytes().len()
}

#[cfg(not(unix))]
fn name_len_units(s: &OsStr) -> usize {
    s.to_string_lossy().len()
}

/// Truncate the stem if needed so `stem + suffix + ["." + ext]` fits MAX_FILENAME_LEN.
fn build_name_with_suffix(stem: &OsStr, ext: Option<&OsStr>, suffix: &str) -> OsString {
    let mut overhead = suffix.len();
    let mut ext_part = OsString::new();
    if let Some(e) = ext {
        overhead = overhead.saturating_add(1 + name_len_units(e));
        ext_part.push(".");
        ext_part.push(e);
    }

    let mut stem_os = stem.to_os_string();
    if name_len_units(&stem_os) + overhead > MAX_FILENAME_LEN {
        let budget = MAX_FILENAME_LEN.saturating_sub(overhead).max(1);
        let lossy = stem.to_string_lossy();
        let mut acc = String::new();
        for ch in lossy.chars() {
            if acc.len() + ch.len_utf8() > budget {
                break;
            }
            acc.push(ch);
        }
        if acc.is_empty() {
            acc.push('f');
        }
        stem_os = OsString::from(acc);
    }

    let mut new_name = stem_os;
    new_name.push(suffix);
    new_name.push(&ext_part);
    new_name
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn unique_sibling(taken: &Path) -> Option<PathBuf> {
        find_sibling(taken, |c| fs::symlink_metadata(c).is_err())
    }

    #[test]
    fn first_collision_gets_suffix_one() {
        let td = tempdir().unwrap();
        let taken = td.path().join("file.txt");
        fs::write(&taken, b"x").unwrap();
        assert_eq!(unique_sibling(&taken).unwrap(), td.path().join("file_1.txt"));
    }

    #[test]
    fn multiple_collisions_increment_suffix() {
        let td = tempdir().unwrap();
        for n in ["file.txt", "file_1.txt", "file_2.txt"] {
            fs::write(td.path().join(n), b"x").unwrap();
        }
        let got = unique_sibling(&td.path().join("file.txt")).unwrap();
        assert_eq!(got, td.path().join("file_3.txt"));
    }

    #[test]
    fn dotfile_and_multi_extension() {
        let td = tempdir().unwrap();
        assert_eq!(
            unique_sibling(&td.path().join(".env")).unwrap(),
            td.path().join(".env_1")
        );
        assert_eq!(
            unique_sibling(&td.path().join("archive.tar.gz")).unwrap(),
            td.path().join("archive.tar_1.gz")
        );
    }

    #[test]
    fn rejected_candidates_are_passed_over() {
        let td = tempdir().unwrap();
        let taken = td.path().join("file.txt");
        let mut offered = Vec::new();
        let got = find_sibling(&taken, |c| {
            offered.push(c.to_path_buf());
            !c.ends_with("file_1.txt")
        })
        .unwrap();
        assert_eq!(got, td.path().join("file_2.txt"));
        assert_eq!(offered.len(), 2);
    }

    #[test]
    fn long_names_are_truncated_to_fit() {
        let stem = "a".repeat(300);
        let name = build_name_with_suffix(OsStr::new(&stem), Some(OsStr::new("mkv")), "_12");
        let s = name.to_string_lossy();
        assert!(s.len() <= MAX_FILENAME_LEN);
        assert!(s.ends_with("_12.mkv"));
    }
}
