//! Windows implementations of platform helpers.
//!
//! No ACL management: log files get default permissions. Symlinks require
//! developer mode or elevation, so regroup falls back to hard links and copies.

use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::Path;

pub const SYMLINKS_RELIABLE: bool = false;

pub fn open_log_file_secure_append(path: &Path) -> io::Result<File> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    OpenOptions::new().create(true).append(true).open(path)
}

pub fn symlink_file(target: &Path, link: &Path) -> io::Result<()> {
    std::os::windows::fs::symlink_file(target, link)
}
