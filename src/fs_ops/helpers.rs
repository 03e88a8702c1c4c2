//! I/O error adapters.
//!
//! Enrich io::Error with the operation, the path and a platform-aware hint,
//! while keeping the original io::Error in the chain so error classification
//! (not_found / permission / ...) still sees its kind.
//!
//! Usage:
//!   fs::create_dir_all(dir).map_err(io_error_with_help("create dir", dir))?;

use std::io;
use std::path::Path;

/// Format a human-friendly message with op/path plus platform-aware hints.
fn build_message(op: &str, path: &Path, e: &io::Error) -> String {
    let mut msg = format!("{} '{}'", op, path.display());

    if let Some(code) = e.raw_os_error() {
        #[cfg(unix)]
        {
            match code {
                libc::EACCES | libc::EPERM => {
                    msg.push_str(": permission denied; check ownership and write permissions");
                }
                libc::EXDEV => {
                    msg.push_str(": cross-filesystem; atomic rename not possible");
                }
                libc::EBUSY => {
                    msg.push_str(": resource busy; ensure no other process is writing");
                }
                libc::ENOENT => {
                    msg.push_str(": path not found; it may have been removed during the run");
                }
                libc::EEXIST => {
                    msg.push_str(": already exists");
                }
                libc::ENOSPC => {
                    msg.push_str(": insufficient space on device");
                }
                libc::EROFS => {
                    msg.push_str(": read-only filesystem");
                }
                libc::ELOOP => {
                    msg.push_str(": too many symbolic link levels; possible symlink cycle");
                }
                libc::ENAMETOOLONG => {
                    msg.push_str(": filename or path too long");
                }
                libc::EMFILE | libc::ENFILE => {
                    msg.push_str(": too many open files; lower max_workers or raise limits");
                }
                _ => {}
            }
        }
        #[cfg(windows)]
        {
            match code {
                5 => msg.push_str(": access denied; check permissions"), // ERROR_ACCESS_DENIED
                17 => msg.push_str(": not same device; cross-filesystem move"), // ERROR_NOT_SAME_DEVICE
                32 => msg.push_str(": sharing violation; file is in use"), // ERROR_SHARING_VIOLATION
                2 | 3 => msg.push_str(": path not found"),
                80 | 183 => msg.push_str(": already exists"),
                112 => msg.push_str(": insufficient disk space"), // ERROR_DISK_FULL
                1314 => msg.push_str(": symlink privilege not held"), // ERROR_PRIVILEGE_NOT_HELD
                _ => {}
            }
        }
        msg.push_str(&format!(" [os code: {}]", code));
    } else {
        match e.kind() {
            io::ErrorKind::PermissionDenied => {
                msg.push_str(": permission denied; check ownership and write permissions");
            }
            io::ErrorKind::NotFound => {
                msg.push_str(": path not found");
            }
            io::ErrorKind::AlreadyExists => {
                msg.push_str(": already exists");
            }
            _ => {}
        }
    }

    msg
}

/// Adapter for anyhow::Result code.
/// Returns a closure for `.map_err(...)`; the io::Error stays as the root cause.
pub fn io_error_with_help<'a>(
    op: &'a str,
    path: &'a Path,
) -> impl FnOnce(io::Error) -> anyhow::Error + 'a {
    move |e: io::Error| {
        let msg = build_message(op, path, &e);
        anyhow::Error::new(e).context(msg)
    }
}
