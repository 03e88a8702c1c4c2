//! Platform-specific helpers.
//! Log file opening and link creation differ between Unix and Windows; the
//! rest of the crate only sees this uniform surface.

#[cfg(unix)]
mod unix;
#[cfg(not(unix))]
mod windows;

#[cfg(unix)]
pub use unix::{SYMLINKS_RELIABLE, open_log_file_secure_append, symlink_file};

#[cfg(not(unix))]
pub use windows::{SYMLINKS_RELIABLE, open_log_file_secure_append, symlink_file};
