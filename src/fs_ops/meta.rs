//! Metadata preservation for copies.
//! Carries modification/access times and permission bits from source to copy,
//! so a copied file is indistinguishable from a renamed one to date-based strategies.

use anyhow::Result;
use filetime::{FileTime, set_file_times};
use std::fs;
use std::path::Path;
use tracing::debug;

use super::helpers::io_error_with_help;

pub fn preserve_metadata(src_meta: &fs::Metadata, dest: &Path) -> Result<()> {
    let mtime = FileTime::from_last_modification_time(src_meta);
    let atime = FileTime::from_last_access_time(src_meta);
    set_file_times(dest, atime, mtime).map_err(io_error_with_help("set file times", dest))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mode = src_meta.permissions().mode() & 0o7777;
        if let Err(e) = fs::set_permissions(dest, fs::Permissions::from_mode(mode)) {
            // Ownership rules can forbid setuid/setgid bits; the data is already safe.
            debug!(dest = %dest.display(), error = %e, "could not copy permission bits");
        }
    }
    #[cfg(not(unix))]
    {
        if src_meta.permissions().readonly() {
            let mut perms = fs::metadata(dest)
                .map_err(io_error_with_help("stat copy", dest))?
                .permissions();
            perms.set_readonly(true);
            if let Err(e) = fs::set_permissions(dest, perms) {
                debug!(dest = %dest.display(), error = %e, "could not mark copy read-only");
            }
        }
    }

    Ok(())
}
