//! Extension inventory of a directory tree, used to write `extensions` filters.
//!
//! Walks like a classification run does: symlinks are not followed and the
//! `PRUNED_DIR_NAMES` directories are skipped.

use anyhow::{Result, bail};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use tracing::debug;
use walkdir::WalkDir;

use crate::classifier::PRUNED_DIR_NAMES;
use crate::fs_ops::io_error_with_help;

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ExtensionListing {
    /// Distinct extensions with their leading dot, as spelled on disk, sorted.
    pub extensions: BTreeSet<String>,
    /// Regular files whose name has no extension.
    pub without_extension: Vec<PathBuf>,
}

pub fn list_extensions(root: &Path) -> Result<ExtensionListing> {
    let meta = std::fs::metadata(root).map_err(io_error_with_help("open directory", root))?;
    if !meta.is_dir() {
        bail!("'{}' is not a directory", root.display());
    }

    let mut listing = ExtensionListing::default();
    let walker = WalkDir::new(root)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| {
            let pruned = e.depth() > 0
                && e.file_type().is_dir()
                && e.file_name().to_str().is_some_and(|n| PRUNED_DIR_NAMES.contains(&n));
            if pruned {
                debug!(dir = %e.path().display(), "pruned");
            }
            !pruned
        });

    for entry in walker {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        match Path::new(entry.file_name()).extension() {
            Some(ext) => {
                listing.extensions.insert(format!(".{}", ext.to_string_lossy()));
            }
            None => listing.without_extension.push(entry.into_path()),
        }
    }
    Ok(listing)
}
