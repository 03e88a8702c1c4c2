//! Config validation.
//! Checks that sources are readable directories, that destination and regroup
//! roots are (or can become) writable directories, and that no output root
//! is also a source.

use anyhow::{Context, Result, bail};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use super::types::Config;
use crate::errors::FlowError;
use crate::fs_ops::unique_temp_path;

impl Config {
    /// Filesystem checks. Outside dry-run, missing output roots are created.
    pub fn validate(&self) -> Result<()> {
        if self.sources.is_empty() {
            return Err(FlowError::NoSources.into());
        }
        if self.destinations.is_empty() {
            return Err(FlowError::NoDestinations.into());
        }

        for src in &self.sources {
            ensure_readable_dir(src, "source_dir")?;
        }
        for dest in &self.destinations {
            ensure_output_dir(&dest.path, &format!("dest_dir '{}'", dest.name), self.dry_run)?;
        }
        if let Some(rg) = &self.regroup {
            ensure_output_dir(&rg.path, "regroup", self.dry_run)?;
        }

        let sources: Vec<PathBuf> = self.sources.iter().map(|s| real_path(s)).collect();
        for dest in &self.destinations {
            if sources.contains(&real_path(&dest.path)) {
                return Err(FlowError::SourceIsDestination(dest.path.clone()).into());
            }
        }

        info!(
            sources = self.sources.len(),
            destinations = self.destinations.len(),
            regroup = self.regroup.is_some(),
            "config validated"
        );
        Ok(())
    }
}

/// Canonical form when the path exists, the path itself otherwise.
fn real_path(path: &Path) -> PathBuf {
    dunce::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}

fn ensure_readable_dir(path: &Path, name: &str) -> Result<()> {
    let meta = fs::metadata(path)
        .with_context(|| format!("{name} '{}' does not exist or cannot be read", path.display()))?;
    if !meta.is_dir() {
        bail!("{name} '{}' is not a directory", path.display());
    }
    fs::read_dir(path)
        .with_context(|| format!("cannot list {name} '{}'; check permissions", path.display()))?;
    Ok(())
}

/// Existing directory -> must be writable. Missing -> created (or, in
/// dry-run, its nearest existing ancestor must be writable).
fn ensure_output_dir(path: &Path, name: &str, dry_run: bool) -> Result<()> {
    if path.exists() {
        if !path.is_dir() {
            bail!("{name} '{}' exists but is not a directory", path.display());
        }
        return writable_probe(path, name);
    }
    if dry_run {
        let Some(existing) = path.ancestors().skip(1).find(|a| a.is_dir()) else {
            bail!("{name} '{}' has no existing parent directory", path.display());
        };
        return writable_probe(existing, name);
    }
    fs::create_dir_all(path)
        .with_context(|| format!("create {name} directory '{}'", path.display()))?;
    info!(dir = %path.display(), "created {name} directory");
    writable_probe(path, name)
}

/// Create and remove a hidden file; proves write access without leaving traces.
fn writable_probe(dir: &Path, name: &str) -> Result<()> {
    let probe = unique_temp_path(dir);
    fs::OpenOptions::new()
        .create_new(true)
        .write(true)
        .open(&probe)
        .with_context(|| format!("cannot write to {name} '{}'; check permissions", dir.display()))?;
    let _ = fs::remove_file(&probe);
    debug!(dir = %dir.display(), "writable");
    Ok(())
}
