//! Filter and strategy extension points.
//!
//! A [`Filter`] decides whether a file belongs to a destination rule; a
//! [`Strategy`] computes the directory a matched file should land in. Both
//! are constructed by name through a [`PluginRegistry`] and configured from
//! string options before the run starts. After that they are shared
//! read-only between workers, hence the `Send + Sync` bounds.

use anyhow::Result;
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use crate::context::FileContext;
use crate::errors::FlowError;

pub mod filter;
pub mod registry;
pub mod strategy;

pub use filter::{ExtensionFilter, RegexFilter, ScriptFilter};
pub use registry::PluginRegistry;
pub use strategy::{DateStrategy, DirChainStrategy};

/// Plugin options: each key may be repeated, so every value is a list.
pub type PluginOptions = BTreeMap<String, Vec<String>>;

pub trait Filter: Send + Sync + fmt::Debug {
    /// Name the filter is registered under.
    fn selector(&self) -> &str;

    /// Apply options. Called once, before the filter is shared.
    fn load_config(&mut self, options: &PluginOptions) -> Result<()>;

    /// Pure decision. An `Err` is a failure for this file, not a non-match.
    fn matches(&self, file: &FileContext) -> Result<bool>;
}

/// Inputs of a placement decision.
#[derive(Debug, Clone, Copy)]
pub struct StrategyContext<'a> {
    /// The file as it is now (metadata, hash).
    pub file: &'a FileContext,
    /// Where the file was found during the walk.
    pub original_path: &'a Path,
    /// The source directory being walked.
    pub source_dir: &'a Path,
    /// Root of the tree the result must stay inside.
    pub dest_dir: &'a Path,
}

pub trait Strategy: Send + Sync + fmt::Debug {
    fn selector(&self) -> &str;

    fn load_config(&mut self, options: &PluginOptions) -> Result<()>;

    /// Target parent directory. Must not touch the filesystem.
    fn final_dir_path(&self, ctx: &StrategyContext<'_>) -> Result<PathBuf>;
}

/// Reject option keys a plugin does not understand.
pub(crate) fn check_option_keys(plugin: &str, options: &PluginOptions, known: &[&str]) -> Result<()> {
    if let Some(key) = options.keys().find(|k| !known.contains(&k.as_str())) {
        return Err(FlowError::InvalidOption {
            plugin: plugin.to_string(),
            message: format!("unknown option '{key}' (accepted: {})", known.join(", ")),
        }
        .into());
    }
    Ok(())
}

/// All values of `key`, splitting comma-separated entries and dropping blanks.
pub(crate) fn option_list(options: &PluginOptions, key: &str) -> Vec<String> {
    options
        .get(key)
        .into_iter()
        .flatten()
        .flat_map(|v| v.split(','))
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .collect()
}

/// The single value of `key`; more than one value is an error.
pub(crate) fn option_single<'a>(
    plugin: &str,
    options: &'a PluginOptions,
    key: &str,
) -> Result<Option<&'a str>> {
    match options.get(key).map(Vec::as_slice) {
        None | Some([]) => Ok(None),
        Some([one]) => Ok(Some(one.trim())),
        Some(_) => Err(FlowError::InvalidOption {
            plugin: plugin.to_string(),
            message: format!("option '{key}' accepts a single value"),
        }
        .into()),
    }
}

#[cfg(test)]
pub(crate) fn options(pairs: &[(&str, &str)]) -> PluginOptions {
    let mut out = PluginOptions::new();
    for (k, v) in pairs {
        out.entry(k.to_string()).or_default().push(v.to_string());
    }
    out
}
