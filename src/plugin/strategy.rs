//! Built-in placement strategies: `dirchain` and `date`.

use anyhow::{Result, anyhow, bail};
use chrono::format::{Item, StrftimeItems};
use chrono::{DateTime, Local};
use std::fmt::Write as _;
use std::path::{Component, PathBuf};

use super::{PluginOptions, Strategy, StrategyContext, check_option_keys, option_single};
use crate::errors::FlowError;

/// Mirrors the file's directory relative to the source under the destination.
/// `src/a/b/x.jpg` -> `dest/a/b`; files at the source root land in `dest`.
#[derive(Debug, Default)]
pub struct DirChainStrategy;

impl DirChainStrategy {
    pub const NAME: &'static str = "dirchain";
}

impl Strategy for DirChainStrategy {
    fn selector(&self) -> &str {
        Self::NAME
    }

    fn load_config(&mut self, options: &PluginOptions) -> Result<()> {
        check_option_keys(Self::NAME, options, &[])
    }

    fn final_dir_path(&self, ctx: &StrategyContext<'_>) -> Result<PathBuf> {
        let parent = ctx
            .original_path
            .parent()
            .ok_or_else(|| anyhow!("'{}' has no parent directory", ctx.original_path.display()))?;
        let rel = parent.strip_prefix(ctx.source_dir).map_err(|_| {
            anyhow!(
                "'{}' is not inside source directory '{}'",
                ctx.original_path.display(),
                ctx.source_dir.display()
            )
        })?;
        if rel.components().any(|c| matches!(c, Component::ParentDir)) {
            bail!("'{}' escapes its source directory", ctx.original_path.display());
        }
        Ok(ctx.dest_dir.join(rel))
    }
}

/// Buckets files by modification time (local time zone).
#[derive(Debug)]
pub struct DateStrategy {
    format: String,
}

impl DateStrategy {
    pub const NAME: &'static str = "date";
    pub const DEFAULT_FORMAT: &'static str = "%Y/%m";
}

impl Default for DateStrategy {
    fn default() -> Self {
        Self {
            format: Self::DEFAULT_FORMAT.to_string(),
        }
    }
}

impl Strategy for DateStrategy {
    fn selector(&self) -> &str {
        Self::NAME
    }

    fn load_config(&mut self, options: &PluginOptions) -> Result<()> {
        check_option_keys(Self::NAME, options, &["format"])?;
        let format = option_single(Self::NAME, options, "format")?
            .filter(|f| !f.is_empty())
            .unwrap_or(Self::DEFAULT_FORMAT);
        if StrftimeItems::new(format).any(|item| matches!(item, Item::Error)) {
            return Err(FlowError::InvalidOption {
                plugin: Self::NAME.to_string(),
                message: format!("invalid date format {format:?}"),
            }
            .into());
        }
        self.format = format.to_string();
        Ok(())
    }

    fn final_dir_path(&self, ctx: &StrategyContext<'_>) -> Result<PathBuf> {
        let modified = ctx
            .file
            .modified()
            .ok_or_else(|| anyhow!("no modification time for '{}'", ctx.file.path().display()))?;
        let local: DateTime<Local> = modified.into();
        let mut bucket = String::new();
        write!(bucket, "{}", local.format(&self.format))
            .map_err(|_| anyhow!("cannot format date with {:?}", self.format))?;
        Ok(ctx.dest_dir.join(bucket))
    }
}
