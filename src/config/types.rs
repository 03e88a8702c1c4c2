//! Configuration model.
//! - `Config` is the validated-on-demand runtime view of config.xml plus CLI overrides.
//! - `LogLevel` maps user-facing verbosity names onto tracing levels.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use crate::mover::ConflictPolicy;
use crate::plugin::{DirChainStrategy, PluginOptions};
use crate::regroup::RegroupMode;

/// Program-defined verbosity levels exposed to users/config.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogLevel {
    /// Only errors
    Quiet,
    /// One line per classified file (default)
    #[default]
    Normal,
    /// Decisions and pruning
    Info,
    /// Everything
    Debug,
}

impl LogLevel {
    /// Case-insensitive; accepts a few common aliases.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "quiet" | "error" | "none" => Some(LogLevel::Quiet),
            "normal" => Some(LogLevel::Normal),
            "info" | "verbose" => Some(LogLevel::Info),
            "debug" | "trace" => Some(LogLevel::Debug),
            _ => None,
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            LogLevel::Quiet => "quiet",
            LogLevel::Normal => "normal",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
        })
    }
}

impl FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s).ok_or_else(|| format!("invalid log level: '{s}' (quiet, normal, info, debug)"))
    }
}

/// A plugin reference: registered name plus its options.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PluginConfig {
    pub name: String,
    pub options: PluginOptions,
}

impl PluginConfig {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            options: PluginOptions::new(),
        }
    }

    pub fn with_option(mut self, key: &str, value: &str) -> Self {
        self.options
            .entry(key.to_string())
            .or_default()
            .push(value.to_string());
        self
    }

    /// The strategy used when none is configured.
    pub fn default_strategy() -> Self {
        Self::named(DirChainStrategy::NAME)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DestinationConfig {
    pub name: String,
    pub path: PathBuf,
    pub on_conflict: ConflictPolicy,
    pub filters: Vec<PluginConfig>,
    pub strategy: PluginConfig,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegroupConfig {
    pub path: PathBuf,
    pub mode: RegroupMode,
    pub strategy: PluginConfig,
    /// `None` uses the platform default.
    pub fallback: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Config {
    pub sources: Vec<PathBuf>,
    /// Evaluated in order; first match wins.
    pub destinations: Vec<DestinationConfig>,
    pub regroup: Option<RegroupConfig>,
    /// `<= 0` sizes the pool from the CPU count.
    pub max_workers: i64,
    pub log_level: LogLevel,
    pub log_file: Option<PathBuf>,
    /// Decide and report, but do not touch the filesystem.
    pub dry_run: bool,
}
