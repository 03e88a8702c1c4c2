//! CLI definition and parsing.
//!
//! Flags override values from config.xml; `--debug` is shorthand for
//! `--log-level debug`.

use clap::{Parser, ValueHint};
use std::path::PathBuf;

use crate::config::types::{Config, LogLevel};

/// Sort files from source trees into destination folders.
#[derive(Parser, Debug, Clone, Default)]
#[command(author, version, about = "Classify files into destination folders by rules")]
pub struct Args {
    /// Config file (default: $FOLDER_FLOW_CONFIG, then the OS config dir).
    #[arg(long, short = 'c', value_name = "PATH", value_hint = ValueHint::FilePath)]
    pub config: Option<PathBuf>,

    /// Decide and report every action without touching the filesystem.
    #[arg(long)]
    pub dry_run: bool,

    /// Concurrent file tasks; 0 picks a value from the CPU count.
    #[arg(long, value_name = "N", allow_negative_numbers = true)]
    pub max_workers: Option<i64>,

    /// Log level: quiet, normal, info, debug.
    #[arg(long, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    /// Shorthand for --log-level debug.
    #[arg(short = 'd', long)]
    pub debug: bool,

    /// Emit logs as structured JSON.
    #[arg(long)]
    pub json: bool,

    /// Also write the run statistics as JSON to this file.
    #[arg(long, value_name = "PATH", value_hint = ValueHint::FilePath)]
    pub stats_json: Option<PathBuf>,

    /// Print the registered filters and strategies, then exit.
    #[arg(long)]
    pub list_plugins: bool,

    /// Print which config file would be used, then exit.
    #[arg(long)]
    pub print_config: bool,

    /// Print every file extension found under DIR, one per line, then exit.
    #[arg(long, value_name = "DIR", value_hint = ValueHint::DirPath)]
    pub list_extensions: Option<PathBuf>,
}

impl Args {
    /// `--debug` wins over `--log-level`.
    pub fn effective_log_level(&self) -> Option<LogLevel> {
        if self.debug {
            Some(LogLevel::Debug)
        } else {
            self.log_level
        }
    }

    /// Apply flags on top of a loaded config. Unset flags leave it unchanged.
    pub fn apply_overrides(&self, cfg: &mut Config) {
        if let Some(level) = self.effective_log_level() {
            cfg.log_level = level;
        }
        if let Some(n) = self.max_workers {
            cfg.max_workers = n;
        }
        if self.dry_run {
            cfg.dry_run = true;
        }
    }
}

pub fn parse() -> Args {
    Args::parse()
}
