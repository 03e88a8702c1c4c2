//! Core library for `folder_flow`.
//!
//! Scans source trees, matches every file against ordered destination rules
//! (filters), places it with a strategy, relocates it atomically under a
//! conflict policy and optionally mirrors it into a regroup tree.
//!
//! ```no_run
//! use folder_flow::{Classifier, DestinationRule, PluginRegistry, PluginOptions};
//!
//! # fn main() -> anyhow::Result<()> {
//! let registry = PluginRegistry::with_builtins();
//! let mut opts = PluginOptions::new();
//! opts.insert("extensions".into(), vec!["jpg".into(), "png".into()]);
//!
//! let images = DestinationRule::new(
//!     "images",
//!     "/data/images",
//!     registry.new_strategy("date", &PluginOptions::new())?,
//! )
//! .with_filter(registry.new_filter("extensions", &opts)?);
//!
//! let report = Classifier::new(vec!["/data/inbox".into()], vec![images])?.classify()?;
//! println!("{}", report.stats);
//! # Ok(())
//! # }
//! ```

pub mod classifier;
pub mod cli;
pub mod config;
pub mod context;
pub mod errors;
pub mod fs_ops;
pub mod listing;
pub mod mover;
pub mod output;
pub mod platform;
pub mod plugin;
pub mod pool;
pub mod regroup;
pub mod shutdown;
pub mod stats;

pub use classifier::{Classifier, DestinationRule, RunReport};
pub use config::{Config, LogLevel};
pub use context::{ContentHash, FileContext};
pub use errors::{ErrorKind, FlowError, RunError, SourceFailure};
pub use listing::{ExtensionListing, list_extensions};
pub use mover::{ConflictPolicy, MoveAction, MoveOutcome, Mover};
pub use plugin::{Filter, PluginOptions, PluginRegistry, Strategy, StrategyContext};
pub use pool::{PoolError, WorkerPool};
pub use regroup::{Linker, RegroupMode, RegroupRule, Regrouper, SystemLinker};
pub use stats::{Stats, StatsSnapshot};
