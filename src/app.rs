//! Application orchestrator.
//! Resolves and loads the config, applies CLI overrides, initializes logging,
//! installs the interrupt handler, validates, runs one classification pass and
//! reports the statistics.

use anyhow::{Context, Result, bail};
use std::sync::{Arc, Mutex};
use tracing::{debug, error, info};

use folder_flow::cli::Args;
use folder_flow::config::{self, CONFIG_ENV};
use folder_flow::output as out;
use folder_flow::{PluginRegistry, list_extensions, shutdown};

use crate::logging::init_tracing;

pub fn run(args: Args) -> Result<()> {
    let registry = PluginRegistry::with_builtins();

    if args.list_plugins {
        out::print_user(&format!("filters:    {}", registry.filter_names().join(", ")));
        out::print_user(&format!("strategies: {}", registry.strategy_names().join(", ")));
        return Ok(());
    }

    if let Some(dir) = &args.list_extensions {
        let listing = list_extensions(dir)?;
        for path in &listing.without_extension {
            out::print_warn(&format!("file has no extension: {}", path.display()));
        }
        for ext in &listing.extensions {
            out::print_user(ext);
        }
        return Ok(());
    }

    let resolved = config::resolve_config_path(args.config.as_deref());
    if args.print_config {
        match &resolved {
            Some((path, origin)) => {
                out::print_info(&format!("config file ({origin}):\n  {}", path.display()));
                if !path.exists() {
                    out::print_info("no file exists there yet");
                }
            }
            None => out::print_error("could not determine a config location; use --config"),
        }
        return Ok(());
    }

    let Some((cfg_path, origin)) = resolved else {
        bail!("no config location available; pass --config or set {CONFIG_ENV}");
    };
    if !cfg_path.exists() {
        out::print_error(&format!(
            "config file not found ({origin}): {}",
            cfg_path.display()
        ));
        bail!("missing config file '{}'", cfg_path.display());
    }
    let mut cfg = config::load_config_from_path(&cfg_path)?;
    args.apply_overrides(&mut cfg);

    let guard = init_tracing(cfg.log_level, cfg.log_file.as_deref(), args.json).inspect_err(|e| {
        out::print_error(&format!("failed to initialize logging: {e:#}"));
    })?;

    // dropped on interrupt too, so buffered file logs are flushed
    let guard_slot = Arc::new(Mutex::new(guard));
    {
        let guard_slot = Arc::clone(&guard_slot);
        shutdown::install_handler(move || {
            out::print_warn("interrupt received; finishing files in progress...");
            if let Ok(mut g) = guard_slot.lock() {
                let _ = g.take();
            }
        })?;
    }

    debug!(config = %cfg_path.display(), ?args, "starting folder_flow");

    let result = (|| -> Result<()> {
        cfg.validate()?;
        let classifier = cfg.build_classifier(&registry)?;
        let report = classifier.classify()?;

        out::print_user(&report.stats.to_string());
        if let Some(path) = &args.stats_json {
            report.stats.write_json(path)?;
            info!(path = %path.display(), "statistics written");
        }
        if cfg.dry_run {
            out::print_info("dry-run: no files were changed");
        }

        match report.error() {
            None => {
                out::print_success("all files processed");
                Ok(())
            }
            Some(run_err) => {
                error!(failures = run_err.count, "run finished with failures");
                Err(anyhow::Error::new(run_err)).context("classification incomplete")
            }
        }
    })();

    if let Ok(mut g) = guard_slot.lock() {
        let _ = g.take();
    }
    result
}
