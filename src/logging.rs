//! Tracing initialization for the binary.
//!
//! - Level comes from `LogLevel` (config or CLI), not from RUST_LOG.
//! - Console output goes to stderr so stdout stays free for the run summary.
//! - `json` switches both console and file layers to structured JSON.
//! - An optional non-blocking file layer is added when `log_file` is set;
//!   it is refused when any ancestor of the path is a symlink.

use anyhow::{Context, Result};
use chrono::Local;
use folder_flow::config::{LogLevel, path_has_symlink_ancestor};
use folder_flow::output as out;
use folder_flow::platform::open_log_file_secure_append;
use std::fmt as stdfmt;
use std::io;
use std::path::Path;
use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_subscriber::filter::{EnvFilter, LevelFilter};
use tracing_subscriber::fmt as tsfmt;
use tracing_subscriber::fmt::time::FormatTime;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::registry;
use tracing_subscriber::util::SubscriberInitExt;

/// DD/MM/YY HH:MM:SS in local time.
struct LocalHumanTime;

impl FormatTime for LocalHumanTime {
    fn format_time(&self, w: &mut tsfmt::format::Writer<'_>) -> stdfmt::Result {
        write!(w, "{}", Local::now().format("%d/%m/%y %H:%M:%S"))
    }
}

fn level_filter(level: LogLevel) -> LevelFilter {
    match level {
        LogLevel::Quiet => LevelFilter::ERROR,
        LogLevel::Normal => LevelFilter::INFO,
        LogLevel::Info => LevelFilter::DEBUG,
        LogLevel::Debug => LevelFilter::TRACE,
    }
}

fn file_writer(path: &Path) -> Option<(NonBlocking, WorkerGuard)> {
    match path_has_symlink_ancestor(path) {
        Ok(false) => {}
        Ok(true) => {
            out::print_warn(&format!(
                "not logging to '{}': an ancestor directory is a symlink",
                path.display()
            ));
            return None;
        }
        Err(e) => {
            out::print_warn(&format!("not logging to '{}': {e}", path.display()));
            return None;
        }
    }
    match open_log_file_secure_append(path) {
        Ok(file) => Some(tracing_appender::non_blocking(file)),
        Err(e) => {
            out::print_warn(&format!(
                "cannot open log file '{}': {e}; logging to the console only",
                path.display()
            ));
            None
        }
    }
}

/// Install the global subscriber. The returned guard must live until exit so
/// buffered file output is flushed.
pub fn init_tracing(level: LogLevel, log_file: Option<&Path>, json: bool) -> Result<Option<WorkerGuard>> {
    let filter = EnvFilter::default().add_directive(level_filter(level).into());
    let (writer, guard) = match log_file.and_then(file_writer) {
        Some((w, g)) => (Some(w), Some(g)),
        None => (None, None),
    };

    if json {
        let console = tsfmt::layer()
            .json()
            .with_timer(LocalHumanTime)
            .with_thread_ids(true)
            .with_writer(io::stderr);
        let file = writer.map(|w| {
            tsfmt::layer()
                .json()
                .with_timer(LocalHumanTime)
                .with_thread_ids(true)
                .with_writer(w)
        });
        registry()
            .with(filter)
            .with(console)
            .with(file)
            .try_init()
            .context("initialize logging")?;
    } else {
        let console = tsfmt::layer()
            .compact()
            .with_timer(LocalHumanTime)
            .with_target(false)
            .with_writer(io::stderr);
        let file = writer.map(|w| {
            tsfmt::layer()
                .compact()
                .with_timer(LocalHumanTime)
                .with_thread_ids(true)
                .with_ansi(false)
                .with_writer(w)
        });
        registry()
            .with(filter)
            .with(console)
            .with(file)
            .try_init()
            .context("initialize logging")?;
    }
    Ok(guard)
}
