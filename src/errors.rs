//! Typed error definitions for folder_flow.
//! Well-known failure modes, so callers and tests can match on them
//! after an `anyhow::Error` has been propagated.

use std::fmt;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

use crate::pool::PoolError;

/// Maximum number of underlying errors rendered by aggregate errors.
pub const MAX_LISTED_ERRORS: usize = 10;

#[derive(Debug, Error)]
pub enum FlowError {
    #[error("no source directories configured")]
    NoSources,

    #[error("no destination rules configured")]
    NoDestinations,

    #[error("unknown {kind} plugin '{name}'")]
    UnknownPlugin { kind: &'static str, name: String },

    #[error("{kind} plugin '{name}' is already registered")]
    DuplicatePlugin { kind: &'static str, name: String },

    #[error("invalid conflict policy '{0}' (expected skip, overwrite or rename)")]
    InvalidConflictPolicy(String),

    #[error("invalid regroup mode '{0}' (expected symlink, hardlink or copy)")]
    InvalidRegroupMode(String),

    #[error("path '{path}' escapes destination root '{root}'")]
    PathTraversal { path: PathBuf, root: PathBuf },

    #[error("destination root '{0}' is also a source directory")]
    SourceIsDestination(PathBuf),

    #[error("content hash mismatch after copy to '{path}': expected {expected}, got {actual}")]
    HashMismatch {
        path: PathBuf,
        expected: String,
        actual: String,
    },

    #[error("{task} panicked: {message}")]
    TaskPanicked { task: String, message: String },

    #[error("operation interrupted by user")]
    Interrupted,

    #[error("invalid option for {plugin}: {message}")]
    InvalidOption { plugin: String, message: String },
}

/// Coarse classification used for the error tally in run statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ErrorKind {
    NotFound,
    Permission,
    Canceled,
    Other,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::NotFound => "not_found",
            ErrorKind::Permission => "permission",
            ErrorKind::Canceled => "canceled",
            ErrorKind::Other => "other",
        }
    }

    /// Walk the error chain and bucket the first recognizable cause.
    pub fn classify(err: &anyhow::Error) -> Self {
        for cause in err.chain() {
            if let Some(io_err) = cause.downcast_ref::<io::Error>() {
                match io_err.kind() {
                    io::ErrorKind::NotFound => return ErrorKind::NotFound,
                    io::ErrorKind::PermissionDenied => return ErrorKind::Permission,
                    io::ErrorKind::Interrupted => return ErrorKind::Canceled,
                    _ => {}
                }
            }
            if let Some(walk_err) = cause.downcast_ref::<walkdir::Error>()
                && let Some(io_err) = walk_err.io_error()
            {
                match io_err.kind() {
                    io::ErrorKind::NotFound => return ErrorKind::NotFound,
                    io::ErrorKind::PermissionDenied => return ErrorKind::Permission,
                    _ => {}
                }
            }
            if let Some(FlowError::Interrupted) = cause.downcast_ref::<FlowError>() {
                return ErrorKind::Canceled;
            }
        }
        ErrorKind::Other
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One failed unit of a run: a source walk or the aggregated tasks of a source.
#[derive(Debug)]
pub struct SourceFailure {
    pub source: PathBuf,
    pub error: anyhow::Error,
}

/// Aggregate error returned when any part of a run failed.
#[derive(Debug)]
pub struct RunError {
    pub count: usize,
    pub failures: Vec<SourceFailure>,
}

impl RunError {
    /// Total failure count, expanding pool aggregates into their members.
    pub fn from_failures(failures: Vec<SourceFailure>) -> Self {
        let count = failures
            .iter()
            .map(|f| {
                f.error
                    .downcast_ref::<PoolError>()
                    .map(|p| p.count())
                    .unwrap_or(1)
            })
            .sum();
        Self { count, failures }
    }
}

impl fmt::Display for RunError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} failure(s) during run", self.count)?;
        for failure in self.failures.iter().take(MAX_LISTED_ERRORS) {
            let kind = ErrorKind::classify(&failure.error);
            write!(
                f,
                "\n  [{}] {}: {:#}",
                kind,
                failure.source.display(),
                failure.error
            )?;
        }
        if self.failures.len() > MAX_LISTED_ERRORS {
            write!(
                f,
                "\n  ... and {} more",
                self.failures.len() - MAX_LISTED_ERRORS
            )?;
        }
        Ok(())
    }
}

impl std::error::Error for RunError {}
