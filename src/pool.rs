//! Bounded worker pool with error aggregation.
//!
//! - `acquire()` blocks the submitter until one of `limit` slots is free.
//! - The returned `Slot` releases on drop, so a slot is given back exactly
//!   once even when the task panics.
//! - Tasks run on a dedicated rayon thread pool; the submitting closure of
//!   `scope()` runs on the caller's thread, so walking and processing overlap.
//! - Task errors and panics land in one shared list, drained by `wait()`.

use anyhow::{Context, Result};
use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Condvar, Mutex, MutexGuard};
use tracing::debug;

use crate::errors::{FlowError, MAX_LISTED_ERRORS};

/// Upper bound for auto-sized pools.
pub const MAX_AUTO_WORKERS: usize = 32;

/// `max_workers <= 0` picks `min(32, cpus * 4)`.
pub fn effective_workers(max_workers: i64) -> usize {
    if max_workers <= 0 {
        (num_cpus::get() * 4).clamp(1, MAX_AUTO_WORKERS)
    } else {
        usize::try_from(max_workers).unwrap_or(MAX_AUTO_WORKERS)
    }
}

/// All errors reported by the tasks of one pool generation.
#[derive(Debug, Default)]
pub struct PoolError {
    errors: Vec<anyhow::Error>,
}

impl PoolError {
    pub fn count(&self) -> usize {
        self.errors.len()
    }

    pub fn errors(&self) -> &[anyhow::Error] {
        &self.errors
    }
}

impl fmt::Display for PoolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} task(s) failed", self.errors.len())?;
        for e in self.errors.iter().take(MAX_LISTED_ERRORS) {
            write!(f, "\n  - {e:#}")?;
        }
        if self.errors.len() > MAX_LISTED_ERRORS {
            write!(f, "\n  ... and {} more", self.errors.len() - MAX_LISTED_ERRORS)?;
        }
        Ok(())
    }
}

impl std::error::Error for PoolError {}

pub struct WorkerPool {
    limit: usize,
    in_use: Mutex<usize>,
    freed: Condvar,
    errors: Mutex<Vec<anyhow::Error>>,
    threads: rayon::ThreadPool,
}

impl fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkerPool")
            .field("limit", &self.limit)
            .field("in_use", &*self.lock_in_use())
            .finish()
    }
}

/// A reserved slot; released on drop.
pub struct Slot<'a> {
    pool: &'a WorkerPool,
}

impl Drop for Slot<'_> {
    fn drop(&mut self) {
        let mut in_use = self.pool.lock_in_use();
        *in_use -= 1;
        drop(in_use);
        self.pool.freed.notify_all();
    }
}

impl WorkerPool {
    pub fn new(max_workers: i64) -> Result<Self> {
        let limit = effective_workers(max_workers);
        let threads = rayon::ThreadPoolBuilder::new()
            .num_threads(limit)
            .thread_name(|i| format!("folder-flow-{i}"))
            .build()
            .context("build worker thread pool")?;
        debug!(limit, "worker pool ready");
        Ok(Self {
            limit,
            in_use: Mutex::new(0),
            freed: Condvar::new(),
            errors: Mutex::new(Vec::new()),
            threads,
        })
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    fn lock_in_use(&self) -> MutexGuard<'_, usize> {
        self.in_use.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// Block until a slot is free, then reserve it.
    pub fn acquire(&self) -> Slot<'_> {
        let mut in_use = self.lock_in_use();
        while *in_use >= self.limit {
            in_use = self.freed.wait(in_use).unwrap_or_else(|p| p.into_inner());
        }
        *in_use += 1;
        Slot { pool: self }
    }

    pub fn report_error(&self, err: anyhow::Error) {
        self.errors
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .push(err);
    }

    /// Run `f` on the calling thread with a handle for submitting tasks.
    /// Returns once `f` is done and every submitted task has finished.
    pub fn scope<'scope, F, R>(&'scope self, f: F) -> R
    where
        F: FnOnce(&PoolScope<'_, 'scope>) -> R,
    {
        self.threads.in_place_scope(|inner: &rayon::Scope<'scope>| {
            let scope = PoolScope { pool: self, inner };
            f(&scope)
        })
    }

    /// Block until no slot is held, then hand back (and clear) the collected errors.
    pub fn wait(&self) -> Result<(), PoolError> {
        let mut in_use = self.lock_in_use();
        while *in_use > 0 {
            in_use = self.freed.wait(in_use).unwrap_or_else(|p| p.into_inner());
        }
        drop(in_use);

        let errors = std::mem::take(&mut *self.errors.lock().unwrap_or_else(|p| p.into_inner()));
        if errors.is_empty() {
            Ok(())
        } else {
            Err(PoolError { errors })
        }
    }
}

pub struct PoolScope<'a, 'scope> {
    pool: &'scope WorkerPool,
    inner: &'a rayon::Scope<'scope>,
}

impl<'scope> PoolScope<'_, 'scope> {
    /// Reserve a slot (blocking while the pool is full) and run `task` on a worker.
    /// An `Err` or a panic from the task is recorded in the pool's error list.
    pub fn submit<F>(&self, task: F)
    where
        F: FnOnce() -> Result<()> + Send + 'scope,
    {
        let slot = self.pool.acquire();
        let pool = self.pool;
        self.inner.spawn(move |_| {
            let _slot = slot;
            match panic::catch_unwind(AssertUnwindSafe(task)) {
                Ok(Ok(())) => {}
                Ok(Err(e)) => pool.report_error(e),
                Err(payload) => pool.report_error(
                    FlowError::TaskPanicked {
                        task: "pool task".to_string(),
                        message: panic_message(payload.as_ref()),
                    }
                    .into(),
                ),
            }
        });
    }
}

/// Best-effort text of a panic payload.
pub fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
