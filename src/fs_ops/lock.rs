//! In-process destination claims.
//!
//! Workers hold a claim on the computed destination path while they decide a
//! conflict and relocate. Two files aimed at the same name are serialized, so
//! the existence check, the free-name search and the rename cannot interleave
//! and silently replace each other's output.
//!
//! A worker already holding a claim only ever uses `try_claim` for a second
//! path, so no worker waits while holding a claim.
//!
//! The claim is released when the `DestClaim` guard is dropped.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Condvar, Mutex, MutexGuard};
use tracing::trace;

#[derive(Debug, Default)]
pub struct DestLocks {
    held: Mutex<HashSet<PathBuf>>,
    released: Condvar,
}

impl DestLocks {
    pub fn new() -> Self {
        Self::default()
    }

    fn held(&self) -> MutexGuard<'_, HashSet<PathBuf>> {
        self.held.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// Block until `path` is free, then claim it.
    pub fn claim(&self, path: &Path) -> DestClaim<'_> {
        let mut held = self.held();
        let mut waited = false;
        while held.contains(path) {
            if !waited {
                trace!(dest = %path.display(), "waiting for destination claim");
                waited = true;
            }
            held = self
                .released
                .wait(held)
                .unwrap_or_else(|p| p.into_inner());
        }
        held.insert(path.to_path_buf());
        DestClaim {
            locks: self,
            path: path.to_path_buf(),
        }
    }

    /// Claim `path` if nobody holds it.
    pub fn try_claim(&self, path: &Path) -> Option<DestClaim<'_>> {
        if !self.held().insert(path.to_path_buf()) {
            return None;
        }
        Some(DestClaim {
            locks: self,
            path: path.to_path_buf(),
        })
    }
}

pub struct DestClaim<'a> {
    locks: &'a DestLocks,
    path: PathBuf,
}

impl Drop for DestClaim<'_> {
    fn drop(&mut self) {
        self.locks.held().remove(&self.path);
        self.locks.released.notify_all();
    }
}
