//! Conflict resolution and relocation of a single file.
//!
//! `Mover::move_file` decides what happens when the computed destination is
//! taken, then relocates (or, in dry-run, only reports the decision):
//!
//! | destination | policy    | result                                  |
//! |-------------|-----------|-----------------------------------------|
//! | absent      | any       | `Moved` (`Copied` if cross-device)      |
//! | present     | skip      | `Skipped`, source untouched             |
//! | present     | overwrite | `Overwritten`                           |
//! | present     | rename    | `SkippedIdentical` or `Renamed` (`_N`)  |
//!
//! Only `Overwritten` may replace a file. Every other relocation fails with
//! `AlreadyExists` if something appeared at the target after the check, and
//! the chosen `_N` name is claimed before it is checked.

use anyhow::{Result, anyhow};
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::{debug, info};

use crate::context::FileContext;
use crate::errors::FlowError;
use crate::fs_ops::{
    DestLocks, OnExisting, RenameFn, Via, find_sibling, io_error_with_help, relocate_with,
    rename_file,
};
use crate::stats::{Section, Stats};

/// What to do when the destination path already exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConflictPolicy {
    Skip,
    Overwrite,
    #[default]
    Rename,
}

impl FromStr for ConflictPolicy {
    type Err = FlowError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "skip" => Ok(ConflictPolicy::Skip),
            "overwrite" => Ok(ConflictPolicy::Overwrite),
            "rename" => Ok(ConflictPolicy::Rename),
            other => Err(FlowError::InvalidConflictPolicy(other.to_string())),
        }
    }
}

impl fmt::Display for ConflictPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ConflictPolicy::Skip => "skip",
            ConflictPolicy::Overwrite => "overwrite",
            ConflictPolicy::Rename => "rename",
        })
    }
}

/// Outcome attributed to exactly one processed file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoveAction {
    Moved,
    Renamed,
    Overwritten,
    Copied,
    Skipped,
    SkippedIdentical,
    /// Set by the classifier for a file whose processing returned an error
    /// or panicked; the mover itself reports failures as `Err`.
    Failed,
}

impl MoveAction {
    /// True when data actually landed at a new path.
    pub fn is_relocation(self) -> bool {
        matches!(
            self,
            MoveAction::Moved | MoveAction::Renamed | MoveAction::Overwritten | MoveAction::Copied
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            MoveAction::Moved => "moved",
            MoveAction::Renamed => "renamed",
            MoveAction::Overwritten => "overwritten",
            MoveAction::Copied => "copied",
            MoveAction::Skipped => "skipped",
            MoveAction::SkippedIdentical => "skipped_identical",
            MoveAction::Failed => "failed",
        }
    }
}

impl fmt::Display for MoveAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug)]
pub struct MoveOutcome {
    pub action: MoveAction,
    /// The file after the operation: the destination for relocations, the
    /// untouched source for skips and dry-runs.
    pub file: FileContext,
    /// Where the file went, or would go in dry-run.
    pub destination: PathBuf,
}

pub struct Mover<'a> {
    stats: &'a Stats,
    locks: &'a DestLocks,
    dry_run: bool,
    rename: RenameFn,
}

impl<'a> Mover<'a> {
    pub fn new(stats: &'a Stats, locks: &'a DestLocks, dry_run: bool) -> Self {
        Self {
            stats,
            locks,
            dry_run,
            rename: rename_file,
        }
    }

    /// Replace the rename primitive (e.g. to simulate a cross-device failure).
    pub fn with_rename(mut self, rename: RenameFn) -> Self {
        self.rename = rename;
        self
    }

    pub fn move_file(
        &self,
        file: FileContext,
        dest: &Path,
        policy: ConflictPolicy,
    ) -> Result<MoveOutcome> {
        let _timer = self.stats.time(Section::Move);
        let _claim = self.locks.claim(dest);

        let existing = match fs::symlink_metadata(dest) {
            Ok(meta) => Some(meta),
            Err(e) if e.kind() == io::ErrorKind::NotFound => None,
            Err(e) => return Err(io_error_with_help("stat destination", dest)(e)),
        };

        let Some(existing) = existing else {
            return self.relocate(file, dest.to_path_buf(), MoveAction::Moved);
        };

        self.stats.decision_conflict();
        debug!(src = %file.path().display(), dest = %dest.display(), %policy, "destination exists");

        match policy {
            ConflictPolicy::Skip => Ok(MoveOutcome {
                action: MoveAction::Skipped,
                file,
                destination: dest.to_path_buf(),
            }),
            ConflictPolicy::Overwrite => {
                self.relocate(file, dest.to_path_buf(), MoveAction::Overwritten)
            }
            ConflictPolicy::Rename => {
                if self.same_content(&file, dest, &existing)? {
                    self.stats.decision_duplicate();
                    return Ok(MoveOutcome {
                        action: MoveAction::SkippedIdentical,
                        file,
                        destination: dest.to_path_buf(),
                    });
                }
                let mut sibling_claim = None;
                let target = find_sibling(dest, |candidate| {
                    let Some(claim) = self.locks.try_claim(candidate) else {
                        return false;
                    };
                    // checked under the claim so a worker that just finished there is seen
                    if fs::symlink_metadata(candidate).is_ok() {
                        return false;
                    }
                    sibling_claim = Some(claim);
                    true
                })
                .ok_or_else(|| anyhow!("no free name next to '{}'", dest.display()))?;
                let outcome = self.relocate(file, target, MoveAction::Renamed);
                drop(sibling_claim);
                outcome
            }
        }
    }

    /// Size first, then full content hash.
    fn same_content(&self, file: &FileContext, dest: &Path, existing: &fs::Metadata) -> Result<bool> {
        if !existing.is_file() || existing.len() != file.size() {
            self.stats.hash_skipped();
            return Ok(false);
        }
        let ours = file.hash_tracked(self.stats)?;
        let theirs = FileContext::open(dest)?.hash_tracked(self.stats)?;
        Ok(ours == theirs)
    }

    fn relocate(&self, file: FileContext, target: PathBuf, action: MoveAction) -> Result<MoveOutcome> {
        if self.dry_run {
            info!(
                src = %file.path().display(),
                dest = %target.display(),
                %action,
                "dry-run: no changes made"
            );
            return Ok(MoveOutcome {
                action,
                file,
                destination: target,
            });
        }

        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)
                .map_err(io_error_with_help("create destination directory", parent))?;
        }

        let on_existing = match action {
            MoveAction::Overwritten => OnExisting::Replace,
            _ => OnExisting::Fail,
        };
        let relocated = relocate_with(file, &target, self.rename, on_existing, self.stats)?;
        let action = match (action, relocated.via) {
            (MoveAction::Moved, Via::Copy) => MoveAction::Copied,
            (a, _) => a,
        };
        Ok(MoveOutcome {
            action,
            file: relocated.file,
            destination: target,
        })
    }
}
