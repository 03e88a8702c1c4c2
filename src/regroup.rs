//! Secondary "regroup" tree.
//!
//! After a file has been relocated, the regroup tree receives a link (or copy)
//! of it at a path chosen by its own strategy, usually mirroring where the
//! file was found. An existing entry at that path means the work was already
//! done; its content is not compared.
//!
//! Link creation goes through [`Linker`] so tests and odd platforms can swap
//! the primitive. Where symlinks are unreliable the modes are tried as a chain
//! symlink -> hardlink -> copy, stopping at the first success.

use anyhow::{Context, Result, anyhow};
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::{debug, warn};

use crate::context::FileContext;
use crate::errors::FlowError;
use crate::fs_ops::{
    OnExisting, copy_atomic, io_error_with_help, is_cross_device, is_within, normalize_lexically,
    relative_path,
};
use crate::platform;
use crate::plugin::{Strategy, StrategyContext};
use crate::stats::Stats;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RegroupMode {
    #[default]
    Symlink,
    Hardlink,
    Copy,
}

impl RegroupMode {
    pub fn as_str(self) -> &'static str {
        match self {
            RegroupMode::Symlink => "symlink",
            RegroupMode::Hardlink => "hardlink",
            RegroupMode::Copy => "copy",
        }
    }

    /// Modes to attempt, in order.
    fn chain(self, fallback: bool) -> &'static [RegroupMode] {
        static FULL: [RegroupMode; 3] =
            [RegroupMode::Symlink, RegroupMode::Hardlink, RegroupMode::Copy];
        let start = match self {
            RegroupMode::Symlink => 0,
            RegroupMode::Hardlink => 1,
            RegroupMode::Copy => 2,
        };
        if fallback { &FULL[start..] } else { &FULL[start..=start] }
    }
}

impl FromStr for RegroupMode {
    type Err = FlowError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "symlink" => Ok(RegroupMode::Symlink),
            "hardlink" => Ok(RegroupMode::Hardlink),
            "copy" => Ok(RegroupMode::Copy),
            other => Err(FlowError::InvalidRegroupMode(other.to_string())),
        }
    }
}

impl fmt::Display for RegroupMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Link primitives.
pub trait Linker: Send + Sync + fmt::Debug {
    /// Create `link` pointing at `target`; `target` is relative to `link`'s directory.
    fn symlink(&self, target: &Path, link: &Path) -> io::Result<()>;

    fn hard_link(&self, original: &Path, link: &Path) -> io::Result<()>;
}

/// The operating system's link calls.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemLinker;

impl Linker for SystemLinker {
    fn symlink(&self, target: &Path, link: &Path) -> io::Result<()> {
        platform::symlink_file(target, link)
    }

    fn hard_link(&self, original: &Path, link: &Path) -> io::Result<()> {
        fs::hard_link(original, link)
    }
}

/// Where and how relocated files are mirrored.
#[derive(Debug)]
pub struct RegroupRule {
    pub root: PathBuf,
    pub mode: RegroupMode,
    pub strategy: Box<dyn Strategy>,
    /// Try the remaining modes when the configured one fails.
    pub fallback_chain: bool,
}

impl RegroupRule {
    pub fn new(root: impl Into<PathBuf>, mode: RegroupMode, strategy: Box<dyn Strategy>) -> Self {
        Self {
            root: root.into(),
            mode,
            strategy,
            fallback_chain: !platform::SYMLINKS_RELIABLE,
        }
    }

    pub fn with_fallback_chain(mut self, enabled: bool) -> Self {
        self.fallback_chain = enabled;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegroupOutcome {
    pub target: PathBuf,
    /// Mode that produced the entry; `None` when it already existed.
    pub created_with: Option<RegroupMode>,
}

pub struct Regrouper<'a> {
    rule: &'a RegroupRule,
    linker: &'a dyn Linker,
    stats: &'a Stats,
}

impl<'a> Regrouper<'a> {
    pub fn new(rule: &'a RegroupRule, linker: &'a dyn Linker, stats: &'a Stats) -> Self {
        Self { rule, linker, stats }
    }

    /// Mirror `file` (already at its final location) into the regroup tree.
    /// `original_path` and `source_dir` describe where the file was found.
    pub fn regroup(
        &self,
        file: &FileContext,
        original_path: &Path,
        source_dir: &Path,
    ) -> Result<RegroupOutcome> {
        let name = file
            .file_name()
            .ok_or_else(|| anyhow!("'{}' has no file name", file.path().display()))?;
        let dir = self.rule.strategy.final_dir_path(&StrategyContext {
            file,
            original_path,
            source_dir,
            dest_dir: &self.rule.root,
        })?;
        let target = normalize_lexically(&dir.join(name));
        if !is_within(&self.rule.root, &target) || target == normalize_lexically(&self.rule.root) {
            return Err(FlowError::PathTraversal {
                path: target,
                root: self.rule.root.clone(),
            }
            .into());
        }

        if fs::symlink_metadata(&target).is_ok() {
            debug!(target = %target.display(), "regroup entry already present");
            return Ok(RegroupOutcome {
                target,
                created_with: None,
            });
        }
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)
                .map_err(io_error_with_help("create regroup directory", parent))?;
        }

        let mut last_err = None;
        for &mode in self.rule.mode.chain(self.rule.fallback_chain) {
            match self.create(mode, file.path(), &target) {
                Ok(()) => {
                    self.stats.regrouped();
                    debug!(src = %file.path().display(), target = %target.display(), %mode, "regrouped");
                    return Ok(RegroupOutcome {
                        target,
                        created_with: Some(mode),
                    });
                }
                Err(e) if is_already_exists(&e) => {
                    return Ok(RegroupOutcome {
                        target,
                        created_with: None,
                    });
                }
                Err(e) => {
                    warn!(target = %target.display(), %mode, error = %format!("{e:#}"), "regroup attempt failed");
                    last_err = Some(e);
                }
            }
        }
        let err = last_err.unwrap_or_else(|| anyhow!("no regroup mode attempted"));
        Err(err.context(format!("regroup '{}'", file.path().display())))
    }

    fn create(&self, mode: RegroupMode, source: &Path, target: &Path) -> Result<()> {
        match mode {
            RegroupMode::Symlink => {
                let link_dir = target
                    .parent()
                    .ok_or_else(|| anyhow!("'{}' has no parent", target.display()))?;
                let rel = relative_path(link_dir, &normalize_lexically(source));
                self.linker
                    .symlink(&rel, target)
                    .map_err(io_error_with_help("create symlink", target))?;
                self.stats.op_link();
            }
            RegroupMode::Hardlink => match self.linker.hard_link(source, target) {
                Ok(()) => self.stats.op_link(),
                Err(e) if is_cross_device(&e) => {
                    debug!(target = %target.display(), "hard link crosses devices; copying");
                    self.copy(source, target)?;
                }
                Err(e) => return Err(io_error_with_help("create hard link", target)(e)),
            },
            RegroupMode::Copy => self.copy(source, target)?,
        }
        Ok(())
    }

    fn copy(&self, source: &Path, target: &Path) -> Result<()> {
        copy_atomic(source, target, None, OnExisting::Fail)
            .with_context(|| format!("copy into regroup tree '{}'", target.display()))?;
        self.stats.op_copy();
        Ok(())
    }
}

fn is_already_exists(err: &anyhow::Error) -> bool {
    err.chain()
        .filter_map(|c| c.downcast_ref::<io::Error>())
        .any(|e| e.kind() == io::ErrorKind::AlreadyExists)
}
