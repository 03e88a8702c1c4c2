//! Classification run: walk every source once, hand each file to the worker
//! pool, match it against the destination rules in order and move it.
//!
//! Per-file failures are recorded and aggregated without stopping sibling
//! tasks. A walk failure aborts that source only. The run ends with a
//! [`RunReport`] holding the finalized statistics and the failures.

use anyhow::{Context, Result, anyhow};
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, info_span, trace, warn};
use walkdir::WalkDir;

use crate::context::FileContext;
use crate::errors::{FlowError, RunError, SourceFailure};
use crate::fs_ops::{DestLocks, RenameFn, is_within, normalize_lexically, rename_file};
use crate::mover::{ConflictPolicy, MoveAction, Mover};
use crate::plugin::{Filter, Strategy, StrategyContext};
use crate::pool::{WorkerPool, panic_message};
use crate::regroup::{Linker, RegroupRule, Regrouper, SystemLinker};
use crate::shutdown;
use crate::stats::{Section, Stats};

/// Directory names never descended into.
pub const PRUNED_DIR_NAMES: &[&str] = &[".git", "node_modules"];

/// One destination: where matching files go and how they are placed.
#[derive(Debug)]
pub struct DestinationRule {
    pub name: String,
    pub root: PathBuf,
    /// All must match; an empty list matches every file.
    pub filters: Vec<Box<dyn Filter>>,
    pub strategy: Box<dyn Strategy>,
    pub on_conflict: ConflictPolicy,
}

impl DestinationRule {
    pub fn new(name: impl Into<String>, root: impl Into<PathBuf>, strategy: Box<dyn Strategy>) -> Self {
        Self {
            name: name.into(),
            root: root.into(),
            filters: Vec::new(),
            strategy,
            on_conflict: ConflictPolicy::default(),
        }
    }

    pub fn with_filter(mut self, filter: Box<dyn Filter>) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn with_conflict_policy(mut self, policy: ConflictPolicy) -> Self {
        self.on_conflict = policy;
        self
    }

    /// AND over the filters, stopping at the first non-match.
    pub fn matches(&self, file: &FileContext) -> Result<bool> {
        for filter in &self.filters {
            let hit = filter
                .matches(file)
                .with_context(|| format!("filter '{}' of rule '{}'", filter.selector(), self.name))?;
            if !hit {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Final path for `file`, guaranteed to lie strictly inside `root`.
    fn destination_for(&self, file: &FileContext, original_path: &Path, source_dir: &Path) -> Result<PathBuf> {
        let dir = self.strategy.final_dir_path(&StrategyContext {
            file,
            original_path,
            source_dir,
            dest_dir: &self.root,
        })?;
        let name = file
            .file_name()
            .ok_or_else(|| anyhow!("'{}' has no file name", file.path().display()))?;
        let dest = normalize_lexically(&dir.join(name));
        if dest == normalize_lexically(&self.root) || !is_within(&self.root, &dest) {
            return Err(FlowError::PathTraversal {
                path: dest,
                root: self.root.clone(),
            }
            .into());
        }
        Ok(dest)
    }
}

/// Result of one run.
#[derive(Debug)]
pub struct RunReport {
    pub stats: Stats,
    pub failures: Vec<SourceFailure>,
}

impl RunReport {
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }

    /// All failures as one error, or `None` for a clean run.
    pub fn error(self) -> Option<RunError> {
        if self.failures.is_empty() {
            None
        } else {
            Some(RunError::from_failures(self.failures))
        }
    }
}

pub struct Classifier {
    sources: Vec<PathBuf>,
    rules: Vec<DestinationRule>,
    regroup: Option<RegroupRule>,
    max_workers: i64,
    dry_run: bool,
    linker: Box<dyn Linker>,
    rename: RenameFn,
}

impl fmt::Debug for Classifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Classifier")
            .field("sources", &self.sources)
            .field("rules", &self.rules)
            .field("regroup", &self.regroup)
            .field("max_workers", &self.max_workers)
            .field("dry_run", &self.dry_run)
            .finish_non_exhaustive()
    }
}

/// What one task did, apart from failing outright.
struct Processed {
    action: MoveAction,
    regroup_error: Option<anyhow::Error>,
}

/// Shared state of one run.
struct RunState<'r> {
    stats: &'r Stats,
    locks: &'r DestLocks,
}

impl Classifier {
    /// Rejects an empty source or rule list and any destination root that is
    /// also a source directory.
    pub fn new(sources: Vec<PathBuf>, rules: Vec<DestinationRule>) -> Result<Self, FlowError> {
        if sources.is_empty() {
            return Err(FlowError::NoSources);
        }
        if rules.is_empty() {
            return Err(FlowError::NoDestinations);
        }
        for rule in &rules {
            let root = normalize_lexically(&rule.root);
            if sources.iter().any(|s| normalize_lexically(s) == root) {
                return Err(FlowError::SourceIsDestination(rule.root.clone()));
            }
        }
        Ok(Self {
            sources,
            rules,
            regroup: None,
            max_workers: 0,
            dry_run: false,
            linker: Box::new(SystemLinker),
            rename: rename_file,
        })
    }

    pub fn with_regroup(mut self, regroup: RegroupRule) -> Self {
        self.regroup = Some(regroup);
        self
    }

    /// `<= 0` sizes the pool automatically.
    pub fn with_max_workers(mut self, max_workers: i64) -> Self {
        self.max_workers = max_workers;
        self
    }

    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn with_linker(mut self, linker: Box<dyn Linker>) -> Self {
        self.linker = linker;
        self
    }

    /// Replace the rename primitive used for relocation.
    pub fn with_rename(mut self, rename: RenameFn) -> Self {
        self.rename = rename;
        self
    }

    pub fn rules(&self) -> &[DestinationRule] {
        &self.rules
    }

    /// Run once over every source. `Err` only when the run could not start.
    pub fn classify(&self) -> Result<RunReport> {
        let stats = Stats::new();
        let locks = DestLocks::new();
        let pool = WorkerPool::new(self.max_workers)?;
        let run = RunState {
            stats: &stats,
            locks: &locks,
        };
        info!(
            sources = self.sources.len(),
            rules = self.rules.len(),
            workers = pool.limit(),
            dry_run = self.dry_run,
            "classification started"
        );

        let mut failures = Vec::new();
        for source in &self.sources {
            if shutdown::is_requested() {
                break;
            }
            if !self.should_process(source) {
                continue;
            }
            let span = info_span!("source", dir = %source.display());
            let _entered = span.enter();

            if let Err(e) = self.process_source_dir(&run, &pool, source) {
                stats.run_error(&e);
                error!(error = %format!("{e:#}"), "source aborted");
                failures.push(SourceFailure {
                    source: source.clone(),
                    error: e,
                });
            }
            if let Err(pool_err) = pool.wait() {
                failures.push(SourceFailure {
                    source: source.clone(),
                    error: anyhow::Error::new(pool_err),
                });
            }
        }

        stats.finish();
        info!(
            duration_ms = stats.duration().as_millis() as u64,
            failures = failures.len(),
            "classification finished"
        );
        Ok(RunReport { stats, failures })
    }

    /// Sources that cannot or must not be walked are skipped with a warning.
    fn should_process(&self, source: &Path) -> bool {
        if source.as_os_str().is_empty() {
            warn!("skipping empty source path");
            return false;
        }
        if !source.is_dir() {
            warn!(source = %source.display(), "skipping source: not an existing directory");
            return false;
        }
        if let Some(rg) = &self.regroup
            && normalize_lexically(&rg.root) == normalize_lexically(source)
        {
            warn!(source = %source.display(), "skipping source: it is the regroup directory");
            return false;
        }
        true
    }

    /// Roots that receive files during this run and must not be re-walked.
    fn output_roots(&self) -> Vec<PathBuf> {
        self.rules
            .iter()
            .map(|r| normalize_lexically(&r.root))
            .chain(self.regroup.iter().map(|g| normalize_lexically(&g.root)))
            .collect()
    }

    /// Walk `source` on this thread, submitting one task per non-directory entry.
    fn process_source_dir(&self, run: &RunState<'_>, pool: &WorkerPool, source: &Path) -> Result<()> {
        let outputs = self.output_roots();
        let walker = WalkDir::new(source)
            .follow_links(false)
            .into_iter()
            .filter_entry(|e| {
                if e.depth() == 0 || !e.file_type().is_dir() {
                    return true;
                }
                let pruned_name = e
                    .file_name()
                    .to_str()
                    .is_some_and(|n| PRUNED_DIR_NAMES.contains(&n));
                let is_output = outputs.contains(&normalize_lexically(e.path()));
                if pruned_name || is_output {
                    debug!(dir = %e.path().display(), "pruned");
                }
                !(pruned_name || is_output)
            });

        pool.scope(|scope| -> Result<()> {
            let _walk = run.stats.time(Section::Walk);
            for entry in walker {
                if shutdown::is_requested() {
                    warn!("interrupt requested; no further files scheduled");
                    return Err(FlowError::Interrupted.into());
                }
                let entry = entry.with_context(|| format!("walk '{}'", source.display()))?;
                if entry.file_type().is_dir() {
                    continue;
                }
                let path = entry.into_path();
                scope.submit(move || self.run_task(run, source, path));
            }
            Ok(())
        })
    }

    /// Task boundary: failures and panics are recorded here, then handed to the pool.
    fn run_task(&self, run: &RunState<'_>, source: &Path, path: PathBuf) -> Result<()> {
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| self.process_file(run, source, &path)));
        let (action, result) = match outcome {
            Ok(Ok(Processed {
                action,
                regroup_error,
            })) => (action, regroup_error.map_or(Ok(()), Err)),
            Ok(Err(e)) => {
                run.stats.error(&e);
                error!(
                    src = %path.display(),
                    action = %MoveAction::Failed,
                    error = %format!("{e:#}"),
                    "file failed"
                );
                (MoveAction::Failed, Err(e.context(format!("process '{}'", path.display()))))
            }
            Err(payload) => {
                let e = anyhow::Error::new(FlowError::TaskPanicked {
                    task: format!("task for '{}'", path.display()),
                    message: panic_message(payload.as_ref()),
                });
                run.stats.error(&e);
                error!(
                    src = %path.display(),
                    action = %MoveAction::Failed,
                    error = %e,
                    "task panicked"
                );
                (MoveAction::Failed, Err(e))
            }
        };
        trace!(src = %path.display(), %action, "task finished");
        result
    }

    fn process_file(&self, run: &RunState<'_>, source: &Path, path: &Path) -> Result<Processed> {
        let file = match FileContext::open(path) {
            Ok(f) => f,
            Err(e) => {
                run.stats.file_seen(0);
                return Err(e);
            }
        };
        run.stats.file_seen(file.size());

        let matched = {
            let _t = run.stats.time(Section::Classify);
            self.first_match(&file)?
        };
        let Some(rule) = matched else {
            run.stats.file_skipped();
            debug!(src = %path.display(), "no rule matched");
            return Ok(Processed {
                action: MoveAction::Skipped,
                regroup_error: None,
            });
        };
        run.stats.file_matched();

        let dest = rule.destination_for(&file, path, source)?;
        let mover = Mover::new(run.stats, run.locks, self.dry_run).with_rename(self.rename);
        let outcome = mover.move_file(file, &dest, rule.on_conflict)?;
        run.stats.record_outcome(&outcome);
        info!(
            src = %path.display(),
            dest = %outcome.destination.display(),
            action = %outcome.action,
            rule = %rule.name,
            "file classified"
        );

        let mut regroup_error = None;
        if outcome.action.is_relocation()
            && !self.dry_run
            && let Some(rg) = &self.regroup
            && let Err(e) = Regrouper::new(rg, self.linker.as_ref(), run.stats).regroup(&outcome.file, path, source)
        {
            run.stats.regroup_error(&e);
            warn!(src = %path.display(), error = %format!("{e:#}"), "regroup failed");
            regroup_error = Some(e);
        }

        Ok(Processed {
            action: outcome.action,
            regroup_error,
        })
    }

    fn first_match(&self, file: &FileContext) -> Result<Option<&DestinationRule>> {
        for rule in &self.rules {
            if rule.matches(file)? {
                return Ok(Some(rule));
            }
        }
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugin::{DirChainStrategy, ExtensionFilter, PluginOptions};
    use std::fs;
    use tempfile::tempdir;

    fn jpg_filter() -> Box<dyn Filter> {
        let mut f = ExtensionFilter::default();
        let mut opts = PluginOptions::new();
        opts.insert("extensions".into(), vec!["jpg".into()]);
        f.load_config(&opts).unwrap();
        Box::new(f)
    }

    #[test]
    fn construction_validates_inputs() {
        let rule = || DestinationRule::new("d", "/dest", Box::new(DirChainStrategy));
        assert!(matches!(
            Classifier::new(vec![], vec![rule()]),
            Err(FlowError::NoSources)
        ));
        assert!(matches!(
            Classifier::new(vec!["/src".into()], vec![]),
            Err(FlowError::NoDestinations)
        ));
        assert!(matches!(
            Classifier::new(vec!["/dest/".into()], vec![rule()]),
            Err(FlowError::SourceIsDestination(_))
        ));
    }

    #[test]
    fn empty_filter_list_matches_everything() {
        let dir = tempdir().unwrap();
        let p = dir.path().join("x.bin");
        fs::write(&p, b"x").unwrap();
        let file = FileContext::open(&p).unwrap();
        let rule = DestinationRule::new("all", dir.path().join("d"), Box::new(DirChainStrategy));
        assert!(rule.matches(&file).unwrap());
        let rule = rule.with_filter(jpg_filter());
        assert!(!rule.matches(&file).unwrap());
    }

    #[test]
    fn first_matching_rule_wins() {
        let dir = tempdir().unwrap();
        let src = dir.path().join("src");
        fs::create_dir_all(&src).unwrap();
        fs::write(src.join("a.jpg"), b"img").unwrap();

        let images = DestinationRule::new("images", dir.path().join("images"), Box::new(DirChainStrategy))
            .with_filter(jpg_filter());
        let all = DestinationRule::new("all", dir.path().join("all"), Box::new(DirChainStrategy));
        let report = Classifier::new(vec![src.clone()], vec![images, all])
            .unwrap()
            .with_max_workers(2)
            .classify()
            .unwrap();

        assert!(report.is_success());
        assert!(dir.path().join("images/a.jpg").exists());
        assert!(!dir.path().join("all/a.jpg").exists());
        assert_eq!(report.stats.snapshot().files.matched, 1);
    }

    #[test]
    fn pruned_directories_are_not_walked() {
        let dir = tempdir().unwrap();
        let src = dir.path().join("src");
        fs::create_dir_all(src.join(".git")).unwrap();
        fs::create_dir_all(src.join("node_modules/pkg")).unwrap();
        fs::write(src.join(".git/HEAD"), b"ref").unwrap();
        fs::write(src.join("node_modules/pkg/index.js"), b"js").unwrap();
        fs::write(src.join("keep.txt"), b"k").unwrap();

        let all = DestinationRule::new("all", dir.path().join("out"), Box::new(DirChainStrategy));
        let report = Classifier::new(vec![src.clone()], vec![all])
            .unwrap()
            .classify()
            .unwrap();

        assert_eq!(report.stats.snapshot().files.seen, 1);
        assert!(src.join(".git/HEAD").exists());
        assert!(dir.path().join("out/keep.txt").exists());
    }

    #[test]
    fn nested_destination_is_not_rewalked() {
        let dir = tempdir().unwrap();
        let src = dir.path().join("src");
        fs::create_dir_all(src.join("sorted/old")).unwrap();
        fs::write(src.join("sorted/old/prev.txt"), b"p").unwrap();
        fs::write(src.join("new.txt"), b"n").unwrap();

        let rule = DestinationRule::new("sorted", src.join("sorted"), Box::new(DirChainStrategy));
        let report = Classifier::new(vec![src.clone()], vec![rule])
            .unwrap()
            .classify()
            .unwrap();

        let snap = report.stats.snapshot();
        assert_eq!(snap.files.seen, 1);
        assert_eq!(snap.files.moved, 1);
        assert!(src.join("sorted/new.txt").exists());
        assert!(src.join("sorted/old/prev.txt").exists());
    }

    #[test]
    fn missing_source_is_skipped_not_failed() {
        let dir = tempdir().unwrap();
        let rule = DestinationRule::new("d", dir.path().join("d"), Box::new(DirChainStrategy));
        let report = Classifier::new(vec![dir.path().join("absent")], vec![rule])
            .unwrap()
            .classify()
            .unwrap();
        assert!(report.is_success());
        assert_eq!(report.stats.snapshot().files.seen, 0);
        assert!(report.stats.is_finished());
    }
}
