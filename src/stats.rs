//! Run statistics.
//!
//! One `Stats` value is created per run and shared by reference with every
//! worker. Counters are independent atomics; only the error-kind tally sits
//! behind a mutex. `finish()` freezes the end time and duration once.
//!
//! Output comes in two shapes: `Display` for the human summary, and
//! `snapshot()` / `to_json()` for a structured export.

use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, OnceLock};
use std::time::{Duration, Instant};

use crate::context::HASH_ALGORITHM;
use crate::errors::ErrorKind;
use crate::mover::{MoveAction, MoveOutcome};

/// Named timing buckets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Section {
    Walk,
    Classify,
    Move,
    Hash,
}

#[derive(Debug, Default)]
struct Counter(AtomicU64);

impl Counter {
    #[inline]
    fn add(&self, n: u64) {
        self.0.fetch_add(n, Ordering::Relaxed);
    }

    #[inline]
    fn inc(&self) {
        self.add(1);
    }

    #[inline]
    fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}

#[derive(Debug, Default)]
struct FileCounters {
    seen: Counter,
    matched: Counter,
    moved: Counter,
    renamed: Counter,
    copied: Counter,
    overwritten: Counter,
    skipped: Counter,
    failed: Counter,
}

#[derive(Debug, Default)]
struct Timing {
    walk_ns: Counter,
    classify_ns: Counter,
    move_ns: Counter,
    hash_ns: Counter,
}

#[derive(Debug, Clone, Copy)]
struct Finished {
    ended_at: DateTime<Local>,
    duration: Duration,
}

#[derive(Debug)]
pub struct Stats {
    started_at: DateTime<Local>,
    start: Instant,
    finished: OnceLock<Finished>,

    files: FileCounters,
    bytes_read: Counter,
    bytes_written: Counter,

    same_fs: Counter,
    cross_fs: Counter,
    conflicts: Counter,
    duplicates: Counter,

    hash_computed: Counter,
    hash_verified: Counter,
    hash_skipped: Counter,

    op_rename: Counter,
    op_copy: Counter,
    op_link: Counter,
    op_delete: Counter,

    regrouped: Counter,
    regroup_failed: Counter,

    timing: Timing,

    errors_total: Counter,
    errors_by_kind: Mutex<BTreeMap<ErrorKind, u64>>,
}

impl Default for Stats {
    fn default() -> Self {
        Self::new()
    }
}

impl Stats {
    /// Start a run: the clock begins now.
    pub fn new() -> Self {
        Self {
            started_at: Local::now(),
            start: Instant::now(),
            finished: OnceLock::new(),
            files: FileCounters::default(),
            bytes_read: Counter::default(),
            bytes_written: Counter::default(),
            same_fs: Counter::default(),
            cross_fs: Counter::default(),
            conflicts: Counter::default(),
            duplicates: Counter::default(),
            hash_computed: Counter::default(),
            hash_verified: Counter::default(),
            hash_skipped: Counter::default(),
            op_rename: Counter::default(),
            op_copy: Counter::default(),
            op_link: Counter::default(),
            op_delete: Counter::default(),
            regrouped: Counter::default(),
            regroup_failed: Counter::default(),
            timing: Timing::default(),
            errors_total: Counter::default(),
            errors_by_kind: Mutex::new(BTreeMap::new()),
        }
    }

    /// Freeze end time and duration. Later calls are no-ops.
    pub fn finish(&self) {
        let _ = self.finished.get_or_init(|| Finished {
            ended_at: Local::now(),
            duration: self.start.elapsed(),
        });
    }

    pub fn is_finished(&self) -> bool {
        self.finished.get().is_some()
    }

    /// Run duration; still ticking until `finish()` is called.
    pub fn duration(&self) -> Duration {
        self.finished
            .get()
            .map(|f| f.duration)
            .unwrap_or_else(|| self.start.elapsed())
    }

    pub fn file_seen(&self, size: u64) {
        self.files.seen.inc();
        self.bytes_read.add(size);
    }

    pub fn file_matched(&self) {
        self.files.matched.inc();
    }

    pub fn file_moved(&self, size: u64) {
        self.files.moved.inc();
        self.bytes_written.add(size);
    }

    pub fn file_renamed(&self, size: u64) {
        self.file_moved(size);
        self.files.renamed.inc();
    }

    pub fn file_copied(&self, size: u64) {
        self.file_moved(size);
        self.files.copied.inc();
    }

    pub fn file_overwritten(&self, size: u64) {
        self.file_moved(size);
        self.files.overwritten.inc();
    }

    pub fn file_skipped(&self) {
        self.files.skipped.inc();
    }

    /// Attribute the single outcome of one processed file.
    pub fn record_outcome(&self, outcome: &MoveOutcome) {
        self.record_action(outcome.action, outcome.file.size());
    }

    pub fn record_action(&self, action: MoveAction, size: u64) {
        match action {
            MoveAction::Moved => self.file_moved(size),
            MoveAction::Renamed => self.file_renamed(size),
            MoveAction::Overwritten => self.file_overwritten(size),
            MoveAction::Copied => self.file_copied(size),
            MoveAction::Skipped | MoveAction::SkippedIdentical => self.file_skipped(),
            MoveAction::Failed => self.files.failed.inc(),
        }
    }

    pub fn decision_same_fs(&self) {
        self.same_fs.inc();
    }

    pub fn decision_cross_fs(&self) {
        self.cross_fs.inc();
    }

    pub fn decision_conflict(&self) {
        self.conflicts.inc();
    }

    pub fn decision_duplicate(&self) {
        self.duplicates.inc();
    }

    pub fn hash_computed(&self) {
        self.hash_computed.inc();
    }

    pub fn hash_verified(&self) {
        self.hash_verified.inc();
    }

    pub fn hash_skipped(&self) {
        self.hash_skipped.inc();
    }

    pub fn op_rename(&self) {
        self.op_rename.inc();
    }

    pub fn op_copy(&self) {
        self.op_copy.inc();
    }

    pub fn op_link(&self) {
        self.op_link.inc();
    }

    pub fn op_delete(&self) {
        self.op_delete.inc();
    }

    pub fn regrouped(&self) {
        self.regrouped.inc();
    }

    /// A failed file: raw counters plus the classified tally.
    pub fn error(&self, err: &anyhow::Error) {
        self.record_action(MoveAction::Failed, 0);
        self.tally(err);
    }

    /// A failed regroup link. The file itself was already relocated, so it is
    /// not counted as a failed file.
    pub fn regroup_error(&self, err: &anyhow::Error) {
        self.regroup_failed.inc();
        self.tally(err);
    }

    /// A failure that is not tied to one file (e.g. a source walk).
    pub fn run_error(&self, err: &anyhow::Error) {
        self.tally(err);
    }

    fn tally(&self, err: &anyhow::Error) {
        self.errors_total.inc();
        let kind = ErrorKind::classify(err);
        let mut map = self
            .errors_by_kind
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *map.entry(kind).or_insert(0) += 1;
    }

    /// Start timing a section; elapsed time is added when the guard drops.
    #[must_use = "the section is timed until the guard is dropped"]
    pub fn time(&self, section: Section) -> TimerGuard<'_> {
        let bucket = match section {
            Section::Walk => &self.timing.walk_ns,
            Section::Classify => &self.timing.classify_ns,
            Section::Move => &self.timing.move_ns,
            Section::Hash => &self.timing.hash_ns,
        };
        TimerGuard {
            bucket,
            start: Instant::now(),
        }
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        let finished = self.finished.get().copied();
        let errors_by_kind = self
            .errors_by_kind
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .iter()
            .map(|(k, v)| (k.as_str().to_string(), *v))
            .collect();

        StatsSnapshot {
            run: RunSnapshot {
                started_at: self.started_at,
                ended_at: finished.map(|f| f.ended_at),
                duration_ms: self.duration().as_millis() as u64,
                bytes_read: self.bytes_read.get(),
                bytes_written: self.bytes_written.get(),
            },
            files: FilesSnapshot {
                seen: self.files.seen.get(),
                matched: self.files.matched.get(),
                moved: self.files.moved.get(),
                renamed: self.files.renamed.get(),
                copied: self.files.copied.get(),
                overwritten: self.files.overwritten.get(),
                skipped: self.files.skipped.get(),
                failed: self.files.failed.get(),
            },
            decisions: DecisionsSnapshot {
                same_fs: self.same_fs.get(),
                cross_fs: self.cross_fs.get(),
                conflicts: self.conflicts.get(),
                duplicates: self.duplicates.get(),
            },
            hash: HashSnapshot {
                algorithm: HASH_ALGORITHM,
                computed: self.hash_computed.get(),
                verified: self.hash_verified.get(),
                skipped: self.hash_skipped.get(),
            },
            operations: OperationsSnapshot {
                rename: self.op_rename.get(),
                copy: self.op_copy.get(),
                link: self.op_link.get(),
                delete: self.op_delete.get(),
            },
            regroup: RegroupSnapshot {
                linked: self.regrouped.get(),
                failed: self.regroup_failed.get(),
            },
            timing: TimingSnapshot {
                walk_ms: ns_to_ms(self.timing.walk_ns.get()),
                classify_ms: ns_to_ms(self.timing.classify_ns.get()),
                move_ms: ns_to_ms(self.timing.move_ns.get()),
                hash_ms: ns_to_ms(self.timing.hash_ns.get()),
            },
            errors: ErrorsSnapshot {
                total: self.errors_total.get(),
                by_kind: errors_by_kind,
            },
        }
    }

    pub fn to_json(&self, pretty: bool) -> Result<String> {
        let snap = self.snapshot();
        let out = if pretty {
            serde_json::to_string_pretty(&snap)
        } else {
            serde_json::to_string(&snap)
        };
        out.context("serialize run statistics")
    }

    pub fn write_json(&self, path: &Path) -> Result<()> {
        let json = self.to_json(true)?;
        fs::write(path, json + "\n")
            .with_context(|| format!("write statistics to '{}'", path.display()))
    }
}

fn ns_to_ms(ns: u64) -> f64 {
    ns as f64 / 1_000_000.0
}

/// Adds the elapsed time to its bucket when dropped.
pub struct TimerGuard<'a> {
    bucket: &'a Counter,
    start: Instant,
}

impl Drop for TimerGuard<'_> {
    fn drop(&mut self) {
        let ns = u64::try_from(self.start.elapsed().as_nanos()).unwrap_or(u64::MAX);
        self.bucket.add(ns);
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct StatsSnapshot {
    pub run: RunSnapshot,
    pub files: FilesSnapshot,
    pub decisions: DecisionsSnapshot,
    pub hash: HashSnapshot,
    pub operations: OperationsSnapshot,
    pub regroup: RegroupSnapshot,
    pub timing: TimingSnapshot,
    pub errors: ErrorsSnapshot,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunSnapshot {
    pub started_at: DateTime<Local>,
    pub ended_at: Option<DateTime<Local>>,
    pub duration_ms: u64,
    pub bytes_read: u64,
    pub bytes_written: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct FilesSnapshot {
    pub seen: u64,
    pub matched: u64,
    pub moved: u64,
    pub renamed: u64,
    pub copied: u64,
    pub overwritten: u64,
    pub skipped: u64,
    pub failed: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct DecisionsSnapshot {
    pub same_fs: u64,
    pub cross_fs: u64,
    pub conflicts: u64,
    pub duplicates: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct HashSnapshot {
    pub algorithm: &'static str,
    pub computed: u64,
    pub verified: u64,
    pub skipped: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct OperationsSnapshot {
    pub rename: u64,
    pub copy: u64,
    pub link: u64,
    pub delete: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct RegroupSnapshot {
    pub linked: u64,
    pub failed: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct TimingSnapshot {
    pub walk_ms: f64,
    pub classify_ms: f64,
    pub move_ms: f64,
    pub hash_ms: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ErrorsSnapshot {
    pub total: u64,
    pub by_kind: BTreeMap<String, u64>,
}

/// 1536 -> "1.5 KiB".
pub fn format_bytes(n: u64) -> String {
    const KB: f64 = 1024.0;
    const MB: f64 = KB * 1024.0;
    const GB: f64 = MB * 1024.0;
    const TB: f64 = GB * 1024.0;
    let f = n as f64;
    if f >= TB {
        format!("{:.1} TiB", f / TB)
    } else if f >= GB {
        format!("{:.1} GiB", f / GB)
    } else if f >= MB {
        format!("{:.1} MiB", f / MB)
    } else if f >= KB {
        format!("{:.1} KiB", f / KB)
    } else {
        format!("{} B", n)
    }
}

impl fmt::Display for Stats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = self.snapshot();
        writeln!(f, "Run duration: {:.3}s", self.duration().as_secs_f64())?;
        writeln!(f, "Files:")?;
        writeln!(f, "  Seen:        {}", s.files.seen)?;
        writeln!(f, "  Matched:     {}", s.files.matched)?;
        writeln!(f, "  Moved:       {}", s.files.moved)?;
        writeln!(f, "    Renamed:     {}", s.files.renamed)?;
        writeln!(f, "    Copied:      {}", s.files.copied)?;
        writeln!(f, "    Overwritten: {}", s.files.overwritten)?;
        writeln!(f, "  Skipped:     {}", s.files.skipped)?;
        writeln!(f, "  Failed:      {}", s.files.failed)?;
        if s.decisions.conflicts > 0 {
            writeln!(
                f,
                "Conflicts: {} ({} identical)",
                s.decisions.conflicts, s.decisions.duplicates
            )?;
        }
        if s.run.bytes_written > 0 {
            writeln!(f, "Data moved: {}", format_bytes(s.run.bytes_written))?;
        }
        if s.decisions.cross_fs > 0 {
            writeln!(f, "Cross-filesystem copies: {}", s.decisions.cross_fs)?;
        }
        if s.hash.computed > 0 {
            writeln!(
                f,
                "Hashing: {} computed, {} verified ({})",
                s.hash.computed, s.hash.verified, s.hash.algorithm
            )?;
        }
        if s.regroup.linked > 0 || s.regroup.failed > 0 {
            writeln!(
                f,
                "Regroup: {} linked, {} failed",
                s.regroup.linked, s.regroup.failed
            )?;
        }
        if s.errors.total > 0 {
            let kinds: Vec<String> = s
                .errors
                .by_kind
                .iter()
                .map(|(k, v)| format!("{k}={v}"))
                .collect();
            writeln!(f, "Errors: {} ({})", s.errors.total, kinds.join(", "))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn concurrent_increments_are_not_lost() {
        let stats = Arc::new(Stats::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let s = Arc::clone(&stats);
                thread::spawn(move || {
                    for _ in 0..1000 {
                        s.file_seen(2);
                        s.file_skipped();
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        let snap = stats.snapshot();
        assert_eq!(snap.files.seen, 8000);
        assert_eq!(snap.files.skipped, 8000);
        assert_eq!(snap.run.bytes_read, 16000);
    }

    #[test]
    fn specialised_moves_also_count_as_moved() {
        let stats = Stats::new();
        stats.file_moved(10);
        stats.file_renamed(20);
        stats.file_copied(30);
        stats.file_overwritten(40);
        let snap = stats.snapshot();
        assert_eq!(snap.files.moved, 4);
        assert_eq!(snap.files.renamed, 1);
        assert_eq!(snap.files.copied, 1);
        assert_eq!(snap.files.overwritten, 1);
        assert_eq!(snap.run.bytes_written, 100);
    }

    #[test]
    fn failed_action_counts_without_touching_bytes() {
        let stats = Stats::new();
        stats.record_action(MoveAction::Failed, 99);
        stats.record_action(MoveAction::SkippedIdentical, 5);
        let snap = stats.snapshot();
        assert_eq!(snap.files.failed, 1);
        assert_eq!(snap.files.skipped, 1);
        assert_eq!(snap.run.bytes_written, 0);
        assert_eq!(snap.errors.total, 0);
    }

    #[test]
    fn errors_are_bucketed_by_kind() {
        let stats = Stats::new();
        stats.error(&anyhow::Error::new(io::Error::from(io::ErrorKind::NotFound)));
        stats.error(&anyhow::Error::new(io::Error::from(
            io::ErrorKind::PermissionDenied,
        )));
        stats.error(&anyhow::anyhow!("weird"));
        stats.regroup_error(&anyhow::anyhow!("link failed"));

        let snap = stats.snapshot();
        assert_eq!(snap.files.failed, 3);
        assert_eq!(snap.errors.total, 4);
        assert_eq!(snap.regroup.failed, 1);
        assert_eq!(snap.errors.by_kind.get("not_found"), Some(&1));
        assert_eq!(snap.errors.by_kind.get("permission"), Some(&1));
        assert_eq!(snap.errors.by_kind.get("other"), Some(&2));
    }

    #[test]
    fn timer_guard_accumulates_into_bucket() {
        let stats = Stats::new();
        {
            let _t = stats.time(Section::Hash);
            thread::sleep(Duration::from_millis(5));
        }
        assert!(stats.timing.hash_ns.get() >= 5_000_000);
        assert_eq!(stats.timing.walk_ns.get(), 0);
    }

    #[test]
    fn finish_freezes_duration() {
        let stats = Stats::new();
        stats.finish();
        let d1 = stats.duration();
        thread::sleep(Duration::from_millis(3));
        stats.finish();
        assert_eq!(stats.duration(), d1);
        assert!(stats.snapshot().run.ended_at.is_some());
    }

    #[test]
    fn json_export_has_nested_sections() {
        let stats = Stats::new();
        stats.file_seen(5);
        stats.finish();
        let v: serde_json::Value = serde_json::from_str(&stats.to_json(false).unwrap()).unwrap();
        assert_eq!(v["files"]["seen"], 1);
        assert_eq!(v["hash"]["algorithm"], "sha256");
        assert!(v["run"]["ended_at"].is_string());
    }

    #[test]
    fn summary_mentions_counts() {
        let stats = Stats::new();
        stats.file_seen(2048);
        stats.file_moved(2048);
        let text = stats.to_string();
        assert!(text.contains("Moved:       1"), "{text}");
        assert!(text.contains("Data moved: 2.0 KiB"), "{text}");
    }

    #[test]
    fn format_bytes_units() {
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(1536), "1.5 KiB");
        assert_eq!(format_bytes(5 * 1024 * 1024), "5.0 MiB");
    }
}
