//! Retention unit orchestration.
//!
//! A unit runs in two phases. The evaluation pass resolves the search root,
//! drains the [`DirectoryMatcher`] and applies the [`RetentionPolicy`] to
//! every child of every match point, collecting the expired ones. Only a
//! complete evaluation can be handed to the deletion pass, so a scan error
//! anywhere in the unit leaves its tree untouched.

use super::{
    Clock, DeleteOutcome, DeletionPolicy, DirectoryMatcher, RetentionPolicy, ScanErrorPolicy,
    SubtreeDeleter, Verdict, duration_to_millis, u64_to_f64, usize_to_f64, usize_to_u64,
};
use crate::models::{ChildDir, DeletionCandidate, NamePattern, UnitConfig};
use crate::{Error, Result};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, error, info, instrument, warn};

/// Run-wide settings shared by every unit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSettings {
    /// What to do with unreadable directories while scanning.
    pub scan_policy: ScanErrorPolicy,
    /// What to do with entries that cannot be removed.
    pub deletion_policy: DeletionPolicy,
}

/// One search root with its patterns and retention window.
#[derive(Debug, Clone)]
pub struct RetentionUnit {
    key: String,
    search_root: PathBuf,
    match_pattern: NamePattern,
    policy: RetentionPolicy,
    scan_policy: ScanErrorPolicy,
    deleter: SubtreeDeleter,
}

impl RetentionUnit {
    /// Creates a unit with default scan and deletion policies.
    #[must_use]
    pub fn new(config: UnitConfig) -> Self {
        Self::from_config(config, &RunSettings::default())
    }

    /// Creates a unit from a joined configuration row.
    #[must_use]
    pub fn from_config(config: UnitConfig, settings: &RunSettings) -> Self {
        Self {
            key: config.key,
            search_root: config.search_path,
            match_pattern: config.match_pattern,
            policy: RetentionPolicy::new(config.exclude_pattern, config.keep_duration),
            scan_policy: settings.scan_policy,
            deleter: SubtreeDeleter::new(settings.deletion_policy),
        }
    }

    /// Sets the scan error policy.
    #[must_use]
    pub const fn with_scan_policy(mut self, policy: ScanErrorPolicy) -> Self {
        self.scan_policy = policy;
        self
    }

    /// Sets the deletion failure policy.
    #[must_use]
    pub const fn with_deletion_policy(mut self, policy: DeletionPolicy) -> Self {
        self.deleter = SubtreeDeleter::new(policy);
        self
    }

    /// Returns the join key.
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Returns the configured search root.
    #[must_use]
    pub fn search_root(&self) -> &Path {
        &self.search_root
    }

    /// Returns the match pattern.
    #[must_use]
    pub const fn match_pattern(&self) -> &NamePattern {
        &self.match_pattern
    }

    /// Returns the retention policy.
    #[must_use]
    pub const fn policy(&self) -> &RetentionPolicy {
        &self.policy
    }

    /// Resolves the search root to a canonical directory path.
    ///
    /// # Errors
    ///
    /// Returns [`Error::PathResolution`] if the root does not exist, cannot
    /// be read or is not a directory.
    pub fn resolve(&self) -> Result<PathBuf> {
        let failure = |source| Error::PathResolution {
            unit: self.key.clone(),
            path: self.search_root.clone(),
            source,
        };

        let root = fs::canonicalize(&self.search_root).map_err(failure)?;
        let metadata = fs::metadata(&root).map_err(failure)?;
        if !metadata.is_dir() {
            return Err(failure(io::Error::new(
                io::ErrorKind::NotADirectory,
                "search root is not a directory",
            )));
        }
        Ok(root)
    }

    /// Runs the evaluation pass without touching the filesystem.
    ///
    /// # Errors
    ///
    /// Returns [`Error::PathResolution`] if the root cannot be resolved and
    /// [`Error::Scan`] if a directory or entry cannot be read. Candidates
    /// collected before the error are discarded.
    pub fn evaluate(&self, clock: &dyn Clock) -> Result<Evaluation> {
        let started = Instant::now();
        let root = self.resolve()?;
        let mut report = UnitReport {
            unit: self.key.clone(),
            ..UnitReport::default()
        };
        let mut candidates = Vec::new();

        let mut matcher = DirectoryMatcher::new(&root, self.match_pattern.clone())
            .with_error_policy(self.scan_policy);

        for point in &mut matcher {
            let point = point.map_err(|failure| self.scan_error(failure.path, failure.source))?;
            report.match_points += 1;
            debug!(path = %point.path.display(), depth = point.depth, "Match point");

            let children = match list_child_dirs(&point.path) {
                Ok(listing) => {
                    report.vanished += listing.vanished;
                    listing.children
                },
                Err(e) if e.kind() == io::ErrorKind::NotFound => {
                    debug!(path = %point.path.display(), "Match point vanished");
                    continue;
                },
                Err(e) => {
                    self.tolerate(&point.path, e, &mut report)?;
                    continue;
                },
            };

            for child in children {
                report.children_checked += 1;
                let verdict = match self.policy.evaluate(&child, clock) {
                    Ok(verdict) => verdict,
                    Err(e) => {
                        self.tolerate(&child.path, e, &mut report)?;
                        continue;
                    },
                };
                debug!(
                    path = %child.path.display(),
                    verdict = verdict.as_str(),
                    "Evaluated child"
                );

                match verdict {
                    Verdict::KeepExcluded => report.kept_excluded += 1,
                    Verdict::KeepRecent => report.kept_recent += 1,
                    Verdict::Vanished => report.vanished += 1,
                    Verdict::Expired => candidates.push(DeletionCandidate {
                        path: child.path,
                        match_point: point.path.clone(),
                    }),
                }
            }
        }

        report.skipped_subtrees += matcher.skipped_subtrees();
        report.candidates = candidates.len();

        Ok(Evaluation {
            candidates,
            report,
            started,
        })
    }

    /// Removes every candidate of a completed evaluation.
    ///
    /// Independent candidates are still removed after one of them fails.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Deletion`] naming the first path that could not be
    /// removed and the total number of failures.
    pub fn delete(&self, evaluation: Evaluation) -> Result<UnitReport> {
        let (report, failure) = self.remove_candidates(evaluation);
        failure.map_or(Ok(report), Err)
    }

    /// Removes every candidate, returning the counts even when some fail.
    fn remove_candidates(&self, evaluation: Evaluation) -> (UnitReport, Option<Error>) {
        let Evaluation {
            candidates,
            mut report,
            started,
        } = evaluation;

        let mut first_failure = None;
        let mut failures = 0;

        for candidate in &candidates {
            match self.deleter.delete(candidate.path()) {
                Ok(DeleteOutcome::Removed(stats)) => {
                    report.subtrees_deleted += 1;
                    report.files_removed += stats.files;
                    report.dirs_removed += stats.dirs;
                    report.vanished += stats.vanished;
                    info!(
                        path = %candidate.path.display(),
                        match_point = %candidate.match_point.display(),
                        files = stats.files,
                        dirs = stats.dirs,
                        "Deleted expired subtree"
                    );
                },
                Ok(DeleteOutcome::AlreadyGone) => {
                    report.already_gone += 1;
                    debug!(path = %candidate.path.display(), "Candidate already gone");
                },
                Err(err) => {
                    report.files_removed += err.stats.files;
                    report.dirs_removed += err.stats.dirs;
                    report.skipped_subtrees += err.stats.skipped;
                    failures += err.failures.len();
                    error!(
                        path = %candidate.path.display(),
                        error = %err,
                        policy = self.deleter.policy().as_str(),
                        "Failed to delete subtree"
                    );
                    if first_failure.is_none() {
                        first_failure = err.failures.into_iter().next();
                    }
                },
            }
        }

        report.duration_ms = duration_to_millis(started.elapsed());

        let failure = first_failure.map(|first| Error::Deletion {
            unit: self.key.clone(),
            path: first.path,
            failures,
            source: first.source,
        });
        (report, failure)
    }

    /// Evaluates the unit and removes its expired subtrees.
    ///
    /// # Errors
    ///
    /// Returns the error of whichever step failed. No deletion happens
    /// unless the evaluation pass completed.
    #[instrument(
        name = "dircull.unit.run",
        skip(self, clock),
        fields(
            run_id = tracing::field::Empty,
            unit = %self.key,
            root = %self.search_root.display(),
            match_pattern = %self.match_pattern,
            exclude_pattern = %self.policy.exclude(),
            window_days = self.policy.window().as_days()
        )
    )]
    pub fn run(&self, clock: &dyn Clock) -> Result<UnitReport> {
        if let Some(run_id) = crate::observability::current_run_id() {
            tracing::Span::current().record("run_id", run_id.as_str());
        }

        let (report, failure) = self.remove_candidates(self.evaluate(clock)?);

        metrics::counter!("dircull_candidates_total").increment(usize_to_u64(report.candidates));
        metrics::counter!("dircull_subtrees_deleted_total")
            .increment(usize_to_u64(report.subtrees_deleted));
        metrics::counter!("dircull_entries_removed_total", "kind" => "file")
            .increment(usize_to_u64(report.files_removed));
        metrics::counter!("dircull_entries_removed_total", "kind" => "dir")
            .increment(usize_to_u64(report.dirs_removed));
        metrics::histogram!("dircull_unit_duration_ms").record(u64_to_f64(report.duration_ms));
        metrics::gauge!("dircull_unit_candidates", "unit" => self.key.clone())
            .set(usize_to_f64(report.candidates));

        info!(
            match_points = report.match_points,
            children_checked = report.children_checked,
            candidates = report.candidates,
            subtrees_deleted = report.subtrees_deleted,
            deletion_failed = failure.is_some(),
            duration_ms = report.duration_ms,
            "Retention unit completed"
        );

        failure.map_or(Ok(report), Err)
    }

    fn scan_error(&self, path: PathBuf, source: io::Error) -> Error {
        Error::Scan {
            unit: self.key.clone(),
            path,
            source,
        }
    }

    /// Applies the scan policy to a read failure during evaluation.
    fn tolerate(&self, path: &Path, source: io::Error, report: &mut UnitReport) -> Result<()> {
        match self.scan_policy {
            ScanErrorPolicy::Abort => Err(self.scan_error(path.to_path_buf(), source)),
            ScanErrorPolicy::Skip => {
                warn!(path = %path.display(), error = %source, "Skipping unreadable entry");
                report.skipped_subtrees += 1;
                Ok(())
            },
        }
    }
}

/// A completed evaluation pass, ready for deletion.
///
/// Only [`RetentionUnit::evaluate`] can build one.
#[derive(Debug)]
pub struct Evaluation {
    candidates: Vec<DeletionCandidate>,
    report: UnitReport,
    started: Instant,
}

impl Evaluation {
    /// Returns the expired children, in discovery order.
    #[must_use]
    pub fn candidates(&self) -> &[DeletionCandidate] {
        &self.candidates
    }

    /// Returns the counts gathered so far.
    #[must_use]
    pub const fn report(&self) -> &UnitReport {
        &self.report
    }
}

/// Counts for one unit run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UnitReport {
    /// Join key of the unit.
    pub unit: String,
    /// Directories matching the match pattern.
    pub match_points: usize,
    /// Children of match points evaluated.
    pub children_checked: usize,
    /// Children kept by the exclusion pattern.
    pub kept_excluded: usize,
    /// Children kept by the retention window.
    pub kept_recent: usize,
    /// Entries that disappeared before they were evaluated or removed.
    pub vanished: usize,
    /// Children that failed the retention check.
    pub candidates: usize,
    /// Candidates removed.
    pub subtrees_deleted: usize,
    /// Candidates that no longer existed at deletion time.
    pub already_gone: usize,
    /// Files and symlinks removed.
    pub files_removed: usize,
    /// Directories removed.
    pub dirs_removed: usize,
    /// Unreadable subtrees skipped or left in place.
    pub skipped_subtrees: usize,
    /// Wall time of the run in milliseconds.
    pub duration_ms: u64,
}

impl UnitReport {
    /// Returns a one-line summary.
    #[must_use]
    pub fn summary(&self) -> String {
        if self.candidates == 0 {
            return format!(
                "{}: nothing to delete ({} match point(s), {} child(ren) checked in {}ms)",
                self.unit, self.match_points, self.children_checked, self.duration_ms
            );
        }

        format!(
            "{}: deleted {} of {} expired subtree(s) ({} files, {} dirs), kept {} by name and {} by age - {} match point(s) in {}ms",
            self.unit,
            self.subtrees_deleted,
            self.candidates,
            self.files_removed,
            self.dirs_removed,
            self.kept_excluded,
            self.kept_recent,
            self.match_points,
            self.duration_ms
        )
    }
}

/// The child directories of one match point.
#[derive(Debug, Default, PartialEq, Eq)]
struct ChildListing {
    /// Child directories, sorted by name.
    children: Vec<ChildDir>,
    /// Entries that disappeared while being listed.
    vanished: usize,
}

/// Lists the immediate child directories of a match point.
///
/// Symlinks are not directories here, whatever they point to.
fn list_child_dirs(dir: &Path) -> io::Result<ChildListing> {
    let entries = fs::read_dir(dir)?.map(|entry| {
        let entry = entry?;
        let is_dir = entry.file_type()?.is_dir();
        Ok((entry.path(), is_dir))
    });
    collect_child_dirs(entries)
}

/// Keeps the directory entries, counting the ones that vanished.
fn collect_child_dirs(
    entries: impl IntoIterator<Item = io::Result<(PathBuf, bool)>>,
) -> io::Result<ChildListing> {
    let mut listing = ChildListing::default();
    for entry in entries {
        match entry {
            Ok((path, true)) => listing.children.push(ChildDir::from_path(path)),
            Ok((_, false)) => {},
            Err(e) if e.kind() == io::ErrorKind::NotFound => listing.vanished += 1,
            Err(e) => return Err(e),
        }
    }
    listing.children.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(listing)
}
