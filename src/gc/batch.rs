//! Batch runner: every configured unit, isolated from the others.

use super::{Clock, RetentionUnit, UnitReport, duration_to_millis, u64_to_f64};
use crate::Error;
use std::path::PathBuf;
use std::time::Instant;
use tracing::{error, info};

/// A unit that did not complete.
#[derive(Debug)]
pub struct UnitFailure {
    /// Join key of the unit.
    pub unit: String,
    /// Configured search root of the unit.
    pub root: PathBuf,
    /// What went wrong.
    pub error: Error,
}

/// Outcome of running every unit once.
#[derive(Debug, Default)]
pub struct BatchReport {
    /// Units that completed, in run order.
    pub completed: Vec<UnitReport>,
    /// Units that failed, in run order.
    pub failed: Vec<UnitFailure>,
    /// Wall time of the batch in milliseconds.
    pub duration_ms: u64,
}

impl BatchReport {
    /// Returns `true` if every unit completed.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }

    /// Returns the number of subtrees deleted across all completed units.
    #[must_use]
    pub fn subtrees_deleted(&self) -> usize {
        self.completed.iter().map(|r| r.subtrees_deleted).sum()
    }

    /// Returns a multi-line summary: one line per unit, then a total.
    #[must_use]
    pub fn summary(&self) -> String {
        let mut lines: Vec<String> = self.completed.iter().map(UnitReport::summary).collect();
        lines.extend(
            self.failed
                .iter()
                .map(|f| format!("{}: FAILED - {}", f.unit, f.error)),
        );
        lines.push(format!(
            "{} unit(s) completed, {} failed, {} subtree(s) deleted in {}ms",
            self.completed.len(),
            self.failed.len(),
            self.subtrees_deleted(),
            self.duration_ms
        ));
        lines.join("\n")
    }
}

/// Runs a list of units one after another.
///
/// A failing unit is logged and recorded; it never stops the units after it.
pub struct BatchRunner<C: Clock> {
    units: Vec<RetentionUnit>,
    clock: C,
}

impl<C: Clock> BatchRunner<C> {
    /// Creates a runner over `units`.
    #[must_use]
    pub const fn new(units: Vec<RetentionUnit>, clock: C) -> Self {
        Self { units, clock }
    }

    /// Runs every unit.
    #[must_use]
    pub fn run(&self) -> BatchReport {
        let start = Instant::now();
        let mut report = BatchReport::default();

        for unit in &self.units {
            match unit.run(&self.clock) {
                Ok(unit_report) => {
                    metrics::counter!("dircull_units_total", "outcome" => "completed").increment(1);
                    report.completed.push(unit_report);
                },
                Err(err) => {
                    metrics::counter!("dircull_units_total", "outcome" => "failed").increment(1);
                    error!(
                        unit = unit.key(),
                        root = %unit.search_root().display(),
                        match_pattern = %unit.match_pattern(),
                        exclude_pattern = %unit.policy().exclude(),
                        step = err.step().map_or("unknown", crate::UnitStep::as_str),
                        error = %err,
                        "Retention unit failed"
                    );
                    report.failed.push(UnitFailure {
                        unit: unit.key().to_string(),
                        root: unit.search_root().to_path_buf(),
                        error: err,
                    });
                },
            }
        }

        report.duration_ms = duration_to_millis(start.elapsed());
        metrics::histogram!("dircull_batch_duration_ms").record(u64_to_f64(report.duration_ms));
        metrics::gauge!("dircull_last_run_timestamp_seconds")
            .set(u64_to_f64(crate::current_timestamp()));

        info!(
            completed = report.completed.len(),
            failed = report.failed.len(),
            subtrees_deleted = report.subtrees_deleted(),
            duration_ms = report.duration_ms,
            "Batch completed"
        );

        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gc::FixedClock;
    use crate::models::{NamePattern, RetentionWindow, SECONDS_PER_DAY, UnitConfig};
    use std::fs;
    use std::path::Path;
    use std::time::{Duration, SystemTime};
    use tempfile::TempDir;

    fn unit(key: &str, root: &Path) -> RetentionUnit {
        RetentionUnit::new(UnitConfig {
            key: key.to_string(),
            search_path: root.to_path_buf(),
            match_pattern: NamePattern::new("build-.*").expect("pattern"),
            exclude_pattern: NamePattern::new("keep-.*").expect("pattern"),
            keep_duration: RetentionWindow::days(5),
        })
    }

    fn later() -> FixedClock {
        FixedClock(SystemTime::now() + Duration::from_secs(10 * SECONDS_PER_DAY))
    }

    #[test]
    fn test_failed_unit_does_not_stop_others() {
        let dir = TempDir::new().expect("tempdir");
        let good = dir.path().join("good");
        fs::create_dir_all(good.join("build-1/out")).expect("mkdir");

        let runner = BatchRunner::new(
            vec![unit("missing", &dir.path().join("nope")), unit("good", &good)],
            later(),
        );
        let report = runner.run();

        assert!(!report.is_success());
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].unit, "missing");
        assert!(matches!(report.failed[0].error, Error::PathResolution { .. }));

        assert_eq!(report.completed.len(), 1);
        assert_eq!(report.completed[0].unit, "good");
        assert!(!good.join("build-1/out").exists());
    }

    #[test]
    fn test_empty_batch_succeeds() {
        let report = BatchRunner::new(Vec::new(), later()).run();
        assert!(report.is_success());
        assert!(report.summary().contains("0 unit(s) completed, 0 failed"));
    }

    #[test]
    fn test_summary_lists_failures() {
        let dir = TempDir::new().expect("tempdir");
        let report = BatchRunner::new(vec![unit("gone", &dir.path().join("x"))], later()).run();
        let summary = report.summary();
        assert!(summary.contains("gone: FAILED - unit 'gone': search root"));
        assert!(summary.ends_with(&format!(
            "0 unit(s) completed, 1 failed, 0 subtree(s) deleted in {}ms",
            report.duration_ms
        )));
    }
}
