//! # Dircull
//!
//! Retires stale directory trees under a set of configured search roots.
//!
//! Each search root is bound to a match pattern, an exclusion pattern and a
//! retention window. Directories whose name matches the pattern are located
//! at any depth below the root; their immediate children are removed unless
//! the child name matches the exclusion pattern or the child is younger than
//! the retention window.
//!
//! ## Features
//!
//! - Lazy, stack-based directory matching that never follows symlinks or
//!   enters hidden directories
//! - Bottom-up subtree deletion without recursion, safe on deep trees
//! - Multi-root configuration joined by key, failing closed on missing entries
//! - Per-root error isolation with a non-zero exit code on any failure
//!
//! ## Example
//!
//! ```rust,ignore
//! use dircull::config::DircullConfig;
//! use dircull::gc::{BatchRunner, RetentionUnit, SystemClock};
//!
//! let config = DircullConfig::load_from_file("dircull.toml".as_ref())?;
//! let units = config
//!     .join()?
//!     .into_iter()
//!     .map(|unit| RetentionUnit::from_config(unit, &config.run_settings()))
//!     .collect();
//!
//! let report = BatchRunner::new(units, SystemClock).run();
//! println!("{}", report.summary());
//! ```

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![warn(missing_docs)]
#![forbid(unsafe_code)]
#![allow(clippy::multiple_crate_versions)]

use std::io;
use std::path::PathBuf;

use thiserror::Error as ThisError;

pub mod config;
pub mod gc;
pub mod models;
pub mod observability;

pub use config::{ConfigJoiner, DircullConfig, JoinProblem};
pub use gc::{
    BatchReport, BatchRunner, Clock, DeletionPolicy, DirectoryMatcher, RetentionPolicy,
    RetentionUnit, ScanErrorPolicy, SubtreeDeleter, SystemClock, UnitReport,
};
pub use models::{DeletionCandidate, MatchPoint, NamePattern, RetentionWindow, UnitConfig};

/// Error type for dircull operations.
///
/// | Variant | Raised When | Scope |
/// |---------|-------------|-------|
/// | `InvalidInput` | Unreadable or unparsable configuration, bad CLI input | process |
/// | `ConfigJoin` | A search path key is missing from a table or has a malformed value | whole batch |
/// | `PathResolution` | A search root does not exist or is not a directory | one unit |
/// | `Scan` | Enumerating or statting a directory failed during matching | one unit |
/// | `Deletion` | Removing a file or directory failed | one unit |
/// | `OperationFailed` | Observability setup or metrics export failed | process |
#[derive(Debug, ThisError)]
pub enum Error {
    /// Invalid input was provided.
    ///
    /// Raised when:
    /// - The configuration file cannot be read or is not valid TOML
    /// - No configuration file could be located
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// The configuration tables could not be joined into units.
    ///
    /// Every problem found is collected; no unit is produced.
    #[error("configuration join failed: {}", describe_problems(.problems))]
    ConfigJoin {
        /// Everything that prevented the join.
        problems: Vec<JoinProblem>,
    },

    /// A search root could not be resolved.
    #[error("unit '{unit}': search root {} cannot be resolved: {source}", .path.display())]
    PathResolution {
        /// Join key of the failing unit.
        unit: String,
        /// The configured search root.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// Matching or evaluating candidates failed.
    ///
    /// Candidates already collected for the unit are discarded.
    #[error("unit '{unit}': scan failed at {}: {source}", .path.display())]
    Scan {
        /// Join key of the failing unit.
        unit: String,
        /// The path that could not be read.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// Removing a candidate subtree failed.
    #[error(
        "unit '{unit}': deletion failed at {} ({failures} path(s) not removed): {source}",
        .path.display()
    )]
    Deletion {
        /// Join key of the failing unit.
        unit: String,
        /// The first path that could not be removed.
        path: PathBuf,
        /// Total number of paths that could not be removed.
        failures: usize,
        /// The I/O error for `path`.
        #[source]
        source: io::Error,
    },

    /// An operation failed.
    ///
    /// Raised when:
    /// - The tracing subscriber cannot be installed
    /// - The log file cannot be opened
    /// - The metrics textfile cannot be written
    #[error("operation '{operation}' failed: {cause}")]
    OperationFailed {
        /// The operation that failed.
        operation: String,
        /// The underlying cause.
        cause: String,
    },
}

/// The step of a unit run in which an error occurred.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitStep {
    /// Resolving the search root.
    Resolve,
    /// Matching directories and evaluating their children.
    Match,
    /// Deleting candidate subtrees.
    Delete,
}

impl UnitStep {
    /// Returns the step name used in logs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Resolve => "resolve",
            Self::Match => "match",
            Self::Delete => "delete",
        }
    }
}

impl std::fmt::Display for UnitStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Error {
    /// Returns the unit step this error belongs to, if it is a unit error.
    #[must_use]
    pub const fn step(&self) -> Option<UnitStep> {
        match self {
            Self::PathResolution { .. } => Some(UnitStep::Resolve),
            Self::Scan { .. } => Some(UnitStep::Match),
            Self::Deletion { .. } => Some(UnitStep::Delete),
            _ => None,
        }
    }

    /// Returns the join key of the failing unit, if it is a unit error.
    #[must_use]
    pub fn unit(&self) -> Option<&str> {
        match self {
            Self::PathResolution { unit, .. }
            | Self::Scan { unit, .. }
            | Self::Deletion { unit, .. } => Some(unit.as_str()),
            _ => None,
        }
    }
}

fn describe_problems(problems: &[JoinProblem]) -> String {
    problems
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Result type alias for dircull operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Returns the current Unix timestamp in seconds.
///
/// Falls back to 0 if the system clock is before the Unix epoch.
///
/// # Examples
///
/// ```rust
/// use dircull::current_timestamp;
///
/// let ts = current_timestamp();
/// assert!(ts > 0);
/// ```
#[must_use]
pub fn current_timestamp() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Table;

    #[test]
    fn test_error_display() {
        let err = Error::InvalidInput("test error".to_string());
        assert_eq!(err.to_string(), "invalid input: test error");

        let err = Error::OperationFailed {
            operation: "test".to_string(),
            cause: "failed".to_string(),
        };
        assert_eq!(err.to_string(), "operation 'test' failed: failed");

        let err = Error::Scan {
            unit: "proj".to_string(),
            path: PathBuf::from("/srv/proj/build-1"),
            source: io::Error::from(io::ErrorKind::PermissionDenied),
        };
        let display = err.to_string();
        assert!(display.starts_with("unit 'proj': scan failed at /srv/proj/build-1"));
    }

    #[test]
    fn test_config_join_lists_every_problem() {
        let err = Error::ConfigJoin {
            problems: vec![
                JoinProblem::MissingEntry {
                    key: "a".to_string(),
                    table: Table::MatchPatterns,
                },
                JoinProblem::MissingEntry {
                    key: "b".to_string(),
                    table: Table::KeepDurations,
                },
            ],
        };
        let display = err.to_string();
        assert!(display.contains("'a' has no entry in [MatchPatterns]"));
        assert!(display.contains("'b' has no entry in [KeepDurations]"));
    }

    #[test]
    fn test_error_step_and_unit() {
        let err = Error::PathResolution {
            unit: "proj".to_string(),
            path: PathBuf::from("/missing"),
            source: io::Error::from(io::ErrorKind::NotFound),
        };
        assert_eq!(err.step(), Some(UnitStep::Resolve));
        assert_eq!(err.unit(), Some("proj"));

        let err = Error::Deletion {
            unit: "proj".to_string(),
            path: PathBuf::from("/srv/proj/build-1/out"),
            failures: 2,
            source: io::Error::from(io::ErrorKind::PermissionDenied),
        };
        assert_eq!(err.step(), Some(UnitStep::Delete));
        assert_eq!(err.step().map(UnitStep::as_str), Some("delete"));

        let err = Error::InvalidInput("x".to_string());
        assert_eq!(err.step(), None);
        assert_eq!(err.unit(), None);
    }
}
