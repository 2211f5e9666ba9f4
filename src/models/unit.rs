//! Retention unit records and the values produced while running one.

use super::NamePattern;
use serde::Serialize;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Seconds in one retention day.
pub const SECONDS_PER_DAY: u64 = 86_400;

/// Age threshold, in whole days, below which a directory is protected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct RetentionWindow(u32);

impl RetentionWindow {
    /// Creates a window of `days` whole days.
    #[must_use]
    pub const fn days(days: u32) -> Self {
        Self(days)
    }

    /// Returns the window length in days.
    #[must_use]
    pub const fn as_days(self) -> u32 {
        self.0
    }

    /// Returns the window length in seconds.
    #[must_use]
    pub const fn as_secs(self) -> u64 {
        self.0 as u64 * SECONDS_PER_DAY
    }

    /// Returns the instant before which entries are no longer protected.
    ///
    /// Saturates at the Unix epoch.
    #[must_use]
    pub fn cutoff(self, now: SystemTime) -> SystemTime {
        let since_epoch = now.duration_since(UNIX_EPOCH).unwrap_or(Duration::ZERO);
        UNIX_EPOCH + since_epoch.saturating_sub(Duration::from_secs(self.as_secs()))
    }

    /// Returns `true` if an entry created at `created` is still inside the
    /// window at `now`.
    #[must_use]
    pub fn protects(self, created: SystemTime, now: SystemTime) -> bool {
        created > self.cutoff(now)
    }
}

/// A directory whose name matched a unit's match pattern.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MatchPoint {
    /// Path of the matched directory.
    pub path: PathBuf,
    /// Depth of the directory containing the match; the search root is 0.
    ///
    /// A match directly inside the root has depth 0, and `root/a/b/target`
    /// has depth 2.
    pub depth: usize,
}

/// An immediate child directory of a match point.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChildDir {
    /// Full path of the child.
    pub path: PathBuf,
    /// Base name of the child.
    pub name: OsString,
}

impl ChildDir {
    /// Builds a child from its path, taking the base name from the last
    /// component.
    #[must_use]
    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let name = path.file_name().map(ToOwned::to_owned).unwrap_or_default();
        Self { path, name }
    }
}

/// A child of a match point that failed the retention predicate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeletionCandidate {
    /// The subtree to remove.
    pub path: PathBuf,
    /// The match point the candidate was found under.
    pub match_point: PathBuf,
}

impl DeletionCandidate {
    /// Returns the path of the subtree to remove.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// One fully joined configuration row.
///
/// All four fields come from the same join key; a row is only ever built by
/// [`crate::config::ConfigJoiner`] once every table had an entry for the key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnitConfig {
    /// The join key shared by the four configuration tables.
    pub key: String,
    /// The directory to scan.
    pub search_path: PathBuf,
    /// Pattern selecting match points.
    pub match_pattern: NamePattern,
    /// Pattern protecting children by name.
    pub exclude_pattern: NamePattern,
    /// Window protecting children by age.
    pub keep_duration: RetentionWindow,
}
