//! Retention predicate.
//!
//! Decides, for one child of a match point, whether it is kept or becomes a
//! deletion candidate:
//!
//! ```text
//! keep = exclude.matches(name) || created_at > now - window_days * 86400
//! ```
//!
//! The name check runs first. The age check needs a metadata read and only
//! runs when the name did not already protect the entry.
//!
//! # Creation time
//!
//! The filesystem birth time is used when the platform reports one. On Unix
//! the inode change time (`st_ctime`) is the fallback, and the modification
//! time is the last resort.
//!
//! # Clock
//!
//! "Now" is read from the injected [`Clock`] once per evaluated entry, so a
//! long scan compares every entry against the wall clock at the moment it is
//! evaluated.

use crate::models::{ChildDir, NamePattern, RetentionWindow};
use chrono::{DateTime, Utc};
use std::fs::{self, Metadata};
use std::io;
use std::path::Path;
use std::time::SystemTime;
use tracing::debug;

/// Source of the current time.
pub trait Clock: Send + Sync {
    /// Returns the current time.
    fn now(&self) -> SystemTime;
}

/// Wall-clock time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> SystemTime {
        SystemTime::now()
    }
}

/// A clock frozen at one instant.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub SystemTime);

impl Clock for FixedClock {
    fn now(&self) -> SystemTime {
        self.0
    }
}

/// Outcome of evaluating one child.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// The name matched the exclusion pattern.
    KeepExcluded,
    /// The entry is younger than the retention window.
    KeepRecent,
    /// The entry disappeared before its metadata could be read.
    Vanished,
    /// Neither check protected the entry.
    Expired,
}

impl Verdict {
    /// Returns `true` unless the entry should be deleted.
    #[must_use]
    pub const fn is_keep(self) -> bool {
        !matches!(self, Self::Expired)
    }

    /// Returns the verdict name used in logs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::KeepExcluded => "keep_excluded",
            Self::KeepRecent => "keep_recent",
            Self::Vanished => "vanished",
            Self::Expired => "expired",
        }
    }
}

/// Exclusion pattern and retention window for one unit.
#[derive(Debug, Clone)]
pub struct RetentionPolicy {
    exclude: NamePattern,
    window: RetentionWindow,
}

impl RetentionPolicy {
    /// Creates a retention policy.
    #[must_use]
    pub const fn new(exclude: NamePattern, window: RetentionWindow) -> Self {
        Self { exclude, window }
    }

    /// Returns the exclusion pattern.
    #[must_use]
    pub const fn exclude(&self) -> &NamePattern {
        &self.exclude
    }

    /// Returns the retention window.
    #[must_use]
    pub const fn window(&self) -> RetentionWindow {
        self.window
    }

    /// Evaluates a child of a match point.
    ///
    /// # Errors
    ///
    /// Returns the metadata read error, except `NotFound`, which yields
    /// [`Verdict::Vanished`].
    pub fn evaluate(&self, child: &ChildDir, clock: &dyn Clock) -> io::Result<Verdict> {
        if self.exclude.matches_os(&child.name) {
            return Ok(Verdict::KeepExcluded);
        }

        let created = match creation_time(&child.path) {
            Ok(created) => created,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!(path = %child.path.display(), "Entry vanished before evaluation");
                return Ok(Verdict::Vanished);
            },
            Err(e) => return Err(e),
        };

        let now = clock.now();
        if self.window.protects(created, now) {
            return Ok(Verdict::KeepRecent);
        }

        debug!(
            path = %child.path.display(),
            created = %DateTime::<Utc>::from(created).to_rfc3339(),
            cutoff = %DateTime::<Utc>::from(self.window.cutoff(now)).to_rfc3339(),
            "Entry is past the retention window"
        );
        Ok(Verdict::Expired)
    }

    /// Returns `true` if the child is retained.
    ///
    /// # Errors
    ///
    /// Returns the metadata read error, if any.
    pub fn keep(&self, child: &ChildDir, clock: &dyn Clock) -> io::Result<bool> {
        self.evaluate(child, clock).map(Verdict::is_keep)
    }
}

/// Reads the creation time of a path without following symlinks.
///
/// # Errors
///
/// Returns an error if the metadata cannot be read.
pub fn creation_time(path: &Path) -> io::Result<SystemTime> {
    let metadata = fs::symlink_metadata(path)?;
    metadata
        .created()
        .or_else(|_| change_time(&metadata))
        .or_else(|_| metadata.modified())
}

#[cfg(unix)]
fn change_time(metadata: &Metadata) -> io::Result<SystemTime> {
    use std::os::unix::fs::MetadataExt;
    use std::time::{Duration, UNIX_EPOCH};

    let secs = u64::try_from(metadata.ctime())
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidData, "ctime before epoch"))?;
    let nanos = u32::try_from(metadata.ctime_nsec()).unwrap_or(0);
    Ok(UNIX_EPOCH + Duration::new(secs, nanos))
}

#[cfg(not(unix))]
fn change_time(_metadata: &Metadata) -> io::Result<SystemTime> {
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        "change time not available on this platform",
    ))
}
