//! Directory matcher.
//!
//! Walks a search root depth-first and yields every directory whose base
//! name matches a pattern. The walk:
//!
//! - ignores files entirely,
//! - never enters directories whose name starts with `.`,
//! - never follows symbolic links,
//! - never yields the search root itself,
//! - emits in post-order, so nested matches come before the matches that
//!   contain them.
//!
//! The iterator keeps its own stack of pending directories instead of
//! recursing. Each directory is listed in full when it is entered and its
//! handle is closed straight away, so deep trees do not hold one descriptor
//! per level.

use crate::models::{MatchPoint, NamePattern};
use serde::Deserialize;
use std::ffi::{OsStr, OsString};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// What to do when a directory cannot be read during the scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScanErrorPolicy {
    /// Yield the error and end the scan.
    #[default]
    Abort,
    /// Log the error, skip the unreadable subtree and continue.
    Skip,
}

impl ScanErrorPolicy {
    /// Returns the policy name used in configuration and logs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Abort => "abort",
            Self::Skip => "skip",
        }
    }
}

/// A directory that could not be read during the scan.
#[derive(Debug, thiserror::Error)]
#[error("cannot read {}: {source}", .path.display())]
pub struct ScanFailure {
    /// The directory or entry that failed.
    pub path: PathBuf,
    /// The underlying I/O error.
    #[source]
    pub source: io::Error,
}

/// A directory whose subdirectories are being visited.
struct Frame {
    /// Subdirectories not yet visited, last entry first.
    pending: Vec<(PathBuf, OsString)>,
    /// Depth assigned to matches found directly in this directory.
    depth: usize,
    /// This directory, if its own name matched; emitted once `pending` drains.
    matched: Option<MatchPoint>,
}

/// Lazy, post-order iterator over the directories matching a pattern.
///
/// The sequence cannot be restarted; create a new matcher to scan again.
///
/// # Example
///
/// ```rust,ignore
/// use dircull::{DirectoryMatcher, NamePattern};
///
/// let pattern = NamePattern::new("build-.*")?;
/// for point in DirectoryMatcher::new("/srv/builds", pattern) {
///     let point = point?;
///     println!("{} (depth {})", point.path.display(), point.depth);
/// }
/// ```
pub struct DirectoryMatcher {
    root: Option<PathBuf>,
    pattern: NamePattern,
    policy: ScanErrorPolicy,
    stack: Vec<Frame>,
    skipped: usize,
    finished: bool,
}

impl DirectoryMatcher {
    /// Creates a matcher over `root`. Nothing is read until the first call
    /// to `next`.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>, pattern: NamePattern) -> Self {
        Self {
            root: Some(root.into()),
            pattern,
            policy: ScanErrorPolicy::default(),
            stack: Vec::new(),
            skipped: 0,
            finished: false,
        }
    }

    /// Sets the scan error policy.
    #[must_use]
    pub const fn with_error_policy(mut self, policy: ScanErrorPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Returns how many unreadable subtrees were skipped so far.
    ///
    /// An unreadable directory that itself matches is yielded rather than
    /// skipped and is not counted here; listing it fails again for the caller.
    #[must_use]
    pub const fn skipped_subtrees(&self) -> usize {
        self.skipped
    }

    /// Lists a directory and pushes a frame for it.
    ///
    /// Returns `Some` when a read failure produces an item: the error under
    /// [`ScanErrorPolicy::Abort`], or the unreadable directory's own match
    /// under [`ScanErrorPolicy::Skip`].
    fn enter(
        &mut self,
        path: &Path,
        depth: usize,
        matched: Option<MatchPoint>,
    ) -> Option<Result<MatchPoint, ScanFailure>> {
        match list_subdirs(path) {
            Ok(mut pending) => {
                pending.reverse();
                self.stack.push(Frame {
                    pending,
                    depth,
                    matched,
                });
                None
            },
            Err(failure) => match (self.policy, matched) {
                (ScanErrorPolicy::Skip, Some(point)) => {
                    debug!(
                        path = %failure.path.display(),
                        error = %failure.source,
                        "Yielding unreadable match point"
                    );
                    Some(Ok(point))
                },
                _ => self.fail(failure),
            },
        }
    }

    fn fail(&mut self, failure: ScanFailure) -> Option<Result<MatchPoint, ScanFailure>> {
        match self.policy {
            ScanErrorPolicy::Abort => {
                self.finished = true;
                self.stack.clear();
                Some(Err(failure))
            },
            ScanErrorPolicy::Skip => {
                self.skipped += 1;
                warn!(
                    path = %failure.path.display(),
                    error = %failure.source,
                    "Skipping unreadable subtree"
                );
                None
            },
        }
    }
}

impl Iterator for DirectoryMatcher {
    type Item = Result<MatchPoint, ScanFailure>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }

        if let Some(root) = self.root.take() {
            if let Some(item) = self.enter(&root, 0, None) {
                return Some(item);
            }
        }

        loop {
            let Some(frame) = self.stack.last_mut() else {
                self.finished = true;
                return None;
            };

            let Some((path, name)) = frame.pending.pop() else {
                // Every subdirectory has been visited: emit this one.
                let done = self.stack.pop();
                if let Some(point) = done.and_then(|frame| frame.matched) {
                    return Some(Ok(point));
                }
                continue;
            };

            let depth = frame.depth;
            let matched = self
                .pattern
                .matches_os(&name)
                .then(|| MatchPoint {
                    path: path.clone(),
                    depth,
                });

            if let Some(item) = self.enter(&path, depth + 1, matched) {
                return Some(item);
            }
        }
    }
}

/// Returns `true` for names starting with the hidden-file marker.
fn is_hidden(name: &OsStr) -> bool {
    name.as_encoded_bytes().first() == Some(&b'.')
}

/// Lists the visible, non-symlink subdirectories of `path`, sorted by name.
fn list_subdirs(path: &Path) -> Result<Vec<(PathBuf, OsString)>, ScanFailure> {
    let failure = |path: &Path, source| ScanFailure {
        path: path.to_path_buf(),
        source,
    };

    let mut subdirs = Vec::new();
    for entry in fs::read_dir(path).map_err(|e| failure(path, e))? {
        let entry = entry.map_err(|e| failure(path, e))?;
        let name = entry.file_name();
        if is_hidden(&name) {
            continue;
        }
        // DirEntry::file_type does not follow symlinks.
        let file_type = entry.file_type().map_err(|e| failure(&entry.path(), e))?;
        if file_type.is_dir() {
            subdirs.push((entry.path(), name));
        }
    }
    subdirs.sort_by(|a, b| a.1.cmp(&b.1));
    Ok(subdirs)
}
