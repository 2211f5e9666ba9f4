//! Subtree deletion.
//!
//! Removes a directory and everything beneath it without recursion, using
//! two explicit stacks:
//!
//! 1. `to_visit` starts with the root. Each popped entry is pushed onto
//!    `to_delete`; if it is a directory its children are pushed onto
//!    `to_visit`.
//! 2. `to_delete` is drained last-in-first-out. Files and symlinks are
//!    unlinked, directories are removed with an empty-directory removal.
//!
//! A child always lands on `to_delete` after its parent, so draining in LIFO
//! order removes every child before the directory that holds it. Symlinks
//! are never followed: a link to a directory is unlinked, not entered.
//!
//! Entries that disappear while the subtree is being removed count as
//! already removed.

use serde::Deserialize;
use std::collections::HashSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// What to do when an entry cannot be removed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
pub enum DeletionPolicy {
    /// Stop removing the subtree at the first failure.
    #[default]
    #[serde(rename = "abort", alias = "abort-subtree")]
    AbortSubtree,
    /// Keep removing independent entries and report every failure.
    #[serde(rename = "continue", alias = "best-effort")]
    BestEffort,
}

impl DeletionPolicy {
    /// Returns the policy name used in configuration and logs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::AbortSubtree => "abort",
            Self::BestEffort => "continue",
        }
    }
}

/// Kind of filesystem entry, read without following symlinks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    /// A directory, removed once empty.
    Dir,
    /// A file, symlink or other non-directory entry, unlinked.
    File,
}

/// An entry that could not be removed.
#[derive(Debug, thiserror::Error)]
#[error("cannot remove {}: {source}", .path.display())]
pub struct DeletionFailure {
    /// The entry that failed.
    pub path: PathBuf,
    /// The underlying I/O error.
    #[source]
    pub source: io::Error,
}

/// Counts for one subtree removal.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeleteStats {
    /// Files and symlinks unlinked.
    pub files: usize,
    /// Directories removed.
    pub dirs: usize,
    /// Entries that disappeared before they could be removed.
    pub vanished: usize,
    /// Directories left in place because something beneath them failed.
    pub skipped: usize,
}

/// Result of removing a subtree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    /// The subtree was removed.
    Removed(DeleteStats),
    /// The root no longer existed.
    AlreadyGone,
}

/// A subtree that was not completely removed.
#[derive(Debug, thiserror::Error)]
#[error("{} path(s) under {} could not be removed", .failures.len(), .root.display())]
pub struct SubtreeDeleteError {
    /// Root of the subtree.
    pub root: PathBuf,
    /// Every entry that failed; never empty.
    pub failures: Vec<DeletionFailure>,
    /// What was removed before giving up.
    pub stats: DeleteStats,
}

/// Iterative, bottom-up subtree deleter.
#[derive(Debug, Clone, Copy, Default)]
pub struct SubtreeDeleter {
    policy: DeletionPolicy,
}

impl SubtreeDeleter {
    /// Creates a deleter with the given failure policy.
    #[must_use]
    pub const fn new(policy: DeletionPolicy) -> Self {
        Self { policy }
    }

    /// Returns the failure policy.
    #[must_use]
    pub const fn policy(&self) -> DeletionPolicy {
        self.policy
    }

    /// Removes `root` and everything beneath it.
    ///
    /// # Errors
    ///
    /// Returns every entry that could not be removed. With
    /// [`DeletionPolicy::AbortSubtree`] that is exactly the first failure.
    pub fn delete(&self, root: &Path) -> Result<DeleteOutcome, SubtreeDeleteError> {
        self.delete_with(root, |_, _| {})
    }

    /// Removes `root` and everything beneath it, calling `on_removed` after
    /// each entry is removed.
    ///
    /// # Errors
    ///
    /// See [`SubtreeDeleter::delete`].
    pub fn delete_with<F>(
        &self,
        root: &Path,
        mut on_removed: F,
    ) -> Result<DeleteOutcome, SubtreeDeleteError>
    where
        F: FnMut(&Path, EntryKind),
    {
        let mut run = Removal::new(root, self.policy);

        match fs::symlink_metadata(root) {
            Ok(_) => {},
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!(path = %root.display(), "Subtree already gone");
                return Ok(DeleteOutcome::AlreadyGone);
            },
            Err(e) => {
                run.fail(root, e);
                return Err(run.into_error());
            },
        }

        let mut to_visit = vec![root.to_path_buf()];
        let mut to_delete: Vec<(PathBuf, EntryKind)> = Vec::new();

        while let Some(path) = to_visit.pop() {
            let metadata = match fs::symlink_metadata(&path) {
                Ok(metadata) => metadata,
                Err(e) if e.kind() == io::ErrorKind::NotFound => {
                    run.stats.vanished += 1;
                    continue;
                },
                Err(e) => {
                    if run.fail(&path, e) {
                        return Err(run.into_error());
                    }
                    continue;
                },
            };

            if !metadata.is_dir() {
                to_delete.push((path, EntryKind::File));
                continue;
            }

            match list_children(&path) {
                Ok(children) => {
                    to_delete.push((path, EntryKind::Dir));
                    to_visit.extend(children);
                },
                Err(e) if e.kind() == io::ErrorKind::NotFound => {
                    run.stats.vanished += 1;
                },
                Err(e) => {
                    if run.fail(&path, e) {
                        return Err(run.into_error());
                    }
                },
            }
        }

        while let Some((path, kind)) = to_delete.pop() {
            if run.blocked.contains(&path) {
                run.stats.skipped += 1;
                continue;
            }

            let removed = match kind {
                EntryKind::Dir => fs::remove_dir(&path),
                EntryKind::File => fs::remove_file(&path),
            };

            match removed {
                Ok(()) => {
                    match kind {
                        EntryKind::Dir => run.stats.dirs += 1,
                        EntryKind::File => run.stats.files += 1,
                    }
                    on_removed(&path, kind);
                },
                Err(e) if e.kind() == io::ErrorKind::NotFound => {
                    run.stats.vanished += 1;
                },
                Err(e) => {
                    if run.fail(&path, e) {
                        return Err(run.into_error());
                    }
                },
            }
        }

        if run.failures.is_empty() {
            debug!(
                path = %root.display(),
                files = run.stats.files,
                dirs = run.stats.dirs,
                vanished = run.stats.vanished,
                "Removed subtree"
            );
            Ok(DeleteOutcome::Removed(run.stats))
        } else {
            Err(run.into_error())
        }
    }
}

/// State of one subtree removal.
struct Removal {
    root: PathBuf,
    policy: DeletionPolicy,
    stats: DeleteStats,
    failures: Vec<DeletionFailure>,
    /// Directories that cannot become empty because a descendant failed.
    blocked: HashSet<PathBuf>,
}

impl Removal {
    fn new(root: &Path, policy: DeletionPolicy) -> Self {
        Self {
            root: root.to_path_buf(),
            policy,
            stats: DeleteStats::default(),
            failures: Vec::new(),
            blocked: HashSet::new(),
        }
    }

    /// Records a failure; returns `true` if the removal must stop.
    fn fail(&mut self, path: &Path, source: io::Error) -> bool {
        warn!(
            path = %path.display(),
            error = %source,
            policy = self.policy.as_str(),
            "Failed to remove entry"
        );

        for ancestor in path.ancestors().filter(|a| a.starts_with(&self.root)) {
            self.blocked.insert(ancestor.to_path_buf());
        }
        self.failures.push(DeletionFailure {
            path: path.to_path_buf(),
            source,
        });

        self.policy == DeletionPolicy::AbortSubtree
    }

    fn into_error(self) -> SubtreeDeleteError {
        SubtreeDeleteError {
            root: self.root,
            failures: self.failures,
            stats: self.stats,
        }
    }
}

fn list_children(dir: &Path) -> io::Result<Vec<PathBuf>> {
    fs::read_dir(dir)?
        .map(|entry| entry.map(|e| e.path()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn build_tree(root: &Path) {
        fs::create_dir_all(root.join("Y/Z")).expect("create dirs");
        fs::write(root.join("Y/file.txt"), b"data").expect("write");
        fs::write(root.join("Y/Z/deep.txt"), b"data").expect("write");
        fs::write(root.join("top.txt"), b"data").expect("write");
    }

    #[test]
    fn test_removes_children_before_parents() {
        let dir = TempDir::new().expect("tempdir");
        let x = dir.path().join("X");
        build_tree(&x);

        let mut order = Vec::new();
        let outcome = SubtreeDeleter::default()
            .delete_with(&x, |path, _| order.push(path.to_path_buf()))
            .expect("delete should succeed");

        assert!(!x.exists());
        assert_eq!(
            outcome,
            DeleteOutcome::Removed(DeleteStats {
                files: 3,
                dirs: 3,
                vanished: 0,
                skipped: 0,
            })
        );

        let position = |p: &Path| {
            order
                .iter()
                .position(|o| o == p)
                .expect("path should have been removed")
        };
        assert!(position(&x.join("Y/file.txt")) < position(&x.join("Y")));
        assert!(position(&x.join("Y/Z")) < position(&x.join("Y")));
        assert!(position(&x.join("Y")) < position(&x));
        assert_eq!(order.last(), Some(&x));
    }

    #[test]
    fn test_already_gone_is_noop() {
        let dir = TempDir::new().expect("tempdir");
        let x = dir.path().join("X");
        build_tree(&x);

        let deleter = SubtreeDeleter::default();
        assert!(matches!(
            deleter.delete(&x),
            Ok(DeleteOutcome::Removed(_))
        ));
        assert_eq!(
            deleter.delete(&x).expect("second delete"),
            DeleteOutcome::AlreadyGone
        );
    }

    #[test]
    fn test_deep_tree_does_not_recurse() {
        let dir = TempDir::new().expect("tempdir");
        let root = dir.path().join("deep");
        let mut path = root.clone();
        for _ in 0..400 {
            path.push("d");
        }
        fs::create_dir_all(&path).expect("create deep tree");
        fs::write(path.join("leaf.txt"), b"leaf").expect("write");

        let outcome = SubtreeDeleter::default()
            .delete(&root)
            .expect("delete should succeed");
        assert!(!root.exists());
        assert!(matches!(outcome, DeleteOutcome::Removed(stats) if stats.dirs == 401));
    }

    #[test]
    fn test_single_file_root() {
        let dir = TempDir::new().expect("tempdir");
        let file = dir.path().join("lone.txt");
        fs::write(&file, b"x").expect("write");

        let outcome = SubtreeDeleter::default().delete(&file).expect("delete");
        assert!(matches!(outcome, DeleteOutcome::Removed(stats) if stats.files == 1));
        assert!(!file.exists());
    }

    #[cfg(unix)]
    #[test]
    fn test_symlink_unlinked_not_followed() {
        let outside = TempDir::new().expect("tempdir");
        fs::write(outside.path().join("precious.txt"), b"keep").expect("write");

        let dir = TempDir::new().expect("tempdir");
        let x = dir.path().join("X");
        fs::create_dir(&x).expect("mkdir");
        std::os::unix::fs::symlink(outside.path(), x.join("link")).expect("symlink");

        SubtreeDeleter::default().delete(&x).expect("delete");
        assert!(!x.exists());
        assert!(outside.path().join("precious.txt").exists());
    }

    #[cfg(unix)]
    #[test]
    fn test_failure_policies() {
        use std::os::unix::fs::PermissionsExt;

        let setup = |root: &Path| {
            fs::create_dir_all(root.join("locked/inner")).expect("mkdir");
            fs::create_dir_all(root.join("open")).expect("mkdir");
            fs::write(root.join("open/file.txt"), b"x").expect("write");
            fs::set_permissions(root.join("locked"), fs::Permissions::from_mode(0o500))
                .expect("chmod");
        };
        let unlock = |root: &Path| {
            let _ = fs::set_permissions(root.join("locked"), fs::Permissions::from_mode(0o755));
        };

        let dir = TempDir::new().expect("tempdir");
        let probe = dir.path().join("probe");
        setup(&probe);
        // Root ignores permission bits; nothing to assert in that case.
        if fs::remove_dir(probe.join("locked/inner")).is_ok() {
            unlock(&probe);
            return;
        }
        unlock(&probe);

        let abort_root = dir.path().join("abort");
        setup(&abort_root);
        let err = SubtreeDeleter::new(DeletionPolicy::AbortSubtree)
            .delete(&abort_root)
            .expect_err("locked entry should fail");
        assert_eq!(err.failures.len(), 1);
        assert!(err.failures[0].path.ends_with("locked/inner"));
        unlock(&abort_root);

        let continue_root = dir.path().join("continue");
        setup(&continue_root);
        let err = SubtreeDeleter::new(DeletionPolicy::BestEffort)
            .delete(&continue_root)
            .expect_err("locked entry should fail");
        assert_eq!(err.failures.len(), 1);
        assert!(!continue_root.join("open").exists());
        assert!(continue_root.join("locked/inner").exists());
        // locked and the root stay because a descendant failed.
        assert_eq!(err.stats.skipped, 2);
        unlock(&continue_root);
    }
}
