//! Property-based tests for the configuration join and subtree deletion.
//!
//! Uses proptest to verify invariants across random inputs:
//! - The join never returns a partial list of units
//! - Every missing (key, table) pair is reported
//! - Deletion removes arbitrary trees completely

// Property tests use expect/unwrap for simplicity - panics are acceptable in tests
#![allow(clippy::expect_used, clippy::unwrap_used)]

use dircull::config::{ConfigJoiner, JoinProblem, JoinTables, KeepDuration, Table};
use dircull::gc::{DeleteOutcome, SubtreeDeleter};
use dircull::{Error, NamePattern};
use proptest::prelude::*;
use std::collections::BTreeSet;
use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;

fn full_tables(keys: &BTreeSet<String>) -> JoinTables {
    let mut tables = JoinTables::default();
    for key in keys {
        tables
            .search_paths
            .insert(key.clone(), PathBuf::from(format!("/srv/{key}")));
        tables
            .match_patterns
            .insert(key.clone(), "build-.*".to_string());
        tables
            .exclude_patterns
            .insert(key.clone(), "keep-.*".to_string());
        tables
            .keep_durations
            .insert(key.clone(), KeepDuration::Days(3));
    }
    tables
}

proptest! {
    /// Property: a complete set of tables joins to one unit per key.
    #[test]
    fn prop_complete_tables_join(keys in prop::collection::btree_set("[a-z]{1,8}", 0..8)) {
        let units = ConfigJoiner::join(&full_tables(&keys)).expect("join should succeed");
        let joined: Vec<_> = units.iter().map(|u| u.key.clone()).collect();
        let expected: Vec<_> = keys.iter().cloned().collect();
        prop_assert_eq!(joined, expected);
    }

    /// Property: removing entries makes the join fail, naming each removal.
    #[test]
    fn prop_join_fails_closed(
        keys in prop::collection::btree_set("[a-z]{1,8}", 1..8),
        removals in prop::collection::vec((any::<prop::sample::Index>(), 0usize..3), 1..6),
    ) {
        let mut tables = full_tables(&keys);
        let key_list: Vec<_> = keys.iter().cloned().collect();
        let mut expected = BTreeSet::new();

        for (index, table) in removals {
            let key = index.get(&key_list).clone();
            let table = match table {
                0 => {
                    tables.match_patterns.remove(&key);
                    Table::MatchPatterns
                },
                1 => {
                    tables.exclude_patterns.remove(&key);
                    Table::ExcludePatterns
                },
                _ => {
                    tables.keep_durations.remove(&key);
                    Table::KeepDurations
                },
            };
            expected.insert((key, table));
        }

        let result = ConfigJoiner::join(&tables);
        let Err(Error::ConfigJoin { problems }) = result else {
            return Err(TestCaseError::fail("join should fail"));
        };

        let reported: BTreeSet<_> = problems
            .into_iter()
            .map(|problem| match problem {
                JoinProblem::MissingEntry { key, table } => (key, table),
                other => (other.to_string(), Table::SearchPaths),
            })
            .collect();
        prop_assert_eq!(reported, expected);
    }

    /// Property: the name pattern is anchored at the start of the name.
    #[test]
    fn prop_pattern_anchored(prefix in "[a-z]{1,5}", name in "[a-z0-9-]{0,10}") {
        let pattern = NamePattern::new(&prefix).expect("literal pattern");
        let matching = format!("{prefix}{name}");
        let shifted = format!("_{prefix}{name}");
        prop_assert!(pattern.matches(&matching));
        prop_assert!(!pattern.matches(&shifted));
    }
}

/// Strategy for relative paths of files inside a generated tree.
fn tree_strategy() -> impl Strategy<Value = Vec<Vec<String>>> {
    prop::collection::vec(prop::collection::vec("[a-e]{1,3}", 1..6), 1..20)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    /// Property: deletion removes any generated tree and leaves nothing behind.
    #[test]
    fn prop_deletion_is_complete(paths in tree_strategy()) {
        let dir = TempDir::new().expect("tempdir");
        let root = dir.path().join("root");
        fs::create_dir(&root).expect("create root");

        for components in &paths {
            let mut dir_path = root.clone();
            for component in &components[..components.len() - 1] {
                dir_path.push(format!("d{component}"));
            }
            fs::create_dir_all(&dir_path).expect("create dirs");
            let file = dir_path.join(format!("f{}", components[components.len() - 1]));
            fs::write(&file, b"x").expect("write file");
        }

        let deleter = SubtreeDeleter::default();
        let outcome = deleter.delete(&root).expect("delete should succeed");
        prop_assert!(matches!(outcome, DeleteOutcome::Removed(_)));
        prop_assert!(!root.exists());
        prop_assert_eq!(deleter.delete(&root).expect("second delete"), DeleteOutcome::AlreadyGone);
        prop_assert_eq!(fs::read_dir(dir.path()).expect("list").count(), 0);
    }
}
