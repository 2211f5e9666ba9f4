//! Joining the four configuration tables into unit rows.
//!
//! Every key of `[SearchPaths]` must have an entry in `[MatchPatterns]`,
//! `[ExcludePatterns]` and `[KeepDurations]`. The join fails closed: if any
//! key is incomplete or any value is malformed, no row is produced at all and
//! the error lists every problem found.

use crate::models::{NamePattern, RetentionWindow, UnitConfig};
use crate::{Error, Result};
use serde::Deserialize;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::PathBuf;
use tracing::{debug, warn};

/// One of the four join tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Table {
    /// `[SearchPaths]`
    SearchPaths,
    /// `[MatchPatterns]`
    MatchPatterns,
    /// `[ExcludePatterns]`
    ExcludePatterns,
    /// `[KeepDurations]`
    KeepDurations,
}

impl Table {
    /// Returns the section name as written in the configuration file.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::SearchPaths => "SearchPaths",
            Self::MatchPatterns => "MatchPatterns",
            Self::ExcludePatterns => "ExcludePatterns",
            Self::KeepDurations => "KeepDurations",
        }
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A retention window as written: an integer or a numeric string.
///
/// Any other TOML value is kept as read so the join can report it against
/// its key.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum KeepDuration {
    /// `proj = 5`
    Days(i64),
    /// `proj = "5"`
    Text(String),
    /// `proj = 2.5`, `proj = true`, ...
    Other(toml::Value),
}

impl KeepDuration {
    /// Converts to a window of whole days.
    ///
    /// Returns `None` for negative, non-integer or out-of-range values.
    #[must_use]
    pub fn to_window(&self) -> Option<RetentionWindow> {
        let days = match self {
            Self::Days(days) => *days,
            Self::Text(text) => text.trim().parse::<i64>().ok()?,
            Self::Other(_) => return None,
        };
        u32::try_from(days).ok().map(RetentionWindow::days)
    }
}

impl fmt::Display for KeepDuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Days(days) => write!(f, "{days}"),
            Self::Text(text) => write!(f, "\"{text}\""),
            Self::Other(value) => write!(f, "{value}"),
        }
    }
}

/// The four join tables, as read from the configuration file.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct JoinTables {
    /// Search roots by key.
    #[serde(rename = "SearchPaths", alias = "search_paths", default)]
    pub search_paths: BTreeMap<String, PathBuf>,
    /// Match patterns by key.
    #[serde(rename = "MatchPatterns", alias = "match_patterns", default)]
    pub match_patterns: BTreeMap<String, String>,
    /// Exclusion patterns by key.
    #[serde(rename = "ExcludePatterns", alias = "exclude_patterns", default)]
    pub exclude_patterns: BTreeMap<String, String>,
    /// Retention windows by key.
    #[serde(rename = "KeepDurations", alias = "keep_durations", default)]
    pub keep_durations: BTreeMap<String, KeepDuration>,
}

/// Something that prevents the join.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum JoinProblem {
    /// A search path key has no entry in another table.
    #[error("'{key}' has no entry in [{table}]")]
    MissingEntry {
        /// The join key.
        key: String,
        /// The table lacking it.
        table: Table,
    },
    /// A pattern is not a valid regular expression.
    #[error("'{key}' in [{table}] is not a valid pattern: {reason}")]
    InvalidPattern {
        /// The join key.
        key: String,
        /// The table holding the pattern.
        table: Table,
        /// The regex compiler's message.
        reason: String,
    },
    /// A retention window is not a non-negative whole number of days.
    #[error("'{key}' in [KeepDurations] is not a non-negative whole number of days: {value}")]
    InvalidDuration {
        /// The join key.
        key: String,
        /// The value as written.
        value: String,
    },
}

/// Builds unit rows from the join tables.
pub struct ConfigJoiner;

impl ConfigJoiner {
    /// Joins the tables on the search path keys, in key order.
    ///
    /// An empty `[SearchPaths]` yields no rows and no error. Keys that only
    /// appear in the other tables are logged and ignored.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConfigJoin`] with every problem found if any search
    /// path key is incomplete or has a malformed value.
    pub fn join(tables: &JoinTables) -> Result<Vec<UnitConfig>> {
        warn_orphans(tables);

        let mut units = Vec::with_capacity(tables.search_paths.len());
        let mut problems = Vec::new();

        for (key, search_path) in &tables.search_paths {
            let match_pattern = pattern(
                key,
                Table::MatchPatterns,
                tables.match_patterns.get(key),
                &mut problems,
            );
            let exclude_pattern = pattern(
                key,
                Table::ExcludePatterns,
                tables.exclude_patterns.get(key),
                &mut problems,
            );
            let keep_duration = window(key, tables.keep_durations.get(key), &mut problems);

            if let (Some(match_pattern), Some(exclude_pattern), Some(keep_duration)) =
                (match_pattern, exclude_pattern, keep_duration)
            {
                units.push(UnitConfig {
                    key: key.clone(),
                    search_path: search_path.clone(),
                    match_pattern,
                    exclude_pattern,
                    keep_duration,
                });
            }
        }

        if !problems.is_empty() {
            return Err(Error::ConfigJoin { problems });
        }

        for unit in &units {
            debug!(
                unit = %unit.key,
                search_path = %unit.search_path.display(),
                match_pattern = %unit.match_pattern,
                exclude_pattern = %unit.exclude_pattern,
                keep_days = unit.keep_duration.as_days(),
                "Joined retention unit"
            );
        }

        Ok(units)
    }
}

fn pattern(
    key: &str,
    table: Table,
    value: Option<&String>,
    problems: &mut Vec<JoinProblem>,
) -> Option<NamePattern> {
    let Some(value) = value else {
        problems.push(JoinProblem::MissingEntry {
            key: key.to_string(),
            table,
        });
        return None;
    };

    match NamePattern::new(value) {
        Ok(pattern) => Some(pattern),
        Err(e) => {
            problems.push(JoinProblem::InvalidPattern {
                key: key.to_string(),
                table,
                reason: e.to_string(),
            });
            None
        },
    }
}

fn window(
    key: &str,
    value: Option<&KeepDuration>,
    problems: &mut Vec<JoinProblem>,
) -> Option<RetentionWindow> {
    let Some(value) = value else {
        problems.push(JoinProblem::MissingEntry {
            key: key.to_string(),
            table: Table::KeepDurations,
        });
        return None;
    };

    let window = value.to_window();
    if window.is_none() {
        problems.push(JoinProblem::InvalidDuration {
            key: key.to_string(),
            value: value.to_string(),
        });
    }
    window
}

fn warn_orphans(tables: &JoinTables) {
    let others = [
        (Table::MatchPatterns, tables.match_patterns.keys().collect::<BTreeSet<_>>()),
        (Table::ExcludePatterns, tables.exclude_patterns.keys().collect()),
        (Table::KeepDurations, tables.keep_durations.keys().collect()),
    ];

    for (table, keys) in others {
        for key in keys {
            if !tables.search_paths.contains_key(key) {
                warn!(key = %key, table = table.as_str(), "Key has no entry in [SearchPaths]; ignoring");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    fn tables(keys: &[&str]) -> JoinTables {
        let mut tables = JoinTables::default();
        for key in keys {
            tables
                .search_paths
                .insert((*key).to_string(), PathBuf::from(format!("/srv/{key}")));
            tables
                .match_patterns
                .insert((*key).to_string(), "build-.*".to_string());
            tables
                .exclude_patterns
                .insert((*key).to_string(), "keep-.*".to_string());
            tables
                .keep_durations
                .insert((*key).to_string(), KeepDuration::Days(7));
        }
        tables
    }

    #[allow(clippy::panic)]
    fn problems(tables: &JoinTables) -> Vec<JoinProblem> {
        match ConfigJoiner::join(tables) {
            Err(Error::ConfigJoin { problems }) => problems,
            other => panic!("expected ConfigJoin, got {other:?}"),
        }
    }

    #[test]
    fn test_join_in_key_order() {
        let units = ConfigJoiner::join(&tables(&["zeta", "alpha"])).expect("join");
        let keys: Vec<_> = units.iter().map(|u| u.key.as_str()).collect();
        assert_eq!(keys, ["alpha", "zeta"]);
        assert_eq!(units[0].search_path, PathBuf::from("/srv/alpha"));
        assert_eq!(units[0].keep_duration, RetentionWindow::days(7));
    }

    #[test]
    fn test_empty_search_paths_yield_nothing() {
        let mut tables = JoinTables::default();
        tables
            .match_patterns
            .insert("orphan".to_string(), "x".to_string());
        assert!(ConfigJoiner::join(&tables).expect("join").is_empty());
    }

    #[test]
    fn test_missing_entries_all_reported() {
        let mut tables = tables(&["a", "b"]);
        tables.match_patterns.remove("a");
        tables.keep_durations.remove("b");

        assert_eq!(
            problems(&tables),
            vec![
                JoinProblem::MissingEntry {
                    key: "a".to_string(),
                    table: Table::MatchPatterns,
                },
                JoinProblem::MissingEntry {
                    key: "b".to_string(),
                    table: Table::KeepDurations,
                },
            ]
        );
    }

    #[test]
    fn test_invalid_pattern_reported() {
        let mut tables = tables(&["a"]);
        tables
            .exclude_patterns
            .insert("a".to_string(), "keep-(".to_string());

        let problems = problems(&tables);
        assert_eq!(problems.len(), 1);
        assert!(matches!(
            &problems[0],
            JoinProblem::InvalidPattern { table: Table::ExcludePatterns, .. }
        ));
    }

    #[test_case(KeepDuration::Days(-1) ; "negative")]
    #[test_case(KeepDuration::Text("five".to_string()) ; "not a number")]
    #[test_case(KeepDuration::Text("2.5".to_string()) ; "fraction")]
    #[test_case(KeepDuration::Days(i64::from(u32::MAX) + 1) ; "out of range")]
    #[test_case(KeepDuration::Other(toml::Value::Float(2.5)) ; "float")]
    #[test_case(KeepDuration::Other(toml::Value::Boolean(true)) ; "boolean")]
    fn test_invalid_duration_reported(value: KeepDuration) {
        let mut tables = tables(&["a"]);
        tables.keep_durations.insert("a".to_string(), value);

        let problems = problems(&tables);
        assert!(matches!(&problems[..], [JoinProblem::InvalidDuration { .. }]));
    }

    #[test_case(KeepDuration::Days(0), 0 ; "zero")]
    #[test_case(KeepDuration::Text(" 14 ".to_string()), 14 ; "padded text")]
    fn test_valid_duration(value: KeepDuration, days: u32) {
        assert_eq!(value.to_window(), Some(RetentionWindow::days(days)));
    }

    #[test]
    fn test_problem_display() {
        let problem = JoinProblem::InvalidDuration {
            key: "a".to_string(),
            value: KeepDuration::Text("x".to_string()).to_string(),
        };
        assert_eq!(
            problem.to_string(),
            "'a' in [KeepDurations] is not a non-negative whole number of days: \"x\""
        );
    }
}
