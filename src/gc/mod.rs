//! Retention garbage collection.
//!
//! The pieces of one run, from the bottom up:
//!
//! - [`DirectoryMatcher`] finds the directories whose name matches a unit's
//!   match pattern.
//! - [`RetentionPolicy`] decides which children of those directories are
//!   kept, by name or by age.
//! - [`SubtreeDeleter`] removes the children that are not kept.
//! - [`RetentionUnit`] ties the three together for one search root, and
//!   [`BatchRunner`] runs every unit in isolation.
//!
//! # Example
//!
//! ```rust,ignore
//! use dircull::gc::{BatchRunner, RetentionUnit, SystemClock};
//!
//! let units: Vec<RetentionUnit> = joined.into_iter().map(RetentionUnit::new).collect();
//! let report = BatchRunner::new(units, SystemClock).run();
//! if !report.is_success() {
//!     eprintln!("{}", report.summary());
//! }
//! ```

mod batch;
mod deleter;
mod matcher;
mod retention;
mod unit;

pub use batch::{BatchReport, BatchRunner, UnitFailure};
pub use deleter::{
    DeleteOutcome, DeleteStats, DeletionFailure, DeletionPolicy, EntryKind, SubtreeDeleteError,
    SubtreeDeleter,
};
pub use matcher::{DirectoryMatcher, ScanErrorPolicy, ScanFailure};
pub use retention::{Clock, FixedClock, RetentionPolicy, SystemClock, Verdict, creation_time};
pub use unit::{Evaluation, RetentionUnit, RunSettings, UnitReport};

use std::time::Duration;

/// Converts a duration to milliseconds, saturating at `u64::MAX`.
#[inline]
fn duration_to_millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

/// Converts usize to u64 for counters, saturating at `u64::MAX`.
#[inline]
fn usize_to_u64(value: usize) -> u64 {
    u64::try_from(value).unwrap_or(u64::MAX)
}

/// Converts usize to f64 for metrics, capping at `u32::MAX`.
#[inline]
fn usize_to_f64(value: usize) -> f64 {
    let capped = u32::try_from(value).unwrap_or(u32::MAX);
    f64::from(capped)
}

/// Converts u64 to f64 for metrics, capping at `u32::MAX`.
#[inline]
fn u64_to_f64(value: u64) -> f64 {
    let capped = u32::try_from(value).unwrap_or(u32::MAX);
    f64::from(capped)
}
