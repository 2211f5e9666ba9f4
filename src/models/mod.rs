//! Data models for dircull.
//!
//! This module contains the value types passed between the configuration
//! join, the matcher, the retention predicate and the deleter.

mod pattern;
mod unit;

pub use pattern::NamePattern;
pub use unit::{
    ChildDir, DeletionCandidate, MatchPoint, RetentionWindow, SECONDS_PER_DAY, UnitConfig,
};
