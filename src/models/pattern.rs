//! Directory name patterns.

use regex::Regex;
use serde::{Serialize, Serializer};
use std::ffi::OsStr;
use std::fmt;

/// A regular expression tested against a directory's base name.
///
/// Matching is anchored at the start of the name and open at the end, so
/// `build-.*` matches `build-v1` while `v1` does not.
///
/// # Example
///
/// ```rust
/// use dircull::NamePattern;
///
/// let pattern = NamePattern::new("build-").unwrap();
/// assert!(pattern.matches("build-v1"));
/// assert!(!pattern.matches("old-build-v1"));
/// ```
#[derive(Debug, Clone)]
pub struct NamePattern {
    source: String,
    regex: Regex,
}

impl NamePattern {
    /// Compiles a name pattern.
    ///
    /// # Errors
    ///
    /// Returns the regex compilation error if `pattern` is not a valid
    /// regular expression.
    pub fn new(pattern: &str) -> Result<Self, regex::Error> {
        let regex = Regex::new(&format!("^(?:{pattern})"))?;
        Ok(Self {
            source: pattern.to_string(),
            regex,
        })
    }

    /// Returns the pattern as it was configured.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// Tests a base name against the pattern.
    #[must_use]
    pub fn matches(&self, name: &str) -> bool {
        self.regex.is_match(name)
    }

    /// Tests an OS base name against the pattern.
    ///
    /// Names that are not valid UTF-8 are matched lossily.
    #[must_use]
    pub fn matches_os(&self, name: &OsStr) -> bool {
        self.matches(&name.to_string_lossy())
    }
}

impl fmt::Display for NamePattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

impl PartialEq for NamePattern {
    fn eq(&self, other: &Self) -> bool {
        self.source == other.source
    }
}

impl Eq for NamePattern {}

impl Serialize for NamePattern {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.source)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case("build-.*", "build-v1", true ; "prefix with wildcard")]
    #[test_case("build-.*", "old-build-v1", false ; "anchored at start")]
    #[test_case("build", "build-v1", true ; "open at end")]
    #[test_case("^keep.*", "keep-me", true ; "explicit caret")]
    #[test_case("feature/.*|release-.*", "release-2.1", true ; "alternation stays anchored")]
    #[test_case("feature|release", "my-release", false ; "alternation not unanchored")]
    #[test_case("v[0-9]+$", "v12", true ; "explicit end anchor")]
    #[test_case("v[0-9]+$", "v12-rc", false ; "explicit end anchor rejects suffix")]
    fn test_pattern_matching(pattern: &str, name: &str, expected: bool) {
        let pattern = NamePattern::new(pattern).expect("pattern should compile");
        assert_eq!(pattern.matches(name), expected);
    }

    #[test]
    fn test_invalid_pattern_rejected() {
        assert!(NamePattern::new("build-(").is_err());
    }

    #[test]
    fn test_display_keeps_source() {
        let pattern = NamePattern::new("build-.*").expect("pattern should compile");
        assert_eq!(pattern.to_string(), "build-.*");
        assert_eq!(pattern.as_str(), "build-.*");
    }

    #[test]
    fn test_serializes_as_source_string() {
        let pattern = NamePattern::new("keep-.*").expect("pattern should compile");
        let json = serde_json::to_string(&pattern).expect("serialize");
        assert_eq!(json, "\"keep-.*\"");
    }
}
