//! Semantic version triples with a total lexicographic order.
//!
//! Agent catalog entries carry a `major.minor.patch` version; the registry
//! keeps the greatest version seen per agent id. The accepted grammar is
//! exactly three dot-separated decimal segments; anything else is
//! `InvalidFormat`.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum VersionError {
    #[error("Invalid version format: '{0}' (expected MAJOR.MINOR.PATCH)")]
    InvalidFormat(String),
}

/// A semantic version triple, ordered lexicographically on
/// (major, minor, patch).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Version {
    pub major: u64,
    pub minor: u64,
    pub patch: u64,
}

impl Version {
    pub const fn new(major: u64, minor: u64, patch: u64) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.major, self.minor, self.patch).cmp(&(other.major, other.minor, other.patch))
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

impl FromStr for Version {
    type Err = VersionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || VersionError::InvalidFormat(s.to_string());

        let mut parts = s.split('.');
        let major = parse_segment(parts.next()).ok_or_else(invalid)?;
        let minor = parse_segment(parts.next()).ok_or_else(invalid)?;
        let patch = parse_segment(parts.next()).ok_or_else(invalid)?;
        if parts.next().is_some() {
            return Err(invalid());
        }

        Ok(Self {
            major,
            minor,
            patch,
        })
    }
}

/// A segment is one or more ASCII digits; no signs, whitespace, or
/// build metadata.
fn parse_segment(segment: Option<&str>) -> Option<u64> {
    let segment = segment?;
    if segment.is_empty() || !segment.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    segment.parse().ok()
}

impl TryFrom<String> for Version {
    type Error = VersionError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Version> for String {
    fn from(value: Version) -> Self {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_and_display_roundtrip() {
        for s in ["0.0.0", "1.2.3", "10.20.30", "999.0.1"] {
            let v: Version = s.parse().unwrap();
            assert_eq!(v.to_string(), s);
            assert_eq!(v.to_string().parse::<Version>().unwrap(), v);
        }
    }

    #[test]
    fn test_invalid_shapes() {
        for s in [
            "", "1", "1.2", "1.2.3.4", "1.2.x", "a.b.c", "1..3", "1.2.", ".2.3", "1.2.3-rc1",
            "1.2.+3", " 1.2.3", "1.-2.3",
        ] {
            assert!(
                matches!(s.parse::<Version>(), Err(VersionError::InvalidFormat(_))),
                "expected InvalidFormat for {s:?}"
            );
        }
    }

    #[test]
    fn test_lexicographic_order() {
        let v = |s: &str| s.parse::<Version>().unwrap();
        assert!(v("1.0.0") < v("2.0.0"));
        assert!(v("1.2.0") < v("1.3.0"));
        assert!(v("1.2.5") < v("1.3.0"));
        assert!(v("1.2.3") < v("1.2.4"));
        assert_eq!(v("1.2.3"), v("1.2.3"));
        // Coordinate-wise comparison, not string comparison.
        assert!(v("2.0.0") < v("10.0.0"));
    }

    #[test]
    fn test_serde_as_string() {
        let v: Version = "1.4.2".parse().unwrap();
        assert_eq!(serde_json::to_string(&v).unwrap(), "\"1.4.2\"");
        let back: Version = serde_json::from_str("\"1.4.2\"").unwrap();
        assert_eq!(back, v);
        assert!(serde_json::from_str::<Version>("\"1.4\"").is_err());
    }
}
