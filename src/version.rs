//! Semantic-version parsing and range testing for protocol-gated
//! fields.

use std::cmp::Ordering;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Version {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

impl Version {
    pub fn new(major: u32, minor: u32, patch: u32) -> Self {
        Self { major, minor, patch }
    }

    /// Parses `major[.minor[.patch]]`; missing components default to 0.
    pub fn parse(s: &str) -> Option<Self> {
        let mut parts = s.trim().split('.');
        let major = parts.next()?.parse().ok()?;
        let minor = parts.next().map(str::parse).transpose().ok()?.unwrap_or(0);
        let patch = parts.next().map(str::parse).transpose().ok()?.unwrap_or(0);
        if parts.next().is_some() {
            return None;
        }
        Some(Self { major, minor, patch })
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

/// A protocol-version gate for a field: a field with a `VersionRange`
/// is only present when the active protocol version falls inside it.
#[derive(Debug, Clone, Copy)]
pub struct VersionRange {
    pub min: Option<Version>,
    pub max: Option<Version>,
    pub min_inclusive: bool,
    pub max_inclusive: bool,
}

impl VersionRange {
    pub fn at_least(min: Version) -> Self {
        Self {
            min: Some(min),
            max: None,
            min_inclusive: true,
            max_inclusive: true,
        }
    }

    pub fn at_most(max: Version) -> Self {
        Self {
            min: None,
            max: Some(max),
            min_inclusive: true,
            max_inclusive: true,
        }
    }

    pub fn between(min: Version, max: Version) -> Self {
        Self {
            min: Some(min),
            max: Some(max),
            min_inclusive: true,
            max_inclusive: true,
        }
    }

    pub fn contains(&self, v: &Version) -> bool {
        let lower_ok = match self.min {
            None => true,
            Some(min) => match v.cmp(&min) {
                Ordering::Greater => true,
                Ordering::Equal => self.min_inclusive,
                Ordering::Less => false,
            },
        };
        let upper_ok = match self.max {
            None => true,
            Some(max) => match v.cmp(&max) {
                Ordering::Less => true,
                Ordering::Equal => self.max_inclusive,
                Ordering::Greater => false,
            },
        };
        lower_ok && upper_ok
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_partial_versions() {
        assert_eq!(Version::parse("1.2.3"), Some(Version::new(1, 2, 3)));
        assert_eq!(Version::parse("1.2"), Some(Version::new(1, 2, 0)));
        assert_eq!(Version::parse("1"), Some(Version::new(1, 0, 0)));
        assert_eq!(Version::parse("1.2.3.4"), None);
        assert_eq!(Version::parse("x.y"), None);
    }

    #[test]
    fn range_membership() {
        let range = VersionRange::between(Version::new(1, 0, 0), Version::new(2, 0, 0));
        assert!(range.contains(&Version::new(1, 5, 0)));
        assert!(range.contains(&Version::new(1, 0, 0)));
        assert!(range.contains(&Version::new(2, 0, 0)));
        assert!(!range.contains(&Version::new(2, 0, 1)));
        assert!(!range.contains(&Version::new(0, 9, 9)));
    }
}
