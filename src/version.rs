// src/version.rs

//! Epoch:version-release handling and requirement constraints
//!
//! Package versions follow `epoch:version-release` semantics. Comparison is
//! segment-wise: versions split into alternating numeric and alphabetic
//! segments, numeric segments compare as integers and outrank alphabetic
//! ones, and a tilde orders pre-releases before their base version
//! (`1.0~rc1-1` < `1.0-1`).

use crate::error::{Error, Result};
use std::cmp::Ordering;
use std::fmt;

/// An epoch:version-release triple.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Evr {
    pub epoch: u32,
    pub version: String,
    pub release: String,
}

impl Evr {
    pub fn new(epoch: u32, version: impl Into<String>, release: impl Into<String>) -> Self {
        Self {
            epoch,
            version: version.into(),
            release: release.into(),
        }
    }

    /// Parse `"1:2.3-4"`, `"2.3-4"`, or `"2.3"`. A missing epoch is 0 and a
    /// missing release is empty; only the leftmost `:` and the rightmost `-`
    /// are significant.
    pub fn parse(s: &str) -> Result<Self> {
        let s = s.trim();
        if s.is_empty() {
            return Err(Error::Parse("empty version string".to_string()));
        }

        let (epoch, rest) = match s.split_once(':') {
            Some((e, rest)) => {
                let epoch = e
                    .parse::<u32>()
                    .map_err(|_| Error::Parse(format!("invalid epoch in '{}'", s)))?;
                (epoch, rest)
            }
            None => (0, s),
        };

        let (version, release) = match rest.rsplit_once('-') {
            Some((v, r)) => (v, r),
            None => (rest, ""),
        };

        if version.is_empty() {
            return Err(Error::Parse(format!("missing version in '{}'", s)));
        }

        Ok(Self::new(epoch, version, release))
    }
}

impl fmt::Display for Evr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.epoch != 0 {
            write!(f, "{}:", self.epoch)?;
        }
        write!(f, "{}", self.version)?;
        if !self.release.is_empty() {
            write!(f, "-{}", self.release)?;
        }
        Ok(())
    }
}

impl Ord for Evr {
    fn cmp(&self, other: &Self) -> Ordering {
        self.epoch
            .cmp(&other.epoch)
            .then_with(|| compare_segments(&self.version, &other.version))
            .then_with(|| compare_segments(&self.release, &other.release))
    }
}

impl PartialOrd for Evr {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Segment-wise comparison of a version or release component.
fn compare_segments(a: &str, b: &str) -> Ordering {
    let a = a.as_bytes();
    let b = b.as_bytes();
    let mut i = 0;
    let mut j = 0;

    loop {
        // Separators carry no ordering weight.
        while i < a.len() && !a[i].is_ascii_alphanumeric() && a[i] != b'~' {
            i += 1;
        }
        while j < b.len() && !b[j].is_ascii_alphanumeric() && b[j] != b'~' {
            j += 1;
        }

        // Tilde sorts before everything, including end of string.
        let a_tilde = i < a.len() && a[i] == b'~';
        let b_tilde = j < b.len() && b[j] == b'~';
        if a_tilde || b_tilde {
            if a_tilde && b_tilde {
                i += 1;
                j += 1;
                continue;
            }
            return if a_tilde {
                Ordering::Less
            } else {
                Ordering::Greater
            };
        }

        if i >= a.len() || j >= b.len() {
            break;
        }

        let numeric = a[i].is_ascii_digit();
        let a_seg = take_segment(a, &mut i, numeric);
        let b_seg = take_segment(b, &mut j, numeric);

        // A numeric segment outranks an alphabetic one at the same position.
        if b_seg.is_empty() {
            return if numeric {
                Ordering::Greater
            } else {
                Ordering::Less
            };
        }

        let cmp = if numeric {
            let a_num = trim_leading_zeros(a_seg);
            let b_num = trim_leading_zeros(b_seg);
            a_num
                .len()
                .cmp(&b_num.len())
                .then_with(|| a_num.cmp(b_num))
        } else {
            a_seg.cmp(b_seg)
        };

        if cmp != Ordering::Equal {
            return cmp;
        }
    }

    if i < a.len() {
        Ordering::Greater
    } else if j < b.len() {
        Ordering::Less
    } else {
        Ordering::Equal
    }
}

fn take_segment<'a>(s: &'a [u8], pos: &mut usize, numeric: bool) -> &'a [u8] {
    let start = *pos;
    while *pos < s.len()
        && if numeric {
            s[*pos].is_ascii_digit()
        } else {
            s[*pos].is_ascii_alphabetic()
        }
    {
        *pos += 1;
    }
    &s[start..*pos]
}

fn trim_leading_zeros(s: &[u8]) -> &[u8] {
    let mut start = 0;
    while start + 1 < s.len() && s[start] == b'0' {
        start += 1;
    }
    &s[start..]
}

/// Comparison operator in a versioned requirement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Comparison {
    Equal,
    Less,
    LessOrEqual,
    Greater,
    GreaterOrEqual,
}

impl Comparison {
    pub fn as_str(&self) -> &'static str {
        match self {
            Comparison::Equal => "=",
            Comparison::Less => "<",
            Comparison::LessOrEqual => "<=",
            Comparison::Greater => ">",
            Comparison::GreaterOrEqual => ">=",
        }
    }

    /// Accepts both symbolic (`>=`) and repodata flag (`GE`) spellings.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "=" | "==" | "EQ" => Some(Comparison::Equal),
            "<" | "LT" => Some(Comparison::Less),
            "<=" | "LE" => Some(Comparison::LessOrEqual),
            ">" | "GT" => Some(Comparison::Greater),
            ">=" | "GE" => Some(Comparison::GreaterOrEqual),
            _ => None,
        }
    }

    pub fn matches(&self, ordering: Ordering) -> bool {
        match self {
            Comparison::Equal => ordering == Ordering::Equal,
            Comparison::Less => ordering == Ordering::Less,
            Comparison::LessOrEqual => ordering != Ordering::Greater,
            Comparison::Greater => ordering == Ordering::Greater,
            Comparison::GreaterOrEqual => ordering != Ordering::Less,
        }
    }
}

/// A dependency on a package name, optionally constrained to a version range.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Requirement {
    pub name: String,
    pub constraint: Option<(Comparison, Evr)>,
}

impl Requirement {
    pub fn unversioned(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            constraint: None,
        }
    }

    pub fn versioned(name: impl Into<String>, cmp: Comparison, evr: Evr) -> Self {
        Self {
            name: name.into(),
            constraint: Some((cmp, evr)),
        }
    }

    /// Parse `"name"` or `"name <op> evr"` with whitespace-separated fields.
    pub fn parse(spec: &str) -> Result<Self> {
        let mut fields = spec.split_whitespace();
        let name = fields
            .next()
            .ok_or_else(|| Error::Parse("empty requirement spec".to_string()))?;

        match (fields.next(), fields.next(), fields.next()) {
            (None, _, _) => Ok(Self::unversioned(name)),
            (Some(op), Some(version), None) => {
                let cmp = Comparison::parse(op).ok_or_else(|| {
                    Error::Parse(format!("unknown comparison '{}' in '{}'", op, spec))
                })?;
                Ok(Self::versioned(name, cmp, Evr::parse(version)?))
            }
            _ => Err(Error::Parse(format!("malformed requirement '{}'", spec))),
        }
    }

    /// Whether a candidate version of `self.name` satisfies this requirement.
    pub fn matches(&self, candidate: &Evr) -> bool {
        match &self.constraint {
            None => true,
            Some((cmp, bound)) => {
                // An unconstrained release on the bound matches any release
                // of the same epoch:version.
                if bound.release.is_empty() {
                    let loose = Evr::new(candidate.epoch, candidate.version.clone(), "");
                    cmp.matches(loose.cmp(bound))
                } else {
                    cmp.matches(candidate.cmp(bound))
                }
            }
        }
    }
}

impl fmt::Display for Requirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.constraint {
            None => write!(f, "{}", self.name),
            Some((cmp, evr)) => write!(f, "{} {} {}", self.name, cmp.as_str(), evr),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn evr(s: &str) -> Evr {
        Evr::parse(s).unwrap()
    }

    #[test]
    fn test_parse_forms() {
        assert_eq!(evr("1:2.3-4"), Evr::new(1, "2.3", "4"));
        assert_eq!(evr("2.3-4.fc43"), Evr::new(0, "2.3", "4.fc43"));
        assert_eq!(evr("2.3"), Evr::new(0, "2.3", ""));
        assert!(Evr::parse("").is_err());
        assert!(Evr::parse("x:1.0").is_err());
    }

    #[test]
    fn test_display_round_trip() {
        assert_eq!(evr("1:2.3-4").to_string(), "1:2.3-4");
        assert_eq!(evr("2.3-4").to_string(), "2.3-4");
        assert_eq!(evr("2.3").to_string(), "2.3");
    }

    #[test]
    fn test_epoch_dominates() {
        assert!(evr("1:1.0-1") > evr("9.9-9"));
    }

    #[test]
    fn test_numeric_segments_compare_as_integers() {
        assert!(evr("1.10-1") > evr("1.9-1"));
        assert!(evr("1.010-1") == evr("1.10-1"));
        assert!(evr("2.0-1") > evr("2.0-0.9"));
    }

    #[test]
    fn test_numeric_outranks_alphabetic() {
        assert!(evr("1.0.1-1") > evr("1.0.a-1"));
        assert!(evr("1.0a-1") < evr("1.01-1"));
    }

    #[test]
    fn test_tilde_orders_prereleases_first() {
        assert!(evr("1.0~rc1-1") < evr("1.0-1"));
        assert!(evr("1.0~rc1-1") < evr("1.0~rc2-1"));
        assert!(evr("1.0~rc1-1") > evr("1.0~~-1"));
    }

    #[test]
    fn test_longer_version_wins_on_common_prefix() {
        assert!(evr("1.0.1-1") > evr("1.0-1"));
    }

    #[test]
    fn test_requirement_parse_and_match() {
        let plain = Requirement::parse("libfoo").unwrap();
        assert!(plain.constraint.is_none());
        assert!(plain.matches(&evr("0.1-1")));

        let versioned = Requirement::parse("libfoo >= 2.0").unwrap();
        assert!(versioned.matches(&evr("2.0-1")));
        assert!(versioned.matches(&evr("2.1-1")));
        assert!(!versioned.matches(&evr("1.9-1")));

        let flagged = Requirement::parse("libbar EQ 1:1.2-3").unwrap();
        assert!(flagged.matches(&evr("1:1.2-3")));
        assert!(!flagged.matches(&evr("1.2-3")));

        assert!(Requirement::parse("libbaz ~~ 1.0").is_err());
        assert!(Requirement::parse("a b c d").is_err());
    }

    #[test]
    fn test_requirement_release_agnostic_bound() {
        // "libfoo = 2.0" should accept any release of 2.0.
        let req = Requirement::parse("libfoo = 2.0").unwrap();
        assert!(req.matches(&evr("2.0-1")));
        assert!(req.matches(&evr("2.0-17.fc43")));
        assert!(!req.matches(&evr("2.1-1")));
    }

    #[test]
    fn test_requirement_display() {
        assert_eq!(
            Requirement::parse("libfoo >= 2.0-1").unwrap().to_string(),
            "libfoo >= 2.0-1"
        );
        assert_eq!(Requirement::parse("libfoo").unwrap().to_string(), "libfoo");
    }
}
