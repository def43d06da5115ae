//! Epoch/version/release comparison with rpm semantics.
//!
//! Version strings are split into alternating numeric and alphabetic
//! segments; anything else is a separator. Numeric segments compare as
//! integers of arbitrary length, alphabetic ones byte-wise, and a numeric
//! segment always beats an alphabetic one. `~` sorts before everything,
//! including the end of the string; `^` sorts after the end of the string
//! but before any other segment.

use std::{cmp::Ordering, fmt, str::FromStr};

use serde::{Deserialize, Serialize};

/// Compares two version (or release) strings the way `rpmvercmp` does.
pub fn rpmvercmp(a: &str, b: &str) -> Ordering {
    if a == b {
        return Ordering::Equal;
    }

    let mut one = a.as_bytes();
    let mut two = b.as_bytes();

    loop {
        one = skip_separators(one);
        two = skip_separators(two);

        match (one.first(), two.first()) {
            (Some(b'~'), Some(b'~')) => {
                one = &one[1..];
                two = &two[1..];
                continue;
            }
            (Some(b'~'), _) => return Ordering::Less,
            (_, Some(b'~')) => return Ordering::Greater,
            _ => {}
        }

        match (one.first(), two.first()) {
            (Some(b'^'), Some(b'^')) => {
                one = &one[1..];
                two = &two[1..];
                continue;
            }
            (None, Some(b'^')) => return Ordering::Less,
            (Some(b'^'), None) => return Ordering::Greater,
            (Some(b'^'), _) => return Ordering::Less,
            (_, Some(b'^')) => return Ordering::Greater,
            _ => {}
        }

        let (Some(&first), Some(_)) = (one.first(), two.first()) else {
            break;
        };

        let numeric = first.is_ascii_digit();
        let (seg_one, rest_one) = split_segment(one, numeric);
        let (seg_two, rest_two) = split_segment(two, numeric);

        if seg_two.is_empty() {
            // segment types differ; numbers win
            return if numeric {
                Ordering::Greater
            } else {
                Ordering::Less
            };
        }

        let ord = if numeric {
            compare_numeric(seg_one, seg_two)
        } else {
            seg_one.cmp(seg_two)
        };
        if ord != Ordering::Equal {
            return ord;
        }

        one = rest_one;
        two = rest_two;
    }

    match (one.is_empty(), two.is_empty()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Less,
        _ => Ordering::Greater,
    }
}

fn skip_separators(s: &[u8]) -> &[u8] {
    let start = s
        .iter()
        .position(|c| c.is_ascii_alphanumeric() || *c == b'~' || *c == b'^')
        .unwrap_or(s.len());
    &s[start..]
}

fn split_segment(s: &[u8], numeric: bool) -> (&[u8], &[u8]) {
    let end = s
        .iter()
        .position(|c| {
            if numeric {
                !c.is_ascii_digit()
            } else {
                !c.is_ascii_alphabetic()
            }
        })
        .unwrap_or(s.len());
    s.split_at(end)
}

fn compare_numeric(a: &[u8], b: &[u8]) -> Ordering {
    let a = trim_leading_zeros(a);
    let b = trim_leading_zeros(b);
    a.len().cmp(&b.len()).then_with(|| a.cmp(b))
}

fn trim_leading_zeros(s: &[u8]) -> &[u8] {
    let start = s.iter().position(|c| *c != b'0').unwrap_or(s.len());
    &s[start..]
}

/// Normalizes an optional epoch: absent or empty means `"0"`.
pub fn normalize_epoch(epoch: Option<&str>) -> &str {
    match epoch {
        Some(e) if !e.is_empty() => e,
        _ => "0",
    }
}

/// Compares two (epoch, version, release) triples.
///
/// When either side lacks a release, releases are not compared. This is how
/// an unversioned-release dependency such as `foo >= 1.0` matches any
/// release of `foo-1.0`.
pub fn compare_parts(
    a: (Option<&str>, &str, Option<&str>),
    b: (Option<&str>, &str, Option<&str>),
) -> Ordering {
    rpmvercmp(normalize_epoch(a.0), normalize_epoch(b.0))
        .then_with(|| rpmvercmp(a.1, b.1))
        .then_with(|| {
            match (a.2, b.2) {
                (Some(ra), Some(rb)) => rpmvercmp(ra, rb),
                _ => Ordering::Equal,
            }
        })
}

/// A fully specified epoch, version and release.
///
/// Equality and ordering follow [`rpmvercmp`], so `1.0` and `1_0` are equal
/// even though the strings differ. The epoch is stored normalized.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Evr {
    pub epoch: String,
    pub version: String,
    pub release: String,
}

impl Evr {
    pub fn new(epoch: Option<&str>, version: impl Into<String>, release: impl Into<String>) -> Self {
        Self {
            epoch: normalize_epoch(epoch).to_string(),
            version: version.into(),
            release: release.into(),
        }
    }
}

impl PartialEq for Evr {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Evr {}

impl PartialOrd for Evr {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Evr {
    fn cmp(&self, other: &Self) -> Ordering {
        rpmvercmp(&self.epoch, &other.epoch)
            .then_with(|| rpmvercmp(&self.version, &other.version))
            .then_with(|| rpmvercmp(&self.release, &other.release))
    }
}

impl fmt::Display for Evr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.epoch != "0" {
            write!(f, "{}:", self.epoch)?;
        }
        write!(f, "{}-{}", self.version, self.release)
    }
}

impl FromStr for Evr {
    type Err = String;

    /// Parses `[epoch:]version-release`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (epoch, rest) = match s.split_once(':') {
            Some((e, rest)) => (Some(e), rest),
            None => (None, s),
        };
        let (version, release) = rest
            .rsplit_once('-')
            .ok_or_else(|| format!("'{s}' has no release"))?;
        if version.is_empty() || release.is_empty() {
            return Err(format!("'{s}' is not a valid epoch:version-release"));
        }
        Ok(Evr::new(epoch, version, release))
    }
}
