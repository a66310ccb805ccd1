//! Loose version ordering for versions reported by installed tools
//! (`5.1.30r118389`, `1.8.0_161`, `17.0.2+8`) and the acceptance window built on it.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

#[derive(Debug, PartialEq, Eq, Clone)]
pub struct Version(String);

#[derive(Debug, PartialEq, Eq, PartialOrd, Ord)]
enum Segment {
    Number(u64),
    Text(String),
}

fn is_separator(c: char) -> bool {
    matches!(c, '.' | '_' | '+')
}

impl Version {
    pub fn new(v: &str) -> Self {
        Version(v.trim().trim_start_matches(['v', 'V']).to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Split into runs of digits and runs of letters; separators only end a run.
    fn segments(s: &str) -> Vec<Segment> {
        let mut segments = Vec::new();
        let mut run = String::new();
        let mut run_is_digit = false;

        let flush = |run: &mut String, digits: bool, out: &mut Vec<Segment>| {
            if run.is_empty() {
                return;
            }
            if digits {
                out.push(Segment::Number(run.parse().unwrap_or(u64::MAX)));
            } else {
                out.push(Segment::Text(std::mem::take(run)));
            }
            run.clear();
        };

        for c in s.chars() {
            if is_separator(c) {
                flush(&mut run, run_is_digit, &mut segments);
                continue;
            }
            let digit = c.is_ascii_digit();
            if !run.is_empty() && digit != run_is_digit {
                flush(&mut run, run_is_digit, &mut segments);
            }
            run_is_digit = digit;
            run.push(c);
        }
        flush(&mut run, run_is_digit, &mut segments);
        segments
    }

    /// Everything before a `-` is the release, everything after is a pre-release tag.
    fn split_tag(&self) -> (&str, Option<&str>) {
        match self.0.split_once('-') {
            Some((base, tag)) => (base, Some(tag)),
            None => (self.0.as_str(), None),
        }
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        let (a_base, a_tag) = self.split_tag();
        let (b_base, b_tag) = other.split_tag();

        let release = Self::segments(a_base).cmp(&Self::segments(b_base));
        if release != Ordering::Equal {
            return release;
        }

        match (a_tag, b_tag) {
            (None, None) => Ordering::Equal,
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (Some(a), Some(b)) => Self::segments(a).cmp(&Self::segments(b)),
        }
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

pub fn compare_versions(a: &str, b: &str) -> Ordering {
    Version::new(a).cmp(&Version::new(b))
}

/// Why a detected version is flagged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum VersionIssue {
    OldVersion,
    NewerVersion,
}

/// Outcome of checking a detected version against a [`VersionWindow`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Verdict {
    pub valid: bool,
    pub error: Option<VersionIssue>,
    pub warning: Option<VersionIssue>,
}

/// Accepted versions of a detected installation: `[minimum, maximum)`.
/// Anything newer than the minimum is accepted with a warning, since it was not tested.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VersionWindow {
    pub minimum: Option<String>,
    pub maximum: Option<String>,
}

impl VersionWindow {
    pub fn new(minimum: Option<&str>, maximum: Option<&str>) -> Self {
        Self {
            minimum: minimum.map(str::to_string),
            maximum: maximum.map(str::to_string),
        }
    }

    pub fn check(&self, version: &str) -> Verdict {
        let mut verdict = Verdict {
            valid: true,
            error: None,
            warning: None,
        };

        if let Some(max) = &self.maximum {
            if compare_versions(version, max) != Ordering::Less {
                verdict.valid = false;
                verdict.warning = Some(VersionIssue::NewerVersion);
                return verdict;
            }
        }

        if let Some(min) = &self.minimum {
            match compare_versions(version, min) {
                Ordering::Less => {
                    verdict.valid = false;
                    verdict.error = Some(VersionIssue::OldVersion);
                }
                Ordering::Greater if self.maximum.is_some() => {
                    verdict.warning = Some(VersionIssue::NewerVersion);
                }
                _ => {}
            }
        }

        verdict
    }
}
