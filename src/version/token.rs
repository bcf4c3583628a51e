//! Version tokens and their total order
//!
//! A token is the substring a naming pattern captured from an object key. For
//! ordering it is split into maximal runs of ASCII digits and non-digits:
//!
//! ```text
//! "1.5.6-build.10"  ->  [1] [.] [5] [.] [6] [-build.] [10]
//! ```
//!
//! Runs are compared pairwise. Digit runs compare as unsigned integers of any
//! length, so `9 < 10 < 100` and `007 == 7`; text runs compare by code point.
//! At a position where one token has digits and the other text, the digits
//! sort first. A token that is a strict prefix of another sorts first.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// One maximal run inside a version token
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    /// Digits with leading zeros stripped (`"0"` for an all-zero run)
    Numeric(String),
    /// Any other characters
    Text(String),
}

impl Segment {
    fn rank(&self) -> u8 {
        match self {
            Segment::Numeric(_) => 0,
            Segment::Text(_) => 1,
        }
    }
}

impl Ord for Segment {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Segment::Numeric(a), Segment::Numeric(b)) => compare_digits(a, b),
            (Segment::Text(a), Segment::Text(b)) => a.cmp(b),
            _ => self.rank().cmp(&other.rank()),
        }
    }
}

impl PartialOrd for Segment {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Compare two digit strings without leading zeros as unsigned integers
fn compare_digits(a: &str, b: &str) -> Ordering {
    a.len().cmp(&b.len()).then_with(|| a.cmp(b))
}

fn numeric(run: &str) -> Segment {
    let trimmed = run.trim_start_matches('0');
    if trimmed.is_empty() {
        Segment::Numeric("0".to_string())
    } else {
        Segment::Numeric(trimmed.to_string())
    }
}

/// Split `raw` into alternating digit and non-digit runs
pub fn segments(raw: &str) -> Vec<Segment> {
    let mut result = Vec::new();
    let mut start = 0;
    let mut in_digits: Option<bool> = None;

    for (index, ch) in raw.char_indices() {
        let is_digit = ch.is_ascii_digit();
        match in_digits {
            Some(previous) if previous != is_digit => {
                let run = &raw[start..index];
                result.push(if previous { numeric(run) } else { Segment::Text(run.to_string()) });
                start = index;
            }
            _ => {}
        }
        in_digits = Some(is_digit);
    }

    if let Some(previous) = in_digits {
        let run = &raw[start..];
        result.push(if previous { numeric(run) } else { Segment::Text(run.to_string()) });
    }

    result
}

/// Comparable version value captured from an object key
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct VersionToken {
    raw: String,
    segments: Vec<Segment>,
}

impl VersionToken {
    pub fn new(raw: impl Into<String>) -> Self {
        let raw = raw.into();
        let segments = segments(&raw);
        Self { raw, segments }
    }

    /// The captured substring, exactly as it appeared in the key
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// Order by segments only, ignoring raw spelling differences such as
    /// leading zeros
    pub fn cmp_segments(&self, other: &Self) -> Ordering {
        // Vec's lexicographic order: pairwise, shorter prefix first
        self.segments.cmp(&other.segments)
    }
}

impl From<String> for VersionToken {
    fn from(raw: String) -> Self {
        Self::new(raw)
    }
}

impl From<&str> for VersionToken {
    fn from(raw: &str) -> Self {
        Self::new(raw)
    }
}

impl From<VersionToken> for String {
    fn from(token: VersionToken) -> Self {
        token.raw
    }
}

impl PartialEq for VersionToken {
    fn eq(&self, other: &Self) -> bool {
        self.raw == other.raw
    }
}

impl Eq for VersionToken {}

impl Ord for VersionToken {
    /// Segment order first; spellings that compare equal by segments
    /// (`"1.07"` vs `"1.7"`) fall back to the raw strings so that only equal
    /// raw strings compare equal.
    fn cmp(&self, other: &Self) -> Ordering {
        self.cmp_segments(other).then_with(|| self.raw.cmp(&other.raw))
    }
}

impl PartialOrd for VersionToken {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl std::hash::Hash for VersionToken {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.raw.hash(state);
    }
}

impl fmt::Display for VersionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(raw: &str) -> VersionToken {
        VersionToken::new(raw)
    }

    #[test]
    fn test_segments_of_build_version() {
        let segs = segments("1.5.6-build.10");
        assert_eq!(
            segs,
            vec![
                Segment::Numeric("1".into()),
                Segment::Text(".".into()),
                Segment::Numeric("5".into()),
                Segment::Text(".".into()),
                Segment::Numeric("6".into()),
                Segment::Text("-build.".into()),
                Segment::Numeric("10".into()),
            ]
        );
    }

    #[test]
    fn test_segments_edge_inputs() {
        assert!(segments("").is_empty());
        assert_eq!(segments("000"), vec![Segment::Numeric("0".into())]);
        assert_eq!(segments("rc"), vec![Segment::Text("rc".into())]);
        assert_eq!(
            segments("v2ä"),
            vec![
                Segment::Text("v".into()),
                Segment::Numeric("2".into()),
                Segment::Text("ä".into()),
            ]
        );
    }

    #[test]
    fn test_numeric_runs_compare_by_value() {
        assert!(t("1.5.6-build.9") < t("1.5.6-build.10"));
        assert!(t("1.5.6-build.10") < t("1.5.6-build.100"));
        assert!(t("9") < t("10"));
        assert!(t("10") < t("100"));
    }

    #[test]
    fn test_leading_zeros_ignored() {
        assert_eq!(t("007").cmp_segments(&t("7")), Ordering::Equal);
        assert!(t("008") > t("7"));
        assert!(t("1.010") > t("1.9"));
    }

    #[test]
    fn test_beyond_u64() {
        let big = "123456789012345678901234567890";
        let bigger = "123456789012345678901234567891";
        assert!(t(big) < t(bigger));
        assert!(t("99999999999999999999") < t(big));
    }

    #[test]
    fn test_text_runs_lexicographic() {
        assert!(t("1.0-alpha") < t("1.0-beta"));
        assert!(t("1.0-Z") < t("1.0-a"));
    }

    #[test]
    fn test_shorter_prefix_first() {
        assert!(t("1.0") < t("1.0.1"));
        assert!(t("1.0") < t("1.0-rc"));
    }

    #[test]
    fn test_digits_before_text() {
        assert!(t("1") < t("a"));
        assert!(t("2a") < t("b"));
        assert!(t("x-") < t("x-1"));
    }

    #[test]
    fn test_equal_raw_strings_are_equal() {
        assert_eq!(t("2.1.0").cmp(&t("2.1.0")), Ordering::Equal);
        assert_ne!(t("007").cmp(&t("7")), Ordering::Equal);
    }

    #[test]
    fn test_total_order_properties() {
        let samples: Vec<VersionToken> = [
            "1", "01", "1.0", "1.0.0", "1.0-rc1", "1.0-rc10", "1.0-rc2", "1.a", "a", "a1", "", "10",
            "9", "1.5.6-build.100", "1.5.6-build.10", "1.5.6-build.9",
        ]
        .iter()
        .map(|s| t(s))
        .collect();

        for a in &samples {
            assert_eq!(a.cmp(a), Ordering::Equal);
            for b in &samples {
                assert_eq!(a.cmp(b), b.cmp(a).reverse(), "{} vs {}", a, b);
                for c in &samples {
                    if a <= b && b <= c {
                        assert!(a <= c, "{} <= {} <= {}", a, b, c);
                    }
                }
            }
        }
    }

    #[test]
    fn test_serde_as_string() {
        let token = t("1.2.3");
        assert_eq!(serde_json::to_string(&token).unwrap(), r#""1.2.3""#);
        let back: VersionToken = serde_json::from_str(r#""1.2.10""#).unwrap();
        assert!(back > token);
    }
}
