//! Naming patterns and extractions

use regex::Regex;
use serde::Serialize;
use std::cmp::Ordering;

use super::token::VersionToken;
use crate::error::{Error, Result};

/// Name of the capture group preferred when a pattern has several
pub const VERSION_GROUP: &str = "version";

/// Characters that make a path segment of a pattern non-literal
const REGEX_META: &[char] = &[
    '\\', '.', '+', '*', '?', '(', ')', '|', '[', ']', '{', '}', '^', '$',
];

/// Compiled naming pattern with at least one capturing group
#[derive(Debug, Clone)]
pub struct VersionPattern {
    source: String,
    regex: Regex,
    group: usize,
}

impl VersionPattern {
    /// Compile `pattern`.
    ///
    /// The version is taken from the group named `version` if there is one,
    /// otherwise from the first capturing group. A pattern without any
    /// capturing group is rejected here, before anything is listed.
    pub fn new(pattern: &str) -> Result<Self> {
        let regex = Regex::new(pattern).map_err(|e| Error::InvalidPattern {
            pattern: pattern.to_string(),
            message: e.to_string(),
        })?;

        if regex.captures_len() < 2 {
            return Err(Error::PatternWithoutGroup {
                pattern: pattern.to_string(),
            });
        }

        let group = regex
            .capture_names()
            .position(|name| name == Some(VERSION_GROUP))
            .unwrap_or(1);

        Ok(Self {
            source: pattern.to_string(),
            regex,
            group,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// Extract the version token from `key`; `None` if the key is not a candidate
    pub fn extract(&self, key: &str) -> Option<Extraction> {
        let captures = self.regex.captures(key)?;
        let matched = captures.get(self.group)?;
        Some(Extraction {
            key: key.to_string(),
            token: VersionToken::new(matched.as_str()),
        })
    }

    /// Literal directory prefix of the pattern, usable as a listing prefix
    pub fn prefix_hint(&self) -> String {
        prefix_hint(&self.source)
    }
}

/// Extract the version token of `key` under `pattern`
pub fn extract(key: &str, pattern: &VersionPattern) -> Option<Extraction> {
    pattern.extract(key)
}

/// Longest run of leading `/`-separated segments free of regex syntax,
/// with a trailing `/`; empty when the first segment is already a pattern.
///
/// `"builds/release/app-(.*).tgz"` gives `"builds/release/"`.
pub fn prefix_hint(pattern: &str) -> String {
    let pattern = pattern.strip_prefix('^').unwrap_or(pattern);
    let parts: Vec<&str> = pattern.split('/').collect();
    let directories = &parts[..parts.len().saturating_sub(1)];

    let literal: Vec<&str> = directories
        .iter()
        .take_while(|part| !part.is_empty() && !part.contains(REGEX_META))
        .copied()
        .collect();

    if literal.is_empty() {
        String::new()
    } else {
        format!("{}/", literal.join("/"))
    }
}

/// An object key paired with the version token extracted from it.
///
/// Ordered by token; keys only break ties between equal tokens.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Extraction {
    pub key: String,
    pub token: VersionToken,
}

impl Extraction {
    pub fn version(&self) -> &str {
        self.token.as_str()
    }
}

impl Ord for Extraction {
    fn cmp(&self, other: &Self) -> Ordering {
        self.token.cmp(&other.token).then_with(|| self.key.cmp(&other.key))
    }
}

impl PartialOrd for Extraction {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
