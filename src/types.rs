/*!
 * Shared value types: generations and resolved object references
 */

use serde::{Deserialize, Serialize};
use std::fmt;
use std::num::NonZeroI64;
use std::str::FromStr;

use crate::error::{Error, Result};

/// Store-assigned revision of one object key in a versioned bucket.
///
/// Real generations are never zero. The wire contract of the command layer
/// uses `0` for "unspecified, use the live object"; inside this crate that is
/// `Option::<Generation>::None`, and [`Generation::from_raw`] /
/// [`Generation::to_raw`] translate at the edges.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub struct Generation(NonZeroI64);

impl Generation {
    /// Wrap a raw generation number, `None` for the `0` sentinel
    pub fn from_raw(raw: i64) -> Option<Self> {
        NonZeroI64::new(raw).map(Generation)
    }

    /// Raw value, `0` for an unspecified generation
    pub fn to_raw(generation: Option<Self>) -> i64 {
        generation.map(|g| g.get()).unwrap_or(0)
    }

    pub fn get(self) -> i64 {
        self.0.get()
    }

    /// Parse the string form used in version requests.
    ///
    /// An empty string and `"0"` both mean "unspecified".
    pub fn parse_optional(value: &str) -> Result<Option<Self>> {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            return Ok(None);
        }
        let raw = trimmed
            .parse::<i64>()
            .map_err(|e| Error::InvalidGeneration(format!("'{}': {}", value, e)))?;
        Ok(Self::from_raw(raw))
    }
}

impl TryFrom<i64> for Generation {
    type Error = Error;

    fn try_from(raw: i64) -> Result<Self> {
        Self::from_raw(raw)
            .ok_or_else(|| Error::InvalidGeneration("generation 0 is not a real revision".to_string()))
    }
}

impl From<Generation> for i64 {
    fn from(generation: Generation) -> Self {
        generation.get()
    }
}

impl FromStr for Generation {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse_optional(s)?
            .ok_or_else(|| Error::InvalidGeneration(format!("'{}' does not name a generation", s)))
    }
}

impl fmt::Display for Generation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A resolved object: bucket, key and, for versioned buckets, a pinned generation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectRef {
    pub bucket: String,
    pub key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generation: Option<Generation>,
}

impl ObjectRef {
    pub fn new(bucket: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            key: key.into(),
            generation: None,
        }
    }

    pub fn with_generation(mut self, generation: Option<Generation>) -> Self {
        self.generation = generation;
        self
    }

    /// Final path component of the key, used as the local file name
    pub fn file_name(&self) -> &str {
        self.key.rsplit('/').next().unwrap_or(&self.key)
    }

    /// `gs://` URL of the object, with a `#generation` fragment when pinned
    pub fn url(&self) -> String {
        match self.generation {
            Some(generation) => format!("gs://{}/{}#{}", self.bucket, self.key, generation),
            None => format!("gs://{}/{}", self.bucket, self.key),
        }
    }
}

impl fmt::Display for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.url())
    }
}

/// One entry reported by version discovery.
///
/// The wire shape matches the `version` object of a request, so a reported
/// version can be fed back as the next request's current version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum VersionRef {
    /// Pattern mode: the object key carrying the version
    Path { path: String },
    /// Versioned-file mode: a generation of the fixed key, as a decimal string
    Generation {
        #[serde(with = "decimal_string")]
        generation: Generation,
    },
}

/// Serde adapter writing a [`Generation`] as `"1523"` rather than `1523`
mod decimal_string {
    use super::Generation;
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(generation: &Generation, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(generation)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Generation, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(de::Error::custom)
    }
}
