/*!
 * Configuration types for gcs-resource
 *
 * These mirror the `source`, `version` and `params` objects the pipeline
 * hands to the resource, plus logging settings. Everything is validated here,
 * before any store call is made.
 */

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::transfer::threshold_from_mebibytes;
use crate::types::{Generation, VersionRef};
use crate::version::VersionPattern;

/// Where the versions of an artifact come from
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Source {
    /// Bucket holding the artifact
    #[serde(default)]
    pub bucket: String,

    /// Naming pattern with a capturing group for the version (pattern mode)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub regexp: Option<String>,

    /// Single object key in a versioned bucket (versioned-file mode)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub versioned_file: Option<String>,
}

/// Validated resolution mode of a [`Source`]
#[derive(Debug, Clone)]
pub enum SourceMode {
    Pattern(VersionPattern),
    VersionedFile(String),
}

impl Source {
    pub fn with_regexp(bucket: impl Into<String>, regexp: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            regexp: Some(regexp.into()),
            versioned_file: None,
        }
    }

    pub fn with_versioned_file(bucket: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            regexp: None,
            versioned_file: Some(key.into()),
        }
    }

    /// Check the source and compile its pattern.
    ///
    /// Exactly one of `regexp` and `versioned_file` must be set; empty strings
    /// count as unset.
    pub fn validate(&self) -> Result<SourceMode> {
        if self.bucket.trim().is_empty() {
            return Err(Error::InvalidConfig("please specify the bucket".to_string()));
        }

        let regexp = self.regexp.as_deref().filter(|s| !s.is_empty());
        let versioned_file = self.versioned_file.as_deref().filter(|s| !s.is_empty());

        match (regexp, versioned_file) {
            (Some(_), Some(_)) => Err(Error::ConflictingModes),
            (Some(pattern), None) => Ok(SourceMode::Pattern(VersionPattern::new(pattern)?)),
            (None, Some(key)) => Ok(SourceMode::VersionedFile(key.to_string())),
            (None, None) => Err(Error::InvalidConfig(
                "please specify either regexp or versioned_file".to_string(),
            )),
        }
    }
}

/// Version requested by the caller (or the last one it saw)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestedVersion {
    /// Object key, pattern mode
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,

    /// Generation as a decimal string, versioned-file mode
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generation: Option<String>,
}

impl RequestedVersion {
    pub fn path(path: impl Into<String>) -> Self {
        Self {
            path: Some(path.into()),
            generation: None,
        }
    }

    pub fn generation(generation: Generation) -> Self {
        Self {
            path: None,
            generation: Some(generation.to_string()),
        }
    }

    /// Requested path, ignoring empty strings
    pub fn requested_path(&self) -> Option<&str> {
        self.path.as_deref().filter(|p| !p.is_empty())
    }

    /// Parsed generation; missing, empty and `"0"` all mean "live object"
    pub fn generation_value(&self) -> Result<Option<Generation>> {
        match self.generation.as_deref() {
            Some(value) => Generation::parse_optional(value),
            None => Ok(None),
        }
    }
}

impl From<VersionRef> for RequestedVersion {
    fn from(version: VersionRef) -> Self {
        match version {
            VersionRef::Path { path } => Self::path(path),
            VersionRef::Generation { generation } => Self::generation(generation),
        }
    }
}

/// Upload parameters
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PutParams {
    /// Local file to upload
    #[serde(default)]
    pub file: String,

    /// Canned ACL applied to the uploaded object
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub predefined_acl: Option<String>,

    /// Content-Type of the uploaded object
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,

    /// Cache-Control of the uploaded object
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_control: Option<String>,

    /// Chunk size in MiB above which uploads are split; 0 or less disables
    #[serde(default)]
    pub parallel_upload_threshold: i64,
}

impl PutParams {
    pub fn validate(&self) -> Result<()> {
        if self.file.trim().is_empty() {
            return Err(Error::InvalidConfig("please specify the file".to_string()));
        }
        if self.parallel_upload_threshold > (i64::MAX >> 20) {
            return Err(Error::InvalidConfig(format!(
                "parallel_upload_threshold {} MiB is out of range",
                self.parallel_upload_threshold
            )));
        }
        Ok(())
    }

    /// Threshold in bytes as the planner expects it
    pub fn threshold_bytes(&self) -> i64 {
        threshold_from_mebibytes(self.parallel_upload_threshold)
    }
}

/// Log level for diagnostic output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Only errors
    Error,

    /// Warnings and errors
    Warn,

    /// Info, warnings, and errors
    #[default]
    Info,

    /// Debug and above
    Debug,

    /// All messages including traces
    Trace,
}

impl LogLevel {
    /// Convert to tracing::Level
    pub fn to_tracing_level(&self) -> tracing::Level {
        match self {
            LogLevel::Error => tracing::Level::ERROR,
            LogLevel::Warn => tracing::Level::WARN,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Trace => tracing::Level::TRACE,
        }
    }
}

/// Logging settings
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default)]
    pub log_level: LogLevel,

    /// Log file path (None = stderr)
    #[serde(default)]
    pub log_file: Option<PathBuf>,

    /// Shorthand for log_level = debug
    #[serde(default)]
    pub verbose: bool,
}

/// Full request as delivered by the pipeline
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceConfig {
    pub source: Source,

    #[serde(default)]
    pub version: RequestedVersion,

    #[serde(default)]
    pub params: PutParams,

    #[serde(default)]
    pub logging: LoggingConfig,
}

impl ResourceConfig {
    /// Parse the JSON request format
    pub fn from_json_str(json: &str) -> Result<Self> {
        serde_json::from_str(json)
            .map_err(|e| Error::InvalidConfig(format!("failed to parse request: {}", e)))
    }

    /// Parse a TOML configuration
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        toml::from_str(contents)
            .map_err(|e| Error::InvalidConfig(format!("failed to parse configuration: {}", e)))
    }

    /// Load a TOML configuration file
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml_str(&contents)
    }

    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self)
            .map_err(|e| Error::InvalidConfig(format!("failed to serialize configuration: {}", e)))
    }
}
