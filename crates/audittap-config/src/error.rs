//! Configuration error types.

use std::path::PathBuf;
use thiserror::Error;

/// Why a tap configuration could not be loaded or is unusable.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The named configuration file does not exist.
    #[error("configuration file not found: {path}")]
    Missing {
        /// Path that was looked up.
        path: PathBuf,
    },

    /// The configuration file exists but could not be read.
    #[error("failed to read configuration file {path}")]
    Read {
        /// Path to the file.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// Content is not a format the loader understands.
    #[error("unsupported configuration format: {0}")]
    UnsupportedFormat(String),

    /// Malformed TOML.
    #[error("failed to parse TOML configuration: {0}")]
    Toml(#[from] toml::de::Error),

    /// Malformed JSON.
    #[error("failed to parse JSON configuration: {0}")]
    Json(#[from] serde_json::Error),

    /// A field holds a value the tap cannot use.
    #[error("invalid value for {field}: {reason}")]
    Invalid {
        /// The offending field.
        field: &'static str,
        /// What is wrong with it.
        reason: String,
    },

    /// An environment override could not be parsed.
    #[error("cannot parse environment variable {var}: {reason}")]
    Env {
        /// Full variable name, prefix included.
        var: String,
        /// What was expected.
        reason: &'static str,
    },

    /// Fields that are individually valid but do not fit together.
    #[error("inconsistent configuration: {0}")]
    Conflict(String),
}

impl ConfigError {
    /// A missing file.
    pub fn missing(path: impl Into<PathBuf>) -> Self {
        Self::Missing { path: path.into() }
    }

    /// An unreadable file.
    pub fn read(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Read {
            path: path.into(),
            source,
        }
    }

    /// A bad field value.
    pub fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            field,
            reason: reason.into(),
        }
    }

    /// A bad environment override.
    pub fn env(var: impl Into<String>, reason: &'static str) -> Self {
        Self::Env {
            var: var.into(),
            reason,
        }
    }

    /// The field a value error refers to, if any.
    pub fn field(&self) -> Option<&'static str> {
        match self {
            Self::Invalid { field, .. } => Some(field),
            _ => None,
        }
    }
}
