//! Structured logging for the audit tap.
//!
//! Sink delivery failures are logged rather than surfaced to clients, so the
//! log output is where operators look for lost audit records.
//!
//! # Example
//!
//! ```rust,ignore
//! use audittap_telemetry::logging::{LogConfig, init_logging};
//!
//! init_logging(&LogConfig::from_env()?)?;
//!
//! tracing::warn!(sink = "http", error = %err, "audit delivery failed");
//! ```

use std::env;
use std::fmt;
use std::str::FromStr;

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

use crate::error::TelemetryError;
use crate::TelemetryResult;

/// Filter directive variable, e.g. `audittap=debug,hyper=warn`.
pub const FILTER_ENV: &str = "AUDITTAP_LOG";

/// Output format variable: `json`, `pretty` or `compact`.
pub const FORMAT_ENV: &str = "AUDITTAP_LOG_FORMAT";

/// How log lines are written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// One JSON object per event.
    #[default]
    Json,
    /// Multi-line, human-oriented.
    Pretty,
    /// Single-line, human-oriented.
    Compact,
}

impl FromStr for LogFormat {
    type Err = TelemetryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "pretty" => Ok(Self::Pretty),
            "compact" => Ok(Self::Compact),
            _ => Err(TelemetryError::UnknownLogFormat(s.to_string())),
        }
    }
}

impl fmt::Display for LogFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Json => "json",
            Self::Pretty => "pretty",
            Self::Compact => "compact",
        })
    }
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogConfig {
    /// Install a subscriber at all.
    pub enabled: bool,
    /// `EnvFilter` directive.
    pub filter: String,
    /// Output format.
    pub format: LogFormat,
    /// Include the event target (module path).
    pub with_target: bool,
    /// Include file and line.
    pub with_source_location: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self::production()
    }
}

impl LogConfig {
    /// JSON at `info`.
    #[must_use]
    pub fn production() -> Self {
        Self {
            enabled: true,
            filter: "info".to_string(),
            format: LogFormat::Json,
            with_target: true,
            with_source_location: false,
        }
    }

    /// Pretty output at `debug` with source locations.
    #[must_use]
    pub fn development() -> Self {
        Self {
            enabled: true,
            filter: "debug".to_string(),
            format: LogFormat::Pretty,
            with_target: true,
            with_source_location: true,
        }
    }

    /// Production defaults overridden by [`FILTER_ENV`] and [`FORMAT_ENV`].
    ///
    /// # Errors
    ///
    /// Returns `TelemetryError::UnknownLogFormat` for a bad format name.
    pub fn from_env() -> TelemetryResult<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> TelemetryResult<Self> {
        let mut config = Self::production();
        if let Some(filter) = lookup(FILTER_ENV).filter(|f| !f.trim().is_empty()) {
            config.filter = filter;
        }
        if let Some(format) = lookup(FORMAT_ENV) {
            config.format = format.parse()?;
        }
        Ok(config)
    }
}

/// Installs the global `tracing` subscriber.
///
/// # Errors
///
/// Returns `TelemetryError::Logging` if the filter is invalid or a global
/// subscriber is already installed.
pub fn init_logging(config: &LogConfig) -> TelemetryResult<()> {
    if !config.enabled {
        return Ok(());
    }

    let filter = env_filter(&config.filter)?;
    let layer = tracing_subscriber::fmt::layer()
        .with_target(config.with_target)
        .with_file(config.with_source_location)
        .with_line_number(config.with_source_location);

    let layer = match config.format {
        LogFormat::Json => layer.json().with_filter(filter).boxed(),
        LogFormat::Pretty => layer.pretty().with_filter(filter).boxed(),
        LogFormat::Compact => layer.compact().with_filter(filter).boxed(),
    };

    tracing_subscriber::registry()
        .with(layer)
        .try_init()
        .map_err(|e| TelemetryError::Logging(e.to_string()))
}

/// Parses a filter directive.
///
/// # Errors
///
/// Returns `TelemetryError::Logging` for an invalid directive.
pub fn env_filter(directive: &str) -> TelemetryResult<EnvFilter> {
    EnvFilter::try_new(directive)
        .map_err(|e| TelemetryError::Logging(format!("invalid filter '{directive}': {e}")))
}
