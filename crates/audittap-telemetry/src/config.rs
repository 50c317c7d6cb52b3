//! Combined telemetry configuration.

use std::env;

use crate::logging::LogConfig;
use crate::metrics::MetricsConfig;
use crate::TelemetryResult;

/// Metrics listen address variable. Setting it enables metrics.
pub const METRICS_ADDR_ENV: &str = "AUDITTAP_METRICS_ADDR";

/// Logging plus metrics, installed together by [`init_telemetry`](crate::init_telemetry).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TelemetryConfig {
    /// Logging configuration.
    pub logging: LogConfig,
    /// Metrics configuration.
    pub metrics: MetricsConfig,
}

impl TelemetryConfig {
    /// Creates a builder starting from production logging and no metrics.
    #[must_use]
    pub fn builder() -> TelemetryConfigBuilder {
        TelemetryConfigBuilder::default()
    }

    /// Reads logging from the `AUDITTAP_LOG*` variables and enables metrics
    /// when [`METRICS_ADDR_ENV`] is set.
    ///
    /// # Errors
    ///
    /// Propagates [`LogConfig::from_env`] errors.
    pub fn from_env() -> TelemetryResult<Self> {
        let logging = LogConfig::from_env()?;
        let metrics = match env::var(METRICS_ADDR_ENV) {
            Ok(addr) if !addr.trim().is_empty() => MetricsConfig {
                enabled: true,
                listen_addr: Some(addr),
                backend: None,
            },
            _ => MetricsConfig::default(),
        };
        Ok(Self { logging, metrics })
    }
}

/// Builder for [`TelemetryConfig`].
#[derive(Debug, Default)]
pub struct TelemetryConfigBuilder {
    config: TelemetryConfig,
}

impl TelemetryConfigBuilder {
    /// Replaces the logging configuration.
    #[must_use]
    pub fn logging(mut self, logging: LogConfig) -> Self {
        self.config.logging = logging;
        self
    }

    /// Sets the log filter directive.
    #[must_use]
    pub fn log_filter(mut self, filter: impl Into<String>) -> Self {
        self.config.logging.filter = filter.into();
        self
    }

    /// Enables metrics with the exporter listening on `addr`.
    #[must_use]
    pub fn metrics_addr(mut self, addr: impl Into<String>) -> Self {
        self.config.metrics.enabled = true;
        self.config.metrics.listen_addr = Some(addr.into());
        self
    }

    /// Labels every metric with the audited backend.
    #[must_use]
    pub fn backend(mut self, backend: impl Into<String>) -> Self {
        self.config.metrics.backend = Some(backend.into());
        self
    }

    /// Builds the configuration.
    #[must_use]
    pub fn build(self) -> TelemetryConfig {
        self.config
    }
}
