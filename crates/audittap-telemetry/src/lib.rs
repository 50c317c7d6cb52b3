//! Observability for the audit tap.
//!
//! The audit path is a best-effort side channel: delivery failures never reach
//! the client, so logs and metrics are the only place operators see them.
//! This crate provides both:
//!
//! - **Logging**: structured JSON (or pretty) logging via `tracing-subscriber`
//! - **Metrics**: Prometheus-format counters and histograms via the `metrics` crate
//!
//! # Standard Metrics
//!
//! | Metric | Type | Labels | Description |
//! |--------|------|--------|-------------|
//! | `audittap_deliveries_total` | Counter | `sink`, `outcome` | Audit deliveries per sink |
//! | `audittap_render_failures_total` | Counter | `sink` | Summaries that failed to render |
//! | `audittap_response_size_bytes` | Histogram | - | Response body size seen by the tap |
//! | `audittap_queue_errors_total` | Counter | `topic` | Producer errors drained in the background |
//! | `audittap_sink_start_failures_total` | Counter | `sink` | Configured sinks that failed to start |
//!
//! # Example
//!
//! ```rust,ignore
//! use audittap_telemetry::{init_telemetry, TelemetryConfig};
//!
//! let config = TelemetryConfig::builder()
//!     .backend("billing")
//!     .metrics_addr("0.0.0.0:9090")
//!     .build();
//!
//! init_telemetry(&config)?;
//! ```

#![warn(missing_docs)]

pub mod config;
pub mod error;
pub mod logging;
pub mod metrics;

pub use config::{TelemetryConfig, TelemetryConfigBuilder};
pub use error::TelemetryError;
pub use logging::{init_logging, LogConfig, LogFormat};
pub use metrics::{init_metrics, render_metrics, MetricsConfig};

/// Result type for telemetry operations.
pub type TelemetryResult<T> = Result<T, TelemetryError>;

/// Installs logging, then metrics.
///
/// # Errors
///
/// Returns `TelemetryError` if either subsystem fails to initialize.
pub fn init_telemetry(config: &TelemetryConfig) -> TelemetryResult<()> {
    init_logging(&config.logging)?;
    init_metrics(&config.metrics)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_with_everything_disabled() {
        let mut config = TelemetryConfig::default();
        config.logging.enabled = false;
        config.metrics.enabled = false;

        assert!(init_telemetry(&config).is_ok());
    }
}
