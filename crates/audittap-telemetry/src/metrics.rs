//! Prometheus metrics for the audit tap.
//!
//! # Example
//!
//! ```rust,ignore
//! use audittap_telemetry::metrics::record_delivery;
//!
//! record_delivery("file", true);
//! ```

use crate::error::TelemetryError;
use crate::TelemetryResult;
use metrics::{counter, describe_counter, describe_histogram, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::net::SocketAddr;
use std::sync::OnceLock;

/// Global metrics handle for rendering.
static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Deliveries counter, labelled by `sink` and `outcome`.
pub const DELIVERIES_TOTAL: &str = "audittap_deliveries_total";

/// Render failures counter, labelled by `sink`.
pub const RENDER_FAILURES_TOTAL: &str = "audittap_render_failures_total";

/// Response size histogram.
pub const RESPONSE_SIZE_BYTES: &str = "audittap_response_size_bytes";

/// Background producer errors counter, labelled by `topic`.
pub const QUEUE_ERRORS_TOTAL: &str = "audittap_queue_errors_total";

/// Sinks left out of a tap because they failed to start, labelled by `sink`.
pub const SINK_START_FAILURES_TOTAL: &str = "audittap_sink_start_failures_total";

/// Metrics configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetricsConfig {
    /// Install a recorder at all.
    pub enabled: bool,

    /// Serve `/metrics` on this address (e.g. `"0.0.0.0:9090"`). Without it
    /// the host application exposes [`render_metrics`] itself.
    pub listen_addr: Option<String>,

    /// Value of the `backend` label attached to every metric.
    pub backend: Option<String>,
}

/// Installs the Prometheus recorder, and the HTTP exporter when a listen
/// address is configured.
///
/// The exporter runs on the current Tokio runtime.
///
/// # Errors
///
/// Returns `TelemetryError::InvalidAddress` for an unparsable address and
/// `TelemetryError::Metrics` if there is no runtime for the exporter or a
/// recorder is already installed.
pub fn init_metrics(config: &MetricsConfig) -> TelemetryResult<()> {
    if !config.enabled {
        return Ok(());
    }

    let mut builder = PrometheusBuilder::new();
    if let Some(backend) = &config.backend {
        builder = builder.add_global_label("backend", backend.clone());
    }

    let handle = match &config.listen_addr {
        Some(addr) => {
            let addr: SocketAddr = addr.parse().map_err(|source| TelemetryError::InvalidAddress {
                addr: addr.clone(),
                source,
            })?;
            let runtime = tokio::runtime::Handle::try_current()
                .map_err(|_| TelemetryError::Metrics("the exporter needs a Tokio runtime".into()))?;

            let (recorder, exporter) = builder
                .with_http_listener(addr)
                .build()
                .map_err(|e| TelemetryError::Metrics(e.to_string()))?;
            let handle = recorder.handle();
            metrics::set_global_recorder(recorder)
                .map_err(|e| TelemetryError::Metrics(e.to_string()))?;

            runtime.spawn(async move {
                if let Err(e) = exporter.await {
                    tracing::error!(error = ?e, "metrics exporter stopped");
                }
            });
            handle
        }
        None => builder
            .install_recorder()
            .map_err(|e| TelemetryError::Metrics(e.to_string()))?,
    };

    let _ = METRICS_HANDLE.set(handle);
    register_metric_descriptions();

    Ok(())
}

/// Renders metrics in Prometheus format.
///
/// Returns `None` if metrics are not initialized.
#[must_use]
pub fn render_metrics() -> Option<String> {
    METRICS_HANDLE.get().map(PrometheusHandle::render)
}

fn register_metric_descriptions() {
    describe_counter!(DELIVERIES_TOTAL, "Audit records handed to each sink, by outcome");
    describe_counter!(
        RENDER_FAILURES_TOTAL,
        "Audit records that could not be rendered for a sink"
    );
    describe_histogram!(
        RESPONSE_SIZE_BYTES,
        "Response body size observed by the audit tap"
    );
    describe_counter!(
        QUEUE_ERRORS_TOTAL,
        "Producer errors drained by the queue sink background task"
    );
    describe_counter!(
        SINK_START_FAILURES_TOTAL,
        "Configured sinks that failed to start and were left out"
    );
}

/// Records the outcome of delivering one record to one sink.
pub fn record_delivery(sink: &'static str, ok: bool) {
    let outcome = if ok { "ok" } else { "error" };
    counter!(DELIVERIES_TOTAL, "sink" => sink, "outcome" => outcome).increment(1);
}

/// Records a render failure for a sink.
pub fn record_render_failure(sink: &'static str) {
    counter!(RENDER_FAILURES_TOTAL, "sink" => sink).increment(1);
}

/// Records the body size of an audited response.
pub fn record_response_size(size_bytes: u64) {
    histogram!(RESPONSE_SIZE_BYTES).record(size_bytes as f64);
}

/// Records a sink that failed to start.
pub fn record_sink_start_failure(sink: &'static str) {
    counter!(SINK_START_FAILURES_TOTAL, "sink" => sink).increment(1);
}

/// Records a producer error drained in the background.
pub fn record_queue_error(topic: &str) {
    counter!(QUEUE_ERRORS_TOTAL, "topic" => topic.to_string()).increment(1);
}
