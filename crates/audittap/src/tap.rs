//! The audit tap middleware.
//!
//! For every request the tap:
//!
//! 1. builds a [`RequestSummary`] on entry
//! 2. wraps the response writer in an [`AuditResponseWriter`]
//! 3. runs the downstream handler
//! 4. builds the [`ResponseSummary`] and pairs the two into a [`Summary`]
//! 5. delivers the summary to every sink, concurrently
//!
//! Sink failures are logged and counted; they never touch the response the
//! handler already wrote, and never stop the other sinks.

use std::sync::Arc;
use std::time::Duration;

use audittap_config::{AuditTapConfig, DEFAULT_AUDIT_TYPE};
use audittap_telemetry::metrics::{record_delivery, record_response_size, record_sink_start_failure};
use futures_util::future::join_all;
use http::header::HOST;
use tracing::{debug, warn};

use crate::clock::{Clock, SystemClock};
use crate::error::{AuditError, AuditResult};
use crate::handler::Next;
use crate::headers::normalize;
use crate::recorder::AuditResponseWriter;
use crate::render::renderer_for;
use crate::sinks::{AuditSink, FileAuditSink, HttpAuditSink, NoopAuditSink};
use crate::summary::{RequestSummary, Summary};
use crate::types::{RemoteAddr, Request, Response};
use crate::writer::{BufferedResponseWriter, ResponseWriter};

/// Records every request/response pair and fans it out to sinks.
///
/// A tap always has at least one sink.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use audittap::{AuditTap, Next, NoopAuditSink};
/// use http::StatusCode;
///
/// # tokio_test::block_on(async {
/// let sink = Arc::new(NoopAuditSink::new());
/// let tap = AuditTap::builder("frontend").sink(sink.clone()).build();
///
/// let request = http::Request::builder().uri("/hello").body(Default::default()).unwrap();
/// let response = tap
///     .serve_buffered(
///         request,
///         Next::handler(|writer, _request| {
///             Box::pin(async move {
///                 writer.write_header(StatusCode::ACCEPTED);
///             })
///         }),
///     )
///     .await;
///
/// assert_eq!(response.status(), StatusCode::ACCEPTED);
/// assert_eq!(sink.last().unwrap().response.status, 202);
/// # });
/// ```
pub struct AuditTap {
    backend: String,
    audit_type: String,
    sinks: Vec<Arc<dyn AuditSink>>,
    clock: Arc<dyn Clock>,
    size_threshold: Option<u64>,
}

impl AuditTap {
    /// Creates a builder for an explicitly assembled tap.
    pub fn builder(backend: impl Into<String>) -> AuditTapBuilder {
        AuditTapBuilder::new(backend)
    }

    /// Builds a tap from configuration.
    ///
    /// One sink per configured destination, all sharing the configured
    /// format:
    ///
    /// - `log_file` → file sink
    /// - `endpoint` with `topic` → queue sink
    /// - `endpoint` alone → HTTP sink
    /// - none of these → a single no-op sink
    ///
    /// A sink that fails to start is logged and left out; the tap runs with
    /// the ones that did start.
    ///
    /// # Errors
    ///
    /// Returns `AuditError::Config` for an invalid size threshold, and the
    /// first sink error when destinations were configured but none of them
    /// started (`Config`, `Io`, or `Unsupported` for a queue sink without
    /// the `kafka` feature).
    pub fn from_config(config: &AuditTapConfig, backend: &str) -> AuditResult<Self> {
        let size_threshold = config.size_threshold_bytes()?;
        let renderer = renderer_for(config.format);

        let mut attempts: Vec<(&'static str, AuditResult<Arc<dyn AuditSink>>)> = Vec::new();
        if let Some(file) = &config.log_file {
            let sink = FileAuditSink::open(file, backend, config.truncate, Arc::clone(&renderer));
            attempts.push(("file", sink.map(|s| Arc::new(s) as Arc<dyn AuditSink>)));
        }
        match (&config.endpoint, &config.topic) {
            (Some(endpoint), Some(topic)) => attempts.push((
                "queue",
                queue_sink(topic, endpoint, config.queue_capacity, Arc::clone(&renderer)),
            )),
            (Some(endpoint), None) => {
                let sink = HttpAuditSink::new(
                    &config.method,
                    endpoint,
                    Duration::from_millis(config.http_timeout_ms),
                    Arc::clone(&renderer),
                );
                attempts.push(("http", sink.map(|s| Arc::new(s) as Arc<dyn AuditSink>)));
            }
            (None, Some(topic)) => attempts.push((
                "queue",
                Err(AuditError::config(format!("topic '{topic}' has no broker endpoint"))),
            )),
            (None, None) => {}
        }

        let mut sinks = Vec::with_capacity(attempts.len());
        let mut first_error = None;
        for (name, attempt) in attempts {
            match attempt {
                Ok(sink) => sinks.push(sink),
                Err(e) => {
                    warn!(backend, sink = name, error = %e, "audit sink failed to start");
                    record_sink_start_failure(name);
                    first_error.get_or_insert(e);
                }
            }
        }
        if sinks.is_empty() {
            if let Some(e) = first_error {
                return Err(e);
            }
        }

        let tap = Self::builder(backend)
            .audit_type(config.audit_type.clone())
            .sinks(sinks);
        let tap = match size_threshold {
            Some(bytes) => tap.size_threshold(bytes),
            None => tap,
        };
        Ok(tap.build())
    }

    /// The backend this tap audits.
    pub fn backend(&self) -> &str {
        &self.backend
    }

    /// The sinks, in delivery order.
    pub fn sinks(&self) -> &[Arc<dyn AuditSink>] {
        &self.sinks
    }

    /// The reserved size threshold in bytes; `None` is unbounded. Not
    /// applied to records.
    pub fn size_threshold(&self) -> Option<u64> {
        self.size_threshold
    }

    /// Audits one exchange: runs `next` against an instrumented `writer`,
    /// then delivers the resulting summary to every sink.
    ///
    /// Returns the summary that was delivered.
    pub async fn serve(&self, writer: &mut dyn ResponseWriter, request: Request, next: Next<'_>) -> Summary {
        let request_summary = self.summarise_request(&request);

        let mut recorder = AuditResponseWriter::new(writer);
        next.run(&mut recorder, request).await;

        let mut response_summary = recorder.summarise(self.clock.as_ref());
        response_summary.source = self.backend.clone();
        response_summary.audit_type = self.audit_type.clone();
        record_response_size(response_summary.size);

        let summary = Summary::new(request_summary, response_summary);
        self.deliver(&summary).await;
        summary
    }

    /// Audits one exchange for a handler that produces a whole response.
    ///
    /// The handler writes into an in-memory writer, which becomes the
    /// returned response once every sink has run.
    pub async fn serve_buffered(&self, request: Request, next: Next<'_>) -> Response {
        let mut writer = BufferedResponseWriter::new();
        self.serve(&mut writer, request, next).await;
        writer.into_response()
    }

    /// Closes every sink, returning the first error after trying them all.
    pub async fn close(&self) -> AuditResult<()> {
        let mut first_error = None;
        for sink in &self.sinks {
            if let Err(e) = sink.close().await {
                warn!(backend = %self.backend, sink = sink.name(), error = %e, "failed to close audit sink");
                first_error.get_or_insert(e);
            }
        }
        debug!(backend = %self.backend, "audit tap closed");
        first_error.map_or(Ok(()), Err)
    }

    fn summarise_request(&self, request: &Request) -> RequestSummary {
        let uri = request.uri();
        let host = uri
            .authority()
            .map(|a| a.as_str().to_string())
            .or_else(|| {
                request
                    .headers()
                    .get(HOST)
                    .map(|h| String::from_utf8_lossy(h.as_bytes()).into_owned())
            })
            .unwrap_or_default();

        let mut header = normalize(request.headers());
        header.remove("host");

        RequestSummary {
            source: self.backend.clone(),
            audit_type: self.audit_type.clone(),
            host,
            method: request.method().as_str().to_string(),
            path: uri.path().to_string(),
            query: uri.query().unwrap_or_default().to_string(),
            remote_addr: request
                .extensions()
                .get::<RemoteAddr>()
                .map(ToString::to_string)
                .unwrap_or_default(),
            header,
            began_at: self.clock.now(),
        }
    }

    async fn deliver(&self, summary: &Summary) {
        let deliveries = self.sinks.iter().map(|sink| async move {
            match sink.audit(summary).await {
                Ok(()) => record_delivery(sink.name(), true),
                Err(e) => {
                    warn!(
                        backend = %self.backend,
                        sink = sink.name(),
                        method = %summary.request.method,
                        path = %summary.request.path,
                        error = %e,
                        "audit delivery failed"
                    );
                    record_delivery(sink.name(), false);
                }
            }
        });
        join_all(deliveries).await;
    }
}

impl std::fmt::Debug for AuditTap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let sinks: Vec<&str> = self.sinks.iter().map(|s| s.name()).collect();
        f.debug_struct("AuditTap")
            .field("backend", &self.backend)
            .field("audit_type", &self.audit_type)
            .field("sinks", &sinks)
            .field("clock", &self.clock)
            .field("size_threshold", &self.size_threshold)
            .finish()
    }
}

#[cfg(feature = "kafka")]
fn queue_sink(
    topic: &str,
    brokers: &str,
    capacity: usize,
    renderer: Arc<dyn crate::render::Renderer>,
) -> AuditResult<Arc<dyn AuditSink>> {
    use crate::sinks::{KafkaTransport, QueueAuditSink};

    let transport = Arc::new(KafkaTransport::new(brokers)?);
    Ok(Arc::new(QueueAuditSink::new(topic, transport, capacity, renderer)?))
}

#[cfg(not(feature = "kafka"))]
fn queue_sink(
    topic: &str,
    _brokers: &str,
    _capacity: usize,
    _renderer: Arc<dyn crate::render::Renderer>,
) -> AuditResult<Arc<dyn AuditSink>> {
    Err(AuditError::unsupported(format!(
        "queue sink for topic '{topic}' requires the `kafka` feature"
    )))
}

/// Builder for [`AuditTap`].
pub struct AuditTapBuilder {
    backend: String,
    audit_type: String,
    sinks: Vec<Arc<dyn AuditSink>>,
    clock: Arc<dyn Clock>,
    size_threshold: Option<u64>,
}

impl AuditTapBuilder {
    /// Creates a builder for `backend` with the system clock and no sinks.
    pub fn new(backend: impl Into<String>) -> Self {
        Self {
            backend: backend.into(),
            audit_type: DEFAULT_AUDIT_TYPE.to_string(),
            sinks: Vec::new(),
            clock: Arc::new(SystemClock),
            size_threshold: None,
        }
    }

    /// Sets the audit-type tag.
    #[must_use]
    pub fn audit_type(mut self, audit_type: impl Into<String>) -> Self {
        self.audit_type = audit_type.into();
        self
    }

    /// Adds a sink.
    #[must_use]
    pub fn sink(mut self, sink: Arc<dyn AuditSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    /// Adds several sinks, in order.
    #[must_use]
    pub fn sinks(mut self, sinks: impl IntoIterator<Item = Arc<dyn AuditSink>>) -> Self {
        self.sinks.extend(sinks);
        self
    }

    /// Sets the time source.
    #[must_use]
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Sets the reserved size threshold.
    #[must_use]
    pub fn size_threshold(mut self, bytes: u64) -> Self {
        self.size_threshold = Some(bytes);
        self
    }

    /// Builds the tap, adding a no-op sink if none were given.
    #[must_use]
    pub fn build(mut self) -> AuditTap {
        if self.sinks.is_empty() {
            self.sinks.push(Arc::new(NoopAuditSink::new()));
        }
        AuditTap {
            backend: self.backend,
            audit_type: self.audit_type,
            sinks: self.sinks,
            clock: self.clock,
            size_threshold: self.size_threshold,
        }
    }
}
