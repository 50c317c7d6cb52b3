//! Audit sinks: where rendered summaries go.
//!
//! | Sink | Delivery |
//! |------|----------|
//! | [`NoopAuditSink`] | keeps the last summary in memory |
//! | [`FileAuditSink`] | appends to one JSON array per file |
//! | [`HttpAuditSink`] | one HTTP request per summary |
//! | [`QueueAuditSink`] | hands off to an async producer, errors drained in the background |
//!
//! Each sink owns its renderer and its resource. Sinks that own a resource
//! must be closed; `close` on the others is a no-op.

mod file;
mod http;
mod noop;
mod queue;

pub use self::file::{determine_filename, FileAuditSink};
pub use self::http::HttpAuditSink;
pub use self::noop::NoopAuditSink;
#[cfg(feature = "kafka")]
pub use self::queue::KafkaTransport;
pub use self::queue::{AsyncProducer, ProducerError, ProducerMessage, QueueAuditSink, Transport};

use bytes::Bytes;

use crate::error::AuditResult;
use crate::handler::BoxFuture;
use crate::render::Renderer;
use crate::summary::Summary;

/// A delivery target for audit records.
pub trait AuditSink: Send + Sync {
    /// Short name used in logs and metric labels.
    fn name(&self) -> &'static str;

    /// Renders and delivers one summary.
    fn audit<'a>(&'a self, summary: &'a Summary) -> BoxFuture<'a, AuditResult<()>>;

    /// Releases the sink's resource.
    fn close(&self) -> BoxFuture<'_, AuditResult<()>> {
        Box::pin(async { Ok(()) })
    }
}

/// Renders `summary`, counting failures against `sink`.
pub(crate) fn encode(sink: &'static str, renderer: &dyn Renderer, summary: &Summary) -> AuditResult<Bytes> {
    renderer.render(summary).encode().map_err(|e| {
        audittap_telemetry::metrics::record_render_failure(sink);
        e
    })
}
