//! Message-queue sink.
//!
//! Deliveries go through an [`AsyncProducer`]: `audit` only waits for the
//! message to enter the producer's bounded input channel, never for the
//! broker. A dispatcher task pushes messages through the [`Transport`];
//! failures come back on the producer's error channel, which a drain task
//! logs until the producer shuts down.
//!
//! Closing is a handshake: the producer's input is closed, the dispatcher
//! finishes what is queued and drops the error channel, the drain task sees
//! the channel end and signals back. [`QueueAuditSink::close`] returns only
//! after that signal.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use futures_util::stream::{self, StreamExt};
use parking_lot::Mutex;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error};

use super::{encode, AuditSink};
use crate::error::{AuditError, AuditResult};
use crate::handler::BoxFuture;
use crate::render::Renderer;
use crate::summary::Summary;

/// One message bound for a topic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProducerMessage {
    /// Destination topic.
    pub topic: String,
    /// Rendered record.
    pub value: Bytes,
}

/// A message the transport failed to deliver.
#[derive(Error, Debug)]
#[error("failed to deliver message to topic {}: {reason}", .message.topic)]
pub struct ProducerError {
    /// The undelivered message.
    pub message: ProducerMessage,
    /// Why delivery failed.
    pub reason: String,
}

/// Moves messages to a broker.
pub trait Transport: Send + Sync + 'static {
    /// Delivers one message, resolving once the broker has it or it failed.
    fn send<'a>(&'a self, message: &'a ProducerMessage) -> BoxFuture<'a, AuditResult<()>>;
}

/// A fire-and-forget producer over a [`Transport`].
///
/// Up to `capacity` sends are in flight at once, so delivery order across
/// messages is not preserved.
#[derive(Debug)]
pub struct AsyncProducer {
    input: Mutex<Option<mpsc::Sender<ProducerMessage>>>,
}

impl AsyncProducer {
    /// Starts the dispatcher task, returning the producer and its error
    /// stream. The error stream ends once the producer is closed and every
    /// queued message has been attempted.
    ///
    /// # Errors
    ///
    /// Returns `AuditError::Config` when called outside a Tokio runtime or
    /// with zero capacity.
    pub fn start(
        transport: Arc<dyn Transport>,
        capacity: usize,
    ) -> AuditResult<(Self, mpsc::Receiver<ProducerError>)> {
        if capacity == 0 {
            return Err(AuditError::config("producer capacity must be greater than zero"));
        }
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|_| AuditError::config("queue producer requires a Tokio runtime"))?;

        let (input_tx, mut input_rx) = mpsc::channel::<ProducerMessage>(capacity);
        let (error_tx, error_rx) = mpsc::channel::<ProducerError>(capacity);

        runtime.spawn(async move {
            let transport = &transport;
            let error_tx = &error_tx;
            stream::poll_fn(|cx| input_rx.poll_recv(cx))
                .for_each_concurrent(capacity, |message| async move {
                    if let Err(e) = transport.send(&message).await {
                        let failed = ProducerError {
                            message,
                            reason: e.to_string(),
                        };
                        // The drain task only stops once this task has ended.
                        let _ = error_tx.send(failed).await;
                    }
                })
                .await;
        });

        Ok((
            Self {
                input: Mutex::new(Some(input_tx)),
            },
            error_rx,
        ))
    }

    /// Queues a message, waiting only while the input channel is full.
    pub async fn send(&self, message: ProducerMessage) -> AuditResult<()> {
        let sender = self.input.lock().clone().ok_or(AuditError::Closed("queue"))?;
        sender
            .send(message)
            .await
            .map_err(|_| AuditError::Closed("queue"))
    }

    /// Stops accepting messages. Returns `false` if already closed.
    pub fn async_close(&self) -> bool {
        self.input.lock().take().is_some()
    }
}

/// Hands each summary to an [`AsyncProducer`] for a fixed topic.
pub struct QueueAuditSink {
    topic: String,
    producer: AsyncProducer,
    renderer: Arc<dyn Renderer>,
    drained: Arc<AtomicU64>,
    drain_done: Mutex<Option<oneshot::Receiver<()>>>,
}

impl QueueAuditSink {
    /// Starts a producer on `transport` and the task that drains its errors.
    ///
    /// # Errors
    ///
    /// Returns `AuditError::Config` if the producer cannot start.
    pub fn new(
        topic: impl Into<String>,
        transport: Arc<dyn Transport>,
        capacity: usize,
        renderer: Arc<dyn Renderer>,
    ) -> AuditResult<Self> {
        let topic = topic.into();
        let (producer, mut errors) = AsyncProducer::start(transport, capacity)?;

        let drained = Arc::new(AtomicU64::new(0));
        let (done_tx, done_rx) = oneshot::channel();

        let drain_topic = topic.clone();
        let drain_count = Arc::clone(&drained);
        tokio::spawn(async move {
            while let Some(err) = errors.recv().await {
                error!(topic = %drain_topic, error = %err, "queue producer error");
                audittap_telemetry::metrics::record_queue_error(&drain_topic);
                drain_count.fetch_add(1, Ordering::Relaxed);
            }
            // The receiver only goes away if close was never awaited.
            let _ = done_tx.send(());
        });

        debug!(%topic, renderer = renderer.name(), "queue audit sink ready");

        Ok(Self {
            topic,
            producer,
            renderer,
            drained,
            drain_done: Mutex::new(Some(done_rx)),
        })
    }

    /// The topic every message goes to.
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Producer errors drained so far.
    pub fn errors_drained(&self) -> u64 {
        self.drained.load(Ordering::Relaxed)
    }
}

impl std::fmt::Debug for QueueAuditSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueueAuditSink")
            .field("topic", &self.topic)
            .field("renderer", &self.renderer)
            .field("errors_drained", &self.errors_drained())
            .finish_non_exhaustive()
    }
}

impl AuditSink for QueueAuditSink {
    fn name(&self) -> &'static str {
        "queue"
    }

    fn audit<'a>(&'a self, summary: &'a Summary) -> BoxFuture<'a, AuditResult<()>> {
        Box::pin(async move {
            let value = encode(self.name(), self.renderer.as_ref(), summary)?;
            self.producer
                .send(ProducerMessage {
                    topic: self.topic.clone(),
                    value,
                })
                .await
        })
    }

    fn close(&self) -> BoxFuture<'_, AuditResult<()>> {
        Box::pin(async move {
            let done = self
                .drain_done
                .lock()
                .take()
                .ok_or(AuditError::Closed("queue"))?;

            self.producer.async_close();
            done.await
                .map_err(|_| AuditError::delivery("queue error drain ended without signalling"))?;

            debug!(topic = %self.topic, drained = self.errors_drained(), "queue audit sink closed");
            Ok(())
        })
    }
}

// =============================================================================
// Kafka
// =============================================================================

#[cfg(feature = "kafka")]
pub use self::kafka::KafkaTransport;

#[cfg(feature = "kafka")]
mod kafka {
    use std::time::Duration;

    use rdkafka::config::ClientConfig;
    use rdkafka::producer::{FutureProducer, FutureRecord};

    use super::{ProducerMessage, Transport};
    use crate::error::{AuditError, AuditResult};
    use crate::handler::BoxFuture;

    const QUEUE_TIMEOUT: Duration = Duration::from_secs(5);

    /// Kafka transport backed by librdkafka.
    pub struct KafkaTransport {
        producer: FutureProducer,
    }

    impl KafkaTransport {
        /// Connects a producer to `brokers` (comma-separated `host:port`).
        ///
        /// # Errors
        ///
        /// Returns `AuditError::Config` if the client cannot be created.
        pub fn new(brokers: &str) -> AuditResult<Self> {
            let producer = ClientConfig::new()
                .set("bootstrap.servers", brokers)
                .set("message.timeout.ms", "5000")
                .create()
                .map_err(|e| AuditError::config(format!("kafka producer for '{brokers}': {e}")))?;
            Ok(Self { producer })
        }
    }

    impl Transport for KafkaTransport {
        fn send<'a>(&'a self, message: &'a ProducerMessage) -> BoxFuture<'a, AuditResult<()>> {
            Box::pin(async move {
                let record = FutureRecord::<(), [u8]>::to(&message.topic).payload(&message.value[..]);
                self.producer
                    .send(record, QUEUE_TIMEOUT)
                    .await
                    .map(|_| ())
                    .map_err(|(e, _)| AuditError::delivery(e.to_string()))
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::summary;
    use crate::render::InternalRenderer;
    use tokio_test::{assert_err, assert_ok};

    /// Records every message it is given.
    #[derive(Default)]
    struct RecordingTransport {
        sent: Mutex<Vec<ProducerMessage>>,
    }

    impl Transport for RecordingTransport {
        fn send<'a>(&'a self, message: &'a ProducerMessage) -> BoxFuture<'a, AuditResult<()>> {
            self.sent.lock().push(message.clone());
            Box::pin(async { Ok(()) })
        }
    }

    /// Rejects every message.
    struct FailingTransport;

    impl Transport for FailingTransport {
        fn send<'a>(&'a self, _message: &'a ProducerMessage) -> BoxFuture<'a, AuditResult<()>> {
            Box::pin(async { Err(AuditError::delivery("broker unavailable")) })
        }
    }

    fn internal() -> Arc<dyn Renderer> {
        Arc::new(InternalRenderer)
    }

    // =========================================================================
    // Producer Tests
    // =========================================================================

    #[tokio::test]
    async fn test_producer_delivers_through_transport() {
        let transport = Arc::new(RecordingTransport::default());
        let (producer, mut errors) = AsyncProducer::start(transport.clone(), 4).unwrap();

        producer
            .send(ProducerMessage {
                topic: "audit".into(),
                value: Bytes::from_static(b"{}"),
            })
            .await
            .unwrap();
        assert!(producer.async_close());

        // The error stream ends once the queued message has been attempted.
        assert!(errors.recv().await.is_none());
        assert_eq!(transport.sent.lock().len(), 1);
        assert_eq!(transport.sent.lock()[0].topic, "audit");
    }

    #[tokio::test]
    async fn test_producer_reports_failures() {
        let (producer, mut errors) = AsyncProducer::start(Arc::new(FailingTransport), 4).unwrap();
        producer
            .send(ProducerMessage {
                topic: "audit".into(),
                value: Bytes::from_static(b"x"),
            })
            .await
            .unwrap();

        let err = errors.recv().await.unwrap();
        assert_eq!(err.message.value, Bytes::from_static(b"x"));
        assert!(err.to_string().contains("broker unavailable"));
    }

    #[tokio::test]
    async fn test_producer_rejects_after_close() {
        let (producer, _errors) = AsyncProducer::start(Arc::new(FailingTransport), 1).unwrap();
        assert!(producer.async_close());
        assert!(!producer.async_close());

        let result = producer
            .send(ProducerMessage {
                topic: "audit".into(),
                value: Bytes::new(),
            })
            .await;
        assert!(matches!(result, Err(AuditError::Closed("queue"))));
    }

    #[test]
    fn test_producer_requires_runtime() {
        let result = AsyncProducer::start(Arc::new(FailingTransport), 1);
        assert!(matches!(result, Err(AuditError::Config(_))));
    }

    #[tokio::test]
    async fn test_producer_rejects_zero_capacity() {
        let result = AsyncProducer::start(Arc::new(FailingTransport), 0);
        assert!(matches!(result, Err(AuditError::Config(_))));
    }

    /// Holds every send until two are in flight together.
    struct PairingTransport {
        barrier: tokio::sync::Barrier,
        sent: AtomicU64,
    }

    impl Transport for PairingTransport {
        fn send<'a>(&'a self, _message: &'a ProducerMessage) -> BoxFuture<'a, AuditResult<()>> {
            Box::pin(async move {
                self.barrier.wait().await;
                self.sent.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
        }
    }

    #[tokio::test]
    async fn test_sends_run_concurrently() {
        let transport = Arc::new(PairingTransport {
            barrier: tokio::sync::Barrier::new(2),
            sent: AtomicU64::new(0),
        });
        let sink = QueueAuditSink::new("audit", transport.clone(), 4, internal()).unwrap();

        assert_ok!(sink.audit(&summary("/a")).await);
        assert_ok!(sink.audit(&summary("/b")).await);

        // One send at a time would never get past the barrier.
        let closed = tokio::time::timeout(std::time::Duration::from_secs(5), sink.close()).await;
        assert_ok!(assert_ok!(closed));
        assert_eq!(transport.sent.load(Ordering::SeqCst), 2);
        assert_eq!(sink.errors_drained(), 0);
    }

    // =========================================================================
    // Sink Tests
    // =========================================================================

    #[tokio::test]
    async fn test_audit_sends_rendered_summary_to_topic() {
        let transport = Arc::new(RecordingTransport::default());
        let sink = QueueAuditSink::new("audit-events", transport.clone(), 8, internal()).unwrap();

        assert_ok!(sink.audit(&summary("/queued")).await);
        assert_ok!(sink.close().await);

        let sent = transport.sent.lock();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].topic, "audit-events");
        let value: serde_json::Value = serde_json::from_slice(&sent[0].value).unwrap();
        assert_eq!(value["request"]["path"], "/queued");
    }

    #[tokio::test]
    async fn test_close_waits_for_error_drain() {
        let sink = QueueAuditSink::new("audit", Arc::new(FailingTransport), 8, internal()).unwrap();

        // Audit succeeds: the broker failure surfaces only on the error stream.
        assert_ok!(sink.audit(&summary("/one")).await);
        assert_ok!(sink.audit(&summary("/two")).await);
        assert_ok!(sink.close().await);

        // Both failures were drained before close returned.
        assert_eq!(sink.errors_drained(), 2);
    }

    #[tokio::test]
    async fn test_close_twice_is_error() {
        let sink = QueueAuditSink::new("audit", Arc::new(FailingTransport), 8, internal()).unwrap();
        assert_ok!(sink.close().await);

        let err = assert_err!(sink.close().await);
        assert!(err.is_closed());
    }

    #[tokio::test]
    async fn test_audit_after_close_is_error() {
        let transport = Arc::new(RecordingTransport::default());
        let sink = QueueAuditSink::new("audit", transport.clone(), 8, internal()).unwrap();
        assert_ok!(sink.close().await);

        let err = assert_err!(sink.audit(&summary("/late")).await);
        assert!(err.is_closed());
        assert!(transport.sent.lock().is_empty());
    }
}
