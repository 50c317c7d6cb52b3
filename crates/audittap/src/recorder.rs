//! Response instrumentation.
//!
//! [`AuditResponseWriter`] decorates the outbound writer. Every call is
//! forwarded unchanged; along the way it records the first status and the
//! number of body bytes the underlying writer accepted. Once the handler
//! returns, [`AuditResponseWriter::summarise`] turns what it saw into a
//! [`ResponseSummary`].

use std::io;

use http::{HeaderMap, StatusCode};

use crate::clock::Clock;
use crate::error::WriterError;
use crate::handler::BoxFuture;
use crate::headers::normalize;
use crate::summary::ResponseSummary;
use crate::writer::{Connection, Flusher, Hijacker, ResponseWriter};

/// A recording decorator over a [`ResponseWriter`].
///
/// Always advertises flush and hijack; whether they do anything depends on
/// the wrapped writer. Flushing a writer without the capability is a no-op,
/// hijacking one fails with [`WriterError::Unsupported`].
pub struct AuditResponseWriter<'w> {
    inner: &'w mut dyn ResponseWriter,
    status: u16,
    size: u64,
}

impl<'w> AuditResponseWriter<'w> {
    /// Wraps `inner`.
    pub fn new(inner: &'w mut dyn ResponseWriter) -> Self {
        Self {
            inner,
            status: 0,
            size: 0,
        }
    }

    /// The recorded status, 0 if none was written yet.
    pub fn status(&self) -> u16 {
        self.status
    }

    /// Body bytes accepted so far.
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Produces the response summary, reading the headers as they are now.
    ///
    /// The audit tags are left empty; the tap fills them in.
    pub fn summarise(self, clock: &dyn Clock) -> ResponseSummary {
        ResponseSummary {
            source: String::new(),
            audit_type: String::new(),
            status: self.status,
            header: normalize(self.inner.headers()),
            size: self.size,
            completed_at: clock.now(),
        }
    }
}

impl ResponseWriter for AuditResponseWriter<'_> {
    fn headers(&self) -> &HeaderMap {
        self.inner.headers()
    }

    fn headers_mut(&mut self) -> &mut HeaderMap {
        self.inner.headers_mut()
    }

    fn write_header(&mut self, status: StatusCode) {
        self.inner.write_header(status);
        if self.status == 0 {
            self.status = status.as_u16();
        }
    }

    fn write<'a>(&'a mut self, buf: &'a [u8]) -> BoxFuture<'a, io::Result<usize>> {
        Box::pin(async move {
            if self.status == 0 {
                self.write_header(StatusCode::OK);
            }
            let written = self.inner.write(buf).await?;
            self.size += written as u64;
            Ok(written)
        })
    }

    fn as_flusher(&mut self) -> Option<&mut dyn Flusher> {
        Some(self)
    }

    fn as_hijacker(&mut self) -> Option<&mut dyn Hijacker> {
        Some(self)
    }
}

impl Flusher for AuditResponseWriter<'_> {
    fn flush(&mut self) -> BoxFuture<'_, io::Result<()>> {
        Box::pin(async move {
            match self.inner.as_flusher() {
                Some(flusher) => flusher.flush().await,
                None => Ok(()),
            }
        })
    }
}

impl Hijacker for AuditResponseWriter<'_> {
    fn hijack(&mut self) -> Result<Box<dyn Connection>, WriterError> {
        self.inner
            .as_hijacker()
            .ok_or(WriterError::Unsupported("hijack"))?
            .hijack()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use crate::headers::HeaderEntry;
    use crate::writer::BufferedResponseWriter;
    use chrono::{TimeZone, Utc};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    fn clock() -> FixedClock {
        FixedClock::new(Utc.with_ymd_and_hms(2001, 9, 9, 1, 46, 40).unwrap())
    }

    /// A writer with every capability, counting flushes and handing out an
    /// in-memory duplex stream on hijack.
    #[derive(Default)]
    struct StreamingWriter {
        headers: HeaderMap,
        flushes: usize,
        peer: Option<tokio::io::DuplexStream>,
        hijacked: bool,
    }

    impl ResponseWriter for StreamingWriter {
        fn headers(&self) -> &HeaderMap {
            &self.headers
        }

        fn headers_mut(&mut self) -> &mut HeaderMap {
            &mut self.headers
        }

        fn write_header(&mut self, _status: StatusCode) {}

        fn write<'a>(&'a mut self, buf: &'a [u8]) -> BoxFuture<'a, io::Result<usize>> {
            // Accepts at most four bytes per call, like a short write.
            Box::pin(async move { Ok(buf.len().min(4)) })
        }

        fn as_flusher(&mut self) -> Option<&mut dyn Flusher> {
            Some(self)
        }

        fn as_hijacker(&mut self) -> Option<&mut dyn Hijacker> {
            Some(self)
        }
    }

    impl Flusher for StreamingWriter {
        fn flush(&mut self) -> BoxFuture<'_, io::Result<()>> {
            self.flushes += 1;
            Box::pin(async { Ok(()) })
        }
    }

    impl Hijacker for StreamingWriter {
        fn hijack(&mut self) -> Result<Box<dyn Connection>, WriterError> {
            let (ours, theirs) = tokio::io::duplex(64);
            self.peer = Some(theirs);
            self.hijacked = true;
            Ok(Box::new(ours))
        }
    }

    // =========================================================================
    // Status and Size Tests
    // =========================================================================

    #[tokio::test]
    async fn test_status_without_body() {
        let mut inner = BufferedResponseWriter::new();
        let mut writer = AuditResponseWriter::new(&mut inner);
        writer.write_header(StatusCode::NO_CONTENT);

        let summary = writer.summarise(&clock());
        assert_eq!(summary.status, 204);
        assert_eq!(summary.size, 0);
    }

    #[tokio::test]
    async fn test_size_accumulates() {
        let mut inner = BufferedResponseWriter::new();
        let mut writer = AuditResponseWriter::new(&mut inner);
        writer.write_header(StatusCode::OK);
        writer.write(b"hello").await.unwrap();
        writer.write(b"world").await.unwrap();

        let summary = writer.summarise(&clock());
        assert_eq!(summary.status, 200);
        assert_eq!(summary.size, 10);
        assert_eq!(inner.body(), b"helloworld");
    }

    #[tokio::test]
    async fn test_write_implies_ok() {
        let mut inner = BufferedResponseWriter::new();
        let mut writer = AuditResponseWriter::new(&mut inner);
        writer.write(b"hi").await.unwrap();
        assert_eq!(writer.status(), 200);

        writer.write_header(StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(writer.status(), 200);
        assert_eq!(inner.status(), Some(StatusCode::OK));
    }

    #[tokio::test]
    async fn test_first_status_wins() {
        let mut inner = BufferedResponseWriter::new();
        let mut writer = AuditResponseWriter::new(&mut inner);
        writer.write_header(StatusCode::NOT_FOUND);
        writer.write_header(StatusCode::OK);
        assert_eq!(writer.status(), 404);
    }

    #[tokio::test]
    async fn test_size_counts_accepted_bytes_only() {
        let mut inner = StreamingWriter::default();
        let mut writer = AuditResponseWriter::new(&mut inner);
        let accepted = writer.write(b"0123456789").await.unwrap();
        assert_eq!(accepted, 4);
        assert_eq!(writer.size(), 4);
    }

    #[test]
    fn test_untouched_writer_summarises_to_zero() {
        let mut inner = BufferedResponseWriter::new();
        let writer = AuditResponseWriter::new(&mut inner);
        let summary = writer.summarise(&clock());
        assert_eq!(summary.status, 0);
        assert_eq!(summary.size, 0);
        assert!(summary.header.is_empty());
        assert_eq!(summary.completed_at, clock().now());
    }

    #[test]
    fn test_headers_are_read_at_summary_time() {
        let mut inner = BufferedResponseWriter::new();
        let mut writer = AuditResponseWriter::new(&mut inner);
        writer
            .headers_mut()
            .insert("x-content-type-options", "nosniff".parse().unwrap());
        writer.headers_mut().insert("connection", "close".parse().unwrap());

        let summary = writer.summarise(&clock());
        assert_eq!(
            summary.header.get("xContentTypeOptions"),
            Some(&HeaderEntry::Single("nosniff".into()))
        );
        assert!(!summary.header.contains_key("connection"));
    }

    // =========================================================================
    // Capability Tests
    // =========================================================================

    #[tokio::test]
    async fn test_flush_is_forwarded() {
        let mut inner = StreamingWriter::default();
        {
            let mut writer = AuditResponseWriter::new(&mut inner);
            writer.as_flusher().unwrap().flush().await.unwrap();
        }
        assert_eq!(inner.flushes, 1);
    }

    #[tokio::test]
    async fn test_flush_without_capability_is_noop() {
        let mut inner = BufferedResponseWriter::new();
        let mut writer = AuditResponseWriter::new(&mut inner);
        assert!(writer.as_flusher().unwrap().flush().await.is_ok());
    }

    #[test]
    fn test_hijack_without_capability_is_unsupported() {
        let mut inner = BufferedResponseWriter::new();
        let mut writer = AuditResponseWriter::new(&mut inner);
        let result = writer.as_hijacker().unwrap().hijack();
        assert!(matches!(result, Err(WriterError::Unsupported("hijack"))));
    }

    #[tokio::test]
    async fn test_hijack_is_forwarded() {
        let mut inner = StreamingWriter::default();
        let mut conn = {
            let mut writer = AuditResponseWriter::new(&mut inner);
            writer.as_hijacker().unwrap().hijack().unwrap()
        };
        assert!(inner.hijacked);

        conn.write_all(b"ping").await.unwrap();
        let mut buf = [0u8; 4];
        inner.peer.as_mut().unwrap().read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"ping");
    }
}
