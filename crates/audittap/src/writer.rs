//! The response-writer contract the tap sits on.
//!
//! A [`ResponseWriter`] is the outbound half of an exchange: the downstream
//! handler sets headers, writes a status line once, then streams body bytes.
//! Optional capabilities (flushing, taking over the raw connection) are
//! discovered at call time through [`ResponseWriter::as_flusher`] and
//! [`ResponseWriter::as_hijacker`].

use std::io;

use bytes::BytesMut;
use http::{HeaderMap, StatusCode};
use http_body_util::Full;
use tokio::io::{AsyncRead, AsyncWrite};

use crate::error::WriterError;
use crate::handler::BoxFuture;
use crate::types::Response;

/// A raw bidirectional connection obtained by hijacking a writer.
pub trait Connection: AsyncRead + AsyncWrite + Send + Unpin {}

impl<T> Connection for T where T: AsyncRead + AsyncWrite + Send + Unpin {}

/// Writers that can push buffered bytes to the client early.
pub trait Flusher: Send {
    /// Flushes buffered body bytes.
    fn flush(&mut self) -> BoxFuture<'_, io::Result<()>>;
}

/// Writers that can hand over the underlying connection.
pub trait Hijacker: Send {
    /// Takes over the connection. The writer must not be used afterwards.
    fn hijack(&mut self) -> Result<Box<dyn Connection>, WriterError>;
}

/// The outbound response of one HTTP exchange.
pub trait ResponseWriter: Send {
    /// Response headers written so far.
    fn headers(&self) -> &HeaderMap;

    /// Mutable response headers; changes after `write_header` have no effect
    /// on the wire.
    fn headers_mut(&mut self) -> &mut HeaderMap;

    /// Sends the status line and headers.
    fn write_header(&mut self, status: StatusCode);

    /// Writes body bytes, returning how many the writer accepted.
    fn write<'a>(&'a mut self, buf: &'a [u8]) -> BoxFuture<'a, io::Result<usize>>;

    /// Flush capability, if the writer has one.
    fn as_flusher(&mut self) -> Option<&mut dyn Flusher> {
        None
    }

    /// Hijack capability, if the writer has one.
    fn as_hijacker(&mut self) -> Option<&mut dyn Hijacker> {
        None
    }
}

/// An in-memory writer that turns into an [`http::Response`].
///
/// Used to put the tap in front of services that return whole responses
/// rather than writing to a stream. Offers neither flush nor hijack.
#[derive(Debug, Default)]
pub struct BufferedResponseWriter {
    status: Option<StatusCode>,
    headers: HeaderMap,
    body: BytesMut,
}

impl BufferedResponseWriter {
    /// Creates an empty writer.
    pub fn new() -> Self {
        Self::default()
    }

    /// The status written so far, if any.
    pub fn status(&self) -> Option<StatusCode> {
        self.status
    }

    /// The body written so far.
    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// Converts the written status, headers and body into a response.
    ///
    /// A writer that never received a status yields `200 OK`.
    pub fn into_response(self) -> Response {
        let mut response = http::Response::new(Full::new(self.body.freeze()));
        *response.status_mut() = self.status.unwrap_or(StatusCode::OK);
        *response.headers_mut() = self.headers;
        response
    }
}

impl ResponseWriter for BufferedResponseWriter {
    fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    fn write_header(&mut self, status: StatusCode) {
        // Only the first status reaches the wire.
        if self.status.is_none() {
            self.status = Some(status);
        }
    }

    fn write<'a>(&'a mut self, buf: &'a [u8]) -> BoxFuture<'a, io::Result<usize>> {
        Box::pin(async move {
            if self.status.is_none() {
                self.status = Some(StatusCode::OK);
            }
            self.body.extend_from_slice(buf);
            Ok(buf.len())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::header::CONTENT_TYPE;
    use http_body_util::BodyExt;

    #[tokio::test]
    async fn test_buffered_writer_into_response() {
        let mut writer = BufferedResponseWriter::new();
        writer
            .headers_mut()
            .insert(CONTENT_TYPE, "text/plain".parse().unwrap());
        writer.write_header(StatusCode::CREATED);
        writer.write(b"hello").await.unwrap();

        let response = writer.into_response();
        assert_eq!(response.status(), StatusCode::CREATED);
        assert_eq!(response.headers()[CONTENT_TYPE], "text/plain");

        let body = response.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(&body[..], b"hello");
    }

    #[tokio::test]
    async fn test_buffered_writer_write_implies_ok() {
        let mut writer = BufferedResponseWriter::new();
        writer.write(b"x").await.unwrap();
        writer.write_header(StatusCode::NOT_FOUND);
        assert_eq!(writer.status(), Some(StatusCode::OK));
    }

    #[test]
    fn test_buffered_writer_without_status_defaults_to_ok() {
        let writer = BufferedResponseWriter::new();
        assert_eq!(writer.status(), None);
        assert_eq!(writer.into_response().status(), StatusCode::OK);
    }

    #[test]
    fn test_buffered_writer_has_no_capabilities() {
        let mut writer = BufferedResponseWriter::new();
        assert!(writer.as_flusher().is_none());
        assert!(writer.as_hijacker().is_none());
    }
}
