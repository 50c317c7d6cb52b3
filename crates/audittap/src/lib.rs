//! HTTP audit tap.
//!
//! The tap sits in front of a handler, records each request/response pair
//! as a [`Summary`], and delivers it to one or more [`AuditSink`]s: a JSON
//! array file, an HTTP endpoint, or a message-queue topic. It never changes
//! what the client sees, and a failing sink never affects the response or
//! the other sinks.
//!
//! # Example
//!
//! ```
//! use audittap::{AuditTap, Next};
//! use audittap_config::AuditTapConfig;
//! use http::StatusCode;
//!
//! # tokio_test::block_on(async {
//! let tap = AuditTap::from_config(&AuditTapConfig::default(), "frontend").unwrap();
//!
//! let request = http::Request::builder().uri("/ping").body(Default::default()).unwrap();
//! let response = tap
//!     .serve_buffered(
//!         request,
//!         Next::handler(|writer, _request| {
//!             Box::pin(async move {
//!                 writer.write(b"pong").await.unwrap();
//!             })
//!         }),
//!     )
//!     .await;
//!
//! assert_eq!(response.status(), StatusCode::OK);
//! tap.close().await.unwrap();
//! # });
//! ```
//!
//! # Crate Structure
//!
//! - [`headers`] - header normalization
//! - [`summary`] - the audit record model
//! - [`writer`] - the response-writer contract and a buffered writer
//! - [`recorder`] - the instrumenting writer decorator
//! - [`render`] - internal JSON, HMRC and text renderers
//! - [`sinks`] - no-op, file, HTTP and queue sinks
//! - [`tap`] - the middleware itself

#![doc(html_root_url = "https://docs.rs/audittap/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod clock;
pub mod error;
pub mod fixtures;
pub mod handler;
pub mod headers;
pub mod recorder;
pub mod render;
pub mod sinks;
pub mod summary;
pub mod tap;
pub mod types;
pub mod writer;

pub use clock::{Clock, FixedClock, SystemClock};
pub use error::{AuditError, AuditResult, WriterError};
pub use handler::{BoxFuture, Next};
pub use headers::{normalize, FlatHeaders, HeaderEntry};
pub use recorder::AuditResponseWriter;
pub use render::{renderer_for, Encoded, HmrcRenderer, InternalRenderer, Renderer, TextRenderer};
pub use sinks::{AuditSink, FileAuditSink, HttpAuditSink, NoopAuditSink, QueueAuditSink};
pub use summary::{RequestSummary, ResponseSummary, Summary};
pub use tap::{AuditTap, AuditTapBuilder};
pub use types::{RemoteAddr, Request, Response};
pub use writer::{BufferedResponseWriter, Connection, Flusher, Hijacker, ResponseWriter};
