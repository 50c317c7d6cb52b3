//! The downstream handler invoked by the tap.

use std::future::Future;
use std::pin::Pin;

use crate::types::Request;
use crate::writer::ResponseWriter;

/// A boxed, sendable future.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

type HandlerFn<'a> =
    Box<dyn for<'w> FnOnce(&'w mut dyn ResponseWriter, Request) -> BoxFuture<'w, ()> + Send + 'a>;

/// Callback to invoke the handler behind the tap.
///
/// The handler receives the instrumented writer and the request, and writes
/// its response through the writer. `Next` is consumed by [`Next::run`], so
/// the handler runs at most once per request.
///
/// # Example
///
/// ```
/// use audittap::Next;
/// use http::StatusCode;
///
/// let next = Next::handler(|writer, _request| {
///     Box::pin(async move {
///         writer.write_header(StatusCode::NO_CONTENT);
///     })
/// });
/// # drop(next);
/// ```
pub struct Next<'a> {
    handler: HandlerFn<'a>,
}

impl<'a> Next<'a> {
    /// Wraps a handler function.
    pub fn handler<F>(f: F) -> Self
    where
        F: for<'w> FnOnce(&'w mut dyn ResponseWriter, Request) -> BoxFuture<'w, ()> + Send + 'a,
    {
        Self {
            handler: Box::new(f),
        }
    }

    /// Runs the handler against `writer`.
    pub async fn run(self, writer: &mut dyn ResponseWriter, request: Request) {
        (self.handler)(writer, request).await;
    }
}

impl std::fmt::Debug for Next<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Next").finish_non_exhaustive()
    }
}
