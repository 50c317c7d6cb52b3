use std::sync::Arc;
use std::time::Duration;

use reqwest::header::{CONTENT_LENGTH, CONTENT_TYPE};
use reqwest::{Client, Method};
use tracing::debug;
use url::Url;

use super::{encode, AuditSink};
use crate::error::{AuditError, AuditResult};
use crate::handler::BoxFuture;
use crate::render::Renderer;
use crate::summary::Summary;

/// Default request timeout for audit deliveries.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Sends each summary as the body of one HTTP request.
///
/// No retries: a network error or non-2xx status is returned to the caller.
#[derive(Debug)]
pub struct HttpAuditSink {
    client: Client,
    method: Method,
    endpoint: Url,
    renderer: Arc<dyn Renderer>,
}

impl HttpAuditSink {
    /// Creates a sink that sends to `endpoint` with `method` (empty means
    /// `POST`).
    ///
    /// # Errors
    ///
    /// Returns `AuditError::Config` if the endpoint is not an absolute
    /// `http`/`https` URL or the method is not a valid token.
    pub fn new(
        method: &str,
        endpoint: &str,
        timeout: Duration,
        renderer: Arc<dyn Renderer>,
    ) -> AuditResult<Self> {
        let endpoint = Url::parse(endpoint)
            .map_err(|e| AuditError::config(format!("cannot access endpoint '{endpoint}': {e}")))?;
        if !matches!(endpoint.scheme(), "http" | "https") {
            return Err(AuditError::config(format!(
                "endpoint '{endpoint}' must use http or https"
            )));
        }

        let method = if method.is_empty() {
            Method::POST
        } else {
            Method::from_bytes(method.to_ascii_uppercase().as_bytes())
                .map_err(|_| AuditError::config(format!("invalid HTTP method '{method}'")))?
        };

        let client = Client::builder().timeout(timeout).build()?;

        debug!(%endpoint, %method, renderer = renderer.name(), "HTTP audit sink ready");

        Ok(Self {
            client,
            method,
            endpoint,
            renderer,
        })
    }

    /// The destination URL.
    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    /// The HTTP method used for deliveries.
    pub fn method(&self) -> &Method {
        &self.method
    }

    fn content_type(&self) -> &'static str {
        if self.renderer.is_json() {
            "application/json"
        } else {
            "text/plain; charset=utf-8"
        }
    }
}

impl AuditSink for HttpAuditSink {
    fn name(&self) -> &'static str {
        "http"
    }

    fn audit<'a>(&'a self, summary: &'a Summary) -> BoxFuture<'a, AuditResult<()>> {
        Box::pin(async move {
            let body = encode(self.name(), self.renderer.as_ref(), summary)?;

            let response = self
                .client
                .request(self.method.clone(), self.endpoint.clone())
                .header(CONTENT_TYPE, self.content_type())
                .header(CONTENT_LENGTH, body.len())
                .body(body)
                .send()
                .await?;

            let status = response.status();
            // Drain the body so the connection can be reused.
            response.bytes().await?;

            if !status.is_success() {
                return Err(AuditError::delivery(format!(
                    "{} {} returned {status}",
                    self.method, self.endpoint
                )));
            }
            Ok(())
        })
    }
}
