//! The audit record data model.
//!
//! One [`Summary`] is produced per request: the [`RequestSummary`] is built
//! when the request enters the tap, the [`ResponseSummary`] after the
//! downstream handler returns.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::headers::FlatHeaders;

/// What the tap saw of the inbound request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestSummary {
    /// Backend the request was routed to.
    #[serde(rename = "auditSource", default, skip_serializing_if = "String::is_empty")]
    pub source: String,
    /// Audit-type tag.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub audit_type: String,
    /// Target host, promoted out of the header map.
    pub host: String,
    /// HTTP method.
    pub method: String,
    /// URL path.
    pub path: String,
    /// Raw query string, without the leading `?`.
    pub query: String,
    /// Peer address as `ip:port`, empty when unknown.
    pub remote_addr: String,
    /// Normalized request headers.
    pub header: FlatHeaders,
    /// When the request entered the tap.
    pub began_at: DateTime<Utc>,
}

/// What the tap saw of the outbound response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseSummary {
    /// Mirrors [`RequestSummary::source`].
    #[serde(rename = "auditSource", default, skip_serializing_if = "String::is_empty")]
    pub source: String,
    /// Mirrors [`RequestSummary::audit_type`].
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub audit_type: String,
    /// Status code; 0 if the handler never set one.
    pub status: u16,
    /// Normalized response headers.
    pub header: FlatHeaders,
    /// Body bytes accepted by the underlying writer.
    pub size: u64,
    /// When the handler returned.
    pub completed_at: DateTime<Utc>,
}

/// A request paired with its response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Summary {
    /// The request half.
    pub request: RequestSummary,
    /// The response half.
    pub response: ResponseSummary,
}

impl Summary {
    /// Pairs a request with its response.
    pub fn new(request: RequestSummary, response: ResponseSummary) -> Self {
        Self { request, response }
    }
}
