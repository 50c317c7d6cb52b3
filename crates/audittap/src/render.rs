//! Renderers: `Summary` → bytes.
//!
//! Each sink owns one renderer, picked when the sink is built.
//!
//! | Format | Renderer | Output |
//! |--------|----------|--------|
//! | `internal` | [`InternalRenderer`] | the `Summary` as JSON |
//! | `hmrc` | [`HmrcRenderer`] | the HMRC audit event schema |
//! | `text` | [`TextRenderer`] | a two-line human-readable record |

use std::fmt::{self, Write as _};
use std::net::SocketAddr;
use std::sync::Arc;

use audittap_config::Format;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::error::{AuditError, AuditResult};
use crate::headers::{FlatHeaders, HeaderEntry};
use crate::summary::Summary;

/// The outcome of rendering one summary: the payload, or why it failed.
#[derive(Debug)]
pub struct Encoded {
    bytes: Bytes,
    error: Option<AuditError>,
}

impl Encoded {
    /// A successful rendering.
    pub fn ok(bytes: impl Into<Bytes>) -> Self {
        Self {
            bytes: bytes.into(),
            error: None,
        }
    }

    /// A failed rendering.
    pub fn failed(error: AuditError) -> Self {
        Self {
            bytes: Bytes::new(),
            error: Some(error),
        }
    }

    /// Payload length in bytes.
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Returns `true` if the payload is empty.
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// The rendering error, if any.
    pub fn error(&self) -> Option<&AuditError> {
        self.error.as_ref()
    }

    /// Returns the payload, or the rendering error.
    pub fn encode(self) -> AuditResult<Bytes> {
        match self.error {
            Some(err) => Err(err),
            None => Ok(self.bytes),
        }
    }
}

/// Serializes a [`Summary`] into an external representation.
pub trait Renderer: Send + Sync {
    /// Short name used in logs and metric labels.
    fn name(&self) -> &'static str;

    /// Renders one summary.
    fn render(&self, summary: &Summary) -> Encoded;

    /// Whether rendered payloads are JSON documents.
    fn is_json(&self) -> bool {
        true
    }
}

impl fmt::Debug for dyn Renderer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Returns the renderer for a configured format.
pub fn renderer_for(format: Format) -> Arc<dyn Renderer> {
    match format {
        Format::Internal => Arc::new(InternalRenderer),
        Format::Hmrc => Arc::new(HmrcRenderer),
        Format::Text => Arc::new(TextRenderer),
    }
}

fn to_json<T: Serialize>(renderer: &'static str, value: &T) -> Encoded {
    match serde_json::to_vec(value) {
        Ok(bytes) => Encoded::ok(bytes),
        Err(e) => Encoded::failed(AuditError::render(renderer, e.to_string())),
    }
}

// =============================================================================
// Internal
// =============================================================================

/// Direct JSON serialization of the summary.
#[derive(Debug, Clone, Copy, Default)]
pub struct InternalRenderer;

impl Renderer for InternalRenderer {
    fn name(&self) -> &'static str {
        "internal"
    }

    fn render(&self, summary: &Summary) -> Encoded {
        to_json(self.name(), summary)
    }
}

// =============================================================================
// HMRC
// =============================================================================

const DASH: &str = "-";

/// Renders the HMRC audit event schema.
///
/// Tag and detail fields are looked up in the normalized request headers;
/// anything missing becomes `"-"`. Each event gets a fresh time-ordered UUID.
#[derive(Debug, Clone, Copy, Default)]
pub struct HmrcRenderer;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct HmrcEvent<'a> {
    audit_source: &'a str,
    audit_type: &'a str,
    event_id: String,
    tags: HmrcTags<'a>,
    detail: HmrcDetail<'a>,
    generated_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
struct HmrcTags<'a> {
    #[serde(rename = "clientIP")]
    client_ip: String,
    #[serde(rename = "clientPort")]
    client_port: String,
    path: &'a str,
    #[serde(rename = "sessionID")]
    session_id: &'a str,
    #[serde(rename = "requestID")]
    request_id: &'a str,
    #[serde(rename = "Akamai-Reputation")]
    akamai_reputation: &'a str,
    #[serde(rename = "transactionName")]
    transaction_name: &'a str,
}

#[derive(Debug, Serialize)]
struct HmrcDetail<'a> {
    method: &'a str,
    host: &'a str,
    port: String,
    input: &'a str,
    token: &'a str,
    #[serde(rename = "ipAddress")]
    ip_address: &'a str,
    #[serde(rename = "deviceID")]
    device_id: &'a str,
    #[serde(rename = "deviceFingerprint")]
    device_fingerprint: &'a str,
    #[serde(rename = "userAgentString")]
    user_agent_string: &'a str,
    #[serde(rename = "queryString")]
    query_string: &'a str,
    #[serde(rename = "requestBody")]
    request_body: &'a str,
    referrer: &'a str,
    #[serde(rename = "statusCode")]
    status_code: String,
    #[serde(rename = "responseMessage")]
    response_message: &'a str,
    #[serde(rename = "Authorization")]
    authorization: &'a str,
}

fn or_dash(value: &str) -> &str {
    if value.is_empty() {
        DASH
    } else {
        value
    }
}

/// First non-empty scalar value among `keys`, else `"-"`.
fn header_or_dash<'a>(headers: &'a FlatHeaders, keys: &[&str]) -> &'a str {
    keys.iter()
        .filter_map(|k| headers.get(*k).and_then(HeaderEntry::first))
        .find(|v| !v.is_empty())
        .unwrap_or(DASH)
}

/// Port from `host:port`, ignoring IPv6 brackets.
fn host_port(host: &str) -> Option<&str> {
    let (_, port) = host.rsplit_once(':')?;
    (!port.is_empty() && port.bytes().all(|b| b.is_ascii_digit())).then_some(port)
}

impl HmrcRenderer {
    fn event<'a>(summary: &'a Summary) -> HmrcEvent<'a> {
        let request = &summary.request;
        let headers = &request.header;
        let peer: Option<SocketAddr> = request.remote_addr.parse().ok();

        let client_ip = match header_or_dash(headers, &["trueClientIp", "xForwardedFor"]) {
            DASH => peer.map_or_else(|| DASH.to_string(), |p| p.ip().to_string()),
            ip => ip.to_string(),
        };
        let client_port = peer.map_or_else(|| DASH.to_string(), |p| p.port().to_string());

        let status_code = match summary.response.status {
            0 => DASH.to_string(),
            status => status.to_string(),
        };

        HmrcEvent {
            audit_source: &request.source,
            audit_type: &request.audit_type,
            event_id: Uuid::now_v7().to_string(),
            tags: HmrcTags {
                client_ip,
                client_port,
                path: or_dash(&request.path),
                session_id: header_or_dash(headers, &["sessionId"]),
                request_id: header_or_dash(headers, &["requestId", "xRequestId"]),
                akamai_reputation: header_or_dash(headers, &["akamaiReputation"]),
                transaction_name: DASH,
            },
            detail: HmrcDetail {
                method: or_dash(&request.method),
                host: or_dash(&request.host),
                port: host_port(&request.host).unwrap_or(DASH).to_string(),
                input: or_dash(&request.path),
                token: DASH,
                ip_address: DASH,
                device_id: header_or_dash(headers, &["deviceId"]),
                device_fingerprint: DASH,
                user_agent_string: header_or_dash(headers, &["userAgent"]),
                query_string: or_dash(&request.query),
                request_body: DASH,
                // The downstream schema says "referrer"; the header is "Referer".
                referrer: header_or_dash(headers, &["referer"]),
                status_code,
                response_message: DASH,
                authorization: DASH,
            },
            generated_at: summary.response.completed_at,
        }
    }
}

impl Renderer for HmrcRenderer {
    fn name(&self) -> &'static str {
        "hmrc"
    }

    fn render(&self, summary: &Summary) -> Encoded {
        to_json(self.name(), &Self::event(summary))
    }
}

// =============================================================================
// Text
// =============================================================================

/// A two-line human-readable record:
///
/// ```text
/// 2001-09-09T01:46:40    GET /a/b/c 404 19
///                     {"requestId":"R123"}
///                     {"contentType":"text/plain"}
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct TextRenderer;

const INDENT: &str = "                   ";

impl Renderer for TextRenderer {
    fn name(&self) -> &'static str {
        "text"
    }

    fn is_json(&self) -> bool {
        false
    }

    fn render(&self, summary: &Summary) -> Encoded {
        let request = &summary.request;
        let response = &summary.response;

        let headers = serde_json::to_string(&request.header)
            .and_then(|req| serde_json::to_string(&response.header).map(|resp| (req, resp)));
        let (request_headers, response_headers) = match headers {
            Ok(pair) => pair,
            Err(e) => return Encoded::failed(AuditError::render(self.name(), e.to_string())),
        };

        let mut out = String::new();
        // Writing to a String cannot fail.
        let _ = writeln!(
            out,
            "{} {:>6} {} {} {}",
            response.completed_at.format("%Y-%m-%dT%H:%M:%S"),
            request.method,
            request.path,
            response.status,
            response.size
        );
        let _ = writeln!(out, "{INDENT} {request_headers}");
        let _ = writeln!(out, "{INDENT} {response_headers}");

        Encoded::ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::summary::{RequestSummary, ResponseSummary};
    use chrono::TimeZone;
    use serde_json::Value;

    fn summary() -> Summary {
        let at = Utc.with_ymd_and_hms(2001, 9, 9, 1, 46, 40).unwrap();
        let mut header = FlatHeaders::new();
        header.insert("requestId".into(), "R123".into());
        header.insert("sessionId".into(), "S123".into());
        header.insert("referer".into(), "https://www.gov.uk/".into());
        header.insert("userAgent".into(), "curl/8.0".into());

        let mut response_header = FlatHeaders::new();
        response_header.insert("contentType".into(), "text/plain".into());

        Summary::new(
            RequestSummary {
                source: "pay-frontend".into(),
                audit_type: "RequestResponse".into(),
                host: "example.co.uk".into(),
                method: "GET".into(),
                path: "/a/b/c".into(),
                query: "d=1&e=2".into(),
                remote_addr: "101.102.103.104:1234".into(),
                header,
                began_at: at,
            },
            ResponseSummary {
                source: "pay-frontend".into(),
                audit_type: "RequestResponse".into(),
                status: 404,
                header: response_header,
                size: 19,
                completed_at: at,
            },
        )
    }

    fn json(encoded: Encoded) -> Value {
        serde_json::from_slice(&encoded.encode().unwrap()).unwrap()
    }

    // =========================================================================
    // Internal Renderer Tests
    // =========================================================================

    #[test]
    fn test_internal_renders_summary() {
        let value = json(InternalRenderer.render(&summary()));
        assert_eq!(value["request"]["path"], "/a/b/c");
        assert_eq!(value["response"]["size"], 19);
        assert_eq!(value["request"]["auditSource"], "pay-frontend");
    }

    #[test]
    fn test_internal_is_deterministic() {
        let summary = summary();
        let a = InternalRenderer.render(&summary).encode().unwrap();
        let b = InternalRenderer.render(&summary).encode().unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_encoded_len_matches_payload() {
        let encoded = InternalRenderer.render(&summary());
        let len = encoded.len();
        assert!(encoded.error().is_none());
        assert_eq!(encoded.encode().unwrap().len(), len);
    }

    #[test]
    fn test_encoded_failed_returns_error() {
        let encoded = Encoded::failed(AuditError::render("test", "boom"));
        assert!(encoded.is_empty());
        assert!(matches!(encoded.encode(), Err(AuditError::Render { .. })));
    }

    // =========================================================================
    // HMRC Renderer Tests
    // =========================================================================

    #[test]
    fn test_hmrc_top_level_fields() {
        let value = json(HmrcRenderer.render(&summary()));
        assert_eq!(value["auditSource"], "pay-frontend");
        assert_eq!(value["auditType"], "RequestResponse");
        assert_eq!(value["generatedAt"], "2001-09-09T01:46:40Z");
        assert!(Uuid::parse_str(value["eventId"].as_str().unwrap()).is_ok());
    }

    #[test]
    fn test_hmrc_tags() {
        let value = json(HmrcRenderer.render(&summary()));
        let tags = &value["tags"];
        assert_eq!(tags["clientIP"], "101.102.103.104");
        assert_eq!(tags["clientPort"], "1234");
        assert_eq!(tags["path"], "/a/b/c");
        assert_eq!(tags["sessionID"], "S123");
        assert_eq!(tags["requestID"], "R123");
        assert_eq!(tags["Akamai-Reputation"], "-");
        assert_eq!(tags["transactionName"], "-");
    }

    #[test]
    fn test_hmrc_detail() {
        let value = json(HmrcRenderer.render(&summary()));
        let detail = &value["detail"];
        assert_eq!(detail["method"], "GET");
        assert_eq!(detail["host"], "example.co.uk");
        assert_eq!(detail["port"], "-");
        assert_eq!(detail["input"], "/a/b/c");
        assert_eq!(detail["queryString"], "d=1&e=2");
        assert_eq!(detail["userAgentString"], "curl/8.0");
        assert_eq!(detail["referrer"], "https://www.gov.uk/");
        assert_eq!(detail["statusCode"], "404");
        assert_eq!(detail["Authorization"], "-");
        assert_eq!(detail["token"], "-");
    }

    #[test]
    fn test_hmrc_missing_fields_default_to_dash() {
        let mut summary = summary();
        summary.request.header.clear();
        summary.request.remote_addr.clear();
        summary.request.query.clear();
        summary.response.status = 0;

        let value = json(HmrcRenderer.render(&summary));
        assert_eq!(value["tags"]["clientIP"], "-");
        assert_eq!(value["tags"]["clientPort"], "-");
        assert_eq!(value["tags"]["requestID"], "-");
        assert_eq!(value["detail"]["referrer"], "-");
        assert_eq!(value["detail"]["queryString"], "-");
        assert_eq!(value["detail"]["statusCode"], "-");
    }

    #[test]
    fn test_hmrc_prefers_true_client_ip_header() {
        let mut summary = summary();
        summary
            .request
            .header
            .insert("trueClientIp".into(), "8.8.8.8".into());
        summary.request.host = "example.co.uk:8443".into();

        let value = json(HmrcRenderer.render(&summary));
        assert_eq!(value["tags"]["clientIP"], "8.8.8.8");
        assert_eq!(value["detail"]["port"], "8443");
    }

    #[test]
    fn test_hmrc_event_ids_are_unique() {
        let summary = summary();
        let a = json(HmrcRenderer.render(&summary));
        let b = json(HmrcRenderer.render(&summary));
        assert_ne!(a["eventId"], b["eventId"]);
    }

    #[test]
    fn test_host_port() {
        assert_eq!(host_port("example.co.uk:8080"), Some("8080"));
        assert_eq!(host_port("[::1]:443"), Some("443"));
        assert_eq!(host_port("example.co.uk"), None);
        assert_eq!(host_port("[::1]"), None);
    }

    // =========================================================================
    // Text Renderer Tests
    // =========================================================================

    #[test]
    fn test_text_renderer_layout() {
        let bytes = TextRenderer.render(&summary()).encode().unwrap();
        let text = std::str::from_utf8(&bytes).unwrap();
        let lines: Vec<&str> = text.lines().collect();

        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], "2001-09-09T01:46:40    GET /a/b/c 404 19");
        assert!(lines[1].starts_with(INDENT));
        assert!(lines[1].contains(r#""requestId":"R123""#));
        assert!(lines[2].contains(r#""contentType":"text/plain""#));
    }

    #[test]
    fn test_renderer_for_format() {
        assert_eq!(renderer_for(Format::Internal).name(), "internal");
        assert_eq!(renderer_for(Format::Hmrc).name(), "hmrc");
        assert_eq!(renderer_for(Format::Text).name(), "text");
    }
}
