//! Configuration schema types.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize};

use crate::{parse_size, ConfigError};

/// Default HTTP method used by the HTTP sink.
pub const DEFAULT_METHOD: &str = "POST";

/// Default audit-type tag stamped on every request summary.
pub const DEFAULT_AUDIT_TYPE: &str = "RequestResponse";

/// Wire format a sink renders summaries into.
///
/// # Example
///
/// ```
/// use audittap_config::Format;
///
/// assert_eq!("HMRC".parse::<Format>().unwrap(), Format::Hmrc);
/// assert_eq!(Format::default(), Format::Internal);
/// ```
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Format {
    /// Direct JSON serialization of the summary (also `json`).
    #[default]
    Internal,
    /// The external HMRC audit schema.
    Hmrc,
    /// Human-readable two-line text record.
    Text,
}

/// Files and environment overrides accept the same names.
impl<'de> Deserialize<'de> for Format {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let name = String::deserialize(deserializer)?;
        name.parse().map_err(serde::de::Error::custom)
    }
}

impl FromStr for Format {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "" | "internal" | "json" => Ok(Self::Internal),
            "hmrc" => Ok(Self::Hmrc),
            "text" => Ok(Self::Text),
            other => Err(ConfigError::invalid(
                "format",
                format!("expected 'internal', 'hmrc' or 'text', got '{other}'"),
            )),
        }
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Internal => "internal",
            Self::Hmrc => "hmrc",
            Self::Text => "text",
        };
        f.write_str(name)
    }
}

/// Audit tap configuration.
///
/// Each configured destination gets its own sink when the tap is built:
/// `log_file` adds a file sink, `endpoint` with `topic` adds a queue sink,
/// and `endpoint` alone adds an HTTP sink. With neither, the tap audits into
/// a no-op sink.
///
/// # Example
///
/// ```
/// use audittap_config::{AuditTapConfig, Format};
///
/// let config: AuditTapConfig = toml::from_str(r#"
///     log_file = ">>/var/log/audit"
///     endpoint = "http://collector:8080/audit"
///     format = "hmrc"
/// "#).unwrap();
///
/// assert_eq!(config.format, Format::Hmrc);
/// assert_eq!(config.method, "POST");
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct AuditTapConfig {
    /// Reserved threshold for oversized bodies (e.g. `"1MB"`). Parsed and
    /// validated; no truncation is applied.
    #[serde(default)]
    pub size_threshold: Option<String>,

    /// Audit file path. A leading `>>` selects append mode.
    #[serde(default)]
    pub log_file: Option<String>,

    /// Explicit truncate override for the audit file.
    #[serde(default)]
    pub truncate: Option<bool>,

    /// HTTP endpoint URL, or the broker address when `topic` is set.
    #[serde(default)]
    pub endpoint: Option<String>,

    /// HTTP method for the HTTP sink.
    #[serde(default = "default_method")]
    pub method: String,

    /// Queue topic. Routes `endpoint` to the queue sink instead of HTTP.
    #[serde(default)]
    pub topic: Option<String>,

    /// Render format shared by the sinks built from this configuration.
    #[serde(default)]
    pub format: Format,

    /// Audit-type tag stamped on request summaries.
    #[serde(default = "default_audit_type")]
    pub audit_type: String,

    /// Request timeout for the HTTP sink, in milliseconds.
    #[serde(default = "default_http_timeout_ms")]
    pub http_timeout_ms: u64,

    /// Capacity of the queue producer's input channel.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
}

impl Default for AuditTapConfig {
    fn default() -> Self {
        Self {
            size_threshold: None,
            log_file: None,
            truncate: None,
            endpoint: None,
            method: default_method(),
            topic: None,
            format: Format::default(),
            audit_type: default_audit_type(),
            http_timeout_ms: default_http_timeout_ms(),
            queue_capacity: default_queue_capacity(),
        }
    }
}

fn default_method() -> String {
    DEFAULT_METHOD.to_string()
}

fn default_audit_type() -> String {
    DEFAULT_AUDIT_TYPE.to_string()
}

fn default_http_timeout_ms() -> u64 {
    10_000
}

fn default_queue_capacity() -> usize {
    256
}

impl AuditTapConfig {
    /// Create a new configuration builder.
    #[must_use]
    pub fn builder() -> AuditTapConfigBuilder {
        AuditTapConfigBuilder::new()
    }

    /// Returns the parsed size threshold, or `None` when unbounded.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` if the size string cannot be parsed.
    pub fn size_threshold_bytes(&self) -> Result<Option<u64>, ConfigError> {
        self.size_threshold.as_deref().map(parse_size).transpose()
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if:
    /// - `size_threshold` is not a valid size string
    /// - `endpoint` is not an absolute URL (HTTP sink only)
    /// - `method` is not a valid HTTP method token
    /// - `topic` is set without an `endpoint`
    /// - `queue_capacity` is zero
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.size_threshold_bytes()?;

        if !is_method_token(&self.method) {
            return Err(ConfigError::invalid(
                "method",
                format!("'{}' is not a valid HTTP method", self.method),
            ));
        }

        match (&self.endpoint, &self.topic) {
            (None, Some(_)) => {
                return Err(ConfigError::Conflict(
                    "topic requires an endpoint (the broker address)".into(),
                ));
            }
            (Some(endpoint), None) => {
                url::Url::parse(endpoint).map_err(|e| {
                    ConfigError::invalid("endpoint", format!("'{endpoint}': {e}"))
                })?;
            }
            (Some(endpoint), Some(_)) if endpoint.trim().is_empty() => {
                return Err(ConfigError::invalid("endpoint", "broker address is empty"));
            }
            _ => {}
        }

        if self.queue_capacity == 0 {
            return Err(ConfigError::invalid(
                "queue_capacity",
                "must be greater than zero",
            ));
        }

        Ok(())
    }
}

fn is_method_token(method: &str) -> bool {
    !method.is_empty()
        && method
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b"!#$%&'*+-.^_`|~".contains(&b))
}

/// Builder for [`AuditTapConfig`].
#[derive(Debug, Default)]
pub struct AuditTapConfigBuilder {
    config: AuditTapConfig,
}

impl AuditTapConfigBuilder {
    /// Create a new builder with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the reserved size threshold.
    #[must_use]
    pub fn size_threshold(mut self, size: impl Into<String>) -> Self {
        self.config.size_threshold = Some(size.into());
        self
    }

    /// Set the audit file path.
    #[must_use]
    pub fn log_file(mut self, path: impl Into<String>) -> Self {
        self.config.log_file = Some(path.into());
        self
    }

    /// Set the explicit truncate override.
    #[must_use]
    pub fn truncate(mut self, truncate: bool) -> Self {
        self.config.truncate = Some(truncate);
        self
    }

    /// Set the HTTP endpoint or broker address.
    #[must_use]
    pub fn endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.config.endpoint = Some(endpoint.into());
        self
    }

    /// Set the HTTP method.
    #[must_use]
    pub fn method(mut self, method: impl Into<String>) -> Self {
        self.config.method = method.into();
        self
    }

    /// Set the queue topic.
    #[must_use]
    pub fn topic(mut self, topic: impl Into<String>) -> Self {
        self.config.topic = Some(topic.into());
        self
    }

    /// Set the render format.
    #[must_use]
    pub fn format(mut self, format: Format) -> Self {
        self.config.format = format;
        self
    }

    /// Set the audit-type tag.
    #[must_use]
    pub fn audit_type(mut self, audit_type: impl Into<String>) -> Self {
        self.config.audit_type = audit_type.into();
        self
    }

    /// Build the configuration.
    #[must_use]
    pub fn build(self) -> AuditTapConfig {
        self.config
    }

    /// Build and validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if validation fails.
    pub fn build_validated(self) -> Result<AuditTapConfig, ConfigError> {
        let config = self.build();
        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AuditTapConfig::default();
        assert_eq!(config.method, "POST");
        assert_eq!(config.format, Format::Internal);
        assert_eq!(config.audit_type, DEFAULT_AUDIT_TYPE);
        assert!(config.log_file.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_default_threshold_is_unbounded() {
        let config = AuditTapConfig::default();
        assert_eq!(config.size_threshold_bytes().unwrap(), None);
    }

    #[test]
    fn test_size_threshold_parsed() {
        let config = AuditTapConfig::builder().size_threshold("1MB").build();
        assert_eq!(config.size_threshold_bytes().unwrap(), Some(1_000_000));
    }

    #[test]
    fn test_validate_bad_size() {
        let err = AuditTapConfig::builder()
            .size_threshold("lots")
            .build_validated()
            .unwrap_err();
        assert_eq!(err.field(), Some("size_threshold"));
    }

    #[test]
    fn test_validate_bad_endpoint() {
        let err = AuditTapConfig::builder()
            .endpoint("not a url")
            .build_validated()
            .unwrap_err();
        assert_eq!(err.field(), Some("endpoint"));
    }

    #[test]
    fn test_validate_broker_endpoint_not_a_url() {
        // Broker addresses are host:port, not URLs.
        let config = AuditTapConfig::builder()
            .endpoint("kafka-1:9092")
            .topic("audit")
            .build_validated();
        assert!(config.is_ok());
    }

    #[test]
    fn test_validate_topic_without_endpoint() {
        let err = AuditTapConfig::builder()
            .topic("audit")
            .build_validated()
            .unwrap_err();
        assert!(matches!(err, ConfigError::Conflict(_)));
    }

    #[test]
    fn test_validate_bad_method() {
        let err = AuditTapConfig::builder()
            .endpoint("http://localhost/audit")
            .method("PO ST")
            .build_validated()
            .unwrap_err();
        assert_eq!(err.field(), Some("method"));
    }

    #[test]
    fn test_format_names_agree_across_sources() {
        for name in ["json", "JSON", "internal", "Hmrc", "hMrC", "TEXT"] {
            let parsed: Format = name.parse().unwrap();
            let from_toml: AuditTapConfig = toml::from_str(&format!("format = \"{name}\"")).unwrap();
            let from_json: AuditTapConfig =
                serde_json::from_str(&format!("{{\"format\": \"{name}\"}}")).unwrap();
            assert_eq!(from_toml.format, parsed);
            assert_eq!(from_json.format, parsed);
        }
        assert!(toml::from_str::<AuditTapConfig>("format = \"xml\"").is_err());
    }

    #[test]
    fn test_format_parsing() {
        assert_eq!("hmrc".parse::<Format>().unwrap(), Format::Hmrc);
        assert_eq!("TEXT".parse::<Format>().unwrap(), Format::Text);
        assert_eq!("".parse::<Format>().unwrap(), Format::Internal);
        assert!("xml".parse::<Format>().is_err());
    }

    #[test]
    fn test_format_display_round_trips_through_serde_name() {
        let config: AuditTapConfig = toml::from_str(&format!("format = \"{}\"", Format::Text)).unwrap();
        assert_eq!(config.format, Format::Text);
    }

    #[test]
    fn test_toml_deserialization() {
        let config: AuditTapConfig = toml::from_str(
            r#"
            size_threshold = "1MB"
            log_file = "/tmp/audit"
            truncate = true
            endpoint = "http://collector/audit"
            method = "PUT"
            format = "HMRC"
            "#,
        )
        .unwrap();

        assert_eq!(config.size_threshold.as_deref(), Some("1MB"));
        assert_eq!(config.truncate, Some(true));
        assert_eq!(config.method, "PUT");
        assert_eq!(config.format, Format::Hmrc);
    }

    #[test]
    fn test_unknown_field_rejected() {
        let result: Result<AuditTapConfig, _> = toml::from_str("log_fil = \"/tmp/audit\"");
        assert!(result.is_err());
    }
}
