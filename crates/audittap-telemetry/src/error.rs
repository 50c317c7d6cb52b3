//! Telemetry error types.

use std::net::AddrParseError;

use thiserror::Error;

/// Errors raised while installing the logging subscriber or metrics recorder.
#[derive(Debug, Error)]
pub enum TelemetryError {
    /// The subscriber could not be installed.
    #[error("logging setup failed: {0}")]
    Logging(String),

    /// The recorder or exporter could not be installed.
    #[error("metrics setup failed: {0}")]
    Metrics(String),

    /// The metrics listen address does not parse.
    #[error("invalid metrics listen address '{addr}': {source}")]
    InvalidAddress {
        /// The rejected address.
        addr: String,
        /// Parse failure.
        #[source]
        source: AddrParseError,
    },

    /// An unknown log format name.
    #[error("unknown log format '{0}' (expected json, pretty or compact)")]
    UnknownLogFormat(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = TelemetryError::Metrics("recorder already installed".into());
        assert_eq!(err.to_string(), "metrics setup failed: recorder already installed");

        let source = "nowhere".parse::<std::net::SocketAddr>().unwrap_err();
        let err = TelemetryError::InvalidAddress {
            addr: "nowhere".into(),
            source,
        };
        assert!(err.to_string().starts_with("invalid metrics listen address 'nowhere'"));
    }
}
