//! Error types for the audit tap.
//!
//! Audit errors never reach the client: the tap logs them and moves on to
//! the next sink. They are returned so that callers driving a sink directly
//! (and tests) can see what went wrong.

use audittap_config::ConfigError;
use thiserror::Error;

/// Result type alias for audit operations.
pub type AuditResult<T> = Result<T, AuditError>;

/// Errors raised while building sinks or delivering audit records.
#[derive(Error, Debug)]
pub enum AuditError {
    /// Invalid configuration detected at construction time.
    #[error("configuration error: {0}")]
    Config(String),

    /// A summary could not be rendered; the sink skipped this event.
    #[error("render error ({renderer}): {message}")]
    Render {
        /// Name of the renderer that failed.
        renderer: &'static str,
        /// Description of the failure.
        message: String,
    },

    /// The destination rejected or failed to accept the record.
    #[error("delivery failed: {0}")]
    Delivery(String),

    /// File I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP client failure (connect, timeout, body).
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The sink has already been closed.
    #[error("{0} sink is closed")]
    Closed(&'static str),

    /// The operation is not available in this build or on this writer.
    #[error("unsupported: {0}")]
    Unsupported(String),
}

impl AuditError {
    /// Creates a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Creates a render error.
    pub fn render(renderer: &'static str, message: impl Into<String>) -> Self {
        Self::Render {
            renderer,
            message: message.into(),
        }
    }

    /// Creates a delivery error.
    pub fn delivery(message: impl Into<String>) -> Self {
        Self::Delivery(message.into())
    }

    /// Creates an unsupported-operation error.
    pub fn unsupported(message: impl Into<String>) -> Self {
        Self::Unsupported(message.into())
    }

    /// Returns `true` if this error means the sink was already closed.
    pub fn is_closed(&self) -> bool {
        matches!(self, Self::Closed(_))
    }
}

impl From<ConfigError> for AuditError {
    fn from(err: ConfigError) -> Self {
        Self::Config(err.to_string())
    }
}

/// Errors raised by response-writer capabilities.
#[derive(Error, Debug)]
pub enum WriterError {
    /// The underlying writer does not offer the requested capability.
    #[error("the response writer does not support {0}")]
    Unsupported(&'static str),

    /// The capability was offered but failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
