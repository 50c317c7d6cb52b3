//! Typed configuration for the audit tap.
//!
//! The configuration decides, once at construction, which sinks a tap owns
//! and which wire format they render. Sources are layered:
//! defaults → TOML/JSON file → `PREFIX__KEY` environment overrides.
//!
//! # Configuration File Format
//!
//! ```toml
//! size_threshold = "1MB"      # reserved, parsed but inert
//! log_file = ">>/var/log/audit"  # leading >> appends instead of truncating
//! truncate = false            # explicit override of the >> convention
//! endpoint = "http://collector:8080/audit"
//! method = "POST"
//! topic = "audit"             # routes endpoint to the queue sink
//! format = "hmrc"             # internal (default), hmrc, text
//! audit_type = "RequestResponse"
//! ```
//!
//! # Example
//!
//! ```
//! use audittap_config::{ConfigLoader, Format};
//!
//! let config = ConfigLoader::new()
//!     .with_string(r#"format = "text""#, "toml")
//!     .unwrap()
//!     .with_env_prefix("AUDITTAP")
//!     .load()
//!     .unwrap();
//!
//! assert_eq!(config.format, Format::Text);
//! ```

#![warn(missing_docs)]

mod error;
mod loader;
mod schema;
mod size;

pub use error::ConfigError;
pub use loader::ConfigLoader;
pub use schema::{AuditTapConfig, AuditTapConfigBuilder, Format, DEFAULT_AUDIT_TYPE, DEFAULT_METHOD};
pub use size::parse_size;
