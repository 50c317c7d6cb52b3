//! Configuration loader with layered approach.
//!
//! Layers are applied in order, later layers overriding earlier ones:
//! 1. Default values
//! 2. Configuration file or string (TOML or JSON)
//! 3. Environment variables (`PREFIX__KEY`)

use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::Path;

use crate::{AuditTapConfig, ConfigError, Format};

/// Configuration loader with layered approach.
///
/// # Example
///
/// ```no_run
/// use audittap_config::ConfigLoader;
///
/// # fn main() -> Result<(), audittap_config::ConfigError> {
/// let config = ConfigLoader::new()
///     .with_file("audittap.toml")?
///     .with_env_prefix("AUDITTAP")
///     .load()?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct ConfigLoader {
    config: AuditTapConfig,
    env_prefix: Option<String>,
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigLoader {
    /// Create a new configuration loader starting from defaults.
    #[must_use]
    pub fn new() -> Self {
        Self {
            config: AuditTapConfig::default(),
            env_prefix: None,
        }
    }

    /// Load configuration from a file.
    ///
    /// The format is determined by the file extension (`.toml` or `.json`).
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the file does not exist, cannot be read, or
    /// contains invalid or unknown fields.
    pub fn with_file<P: AsRef<Path>>(mut self, path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(ConfigError::missing(path));
        }

        let content = fs::read_to_string(path).map_err(|e| ConfigError::read(path, e))?;

        self.config = Self::parse_file(&content, path)?;
        Ok(self)
    }

    /// Load configuration from an optional file.
    ///
    /// Missing files are skipped; present files must parse.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the file exists but cannot be loaded.
    pub fn with_optional_file<P: AsRef<Path>>(self, path: P) -> Result<Self, ConfigError> {
        if path.as_ref().exists() {
            self.with_file(path)
        } else {
            Ok(self)
        }
    }

    /// Load configuration from a string in the given format (`toml` or `json`).
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if parsing fails or the format is unsupported.
    ///
    /// # Example
    ///
    /// ```
    /// use audittap_config::ConfigLoader;
    ///
    /// let config = ConfigLoader::new()
    ///     .with_string(r#"log_file = "/tmp/audit""#, "toml")
    ///     .unwrap()
    ///     .load()
    ///     .unwrap();
    ///
    /// assert_eq!(config.log_file.as_deref(), Some("/tmp/audit"));
    /// ```
    pub fn with_string(mut self, content: &str, format: &str) -> Result<Self, ConfigError> {
        self.config = match format.to_lowercase().as_str() {
            "toml" => toml::from_str(content)?,
            "json" => serde_json::from_str(content)?,
            _ => {
                return Err(ConfigError::UnsupportedFormat(format.to_string()))
            }
        };
        Ok(self)
    }

    /// Set environment variable prefix for overrides.
    ///
    /// With prefix `AUDITTAP`, `AUDITTAP__LOG_FILE=/var/log/audit` overrides
    /// `log_file`.
    #[must_use]
    pub fn with_env_prefix(mut self, prefix: &str) -> Self {
        self.env_prefix = Some(prefix.to_uppercase());
        self
    }

    /// Apply environment overrides, validate, and return the configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if an environment variable cannot be parsed or
    /// the final configuration is invalid.
    pub fn load(mut self) -> Result<AuditTapConfig, ConfigError> {
        if let Some(prefix) = self.env_prefix.take() {
            self.apply_env_overrides(&prefix)?;
        }

        self.config.validate()?;

        Ok(self.config)
    }

    fn parse_file(content: &str, path: &Path) -> Result<AuditTapConfig, ConfigError> {
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_lowercase);

        match extension.as_deref() {
            Some("toml") => Ok(toml::from_str(content)?),
            Some("json") => Ok(serde_json::from_str(content)?),
            _ => Err(ConfigError::UnsupportedFormat(path.display().to_string())),
        }
    }

    fn apply_env_overrides(&mut self, prefix: &str) -> Result<(), ConfigError> {
        let env_vars: HashMap<String, String> = env::vars()
            .filter(|(k, _)| k.starts_with(prefix))
            .collect();

        for (key, value) in env_vars {
            self.apply_env_var(&key, &value, prefix)?;
        }

        Ok(())
    }

    fn apply_env_var(&mut self, key: &str, value: &str, prefix: &str) -> Result<(), ConfigError> {
        let Some(field) = key.strip_prefix(prefix).and_then(|k| k.strip_prefix("__")) else {
            // Shares the prefix but not the separator, e.g. AUDITTAPX.
            return Ok(());
        };

        match field {
            "SIZE_THRESHOLD" => self.config.size_threshold = non_empty(value),
            "LOG_FILE" => self.config.log_file = non_empty(value),
            "TRUNCATE" => {
                self.config.truncate = Some(
                    parse_bool(value)
                        .ok_or_else(|| ConfigError::env(key, "expected boolean"))?,
                );
            }
            "ENDPOINT" => self.config.endpoint = non_empty(value),
            "METHOD" => self.config.method = value.to_uppercase(),
            "TOPIC" => self.config.topic = non_empty(value),
            "FORMAT" => {
                self.config.format = value
                    .parse::<Format>()
                    .map_err(|_| ConfigError::env(key, "expected 'internal', 'hmrc' or 'text'"))?;
            }
            "AUDIT_TYPE" => self.config.audit_type = value.to_string(),
            "HTTP_TIMEOUT_MS" => {
                self.config.http_timeout_ms = value
                    .parse()
                    .map_err(|_| ConfigError::env(key, "expected integer"))?;
            }
            "QUEUE_CAPACITY" => {
                self.config.queue_capacity = value
                    .parse()
                    .map_err(|_| ConfigError::env(key, "expected integer"))?;
            }
            _ => {}
        }

        Ok(())
    }
}

fn non_empty(value: &str) -> Option<String> {
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

fn parse_bool(s: &str) -> Option<bool> {
    match s.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}
