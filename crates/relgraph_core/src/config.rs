//! Store configuration.
//!
//! # Responsibility
//! - Decode store settings from JSON with defaults for every field.
//! - Route logging settings into `init_logging`.
//!
//! # Invariants
//! - A parsed config always carries a normalized log level.

use crate::logging::{self, default_log_level};
use serde::Deserialize;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::PathBuf;

pub type ConfigResult<T> = Result<T, ConfigError>;

/// Configuration decoding/validation error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// Document is not valid JSON or has the wrong shape.
    InvalidDocument(String),
    /// A field has an unsupported value.
    InvalidValue { field: &'static str, message: String },
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidDocument(message) => write!(f, "invalid config document: {message}"),
            Self::InvalidValue { field, message } => {
                write!(f, "invalid config value for `{field}`: {message}")
            }
        }
    }
}

impl Error for ConfigError {}

/// Store-wide settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StoreConfig {
    pub log_level: String,
    /// `None` logs to stderr.
    pub log_dir: Option<PathBuf>,
    /// Async-ness of relationships that do not declare it.
    pub default_async: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level().to_string(),
            log_dir: None,
            default_async: true,
        }
    }
}

impl StoreConfig {
    /// Parses and validates a JSON config document.
    ///
    /// # Errors
    /// - `InvalidDocument` for malformed JSON or unknown keys.
    /// - `InvalidValue` for an unsupported log level or relative log dir.
    pub fn from_json_str(json: &str) -> ConfigResult<Self> {
        let mut config: Self =
            serde_json::from_str(json).map_err(|err| ConfigError::InvalidDocument(err.to_string()))?;
        config.log_level = logging::normalize_level(&config.log_level)
            .map_err(|message| ConfigError::InvalidValue {
                field: "log_level",
                message,
            })?
            .to_string();
        if let Some(dir) = &config.log_dir {
            logging::normalize_log_dir(dir).map_err(|message| ConfigError::InvalidValue {
                field: "log_dir",
                message,
            })?;
        }
        Ok(config)
    }

    /// Initializes process logging from this config.
    pub fn init_logging(&self) -> Result<(), String> {
        logging::init_logging(&self.log_level, self.log_dir.as_deref())
    }
}

#[cfg(test)]
mod tests {
    use super::{ConfigError, StoreConfig};
    use crate::logging::default_log_level;

    #[test]
    fn empty_document_uses_defaults() {
        let config = StoreConfig::from_json_str("{}").expect("empty config should parse");
        assert_eq!(config, StoreConfig::default());
        assert_eq!(config.log_level, default_log_level());
        assert!(config.default_async);
    }

    #[test]
    fn level_is_normalized() {
        let config = StoreConfig::from_json_str(r#"{"log_level": " WARNING ", "default_async": false}"#)
            .expect("config should parse");
        assert_eq!(config.log_level, "warn");
        assert!(!config.default_async);
    }

    #[test]
    fn rejects_bad_values_and_unknown_keys() {
        let err = StoreConfig::from_json_str(r#"{"log_level": "loud"}"#).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { field: "log_level", .. }));

        let err = StoreConfig::from_json_str(r#"{"log_dir": "relative/logs"}"#).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { field: "log_dir", .. }));

        let err = StoreConfig::from_json_str(r#"{"verbose": true}"#).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidDocument(_)));
    }
}
