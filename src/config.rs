//! Host configuration.
//!
//! [`HostConfig`] can be built in code or deserialized from JSON with
//! camelCase keys; every key is optional:
//!
//! ```
//! use jsonrpc_host::config::HostConfig;
//! use std::time::Duration;
//!
//! let config = HostConfig::from_json(r#"{"shutdownTimeoutSeconds": 5, "encoding": "utf-16le"}"#).unwrap();
//! assert_eq!(config.shutdown_timeout, Duration::from_secs(5));
//! assert_eq!(config.max_concurrent_handlers, 256);
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::codec::TextEncoding;
use crate::error::{HostError, Result};
use crate::protocol::DEFAULT_MAX_CONTENT_LENGTH;

/// Default bound on the shutdown wait.
pub const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(120);

/// Default maximum concurrent parallel handlers.
pub const DEFAULT_MAX_CONCURRENT_HANDLERS: usize = 256;

/// Configuration for a service host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct HostConfig {
    /// String answered by the built-in `version` method.
    pub protocol_version: String,
    /// Upper bound on waiting for shutdown tasks.
    #[serde(rename = "shutdownTimeoutSeconds", with = "duration_secs")]
    pub shutdown_timeout: Duration,
    /// Parallel handlers allowed to run at once.
    pub max_concurrent_handlers: usize,
    /// Largest accepted `Content-Length`.
    pub max_content_length: usize,
    /// Content text encoding, both directions.
    pub encoding: TextEncoding,
    /// Object returned by `initialize`.
    pub capabilities: Value,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            protocol_version: env!("CARGO_PKG_VERSION").to_string(),
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
            max_concurrent_handlers: DEFAULT_MAX_CONCURRENT_HANDLERS,
            max_content_length: DEFAULT_MAX_CONTENT_LENGTH,
            encoding: TextEncoding::default(),
            capabilities: Value::Object(Default::default()),
        }
    }
}

impl HostConfig {
    /// Parse and validate a JSON configuration.
    ///
    /// # Errors
    ///
    /// Returns [`HostError::Config`] if the JSON is malformed or invalid.
    pub fn from_json(text: &str) -> Result<Self> {
        let config: Self =
            serde_json::from_str(text).map_err(|e| HostError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Check value ranges.
    ///
    /// # Errors
    ///
    /// Returns [`HostError::Config`] naming the first invalid field.
    pub fn validate(&self) -> Result<()> {
        if self.protocol_version.is_empty() {
            return Err(HostError::Config("protocolVersion must not be empty".into()));
        }
        if self.max_concurrent_handlers == 0 {
            return Err(HostError::Config(
                "maxConcurrentHandlers must be at least 1".into(),
            ));
        }
        if self.max_content_length == 0 {
            return Err(HostError::Config("maxContentLength must be at least 1".into()));
        }
        if !self.capabilities.is_object() {
            return Err(HostError::Config("capabilities must be a JSON object".into()));
        }
        Ok(())
    }
}

/// Durations as (fractional) seconds.
mod duration_secs {
    use std::time::Duration;

    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(value.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(de::Error::custom)
    }
}
