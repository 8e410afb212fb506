//! Server configuration loaded from the add-on options file.

use crate::error::{GatewayError, Result};
use crate::request::coerce_timeout;
use serde_json::Value;
use std::fs;
use std::path::Path;
use tracing::debug;

/// Default location of the options file.
pub const DEFAULT_CONFIG_PATH: &str = "/data/options.json";

/// Default per-request timeout in seconds.
pub const DEFAULT_TIMEOUT_SECS: i64 = 300;

/// Options recognized by the gateway. Unknown keys in the file are ignored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    /// When false, `serve` exits without binding.
    pub api_enabled: bool,

    /// Timeout applied when a request does not carry its own. Clamped per
    /// request, so out-of-range values are kept as written.
    pub api_timeout_secs: i64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            api_enabled: true,
            api_timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }
}

impl ServerConfig {
    /// Read and parse the options file.
    ///
    /// Only an unreadable file or a document that is not a JSON object fails.
    /// Each recognized key is read on its own and falls back to its default
    /// when it has the wrong type.
    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path).map_err(|source| GatewayError::ConfigRead {
            path: path.to_path_buf(),
            source,
        })?;
        let parse_err = |source| GatewayError::ConfigParse {
            path: path.to_path_buf(),
            source,
        };
        let value: Value = serde_json::from_str(&raw).map_err(parse_err)?;
        let Value::Object(options) = value else {
            return Err(parse_err(serde::de::Error::custom("expected a JSON object")));
        };

        let mut config = Self::default();
        match options.get("api_enabled") {
            None => {}
            Some(Value::Bool(enabled)) => config.api_enabled = *enabled,
            Some(other) => debug!(value = %other, "Ignoring non-boolean api_enabled"),
        }
        if let Some(raw) = options.get("api_timeout") {
            match coerce_timeout(raw) {
                Some(secs) => config.api_timeout_secs = secs,
                None => debug!(value = %raw, "Ignoring non-numeric api_timeout"),
            }
        }
        Ok(config)
    }

    /// Load the options file, falling back to defaults when it is missing,
    /// unreadable or malformed.
    pub fn load_or_default(path: &Path) -> Self {
        match Self::from_file(path) {
            Ok(config) => config,
            Err(e) => {
                debug!(error = %e, "Using default configuration");
                Self::default()
            }
        }
    }
}
