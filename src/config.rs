/// Bridge configuration
///
/// Loaded from JSON (file or string) with per-field defaults, then optionally
/// overridden from `SWAP_BRIDGE_*` environment variables.

use crate::error::{BridgeError, Result};
use crate::network::codec::DEFAULT_MAX_FRAME_LEN;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info, warn};

pub const ENV_REQUEST_TIMEOUT_MS: &str = "SWAP_BRIDGE_REQUEST_TIMEOUT_MS";
pub const ENV_CONNECT_TIMEOUT_MS: &str = "SWAP_BRIDGE_CONNECT_TIMEOUT_MS";
pub const ENV_MAX_FRAME_LEN: &str = "SWAP_BRIDGE_MAX_FRAME_LEN";
pub const ENV_EVENT_BUFFER_SIZE: &str = "SWAP_BRIDGE_EVENT_BUFFER_SIZE";

/// Runtime settings for a bridge and its transport
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BridgeConfig {
    /// Milliseconds to wait for a command response
    #[serde(default = "default_timeout_ms")]
    pub request_timeout_ms: u64,

    /// Milliseconds to wait for the transport to connect
    #[serde(default = "default_timeout_ms")]
    pub connect_timeout_ms: u64,

    /// Largest accepted frame in bytes
    #[serde(default = "default_max_frame_len")]
    pub max_frame_len: usize,

    /// Pushed events buffered per async subscriber
    #[serde(default = "default_event_buffer_size")]
    pub event_buffer_size: usize,
}

fn default_timeout_ms() -> u64 {
    30_000
}

fn default_max_frame_len() -> usize {
    DEFAULT_MAX_FRAME_LEN
}

fn default_event_buffer_size() -> usize {
    100
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            request_timeout_ms: default_timeout_ms(),
            connect_timeout_ms: default_timeout_ms(),
            max_frame_len: default_max_frame_len(),
            event_buffer_size: default_event_buffer_size(),
        }
    }
}

impl BridgeConfig {
    pub fn request_timeout(mut self, duration: Duration) -> Self {
        self.request_timeout_ms = duration_to_ms(duration);
        self
    }

    pub fn connect_timeout(mut self, duration: Duration) -> Self {
        self.connect_timeout_ms = duration_to_ms(duration);
        self
    }

    pub fn max_frame_len(mut self, len: usize) -> Self {
        self.max_frame_len = len;
        self
    }

    pub fn event_buffer_size(mut self, size: usize) -> Self {
        self.event_buffer_size = size;
        self
    }

    pub fn request_timeout_duration(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn connect_timeout_duration(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    /// Parse from a JSON document; missing fields take their defaults
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a JSON file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        info!("Loading bridge config from {}", path.display());

        let content = std::fs::read_to_string(path)?;
        Self::from_json_str(&content)
    }

    /// Apply overrides from the process environment
    pub fn apply_env(self) -> Result<Self> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary key lookup
    pub fn apply_overrides<F>(mut self, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup(ENV_REQUEST_TIMEOUT_MS) {
            self.request_timeout_ms = parse_field(ENV_REQUEST_TIMEOUT_MS, &v)?;
        }
        if let Some(v) = lookup(ENV_CONNECT_TIMEOUT_MS) {
            self.connect_timeout_ms = parse_field(ENV_CONNECT_TIMEOUT_MS, &v)?;
        }
        if let Some(v) = lookup(ENV_MAX_FRAME_LEN) {
            self.max_frame_len = parse_field(ENV_MAX_FRAME_LEN, &v)?;
        }
        if let Some(v) = lookup(ENV_EVENT_BUFFER_SIZE) {
            self.event_buffer_size = parse_field(ENV_EVENT_BUFFER_SIZE, &v)?;
        }

        self.validate()?;
        debug!("Effective bridge config: {:?}", self);
        Ok(self)
    }

    /// Validate configuration
    ///
    /// # Errors
    /// Returns the first validation error encountered.
    pub fn validate(&self) -> Result<()> {
        if self.request_timeout_ms == 0 {
            warn!("Validation failed: zero request timeout");
            return Err(BridgeError::ValidationError {
                field: "request_timeout_ms".to_string(),
                reason: "Request timeout must be at least one millisecond".to_string(),
            });
        }

        if self.connect_timeout_ms == 0 {
            return Err(BridgeError::ValidationError {
                field: "connect_timeout_ms".to_string(),
                reason: "Connect timeout must be at least one millisecond".to_string(),
            });
        }

        if self.max_frame_len < 64 {
            return Err(BridgeError::ValidationError {
                field: "max_frame_len".to_string(),
                reason: format!("{} bytes is too small for any frame", self.max_frame_len),
            });
        }

        if self.event_buffer_size == 0 {
            return Err(BridgeError::ValidationError {
                field: "event_buffer_size".to_string(),
                reason: "Event buffer must hold at least one event".to_string(),
            });
        }

        Ok(())
    }
}

/// Whole milliseconds, saturating
pub(crate) fn duration_to_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

fn parse_field<T: std::str::FromStr>(field: &str, value: &str) -> Result<T> {
    value.trim().parse().map_err(|_| BridgeError::ValidationError {
        field: field.to_string(),
        reason: format!("'{}' is not a valid number", value),
    })
}
