/// Error types for the swap bridge
///
/// Every fallible operation in the crate returns `Result<T>`. Command
/// failures reported by the backend are kept apart from transport failures
/// so callers can tell "backend rejected" from "could not reach backend".

use thiserror::Error;

/// Main error type for bridge operations
#[derive(Error, Debug)]
pub enum BridgeError {
    // ========================================
    // Command Errors
    // ========================================

    #[error("Command '{command}' failed: {message}")]
    CommandFailed {
        command: String,
        message: String,
        code: Option<i64>,
    },

    #[error("Command '{command}' timed out after {timeout_ms} ms")]
    Timeout {
        command: String,
        timeout_ms: u64,
    },

    #[error("Invalid command name '{name}': {reason}")]
    InvalidCommand {
        name: String,
        reason: String,
    },

    #[error("Unexpected response to '{command}': {reason}")]
    UnexpectedResponse {
        command: String,
        reason: String,
    },

    // ========================================
    // Transport Errors
    // ========================================

    #[error("Backend unavailable: {0}")]
    TransportUnavailable(String),

    #[error("Failed to connect to {host}:{port} - {source}")]
    ConnectionFailed {
        host: String,
        port: u16,
        #[source]
        source: std::io::Error,
    },

    #[error("Frame too long: {length} bytes (max: {max})")]
    FrameTooLong {
        length: usize,
        max: usize,
    },

    #[error("Malformed frame: {0}")]
    Codec(String),

    // ========================================
    // State Errors
    // ========================================

    #[error("Bridge context not available")]
    ContextUnavailable,

    #[error("Invalid input for field '{field}': {reason}")]
    ValidationError {
        field: String,
        reason: String,
    },

    // ========================================
    // IO / Serialization Errors
    // ========================================

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    JsonError(#[from] serde_json::Error),

    // ========================================
    // Generic Errors
    // ========================================

    #[error("Internal error: {0}")]
    Internal(String),
}

impl BridgeError {
    /// Whether the same command could succeed if the caller tried again.
    ///
    /// The bridge itself never retries.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            BridgeError::TransportUnavailable(_)
                | BridgeError::Timeout { .. }
                | BridgeError::ConnectionFailed { .. }
        )
    }

    /// Whether the backend received the command and rejected it
    pub fn is_command_failure(&self) -> bool {
        matches!(self, BridgeError::CommandFailed { .. })
    }
}

/// Result type alias for bridge operations
pub type Result<T> = std::result::Result<T, BridgeError>;

// ========================================
// Unit Tests
// ========================================
