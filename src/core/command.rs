/// Backend commands
///
/// A command is a named request with optional JSON arguments. Each one gets
/// a fresh id that the backend echoes back in its single response.

use crate::error::{BridgeError, Result};
use crate::network::codec::Frame;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use serde_json::Value;
use tracing::warn;
use uuid::Uuid;

/// Maximum command name length in bytes
pub const MAX_COMMAND_NAME_LEN: usize = 64;

static COMMAND_NAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-z][a-z0-9_\-]*$").expect("command name pattern is valid"));

/// A named request bound for the backend
#[derive(Debug, Clone, PartialEq)]
pub struct Command {
    pub id: Uuid,
    pub name: String,
    pub args: Option<Value>,
}

impl Command {
    /// Create a command with a fresh id
    ///
    /// # Errors
    /// - `BridgeError::InvalidCommand`: name is empty, too long, or contains
    ///   characters other than lowercase letters, digits, `_` and `-`
    pub fn new(name: impl Into<String>, args: Option<Value>) -> Result<Self> {
        let name = name.into();
        Self::validate_name(&name)?;

        Ok(Self {
            id: Uuid::new_v4(),
            name,
            args,
        })
    }

    /// Create a command from serializable arguments
    pub fn with_args<A: Serialize>(name: impl Into<String>, args: &A) -> Result<Self> {
        let args = serde_json::to_value(args)?;
        Self::new(name, Some(args))
    }

    /// Check a command name without building a command
    pub fn validate_name(name: &str) -> Result<()> {
        if name.is_empty() {
            return Err(BridgeError::InvalidCommand {
                name: name.to_string(),
                reason: "Command name cannot be empty".to_string(),
            });
        }

        if name.len() > MAX_COMMAND_NAME_LEN {
            warn!("Rejected command name of {} bytes", name.len());
            return Err(BridgeError::InvalidCommand {
                name: name.to_string(),
                reason: format!("Longer than {} bytes", MAX_COMMAND_NAME_LEN),
            });
        }

        if !COMMAND_NAME.is_match(name) {
            return Err(BridgeError::InvalidCommand {
                name: name.to_string(),
                reason: "Only lowercase letters, digits, '_' and '-' are allowed".to_string(),
            });
        }

        Ok(())
    }

    /// Wire representation
    pub fn to_frame(&self) -> Frame {
        Frame::Request {
            id: self.id,
            command: self.name.clone(),
            args: self.args.clone(),
        }
    }
}
