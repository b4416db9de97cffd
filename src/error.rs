//! Error types for Splice.

use std::time::Duration;
use thiserror::Error;

/// Library-level error type for Splice operations.
#[derive(Error, Debug)]
pub enum SpliceError {
    #[error("{0}")]
    Transport(#[from] TransportError),

    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("Invalid arguments for '{tool}': {reason}")]
    Validation { tool: String, reason: String },

    #[error("{0}")]
    Operation(String),

    #[error("'{tool}' timed out after {after:?}; the operation may still be running in the worker")]
    Timeout { tool: String, after: Duration },

    #[error("unknown tool: {0}")]
    UnknownTool(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("OpenAI API error: {0}")]
    OpenAI(String),

    #[error("External tool not found: {0}. Please install it and ensure it's in your PATH.")]
    ToolNotFound(String),

    #[error("Planner error: {0}")]
    Planner(String),
}

impl SpliceError {
    /// Whether this error must end the current user interaction.
    ///
    /// Transport and protocol errors are hard failures; everything else is
    /// shown to the operator as a failed tool result.
    pub fn is_fatal(&self) -> bool {
        matches!(self, SpliceError::Transport(_) | SpliceError::Protocol(_))
    }
}

/// Failures of the worker channel itself.
///
/// Any of these closes the channel; pending and later invocations fail until
/// a new channel is opened.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("worker unavailable: {0}")]
    WorkerUnavailable(String),

    #[error("channel closed")]
    ChannelClosed,

    #[error("malformed response")]
    MalformedMessage,
}

/// Caller-side protocol misuse and worker protocol violations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("duplicate tool name in discovery result: {0}")]
    DuplicateTool(String),

    #[error("tool discovery already performed on this channel")]
    DiscoveryRepeated,

    #[error("tool invocation sent before discovery completed")]
    NotDiscovered,

    #[error("correlation id {0} is already in flight")]
    DuplicateCorrelation(String),

    #[error("worker rejected '{method}' ({code}): {message}")]
    Rejected {
        method: String,
        code: i32,
        message: String,
    },

    #[error("unexpected reply to '{method}': {reason}")]
    UnexpectedReply { method: String, reason: String },
}

/// Result type alias for Splice operations.
pub type Result<T> = std::result::Result<T, SpliceError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_messages_match_wire_reasons() {
        assert_eq!(TransportError::ChannelClosed.to_string(), "channel closed");
        assert_eq!(
            TransportError::MalformedMessage.to_string(),
            "malformed response"
        );
    }

    #[test]
    fn test_fatality() {
        assert!(SpliceError::from(TransportError::ChannelClosed).is_fatal());
        assert!(SpliceError::from(ProtocolError::NotDiscovered).is_fatal());
        assert!(!SpliceError::UnknownTool("x".into()).is_fatal());
        assert!(!SpliceError::Validation {
            tool: "trim_video".into(),
            reason: "missing required argument 'input_path'".into()
        }
        .is_fatal());
    }
}
