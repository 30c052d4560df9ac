use std::time::Duration;

use thiserror::Error;

use crate::mcp::lifecycle::SessionState;
use crate::mcp::protocol::ParseFailure;

/// A specialized Result type for MCP operations.
pub type McpResult<T> = Result<T, McpError>;

/// Represents errors that can occur during MCP protocol operations.
#[derive(Debug, Clone, Error)]
pub enum McpError {
    /// An inbound message did not match any envelope shape
    #[error("Parse failure: {0}")]
    Parse(#[from] ParseFailure),

    /// The host answered a request with an error response
    #[error("Remote error ({code}): {message}")]
    Remote {
        /// JSON-RPC error code supplied by the peer
        code: i64,
        /// Human-readable message supplied by the peer
        message: String,
        /// Optional structured data supplied by the peer
        data: Option<serde_json::Value>,
    },

    /// A caller-imposed deadline elapsed before the response arrived
    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    /// The caller aborted the request
    #[error("Request cancelled: {0}")]
    Cancelled(String),

    /// A capability call was made outside the ready state
    #[error("Session not ready (state: {0})")]
    NotReady(SessionState),

    /// The session closed while the request was outstanding
    #[error("Session closed")]
    SessionClosed,

    /// A notification or teardown handler panicked
    #[error("Handler panicked: {0}")]
    HandlerPanicked(String),

    /// Required arguments were missing or malformed
    #[error("Invalid parameters: {0}")]
    InvalidParams(String),

    /// An operation was attempted in a state that does not allow it
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// The underlying message channel is not usable
    #[error("Channel closed: {0}")]
    ChannelClosed(String),

    /// Serializing an outbound payload failed
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Deserializing an inbound payload into its typed form failed
    #[error("Deserialization error: {0}")]
    Deserialization(String),

    /// Configuration could not be loaded
    #[error("Config error: {0}")]
    Config(String),

    /// IO error while reading configuration or talking to a transport
    #[error("IO error: {0}")]
    Io(String),
}

impl McpError {
    /// Builds a [`McpError::Remote`] from its parts
    pub fn remote(code: i64, message: impl Into<String>, data: Option<serde_json::Value>) -> Self {
        Self::Remote {
            code,
            message: message.into(),
            data,
        }
    }
}

impl From<serde_json::Error> for McpError {
    fn from(err: serde_json::Error) -> Self {
        if err.is_data() || err.is_syntax() || err.is_eof() {
            McpError::Deserialization(err.to_string())
        } else {
            McpError::Serialization(err.to_string())
        }
    }
}

impl From<std::io::Error> for McpError {
    fn from(err: std::io::Error) -> Self {
        McpError::Io(err.to_string())
    }
}

impl From<validator::ValidationErrors> for McpError {
    fn from(err: validator::ValidationErrors) -> Self {
        McpError::InvalidParams(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remote_error_carries_peer_message() {
        let err = McpError::remote(-32000, "boom", None);
        assert_eq!(err.to_string(), "Remote error (-32000): boom");
    }

    #[test]
    fn not_ready_names_the_state() {
        let err = McpError::NotReady(SessionState::Initializing);
        assert_eq!(err.to_string(), "Session not ready (state: initializing)");
    }
}
