//! Session lifecycle for the app side of the channel
//!
//! This module implements the handshake state machine, and the payloads of
//! the `ui/initialize` request that drives it.
//!
//! ```text
//! Uninitialized --BeginHandshake--> Initializing --HandshakeSucceeded--> Ready
//!                                        |                                 |
//!                      HandshakeFailed | Abort        Teardown | ChannelLost | Abort
//!                                        v                                 v
//!                                      Closed  <---------------------------+
//! ```
//!
//! `Closed` is terminal. A new session is needed to connect again.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::mcp::ui::HostContext;
use crate::utils::error::{McpError, McpResult};

/// Protocol version this crate speaks by default
pub const LATEST_PROTOCOL_VERSION: &str = "2025-06-18";

/// Session state for the app side of a channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    /// Nothing sent yet
    Uninitialized,
    /// `ui/initialize` sent, waiting for the host
    Initializing,
    /// Handshake complete, capability calls allowed
    Ready,
    /// Terminal
    Closed,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Uninitialized => "uninitialized",
            SessionState::Initializing => "initializing",
            SessionState::Ready => "ready",
            SessionState::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// Inputs that move the state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleEvent {
    /// The single allowed call to begin the handshake
    BeginHandshake,
    /// A successful initialize response arrived
    HandshakeSucceeded,
    /// The initialize request failed
    HandshakeFailed,
    /// Local close before or after readiness
    Abort,
    /// Host-initiated teardown
    Teardown,
    /// The underlying channel went away
    ChannelLost,
}

/// The handshake state machine
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Lifecycle {
    state: SessionState,
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self::new()
    }
}

impl Lifecycle {
    /// Starts in `Uninitialized`
    pub fn new() -> Self {
        Self {
            state: SessionState::Uninitialized,
        }
    }

    /// Current state
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Whether capability calls are allowed
    pub fn is_ready(&self) -> bool {
        self.state == SessionState::Ready
    }

    /// Whether the session has reached its terminal state
    pub fn is_closed(&self) -> bool {
        self.state == SessionState::Closed
    }

    /// Applies an event, returning the new state
    ///
    /// Transitions that the machine does not allow leave the state untouched
    /// and fail with [`McpError::InvalidState`].
    pub fn apply(&mut self, event: LifecycleEvent) -> McpResult<SessionState> {
        use LifecycleEvent::*;
        use SessionState::*;

        let next = match (self.state, event) {
            (Uninitialized, BeginHandshake) => Initializing,
            (Initializing, HandshakeSucceeded) => Ready,
            (Initializing, HandshakeFailed | Abort | ChannelLost | Teardown) => Closed,
            (Ready, Teardown | ChannelLost | Abort) => Closed,
            (Uninitialized, Abort | ChannelLost) => Closed,
            (state, event) => {
                return Err(McpError::InvalidState(format!(
                    "cannot apply {:?} in state {}",
                    event, state
                )));
            }
        };
        self.state = next;
        Ok(next)
    }
}

/// Name and version of either end of the channel
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Implementation {
    /// Display name
    pub name: String,
    /// Version string; hosts may leave it out
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub version: String,
}

impl Implementation {
    /// Creates a new implementation descriptor
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
        }
    }
}

/// `ui/initialize` request parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitializeParams {
    /// Capabilities the app declares
    pub app_capabilities: serde_json::Value,
    /// App identity
    pub app_info: Implementation,
    /// Protocol version the app speaks
    pub protocol_version: String,
}

/// `ui/initialize` result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitializeResult {
    /// Protocol version the host settled on
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub protocol_version: Option<String>,
    /// Capabilities the host offers
    #[serde(default)]
    pub host_capabilities: serde_json::Value,
    /// Host identity
    pub host_info: Implementation,
    /// Initial host context
    #[serde(default)]
    pub host_context: HostContext,
}
