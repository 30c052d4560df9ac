//! App-side implementation of the MCP apps protocol.
//!
//! An MCP app is a sandboxed UI that a host embeds next to a conversation.
//! It has exactly one way to reach the outside world: an untyped, bidirectional
//! message channel to the host. Everything it does (calling server tools,
//! reading resources, sending chat messages, opening links, logging, reporting
//! its size, following host theme changes) is a JSON-RPC 2.0 exchange over
//! that channel.
//!
//! ## Architecture
//!
//! Leaves first:
//!
//! - `transport`: the raw [`transport::MessagePort`] primitive and the
//!   [`transport::ChannelAdapter`] that owns the receive task
//! - `types` and `protocol`: envelope types and the codec that classifies
//!   inbound values
//! - `correlation`: pending request table with exactly-once settlement
//! - `lifecycle`: handshake state machine and `ui/initialize` payloads
//! - `router`: ordered, fault-isolated notification fan-out
//! - `session`: the engine tying the above together
//! - `app`: the typed facade an app uses
//! - `ui`, `tools`, `resources`: payloads of the well-known methods
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use mcp_app_bridge::mcp::app::{App, AppConfig};
//! use mcp_app_bridge::mcp::session::RequestOptions;
//! use mcp_app_bridge::mcp::transport::MemoryPort;
//! use mcp_app_bridge::mcp::ui::OpenLinkParams;
//!
//! async fn example() -> mcp_app_bridge::McpResult<()> {
//!     let (port, _host) = MemoryPort::pair("app", "host");
//!     let app = App::new(AppConfig::new("Docs", "1.0.0"), Arc::new(port));
//!     app.connect(RequestOptions::default()).await?;
//!
//!     let link = OpenLinkParams { url: "https://modelcontextprotocol.io".to_string() };
//!     app.open_link(link, RequestOptions::default()).await?;
//!     app.close().await;
//!     Ok(())
//! }
//! ```

/// JSON-RPC envelope types
pub mod types;

/// Envelope codec: encoding and classification of raw values
pub mod protocol;

/// Outstanding request bookkeeping
pub mod correlation;

/// Handshake state machine and initialize payloads
pub mod lifecycle;

/// Notification fan-out
pub mod router;

/// Message ports and the channel adapter
pub mod transport;

/// Protocol engine
pub mod session;

/// Typed application facade
pub mod app;

/// Payloads of the `ui/*` methods
pub mod ui;

/// Server tool payloads
pub mod tools;

/// Server resource payloads
pub mod resources;
