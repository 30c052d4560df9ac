#![deny(missing_docs)]
#![deny(missing_debug_implementations)]
#![deny(rustdoc::missing_crate_level_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![deny(rustdoc::private_intra_doc_links)]
#![deny(rustdoc::invalid_codeblock_attributes)]
#![deny(rustdoc::invalid_html_tags)]
#![deny(rustdoc::bare_urls)]
#![deny(clippy::missing_panics_doc)]

//! mcp-app-bridge is the app side of the MCP apps protocol: a JSON-RPC 2.0
//! session engine that lets a sandboxed embedded UI talk to its host over a
//! single untyped message channel.
//!
//! ## Basic Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use mcp_app_bridge::{App, AppConfig, RequestOptions};
//! use mcp_app_bridge::mcp::tools::CallToolParams;
//! use mcp_app_bridge::mcp::transport::MemoryPort;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // One end goes to the app, the other to whatever plays the host
//!     let (port, _host) = MemoryPort::pair("app://clock", "host://chat");
//!     let app = App::new(AppConfig::new("Clock", "1.0.0"), Arc::new(port));
//!
//!     app.on_tool_input(|input| println!("called with {:?}", input.arguments));
//!     app.on_host_context_changed(|ctx| println!("theme is now {:?}", ctx.theme));
//!
//!     app.connect(RequestOptions::default()).await?;
//!
//!     let result = app
//!         .call_server_tool(
//!             CallToolParams::new("get-time"),
//!             RequestOptions::with_timeout(std::time::Duration::from_secs(5)),
//!         )
//!         .await?;
//!     println!("Tool result: {:?}", result.first_text());
//!
//!     app.close().await;
//!     Ok(())
//! }
//! ```

/// App-side MCP apps protocol: envelopes, session engine, facade and payloads.
pub mod mcp;

/// Utility modules for error handling.
pub mod utils;

/// Configuration management
pub mod config;

/// Logging and metric helpers built on `tracing`
pub mod telemetry;

pub use mcp::app::{App, AppConfig};
pub use mcp::lifecycle::SessionState;
pub use mcp::session::RequestOptions;

// Re-export error types
pub use utils::error::{McpError, McpResult};

/// Re-export telemetry types and functions for easier access
pub use telemetry::{add_metric, init_telemetry, span_duration, TelemetryConfig};
