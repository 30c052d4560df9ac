//! # Server tool payloads
//!
//! Typed parameters and results for `tools/call`, which the app issues to have
//! the host proxy a call to the tool's originating server. The same result
//! shape arrives in `ui/notifications/tool-result` when the host reports the
//! outcome of the call that launched the app.
//!
//! ## Usage
//!
//! ```rust
//! use mcp_app_bridge::mcp::tools::{CallToolParams, CallToolResult};
//! use serde_json::json;
//!
//! let params = CallToolParams::new("get-time").with_argument("tz", "UTC");
//! assert_eq!(params.arguments["tz"], json!("UTC"));
//!
//! let result: CallToolResult = serde_json::from_value(json!({
//!     "content": [{ "type": "text", "text": "12:00" }]
//! })).unwrap();
//! assert_eq!(result.first_text(), Some("12:00"));
//! ```

pub(crate) mod models;

pub use models::{CallToolParams, CallToolResult, ContentBlock};
