//! # Server resource payloads
//!
//! Typed parameters and results for `resources/read` and `resources/list`,
//! which the host proxies to the app's originating server. Binary contents
//! arrive base64-encoded; [`BinaryContent::decode_blob`] extracts the bytes.
//! Anything beyond that (video playback, markdown rendering) is up to the app.
//!
//! ## Usage
//!
//! ```rust
//! use mcp_app_bridge::mcp::resources::{ReadResourceResult, ResourceContents};
//! use serde_json::json;
//!
//! let result: ReadResourceResult = serde_json::from_value(json!({
//!     "contents": [{ "uri": "ui://clip", "mimeType": "video/mp4", "blob": "aGk=" }]
//! })).unwrap();
//!
//! if let ResourceContents::Binary(binary) = &result.contents[0] {
//!     assert_eq!(binary.decode_blob().unwrap(), b"hi");
//! }
//! ```

mod models;

pub use models::{
    BinaryContent, ListResourcesParams, ListResourcesResult, ReadResourceParams,
    ReadResourceResult, Resource, ResourceContents, TextContent,
};
