use base64::Engine;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use validator::Validate;

use crate::utils::error::{McpError, McpResult};

/// A resource the originating server exposes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Resource {
    /// Unique identifier for the resource using URI format
    pub uri: String,
    /// Human-readable name for the resource
    pub name: String,
    /// Optional description of the resource
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// MIME type of the resource content
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    /// Size of the resource in bytes (if known)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    /// Fields not modelled above
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Resource {
    /// Creates a new resource with the given URI and name
    pub fn new(uri: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            name: name.into(),
            description: None,
            mime_type: None,
            size: None,
            extra: Map::new(),
        }
    }

    /// Sets the MIME type for the resource
    pub fn with_mime_type(mut self, mime_type: impl Into<String>) -> Self {
        self.mime_type = Some(mime_type.into());
        self
    }
}

/// The contents of a resource
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ResourceContents {
    /// Text-based resource content
    Text(TextContent),
    /// Binary resource content
    Binary(BinaryContent),
}

impl ResourceContents {
    /// URI of the resource these contents belong to
    pub fn uri(&self) -> &str {
        match self {
            ResourceContents::Text(text) => &text.uri,
            ResourceContents::Binary(binary) => &binary.uri,
        }
    }

    /// MIME type, when the server supplied one
    pub fn mime_type(&self) -> Option<&str> {
        match self {
            ResourceContents::Text(text) => text.mime_type.as_deref(),
            ResourceContents::Binary(binary) => binary.mime_type.as_deref(),
        }
    }
}

/// Text-based resource content
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextContent {
    /// URI of the resource
    pub uri: String,
    /// MIME type of the content
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    /// The text content
    pub text: String,
}

impl TextContent {
    /// Creates new text content for a resource
    pub fn new(uri: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            mime_type: None,
            text: text.into(),
        }
    }
}

/// Binary resource content
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BinaryContent {
    /// URI of the resource
    pub uri: String,
    /// MIME type of the content
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    /// Base64-encoded binary data
    pub blob: String,
}

impl BinaryContent {
    /// Creates new binary content for a resource
    pub fn new(uri: impl Into<String>, data: &[u8]) -> Self {
        Self {
            uri: uri.into(),
            mime_type: None,
            blob: base64::engine::general_purpose::STANDARD.encode(data),
        }
    }

    /// Sets the MIME type for the content
    pub fn with_mime_type(mut self, mime_type: impl Into<String>) -> Self {
        self.mime_type = Some(mime_type.into());
        self
    }

    /// Decodes the base64 blob
    pub fn decode_blob(&self) -> McpResult<Vec<u8>> {
        base64::engine::general_purpose::STANDARD
            .decode(&self.blob)
            .map_err(|e| McpError::Deserialization(format!("invalid blob for {}: {}", self.uri, e)))
    }
}

/// `resources/read` parameters
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct ReadResourceParams {
    /// URI of the resource to read
    #[validate(length(min = 1, message = "resource uri must not be empty"))]
    pub uri: String,
}

impl ReadResourceParams {
    /// Parameters for reading `uri`
    pub fn new(uri: impl Into<String>) -> Self {
        Self { uri: uri.into() }
    }
}

/// `resources/read` result
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReadResourceResult {
    /// Array of resource contents
    #[serde(default)]
    pub contents: Vec<ResourceContents>,
}

/// `resources/list` parameters
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct ListResourcesParams {
    /// Optional cursor for pagination
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cursor: Option<String>,
}

/// `resources/list` result
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListResourcesResult {
    /// Array of resources
    #[serde(default)]
    pub resources: Vec<Resource>,
    /// Optional cursor for pagination
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_cursor: Option<String>,
}
