use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use validator::Validate;

use crate::mcp::resources::ResourceContents;

/// A block of content in a tool result or chat message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ContentBlock {
    /// Text content
    #[serde(rename = "text")]
    Text {
        /// The text content
        text: String,
    },

    /// Image content
    #[serde(rename = "image", rename_all = "camelCase")]
    Image {
        /// Base64-encoded image data
        data: String,
        /// MIME type of the image
        mime_type: String,
    },

    /// Audio content
    #[serde(rename = "audio", rename_all = "camelCase")]
    Audio {
        /// Base64-encoded audio data
        data: String,
        /// MIME type of the audio
        mime_type: String,
    },

    /// Link to a resource the receiver may read later
    #[serde(rename = "resource_link", rename_all = "camelCase")]
    ResourceLink {
        /// URI of the resource
        uri: String,
        /// Display name
        name: String,
        /// Optional description
        #[serde(default, skip_serializing_if = "Option::is_none")]
        description: Option<String>,
        /// Optional MIME type
        #[serde(default, skip_serializing_if = "Option::is_none")]
        mime_type: Option<String>,
    },

    /// Embedded resource contents
    #[serde(rename = "resource")]
    Resource {
        /// The resource data
        resource: ResourceContents,
    },
}

impl ContentBlock {
    /// A text block
    pub fn text(text: impl Into<String>) -> Self {
        ContentBlock::Text { text: text.into() }
    }

    /// The text of a text block
    pub fn as_text(&self) -> Option<&str> {
        match self {
            ContentBlock::Text { text } => Some(text),
            _ => None,
        }
    }
}

/// `tools/call` parameters
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, Validate)]
pub struct CallToolParams {
    /// Name of the server tool
    #[validate(length(min = 1, message = "tool name must not be empty"))]
    pub name: String,
    /// Arguments passed to the tool
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub arguments: Map<String, Value>,
}

impl CallToolParams {
    /// Creates parameters for a call without arguments
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            arguments: Map::new(),
        }
    }

    /// Adds an argument
    pub fn with_argument(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.arguments.insert(key.into(), value.into());
        self
    }
}

/// `tools/call` result, also the payload of `ui/notifications/tool-result`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallToolResult {
    /// List of content items in the result
    #[serde(default)]
    pub content: Vec<ContentBlock>,

    /// Machine-readable result, when the tool declares an output schema
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub structured_content: Option<Value>,

    /// Whether the tool execution resulted in an error
    #[serde(default)]
    pub is_error: bool,

    /// Opaque metadata
    #[serde(rename = "_meta", default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<Value>,
}

impl CallToolResult {
    /// Creates a new success result with text content
    pub fn text(text: &str) -> Self {
        Self {
            content: vec![ContentBlock::text(text)],
            ..Default::default()
        }
    }

    /// Creates a new error result with text content
    pub fn error(text: &str) -> Self {
        Self {
            content: vec![ContentBlock::text(text)],
            is_error: true,
            ..Default::default()
        }
    }

    /// First text block, if any
    pub fn first_text(&self) -> Option<&str> {
        self.content.iter().find_map(ContentBlock::as_text)
    }
}
