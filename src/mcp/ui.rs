//! Payloads of the `ui/*` methods exchanged between an embedded app and its host.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use validator::Validate;

use crate::mcp::tools::ContentBlock;
use crate::mcp::types::RequestId;
use crate::utils::error::{McpError, McpResult};

/// Well-known method names
pub mod methods {
    /// Handshake request, app to host
    pub const INITIALIZE: &str = "ui/initialize";
    /// Handshake completion, app to host
    pub const INITIALIZED: &str = "ui/notifications/initialized";
    /// Complete tool arguments, host to app
    pub const TOOL_INPUT: &str = "ui/notifications/tool-input";
    /// Streaming partial tool arguments, host to app
    pub const TOOL_INPUT_PARTIAL: &str = "ui/notifications/tool-input-partial";
    /// Tool execution result, host to app
    pub const TOOL_RESULT: &str = "ui/notifications/tool-result";
    /// Tool execution was cancelled, host to app
    pub const TOOL_CANCELLED: &str = "ui/notifications/tool-cancelled";
    /// New host context snapshot, host to app
    pub const HOST_CONTEXT_CHANGED: &str = "ui/notifications/host-context-changed";
    /// Rendered size changed, app to host
    pub const SIZE_CHANGED: &str = "ui/notifications/size-change";
    /// Chat message request, app to host
    pub const MESSAGE: &str = "ui/message";
    /// Open-link request, app to host
    pub const OPEN_LINK: &str = "ui/open-link";
    /// Teardown request, host to app
    pub const RESOURCE_TEARDOWN: &str = "ui/resource-teardown";
    /// Tool invocation, app to host
    pub const TOOLS_CALL: &str = "tools/call";
    /// Resource read, app to host
    pub const RESOURCES_READ: &str = "resources/read";
    /// Resource listing, app to host
    pub const RESOURCES_LIST: &str = "resources/list";
    /// Log record, app to host
    pub const LOGGING_MESSAGE: &str = "notifications/message";
    /// Request abandoned by its sender, either direction
    pub const CANCELLED: &str = "notifications/cancelled";
    /// Liveness check, either direction
    pub const PING: &str = "ping";
}

/// Insets the app should keep clear of host chrome
///
/// Sides the host leaves out are zero.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SafeAreaInsets {
    /// Top inset in CSS pixels
    pub top: f64,
    /// Right inset in CSS pixels
    pub right: f64,
    /// Bottom inset in CSS pixels
    pub bottom: f64,
    /// Left inset in CSS pixels
    pub left: f64,
}

/// Space available to the app
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Viewport {
    /// Width in CSS pixels
    pub width: f64,
    /// Height in CSS pixels
    pub height: f64,
    /// Upper bound on height, when the host enforces one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_height: Option<f64>,
    /// Upper bound on width, when the host enforces one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_width: Option<f64>,
}

/// Input capabilities of the device rendering the app
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceCapabilities {
    /// Touch input available
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub touch: Option<bool>,
    /// Hover available
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hover: Option<bool>,
}

/// Last known host context
///
/// Every field is optional. Fields this crate does not model are kept in
/// `extra` so nothing the host sends is lost.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HostContext {
    /// "light" or "dark"
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub theme: Option<String>,
    /// "inline", "fullscreen" or "pip"
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_mode: Option<String>,
    /// Display modes the host supports
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub available_display_modes: Option<Vec<String>>,
    /// Space available to the app
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub viewport: Option<Viewport>,
    /// BCP 47 locale
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locale: Option<String>,
    /// IANA time zone
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_zone: Option<String>,
    /// Host user agent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
    /// "web", "desktop" or "mobile"
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub platform: Option<String>,
    /// Input capabilities
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_capabilities: Option<DeviceCapabilities>,
    /// Insets for layout
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub safe_area_insets: Option<SafeAreaInsets>,
    /// The tool call this app instance renders
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_info: Option<Value>,
    /// Fields not modelled above
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl HostContext {
    /// Shallow merge: every field present in `update` replaces the current one
    ///
    /// The session itself replaces its cached context wholesale on each
    /// `host-context-changed`; this is for callers that want to accumulate
    /// partial updates.
    pub fn merge_from(&mut self, update: HostContext) {
        macro_rules! take {
            ($($field:ident),*) => {
                $(if update.$field.is_some() { self.$field = update.$field; })*
            };
        }
        take!(
            theme,
            display_mode,
            available_display_modes,
            viewport,
            locale,
            time_zone,
            user_agent,
            platform,
            device_capabilities,
            safe_area_insets,
            tool_info
        );
        self.extra.extend(update.extra);
    }
}

/// `ui/notifications/tool-input` and `tool-input-partial` parameters
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ToolInputParams {
    /// Arguments the tool was (or is being) called with
    #[serde(default)]
    pub arguments: Map<String, Value>,
}

/// `ui/notifications/tool-cancelled` parameters
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCancelledParams {
    /// Why the host cancelled the call
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// `ui/notifications/size-change` parameters
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SizeChangedParams {
    /// Rendered width in CSS pixels
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<f64>,
    /// Rendered height in CSS pixels
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<f64>,
}

/// Author of a chat message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// The end user
    User,
    /// The model
    Assistant,
}

/// `ui/message` parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct MessageParams {
    /// Who the message is from
    pub role: Role,
    /// Message body, at least one block
    #[validate(length(min = 1, message = "message content must not be empty"))]
    pub content: Vec<ContentBlock>,
}

impl MessageParams {
    /// A user message with a single text block
    pub fn user_text(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: vec![ContentBlock::text(text)],
        }
    }
}

/// `ui/message` result
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageResult {
    /// Whether the host rejected the message
    #[serde(default)]
    pub is_error: bool,
}

/// `ui/open-link` parameters
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct OpenLinkParams {
    /// Absolute URL to open
    #[validate(url(message = "url must be an absolute URL"))]
    pub url: String,
}

impl OpenLinkParams {
    /// Parses `url` and builds the parameters
    pub fn new(url: &str) -> McpResult<Self> {
        let parsed = url::Url::parse(url)
            .map_err(|e| McpError::InvalidParams(format!("invalid url {}: {}", url, e)))?;
        Ok(Self {
            url: parsed.to_string(),
        })
    }
}

/// `ui/open-link` result
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenLinkResult {
    /// Whether the host refused to open the link
    #[serde(default)]
    pub is_error: bool,
}

/// Syslog-style severity of a log record
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoggingLevel {
    /// Debug detail
    Debug,
    /// Informational
    Info,
    /// Normal but significant
    Notice,
    /// Warning
    Warning,
    /// Error
    Error,
    /// Critical condition
    Critical,
    /// Action needed immediately
    Alert,
    /// System unusable
    Emergency,
}

/// `notifications/message` parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingMessageParams {
    /// Severity
    pub level: LoggingLevel,
    /// Optional logger name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logger: Option<String>,
    /// Arbitrary JSON payload
    pub data: Value,
}

impl LoggingMessageParams {
    /// An info-level record
    pub fn info(data: impl Into<Value>) -> Self {
        Self {
            level: LoggingLevel::Info,
            logger: None,
            data: data.into(),
        }
    }
}

/// `ui/resource-teardown` parameters
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceTeardownParams {
    /// Whatever the host sent along
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// `notifications/cancelled` parameters
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelledParams {
    /// The request being abandoned
    pub request_id: RequestId,
    /// Why it was abandoned
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}
