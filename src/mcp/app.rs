//! # Application facade
//!
//! [`App`] is what an embedded app talks to. It wraps a [`Session`] with typed
//! capability calls and typed event registration:
//!
//! | call                      | method                | result                 |
//! |---------------------------|-----------------------|------------------------|
//! | [`App::call_server_tool`] | `tools/call`          | [`CallToolResult`]     |
//! | [`App::read_server_resource`] | `resources/read`  | [`ReadResourceResult`] |
//! | [`App::list_server_resources`] | `resources/list` | [`ListResourcesResult`] |
//! | [`App::send_message`]     | `ui/message`          | [`MessageResult`]      |
//! | [`App::open_link`]        | `ui/open-link`        | [`OpenLinkResult`]     |
//!
//! Every call other than [`App::connect`] fails with [`McpError::NotReady`]
//! until the handshake has completed, and nothing is posted in that case.
//! Parameters are validated before anything is sent.
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use mcp_app_bridge::mcp::app::{App, AppConfig};
//! use mcp_app_bridge::mcp::session::RequestOptions;
//! use mcp_app_bridge::mcp::tools::CallToolParams;
//! use mcp_app_bridge::mcp::transport::MemoryPort;
//!
//! async fn example() -> mcp_app_bridge::McpResult<()> {
//!     let (port, _host) = MemoryPort::pair("app", "host");
//!     let app = App::new(AppConfig::new("Clock", "1.0.0"), Arc::new(port));
//!
//!     app.on_tool_result(|result| println!("tool result: {:?}", result.first_text()));
//!     app.connect(RequestOptions::default()).await?;
//!
//!     let result = app
//!         .call_server_tool(CallToolParams::new("get-time"), RequestOptions::default())
//!         .await?;
//!     println!("{:?}", result.first_text());
//!     Ok(())
//! }
//! ```

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Value};
use tokio::sync::watch;
use tracing::{debug, instrument};
use validator::Validate;

use crate::config::BridgeSettings;
use crate::mcp::correlation::PendingInfo;
use crate::mcp::lifecycle::{
    Implementation, InitializeParams, InitializeResult, SessionState, LATEST_PROTOCOL_VERSION,
};
use crate::mcp::resources::{
    ListResourcesParams, ListResourcesResult, ReadResourceParams, ReadResourceResult,
};
use crate::mcp::router::Subscription;
use crate::mcp::session::{RequestOptions, Session};
use crate::mcp::tools::{CallToolParams, CallToolResult};
use crate::mcp::transport::{MessagePort, PeerFilter};
use crate::mcp::ui::{
    methods, HostContext, LoggingMessageParams, MessageParams, MessageResult, OpenLinkParams,
    OpenLinkResult, ResourceTeardownParams, SizeChangedParams, ToolCancelledParams,
    ToolInputParams,
};
use crate::utils::error::{McpError, McpResult};

/// How the app introduces itself and which peer it trusts
#[derive(Debug, Clone, PartialEq)]
pub struct AppConfig {
    /// Identity sent in `ui/initialize`
    pub app_info: Implementation,
    /// Capabilities sent in `ui/initialize`
    pub app_capabilities: Value,
    /// Protocol version requested
    pub protocol_version: String,
    /// Origin filter for inbound messages
    pub peer: PeerFilter,
    /// Deadline for the handshake when the caller gives none
    pub handshake_timeout: Option<Duration>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self::from_settings(&BridgeSettings::default())
    }
}

impl AppConfig {
    /// Config with the given identity and defaults for everything else
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            app_info: Implementation::new(name, version),
            ..Self::default()
        }
    }

    /// Builds the facade config from loaded settings
    pub fn from_settings(settings: &BridgeSettings) -> Self {
        Self {
            app_info: Implementation::new(settings.app.name.clone(), settings.app.version.clone()),
            app_capabilities: json!({}),
            protocol_version: settings.protocol_version.clone(),
            peer: PeerFilter::from_origin(settings.peer_origin.as_deref()),
            handshake_timeout: match settings.handshake_timeout_ms {
                0 => None,
                ms => Some(Duration::from_millis(ms)),
            },
        }
    }

    /// Replaces the declared capabilities
    pub fn with_capabilities(mut self, capabilities: Value) -> Self {
        self.app_capabilities = capabilities;
        self
    }

    /// Restricts inbound messages to one origin
    pub fn with_peer_origin(mut self, origin: impl Into<String>) -> Self {
        self.peer = PeerFilter::Origin(origin.into());
        self
    }
}

/// The embedded app's view of its host
#[derive(Debug, Clone)]
pub struct App {
    config: AppConfig,
    session: Session,
}

impl App {
    /// Creates an app over `port`; call [`App::connect`] to begin
    pub fn new(config: AppConfig, port: Arc<dyn MessagePort>) -> Self {
        let session = Session::new(port, config.peer.clone());
        Self { config, session }
    }

    /// The underlying session
    pub fn session(&self) -> &Session {
        &self.session
    }

    /// The config this app was built with
    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Performs the handshake
    ///
    /// Uses the configured handshake timeout when `options` has none. Can
    /// only be called once per app; a failed handshake leaves the app closed.
    #[instrument(skip_all, fields(app = %self.config.app_info.name))]
    pub async fn connect(&self, mut options: RequestOptions) -> McpResult<InitializeResult> {
        if options.timeout.is_none() {
            options.timeout = self.config.handshake_timeout;
        }
        let params = InitializeParams {
            app_capabilities: self.config.app_capabilities.clone(),
            app_info: self.config.app_info.clone(),
            protocol_version: if self.config.protocol_version.is_empty() {
                LATEST_PROTOCOL_VERSION.to_string()
            } else {
                self.config.protocol_version.clone()
            },
        };
        self.session.initialize(params, options).await
    }

    fn ensure_ready(&self) -> McpResult<()> {
        match self.session.state() {
            SessionState::Ready => Ok(()),
            state => Err(McpError::NotReady(state)),
        }
    }

    async fn call<P, R>(&self, method: &str, params: &P, options: RequestOptions) -> McpResult<R>
    where
        P: Serialize + Validate,
        R: DeserializeOwned,
    {
        self.ensure_ready()?;
        params.validate()?;
        let params = serde_json::to_value(params)?;
        self.request(method, Some(params), options).await
    }

    /// Sends an arbitrary request and decodes its result
    pub async fn request<R: DeserializeOwned>(
        &self,
        method: &str,
        params: Option<Value>,
        options: RequestOptions,
    ) -> McpResult<R> {
        self.ensure_ready()?;
        let result = self.session.request(method, params, options).await?;
        serde_json::from_value(result)
            .map_err(|e| McpError::Deserialization(format!("invalid {} result: {}", method, e)))
    }

    /// Calls a tool on the app's originating server through the host
    #[instrument(skip_all, fields(tool = %params.name))]
    pub async fn call_server_tool(
        &self,
        params: CallToolParams,
        options: RequestOptions,
    ) -> McpResult<CallToolResult> {
        self.call(methods::TOOLS_CALL, &params, options).await
    }

    /// Reads a resource on the app's originating server
    #[instrument(skip_all, fields(uri = %params.uri))]
    pub async fn read_server_resource(
        &self,
        params: ReadResourceParams,
        options: RequestOptions,
    ) -> McpResult<ReadResourceResult> {
        self.call(methods::RESOURCES_READ, &params, options).await
    }

    /// Lists resources on the app's originating server
    #[instrument(skip_all)]
    pub async fn list_server_resources(
        &self,
        params: ListResourcesParams,
        options: RequestOptions,
    ) -> McpResult<ListResourcesResult> {
        self.call(methods::RESOURCES_LIST, &params, options).await
    }

    /// Adds a message to the host's conversation
    #[instrument(skip_all)]
    pub async fn send_message(
        &self,
        params: MessageParams,
        options: RequestOptions,
    ) -> McpResult<MessageResult> {
        self.call(methods::MESSAGE, &params, options).await
    }

    /// Asks the host to open a URL
    #[instrument(skip_all, fields(url = %params.url))]
    pub async fn open_link(
        &self,
        params: OpenLinkParams,
        options: RequestOptions,
    ) -> McpResult<OpenLinkResult> {
        self.call(methods::OPEN_LINK, &params, options).await
    }

    /// Sends a log record to the host
    pub async fn send_log(&self, params: LoggingMessageParams) -> McpResult<()> {
        self.notify(methods::LOGGING_MESSAGE, Some(serde_json::to_value(params)?))
            .await
    }

    /// Reports the app's rendered size
    pub async fn send_size_changed(&self, params: SizeChangedParams) -> McpResult<()> {
        self.notify(methods::SIZE_CHANGED, Some(serde_json::to_value(params)?))
            .await
    }

    /// Sends an arbitrary notification
    pub async fn notify(&self, method: &str, params: Option<Value>) -> McpResult<()> {
        self.ensure_ready()?;
        self.session.notify(method, params).await
    }

    fn on_typed<T, F>(&self, method: &'static str, handler: F) -> Subscription
    where
        T: DeserializeOwned + 'static,
        F: Fn(T) + Send + Sync + 'static,
    {
        self.session.router().subscribe(method, move |params| {
            let params = params.unwrap_or_else(|| json!({}));
            let typed = serde_json::from_value::<T>(params)
                .map_err(|e| McpError::Deserialization(format!("invalid {} params: {}", method, e)))?;
            handler(typed);
            Ok(())
        })
    }

    /// Complete tool arguments
    pub fn on_tool_input<F>(&self, handler: F) -> Subscription
    where
        F: Fn(ToolInputParams) + Send + Sync + 'static,
    {
        self.on_typed(methods::TOOL_INPUT, handler)
    }

    /// Partial tool arguments while the model is still streaming them
    pub fn on_tool_input_partial<F>(&self, handler: F) -> Subscription
    where
        F: Fn(ToolInputParams) + Send + Sync + 'static,
    {
        self.on_typed(methods::TOOL_INPUT_PARTIAL, handler)
    }

    /// Result of the tool call that launched the app
    pub fn on_tool_result<F>(&self, handler: F) -> Subscription
    where
        F: Fn(CallToolResult) + Send + Sync + 'static,
    {
        self.on_typed(methods::TOOL_RESULT, handler)
    }

    /// The tool call that launched the app was cancelled
    pub fn on_tool_cancelled<F>(&self, handler: F) -> Subscription
    where
        F: Fn(ToolCancelledParams) + Send + Sync + 'static,
    {
        self.on_typed(methods::TOOL_CANCELLED, handler)
    }

    /// A new host context snapshot arrived
    ///
    /// The snapshot is already cached when the handler runs, so
    /// [`App::host_context`] returns the same value.
    pub fn on_host_context_changed<F>(&self, handler: F) -> Subscription
    where
        F: Fn(HostContext) + Send + Sync + 'static,
    {
        self.on_typed(methods::HOST_CONTEXT_CHANGED, handler)
    }

    /// Any notification by method name, with raw params
    pub fn on_notification<F>(&self, method: &str, handler: F) -> Subscription
    where
        F: Fn(Option<Value>) -> McpResult<()> + Send + Sync + 'static,
    {
        self.session.router().subscribe(method, handler)
    }

    /// Runs when the host sends `ui/resource-teardown`
    ///
    /// The host's request is answered once the returned future completes;
    /// an error is reported back to the host. The future runs on its own
    /// task, so it may still make requests to the host. Replaces any
    /// earlier handler.
    pub fn on_teardown<F, Fut>(&self, handler: F)
    where
        F: Fn(ResourceTeardownParams) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = McpResult<()>> + Send + 'static,
    {
        debug!("teardown handler registered");
        self.session
            .set_teardown_handler(Arc::new(move |params| handler(params).boxed()));
    }

    /// Faults with no caller to return to
    ///
    /// Receives malformed inbound messages ([`McpError::Parse`]), errors and
    /// panics from notification handlers, malformed host context snapshots,
    /// failed teardown callbacks and host requests that could not be
    /// answered. Replaces any earlier handler.
    pub fn on_error<F>(&self, handler: F)
    where
        F: Fn(McpError) + Send + Sync + 'static,
    {
        self.session.set_error_handler(Arc::new(handler));
    }

    /// Current lifecycle state
    pub fn state(&self) -> SessionState {
        self.session.state()
    }

    /// Receiver that observes every state change
    pub fn state_changes(&self) -> watch::Receiver<SessionState> {
        self.session.state_changes()
    }

    /// Last known host context
    pub fn host_context(&self) -> Arc<HostContext> {
        self.session.host_context()
    }

    /// Host capabilities from the handshake
    pub fn host_capabilities(&self) -> Value {
        self.session.host_capabilities()
    }

    /// Host identity from the handshake
    pub fn host_info(&self) -> Option<Implementation> {
        self.session.host_info()
    }

    /// Protocol version the host settled on
    pub fn protocol_version(&self) -> Option<String> {
        self.session.protocol_version()
    }

    /// Outstanding requests, oldest first
    pub fn pending_requests(&self) -> Vec<PendingInfo> {
        self.session.pending_requests()
    }

    /// Tears the session down locally
    pub async fn close(&self) {
        self.session.close().await;
    }
}
