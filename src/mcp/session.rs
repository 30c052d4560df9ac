//! The protocol engine behind [`crate::mcp::app::App`].
//!
//! A [`Session`] owns the channel adapter, the correlation table, the
//! notification router and the lifecycle. The adapter's receive task is the
//! only place inbound messages are handled:
//!
//! - responses settle their correlation entry (unknown ids are logged and
//!   dropped),
//! - notifications refresh the cached host context when applicable and then
//!   fan out through the router,
//! - host requests (`ping`, `ui/resource-teardown`, anything else) are
//!   answered here.
//!
//! `ui/resource-teardown` runs on its own task, so responses to whatever the
//! teardown callback asks of the host are still read while it runs.
//!
//! Faults that have no caller to return to are logged and handed to the
//! error handler, if one is set. These are malformed messages, failing
//! notification handlers, a malformed host context, a failed teardown
//! callback and host requests that could not be answered.
//!
//! Callers only ever register and cancel their own entries. Closing is the
//! one global operation: it rejects every pending entry with
//! [`McpError::SessionClosed`], stops the adapter and ignores whatever is
//! still queued.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use arc_swap::{ArcSwap, ArcSwapOption};
use futures::future::BoxFuture;
use futures::FutureExt;
use serde_json::{json, Value};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, trace, warn};
use uuid::Uuid;

use crate::mcp::correlation::{CorrelationTable, PendingInfo};
use crate::mcp::lifecycle::{
    Implementation, InitializeParams, InitializeResult, Lifecycle, LifecycleEvent, SessionState,
};
use crate::mcp::protocol;
use crate::mcp::router::NotificationRouter;
use crate::mcp::transport::{ChannelAdapter, ChannelEvent, MessagePort, PeerFilter};
use crate::mcp::types::{
    JsonRpcError, JsonRpcMessage, JsonRpcNotification, JsonRpcRequest, JsonRpcResponse, RequestId,
};
use crate::mcp::ui::{methods, CancelledParams, HostContext, ResourceTeardownParams};
use crate::telemetry;
use crate::utils::error::{McpError, McpResult};

/// Async callback run when the host asks the app to tear down
pub type TeardownHandler =
    Arc<dyn Fn(ResourceTeardownParams) -> BoxFuture<'static, McpResult<()>> + Send + Sync>;

/// Callback for faults that no caller is waiting on
pub type ErrorHandler = Arc<dyn Fn(McpError) + Send + Sync>;

/// Per-call deadline and abort signal
#[derive(Debug, Clone, Default)]
pub struct RequestOptions {
    /// Give up after this long
    pub timeout: Option<Duration>,
    /// Give up when this token is cancelled
    pub cancellation: Option<CancellationToken>,
}

impl RequestOptions {
    /// Options with a deadline
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            timeout: Some(timeout),
            cancellation: None,
        }
    }

    /// Options with an abort signal
    pub fn with_cancellation(token: CancellationToken) -> Self {
        Self {
            timeout: None,
            cancellation: Some(token),
        }
    }
}

struct Shared {
    session_id: String,
    adapter: ChannelAdapter,
    lifecycle: Mutex<Lifecycle>,
    table: Mutex<CorrelationTable>,
    router: NotificationRouter,
    host_context: ArcSwap<HostContext>,
    host_info: ArcSwapOption<Implementation>,
    host_capabilities: ArcSwap<Value>,
    protocol_version: ArcSwapOption<String>,
    teardown: Mutex<Option<TeardownHandler>>,
    teardown_started: AtomicBool,
    on_error: Mutex<Option<ErrorHandler>>,
    state_tx: watch::Sender<SessionState>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// One app-side protocol session over one channel
#[derive(Clone)]
pub struct Session {
    shared: Arc<Shared>,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("session_id", &self.shared.session_id)
            .field("state", &self.state())
            .field("pending", &lock(&self.shared.table).len())
            .finish_non_exhaustive()
    }
}

impl Session {
    /// Creates a session over `port`; nothing is sent or received yet
    pub fn new(port: Arc<dyn MessagePort>, filter: PeerFilter) -> Self {
        let (state_tx, _) = watch::channel(SessionState::Uninitialized);
        Self {
            shared: Arc::new(Shared {
                session_id: Uuid::new_v4().to_string(),
                adapter: ChannelAdapter::new(port, filter),
                lifecycle: Mutex::new(Lifecycle::new()),
                table: Mutex::new(CorrelationTable::new()),
                router: NotificationRouter::new(),
                host_context: ArcSwap::from_pointee(HostContext::default()),
                host_info: ArcSwapOption::empty(),
                host_capabilities: ArcSwap::from_pointee(Value::Null),
                protocol_version: ArcSwapOption::empty(),
                teardown: Mutex::new(None),
                teardown_started: AtomicBool::new(false),
                on_error: Mutex::new(None),
                state_tx,
            }),
        }
    }

    /// Identifier used in log fields
    pub fn session_id(&self) -> &str {
        &self.shared.session_id
    }

    /// Current lifecycle state
    pub fn state(&self) -> SessionState {
        lock(&self.shared.lifecycle).state()
    }

    /// Receiver that observes every state change
    pub fn state_changes(&self) -> watch::Receiver<SessionState> {
        self.shared.state_tx.subscribe()
    }

    /// The notification router
    pub fn router(&self) -> &NotificationRouter {
        &self.shared.router
    }

    /// Replaces the teardown callback
    pub fn set_teardown_handler(&self, handler: TeardownHandler) {
        *lock(&self.shared.teardown) = Some(handler);
    }

    /// Replaces the error handler
    pub fn set_error_handler(&self, handler: ErrorHandler) {
        *lock(&self.shared.on_error) = Some(handler);
    }

    fn report(&self, error: McpError) {
        let handler = lock(&self.shared.on_error).clone();
        let Some(handler) = handler else {
            return;
        };
        if catch_unwind(AssertUnwindSafe(|| handler(error))).is_err() {
            error!("error handler panicked");
        }
    }

    /// Last known host context
    pub fn host_context(&self) -> Arc<HostContext> {
        self.shared.host_context.load_full()
    }

    /// Host identity, once the handshake has completed
    pub fn host_info(&self) -> Option<Implementation> {
        self.shared.host_info.load_full().map(|info| (*info).clone())
    }

    /// Host capabilities, `null` before the handshake has completed
    pub fn host_capabilities(&self) -> Value {
        (*self.shared.host_capabilities.load_full()).clone()
    }

    /// Protocol version the host settled on
    pub fn protocol_version(&self) -> Option<String> {
        self.shared
            .protocol_version
            .load_full()
            .map(|version| (*version).clone())
    }

    /// Outstanding requests, oldest first
    pub fn pending_requests(&self) -> Vec<PendingInfo> {
        lock(&self.shared.table).pending()
    }

    fn transition(&self, event: LifecycleEvent) -> McpResult<SessionState> {
        let mut lifecycle = lock(&self.shared.lifecycle);
        let state = lifecycle.apply(event)?;
        self.shared.state_tx.send_replace(state);
        drop(lifecycle);
        info!(session_id = %self.shared.session_id, ?event, %state, "session state changed");
        Ok(state)
    }

    /// Runs the `ui/initialize` handshake
    ///
    /// Starts the channel, sends the request, caches what the host returned
    /// and sends `ui/notifications/initialized`. Any failure closes the
    /// session. Only one handshake may ever begin.
    #[instrument(skip_all, fields(session_id = %self.shared.session_id))]
    pub async fn initialize(
        &self,
        params: InitializeParams,
        options: RequestOptions,
    ) -> McpResult<InitializeResult> {
        self.transition(LifecycleEvent::BeginHandshake)?;

        if let Err(e) = self.start() {
            self.close_with(LifecycleEvent::HandshakeFailed).await;
            return Err(e);
        }

        let outcome = match serde_json::to_value(&params) {
            Ok(params) => self
                .request(methods::INITIALIZE, Some(params), options)
                .await
                .and_then(|result| {
                    serde_json::from_value::<InitializeResult>(result).map_err(|e| {
                        McpError::Deserialization(format!("invalid initialize result: {}", e))
                    })
                }),
            Err(e) => Err(e.into()),
        };

        let result = match outcome {
            Ok(result) => result,
            Err(e) => {
                warn!(error = %e, "handshake failed");
                self.close_with(LifecycleEvent::HandshakeFailed).await;
                return Err(e);
            }
        };

        self.shared
            .host_context
            .store(Arc::new(result.host_context.clone()));
        self.shared
            .host_info
            .store(Some(Arc::new(result.host_info.clone())));
        self.shared
            .host_capabilities
            .store(Arc::new(result.host_capabilities.clone()));
        let version = result
            .protocol_version
            .clone()
            .unwrap_or_else(|| params.protocol_version.clone());
        self.shared.protocol_version.store(Some(Arc::new(version)));

        // A teardown or channel loss during the handshake wins.
        if self.transition(LifecycleEvent::HandshakeSucceeded).is_err() {
            return Err(McpError::SessionClosed);
        }

        if let Err(e) = self.notify(methods::INITIALIZED, None).await {
            warn!(error = %e, "failed to send initialized notification");
        }
        info!(host = %result.host_info.name, "session ready");
        Ok(result)
    }

    fn start(&self) -> McpResult<()> {
        let weak: Weak<Shared> = Arc::downgrade(&self.shared);
        self.shared.adapter.start(move |event| {
            let weak = weak.clone();
            async move {
                if let Some(shared) = weak.upgrade() {
                    Session { shared }.handle_event(event).await;
                }
            }
        })
    }

    /// Sends a request and waits for its outcome
    ///
    /// Does not check the lifecycle state; [`crate::mcp::app::App`] does.
    /// When the deadline passes or the token fires, the entry is cancelled,
    /// `notifications/cancelled` is sent to the host and the caller gets
    /// [`McpError::Timeout`] or [`McpError::Cancelled`].
    #[instrument(skip(self, params, options), fields(session_id = %self.shared.session_id))]
    pub async fn request(
        &self,
        method: &str,
        params: Option<Value>,
        options: RequestOptions,
    ) -> McpResult<Value> {
        let _timer = telemetry::span_duration("session.request");

        let mut handle = lock(&self.shared.table).register(method)?;
        let id = handle.id().clone();

        let message: JsonRpcMessage = JsonRpcRequest::new(method, params, id.clone()).into();
        let sent = match protocol::encode(&message) {
            Ok(wire) => self.shared.adapter.send(wire).await,
            Err(e) => Err(e),
        };
        if let Err(e) = sent {
            lock(&self.shared.table).cancel(&id, e.clone());
            return Err(e);
        }
        debug!(%id, method, "request sent");

        let deadline = async {
            match options.timeout {
                Some(timeout) => tokio::time::sleep(timeout).await,
                None => std::future::pending::<()>().await,
            }
        };
        let cancelled = async {
            match &options.cancellation {
                Some(token) => token.cancelled().await,
                None => std::future::pending::<()>().await,
            }
        };

        let (reason, label) = tokio::select! {
            outcome = handle.receiver_mut() => {
                return outcome.unwrap_or(Err(McpError::SessionClosed));
            }
            _ = deadline => {
                let timeout = options.timeout.unwrap_or_default();
                (McpError::Timeout(timeout), format!("timed out after {}ms", timeout.as_millis()))
            }
            _ = cancelled => {
                (McpError::Cancelled("cancelled by caller".to_string()), "cancelled by caller".to_string())
            }
        };

        let cancelled_here = lock(&self.shared.table).cancel(&id, reason);
        if cancelled_here {
            debug!(%id, method = handle.method(), reason = %label, "request abandoned");
            self.send_cancelled(id, label).await;
        }
        // Either our cancellation or a response that raced it.
        handle.wait().await
    }

    async fn send_cancelled(&self, request_id: RequestId, reason: String) {
        let params = CancelledParams {
            request_id,
            reason: Some(reason),
        };
        let sent = match serde_json::to_value(&params) {
            Ok(params) => self.notify(methods::CANCELLED, Some(params)).await,
            Err(e) => Err(e.into()),
        };
        if let Err(e) = sent {
            debug!(error = %e, "could not notify host of cancellation");
        }
    }

    /// Sends a notification
    pub async fn notify(&self, method: &str, params: Option<Value>) -> McpResult<()> {
        let wire = protocol::encode(&JsonRpcNotification::new(method, params).into())?;
        self.shared.adapter.send(wire).await?;
        trace!(method, "notification sent");
        Ok(())
    }

    /// Closes the session locally
    pub async fn close(&self) {
        self.close_with(LifecycleEvent::Abort).await;
    }

    async fn close_with(&self, event: LifecycleEvent) {
        let closed = {
            let mut lifecycle = lock(&self.shared.lifecycle);
            let closed = !lifecycle.is_closed() && lifecycle.apply(event).is_ok();
            if closed {
                self.shared.state_tx.send_replace(SessionState::Closed);
            }
            closed
        };
        if !closed {
            return;
        }

        let rejected = lock(&self.shared.table).close(|| McpError::SessionClosed);
        self.shared.adapter.stop().await;
        telemetry::add_metric(
            "session.closed.rejected",
            rejected as f64,
            &[("event", format!("{:?}", event))],
        );
        info!(session_id = %self.shared.session_id, ?event, rejected, "session closed");
    }

    async fn handle_event(&self, event: ChannelEvent) {
        if lock(&self.shared.lifecycle).is_closed() {
            trace!("session closed, ignoring inbound event");
            return;
        }

        let value = match event {
            ChannelEvent::Closed => {
                warn!(session_id = %self.shared.session_id, "channel lost");
                self.close_with(LifecycleEvent::ChannelLost).await;
                return;
            }
            ChannelEvent::Message(value) => value,
        };

        match protocol::decode(value) {
            Err(failure) => {
                warn!(error = %failure, id = ?failure.id, "dropping malformed message");
                self.report(McpError::Parse(failure));
            }
            Ok(JsonRpcMessage::Response(response)) => self.handle_response(response),
            Ok(JsonRpcMessage::Notification(notification)) => {
                self.handle_notification(notification)
            }
            Ok(JsonRpcMessage::Request(request)) => self.handle_host_request(request).await,
        }
    }

    fn handle_response(&self, response: JsonRpcResponse) {
        let id = response.id.clone();
        let mut table = lock(&self.shared.table);
        match response.into_outcome() {
            Ok(result) => table.resolve(&id, result),
            Err(e) => table.reject(&id, e),
        };
    }

    fn handle_notification(&self, notification: JsonRpcNotification) {
        if notification.method == methods::HOST_CONTEXT_CHANGED {
            let params = notification.params.clone().unwrap_or_else(|| json!({}));
            match serde_json::from_value::<HostContext>(params) {
                Ok(context) => {
                    self.shared.host_context.store(Arc::new(context));
                    debug!("host context replaced");
                }
                Err(e) => {
                    // Handlers only ever see the context that is cached.
                    warn!(error = %e, "ignoring malformed host context");
                    self.report(McpError::Deserialization(format!("invalid host context: {}", e)));
                    return;
                }
            }
        }

        let handled = self
            .shared
            .router
            .dispatch_reporting(&notification, |e| self.report(e));
        trace!(method = %notification.method, handled, "notification dispatched");
    }

    async fn handle_host_request(&self, request: JsonRpcRequest) {
        debug!(id = %request.id, method = %request.method, "host request");
        match request.method.as_str() {
            methods::PING => {
                self.respond(JsonRpcResponse::success(json!({}), request.id))
                    .await;
            }
            methods::RESOURCE_TEARDOWN => {
                if self.shared.teardown_started.swap(true, Ordering::SeqCst) {
                    let error = JsonRpcError::invalid_request("teardown already in progress");
                    self.respond(JsonRpcResponse::error(error, request.id)).await;
                    return;
                }
                let params = request.params.unwrap_or_else(|| json!({}));
                let params = serde_json::from_value::<ResourceTeardownParams>(params)
                    .unwrap_or_default();
                let session = self.clone();
                tokio::spawn(async move {
                    let response = match session.run_teardown(params).await {
                        Ok(()) => JsonRpcResponse::success(json!({}), request.id),
                        Err(e) => {
                            warn!(error = %e, "teardown handler failed");
                            let response = JsonRpcResponse::error(
                                JsonRpcError::internal_error(&e.to_string()),
                                request.id,
                            );
                            session.report(e);
                            response
                        }
                    };
                    session.respond(response).await;
                    session.close_with(LifecycleEvent::Teardown).await;
                });
            }
            other => {
                warn!(method = other, "unsupported host request");
                let error = JsonRpcError::method_not_found(&format!("Method not found: {}", other));
                self.respond(JsonRpcResponse::error(error, request.id)).await;
            }
        }
    }

    async fn run_teardown(&self, params: ResourceTeardownParams) -> McpResult<()> {
        let handler = lock(&self.shared.teardown).clone();
        let Some(handler) = handler else {
            return Ok(());
        };
        match AssertUnwindSafe(handler(params)).catch_unwind().await {
            Ok(outcome) => outcome,
            Err(_) => {
                error!("teardown handler panicked");
                Err(McpError::HandlerPanicked("teardown handler panicked".to_string()))
            }
        }
    }

    async fn respond(&self, response: JsonRpcResponse) {
        let id = response.id.clone();
        let sent = match protocol::encode(&response.into()) {
            Ok(wire) => self.shared.adapter.send(wire).await,
            Err(e) => Err(e),
        };
        if let Err(e) = sent {
            warn!(%id, error = %e, "failed to answer host request");
            self.report(e);
        }
    }
}
