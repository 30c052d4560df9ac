//! Scripted host for integration tests

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use mcp_app_bridge::mcp::transport::{InboundStream, MemoryPort, MessagePort};
use mcp_app_bridge::{App, AppConfig, RequestOptions, SessionState};
use serde_json::{json, Value};
use tokio::time::timeout;

pub const APP_ORIGIN: &str = "app://under-test";
pub const HOST_ORIGIN: &str = "host://test";
pub const TEST_TIMEOUT: Duration = Duration::from_secs(30);

/// The host end of an app's channel
pub struct MockHost {
    pub port: Arc<MemoryPort>,
    inbound: InboundStream,
    pings: u64,
}

impl MockHost {
    /// An unconnected app and its host
    pub fn pair() -> (App, MockHost) {
        Self::pair_with(AppConfig::new("test-app", "0.0.1"))
    }

    /// An unconnected app built from `config` and its host
    pub fn pair_with(config: AppConfig) -> (App, MockHost) {
        let (app_port, host_port) = MemoryPort::pair(APP_ORIGIN, HOST_ORIGIN);
        let inbound = host_port.take_inbound().expect("fresh port");
        let app = App::new(config, Arc::new(app_port));
        (
            app,
            MockHost {
                port: Arc::new(host_port),
                inbound,
                pings: 0,
            },
        )
    }

    /// An app that has completed the handshake
    pub async fn connected() -> (App, MockHost) {
        let (app, mut host) = Self::pair();
        host.handshake(&app).await;
        (app, host)
    }

    /// Answers `ui/initialize` and swallows `ui/notifications/initialized`
    pub async fn handshake(&mut self, app: &App) {
        let connecting = tokio::spawn({
            let app = app.clone();
            async move { app.connect(RequestOptions::default()).await }
        });
        let request = self.expect_request("ui/initialize").await;
        self.respond(
            &request["id"],
            json!({
                "protocolVersion": "2025-06-18",
                "hostInfo": { "name": "Host", "version": "1.0.0" },
                "hostCapabilities": { "serverTools": {}, "openLinks": {} },
                "hostContext": { "safeAreaInsets": { "top": 0, "right": 0, "bottom": 0, "left": 0 } }
            }),
        )
        .await;
        connecting
            .await
            .expect("connect task")
            .expect("handshake succeeds");
        self.expect_notification("ui/notifications/initialized").await;
    }

    /// Next message the app posted
    pub async fn next(&mut self) -> Value {
        timeout(TEST_TIMEOUT, self.inbound.recv())
            .await
            .expect("host timed out waiting for the app")
            .expect("app closed its port")
            .data
    }

    /// Next message, which must be a request for `method`
    pub async fn expect_request(&mut self, method: &str) -> Value {
        let message = self.next().await;
        assert_eq!(message["method"], method, "unexpected message: {}", message);
        assert!(message.get("id").is_some(), "expected a request: {}", message);
        message
    }

    /// Next message, which must be a notification for `method`
    pub async fn expect_notification(&mut self, method: &str) -> Value {
        let message = self.next().await;
        assert_eq!(message["method"], method, "unexpected message: {}", message);
        assert!(message.get("id").is_none(), "expected a notification: {}", message);
        message
    }

    /// Nothing arrives within a short window
    pub async fn assert_silent(&mut self) {
        if let Ok(Some(message)) = timeout(Duration::from_millis(50), self.inbound.recv()).await {
            panic!("expected silence, got {}", message.data);
        }
    }

    /// Round-trips a `ping`
    ///
    /// The app handles inbound messages in order, so everything sent before
    /// this has been processed once it returns. Fails if the app posts
    /// anything else first.
    pub async fn barrier(&mut self) {
        self.pings += 1;
        let id = json!(format!("barrier-{}", self.pings));
        self.request(id.clone(), "ping", json!({})).await;
        let pong = self.next().await;
        assert_eq!(pong, json!({ "jsonrpc": "2.0", "id": id, "result": {} }));
    }

    /// Whether the app has closed its side
    pub async fn app_hung_up(&mut self) -> bool {
        matches!(timeout(TEST_TIMEOUT, self.inbound.recv()).await, Ok(None))
    }

    pub async fn send(&self, message: Value) {
        self.port.post_message(message).await.expect("post to app");
    }

    pub async fn respond(&self, id: &Value, result: Value) {
        self.send(json!({ "jsonrpc": "2.0", "id": id, "result": result }))
            .await;
    }

    pub async fn respond_error(&self, id: &Value, code: i64, message: &str) {
        self.send(json!({ "jsonrpc": "2.0", "id": id, "error": { "code": code, "message": message } }))
            .await;
    }

    pub async fn notify(&self, method: &str, params: Value) {
        self.send(json!({ "jsonrpc": "2.0", "method": method, "params": params }))
            .await;
    }

    pub async fn request(&self, id: Value, method: &str, params: Value) {
        self.send(json!({ "jsonrpc": "2.0", "id": id, "method": method, "params": params }))
            .await;
    }
}

/// Waits until `app` reports `state`
pub async fn wait_for_state(app: &App, state: SessionState) {
    let mut states = app.state_changes();
    timeout(TEST_TIMEOUT, async {
        while *states.borrow_and_update() != state {
            states.changed().await.expect("session dropped");
        }
    })
    .await
    .expect("state never reached");
}
