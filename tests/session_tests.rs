mod common;

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use common::{wait_for_state, MockHost, HOST_ORIGIN};
use mcp_app_bridge::mcp::tools::CallToolParams;
use mcp_app_bridge::mcp::transport::MessagePort;
use mcp_app_bridge::mcp::types::RequestId;
use mcp_app_bridge::mcp::ui::{MessageParams, ResourceTeardownParams, ToolInputParams};
use mcp_app_bridge::{AppConfig, McpError, McpResult, RequestOptions, SessionState};
use rand::seq::SliceRandom;
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

#[tokio::test]
async fn test_handshake_reaches_ready_and_sends_initialized() -> McpResult<()> {
    let (app, mut host) = MockHost::pair();
    let mut states = app.state_changes();
    assert_eq!(app.state(), SessionState::Uninitialized);

    let connecting = tokio::spawn({
        let app = app.clone();
        async move { app.connect(RequestOptions::default()).await }
    });

    let request = host.expect_request("ui/initialize").await;
    assert_eq!(request["params"]["appCapabilities"], json!({}));
    assert_eq!(request["params"]["protocolVersion"], "2025-06-18");

    // Nothing issued before readiness reaches the host.
    states.changed().await.unwrap();
    assert_eq!(*states.borrow(), SessionState::Initializing);
    let early = app
        .call_server_tool(CallToolParams::new("get-time"), RequestOptions::default())
        .await;
    assert!(matches!(early, Err(McpError::NotReady(SessionState::Initializing))));

    host.respond(
        &request["id"],
        json!({
            "hostInfo": { "name": "Host" },
            "hostContext": { "safeAreaInsets": { "top": 0, "right": 0, "bottom": 0, "left": 0 } }
        }),
    )
    .await;

    let result = connecting.await.unwrap()?;
    assert_eq!(result.host_info.name, "Host");
    assert_eq!(app.state(), SessionState::Ready);
    assert_eq!(app.host_info().unwrap().name, "Host");
    assert_eq!(app.host_context().safe_area_insets.unwrap().top, 0.0);
    // The host did not pick a version, so the requested one stands.
    assert_eq!(app.protocol_version().as_deref(), Some("2025-06-18"));

    host.expect_notification("ui/notifications/initialized").await;
    host.assert_silent().await;
    Ok(())
}

#[tokio::test]
async fn test_second_connect_is_invalid_state() {
    let (app, mut host) = MockHost::connected().await;
    let err = app.connect(RequestOptions::default()).await.unwrap_err();
    assert!(matches!(err, McpError::InvalidState(_)));
    assert_eq!(app.state(), SessionState::Ready);
    host.assert_silent().await;
}

#[tokio::test]
async fn test_tool_call_resolves_with_result() -> McpResult<()> {
    let (app, mut host) = MockHost::connected().await;

    let call = tokio::spawn({
        let app = app.clone();
        async move {
            app.call_server_tool(CallToolParams::new("get-time"), RequestOptions::default())
                .await
        }
    });

    let request = host.expect_request("tools/call").await;
    assert_eq!(request["params"], json!({ "name": "get-time" }));
    host.respond(&request["id"], json!({ "content": [{ "type": "text", "text": "12:00" }] }))
        .await;

    let result = call.await.unwrap()?;
    assert_eq!(result.first_text(), Some("12:00"));
    assert!(app.pending_requests().is_empty());
    Ok(())
}

#[tokio::test]
async fn test_tool_call_error_response_is_remote_error() {
    let (app, mut host) = MockHost::connected().await;

    let call = tokio::spawn({
        let app = app.clone();
        async move {
            app.call_server_tool(CallToolParams::new("get-time"), RequestOptions::default())
                .await
        }
    });

    let request = host.expect_request("tools/call").await;
    host.send(json!({ "jsonrpc": "2.0", "id": request["id"], "error": { "message": "boom" } }))
        .await;

    match call.await.unwrap() {
        Err(McpError::Remote { message, code, .. }) => {
            assert_eq!(message, "boom");
            assert_eq!(code, 0);
        }
        other => panic!("expected remote error, got {:?}", other),
    }
    assert_eq!(app.state(), SessionState::Ready);
}

#[tokio::test(start_paused = true)]
async fn test_timeout_drops_late_response() {
    let (app, mut host) = MockHost::connected().await;

    let call = tokio::spawn({
        let app = app.clone();
        async move {
            app.send_message(
                MessageParams::user_text("hello"),
                RequestOptions::with_timeout(Duration::from_millis(5000)),
            )
            .await
        }
    });

    let request = host.expect_request("ui/message").await;
    let id = request["id"].clone();

    let err = call.await.unwrap().unwrap_err();
    assert!(matches!(err, McpError::Timeout(d) if d == Duration::from_millis(5000)));

    let cancelled = host.expect_notification("notifications/cancelled").await;
    assert_eq!(cancelled["params"]["requestId"], id);
    assert!(app.pending_requests().is_empty());

    // Late response for the abandoned id is unmatched and harmless.
    host.respond(&id, json!({})).await;

    let follow_up = tokio::spawn({
        let app = app.clone();
        async move {
            app.send_message(MessageParams::user_text("again"), RequestOptions::default())
                .await
        }
    });
    let request = host.expect_request("ui/message").await;
    assert_ne!(request["id"], id);
    host.respond(&request["id"], json!({ "isError": false })).await;
    assert!(!follow_up.await.unwrap().unwrap().is_error);
    assert_eq!(app.state(), SessionState::Ready);
}

#[tokio::test]
async fn test_host_context_snapshot_replaces_previous() {
    let (app, host) = MockHost::connected().await;
    let (tx, mut rx) = mpsc::unbounded_channel();
    app.on_host_context_changed(move |ctx| {
        let _ = tx.send(ctx);
    });

    host.notify(
        "ui/notifications/host-context-changed",
        json!({ "theme": "dark", "safeAreaInsets": { "top": 10, "right": 0, "bottom": 0, "left": 0 } }),
    )
    .await;
    let first = rx.recv().await.unwrap();
    assert_eq!(first.theme.as_deref(), Some("dark"));

    host.notify(
        "ui/notifications/host-context-changed",
        json!({ "safeAreaInsets": { "top": 20, "right": 1, "bottom": 2, "left": 3 } }),
    )
    .await;
    let second = rx.recv().await.unwrap();

    let cached = app.host_context();
    assert_eq!(*cached, second);
    assert_eq!(cached.safe_area_insets.unwrap().top, 20.0);
    assert_eq!(cached.safe_area_insets.unwrap().left, 3.0);
    assert!(cached.theme.is_none(), "second snapshot must supersede the first");
}

#[tokio::test]
async fn test_permuted_responses_reach_their_callers() {
    let (app, mut host) = MockHost::connected().await;
    const N: usize = 16;

    let calls: Vec<_> = (0..N)
        .map(|i| {
            let app = app.clone();
            tokio::spawn(async move {
                let result = app
                    .call_server_tool(
                        CallToolParams::new(format!("tool-{}", i)),
                        RequestOptions::default(),
                    )
                    .await?;
                Ok::<_, McpError>((i, result))
            })
        })
        .collect();

    let mut requests = Vec::with_capacity(N);
    for _ in 0..N {
        requests.push(host.expect_request("tools/call").await);
    }
    assert_eq!(app.pending_requests().len(), N);

    requests.shuffle(&mut rand::thread_rng());
    for request in &requests {
        let name = request["params"]["name"].clone();
        host.respond(&request["id"], json!({ "content": [{ "type": "text", "text": name }] }))
            .await;
    }

    for call in calls {
        let (i, result) = call.await.unwrap().unwrap();
        assert_eq!(result.first_text(), Some(format!("tool-{}", i).as_str()));
    }
    assert!(app.pending_requests().is_empty());
}

#[tokio::test]
async fn test_unknown_and_malformed_messages_are_dropped() {
    let (app, mut host) = MockHost::connected().await;

    let call = tokio::spawn({
        let app = app.clone();
        async move {
            app.call_server_tool(CallToolParams::new("slow"), RequestOptions::default())
                .await
        }
    });
    let request = host.expect_request("tools/call").await;
    let id = request["id"].clone();

    // Unknown id, both result and error, no version, a batch, a scalar.
    host.respond(&json!(999), json!({})).await;
    host.send(json!({ "jsonrpc": "2.0", "id": id, "result": {}, "error": { "message": "x" } }))
        .await;
    host.send(json!({ "id": id, "result": {} })).await;
    host.send(json!([{ "jsonrpc": "2.0", "id": id, "result": {} }])).await;
    host.send(json!(42)).await;

    host.barrier().await;
    assert_eq!(app.pending_requests().len(), 1);
    assert_eq!(app.state(), SessionState::Ready);

    host.respond(&id, json!({ "content": [] })).await;
    assert!(call.await.unwrap().is_ok());
}

#[tokio::test]
async fn test_cancelling_one_request_leaves_others_alone() {
    let (app, mut host) = MockHost::connected().await;
    let token = CancellationToken::new();

    let doomed = tokio::spawn({
        let app = app.clone();
        let token = token.clone();
        async move {
            app.call_server_tool(
                CallToolParams::new("a"),
                RequestOptions::with_cancellation(token),
            )
            .await
        }
    });
    let doomed_request = host.expect_request("tools/call").await;

    let survivor = tokio::spawn({
        let app = app.clone();
        async move {
            app.call_server_tool(CallToolParams::new("b"), RequestOptions::default())
                .await
        }
    });
    let survivor_request = host.expect_request("tools/call").await;

    token.cancel();
    assert!(matches!(doomed.await.unwrap(), Err(McpError::Cancelled(_))));
    let cancelled = host.expect_notification("notifications/cancelled").await;
    assert_eq!(cancelled["params"]["requestId"], doomed_request["id"]);

    host.respond(&survivor_request["id"], json!({ "content": [{ "type": "text", "text": "b" }] }))
        .await;
    assert_eq!(survivor.await.unwrap().unwrap().first_text(), Some("b"));
    assert_eq!(app.state(), SessionState::Ready);
}

#[tokio::test]
async fn test_close_rejects_every_pending_request_once() {
    let (app, mut host) = MockHost::connected().await;

    let calls: Vec<_> = (0..3)
        .map(|i| {
            let app = app.clone();
            tokio::spawn(async move {
                app.call_server_tool(CallToolParams::new(format!("t{}", i)), RequestOptions::default())
                    .await
            })
        })
        .collect();
    for _ in 0..3 {
        host.expect_request("tools/call").await;
    }

    app.close().await;
    app.close().await;

    for call in calls {
        assert!(matches!(call.await.unwrap(), Err(McpError::SessionClosed)));
    }
    assert_eq!(app.state(), SessionState::Closed);
    assert!(app.pending_requests().is_empty());
    assert!(matches!(
        app.call_server_tool(CallToolParams::new("late"), RequestOptions::default())
            .await,
        Err(McpError::NotReady(SessionState::Closed))
    ));
    assert!(host.app_hung_up().await);
}

#[tokio::test]
async fn test_resource_teardown_runs_callback_and_closes() {
    let (app, mut host) = MockHost::connected().await;
    let torn_down = Arc::new(AtomicBool::new(false));
    let (params_tx, mut params_rx) = mpsc::unbounded_channel::<ResourceTeardownParams>();
    app.on_teardown({
        let torn_down = torn_down.clone();
        move |params| {
            let torn_down = torn_down.clone();
            let _ = params_tx.send(params);
            async move {
                torn_down.store(true, Ordering::SeqCst);
                Ok(())
            }
        }
    });

    let pending = tokio::spawn({
        let app = app.clone();
        async move {
            app.call_server_tool(CallToolParams::new("never"), RequestOptions::default())
                .await
        }
    });
    host.expect_request("tools/call").await;

    host.request(json!("teardown-1"), "ui/resource-teardown", json!({ "reason": "navigate" }))
        .await;
    let response = host.next().await;
    assert_eq!(response["id"], "teardown-1");
    assert_eq!(response["result"], json!({}));

    assert!(torn_down.load(Ordering::SeqCst));
    let params = params_rx.recv().await.unwrap();
    assert_eq!(params.extra.get("reason"), Some(&json!("navigate")));
    assert!(matches!(pending.await.unwrap(), Err(McpError::SessionClosed)));
    wait_for_state(&app, SessionState::Closed).await;
}

#[tokio::test]
async fn test_teardown_callback_can_still_call_the_host() {
    let (app, mut host) = MockHost::connected().await;
    let (outcome_tx, mut outcome_rx) = mpsc::unbounded_channel();
    app.on_teardown({
        let app = app.clone();
        move |_params| {
            let app = app.clone();
            let outcome_tx = outcome_tx.clone();
            async move {
                let saved = app
                    .send_message(
                        MessageParams::user_text("saving before close"),
                        RequestOptions::with_timeout(Duration::from_secs(5)),
                    )
                    .await;
                let _ = outcome_tx.send(saved.map(|result| result.is_error));
                Ok(())
            }
        }
    });

    host.request(json!("teardown-2"), "ui/resource-teardown", json!({})).await;

    // The callback's request goes out before the teardown is answered.
    let request = host.expect_request("ui/message").await;
    host.respond(&request["id"], json!({ "isError": false })).await;

    let response = host.next().await;
    assert_eq!(response["id"], "teardown-2");
    assert_eq!(response["result"], json!({}));
    assert!(matches!(outcome_rx.recv().await.unwrap(), Ok(false)));
    wait_for_state(&app, SessionState::Closed).await;
}

#[tokio::test]
async fn test_second_teardown_while_running_is_refused() {
    let (app, mut host) = MockHost::connected().await;
    let release = Arc::new(tokio::sync::Notify::new());
    let calls = Arc::new(AtomicUsize::new(0));
    app.on_teardown({
        let release = release.clone();
        let calls = calls.clone();
        move |_params| {
            let release = release.clone();
            calls.fetch_add(1, Ordering::SeqCst);
            async move {
                release.notified().await;
                Ok(())
            }
        }
    });

    host.request(json!(1), "ui/resource-teardown", json!({})).await;
    host.request(json!(2), "ui/resource-teardown", json!({})).await;

    let refused = host.next().await;
    assert_eq!(refused["id"], 2);
    assert_eq!(refused["error"]["code"], -32600);

    release.notify_one();
    let response = host.next().await;
    assert_eq!(response["id"], 1);
    assert_eq!(response["result"], json!({}));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    wait_for_state(&app, SessionState::Closed).await;
}

#[tokio::test]
async fn test_failing_teardown_callback_reports_error() {
    let (app, mut host) = MockHost::connected().await;
    app.on_teardown(|_params| async { Err(McpError::InvalidState("unsaved work".into())) });
    let (errors_tx, mut errors_rx) = mpsc::unbounded_channel();
    app.on_error(move |e| {
        let _ = errors_tx.send(e);
    });

    host.request(json!(7), "ui/resource-teardown", json!({})).await;
    let response = host.next().await;
    assert_eq!(response["id"], 7);
    assert_eq!(response["error"]["code"], -32603);
    assert!(response["error"]["message"]
        .as_str()
        .unwrap()
        .contains("unsaved work"));
    assert!(matches!(errors_rx.recv().await, Some(McpError::InvalidState(m)) if m == "unsaved work"));
    wait_for_state(&app, SessionState::Closed).await;
}

#[tokio::test]
async fn test_malformed_messages_reach_error_handler() {
    let (app, mut host) = MockHost::connected().await;
    let (errors_tx, mut errors_rx) = mpsc::unbounded_channel();
    app.on_error(move |e| {
        let _ = errors_tx.send(e);
    });

    host.send(json!(42)).await;
    host.send(json!({ "jsonrpc": "2.0", "id": 3, "result": {}, "error": { "message": "x" } }))
        .await;
    // Unmatched responses are not faults.
    host.respond(&json!(999), json!({})).await;
    host.barrier().await;

    let mut reported = Vec::new();
    while let Ok(e) = errors_rx.try_recv() {
        reported.push(e);
    }
    assert_eq!(reported.len(), 2, "reported: {:?}", reported);
    assert!(reported.iter().all(|e| matches!(e, McpError::Parse(_))));
    match &reported[1] {
        McpError::Parse(failure) => assert_eq!(failure.id, Some(RequestId::Number(3))),
        other => panic!("expected a parse failure, got {:?}", other),
    }
    assert_eq!(app.state(), SessionState::Ready);
}

#[tokio::test]
async fn test_handler_faults_reach_error_handler() {
    let (app, mut host) = MockHost::connected().await;
    let (errors_tx, mut errors_rx) = mpsc::unbounded_channel();
    app.on_error(move |e| {
        let _ = errors_tx.send(e);
    });
    let contexts = Arc::new(AtomicUsize::new(0));
    app.on_host_context_changed({
        let contexts = contexts.clone();
        move |_| {
            contexts.fetch_add(1, Ordering::SeqCst);
        }
    });
    let _failing = app.on_notification("custom/fail", |_| {
        Err(McpError::InvalidParams("missing field".into()))
    });
    let _panicking = app.on_notification("custom/fail", |_| panic!("handler blew up"));

    host.notify("custom/fail", json!({})).await;
    host.notify("ui/notifications/host-context-changed", json!({ "theme": 5 }))
        .await;
    host.barrier().await;

    let mut reported = Vec::new();
    while let Ok(e) = errors_rx.try_recv() {
        reported.push(e);
    }
    assert_eq!(reported.len(), 3, "reported: {:?}", reported);
    assert!(matches!(&reported[0], McpError::InvalidParams(m) if m == "missing field"));
    assert!(matches!(&reported[1], McpError::HandlerPanicked(m) if m.contains("handler blew up")));
    assert!(matches!(&reported[2], McpError::Deserialization(m) if m.contains("host context")));

    // The malformed snapshot neither replaced the cache nor reached handlers.
    assert_eq!(contexts.load(Ordering::SeqCst), 0);
    assert_eq!(app.host_context().safe_area_insets.unwrap().top, 0.0);
    assert_eq!(app.state(), SessionState::Ready);
}

#[tokio::test]
async fn test_partial_safe_area_insets_replace_context() {
    let (app, mut host) = MockHost::connected().await;

    host.notify(
        "ui/notifications/host-context-changed",
        json!({ "theme": "dark", "safeAreaInsets": { "top": 24 } }),
    )
    .await;
    host.barrier().await;

    let cached = app.host_context();
    assert_eq!(cached.theme.as_deref(), Some("dark"));
    let insets = cached.safe_area_insets.unwrap();
    assert_eq!((insets.top, insets.right, insets.bottom, insets.left), (24.0, 0.0, 0.0, 0.0));
}

#[tokio::test]
async fn test_ping_and_unknown_host_requests() {
    let (app, mut host) = MockHost::connected().await;

    host.request(json!(1), "ping", json!({})).await;
    let pong = host.next().await;
    assert_eq!(pong, json!({ "jsonrpc": "2.0", "id": 1, "result": {} }));

    host.request(json!("x"), "ui/does-not-exist", json!({})).await;
    let response = host.next().await;
    assert_eq!(response["id"], "x");
    assert_eq!(response["error"]["code"], -32601);
    assert_eq!(app.state(), SessionState::Ready);
}

#[tokio::test]
async fn test_messages_from_other_origins_are_ignored() {
    let (app, mut host) = MockHost::pair_with(
        AppConfig::new("filtered", "1.0.0").with_peer_origin(HOST_ORIGIN),
    );

    let connecting = tokio::spawn({
        let app = app.clone();
        async move { app.connect(RequestOptions::default()).await }
    });
    let request = host.expect_request("ui/initialize").await;
    let forged = json!({
        "jsonrpc": "2.0",
        "id": request["id"],
        "result": { "hostInfo": { "name": "Impostor" } }
    });
    host.port.post_from("https://evil.example", forged).await.unwrap();

    host.barrier().await;
    assert_eq!(app.state(), SessionState::Initializing);

    host.respond(&request["id"], json!({ "hostInfo": { "name": "Real" } }))
        .await;
    let result = connecting.await.unwrap().unwrap();
    assert_eq!(result.host_info.name, "Real");
}

#[tokio::test]
async fn test_channel_loss_closes_session() {
    let (app, mut host) = MockHost::connected().await;
    let mut states = app.state_changes();

    let pending = tokio::spawn({
        let app = app.clone();
        async move {
            app.call_server_tool(CallToolParams::new("x"), RequestOptions::default())
                .await
        }
    });
    host.expect_request("tools/call").await;

    host.port.close().await.unwrap();

    assert!(matches!(pending.await.unwrap(), Err(McpError::SessionClosed)));
    while *states.borrow_and_update() != SessionState::Closed {
        states.changed().await.unwrap();
    }
    assert_eq!(app.state(), SessionState::Closed);
}

#[tokio::test]
async fn test_typed_notifications_reach_handlers_in_order() {
    let (app, host) = MockHost::pair();
    let (tx, mut rx) = mpsc::unbounded_channel::<String>();

    // Registered before connect.
    app.on_tool_input({
        let tx = tx.clone();
        move |input: ToolInputParams| {
            let _ = tx.send(format!("input:{}", input.arguments["city"]));
        }
    });
    app.on_tool_input_partial({
        let tx = tx.clone();
        move |input| {
            let _ = tx.send(format!("partial:{}", input.arguments.len()));
        }
    });
    app.on_tool_result({
        let tx = tx.clone();
        move |result| {
            let _ = tx.send(format!("result:{}", result.first_text().unwrap_or_default()));
        }
    });
    app.on_tool_cancelled({
        let tx = tx.clone();
        move |cancelled| {
            let _ = tx.send(format!("cancelled:{}", cancelled.reason.unwrap_or_default()));
        }
    });
    let raw_hits = Arc::new(AtomicUsize::new(0));
    let raw = app.on_notification("custom/ping", {
        let raw_hits = raw_hits.clone();
        move |params: Option<Value>| {
            assert_eq!(params, Some(json!({ "n": 1 })));
            raw_hits.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    });

    let mut host = host;
    host.handshake(&app).await;

    host.notify("ui/notifications/tool-input-partial", json!({ "arguments": { "c": 1 } }))
        .await;
    host.notify("ui/notifications/tool-input", json!({ "arguments": { "city": "Oslo" } }))
        .await;
    // A payload that does not fit the type is logged and skipped.
    host.notify("ui/notifications/tool-result", json!({ "content": "oops" }))
        .await;
    host.notify(
        "ui/notifications/tool-result",
        json!({ "content": [{ "type": "text", "text": "sunny" }] }),
    )
    .await;
    host.notify("ui/notifications/tool-cancelled", json!({ "reason": "user" }))
        .await;
    host.notify("custom/ping", json!({ "n": 1 })).await;

    let mut seen = Vec::new();
    for _ in 0..4 {
        seen.push(rx.recv().await.unwrap());
    }
    assert_eq!(
        seen,
        vec!["partial:1", "input:\"Oslo\"", "result:sunny", "cancelled:user"]
    );

    host.barrier().await;
    assert_eq!(raw_hits.load(Ordering::SeqCst), 1);
    assert!(raw.unsubscribe());

    host.notify("custom/ping", json!({ "n": 1 })).await;
    host.barrier().await;
    assert_eq!(raw_hits.load(Ordering::SeqCst), 1);
    assert_eq!(app.state(), SessionState::Ready);
}
