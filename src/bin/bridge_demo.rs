use std::sync::Arc;

use anyhow::Result;
use colored::Colorize;
use serde_json::{json, Value};
use tokio::time::Duration;

use mcp_app_bridge::config::get_settings;
use mcp_app_bridge::mcp::resources::{ReadResourceParams, ResourceContents};
use mcp_app_bridge::mcp::tools::CallToolParams;
use mcp_app_bridge::mcp::transport::{InboundStream, MemoryPort, MessagePort};
use mcp_app_bridge::mcp::ui::{LoggingMessageParams, MessageParams, OpenLinkParams, SizeChangedParams};
use mcp_app_bridge::telemetry::{init_telemetry, TelemetryConfig};
use mcp_app_bridge::{App, AppConfig, RequestOptions};

const APP_ORIGIN: &str = "app://clock";
const HOST_ORIGIN: &str = "host://demo";

/// Plays the host: answers requests and pushes a few notifications
async fn run_host(host: Arc<MemoryPort>, mut inbound: InboundStream) -> Result<()> {
    while let Some(message) = inbound.recv().await {
        let data = message.data;
        let method = data["method"].as_str().unwrap_or_default().to_string();
        let id = data.get("id").cloned();
        println!("  {} {}", "host <-".dimmed(), method.cyan());

        let Some(id) = id else {
            if method == "ui/notifications/initialized" {
                push(&host, "ui/notifications/tool-input", json!({ "arguments": { "tz": "UTC" } })).await?;
                push(
                    &host,
                    "ui/notifications/tool-result",
                    json!({ "content": [{ "type": "text", "text": "launched" }] }),
                )
                .await?;
                push(&host, "ui/notifications/host-context-changed", json!({ "theme": "dark" })).await?;
            }
            continue;
        };

        let result = match method.as_str() {
            "ui/initialize" => json!({
                "protocolVersion": "2025-06-18",
                "hostInfo": { "name": "demo-host", "version": "0.1.0" },
                "hostCapabilities": { "openLinks": {}, "serverTools": {} },
                "hostContext": { "theme": "light", "locale": "en-US" }
            }),
            "tools/call" => json!({
                "content": [{ "type": "text", "text": chrono::Utc::now().to_rfc3339() }]
            }),
            "resources/read" => json!({
                "contents": [{ "uri": data["params"]["uri"], "mimeType": "text/plain", "blob": "aGVsbG8gZnJvbSB0aGUgaG9zdA==" }]
            }),
            "ui/message" | "ui/open-link" => json!({}),
            _ => {
                reply(&host, json!({ "jsonrpc": "2.0", "id": id, "error": { "code": -32601, "message": "Method not found" } })).await?;
                continue;
            }
        };
        reply(&host, json!({ "jsonrpc": "2.0", "id": id, "result": result })).await?;
    }
    Ok(())
}

async fn push(host: &MemoryPort, method: &str, params: Value) -> Result<()> {
    host.post_message(json!({ "jsonrpc": "2.0", "method": method, "params": params }))
        .await?;
    Ok(())
}

async fn reply(host: &MemoryPort, response: Value) -> Result<()> {
    host.post_message(response).await?;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let settings = get_settings(None)?;
    let _ = init_telemetry(TelemetryConfig::from_logger("bridge_demo", &settings.logger));

    println!("{}", "MCP App Bridge Demo".bold().green());
    println!("{}", "=".repeat(50));

    let (app_port, host_port) = MemoryPort::pair(APP_ORIGIN, HOST_ORIGIN);
    let host_inbound = host_port.take_inbound()?;
    let host_task = tokio::spawn(run_host(Arc::new(host_port), host_inbound));

    let config = AppConfig::from_settings(&settings).with_peer_origin(HOST_ORIGIN);
    let app = App::new(config, Arc::new(app_port));

    app.on_tool_input(|input| {
        println!("  {} tool input {:?}", "app ->".dimmed(), input.arguments);
    });
    app.on_tool_result(|result| {
        println!("  {} tool result {:?}", "app ->".dimmed(), result.first_text());
    });
    app.on_host_context_changed(|ctx| {
        println!("  {} theme is now {}", "app ->".dimmed(), ctx.theme.unwrap_or_default().yellow());
    });

    let init = app.connect(RequestOptions::default()).await?;
    println!(
        "\n{} {} {}",
        "Connected to".bold(),
        init.host_info.name.bold(),
        format!("(protocol {})", app.protocol_version().unwrap_or_default()).dimmed()
    );

    let options = RequestOptions::with_timeout(Duration::from_secs(2));

    let time = app
        .call_server_tool(CallToolParams::new("get-time"), options.clone())
        .await?;
    println!("{} {}", "Server time:".bold(), time.first_text().unwrap_or("?"));

    let contents = app
        .read_server_resource(ReadResourceParams::new("ui://clock/greeting"), options.clone())
        .await?;
    for content in &contents.contents {
        if let ResourceContents::Binary(binary) = content {
            println!("{} {}", "Resource:".bold(), String::from_utf8_lossy(&binary.decode_blob()?));
        }
    }

    app.send_log(LoggingMessageParams::info("demo is running")).await?;
    app.send_size_changed(SizeChangedParams { width: Some(480.0), height: Some(320.0) })
        .await?;
    app.send_message(MessageParams::user_text("What time is it in Tokyo?"), options.clone())
        .await?;
    app.open_link(OpenLinkParams::new("https://modelcontextprotocol.io")?, options.clone())
        .await?;

    match app
        .request::<Value>("ui/unknown", None, options)
        .await
    {
        Ok(v) => println!("{} {}", "Unexpected:".bold().red(), v),
        Err(e) => println!("{} {}", "Expected error:".bold().yellow(), e),
    }

    tokio::time::sleep(Duration::from_millis(50)).await;
    println!(
        "\n{} {}",
        "Theme after notifications:".bold(),
        app.host_context().theme.clone().unwrap_or_default()
    );

    app.close().await;
    println!("{} {}", "Final state:".bold(), app.state().to_string().green());

    // Closing the app ends the host's inbound stream.
    host_task.await??;
    Ok(())
}
