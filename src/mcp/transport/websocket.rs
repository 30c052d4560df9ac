//! WebSocket message port
//!
//! For hosts that relay the app channel over a socket instead of an in-page
//! primitive. Each text frame carries one JSON value. The origin of every
//! inbound message is the origin of the URL that was dialled.

use std::fmt;
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::Message as WsMessage};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use url::Url;

use super::{InboundMessage, InboundStream, MessagePort};
use crate::utils::error::{McpError, McpResult};

/// Message port over one WebSocket connection
pub struct WebSocketPort {
    url: Url,
    outbound: mpsc::UnboundedSender<WsMessage>,
    inbound: Mutex<Option<InboundStream>>,
    cancel: CancellationToken,
}

impl fmt::Debug for WebSocketPort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WebSocketPort")
            .field("url", &self.url.as_str())
            .field("closed", &self.cancel.is_cancelled())
            .finish_non_exhaustive()
    }
}

impl WebSocketPort {
    /// Dials `url` and starts the socket reader and writer tasks
    pub async fn connect(url: &str) -> McpResult<Self> {
        let url = Url::parse(url)
            .map_err(|e| McpError::Config(format!("Invalid WebSocket URL {}: {}", url, e)))?;
        info!("Connecting to WebSocket at {}", url);

        let (ws_stream, _) = connect_async(url.as_str())
            .await
            .map_err(|e| McpError::ChannelClosed(format!("Failed to connect to {}: {}", url, e)))?;
        let (mut sink, mut stream) = ws_stream.split();

        let origin = url.origin().ascii_serialization();
        let cancel = CancellationToken::new();
        let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<WsMessage>();
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();

        let writer_cancel = cancel.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = writer_cancel.cancelled() => {
                        let _ = sink.send(WsMessage::Close(None)).await;
                        break;
                    }
                    next = outbound_rx.recv() => {
                        let Some(frame) = next else { break };
                        if let Err(e) = sink.send(frame).await {
                            error!("WebSocket send failed: {}", e);
                            break;
                        }
                    }
                }
            }
            debug!("WebSocket writer finished");
        });

        let reader_cancel = cancel.clone();
        tokio::spawn(async move {
            loop {
                let frame = tokio::select! {
                    _ = reader_cancel.cancelled() => break,
                    frame = stream.next() => frame,
                };
                let data = match frame {
                    Some(Ok(WsMessage::Text(text))) => serde_json::from_str::<Value>(&text),
                    Some(Ok(WsMessage::Binary(bytes))) => serde_json::from_slice::<Value>(&bytes),
                    Some(Ok(WsMessage::Close(_))) | None => break,
                    Some(Ok(_)) => continue,
                    Some(Err(e)) => {
                        error!("WebSocket receive failed: {}", e);
                        break;
                    }
                };
                match data {
                    Ok(data) => {
                        let message = InboundMessage {
                            origin: origin.clone(),
                            data,
                        };
                        if inbound_tx.send(message).is_err() {
                            break;
                        }
                    }
                    Err(e) => warn!("Dropping WebSocket frame that is not JSON: {}", e),
                }
            }
            // Dropping the sender ends the inbound stream.
            debug!("WebSocket reader finished");
        });

        Ok(Self {
            url,
            outbound: outbound_tx,
            inbound: Mutex::new(Some(inbound_rx)),
            cancel,
        })
    }

    /// The URL this port is connected to
    pub fn url(&self) -> &Url {
        &self.url
    }
}

#[async_trait]
impl MessagePort for WebSocketPort {
    async fn post_message(&self, message: Value) -> McpResult<()> {
        if self.cancel.is_cancelled() {
            return Err(McpError::ChannelClosed("WebSocket is closed".to_string()));
        }
        let text = serde_json::to_string(&message)?;
        self.outbound
            .send(WsMessage::Text(text))
            .map_err(|_| McpError::ChannelClosed("WebSocket writer stopped".to_string()))
    }

    fn take_inbound(&self) -> McpResult<InboundStream> {
        self.inbound
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .ok_or_else(|| McpError::InvalidState("inbound stream already taken".to_string()))
    }

    async fn close(&self) -> McpResult<()> {
        self.cancel.cancel();
        Ok(())
    }
}
