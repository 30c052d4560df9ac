//! In-process message port pair.
//!
//! Each side's posts arrive on the other side's inbound stream tagged with the
//! poster's origin. Closing one side ends the other side's stream, which is how
//! tests and the demo binary simulate the host going away.

use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::trace;

use super::{InboundMessage, InboundStream, MessagePort};
use crate::utils::error::{McpError, McpResult};

/// One end of an in-process channel
#[derive(Debug)]
pub struct MemoryPort {
    origin: String,
    outbound: Mutex<Option<mpsc::UnboundedSender<InboundMessage>>>,
    inbound: Mutex<Option<InboundStream>>,
}

impl MemoryPort {
    /// Creates two connected ports; the first is usually the app's
    pub fn pair(app_origin: &str, host_origin: &str) -> (MemoryPort, MemoryPort) {
        let (to_host, host_inbound) = mpsc::unbounded_channel();
        let (to_app, app_inbound) = mpsc::unbounded_channel();
        let app = MemoryPort {
            origin: app_origin.to_string(),
            outbound: Mutex::new(Some(to_host)),
            inbound: Mutex::new(Some(app_inbound)),
        };
        let host = MemoryPort {
            origin: host_origin.to_string(),
            outbound: Mutex::new(Some(to_app)),
            inbound: Mutex::new(Some(host_inbound)),
        };
        (app, host)
    }

    /// Origin this port stamps on what it posts
    pub fn origin(&self) -> &str {
        &self.origin
    }

    /// Posts `data` to the peer as if it came from `origin`
    pub async fn post_from(&self, origin: &str, data: Value) -> McpResult<()> {
        self.deliver(InboundMessage {
            origin: origin.to_string(),
            data,
        })
    }

    fn deliver(&self, message: InboundMessage) -> McpResult<()> {
        let outbound = self.outbound.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(sender) = outbound.as_ref() else {
            return Err(McpError::ChannelClosed(format!("port {} is closed", self.origin)));
        };
        trace!(origin = %message.origin, "posting in-process message");
        sender
            .send(message)
            .map_err(|_| McpError::ChannelClosed("peer port dropped".to_string()))
    }
}

#[async_trait]
impl MessagePort for MemoryPort {
    async fn post_message(&self, message: Value) -> McpResult<()> {
        self.deliver(InboundMessage {
            origin: self.origin.clone(),
            data: message,
        })
    }

    fn take_inbound(&self) -> McpResult<InboundStream> {
        self.inbound
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .ok_or_else(|| McpError::InvalidState("inbound stream already taken".to_string()))
    }

    async fn close(&self) -> McpResult<()> {
        self.outbound
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        Ok(())
    }
}
