//! Transport layer for the app channel.
//!
//! The raw primitive is a [`MessagePort`]: post one JSON value to the peer,
//! receive a stream of values tagged with the sender's origin, close. It has
//! no delivery guarantees and no connection concept of its own.
//!
//! [`ChannelAdapter`] owns a port and gives it an explicit lifecycle
//! (created, started, stopped). Starting it spawns the single receive task,
//! which filters by peer origin, drops anything that is not a JSON object and
//! hands the rest to the session one message at a time.

pub mod memory;
#[cfg(feature = "transport-ws")]
pub mod websocket;

use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::utils::error::{McpError, McpResult};

pub use memory::MemoryPort;
#[cfg(feature = "transport-ws")]
pub use websocket::WebSocketPort;

/// A message as it came off the port
#[derive(Debug, Clone, PartialEq)]
pub struct InboundMessage {
    /// Origin of the sender, as reported by the primitive
    pub origin: String,
    /// The posted value
    pub data: Value,
}

/// Stream of inbound messages; ends when the peer goes away
pub type InboundStream = mpsc::UnboundedReceiver<InboundMessage>;

/// Raw bidirectional message primitive
#[async_trait]
pub trait MessagePort: Send + Sync + 'static {
    /// Posts one value to the peer
    async fn post_message(&self, message: Value) -> McpResult<()>;

    /// Hands out the inbound stream; only the first call succeeds
    fn take_inbound(&self) -> McpResult<InboundStream>;

    /// Releases the primitive
    async fn close(&self) -> McpResult<()>;
}

/// Which origins the adapter accepts messages from
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum PeerFilter {
    /// Accept every origin
    #[default]
    Any,
    /// Accept only this exact origin
    Origin(String),
}

impl PeerFilter {
    /// Builds a filter from an optional origin, where `"*"` means any
    pub fn from_origin(origin: Option<&str>) -> Self {
        match origin {
            None | Some("*") => PeerFilter::Any,
            Some(origin) => PeerFilter::Origin(origin.to_string()),
        }
    }

    /// Whether a message from `origin` should be delivered
    pub fn accepts(&self, origin: &str) -> bool {
        match self {
            PeerFilter::Any => true,
            PeerFilter::Origin(expected) => expected == origin,
        }
    }
}

/// What the receive task hands to the session
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelEvent {
    /// An accepted message
    Message(Value),
    /// The underlying channel ended
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AdapterState {
    Created,
    Started,
    Stopped,
}

/// An owned port with an explicit lifecycle
pub struct ChannelAdapter {
    port: Arc<dyn MessagePort>,
    filter: PeerFilter,
    state: Mutex<AdapterState>,
    cancel: CancellationToken,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl std::fmt::Debug for ChannelAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChannelAdapter")
            .field("filter", &self.filter)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl ChannelAdapter {
    /// Wraps `port`; nothing is received until [`ChannelAdapter::start`]
    pub fn new(port: Arc<dyn MessagePort>, filter: PeerFilter) -> Self {
        Self {
            port,
            filter,
            state: Mutex::new(AdapterState::Created),
            cancel: CancellationToken::new(),
            task: Mutex::new(None),
        }
    }

    fn state(&self) -> AdapterState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Whether the receive task is running
    pub fn is_started(&self) -> bool {
        self.state() == AdapterState::Started
    }

    /// Spawns the receive task
    ///
    /// `on_receive` is awaited once per accepted message and once more with
    /// [`ChannelEvent::Closed`] if the inbound stream ends. The next message
    /// is not read until the previous callback has finished.
    pub fn start<F, Fut>(&self, mut on_receive: F) -> McpResult<()>
    where
        F: FnMut(ChannelEvent) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let mut inbound = {
            let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
            if *state != AdapterState::Created {
                return Err(McpError::InvalidState(format!(
                    "channel adapter cannot start from {:?}",
                    *state
                )));
            }
            let inbound = self.port.take_inbound()?;
            *state = AdapterState::Started;
            inbound
        };
        let filter = self.filter.clone();
        let cancel = self.cancel.clone();

        let handle = tokio::spawn(async move {
            loop {
                let next = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => break,
                    next = inbound.recv() => next,
                };

                let Some(message) = next else {
                    info!("inbound channel ended");
                    on_receive(ChannelEvent::Closed).await;
                    break;
                };

                if !filter.accepts(&message.origin) {
                    debug!(origin = %message.origin, "dropping message from unexpected origin");
                    continue;
                }
                if !message.data.is_object() {
                    debug!(origin = %message.origin, "dropping non-object message");
                    continue;
                }
                trace!(origin = %message.origin, "delivering inbound message");
                on_receive(ChannelEvent::Message(message.data)).await;
            }
            debug!("receive task finished");
        });

        *self.task.lock().unwrap_or_else(PoisonError::into_inner) = Some(handle);
        Ok(())
    }

    /// Posts one message to the peer
    pub async fn send(&self, message: Value) -> McpResult<()> {
        match self.state() {
            AdapterState::Started => self.port.post_message(message).await,
            AdapterState::Created => Err(McpError::ChannelClosed(
                "channel adapter not started".to_string(),
            )),
            AdapterState::Stopped => Err(McpError::ChannelClosed(
                "channel adapter stopped".to_string(),
            )),
        }
    }

    /// Stops the receive task and closes the port; later calls do nothing
    ///
    /// Safe to call from inside the receive callback: the task finishes after
    /// the current callback returns and any queued messages are discarded.
    pub async fn stop(&self) {
        {
            let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
            if *state == AdapterState::Stopped {
                return;
            }
            *state = AdapterState::Stopped;
        }
        self.cancel.cancel();
        // Detach; the task may be the caller.
        drop(self.task.lock().unwrap_or_else(PoisonError::into_inner).take());

        if let Err(e) = self.port.close().await {
            warn!(error = %e, "failed to close message port");
        }
        debug!("channel adapter stopped");
    }
}

impl Drop for ChannelAdapter {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
