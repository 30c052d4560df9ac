//! Correlation of outbound requests with their responses.
//!
//! The [`CorrelationTable`] owns every outstanding request from the moment an
//! id is allocated until the entry is settled. Settling happens exactly once,
//! through [`CorrelationTable::resolve`], [`CorrelationTable::reject`],
//! [`CorrelationTable::cancel`] or the bulk [`CorrelationTable::close`]. The
//! entry is removed in the same step, so a duplicate or late response for the
//! same id finds nothing and is logged and ignored.
//!
//! The table starts no timers. Deadlines and abort signals belong to the
//! caller, which settles its own entry through `cancel` when they fire.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use tokio::sync::oneshot;
use tracing::{debug, warn};

use crate::mcp::types::RequestId;
use crate::utils::error::{McpError, McpResult};

type Completion = oneshot::Sender<McpResult<serde_json::Value>>;

/// An outstanding request
#[derive(Debug)]
pub struct PendingRequest {
    /// Identifier sent on the wire
    pub id: RequestId,
    /// Method the request invoked
    pub method: String,
    /// When the entry was registered
    pub created_at: DateTime<Utc>,
    completion: Completion,
}

/// Snapshot of a pending entry, for diagnostics
#[derive(Debug, Clone, PartialEq)]
pub struct PendingInfo {
    /// Identifier sent on the wire
    pub id: RequestId,
    /// Method the request invoked
    pub method: String,
    /// When the entry was registered
    pub created_at: DateTime<Utc>,
}

/// The caller's side of a pending entry
#[derive(Debug)]
pub struct PendingHandle {
    id: RequestId,
    method: String,
    receiver: oneshot::Receiver<McpResult<serde_json::Value>>,
}

impl PendingHandle {
    /// Identifier allocated for this request
    pub fn id(&self) -> &RequestId {
        &self.id
    }

    /// Method this request invokes
    pub fn method(&self) -> &str {
        &self.method
    }

    /// Waits until the entry is settled
    ///
    /// A completion handle dropped without being settled can only happen when
    /// the table itself is dropped, which means the session is gone.
    pub async fn wait(self) -> McpResult<serde_json::Value> {
        self.receiver.await.unwrap_or(Err(McpError::SessionClosed))
    }

    /// Borrow the receiver so a caller can race it against a deadline
    pub(crate) fn receiver_mut(&mut self) -> &mut oneshot::Receiver<McpResult<serde_json::Value>> {
        &mut self.receiver
    }
}

/// Map of outstanding request ids to their completion handles
#[derive(Debug)]
pub struct CorrelationTable {
    next_id: i64,
    pending: HashMap<RequestId, PendingRequest>,
    closed: bool,
}

impl Default for CorrelationTable {
    fn default() -> Self {
        Self::new()
    }
}

impl CorrelationTable {
    /// Creates an empty table; the first id allocated is 1
    pub fn new() -> Self {
        Self {
            next_id: 1,
            pending: HashMap::new(),
            closed: false,
        }
    }

    /// Allocates a fresh id and stores a pending entry for it
    pub fn register(&mut self, method: &str) -> McpResult<PendingHandle> {
        if self.closed {
            return Err(McpError::SessionClosed);
        }

        let mut candidate = RequestId::Number(self.next_id);
        while self.pending.contains_key(&candidate) {
            self.next_id += 1;
            candidate = RequestId::Number(self.next_id);
        }
        self.next_id += 1;

        let (tx, rx) = oneshot::channel();
        self.pending.insert(
            candidate.clone(),
            PendingRequest {
                id: candidate.clone(),
                method: method.to_string(),
                created_at: Utc::now(),
                completion: tx,
            },
        );
        debug!(id = %candidate, method, pending = self.pending.len(), "registered pending request");

        Ok(PendingHandle {
            id: candidate,
            method: method.to_string(),
            receiver: rx,
        })
    }

    /// Completes the entry for `id` with a successful result
    pub fn resolve(&mut self, id: &RequestId, result: serde_json::Value) -> bool {
        self.settle(id, Ok(result), "resolve")
    }

    /// Completes the entry for `id` with an error
    pub fn reject(&mut self, id: &RequestId, error: McpError) -> bool {
        self.settle(id, Err(error), "reject")
    }

    /// Completes the entry for `id` because its caller gave up on it
    pub fn cancel(&mut self, id: &RequestId, reason: McpError) -> bool {
        self.settle(id, Err(reason), "cancel")
    }

    /// Rejects every pending entry and refuses further registrations
    ///
    /// Returns how many entries were rejected. Calling it again is a no-op.
    pub fn close<F>(&mut self, make_error: F) -> usize
    where
        F: Fn() -> McpError,
    {
        self.closed = true;
        let drained: Vec<PendingRequest> = self.pending.drain().map(|(_, entry)| entry).collect();
        let count = drained.len();
        for entry in drained {
            debug!(id = %entry.id, method = %entry.method, "rejecting pending request on close");
            let _ = entry.completion.send(Err(make_error()));
        }
        count
    }

    /// Whether `close` has run
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Whether an entry for `id` is outstanding
    pub fn contains(&self, id: &RequestId) -> bool {
        self.pending.contains_key(id)
    }

    /// Number of outstanding entries
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    /// Whether nothing is outstanding
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Lists outstanding entries, oldest first
    pub fn pending(&self) -> Vec<PendingInfo> {
        let mut entries: Vec<PendingInfo> = self
            .pending
            .values()
            .map(|p| PendingInfo {
                id: p.id.clone(),
                method: p.method.clone(),
                created_at: p.created_at,
            })
            .collect();
        entries.sort_by_key(|p| p.created_at);
        entries
    }

    fn settle(&mut self, id: &RequestId, outcome: McpResult<serde_json::Value>, action: &str) -> bool {
        let Some(entry) = self.pending.remove(id) else {
            warn!(id = %id, action, "no pending request for id, ignoring");
            return false;
        };

        let age_ms = (Utc::now() - entry.created_at).num_milliseconds();
        debug!(id = %id, method = %entry.method, action, age_ms, "settled pending request");

        if entry.completion.send(outcome).is_err() {
            // The waiter went away; the entry is still gone, which is what matters.
            debug!(id = %id, "waiter dropped before settlement");
        }
        true
    }
}
