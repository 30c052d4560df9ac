//! Notification fan-out by method name.
//!
//! Any number of handlers may subscribe to the same method. They run in
//! registration order, synchronously, on the session's dispatch point. The
//! handler list is copied out of the lock before anything runs, so a handler
//! may subscribe or unsubscribe without deadlocking, and the change takes
//! effect from the next notification.
//!
//! A handler that returns `Err` or panics is logged; the remaining handlers
//! still run and the session carries on.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use serde_json::Value;
use tracing::{debug, error, trace, warn};

use crate::mcp::types::JsonRpcNotification;
use crate::utils::error::{McpError, McpResult};

/// Callback invoked with the params of a routed notification
pub type NotificationHandler = Arc<dyn Fn(Option<Value>) -> McpResult<()> + Send + Sync>;

struct Entry {
    id: u64,
    method: String,
    handler: NotificationHandler,
}

#[derive(Default)]
struct RouterInner {
    next_id: u64,
    entries: Vec<Entry>,
}

fn lock(inner: &Mutex<RouterInner>) -> MutexGuard<'_, RouterInner> {
    inner.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Ordered multi-subscriber registry
#[derive(Clone, Default)]
pub struct NotificationRouter {
    inner: Arc<Mutex<RouterInner>>,
}

impl std::fmt::Debug for NotificationRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotificationRouter")
            .field("subscriptions", &lock(&self.inner).entries.len())
            .finish()
    }
}

impl NotificationRouter {
    /// Creates an empty router
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `handler` after any existing handlers for `method`
    ///
    /// The handler stays registered until [`Subscription::unsubscribe`] is
    /// called; dropping the returned value does not remove it.
    pub fn subscribe<F>(&self, method: &str, handler: F) -> Subscription
    where
        F: Fn(Option<Value>) -> McpResult<()> + Send + Sync + 'static,
    {
        let mut inner = lock(&self.inner);
        inner.next_id += 1;
        let id = inner.next_id;
        inner.entries.push(Entry {
            id,
            method: method.to_string(),
            handler: Arc::new(handler),
        });
        debug!(method, subscription = id, "subscribed notification handler");

        Subscription {
            id,
            method: method.to_string(),
            router: Arc::downgrade(&self.inner),
        }
    }

    /// Number of handlers registered for `method`
    pub fn handler_count(&self, method: &str) -> usize {
        lock(&self.inner)
            .entries
            .iter()
            .filter(|e| e.method == method)
            .count()
    }

    /// Delivers a notification to every handler registered for its method
    ///
    /// Returns how many handlers were invoked, including ones that failed.
    pub fn dispatch(&self, notification: &JsonRpcNotification) -> usize {
        self.dispatch_reporting(notification, |_| {})
    }

    /// Like [`NotificationRouter::dispatch`], handing every handler failure
    /// to `on_failure`; a panic arrives as [`McpError::HandlerPanicked`]
    pub fn dispatch_reporting<R>(&self, notification: &JsonRpcNotification, mut on_failure: R) -> usize
    where
        R: FnMut(McpError),
    {
        let method = notification.method.as_str();
        let handlers: Vec<(u64, NotificationHandler)> = lock(&self.inner)
            .entries
            .iter()
            .filter(|e| e.method == method)
            .map(|e| (e.id, Arc::clone(&e.handler)))
            .collect();

        if handlers.is_empty() {
            trace!(method, "no handlers for notification");
            return 0;
        }

        for (id, handler) in &handlers {
            let params = notification.params.clone();
            match catch_unwind(AssertUnwindSafe(|| handler(params))) {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    warn!(method, subscription = id, error = %e, "notification handler failed");
                    on_failure(e);
                }
                Err(panic) => {
                    let message = panic
                        .downcast_ref::<&str>()
                        .map(|s| s.to_string())
                        .or_else(|| panic.downcast_ref::<String>().cloned())
                        .unwrap_or_else(|| "unknown panic".to_string());
                    error!(method, subscription = id, panic = %message, "notification handler panicked");
                    on_failure(McpError::HandlerPanicked(format!("{}: {}", method, message)));
                }
            }
        }
        handlers.len()
    }
}

/// Handle to one registered handler
pub struct Subscription {
    id: u64,
    method: String,
    router: Weak<Mutex<RouterInner>>,
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("method", &self.method)
            .finish()
    }
}

impl Subscription {
    /// Method this subscription listens to
    pub fn method(&self) -> &str {
        &self.method
    }

    /// Removes the handler; returns whether it was still registered
    pub fn unsubscribe(self) -> bool {
        let Some(inner) = self.router.upgrade() else {
            return false;
        };
        let mut inner = lock(&inner);
        let before = inner.entries.len();
        inner.entries.retain(|e| e.id != self.id);
        let removed = inner.entries.len() != before;
        if removed {
            debug!(method = %self.method, subscription = self.id, "unsubscribed notification handler");
        }
        removed
    }
}
