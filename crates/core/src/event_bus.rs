//! Priority-ordered in-process publish/subscribe.
//!
//! Subscribers register per event type (or [`WILDCARD`]) with a priority;
//! lower runs first. `publish` awaits each handler in turn, so delivery for a
//! single publish is totally ordered. A handler that fails or panics is logged
//! and skipped. There is no queue and no persistence.

use std::collections::HashMap;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use futures::FutureExt;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::error::EventError;
use crate::event::{AgentEvent, WILDCARD};

/// Priority given to subscribers that do not ask for one.
pub const DEFAULT_PRIORITY: i32 = 100;

pub type SubscriptionId = u64;

/// An event consumer.
#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn handle(&self, event: &AgentEvent) -> Result<(), EventError>;
}

struct FnHandler<F>(F);

#[async_trait]
impl<F, Fut> EventHandler for FnHandler<F>
where
    F: Fn(AgentEvent) -> Fut + Send + Sync,
    Fut: Future<Output = Result<(), EventError>> + Send,
{
    async fn handle(&self, event: &AgentEvent) -> Result<(), EventError> {
        (self.0)(event.clone()).await
    }
}

/// Wrap an async closure as a handler.
pub fn handler_fn<F, Fut>(f: F) -> Arc<dyn EventHandler>
where
    F: Fn(AgentEvent) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), EventError>> + Send + 'static,
{
    Arc::new(FnHandler(f))
}

#[derive(Clone)]
struct Subscription {
    id: SubscriptionId,
    priority: i32,
    once: bool,
    handler: Arc<dyn EventHandler>,
}

/// The event dispatcher. Share it behind an `Arc`.
pub struct EventBus {
    subscriptions: RwLock<HashMap<String, Vec<Subscription>>>,
    next_id: AtomicU64,
}

impl EventBus {
    pub fn new() -> Self {
        Self {
            subscriptions: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Register a handler for `event_type`. Returns the subscription id.
    pub async fn subscribe(
        &self,
        event_type: impl Into<String>,
        handler: Arc<dyn EventHandler>,
        priority: i32,
    ) -> SubscriptionId {
        self.insert(event_type.into(), handler, priority, false).await
    }

    /// Register a handler that is removed after its first invocation.
    pub async fn once(
        &self,
        event_type: impl Into<String>,
        handler: Arc<dyn EventHandler>,
        priority: i32,
    ) -> SubscriptionId {
        self.insert(event_type.into(), handler, priority, true).await
    }

    async fn insert(
        &self,
        event_type: String,
        handler: Arc<dyn EventHandler>,
        priority: i32,
        once: bool,
    ) -> SubscriptionId {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        debug!(event_type = %event_type, id, priority, once, "Subscribed");
        self.subscriptions
            .write()
            .await
            .entry(event_type)
            .or_default()
            .push(Subscription {
                id,
                priority,
                once,
                handler,
            });
        id
    }

    /// Remove one subscription. Returns whether it existed.
    pub async fn unsubscribe(&self, event_type: &str, id: SubscriptionId) -> bool {
        let mut subs = self.subscriptions.write().await;
        let Some(list) = subs.get_mut(event_type) else {
            return false;
        };
        let before = list.len();
        list.retain(|s| s.id != id);
        let removed = list.len() != before;
        if list.is_empty() {
            subs.remove(event_type);
        }
        removed
    }

    /// Remove every subscription for `event_type`, or all of them for `None`.
    pub async fn off_all(&self, event_type: Option<&str>) -> usize {
        let mut subs = self.subscriptions.write().await;
        match event_type {
            Some(t) => subs.remove(t).map(|l| l.len()).unwrap_or(0),
            None => {
                let count = subs.values().map(Vec::len).sum();
                subs.clear();
                count
            }
        }
    }

    pub async fn subscriber_count(&self, event_type: Option<&str>) -> usize {
        let subs = self.subscriptions.read().await;
        match event_type {
            Some(t) => subs.get(t).map(Vec::len).unwrap_or(0),
            None => subs.values().map(Vec::len).sum(),
        }
    }

    /// Event types with at least one live subscriber, sorted.
    pub async fn event_types(&self) -> Vec<String> {
        let subs = self.subscriptions.read().await;
        let mut types: Vec<String> = subs
            .iter()
            .filter(|(_, l)| !l.is_empty())
            .map(|(t, _)| t.clone())
            .collect();
        types.sort();
        types
    }

    /// Deliver `event` to exact-type and wildcard subscribers in ascending
    /// priority order. Returns how many handlers completed successfully.
    pub async fn publish(&self, event: AgentEvent) -> usize {
        let event_type = event.event_type();
        let handlers = self.claim_handlers(event_type).await;
        if handlers.is_empty() {
            return 0;
        }

        let mut notified = 0;
        for sub in handlers {
            match AssertUnwindSafe(sub.handler.handle(&event))
                .catch_unwind()
                .await
            {
                Ok(Ok(())) => notified += 1,
                Ok(Err(e)) => {
                    warn!(event_type, id = sub.id, error = %e, "Event handler failed");
                }
                Err(panic) => {
                    let e = EventError::Panicked(panic_message(panic.as_ref()));
                    warn!(event_type, id = sub.id, error = %e, "Event handler failed");
                }
            }
        }
        notified
    }

    /// Snapshot matching handlers and drop `once` subscriptions before any runs.
    async fn claim_handlers(&self, event_type: &str) -> Vec<Subscription> {
        let mut subs = self.subscriptions.write().await;

        let mut matched: Vec<Subscription> = Vec::new();
        for key in [event_type, WILDCARD] {
            if let Some(list) = subs.get_mut(key) {
                matched.extend(list.iter().cloned());
                list.retain(|s| !s.once);
                if list.is_empty() {
                    subs.remove(key);
                }
            }
        }

        matched.sort_by_key(|s| s.priority);
        matched
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
