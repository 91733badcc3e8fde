// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! In-process event bus: typed fan-out to subscribers.
//!
//! Components couple through events instead of direct references: the
//! orchestrator publishes lifecycle transitions, the workflow engine and
//! anything else interested subscribe by [`EventKind`]. Publish dispatches
//! to every subscriber of the event's kind concurrently and aggregates all
//! handler errors; it never aborts on the first failure. Handler errors are
//! transient by policy: logged and surfaced to the publisher, nothing more.
//!
//! Publishes are awaited by their callers, so dropping the bus after the
//! last publish has resolved leaves no handler in flight.

use jl_core::{Event, EventKind};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::task::JoinSet;

/// Error returned by a subscriber's handler.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct HandlerError(pub String);

impl From<String> for HandlerError {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for HandlerError {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Aggregated failures from one publish.
#[derive(Debug, Error)]
pub struct PublishError {
    pub failures: Vec<(String, HandlerError)>,
}

impl std::fmt::Display for PublishError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} handler(s) failed: ", self.failures.len())?;
        for (i, (name, err)) in self.failures.iter().enumerate() {
            if i > 0 {
                f.write_str("; ")?;
            }
            write!(f, "{name}: {err}")?;
        }
        Ok(())
    }
}

/// Handle for removing a subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// An event handler registered with the bus.
#[async_trait::async_trait]
pub trait Subscriber: Send + Sync {
    /// Name used in error aggregation and logs.
    fn name(&self) -> &str;

    async fn handle(&self, event: &Event) -> Result<(), HandlerError>;
}

/// Fan-out registry from event kind to subscribers.
#[derive(Default)]
pub struct EventBus {
    subscribers: RwLock<HashMap<EventKind, Vec<(SubscriptionId, Arc<dyn Subscriber>)>>>,
    next_id: AtomicU64,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a subscriber for one event kind.
    pub fn subscribe(&self, kind: EventKind, subscriber: Arc<dyn Subscriber>) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::SeqCst));
        self.subscribers
            .write()
            .entry(kind)
            .or_default()
            .push((id, subscriber));
        id
    }

    /// Register one subscriber for several kinds.
    pub fn subscribe_many(
        &self,
        kinds: &[EventKind],
        subscriber: Arc<dyn Subscriber>,
    ) -> Vec<SubscriptionId> {
        kinds
            .iter()
            .map(|kind| self.subscribe(*kind, Arc::clone(&subscriber)))
            .collect()
    }

    /// Remove a subscription. Unknown ids are a no-op.
    pub fn unsubscribe(&self, id: SubscriptionId) {
        let mut subscribers = self.subscribers.write();
        for list in subscribers.values_mut() {
            list.retain(|(sub_id, _)| *sub_id != id);
        }
    }

    /// Number of subscribers for a kind.
    pub fn subscriber_count(&self, kind: EventKind) -> usize {
        self.subscribers
            .read()
            .get(&kind)
            .map(|l| l.len())
            .unwrap_or(0)
    }

    /// Dispatch an event to every subscriber of its kind, concurrently.
    ///
    /// All handlers run to completion; their failures are aggregated into
    /// one [`PublishError`]. Dispatch order between handlers is arbitrary.
    pub async fn publish(&self, event: Event) -> Result<(), PublishError> {
        tracing::debug!(event = %event.log_summary(), "publish");

        // Snapshot under the read lock; handlers run outside it so
        // subscribe/unsubscribe stay safe during dispatch.
        let targets: Vec<(String, Arc<dyn Subscriber>)> = {
            let subscribers = self.subscribers.read();
            subscribers
                .get(&event.kind())
                .map(|list| {
                    list.iter()
                        .map(|(_, s)| (s.name().to_string(), Arc::clone(s)))
                        .collect()
                })
                .unwrap_or_default()
        };

        if targets.is_empty() {
            return Ok(());
        }

        let event = Arc::new(event);
        let mut tasks = JoinSet::new();
        for (name, subscriber) in targets {
            let event = Arc::clone(&event);
            tasks.spawn(async move {
                let result = subscriber.handle(&event).await;
                (name, result)
            });
        }

        let mut failures = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((_, Ok(()))) => {}
                Ok((name, Err(err))) => {
                    tracing::warn!(subscriber = name, error = %err, "event handler failed");
                    failures.push((name, err));
                }
                Err(join_err) => {
                    tracing::warn!(error = %join_err, "event handler panicked");
                    failures.push(("<panicked>".to_string(), HandlerError(join_err.to_string())));
                }
            }
        }

        if failures.is_empty() {
            Ok(())
        } else {
            Err(PublishError { failures })
        }
    }
}

#[cfg(test)]
#[path = "bus_tests.rs"]
mod tests;
