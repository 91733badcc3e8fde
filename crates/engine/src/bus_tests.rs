// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use jl_core::JobId;
use std::sync::atomic::AtomicUsize;

struct Recorder {
    name: String,
    seen: AtomicUsize,
    fail_with: Option<String>,
}

impl Recorder {
    fn new(name: &str) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            seen: AtomicUsize::new(0),
            fail_with: None,
        })
    }

    fn failing(name: &str, message: &str) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            seen: AtomicUsize::new(0),
            fail_with: Some(message.to_string()),
        })
    }

    fn count(&self) -> usize {
        self.seen.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl Subscriber for Recorder {
    fn name(&self) -> &str {
        &self.name
    }

    async fn handle(&self, _event: &Event) -> Result<(), HandlerError> {
        self.seen.fetch_add(1, Ordering::SeqCst);
        match &self.fail_with {
            Some(message) => Err(HandlerError(message.clone())),
            None => Ok(()),
        }
    }
}

fn started(id: &str) -> Event {
    Event::JobStarted {
        job_id: JobId::new(id),
        at_ms: 1,
        node: String::new(),
    }
}

fn stopped(id: &str) -> Event {
    Event::JobStopped {
        job_id: JobId::new(id),
        at_ms: 1,
    }
}

#[tokio::test]
async fn publish_reaches_subscribers_of_the_kind() {
    let bus = EventBus::new();
    let on_started = Recorder::new("on-started");
    let on_stopped = Recorder::new("on-stopped");
    bus.subscribe(EventKind::JobStarted, on_started.clone());
    bus.subscribe(EventKind::JobStopped, on_stopped.clone());

    bus.publish(started("j1")).await.unwrap();

    assert_eq!(on_started.count(), 1);
    assert_eq!(on_stopped.count(), 0);
}

#[tokio::test]
async fn publish_without_subscribers_is_ok() {
    let bus = EventBus::new();
    bus.publish(stopped("j1")).await.unwrap();
}

#[tokio::test]
async fn handler_errors_are_aggregated_not_short_circuited() {
    let bus = EventBus::new();
    let good = Recorder::new("good");
    let bad_a = Recorder::failing("bad-a", "boom");
    let bad_b = Recorder::failing("bad-b", "crash");
    bus.subscribe(EventKind::JobStarted, good.clone());
    bus.subscribe(EventKind::JobStarted, bad_a.clone());
    bus.subscribe(EventKind::JobStarted, bad_b.clone());

    let err = bus.publish(started("j1")).await.unwrap_err();

    // Every handler ran despite the failures.
    assert_eq!(good.count(), 1);
    assert_eq!(bad_a.count(), 1);
    assert_eq!(bad_b.count(), 1);
    assert_eq!(err.failures.len(), 2);
    let rendered = err.to_string();
    assert!(rendered.contains("boom"));
    assert!(rendered.contains("crash"));
}

#[tokio::test]
async fn unsubscribe_stops_delivery() {
    let bus = EventBus::new();
    let recorder = Recorder::new("r");
    let id = bus.subscribe(EventKind::JobStarted, recorder.clone());

    bus.publish(started("j1")).await.unwrap();
    bus.unsubscribe(id);
    bus.publish(started("j2")).await.unwrap();

    assert_eq!(recorder.count(), 1);
    assert_eq!(bus.subscriber_count(EventKind::JobStarted), 0);
}

#[tokio::test]
async fn subscribe_many_covers_each_kind() {
    let bus = EventBus::new();
    let recorder = Recorder::new("r");
    let ids = bus.subscribe_many(
        &[EventKind::JobStarted, EventKind::JobStopped],
        recorder.clone(),
    );
    assert_eq!(ids.len(), 2);

    bus.publish(started("j1")).await.unwrap();
    bus.publish(stopped("j1")).await.unwrap();
    assert_eq!(recorder.count(), 2);
}
