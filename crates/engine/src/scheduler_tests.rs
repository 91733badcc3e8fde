// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

fn job(id: &str) -> JobId {
    JobId::new(id)
}

#[test]
fn ready_jobs_dispatch_in_fifo_order() {
    let mut scheduler = Scheduler::new(4);
    scheduler.enqueue(job("a"));
    scheduler.enqueue(job("b"));

    assert_eq!(scheduler.start_next(0), Some(job("a")));
    assert_eq!(scheduler.start_next(0), Some(job("b")));
    assert_eq!(scheduler.start_next(0), None);
}

#[test]
fn delayed_jobs_wait_for_their_deadline() {
    let mut scheduler = Scheduler::new(4);
    scheduler.schedule_at(job("later"), 1_000);

    assert_eq!(scheduler.start_next(999), None);
    assert_eq!(scheduler.next_deadline_ms(), Some(1_000));
    assert_eq!(scheduler.start_next(1_000), Some(job("later")));
}

#[test]
fn delayed_jobs_dispatch_in_time_then_submission_order() {
    let mut scheduler = Scheduler::new(4);
    scheduler.schedule_at(job("second"), 500);
    scheduler.schedule_at(job("first"), 100);
    scheduler.schedule_at(job("third"), 500);

    assert_eq!(scheduler.start_next(1_000), Some(job("first")));
    assert_eq!(scheduler.start_next(1_000), Some(job("second")));
    assert_eq!(scheduler.start_next(1_000), Some(job("third")));
}

#[test]
fn parallelism_cap_holds_excess_jobs() {
    let mut scheduler = Scheduler::new(2);
    for name in ["a", "b", "c"] {
        scheduler.enqueue(job(name));
    }

    assert!(scheduler.start_next(0).is_some());
    assert!(scheduler.start_next(0).is_some());
    // Cap reached; c stays queued.
    assert_eq!(scheduler.start_next(0), None);
    assert!(scheduler.has_ready());

    scheduler.finished(&job("a"));
    assert_eq!(scheduler.start_next(0), Some(job("c")));
}

#[test]
fn cancel_removes_from_ready_queue() {
    let mut scheduler = Scheduler::new(4);
    scheduler.enqueue(job("a"));
    scheduler.enqueue(job("b"));
    scheduler.cancel(&job("a"));

    assert_eq!(scheduler.start_next(0), Some(job("b")));
    assert_eq!(scheduler.start_next(0), None);
}

#[test]
fn cancel_removes_from_delayed_queue() {
    let mut scheduler = Scheduler::new(4);
    scheduler.schedule_at(job("a"), 100);
    scheduler.schedule_at(job("b"), 200);
    scheduler.cancel(&job("a"));

    // The tombstoned head no longer drives the deadline.
    assert_eq!(scheduler.next_deadline_ms(), Some(200));
    assert_eq!(scheduler.start_next(1_000), Some(job("b")));
    assert_eq!(scheduler.start_next(1_000), None);
}

#[test]
fn re_enqueue_after_cancel_clears_tombstone() {
    let mut scheduler = Scheduler::new(4);
    scheduler.enqueue(job("a"));
    scheduler.cancel(&job("a"));
    scheduler.enqueue(job("a"));

    assert_eq!(scheduler.start_next(0), Some(job("a")));
}

#[test]
fn no_deadline_without_delayed_jobs() {
    let mut scheduler = Scheduler::new(4);
    assert_eq!(scheduler.next_deadline_ms(), None);
    scheduler.enqueue(job("a"));
    assert_eq!(scheduler.next_deadline_ms(), None);
}

#[test]
fn running_count_tracks_slots() {
    let mut scheduler = Scheduler::new(4);
    scheduler.enqueue(job("a"));
    assert_eq!(scheduler.running_count(), 0);
    scheduler.start_next(0);
    assert_eq!(scheduler.running_count(), 1);
    scheduler.finished(&job("a"));
    assert_eq!(scheduler.running_count(), 0);
}
