// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Stop scenarios: graceful SIGTERM, SIGKILL escalation, idempotence.

use super::harness::Harness;
use jl_core::JobState;

#[tokio::test]
async fn graceful_stop_terminates_a_long_sleep() {
    let h = Harness::new();
    let job = h
        .orchestrator
        .submit(None, Harness::spec("/bin/sleep", &["3600"]))
        .await
        .unwrap();
    h.wait_for_job(&job.id, JobState::Running).await;

    h.orchestrator.stop(&job.id, false).await.unwrap();
    let done = h.wait_for_job(&job.id, JobState::Stopped).await;
    assert!(done.ended_at_ms.is_some());
}

#[tokio::test]
async fn sigterm_immune_job_dies_at_the_grace_deadline() {
    let h = Harness::new();
    let job = h
        .orchestrator
        .submit(
            None,
            Harness::spec("/bin/sh", &["-c", "trap '' TERM; sleep 3600"]),
        )
        .await
        .unwrap();
    h.wait_for_job(&job.id, JobState::Running).await;

    let before = std::time::Instant::now();
    h.orchestrator.stop(&job.id, false).await.unwrap();
    h.wait_for_job(&job.id, JobState::Stopped).await;

    // The harness grace window is 400ms; the kill must come after it, not
    // before.
    assert!(before.elapsed() >= std::time::Duration::from_millis(350));
}

#[tokio::test]
async fn stop_twice_equals_stop_once() {
    let h = Harness::new();
    let job = h
        .orchestrator
        .submit(None, Harness::spec("/bin/sleep", &["3600"]))
        .await
        .unwrap();
    h.wait_for_job(&job.id, JobState::Running).await;

    h.orchestrator.stop(&job.id, false).await.unwrap();
    h.orchestrator.stop(&job.id, false).await.unwrap();
    let done = h.wait_for_job(&job.id, JobState::Stopped).await;

    h.orchestrator.stop(&job.id, false).await.unwrap();
    let after = h.orchestrator.jobs().get(&job.id).unwrap();
    assert_eq!(after.state, done.state);
    assert_eq!(after.ended_at_ms, done.ended_at_ms);

    let events = h.events.events.lock();
    let stopped = events.iter().filter(|e| e.name() == "job.stopped").count();
    assert_eq!(stopped, 1, "exactly one terminal event");
}

#[tokio::test]
async fn force_stop_skips_the_grace_window() {
    let h = Harness::new();
    let job = h
        .orchestrator
        .submit(
            None,
            Harness::spec("/bin/sh", &["-c", "trap '' TERM; sleep 3600"]),
        )
        .await
        .unwrap();
    h.wait_for_job(&job.id, JobState::Running).await;

    let before = std::time::Instant::now();
    h.orchestrator.stop(&job.id, true).await.unwrap();
    h.wait_for_job(&job.id, JobState::Stopped).await;
    assert!(before.elapsed() < std::time::Duration::from_millis(350));
}
