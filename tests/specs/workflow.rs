// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Workflow scenarios: linear chains, cascading cancellation, expression
//! gates.

use super::harness::Harness;
use jl_core::{JobState, Requirement, WorkflowState};
use jl_engine::WorkflowJobSubmission;
use jl_expr::Status;

fn job(name: &str, command: &str, requires: Vec<Requirement>) -> WorkflowJobSubmission {
    WorkflowJobSubmission {
        name: name.to_string(),
        spec: Harness::spec(command, &[]),
        requires,
        contents: Vec::new(),
    }
}

fn after(target: &str) -> Vec<Requirement> {
    vec![Requirement::Simple {
        job: target.into(),
        status: Status::Completed,
    }]
}

#[tokio::test]
async fn linear_chain_completes_in_dependency_order() {
    let h = Harness::new();
    let id = h
        .workflows
        .submit_workflow(
            "chain",
            "test",
            vec![
                job("a", "/bin/true", vec![]),
                job("b", "/bin/true", after("a")),
                job("c", "/bin/true", after("b")),
            ],
        )
        .await
        .unwrap();

    h.wait_for_workflow(id, WorkflowState::Completed).await;

    let status = h.workflows.status(id).unwrap();
    assert!(status.jobs.values().all(|s| *s == JobState::Completed));

    // Dependency order is visible in the start timestamps.
    let jobs = h.orchestrator.jobs().list();
    let at = |name: &str| {
        jobs.iter()
            .find(|j| j.name.as_deref() == Some(name))
            .and_then(|j| j.started_at_ms)
            .unwrap()
    };
    assert!(at("a") <= at("b"));
    assert!(at("b") <= at("c"));
}

#[tokio::test]
async fn failed_root_cancels_all_downstream() {
    let h = Harness::new();
    let id = h
        .workflows
        .submit_workflow(
            "chain",
            "test",
            vec![
                job("a", "/bin/false", vec![]),
                job("b", "/bin/true", after("a")),
                job("c", "/bin/true", after("b")),
            ],
        )
        .await
        .unwrap();

    h.wait_for_workflow(id, WorkflowState::Failed).await;

    let status = h.workflows.status(id).unwrap();
    assert_eq!(status.jobs["a"], JobState::Failed);
    assert_eq!(status.jobs["b"], JobState::Cancelled);
    assert_eq!(status.jobs["c"], JobState::Cancelled);

    // The cancelled members emitted events but never got a process.
    let events = h.events.events.lock();
    let cancelled = events
        .iter()
        .filter(|e| e.name() == "job.cancelled")
        .count();
    assert_eq!(cancelled, 2);
}

#[tokio::test]
async fn expression_gate_opens_while_branch_still_running() {
    // c requires (a=COMPLETED AND b=FAILED) OR a=COMPLETED: a completing is
    // enough, whatever b does.
    let h = Harness::new();
    let id = h
        .workflows
        .submit_workflow(
            "expr",
            "test",
            vec![
                job("a", "/bin/true", vec![]),
                job("b", "/bin/sleep", vec![]), // exits non-zero fast
                job(
                    "c",
                    "/bin/true",
                    vec![Requirement::Expression {
                        expr: jl_expr::parse("(a=COMPLETED AND b=FAILED) OR a=COMPLETED").unwrap(),
                    }],
                ),
            ],
        )
        .await
        .unwrap();

    h.wait_for_workflow(id, WorkflowState::Failed).await;
    let status = h.workflows.status(id).unwrap();
    assert_eq!(status.jobs["c"], JobState::Completed);
    assert_eq!(status.jobs["b"], JobState::Failed);
}

#[tokio::test]
async fn expression_gate_cancels_when_unsatisfiable() {
    // Same expression; with a failing, no assignment can open the gate.
    let h = Harness::new();
    let id = h
        .workflows
        .submit_workflow(
            "expr",
            "test",
            vec![
                job("a", "/bin/false", vec![]),
                job("b", "/bin/false", vec![]),
                job(
                    "c",
                    "/bin/true",
                    vec![Requirement::Expression {
                        expr: jl_expr::parse("(a=COMPLETED AND b=FAILED) OR a=COMPLETED").unwrap(),
                    }],
                ),
            ],
        )
        .await
        .unwrap();

    h.wait_for_workflow(id, WorkflowState::Failed).await;
    let status = h.workflows.status(id).unwrap();
    assert_eq!(status.jobs["c"], JobState::Cancelled);
}

#[tokio::test]
async fn workflow_completed_iff_every_member_completed() {
    let h = Harness::new();
    let id = h
        .workflows
        .submit_workflow(
            "pair",
            "test",
            vec![job("a", "/bin/true", vec![]), job("b", "/bin/true", vec![])],
        )
        .await
        .unwrap();

    h.wait_for_workflow(id, WorkflowState::Completed).await;
    let status = h.workflows.status(id).unwrap();
    assert!(status.jobs.values().all(|s| *s == JobState::Completed));
}
