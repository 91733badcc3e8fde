// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::lifecycle::{EngineConfig, Orchestrator};
use crate::resolver::DependencyResolver;
use jl_core::{SequentialIdGen, SystemClock, WorkflowState};
use jl_expr::Status;
use jl_storage::{JobStore, NetworkStore, VolumeStore};
use std::time::Duration;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

const INIT_SHIM: &str = r#"#!/bin/sh
i=0
set --
while [ "$i" -lt "${JOB_ARGS_COUNT:-0}" ]; do
  eval "set -- \"\$@\" \"\$JOB_ARG_$i\""
  i=$((i+1))
done
exec "$JOB_COMMAND" "$@"
"#;

struct Harness {
    _dir: TempDir,
    engine: Arc<WorkflowEngine<SystemClock, SequentialIdGen>>,
    orchestrator: Arc<Orchestrator<SystemClock, SequentialIdGen>>,
    token: CancellationToken,
}

impl Harness {
    fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let shim = dir.path().join("init-shim.sh");
        std::fs::write(&shim, INIT_SHIM).unwrap();
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&shim, std::fs::Permissions::from_mode(0o755)).unwrap();
        }

        let mut config = EngineConfig::new(dir.path().join("state"));
        config.cgroup_root = dir.path().join("cgroup");
        config.binary_path = shim;
        config.stop_grace = Duration::from_millis(300);
        config.node_id = "test-node".into();

        let bus = Arc::new(EventBus::new());
        let orchestrator = Arc::new(Orchestrator::new(
            config,
            Arc::new(JobStore::new()),
            Arc::new(VolumeStore::new()),
            Arc::new(NetworkStore::new()),
            Arc::clone(&bus),
            SystemClock,
            SequentialIdGen::new("job"),
        ));
        let engine = WorkflowEngine::new(Arc::clone(&orchestrator), Arc::new(DependencyResolver::new()));
        engine.attach(&bus);

        let token = CancellationToken::new();
        tokio::spawn(Arc::clone(&orchestrator).run(token.clone()));

        Self {
            _dir: dir,
            engine,
            orchestrator,
            token,
        }
    }

    async fn wait_for_workflow(&self, id: jl_core::WorkflowId, state: WorkflowState) {
        for _ in 0..500 {
            if let Ok(status) = self.engine.status(id) {
                if status.state == state {
                    return;
                }
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        let last = self.engine.status(id).ok().map(|s| (s.state, s.jobs));
        panic!("workflow {id} never reached {state}; last {last:?}");
    }
}

impl Drop for Harness {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

fn job(name: &str, command: &str, requires: Vec<Requirement>) -> WorkflowJobSubmission {
    WorkflowJobSubmission {
        name: name.to_string(),
        spec: JobSpec {
            command: command.to_string(),
            ..JobSpec::default()
        },
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
async fn linear_chain_runs_in_order() {
    let h = Harness::new();
    let id = h
        .engine
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

    let status = h.engine.status(id).unwrap();
    assert!(status.jobs.values().all(|s| *s == JobState::Completed));

    // All three ran to completion in dependency order.
    let jobs = h.orchestrator.jobs().list();
    let mut by_name: Vec<(String, Option<u64>)> = jobs
        .iter()
        .map(|j| (j.name.clone().unwrap_or_default(), j.started_at_ms))
        .collect();
    by_name.sort();
    let started: Vec<Option<u64>> = by_name.iter().map(|(_, at)| *at).collect();
    assert!(started[0] <= started[1] && started[1] <= started[2]);
}

#[tokio::test]
async fn upstream_failure_cascades_to_cancelled() {
    let h = Harness::new();
    let id = h
        .engine
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

    let status = h.engine.status(id).unwrap();
    assert_eq!(status.jobs["a"], JobState::Failed);
    assert_eq!(status.jobs["b"], JobState::Cancelled);
    assert_eq!(status.jobs["c"], JobState::Cancelled);

    // The cancelled members' store records agree and never ran.
    for job in h.orchestrator.jobs().list() {
        if job.name.as_deref() != Some("a") {
            assert_eq!(job.state, JobState::Cancelled);
            assert!(job.started_at_ms.is_none());
        }
    }
}

#[tokio::test]
async fn expression_gate_dispatches_on_satisfaction() {
    let h = Harness::new();
    let id = h
        .engine
        .submit_workflow(
            "expr",
            "test",
            vec![
                job("a", "/bin/true", vec![]),
                job("b", "/bin/sleep", vec![]),
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

    // b fails fast (sleep with no args), a completes; either way c's gate
    // opens through the a=COMPLETED disjunct and the workflow finishes.
    h.wait_for_workflow(id, WorkflowState::Failed).await;
    let status = h.engine.status(id).unwrap();
    assert_eq!(status.jobs["c"], JobState::Completed);
}

#[tokio::test]
async fn invalid_member_spec_registers_nothing() {
    let h = Harness::new();
    let err = h
        .engine
        .submit_workflow(
            "broken",
            "test",
            vec![
                job("a", "/bin/true", vec![]),
                job("b", "", after("a")), // empty command
            ],
        )
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Validation(_)));
    assert!(h.engine.list().is_empty());
    assert!(h.orchestrator.jobs().is_empty());
}

#[tokio::test]
async fn cyclic_workflow_rejected() {
    let h = Harness::new();
    let err = h
        .engine
        .submit_workflow(
            "cycle",
            "test",
            vec![job("a", "/bin/true", after("b")), job("b", "/bin/true", after("a"))],
        )
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        EngineError::Resolver(crate::resolver::ResolverError::OrderNotTopological { .. })
            | EngineError::Resolver(crate::resolver::ResolverError::Cycle(_))
    ));
    assert!(h.orchestrator.jobs().is_empty());
}
