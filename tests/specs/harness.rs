// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared engine harness for scenario tests.

use jl_core::{Event, EventKind, Job, JobId, JobSpec, JobState, SequentialIdGen, SystemClock};
use jl_engine::{
    DependencyResolver, EngineConfig, EventBus, Orchestrator, WorkflowEngine,
};
use jl_storage::{JobStore, NetworkStore, VolumeStore};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

/// Reads the env contract far enough to exec the job command. If an upload
/// pipe is present it is drained to the working directory first, mirroring
/// the init ordering guarantee (files land before the command runs).
pub const INIT_SHIM: &str = r#"#!/bin/sh
if [ -n "$JOB_UPLOAD_PIPE" ]; then
  cat "$JOB_UPLOAD_PIPE" > /dev/null
fi
i=0
set --
while [ "$i" -lt "${JOB_ARGS_COUNT:-0}" ]; do
  eval "set -- \"\$@\" \"\$JOB_ARG_$i\""
  i=$((i+1))
done
exec "$JOB_COMMAND" "$@"
"#;

pub struct EventLog {
    pub events: Mutex<Vec<Event>>,
}

#[async_trait::async_trait]
impl jl_engine::Subscriber for EventLog {
    fn name(&self) -> &str {
        "event-log"
    }

    async fn handle(&self, event: &Event) -> Result<(), jl_engine::HandlerError> {
        self.events.lock().push(event.clone());
        Ok(())
    }
}

pub struct Harness {
    pub dir: TempDir,
    pub orchestrator: Arc<Orchestrator<SystemClock, SequentialIdGen>>,
    pub workflows: Arc<WorkflowEngine<SystemClock, SequentialIdGen>>,
    pub events: Arc<EventLog>,
    token: CancellationToken,
}

impl Harness {
    pub fn new() -> Self {
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
        config.stop_grace = Duration::from_millis(400);
        config.parallelism = 4;
        config.node_id = "spec-node".into();

        let bus = Arc::new(EventBus::new());
        let events = Arc::new(EventLog {
            events: Mutex::new(Vec::new()),
        });
        bus.subscribe_many(&EventKind::ALL, Arc::clone(&events) as _);

        let orchestrator = Arc::new(Orchestrator::new(
            config,
            Arc::new(JobStore::new()),
            Arc::new(VolumeStore::new()),
            Arc::new(NetworkStore::new()),
            Arc::clone(&bus),
            SystemClock,
            SequentialIdGen::new("job"),
        ));
        let workflows =
            WorkflowEngine::new(Arc::clone(&orchestrator), Arc::new(DependencyResolver::new()));
        workflows.attach(&bus);

        let token = CancellationToken::new();
        tokio::spawn(Arc::clone(&orchestrator).run(token.clone()));

        Self {
            dir,
            orchestrator,
            workflows,
            events,
            token,
        }
    }

    pub fn spec(command: &str, args: &[&str]) -> JobSpec {
        JobSpec {
            command: command.to_string(),
            args: args.iter().map(|a| a.to_string()).collect(),
            ..JobSpec::default()
        }
    }

    pub async fn wait_for_job(&self, id: &JobId, state: JobState) -> Job {
        for _ in 0..600 {
            if let Some(job) = self.orchestrator.jobs().get(id) {
                if job.state == state {
                    return job;
                }
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        let last = self.orchestrator.jobs().get(id).map(|j| j.state);
        panic!("job {id} never reached {state}; last state {last:?}");
    }

    pub async fn wait_for_workflow(
        &self,
        id: jl_core::WorkflowId,
        state: jl_core::WorkflowState,
    ) {
        for _ in 0..600 {
            if let Ok(status) = self.workflows.status(id) {
                if status.state == state {
                    return;
                }
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        let last = self.workflows.status(id).ok().map(|s| (s.state, s.jobs));
        panic!("workflow {id} never reached {state}; last {last:?}");
    }
}

impl Drop for Harness {
    fn drop(&mut self) {
        self.token.cancel();
    }
}
