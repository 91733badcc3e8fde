// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use jl_core::{EventKind, SequentialIdGen, SystemClock};
use parking_lot::Mutex as PlMutex;
use tempfile::TempDir;

/// Stand-in for the re-exec init path: reads the env contract far enough to
/// exec the job command, without touching namespaces. Lets the lifecycle
/// tests run unprivileged while still exercising the handoff.
const INIT_SHIM: &str = r#"#!/bin/sh
i=0
set --
while [ "$i" -lt "${JOB_ARGS_COUNT:-0}" ]; do
  eval "set -- \"\$@\" \"\$JOB_ARG_$i\""
  i=$((i+1))
done
exec "$JOB_COMMAND" "$@"
"#;

struct EventLog {
    events: PlMutex<Vec<Event>>,
}

#[async_trait::async_trait]
impl crate::bus::Subscriber for EventLog {
    fn name(&self) -> &str {
        "event-log"
    }

    async fn handle(&self, event: &Event) -> Result<(), crate::bus::HandlerError> {
        self.events.lock().push(event.clone());
        Ok(())
    }
}

struct Harness {
    _dir: TempDir,
    orchestrator: Arc<Orchestrator<SystemClock, SequentialIdGen>>,
    events: Arc<EventLog>,
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
        config.parallelism = 4;
        config.node_id = "test-node".into();

        let bus = Arc::new(EventBus::new());
        let events = Arc::new(EventLog {
            events: PlMutex::new(Vec::new()),
        });
        bus.subscribe_many(&EventKind::ALL, Arc::clone(&events) as _);

        let orchestrator = Arc::new(Orchestrator::new(
            config,
            Arc::new(JobStore::new()),
            Arc::new(VolumeStore::new()),
            Arc::new(NetworkStore::new()),
            bus,
            SystemClock,
            SequentialIdGen::new("job"),
        ));

        let token = CancellationToken::new();
        tokio::spawn(Arc::clone(&orchestrator).run(token.clone()));

        Self {
            _dir: dir,
            orchestrator,
            events,
            token,
        }
    }

    fn spec(command: &str, args: &[&str]) -> JobSpec {
        JobSpec {
            command: command.to_string(),
            args: args.iter().map(|a| a.to_string()).collect(),
            ..JobSpec::default()
        }
    }

    async fn wait_for_state(&self, id: &JobId, state: JobState) -> Job {
        for _ in 0..500 {
            if let Some(job) = self.orchestrator.jobs().get(id) {
                if job.state == state {
                    return job;
                }
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        let current = self.orchestrator.jobs().get(id).map(|j| j.state);
        panic!("job {id} never reached {state}; last state {current:?}");
    }

    fn event_names(&self) -> Vec<&'static str> {
        self.events.events.lock().iter().map(|e| e.name()).collect()
    }
}

impl Drop for Harness {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

#[tokio::test]
async fn job_runs_to_completion() {
    let h = Harness::new();
    let job = h
        .orchestrator
        .submit(Some("ok".into()), Harness::spec("/bin/true", &[]))
        .await
        .unwrap();

    let done = h.wait_for_state(&job.id, JobState::Completed).await;
    assert_eq!(done.exit_code, Some(0));
    assert!(done.started_at_ms.is_some());
    assert!(done.ended_at_ms.is_some());
    // Resources released exactly once: nothing left on the record.
    assert!(!done.holds_resources());

    let names = h.event_names();
    assert_eq!(names, vec!["job.started", "job.completed"]);
}

#[tokio::test]
async fn failing_job_reports_exit_code() {
    let h = Harness::new();
    let job = h
        .orchestrator
        .submit(None, Harness::spec("/bin/false", &[]))
        .await
        .unwrap();

    let done = h.wait_for_state(&job.id, JobState::Failed).await;
    assert_eq!(done.exit_code, Some(1));
    assert!(done.failure.as_deref().unwrap_or("").contains("exit code 1"));
    assert!(h.event_names().contains(&"job.failed"));
}

#[tokio::test]
async fn args_cross_the_env_contract() {
    let h = Harness::new();
    // `sh -c 'exit 7'` only exits 7 if both args arrive intact.
    let job = h
        .orchestrator
        .submit(None, Harness::spec("/bin/sh", &["-c", "exit 7"]))
        .await
        .unwrap();

    let done = h.wait_for_state(&job.id, JobState::Failed).await;
    assert_eq!(done.exit_code, Some(7));
}

#[tokio::test]
async fn stop_sends_sigterm_and_is_idempotent() {
    let h = Harness::new();
    let job = h
        .orchestrator
        .submit(None, Harness::spec("/bin/sleep", &["30"]))
        .await
        .unwrap();
    h.wait_for_state(&job.id, JobState::Running).await;

    h.orchestrator.stop(&job.id, false).await.unwrap();
    let done = h.wait_for_state(&job.id, JobState::Stopped).await;

    // Second stop after terminal state changes nothing.
    h.orchestrator.stop(&job.id, false).await.unwrap();
    let again = h.orchestrator.jobs().get(&job.id).unwrap();
    assert_eq!(again.state, done.state);
    assert_eq!(again.ended_at_ms, done.ended_at_ms);

    let names = h.event_names();
    assert_eq!(
        names.iter().filter(|n| **n == "job.stopped").count(),
        1,
        "exactly one stop event: {names:?}"
    );
}

#[tokio::test]
async fn force_stop_kills_immediately() {
    let h = Harness::new();
    let job = h
        .orchestrator
        .submit(None, Harness::spec("/bin/sleep", &["30"]))
        .await
        .unwrap();
    h.wait_for_state(&job.id, JobState::Running).await;

    h.orchestrator.stop(&job.id, true).await.unwrap();
    h.wait_for_state(&job.id, JobState::Stopped).await;
}

#[tokio::test]
async fn sigterm_ignoring_job_is_killed_after_grace() {
    let h = Harness::new();
    let job = h
        .orchestrator
        .submit(
            None,
            Harness::spec("/bin/sh", &["-c", "trap '' TERM; sleep 30"]),
        )
        .await
        .unwrap();
    h.wait_for_state(&job.id, JobState::Running).await;

    h.orchestrator.stop(&job.id, false).await.unwrap();
    // SIGTERM is trapped; the 300ms grace window must escalate to SIGKILL.
    h.wait_for_state(&job.id, JobState::Stopped).await;
}

#[tokio::test]
async fn stopping_a_waiting_job_cancels_it() {
    let h = Harness::new();
    let mut spec = Harness::spec("/bin/true", &[]);
    spec.schedule = Some(chrono::Utc::now() + chrono::Duration::hours(1));
    let job = h.orchestrator.submit(None, spec).await.unwrap();
    h.wait_for_state(&job.id, JobState::Scheduled).await;

    h.orchestrator.stop(&job.id, false).await.unwrap();
    let done = h.wait_for_state(&job.id, JobState::Cancelled).await;
    // Never ran: no process side effects.
    assert_eq!(done.exit_code, None);
    assert!(done.started_at_ms.is_none());
    assert!(h.event_names().contains(&"job.cancelled"));
}

#[tokio::test]
async fn scheduled_job_dispatches_at_deadline() {
    let h = Harness::new();
    let mut spec = Harness::spec("/bin/true", &[]);
    spec.schedule = Some(chrono::Utc::now() + chrono::Duration::milliseconds(300));
    let job = h.orchestrator.submit(None, spec).await.unwrap();

    assert_eq!(job.state, JobState::Scheduled);
    let done = h.wait_for_state(&job.id, JobState::Completed).await;
    assert_eq!(done.exit_code, Some(0));
    assert!(h.event_names().starts_with(&["job.scheduled"]));
}

#[tokio::test]
async fn parallelism_cap_serializes_excess_jobs() {
    let h = Harness::new();
    // Cap is 4; submit 6 quick jobs and expect all to finish.
    let mut ids = Vec::new();
    for _ in 0..6 {
        let job = h
            .orchestrator
            .submit(None, Harness::spec("/bin/sleep", &["0.1"]))
            .await
            .unwrap();
        ids.push(job.id);
    }
    for id in &ids {
        h.wait_for_state(id, JobState::Completed).await;
    }
}

#[tokio::test]
async fn delete_refuses_live_jobs_and_removes_terminal_ones() {
    let h = Harness::new();
    let job = h
        .orchestrator
        .submit(None, Harness::spec("/bin/sleep", &["30"]))
        .await
        .unwrap();
    h.wait_for_state(&job.id, JobState::Running).await;

    assert!(matches!(
        h.orchestrator.delete(&job.id),
        Err(EngineError::InvalidState(_))
    ));

    h.orchestrator.stop(&job.id, true).await.unwrap();
    h.wait_for_state(&job.id, JobState::Stopped).await;
    h.orchestrator.delete(&job.id).unwrap();
    assert!(h.orchestrator.jobs().get(&job.id).is_none());
}

#[tokio::test]
async fn delete_all_skips_non_terminal() {
    let h = Harness::new();
    let done = h
        .orchestrator
        .submit(None, Harness::spec("/bin/true", &[]))
        .await
        .unwrap();
    h.wait_for_state(&done.id, JobState::Completed).await;

    let live = h
        .orchestrator
        .submit(None, Harness::spec("/bin/sleep", &["30"]))
        .await
        .unwrap();
    h.wait_for_state(&live.id, JobState::Running).await;

    let (deleted, skipped) = h.orchestrator.delete_all();
    assert_eq!((deleted, skipped), (1, 1));

    h.orchestrator.stop(&live.id, true).await.unwrap();
}

#[yare::parameterized(
    empty_command   = { JobSpec::default() },
    bad_cpu_mask    = { JobSpec { command: "/bin/true".into(), limits: jl_core::ResourceLimits { cpu_cores: Some("9-1".into()), ..Default::default() }, ..Default::default() } },
    unknown_volume  = { JobSpec { command: "/bin/true".into(), volumes: vec!["ghost".into()], ..Default::default() } },
    unknown_network = { JobSpec { command: "/bin/true".into(), network: Some("ghost".into()), ..Default::default() } },
)]
fn submissions_fail_validation(spec: JobSpec) {
    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap();
    rt.block_on(async {
        let h = Harness::new();
        let err = h.orchestrator.submit(None, spec).await.unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)), "got {err:?}");
        // Nothing registered, nothing acquired.
        assert!(h.orchestrator.jobs().is_empty());
    });
}

#[tokio::test]
async fn unknown_runtime_rejected() {
    let h = Harness::new();
    let mut spec = Harness::spec("/bin/true", &[]);
    spec.runtime = Some("python-3.11-ml@1.0.0".parse().unwrap());
    let err = h.orchestrator.submit(None, spec).await.unwrap_err();
    assert!(matches!(err, EngineError::Validation(_)));
}
