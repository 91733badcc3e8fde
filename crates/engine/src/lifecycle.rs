// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Job lifecycle orchestration: validate, allocate, launch, observe, stop.
//!
//! One orchestrator per daemon. Submissions are validated before anything is
//! acquired; dispatch acquires kernel resources behind a finalizer list that
//! is released exactly once on every exit path; a monitor task per running
//! job waits on the child and drives the terminal transition. Every
//! transition writes the job store and publishes exactly one event.

use crate::bus::EventBus;
use crate::error::EngineError;
use crate::scheduler::Scheduler;
use crate::spawn::{self, ExitKind};
use jl_core::{Clock, Event, IdGen, Job, JobId, JobSpec, JobState, Volume};
use jl_isolation::{
    CgroupController, CgroupHandle, JobEnvironment, NetworkController, NetworkHandle,
    UploadManager, UploadTransport, VolumeMounts,
};
use jl_storage::{JobStore, NetworkStore, VolumeStore};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

/// Static engine configuration.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub state_dir: PathBuf,
    /// Host cgroup2 mount.
    pub cgroup_root: PathBuf,
    /// Built runtime roots, one directory per `RuntimeSpec::full_name()`.
    pub runtimes_dir: PathBuf,
    /// Volume data root.
    pub volumes_dir: PathBuf,
    /// Self executable for the re-exec handoff.
    pub binary_path: PathBuf,
    pub node_id: String,
    /// SIGTERM-to-SIGKILL window for graceful stop.
    pub stop_grace: Duration,
    /// Concurrent running-job cap.
    pub parallelism: usize,
    /// `MAJ:MIN` device for io.max, when IO limits are used.
    pub io_device: Option<String>,
}

impl EngineConfig {
    pub fn new(state_dir: impl Into<PathBuf>) -> Self {
        let state_dir = state_dir.into();
        Self {
            cgroup_root: PathBuf::from("/sys/fs/cgroup"),
            runtimes_dir: state_dir.join("runtimes"),
            volumes_dir: state_dir.join("volumes"),
            binary_path: std::env::current_exe().unwrap_or_else(|_| PathBuf::from("jld")),
            node_id: nix::unistd::gethostname()
                .ok()
                .and_then(|h| h.into_string().ok())
                .unwrap_or_else(|| "joblet".to_string()),
            stop_grace: Duration::from_secs(10),
            parallelism: Scheduler::default_parallelism(),
            io_device: None,
            state_dir,
        }
    }
}

/// Everything acquired for a dispatch, released exactly once.
enum Finalizer {
    Cgroup(CgroupHandle),
    Lease { network: String },
    Netns(NetworkHandle),
    Uploads,
}

struct RunningJob {
    pid: i32,
    stopping: bool,
}

/// The job lifecycle orchestrator.
pub struct Orchestrator<C: Clock, G: IdGen> {
    config: EngineConfig,
    jobs: Arc<JobStore>,
    volumes: Arc<VolumeStore>,
    networks: Arc<NetworkStore>,
    bus: Arc<EventBus>,
    cgroups: CgroupController,
    netctl: NetworkController,
    volmounts: VolumeMounts,
    uploads: UploadManager,
    clock: C,
    id_gen: G,
    scheduler: Mutex<Scheduler>,
    wake: Notify,
    running: Mutex<HashMap<JobId, RunningJob>>,
}

impl<C: Clock, G: IdGen + 'static> Orchestrator<C, G> {
    pub fn new(
        config: EngineConfig,
        jobs: Arc<JobStore>,
        volumes: Arc<VolumeStore>,
        networks: Arc<NetworkStore>,
        bus: Arc<EventBus>,
        clock: C,
        id_gen: G,
    ) -> Self {
        Self {
            cgroups: CgroupController::new(&config.cgroup_root),
            netctl: NetworkController::new(),
            volmounts: VolumeMounts::new(&config.volumes_dir),
            uploads: UploadManager::new(&config.state_dir),
            scheduler: Mutex::new(Scheduler::new(config.parallelism)),
            wake: Notify::new(),
            running: Mutex::new(HashMap::new()),
            config,
            jobs,
            volumes,
            networks,
            bus,
            clock,
            id_gen,
        }
    }

    pub fn bus(&self) -> &Arc<EventBus> {
        &self.bus
    }

    pub fn jobs(&self) -> &Arc<JobStore> {
        &self.jobs
    }

    pub fn uploads(&self) -> &UploadManager {
        &self.uploads
    }

    pub fn volume_mounts(&self) -> &VolumeMounts {
        &self.volmounts
    }

    pub fn network_controller(&self) -> &NetworkController {
        &self.netctl
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    /// Validate and register a standalone job, then queue it.
    pub async fn submit(
        &self,
        name: Option<String>,
        spec: JobSpec,
    ) -> Result<Job, EngineError> {
        self.submit_with_uploads(name, spec, Vec::new()).await
    }

    /// Like [`Orchestrator::submit`], with upload content to stage before
    /// the job can dispatch. `contents` pairs each declared upload path
    /// with its bytes.
    pub async fn submit_with_uploads(
        &self,
        name: Option<String>,
        spec: JobSpec,
        contents: Vec<(String, Vec<u8>)>,
    ) -> Result<Job, EngineError> {
        self.validate_spec(&spec)?;

        let id = JobId::new(self.id_gen.next());
        self.stage_contents(&id, &spec, contents)?;

        let mut job = Job::new(id.clone(), name, spec);
        job.node = self.config.node_id.clone();
        self.jobs.put(job.clone())?;

        let now_ms = self.clock.epoch_ms();
        let schedule_ms = job
            .spec
            .schedule
            .map(|at| at.timestamp_millis().max(0) as u64)
            .filter(|at_ms| *at_ms > now_ms);

        match schedule_ms {
            Some(at_ms) => {
                let job = self.jobs.transition(&id, JobState::Scheduled, now_ms)?;
                self.scheduler.lock().schedule_at(id.clone(), at_ms);
                self.publish(Event::JobScheduled {
                    job_id: id,
                    at_ms: now_ms,
                    scheduled_for_ms: at_ms,
                })
                .await;
                self.wake.notify_one();
                Ok(job)
            }
            None => {
                self.scheduler.lock().enqueue(id);
                self.wake.notify_one();
                Ok(job)
            }
        }
    }

    /// Register a workflow member job without queuing it; the resolver
    /// admits it once its requirements hold.
    pub fn register_member(
        &self,
        workflow: jl_core::WorkflowId,
        name: &str,
        spec: JobSpec,
        contents: Vec<(String, Vec<u8>)>,
    ) -> Result<Job, EngineError> {
        self.validate_spec(&spec)?;
        let id = JobId::new(self.id_gen.next());
        self.stage_contents(&id, &spec, contents)?;
        let mut job = Job::new(id, Some(name.to_string()), spec);
        job.node = self.config.node_id.clone();
        job.workflow = Some(workflow);
        self.jobs.put(job.clone())?;
        Ok(job)
    }

    fn stage_contents(
        &self,
        id: &JobId,
        spec: &JobSpec,
        contents: Vec<(String, Vec<u8>)>,
    ) -> Result<(), EngineError> {
        for (path, data) in &contents {
            let file = spec
                .uploads
                .iter()
                .find(|u| &u.path == path)
                .ok_or_else(|| {
                    EngineError::Validation(format!("content for undeclared upload '{path}'"))
                })?;
            self.uploads
                .stage(id, file, data)
                .map_err(|e| EngineError::Validation(e.to_string()))?;
        }
        Ok(())
    }

    /// Queue an already-registered job for immediate dispatch.
    pub fn enqueue(&self, id: JobId) {
        self.scheduler.lock().enqueue(id);
        self.wake.notify_one();
    }

    /// Check a spec against the grammar and the registered resources.
    pub fn validate_spec(&self, spec: &JobSpec) -> Result<(), EngineError> {
        if spec.command.is_empty() {
            return Err(EngineError::Validation("command must not be empty".into()));
        }

        if let Some(runtime) = &spec.runtime {
            let dir = self.config.runtimes_dir.join(runtime.full_name());
            if !dir.is_dir() {
                return Err(EngineError::Validation(format!(
                    "unknown runtime '{runtime}'"
                )));
            }
        }

        if let Some(network) = &spec.network {
            if !self.networks.contains(network) {
                return Err(EngineError::Validation(format!(
                    "unknown network '{network}'"
                )));
            }
        }

        for volume in &spec.volumes {
            if !self.volumes.contains(volume) {
                return Err(EngineError::Validation(format!(
                    "unknown volume '{volume}'"
                )));
            }
        }

        if let Some(cores) = spec.limits.cpu_cores.as_deref() {
            jl_isolation::cpuset::parse_cpu_list(cores)
                .map_err(|e| EngineError::Validation(e.to_string()))?;
        }

        Ok(())
    }

    /// The dispatch loop: runs until cancelled, starting jobs as slots and
    /// deadlines allow.
    pub async fn run(self: Arc<Self>, token: CancellationToken) {
        loop {
            loop {
                let next = {
                    let mut scheduler = self.scheduler.lock();
                    scheduler.start_next(self.clock.epoch_ms())
                };
                match next {
                    Some(id) => self.dispatch(id).await,
                    None => break,
                }
            }

            let deadline_ms = self.scheduler.lock().next_deadline_ms();
            tokio::select! {
                _ = token.cancelled() => break,
                _ = self.wake.notified() => {}
                _ = Self::sleep_until_ms(&self.clock, deadline_ms) => {}
            }
        }
        tracing::info!("dispatch loop stopped");
    }

    async fn sleep_until_ms(clock: &C, deadline_ms: Option<u64>) {
        match deadline_ms {
            None => std::future::pending().await,
            Some(at_ms) => {
                let now_ms = clock.epoch_ms();
                let wait = at_ms.saturating_sub(now_ms);
                tokio::time::sleep(Duration::from_millis(wait.max(10))).await;
            }
        }
    }

    /// Launch one queued job: acquire, spawn, observe.
    async fn dispatch(self: &Arc<Self>, id: JobId) {
        let Some(job) = self.jobs.get(&id) else {
            self.scheduler.lock().finished(&id);
            return;
        };
        if !matches!(job.state, JobState::Pending | JobState::Scheduled) {
            self.scheduler.lock().finished(&id);
            return;
        }

        match self.prepare_and_spawn(&job).await {
            Ok(launched) => {
                let now_ms = self.clock.epoch_ms();
                let update = self.jobs.update(&id, |j| {
                    j.state = JobState::Running;
                    j.started_at_ms = Some(now_ms);
                    j.cgroup_path = Some(launched.cgroup_job_path.clone());
                    j.ip = launched.ip;
                });
                if let Err(e) = update {
                    tracing::error!(job = %id.short(8), error = %e, "store update at launch failed");
                }
                self.running.lock().insert(
                    id.clone(),
                    RunningJob {
                        pid: launched.pid,
                        stopping: false,
                    },
                );
                self.publish(Event::JobStarted {
                    job_id: id.clone(),
                    at_ms: now_ms,
                    node: self.config.node_id.clone(),
                })
                .await;

                let orchestrator = Arc::clone(self);
                tokio::spawn(orchestrator.monitor(
                    id,
                    launched.child,
                    launched.finalizers,
                    launched.status_pipe,
                ));
            }
            Err(e) => {
                tracing::warn!(job = %id.short(8), error = %e, "dispatch failed");
                self.finish_job(
                    &id,
                    JobState::Failed,
                    None,
                    Some(e.to_string()),
                    Event::JobFailed {
                        job_id: id.clone(),
                        at_ms: self.clock.epoch_ms(),
                        exit_code: None,
                        reason: e.to_string(),
                    },
                )
                .await;
            }
        }
    }

    /// Acquire resources and spawn the init child. On error every partial
    /// acquisition is released before returning.
    async fn prepare_and_spawn(&self, job: &Job) -> Result<Launched, EngineError> {
        let mut finalizers: Vec<Finalizer> = Vec::new();

        let result = self.prepare_and_spawn_inner(job, &mut finalizers).await;
        match result {
            Ok(launched) => Ok(launched),
            Err(e) => {
                self.release_finalizers(&job.id, finalizers).await;
                Err(e)
            }
        }
    }

    async fn prepare_and_spawn_inner(
        &self,
        job: &Job,
        finalizers: &mut Vec<Finalizer>,
    ) -> Result<Launched, EngineError> {
        let id = &job.id;
        let spec = &job.spec;

        // Cgroup directory first; its path is part of the job record.
        let cgroup = self.cgroups.acquire(id)?;
        let cgroup_job_path = cgroup.job_path.clone();
        let cgroup_host_path = cgroup.host_path.clone();
        finalizers.push(Finalizer::Cgroup(cgroup));

        // Network lease and namespace, when requested.
        let mut ip = None;
        let mut netns = None;
        if let Some(network_name) = &spec.network {
            let leased = self.networks.allocate_ip(network_name, id)?;
            finalizers.push(Finalizer::Lease {
                network: network_name.clone(),
            });
            let network = self
                .networks
                .get(network_name)
                .ok_or_else(|| EngineError::Validation(format!("unknown network '{network_name}'")))?;
            self.netctl.setup_bridge(&network).await?;
            let handle = self.netctl.acquire(id, &network, leased).await?;
            ip = Some(leased);
            netns = Some(handle.netns.clone());
            finalizers.push(Finalizer::Netns(handle));
        }

        // Volume mount plan.
        let volumes: Vec<Volume> = spec
            .volumes
            .iter()
            .filter_map(|name| self.volumes.get(name))
            .collect();
        let mounts = self.volmounts.mount_plan(&volumes)?;

        // Upload session and transport.
        let job_dir = self.config.state_dir.join("jobs").join(id.as_str());
        std::fs::create_dir_all(&job_dir)
            .map_err(|e| EngineError::Spawn(format!("create job dir: {e}")))?;

        let mut upload_env = None;
        if !spec.uploads.is_empty() {
            let session =
                self.uploads
                    .prepare_session(id, spec.uploads.clone(), spec.limits.max_memory_mb);
            let transport = self.uploads.create_pipe_transport(&session)?;
            finalizers.push(Finalizer::Uploads);
            let UploadTransport::Pipe { path } = transport else {
                return Err(EngineError::Spawn("expected pipe transport".into()));
            };
            upload_env = Some(jl_isolation::env_abi::UploadEnv {
                total_files: session.total_files,
                total_bytes: session.total_bytes,
                pipe: Some(path.clone()),
            });

            // The producer keeps feeding the FIFO while init drains it.
            let manager_state_dir = self.config.state_dir.clone();
            let producer_session = session.clone();
            tokio::spawn(async move {
                let manager = UploadManager::new(manager_state_dir);
                if let Err(e) = manager.produce_pipe(&producer_session, &path).await {
                    tracing::warn!(
                        job = %producer_session.job_id.short(8),
                        error = %e,
                        "upload producer ended early"
                    );
                }
            });
        }

        // Status FIFO for init failure reports.
        let status_pipe = job_dir.join("init.status");
        if !status_pipe.exists() {
            nix::unistd::mkfifo(
                &status_pipe,
                nix::sys::stat::Mode::S_IRUSR | nix::sys::stat::Mode::S_IWUSR,
            )
            .map_err(|e| EngineError::Spawn(format!("mkfifo status pipe: {e}")))?;
        }

        // Root to seal into: a built runtime, or the job's own root for
        // runtime builds and runtime-less jobs.
        let runtime_root = match (&spec.runtime, spec.job_type) {
            (Some(runtime), jl_core::JobType::Standard) => {
                self.config.runtimes_dir.join(runtime.full_name())
            }
            _ => {
                let root = job_dir.join("root");
                std::fs::create_dir_all(&root)
                    .map_err(|e| EngineError::Spawn(format!("create job root: {e}")))?;
                root
            }
        };

        let environment = JobEnvironment {
            job_id: id.clone(),
            command: spec.command.clone(),
            args: spec.args.clone(),
            cgroup_host_path,
            limits: spec.limits.clone(),
            io_device: self.config.io_device.clone(),
            scheduled_time: spec.schedule,
            binary_path: self.config.binary_path.clone(),
            upload: upload_env,
            runtime_root,
            working_dir: spec.working_dir.clone(),
            netns,
            mounts,
            status_pipe: Some(status_pipe.clone()),
            env: spec.env.clone().into_iter().collect(),
            secret_env: spec.secret_env.clone().into_iter().collect(),
        };

        let log_file = job_dir.join("output.log");
        let child = spawn::spawn_init(&self.config.binary_path, environment.to_env(), &log_file)?;
        let pid = child.id().map(|p| p as i32).unwrap_or(-1);

        tracing::info!(job = %id.short(8), pid, "job launched");
        Ok(Launched {
            child,
            pid,
            cgroup_job_path,
            ip,
            finalizers: std::mem::take(finalizers),
            status_pipe,
        })
    }

    /// Observe one running child to its terminal transition.
    async fn monitor(
        self: Arc<Self>,
        id: JobId,
        mut child: tokio::process::Child,
        finalizers: Vec<Finalizer>,
        status_pipe: PathBuf,
    ) {
        let exit = spawn::wait_child(&mut child).await;
        let stopping = {
            let mut running = self.running.lock();
            let stopping = running.get(&id).map(|r| r.stopping).unwrap_or(false);
            running.remove(&id);
            stopping
        };
        let status_line = spawn::read_status_line(&status_pipe);
        let at_ms = self.clock.epoch_ms();

        let (state, exit_code, failure, event) = match exit {
            Err(e) => {
                let reason = e.to_string();
                (
                    JobState::Failed,
                    None,
                    Some(reason.clone()),
                    Event::JobFailed {
                        job_id: id.clone(),
                        at_ms,
                        exit_code: None,
                        reason,
                    },
                )
            }
            Ok(kind) if stopping => (
                JobState::Stopped,
                Some(kind.code()),
                None,
                Event::JobStopped {
                    job_id: id.clone(),
                    at_ms,
                },
            ),
            Ok(ExitKind::Exited(0)) => (
                JobState::Completed,
                Some(0),
                None,
                Event::JobCompleted {
                    job_id: id.clone(),
                    at_ms,
                    exit_code: 0,
                },
            ),
            Ok(ExitKind::Exited(code)) => {
                let reason = status_line.unwrap_or_else(|| format!("exit code {code}"));
                (
                    JobState::Failed,
                    Some(code),
                    Some(reason.clone()),
                    Event::JobFailed {
                        job_id: id.clone(),
                        at_ms,
                        exit_code: Some(code),
                        reason,
                    },
                )
            }
            Ok(ExitKind::Signaled(signal)) => {
                let reason = format!("terminated by signal {signal}");
                (
                    JobState::Failed,
                    Some(128 + signal),
                    Some(reason.clone()),
                    Event::JobFailed {
                        job_id: id.clone(),
                        at_ms,
                        exit_code: Some(128 + signal),
                        reason,
                    },
                )
            }
        };

        self.release_finalizers(&id, finalizers).await;
        self.finish_with(&id, state, exit_code, failure, event, at_ms).await;
    }

    /// Terminal bookkeeping for a job that never launched or just exited.
    async fn finish_job(
        &self,
        id: &JobId,
        state: JobState,
        exit_code: Option<i32>,
        failure: Option<String>,
        event: Event,
    ) {
        let at_ms = self.clock.epoch_ms();
        self.finish_with(id, state, exit_code, failure, event, at_ms).await;
    }

    async fn finish_with(
        &self,
        id: &JobId,
        state: JobState,
        exit_code: Option<i32>,
        failure: Option<String>,
        event: Event,
        at_ms: u64,
    ) {
        let update = self.jobs.update(id, |j| {
            j.state = state;
            j.ended_at_ms = Some(at_ms);
            j.exit_code = exit_code;
            j.failure = failure.clone();
        });
        if let Err(e) = update {
            tracing::error!(job = %id.short(8), error = %e, "terminal store update failed");
        }
        self.publish(event).await;
        self.scheduler.lock().finished(id);
        self.wake.notify_one();
    }

    /// Release every acquisition exactly once and clear resource fields.
    async fn release_finalizers(&self, id: &JobId, finalizers: Vec<Finalizer>) {
        for finalizer in finalizers {
            match finalizer {
                Finalizer::Cgroup(handle) => {
                    if let Err(e) = self.cgroups.release(&handle) {
                        tracing::warn!(job = %id.short(8), error = %e, "cgroup release failed");
                    }
                }
                Finalizer::Lease { network } => {
                    self.networks.release_ip(&network, id);
                }
                Finalizer::Netns(handle) => {
                    if let Err(e) = self.netctl.release(&handle).await {
                        tracing::warn!(job = %id.short(8), error = %e, "netns release failed");
                    }
                }
                Finalizer::Uploads => {
                    self.uploads.cleanup(id);
                }
            }
        }
        if let Err(e) = self.jobs.clear_resources(id) {
            tracing::debug!(job = %id.short(8), error = %e, "resource field cleanup skipped");
        }
    }

    /// Stop a job. Idempotent: stopping a terminal or already-stopping job
    /// changes nothing.
    ///
    /// Waiting jobs transition straight to `Cancelled` with no side
    /// effects; running jobs get SIGTERM and, after the grace window,
    /// SIGKILL. `force` skips the grace window.
    pub async fn stop(self: &Arc<Self>, id: &JobId, force: bool) -> Result<(), EngineError> {
        let job = self
            .jobs
            .get(id)
            .ok_or_else(|| EngineError::JobNotFound(id.to_string()))?;

        match job.state {
            // Already terminal: nothing to do.
            JobState::Completed | JobState::Failed | JobState::Stopped | JobState::Cancelled => {
                Ok(())
            }
            JobState::Pending | JobState::Scheduled => {
                self.cancel_waiting(id, "stopped before dispatch").await;
                Ok(())
            }
            JobState::Running => {
                let pid = {
                    let mut running = self.running.lock();
                    match running.get_mut(id) {
                        Some(entry) => {
                            if entry.stopping && !force {
                                return Ok(());
                            }
                            entry.stopping = true;
                            Some(entry.pid)
                        }
                        None => None,
                    }
                };
                let Some(pid) = pid else {
                    // Monitor already reaping it.
                    return Ok(());
                };

                if force {
                    spawn::signal_pid(pid, nix::sys::signal::Signal::SIGKILL)?;
                    return Ok(());
                }

                spawn::signal_pid(pid, nix::sys::signal::Signal::SIGTERM)?;
                let orchestrator = Arc::clone(self);
                let id = id.clone();
                let grace = self.config.stop_grace;
                tokio::spawn(async move {
                    tokio::time::sleep(grace).await;
                    let still_running = orchestrator.running.lock().contains_key(&id);
                    if still_running {
                        tracing::info!(job = %id.short(8), "grace expired, escalating to SIGKILL");
                        let _ = spawn::signal_pid(pid, nix::sys::signal::Signal::SIGKILL);
                    }
                });
                Ok(())
            }
        }
    }

    /// Cancel a job that is not running (workflow cascade or stop-before-
    /// dispatch). Running jobs are routed through the stop path.
    pub async fn cancel(self: &Arc<Self>, id: &JobId, reason: &str) -> Result<(), EngineError> {
        let job = self
            .jobs
            .get(id)
            .ok_or_else(|| EngineError::JobNotFound(id.to_string()))?;

        match job.state {
            state if state.is_terminal() => Ok(()),
            JobState::Running => self.stop(id, false).await,
            _ => {
                self.cancel_waiting_with_reason(id, reason).await;
                Ok(())
            }
        }
    }

    async fn cancel_waiting(&self, id: &JobId, reason: &str) {
        self.cancel_waiting_with_reason(id, reason).await;
    }

    async fn cancel_waiting_with_reason(&self, id: &JobId, reason: &str) {
        self.scheduler.lock().cancel(id);
        let at_ms = self.clock.epoch_ms();
        let update = self.jobs.update(id, |j| {
            j.state = JobState::Cancelled;
            j.ended_at_ms = Some(at_ms);
        });
        match update {
            Ok(_) => {
                self.publish(Event::JobCancelled {
                    job_id: id.clone(),
                    at_ms,
                    reason: reason.to_string(),
                })
                .await;
            }
            Err(e) => {
                tracing::debug!(job = %id.short(8), error = %e, "cancel on terminal job skipped");
            }
        }
    }

    /// Delete a terminal job's record. Refused while the job is live or
    /// still holds resources.
    pub fn delete(&self, id: &JobId) -> Result<(), EngineError> {
        let job = self
            .jobs
            .get(id)
            .ok_or_else(|| EngineError::JobNotFound(id.to_string()))?;
        if !job.is_terminal() {
            return Err(EngineError::InvalidState(id.to_string()));
        }
        if job.holds_resources() {
            return Err(EngineError::ResourcesHeld(id.to_string()));
        }
        self.jobs.delete(id)?;
        self.uploads.cleanup(id);
        let job_dir = self.config.state_dir.join("jobs").join(id.as_str());
        let _ = std::fs::remove_dir_all(job_dir);
        Ok(())
    }

    /// Delete every deletable job. Returns (deleted, skipped).
    pub fn delete_all(&self) -> (usize, usize) {
        let mut deleted = 0;
        let mut skipped = 0;
        for job in self.jobs.list() {
            match self.delete(&job.id) {
                Ok(()) => deleted += 1,
                Err(_) => skipped += 1,
            }
        }
        (deleted, skipped)
    }

    async fn publish(&self, event: Event) {
        if let Err(e) = self.bus.publish(event).await {
            // Handler failures are transient by policy; the transition
            // itself already committed.
            tracing::warn!(error = %e, "event fan-out reported failures");
        }
    }
}

struct Launched {
    child: tokio::process::Child,
    pid: i32,
    cgroup_job_path: String,
    ip: Option<std::net::Ipv4Addr>,
    finalizers: Vec<Finalizer>,
    status_pipe: PathBuf,
}

#[cfg(test)]
#[path = "lifecycle_tests.rs"]
mod tests;
