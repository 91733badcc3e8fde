// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Daemon startup and shutdown wiring.

use jl_core::{SystemClock, UuidIdGen};
use jl_engine::{DependencyResolver, EngineConfig, EventBus, Orchestrator, WorkflowEngine};
use jl_storage::{JobStore, NetworkStore, VolumeStore};
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;
use tokio::net::UnixListener;
use tokio_util::sync::CancellationToken;

pub type DaemonOrchestrator = Orchestrator<SystemClock, UuidIdGen>;
pub type DaemonWorkflows = WorkflowEngine<SystemClock, UuidIdGen>;

/// Errors during daemon startup and shutdown.
#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("no usable state directory (HOME unset?)")]
    NoStateDir,

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("another jld owns {}", .0.display())]
    LockFailed(PathBuf),
}

/// Resolved daemon configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub state_dir: PathBuf,
    pub socket_path: PathBuf,
    pub log_path: PathBuf,
    pub lock_path: PathBuf,
    pub engine: EngineConfig,
}

impl Config {
    pub fn load() -> Result<Self, LifecycleError> {
        let state_dir = crate::env::state_dir()?;

        let mut engine = EngineConfig::new(&state_dir);
        engine.cgroup_root = crate::env::cgroup_root();
        engine.runtimes_dir = crate::env::runtimes_dir(&state_dir);
        engine.volumes_dir = crate::env::volumes_dir(&state_dir);
        engine.io_device = crate::env::io_device();
        if let Some(grace) = crate::env::stop_grace() {
            engine.stop_grace = grace;
        }
        if let Some(parallelism) = crate::env::parallelism() {
            engine.parallelism = parallelism;
        }

        Ok(Self {
            socket_path: state_dir.join("jld.sock"),
            log_path: state_dir.join("logs/daemon.log"),
            lock_path: state_dir.join("jld.pid"),
            engine,
            state_dir,
        })
    }
}

/// Everything a running daemon holds.
pub struct Daemon {
    pub config: Config,
    pub bus: Arc<EventBus>,
    pub jobs: Arc<JobStore>,
    pub volumes: Arc<VolumeStore>,
    pub networks: Arc<NetworkStore>,
    pub orchestrator: Arc<DaemonOrchestrator>,
    pub workflows: Arc<DaemonWorkflows>,
    pub token: CancellationToken,
}

pub struct StartupResult {
    pub daemon: Daemon,
    pub listener: UnixListener,
}

/// Build the component graph and bind the control socket.
pub async fn startup(config: &Config) -> Result<StartupResult, LifecycleError> {
    std::fs::create_dir_all(&config.state_dir)?;
    acquire_lock(&config.lock_path)?;

    let bus = Arc::new(EventBus::new());
    let jobs = Arc::new(JobStore::new());
    let volumes = Arc::new(VolumeStore::new());
    let networks = Arc::new(NetworkStore::new());

    let orchestrator = Arc::new(Orchestrator::new(
        config.engine.clone(),
        Arc::clone(&jobs),
        Arc::clone(&volumes),
        Arc::clone(&networks),
        Arc::clone(&bus),
        SystemClock,
        UuidIdGen,
    ));
    let workflows = WorkflowEngine::new(Arc::clone(&orchestrator), Arc::new(DependencyResolver::new()));
    workflows.attach(&bus);

    // Dispatch loop lives for the daemon's lifetime.
    let token = CancellationToken::new();
    tokio::spawn(Arc::clone(&orchestrator).run(token.clone()));

    // Stale socket from an unclean shutdown.
    let _ = std::fs::remove_file(&config.socket_path);
    let listener = UnixListener::bind(&config.socket_path)?;

    tracing::info!(socket = %config.socket_path.display(), "daemon components ready");
    Ok(StartupResult {
        daemon: Daemon {
            config: config.clone(),
            bus,
            jobs,
            volumes,
            networks,
            orchestrator,
            workflows,
            token,
        },
        listener,
    })
}

impl Daemon {
    /// Stop the dispatch loop and release the lock and socket.
    pub fn shutdown(&self) {
        self.token.cancel();
        let _ = std::fs::remove_file(&self.config.socket_path);
        let _ = std::fs::remove_file(&self.config.lock_path);
    }
}

/// Take the pid lock, refusing while another live daemon holds it.
fn acquire_lock(lock_path: &PathBuf) -> Result<(), LifecycleError> {
    if let Ok(raw) = std::fs::read_to_string(lock_path) {
        if let Ok(pid) = raw.trim().parse::<i32>() {
            let alive = matches!(
                nix::sys::signal::kill(nix::unistd::Pid::from_raw(pid), None),
                Ok(()) | Err(nix::errno::Errno::EPERM)
            );
            if alive && pid != std::process::id() as i32 {
                return Err(LifecycleError::LockFailed(lock_path.clone()));
            }
        }
        // Stale lock from a dead process.
        let _ = std::fs::remove_file(lock_path);
    }
    std::fs::write(lock_path, std::process::id().to_string())?;
    Ok(())
}

#[cfg(test)]
#[path = "lifecycle_tests.rs"]
mod tests;
