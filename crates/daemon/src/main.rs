// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Joblet Daemon (jld)
//!
//! One binary, two lives: started plainly it is the node daemon owning the
//! stores, scheduler, and control socket; started with `JOBLET_MODE=init`
//! it is the isolation init for exactly one job and never reaches the
//! daemon path.

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

mod env;
mod lifecycle;
mod listener;
mod protocol;

use std::sync::Arc;

use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::Notify;
use tracing::{error, info};

use crate::lifecycle::{Config, LifecycleError, StartupResult};
use crate::listener::{ListenCtx, Listener};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // The init path must run before any async runtime exists: it joins
    // cgroups and enters namespaces for this very process.
    if std::env::var(jl_isolation::env_abi::JOBLET_MODE).as_deref()
        == Ok(jl_isolation::env_abi::MODE_INIT)
    {
        std::process::exit(jl_isolation::init::run());
    }

    // Handle info flags before any config/lock acquisition
    if let Some(arg) = std::env::args().nth(1) {
        match arg.as_str() {
            "--version" | "-V" | "-v" => {
                println!("jld {}", env!("CARGO_PKG_VERSION"));
                return Ok(());
            }
            "--help" | "-h" | "help" => {
                println!("jld {}", env!("CARGO_PKG_VERSION"));
                println!("Joblet Daemon - runs isolated jobs and workflows on this node");
                println!();
                println!("USAGE:");
                println!("    jld");
                println!();
                println!("The daemon listens on a Unix socket under the state directory");
                println!("(JOBLET_STATE_DIR) for control requests. It re-executes itself");
                println!("with JOBLET_MODE=init to set up isolation for each job.");
                println!();
                println!("OPTIONS:");
                println!("    -h, --help       Print help information");
                println!("    -v, --version    Print version information");
                return Ok(());
            }
            _ => {
                eprintln!("error: unexpected argument '{arg}'");
                eprintln!("Usage: jld [--help | --version]");
                std::process::exit(1);
            }
        }
    }

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    runtime.block_on(daemon_main())
}

async fn daemon_main() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::load()?;

    // Rotate log file if it has grown too large
    rotate_log_if_needed(&config.log_path);

    let log_guard = setup_logging(&config)?;

    info!("Starting jld {}", env!("CARGO_PKG_VERSION"));

    let StartupResult { daemon, listener } = match lifecycle::startup(&config).await {
        Ok(result) => result,
        Err(LifecycleError::LockFailed(path)) => {
            let pid = std::fs::read_to_string(&path).unwrap_or_default();
            eprintln!("jld is already running");
            if !pid.trim().is_empty() {
                eprintln!("  pid: {}", pid.trim());
            }
            std::process::exit(1);
        }
        Err(e) => {
            error!("Failed to start daemon: {e}");
            drop(log_guard);
            return Err(e.into());
        }
    };

    // Shutdown requested through the protocol.
    let shutdown_notify = Arc::new(Notify::new());

    let ctx = Arc::new(ListenCtx {
        orchestrator: Arc::clone(&daemon.orchestrator),
        workflows: Arc::clone(&daemon.workflows),
        volumes: Arc::clone(&daemon.volumes),
        networks: Arc::clone(&daemon.networks),
        bus: Arc::clone(&daemon.bus),
        shutdown: Arc::clone(&shutdown_notify),
    });
    tokio::spawn(Listener::new(listener, ctx).run());

    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;

    info!(
        "Daemon ready, listening on {}",
        config.socket_path.display()
    );
    println!("READY");

    tokio::select! {
        _ = shutdown_notify.notified() => {
            info!("Shutdown requested via command");
        }
        _ = sigterm.recv() => {
            info!("Received SIGTERM, shutting down...");
        }
        _ = sigint.recv() => {
            info!("Received SIGINT, shutting down...");
        }
    }

    daemon.shutdown();
    info!("Daemon stopped");
    Ok(())
}

/// Maximum log file size before rotation (10 MB).
const MAX_LOG_SIZE: u64 = 10 * 1024 * 1024;

/// Number of rotated log files to keep (daemon.log.1, .2, .3).
const MAX_ROTATED_LOGS: u32 = 3;

/// Rotate the daemon log file if it exceeds [`MAX_LOG_SIZE`].
///
/// Shifts `daemon.log` → `daemon.log.1` → `daemon.log.2` → `daemon.log.3`,
/// deleting the oldest. Best-effort: rotation failures are silently ignored
/// so the daemon still starts.
fn rotate_log_if_needed(log_path: &std::path::Path) {
    let size = match std::fs::metadata(log_path) {
        Ok(m) => m.len(),
        Err(_) => return,
    };

    if size < MAX_LOG_SIZE {
        return;
    }

    let log_str = log_path.display().to_string();

    for i in (1..MAX_ROTATED_LOGS).rev() {
        let from = format!("{log_str}.{i}");
        let to = format!("{log_str}.{}", i + 1);
        let _ = std::fs::rename(&from, &to);
    }

    let _ = std::fs::rename(log_path, format!("{log_str}.1"));
}

fn setup_logging(
    config: &Config,
) -> Result<tracing_appender::non_blocking::WorkerGuard, LifecycleError> {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    if let Some(parent) = config.log_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let file_appender = tracing_appender::rolling::never(
        config.log_path.parent().ok_or(LifecycleError::NoStateDir)?,
        config
            .log_path
            .file_name()
            .ok_or(LifecycleError::NoStateDir)?,
    );
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(non_blocking))
        .init();

    Ok(guard)
}
