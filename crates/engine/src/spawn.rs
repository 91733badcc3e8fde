// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Re-exec child spawning and signalling.
//!
//! The parent never forks user code directly: it spawns its own binary with
//! `JOBLET_MODE=init` and the env contract, and the init path finishes the
//! isolation before exec'ing the user command. Stdout/stderr land in the
//! job's log file for streaming.

use crate::error::EngineError;
use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use std::path::Path;
use std::process::Stdio;
use tokio::process::{Child, Command};

/// How the child ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitKind {
    /// Normal exit with a code (user command pass-through, or an init
    /// failure class).
    Exited(i32),
    /// Killed by a signal.
    Signaled(i32),
}

impl ExitKind {
    /// Conventional exit code: pass-through, or 128+signal.
    pub fn code(&self) -> i32 {
        match self {
            ExitKind::Exited(code) => *code,
            ExitKind::Signaled(sig) => 128 + sig,
        }
    }
}

/// Spawn the re-exec init child with a fully explicit environment.
pub fn spawn_init(
    binary: &Path,
    env: Vec<(String, String)>,
    log_file: &Path,
) -> Result<Child, EngineError> {
    let open_log = || {
        std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(log_file)
            .map_err(|e| EngineError::Spawn(format!("open log {}: {e}", log_file.display())))
    };

    let mut command = Command::new(binary);
    command
        .env_clear()
        .envs(env)
        .stdin(Stdio::null())
        .stdout(Stdio::from(open_log()?))
        .stderr(Stdio::from(open_log()?))
        .kill_on_drop(false);

    command
        .spawn()
        .map_err(|e| EngineError::Spawn(format!("{}: {e}", binary.display())))
}

/// Wait for the child and classify its exit.
pub async fn wait_child(child: &mut Child) -> Result<ExitKind, EngineError> {
    use std::os::unix::process::ExitStatusExt;

    let status = child
        .wait()
        .await
        .map_err(|e| EngineError::Spawn(format!("wait: {e}")))?;

    if let Some(signal) = status.signal() {
        return Ok(ExitKind::Signaled(signal));
    }
    Ok(ExitKind::Exited(status.code().unwrap_or(127)))
}

/// Send a signal to a process by pid. Vanished processes are not an error.
pub fn signal_pid(pid: i32, signal: Signal) -> Result<(), EngineError> {
    match kill(Pid::from_raw(pid), signal) {
        Ok(()) => Ok(()),
        Err(nix::errno::Errno::ESRCH) => Ok(()),
        Err(e) => Err(EngineError::Spawn(format!("kill {pid}: {e}"))),
    }
}

/// Read whatever the init child wrote to its status FIFO, if anything.
///
/// The FIFO is opened non-blocking: buffered data is returned, an empty or
/// writer-less pipe yields `None`. Called after the child has exited.
pub fn read_status_line(path: &Path) -> Option<String> {
    use std::io::Read;
    use std::os::unix::fs::OpenOptionsExt;

    let mut file = std::fs::OpenOptions::new()
        .read(true)
        .custom_flags(nix::libc::O_NONBLOCK)
        .open(path)
        .ok()?;
    let mut buf = String::new();
    file.read_to_string(&mut buf).ok()?;
    let line = buf.lines().next()?.trim();
    if line.is_empty() {
        None
    } else {
        Some(line.to_string())
    }
}

#[cfg(test)]
#[path = "spawn_tests.rs"]
mod tests;
