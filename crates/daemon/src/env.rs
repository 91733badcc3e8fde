// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Centralized environment variable access for the daemon.

use std::path::PathBuf;
use std::time::Duration;

use crate::lifecycle::LifecycleError;

/// Resolve state directory: JOBLET_STATE_DIR > XDG_STATE_HOME/joblet >
/// ~/.local/state/joblet
pub fn state_dir() -> Result<PathBuf, LifecycleError> {
    if let Ok(dir) = std::env::var("JOBLET_STATE_DIR") {
        return Ok(PathBuf::from(dir));
    }
    if let Ok(xdg) = std::env::var("XDG_STATE_HOME") {
        return Ok(PathBuf::from(xdg).join("joblet"));
    }
    let home = std::env::var("HOME").map_err(|_| LifecycleError::NoStateDir)?;
    Ok(PathBuf::from(home).join(".local/state/joblet"))
}

/// Host cgroup2 mount override.
pub fn cgroup_root() -> PathBuf {
    std::env::var("JOBLET_CGROUP_ROOT")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("/sys/fs/cgroup"))
}

/// Built runtime roots directory override.
pub fn runtimes_dir(state_dir: &std::path::Path) -> PathBuf {
    std::env::var("JOBLET_RUNTIMES_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| state_dir.join("runtimes"))
}

/// Volume data root override.
pub fn volumes_dir(state_dir: &std::path::Path) -> PathBuf {
    std::env::var("JOBLET_VOLUMES_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| state_dir.join("volumes"))
}

/// `MAJ:MIN` device for io.max limits.
pub fn io_device() -> Option<String> {
    std::env::var("JOBLET_IO_DEVICE").ok()
}

/// Graceful-stop window override.
pub fn stop_grace() -> Option<Duration> {
    std::env::var("JOBLET_STOP_GRACE_MS")
        .ok()
        .and_then(|s| s.parse::<u64>().ok())
        .map(Duration::from_millis)
}

/// Running-job cap override.
pub fn parallelism() -> Option<usize> {
    std::env::var("JOBLET_MAX_PARALLEL")
        .ok()
        .and_then(|s| s.parse::<usize>().ok())
        .filter(|n| *n > 0)
}
