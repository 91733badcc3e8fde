// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! cgroup v2 directories, one per job, under `<cgroup root>/joblet/<uuid>`.
//!
//! The parent creates the per-job directory and enables controllers; the
//! init child writes the limit files and joins by writing its own PID (see
//! [`apply_limits`] and [`join`], both called from the init path with values
//! carried across the env ABI).

use crate::cpuset;
use crate::error::IsolationError;
use jl_core::{JobId, ResourceLimits};
use std::path::{Path, PathBuf};

/// cgroup2 period used for `cpu.max`, in microseconds.
const CPU_PERIOD_US: u64 = 100_000;

/// Controllers enabled for job subtrees.
const SUBTREE_CONTROLLERS: &str = "+cpu +memory +io +cpuset";

/// Handle for an acquired per-job cgroup directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CgroupHandle {
    /// Host-side directory, e.g. `/sys/fs/cgroup/joblet/<uuid>`.
    pub host_path: PathBuf,
    /// Namespace-relative path recorded on the job, `/joblet/<uuid>`.
    pub job_path: String,
}

/// Creates and removes per-job cgroup directories.
pub struct CgroupController {
    /// Host cgroup2 mount, normally `/sys/fs/cgroup`.
    root: PathBuf,
}

impl CgroupController {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Deterministic namespace-relative cgroup path for a job.
    pub fn job_path(job: &JobId) -> String {
        format!("/joblet/{job}")
    }

    fn base_dir(&self) -> PathBuf {
        self.root.join("joblet")
    }

    fn job_dir(&self, job: &JobId) -> PathBuf {
        self.base_dir().join(job.as_str())
    }

    /// Create the per-job directory and enable controllers on the parent.
    ///
    /// Enabling controllers is idempotent and best-effort on kernels where a
    /// controller (cpuset, io) is unavailable; limit writes then fail loudly
    /// in init instead.
    pub fn acquire(&self, job: &JobId) -> Result<CgroupHandle, IsolationError> {
        let base = self.base_dir();
        std::fs::create_dir_all(&base).map_err(|e| IsolationError::io(&base, e))?;

        let subtree = base.join("cgroup.subtree_control");
        if subtree.exists() {
            if let Err(e) = std::fs::write(&subtree, SUBTREE_CONTROLLERS) {
                tracing::warn!(path = %subtree.display(), error = %e, "could not enable all controllers");
            }
        }

        let dir = self.job_dir(job);
        std::fs::create_dir_all(&dir).map_err(|e| IsolationError::io(&dir, e))?;

        Ok(CgroupHandle {
            host_path: dir,
            job_path: Self::job_path(job),
        })
    }

    /// Remove the per-job directory. The directory must be empty of live
    /// processes; the lifecycle layer only releases after the child is gone.
    pub fn release(&self, handle: &CgroupHandle) -> Result<(), IsolationError> {
        match std::fs::remove_dir(&handle.host_path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(IsolationError::io(&handle.host_path, e)),
        }
    }
}

/// Write the resource limit files into a job cgroup directory.
///
/// Runs on the init side before namespace entry, with limits read back from
/// the env ABI. `io.max` needs a device; absent a configured one it is
/// skipped.
pub fn apply_limits(
    dir: &Path,
    limits: &ResourceLimits,
    io_device: Option<&str>,
) -> Result<(), IsolationError> {
    if limits.max_cpu > 0 {
        let quota = u64::from(limits.max_cpu) * CPU_PERIOD_US / 100;
        write_file(dir, "cpu.max", &format!("{quota} {CPU_PERIOD_US}"))?;
    }

    if limits.max_memory_mb > 0 {
        write_file(dir, "memory.max", &(limits.max_memory_mb * 1024 * 1024).to_string())?;
    }

    if limits.max_io_bps > 0 {
        if let Some(device) = io_device {
            let line = format!(
                "{device} rbps={bps} wbps={bps}",
                bps = limits.max_io_bps
            );
            write_file(dir, "io.max", &line)?;
        }
    }

    if let Some(cores) = limits.cpu_cores.as_deref() {
        // Normalize through parse/format so malformed masks fail here, not
        // in the kernel write.
        let parsed = cpuset::parse_cpu_list(cores)?;
        write_file(dir, "cpuset.cpus", &cpuset::format_cpu_list(&parsed))?;
    }

    Ok(())
}

/// Move a process into the cgroup by writing its PID.
pub fn join(dir: &Path, pid: u32) -> Result<(), IsolationError> {
    write_file(dir, "cgroup.procs", &pid.to_string())
}

fn write_file(dir: &Path, file: &str, contents: &str) -> Result<(), IsolationError> {
    let path = dir.join(file);
    std::fs::write(&path, contents).map_err(|e| IsolationError::io(&path, e))
}

#[cfg(test)]
#[path = "cgroup_tests.rs"]
mod tests;
