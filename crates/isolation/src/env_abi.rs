// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The environment contract handed from the parent to the re-executed init.
//!
//! This is the one interface between the two halves of the same binary: the
//! parent serializes everything init needs into environment variables, init
//! reads them back with [`InitConfig::from_env_map`]. Changing a variable
//! here is a breaking interface change.

use crate::volumes::MountSpec;
use chrono::{DateTime, Utc};
use jl_core::{JobId, ResourceLimits};
use std::collections::HashMap;
use std::path::PathBuf;
use thiserror::Error;

pub const JOBLET_MODE: &str = "JOBLET_MODE";
pub const MODE_INIT: &str = "init";
pub const JOB_ID: &str = "JOB_ID";
pub const JOB_COMMAND: &str = "JOB_COMMAND";
pub const JOB_ARGS_COUNT: &str = "JOB_ARGS_COUNT";
pub const JOB_ARG_PREFIX: &str = "JOB_ARG_";
pub const JOB_CGROUP_PATH: &str = "JOB_CGROUP_PATH";
pub const JOB_CGROUP_HOST_PATH: &str = "JOB_CGROUP_HOST_PATH";
pub const JOB_MAX_CPU: &str = "JOB_MAX_CPU";
pub const JOB_MAX_MEMORY: &str = "JOB_MAX_MEMORY";
pub const JOB_MAX_IOBPS: &str = "JOB_MAX_IOBPS";
pub const JOB_CPU_CORES: &str = "JOB_CPU_CORES";
pub const JOB_IO_DEVICE: &str = "JOB_IO_DEVICE";
pub const JOB_SCHEDULED_TIME: &str = "JOB_SCHEDULED_TIME";
pub const JOBLET_BINARY_PATH: &str = "JOBLET_BINARY_PATH";
pub const JOB_UPLOAD_SESSION: &str = "JOB_UPLOAD_SESSION";
pub const JOB_UPLOAD_TOTAL_FILES: &str = "JOB_UPLOAD_TOTAL_FILES";
pub const JOB_UPLOAD_TOTAL_SIZE: &str = "JOB_UPLOAD_TOTAL_SIZE";
pub const JOB_UPLOAD_PIPE: &str = "JOB_UPLOAD_PIPE";
pub const JOB_STATUS_PIPE: &str = "JOB_STATUS_PIPE";
pub const JOB_RUNTIME_ROOT: &str = "JOB_RUNTIME_ROOT";
pub const JOB_WORKING_DIR: &str = "JOB_WORKING_DIR";
pub const JOB_NETWORK_NS: &str = "JOB_NETWORK_NS";
pub const JOB_VOLUMES_COUNT: &str = "JOB_VOLUMES_COUNT";
pub const JOB_VOLUME_PREFIX: &str = "JOB_VOLUME_";
pub const JOB_ENV_PREFIX: &str = "JOB_ENV_";
pub const JOB_SECRET_PREFIX: &str = "JOB_SECRET_";

/// The in-namespace cgroup2 mount, constant by contract.
pub const CGROUP_NS_PATH: &str = "/sys/fs/cgroup";

/// Errors reading the contract back on the init side.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EnvAbiError {
    #[error("missing required variable {0}")]
    Missing(&'static str),
    #[error("invalid value for {name}: '{value}'")]
    Invalid { name: String, value: String },
}

/// Upload metadata carried across the boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadEnv {
    pub total_files: u64,
    pub total_bytes: u64,
    /// Present only for the pipe transport.
    pub pipe: Option<PathBuf>,
}

/// Parent-side builder: everything the init child must know about one job.
#[derive(Debug, Clone)]
pub struct JobEnvironment {
    pub job_id: JobId,
    pub command: String,
    pub args: Vec<String>,
    pub cgroup_host_path: PathBuf,
    pub limits: ResourceLimits,
    /// `MAJ:MIN` device the io.max limit applies to.
    pub io_device: Option<String>,
    pub scheduled_time: Option<DateTime<Utc>>,
    pub binary_path: PathBuf,
    pub upload: Option<UploadEnv>,
    /// Root the init child chroots into.
    pub runtime_root: PathBuf,
    pub working_dir: Option<PathBuf>,
    /// Named netns to join; absent means an isolated network namespace.
    pub netns: Option<String>,
    pub mounts: Vec<MountSpec>,
    pub status_pipe: Option<PathBuf>,
    /// Plain user environment, forwarded as `JOB_ENV_*`.
    pub env: Vec<(String, String)>,
    /// Secret user environment, forwarded as `JOB_SECRET_*`. Values cross
    /// only this process boundary; they are never logged or serialized.
    pub secret_env: Vec<(String, String)>,
}

impl JobEnvironment {
    /// Serialize into the env var set for the re-exec spawn.
    pub fn to_env(&self) -> Vec<(String, String)> {
        let mut vars: Vec<(String, String)> = vec![
            (JOBLET_MODE.into(), MODE_INIT.into()),
            (JOB_ID.into(), self.job_id.to_string()),
            (JOB_COMMAND.into(), self.command.clone()),
            (JOB_ARGS_COUNT.into(), self.args.len().to_string()),
        ];
        for (i, arg) in self.args.iter().enumerate() {
            vars.push((format!("{JOB_ARG_PREFIX}{i}"), arg.clone()));
        }

        vars.push((JOB_CGROUP_PATH.into(), CGROUP_NS_PATH.into()));
        vars.push((
            JOB_CGROUP_HOST_PATH.into(),
            self.cgroup_host_path.display().to_string(),
        ));
        vars.push((JOB_MAX_CPU.into(), self.limits.max_cpu.to_string()));
        vars.push((JOB_MAX_MEMORY.into(), self.limits.max_memory_mb.to_string()));
        vars.push((JOB_MAX_IOBPS.into(), self.limits.max_io_bps.to_string()));
        if let Some(cores) = self.limits.cpu_cores.as_deref() {
            if !cores.is_empty() {
                vars.push((JOB_CPU_CORES.into(), cores.to_string()));
            }
        }
        if let Some(device) = self.io_device.as_deref() {
            vars.push((JOB_IO_DEVICE.into(), device.to_string()));
        }
        if let Some(at) = &self.scheduled_time {
            vars.push((JOB_SCHEDULED_TIME.into(), at.to_rfc3339()));
        }
        vars.push((
            JOBLET_BINARY_PATH.into(),
            self.binary_path.display().to_string(),
        ));

        if let Some(upload) = &self.upload {
            vars.push((JOB_UPLOAD_SESSION.into(), "true".into()));
            vars.push((
                JOB_UPLOAD_TOTAL_FILES.into(),
                upload.total_files.to_string(),
            ));
            vars.push((JOB_UPLOAD_TOTAL_SIZE.into(), upload.total_bytes.to_string()));
            if let Some(pipe) = &upload.pipe {
                vars.push((JOB_UPLOAD_PIPE.into(), pipe.display().to_string()));
            }
        }

        vars.push((JOB_RUNTIME_ROOT.into(), self.runtime_root.display().to_string()));
        if let Some(dir) = &self.working_dir {
            vars.push((JOB_WORKING_DIR.into(), dir.display().to_string()));
        }
        if let Some(netns) = &self.netns {
            vars.push((JOB_NETWORK_NS.into(), netns.clone()));
        }
        vars.push((JOB_VOLUMES_COUNT.into(), self.mounts.len().to_string()));
        for (i, mount) in self.mounts.iter().enumerate() {
            vars.push((format!("{JOB_VOLUME_PREFIX}{i}"), mount.encode()));
        }
        if let Some(pipe) = &self.status_pipe {
            vars.push((JOB_STATUS_PIPE.into(), pipe.display().to_string()));
        }

        for (key, value) in &self.env {
            vars.push((format!("{JOB_ENV_PREFIX}{key}"), value.clone()));
        }
        for (key, value) in &self.secret_env {
            vars.push((format!("{JOB_SECRET_PREFIX}{key}"), value.clone()));
        }

        vars
    }
}

/// Init-side view: the contract read back from the process environment.
#[derive(Debug, Clone, PartialEq)]
pub struct InitConfig {
    pub job_id: JobId,
    pub command: String,
    pub args: Vec<String>,
    /// In-namespace cgroup root; defaults to [`CGROUP_NS_PATH`].
    pub cgroup_path: PathBuf,
    pub cgroup_host_path: Option<PathBuf>,
    pub limits: ResourceLimits,
    pub io_device: Option<String>,
    pub scheduled_time: Option<DateTime<Utc>>,
    pub binary_path: Option<PathBuf>,
    pub upload: Option<UploadEnv>,
    pub runtime_root: Option<PathBuf>,
    pub working_dir: Option<PathBuf>,
    pub netns: Option<String>,
    pub mounts: Vec<MountSpec>,
    pub status_pipe: Option<PathBuf>,
    pub env: Vec<(String, String)>,
    pub secret_env: Vec<(String, String)>,
}

impl InitConfig {
    /// Read the contract from the live process environment.
    pub fn from_process_env() -> Result<Self, EnvAbiError> {
        let map: HashMap<String, String> = std::env::vars().collect();
        Self::from_env_map(&map)
    }

    /// Read the contract from an environment map.
    ///
    /// Missing `JOB_ID` or `JOB_COMMAND` is fatal; everything else has a
    /// default or is optional.
    pub fn from_env_map(map: &HashMap<String, String>) -> Result<Self, EnvAbiError> {
        let job_id = map
            .get(JOB_ID)
            .filter(|v| !v.is_empty())
            .ok_or(EnvAbiError::Missing(JOB_ID))?;
        let command = map
            .get(JOB_COMMAND)
            .filter(|v| !v.is_empty())
            .ok_or(EnvAbiError::Missing(JOB_COMMAND))?;

        let args_count = parse_u64_or(map, JOB_ARGS_COUNT, 0)?;
        let mut args = Vec::with_capacity(args_count as usize);
        for i in 0..args_count {
            let name = format!("{JOB_ARG_PREFIX}{i}");
            let value = map.get(&name).ok_or(EnvAbiError::Missing(JOB_ARGS_COUNT))?;
            args.push(value.clone());
        }

        let limits = ResourceLimits {
            max_cpu: parse_u64_or(map, JOB_MAX_CPU, 0)? as u32,
            max_memory_mb: parse_u64_or(map, JOB_MAX_MEMORY, 0)?,
            max_io_bps: parse_u64_or(map, JOB_MAX_IOBPS, 0)?,
            cpu_cores: map.get(JOB_CPU_CORES).cloned(),
            gpu_count: 0,
            gpu_memory_mb: 0,
        };

        let scheduled_time = match map.get(JOB_SCHEDULED_TIME) {
            Some(raw) => Some(
                DateTime::parse_from_rfc3339(raw)
                    .map(|dt| dt.with_timezone(&Utc))
                    .map_err(|_| EnvAbiError::Invalid {
                        name: JOB_SCHEDULED_TIME.into(),
                        value: raw.clone(),
                    })?,
            ),
            None => None,
        };

        let upload = if map.get(JOB_UPLOAD_SESSION).map(String::as_str) == Some("true") {
            Some(UploadEnv {
                total_files: parse_u64_or(map, JOB_UPLOAD_TOTAL_FILES, 0)?,
                total_bytes: parse_u64_or(map, JOB_UPLOAD_TOTAL_SIZE, 0)?,
                pipe: map.get(JOB_UPLOAD_PIPE).map(PathBuf::from),
            })
        } else {
            None
        };

        let volumes_count = parse_u64_or(map, JOB_VOLUMES_COUNT, 0)?;
        let mut mounts = Vec::with_capacity(volumes_count as usize);
        for i in 0..volumes_count {
            let name = format!("{JOB_VOLUME_PREFIX}{i}");
            let raw = map.get(&name).ok_or(EnvAbiError::Missing(JOB_VOLUMES_COUNT))?;
            let spec = MountSpec::decode(raw).ok_or_else(|| EnvAbiError::Invalid {
                name,
                value: raw.clone(),
            })?;
            mounts.push(spec);
        }

        let mut env = Vec::new();
        let mut secret_env = Vec::new();
        for (key, value) in map {
            if let Some(name) = key.strip_prefix(JOB_ENV_PREFIX) {
                env.push((name.to_string(), value.clone()));
            } else if let Some(name) = key.strip_prefix(JOB_SECRET_PREFIX) {
                secret_env.push((name.to_string(), value.clone()));
            }
        }
        env.sort();
        secret_env.sort();

        Ok(Self {
            job_id: JobId::new(job_id.clone()),
            command: command.clone(),
            args,
            cgroup_path: map
                .get(JOB_CGROUP_PATH)
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(CGROUP_NS_PATH)),
            cgroup_host_path: map.get(JOB_CGROUP_HOST_PATH).map(PathBuf::from),
            limits,
            io_device: map.get(JOB_IO_DEVICE).cloned(),
            scheduled_time,
            binary_path: map.get(JOBLET_BINARY_PATH).map(PathBuf::from),
            upload,
            runtime_root: map.get(JOB_RUNTIME_ROOT).map(PathBuf::from),
            working_dir: map.get(JOB_WORKING_DIR).map(PathBuf::from),
            netns: map.get(JOB_NETWORK_NS).cloned(),
            mounts,
            status_pipe: map.get(JOB_STATUS_PIPE).map(PathBuf::from),
            env,
            secret_env,
        })
    }

    /// The environment for the exec'd user command: plain and secret user
    /// vars plus a sane base, with every orchestration variable stripped.
    pub fn command_env(&self) -> Vec<(String, String)> {
        let mut out = vec![
            ("PATH".to_string(), "/usr/local/bin:/usr/bin:/bin".to_string()),
            ("HOME".to_string(), "/root".to_string()),
        ];
        for (key, value) in self.env.iter().chain(self.secret_env.iter()) {
            out.retain(|(k, _)| k != key);
            out.push((key.clone(), value.clone()));
        }
        out
    }
}

fn parse_u64_or(
    map: &HashMap<String, String>,
    name: &'static str,
    default: u64,
) -> Result<u64, EnvAbiError> {
    match map.get(name) {
        None => Ok(default),
        Some(raw) => raw.parse().map_err(|_| EnvAbiError::Invalid {
            name: name.into(),
            value: raw.clone(),
        }),
    }
}

#[cfg(test)]
#[path = "env_abi_tests.rs"]
mod tests;
