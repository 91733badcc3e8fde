// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Job identity, specification, and state machine.

use crate::runtime::RuntimeSpec;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::net::Ipv4Addr;
use std::path::PathBuf;

crate::define_id! {
    /// Unique identifier for a job.
    ///
    /// Stable for the job's whole lifetime; a UUID in production.
    pub struct JobId;
}

/// Lifecycle state of a job.
///
/// `Pending → (Scheduled →)? Running → {Completed|Failed|Stopped|Cancelled}`.
/// The four right-hand states are terminal: a job never leaves them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    /// Accepted, waiting for dispatch
    Pending,
    /// Waiting for a future schedule time
    Scheduled,
    /// Child process is alive
    Running,
    /// Child exited with code 0
    Completed,
    /// Child exited non-zero, crashed, or setup failed
    Failed,
    /// Stopped by external request
    Stopped,
    /// Cancelled before any process existed
    Cancelled,
}

impl JobState {
    /// Check if the job is in a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobState::Completed | JobState::Failed | JobState::Stopped | JobState::Cancelled
        )
    }

    /// Terminal states that count as a failure for dependents
    /// (anything terminal except `Completed`).
    pub fn is_failure_like(&self) -> bool {
        matches!(
            self,
            JobState::Failed | JobState::Stopped | JobState::Cancelled
        )
    }

    /// The expression-language status this state evaluates as.
    ///
    /// `Scheduled` is indistinguishable from `Pending` to dependents.
    pub fn as_status(&self) -> jl_expr::Status {
        match self {
            JobState::Pending | JobState::Scheduled => jl_expr::Status::Pending,
            JobState::Running => jl_expr::Status::Running,
            JobState::Completed => jl_expr::Status::Completed,
            JobState::Failed => jl_expr::Status::Failed,
            JobState::Stopped => jl_expr::Status::Stopped,
            JobState::Cancelled => jl_expr::Status::Cancelled,
        }
    }
}

impl std::fmt::Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobState::Pending => write!(f, "pending"),
            JobState::Scheduled => write!(f, "scheduled"),
            JobState::Running => write!(f, "running"),
            JobState::Completed => write!(f, "completed"),
            JobState::Failed => write!(f, "failed"),
            JobState::Stopped => write!(f, "stopped"),
            JobState::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// What kind of root the job executes in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobType {
    /// Chroot into a pre-built runtime root
    #[default]
    Standard,
    /// Build a runtime: chroot into the job's own sealed root
    RuntimeBuild,
}

impl std::fmt::Display for JobType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobType::Standard => write!(f, "standard"),
            JobType::RuntimeBuild => write!(f, "runtime_build"),
        }
    }
}

/// Resource caps applied to the job's cgroup and scheduler placement.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ResourceLimits {
    /// CPU cap in percent of one core (200 = two cores). 0 = unlimited.
    #[serde(default)]
    pub max_cpu: u32,
    /// Memory cap in MB. 0 = unlimited.
    #[serde(default)]
    pub max_memory_mb: u64,
    /// IO throughput cap in bytes/sec. 0 = unlimited.
    #[serde(default)]
    pub max_io_bps: u64,
    /// CPU core mask as closed ranges, e.g. `0-3,7`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cpu_cores: Option<String>,
    /// Number of GPUs requested.
    #[serde(default)]
    pub gpu_count: u32,
    /// Minimum GPU memory in MB per requested GPU.
    #[serde(default)]
    pub gpu_memory_mb: u64,
}

/// Descriptor for one caller-supplied file delivered into the job root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadFile {
    /// Destination path relative to the job's working directory.
    pub path: String,
    /// Unix file mode.
    pub mode: u32,
    /// Payload size in bytes.
    pub size: u64,
}

/// Everything the caller specifies about a job.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct JobSpec {
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    /// Plain environment, visible in logs and events.
    #[serde(default)]
    pub env: HashMap<String, String>,
    /// Secret environment. Forwarded to the job process, never serialized.
    #[serde(skip)]
    pub secret_env: HashMap<String, String>,
    #[serde(default)]
    pub limits: ResourceLimits,
    /// Volume names to mount into the job root.
    #[serde(default)]
    pub volumes: Vec<String>,
    /// Network name for an IP lease, or none for an isolated namespace.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub runtime: Option<RuntimeSpec>,
    #[serde(default)]
    pub uploads: Vec<UploadFile>,
    /// Future dispatch time; absent means dispatch immediately.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schedule: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub working_dir: Option<PathBuf>,
    #[serde(default)]
    pub job_type: JobType,
}

impl Default for JobSpec {
    fn default() -> Self {
        Self {
            command: String::new(),
            args: Vec::new(),
            env: HashMap::new(),
            secret_env: HashMap::new(),
            limits: ResourceLimits::default(),
            volumes: Vec::new(),
            network: None,
            runtime: None,
            uploads: Vec::new(),
            schedule: None,
            working_dir: None,
            job_type: JobType::Standard,
        }
    }
}

// Hand-written so secret values never reach debug logs.
impl std::fmt::Debug for JobSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobSpec")
            .field("command", &self.command)
            .field("args", &self.args)
            .field("env", &self.env)
            .field("secret_env", &format_args!("<{} redacted>", self.secret_env.len()))
            .field("limits", &self.limits)
            .field("volumes", &self.volumes)
            .field("network", &self.network)
            .field("runtime", &self.runtime)
            .field("uploads", &self.uploads.len())
            .field("schedule", &self.schedule)
            .field("working_dir", &self.working_dir)
            .field("job_type", &self.job_type)
            .finish()
    }
}

/// A job instance: spec plus observed lifecycle state.
///
/// Owned exclusively by the job store; immutable once terminal apart from
/// resource-field cleanup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    /// Human name; required and unique inside a workflow.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Workflow this job belongs to, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workflow: Option<crate::workflow::WorkflowId>,
    pub spec: JobSpec,
    pub state: JobState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
    /// Failure detail for `Failed` jobs (init error class, signal, ...).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ended_at_ms: Option<u64>,
    /// Node that ran (or will run) the job.
    #[serde(default)]
    pub node: String,
    /// Host cgroup directory while allocated; cleared on release.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cgroup_path: Option<String>,
    /// Leased address while attached to a network; cleared on release.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip: Option<Ipv4Addr>,
}

impl Job {
    /// Create a pending job.
    pub fn new(id: JobId, name: Option<String>, spec: JobSpec) -> Self {
        Self {
            id,
            name,
            workflow: None,
            spec,
            state: JobState::Pending,
            exit_code: None,
            failure: None,
            started_at_ms: None,
            ended_at_ms: None,
            node: String::new(),
            cgroup_path: None,
            ip: None,
        }
    }

    /// Check if the job is in a terminal state.
    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    /// True while kernel resources (cgroup dir, IP lease) are still attached.
    pub fn holds_resources(&self) -> bool {
        self.cgroup_path.is_some() || self.ip.is_some()
    }

    /// Display name: the human name if present, else the short id.
    pub fn display_name(&self) -> &str {
        match &self.name {
            Some(name) => name.as_str(),
            None => self.id.short(8),
        }
    }
}

#[cfg(any(test, feature = "test-support"))]
pub struct JobBuilder {
    id: String,
    name: Option<String>,
    spec: JobSpec,
    state: JobState,
}

#[cfg(any(test, feature = "test-support"))]
impl JobBuilder {
    pub fn id(mut self, v: impl Into<String>) -> Self {
        self.id = v.into();
        self
    }

    pub fn name(mut self, v: impl Into<String>) -> Self {
        self.name = Some(v.into());
        self
    }

    pub fn command(mut self, v: impl Into<String>) -> Self {
        self.spec.command = v.into();
        self
    }

    pub fn args(mut self, v: Vec<String>) -> Self {
        self.spec.args = v;
        self
    }

    pub fn state(mut self, v: JobState) -> Self {
        self.state = v;
        self
    }

    pub fn spec(mut self, v: JobSpec) -> Self {
        self.spec = v;
        self
    }

    pub fn build(self) -> Job {
        let mut job = Job::new(JobId::new(self.id), self.name, self.spec);
        job.state = self.state;
        job
    }
}

#[cfg(any(test, feature = "test-support"))]
impl Job {
    /// Create a builder with test defaults.
    pub fn builder() -> JobBuilder {
        JobBuilder {
            id: "test-job-1".to_string(),
            name: None,
            spec: JobSpec {
                command: "true".to_string(),
                ..JobSpec::default()
            },
            state: JobState::Pending,
        }
    }
}

#[cfg(test)]
#[path = "job_tests.rs"]
mod tests;
