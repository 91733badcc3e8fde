// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Wire DTOs for the unix-socket control protocol.
//!
//! One JSON object per line in each direction. Requests reject unknown
//! fields; malformed values surface as a typed error code plus message.

use chrono::{DateTime, Utc};
use jl_core::{
    Job, JobSpec, JobState, JobType, Requirement, ResourceLimits, RuntimeSpec, UploadFile,
    VolumeKind,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use thiserror::Error;

/// A request that could not be mapped onto the core types.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct BadRequest(pub String);

/// Control requests.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Request {
    StartJob(StartJobRequest),
    StartWorkflow(StartWorkflowRequest),
    StopJob(StopJobRequest),
    DeleteJob(DeleteJobRequest),
    DeleteAllJobs,
    GetJob { job_id: String },
    ListJobs,
    WorkflowStatus { workflow_id: u64 },
    ListWorkflows,
    CreateVolume(CreateVolumeRequest),
    DeleteVolume { name: String },
    CreateNetwork { name: String, cidr: String },
    DeleteNetwork { name: String },
    Shutdown,
}

/// Submit one job. Inside a workflow submission the `name` is required and
/// `dependencies` gate dispatch; standalone submissions must leave
/// `workflow_uuid` and `dependencies` empty.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct StartJobRequest {
    #[serde(default)]
    pub name: Option<String>,
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub resources: ResourcesDto,
    #[serde(default)]
    pub uploads: Vec<UploadDto>,
    /// RFC-3339 dispatch time.
    #[serde(default)]
    pub schedule: Option<String>,
    #[serde(default)]
    pub network: Option<String>,
    #[serde(default)]
    pub volumes: Vec<String>,
    /// `name@version` runtime spec.
    #[serde(default)]
    pub runtime: Option<String>,
    #[serde(default)]
    pub environment: HashMap<String, String>,
    #[serde(default)]
    pub secret_environment: HashMap<String, String>,
    /// `standard` (default) or `runtime_build`.
    #[serde(default)]
    pub job_type: Option<JobType>,
    #[serde(default)]
    pub gpu_count: u32,
    #[serde(default)]
    pub gpu_memory_mb: u64,
    #[serde(default)]
    pub workflow_uuid: Option<u64>,
    #[serde(default)]
    pub working_directory: Option<PathBuf>,
    #[serde(default)]
    pub dependencies: Vec<RequireDto>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct ResourcesDto {
    #[serde(default)]
    pub max_cpu: u32,
    #[serde(default)]
    pub max_memory: u64,
    #[serde(default)]
    pub max_iobps: u64,
    #[serde(default)]
    pub cpu_cores: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UploadDto {
    pub path: String,
    #[serde(default = "default_upload_mode")]
    pub mode: u32,
    pub content: String,
}

fn default_upload_mode() -> u32 {
    0o644
}

/// One dependency entry: either `{job_id, status}` or `{expression}`.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct RequireDto {
    #[serde(default)]
    pub job_id: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub expression: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StartWorkflowRequest {
    pub name: String,
    /// Where the definition came from (template path); defaults to `api`.
    #[serde(default = "default_workflow_source")]
    pub source: String,
    /// Members in topological order; each entry needs a `name`.
    pub jobs: Vec<StartJobRequest>,
}

fn default_workflow_source() -> String {
    "api".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StopJobRequest {
    pub job_id: String,
    #[serde(default)]
    pub force: bool,
    #[serde(default)]
    pub reason: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DeleteJobRequest {
    pub job_id: String,
    #[serde(default)]
    pub reason: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateVolumeRequest {
    pub name: String,
    pub size_mb: u64,
    #[serde(default)]
    pub kind: VolumeKind,
}

/// Control responses.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum Response {
    Job { job: JobView },
    Jobs { jobs: Vec<JobView> },
    Workflow { workflow: jl_engine::WorkflowStatusView },
    Workflows { workflows: Vec<jl_engine::WorkflowStatusView> },
    Deleted { deleted_count: usize, skipped_count: usize },
    Ok,
    Error { code: String, message: String },
}

impl Response {
    pub fn error(code: &str, message: impl std::fmt::Display) -> Self {
        Response::Error {
            code: code.to_string(),
            message: message.to_string(),
        }
    }
}

/// Job DTO for listings and lookups. Secret environment never appears.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobView {
    pub id: String,
    pub name: Option<String>,
    pub state: JobState,
    pub command: String,
    pub args: Vec<String>,
    pub exit_code: Option<i32>,
    pub failure: Option<String>,
    pub started_at_ms: Option<u64>,
    pub ended_at_ms: Option<u64>,
    pub node: String,
    pub workflow: Option<u64>,
    pub ip: Option<String>,
    pub cgroup_path: Option<String>,
}

impl From<&Job> for JobView {
    fn from(job: &Job) -> Self {
        Self {
            id: job.id.to_string(),
            name: job.name.clone(),
            state: job.state,
            command: job.spec.command.clone(),
            args: job.spec.args.clone(),
            exit_code: job.exit_code,
            failure: job.failure.clone(),
            started_at_ms: job.started_at_ms,
            ended_at_ms: job.ended_at_ms,
            node: job.node.clone(),
            workflow: job.workflow.map(|w| w.0),
            ip: job.ip.map(|ip| ip.to_string()),
            cgroup_path: job.cgroup_path.clone(),
        }
    }
}

impl StartJobRequest {
    /// Map the DTO onto a core job spec.
    pub fn to_spec(&self) -> Result<JobSpec, BadRequest> {
        let runtime = match self.runtime.as_deref() {
            Some(raw) => Some(
                raw.parse::<RuntimeSpec>()
                    .map_err(|e| BadRequest(e.to_string()))?,
            ),
            None => None,
        };

        let schedule = match self.schedule.as_deref() {
            Some(raw) => Some(
                DateTime::parse_from_rfc3339(raw)
                    .map(|dt| dt.with_timezone(&Utc))
                    .map_err(|e| BadRequest(format!("schedule: {e}")))?,
            ),
            None => None,
        };

        let uploads = self
            .uploads
            .iter()
            .map(|u| UploadFile {
                path: u.path.clone(),
                mode: u.mode,
                size: u.content.len() as u64,
            })
            .collect();

        Ok(JobSpec {
            command: self.command.clone(),
            args: self.args.clone(),
            env: self.environment.clone(),
            secret_env: self.secret_environment.clone(),
            limits: ResourceLimits {
                max_cpu: self.resources.max_cpu,
                max_memory_mb: self.resources.max_memory,
                max_io_bps: self.resources.max_iobps,
                cpu_cores: self.resources.cpu_cores.clone(),
                gpu_count: self.gpu_count,
                gpu_memory_mb: self.gpu_memory_mb,
            },
            volumes: self.volumes.clone(),
            network: self.network.clone(),
            runtime,
            uploads,
            schedule,
            working_dir: self.working_directory.clone(),
            job_type: self.job_type.unwrap_or_default(),
        })
    }

    /// Upload contents paired with their declared paths.
    pub fn upload_contents(&self) -> Vec<(String, Vec<u8>)> {
        self.uploads
            .iter()
            .map(|u| (u.path.clone(), u.content.clone().into_bytes()))
            .collect()
    }

    /// Map the `dependencies` entries onto core requirements.
    pub fn requirements(&self) -> Result<Vec<Requirement>, BadRequest> {
        self.dependencies.iter().map(RequireDto::to_requirement).collect()
    }
}

impl RequireDto {
    fn to_requirement(&self) -> Result<Requirement, BadRequest> {
        match (&self.job_id, &self.status, &self.expression) {
            (None, None, Some(expression)) => {
                let expr = jl_expr::parse(expression).map_err(|e| {
                    BadRequest(format!("expression '{expression}': {e}"))
                })?;
                Ok(Requirement::Expression { expr })
            }
            (Some(job), status, None) => {
                let raw = status.as_deref().unwrap_or("COMPLETED");
                let status = jl_expr::Status::from_keyword(raw)
                    .ok_or_else(|| BadRequest(format!("unknown status '{raw}'")))?;
                Ok(Requirement::Simple {
                    job: job.clone(),
                    status,
                })
            }
            _ => Err(BadRequest(
                "dependency needs either job_id/status or expression".to_string(),
            )),
        }
    }
}

#[cfg(test)]
#[path = "protocol_tests.rs"]
mod tests;
