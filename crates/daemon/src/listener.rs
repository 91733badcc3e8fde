// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Unix-socket control listener: one JSON request per line, one JSON
//! response per line.

use crate::lifecycle::{DaemonOrchestrator, DaemonWorkflows};
use crate::protocol::{
    CreateVolumeRequest, JobView, Request, Response, StartJobRequest, StartWorkflowRequest,
};
use jl_core::{Clock, Event, JobId, Network, Subnet, Volume};
use jl_engine::{EventBus, WorkflowJobSubmission};
use jl_storage::{NetworkStore, VolumeStore};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::Notify;

/// Shared context for connection handlers.
pub struct ListenCtx {
    pub orchestrator: Arc<DaemonOrchestrator>,
    pub workflows: Arc<DaemonWorkflows>,
    pub volumes: Arc<VolumeStore>,
    pub networks: Arc<NetworkStore>,
    pub bus: Arc<EventBus>,
    pub shutdown: Arc<Notify>,
}

/// Accept loop over the control socket.
pub struct Listener {
    listener: UnixListener,
    ctx: Arc<ListenCtx>,
}

impl Listener {
    pub fn new(listener: UnixListener, ctx: Arc<ListenCtx>) -> Self {
        Self { listener, ctx }
    }

    pub async fn run(self) {
        loop {
            match self.listener.accept().await {
                Ok((stream, _)) => {
                    let ctx = Arc::clone(&self.ctx);
                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(stream, ctx).await {
                            tracing::debug!(error = %e, "connection closed with error");
                        }
                    });
                }
                Err(e) => {
                    tracing::warn!(error = %e, "accept failed");
                }
            }
        }
    }
}

async fn handle_connection(stream: UnixStream, ctx: Arc<ListenCtx>) -> std::io::Result<()> {
    let (read_half, mut write_half) = stream.into_split();
    let mut lines = BufReader::new(read_half).lines();

    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        let response = match serde_json::from_str::<Request>(&line) {
            Ok(request) => dispatch(&ctx, request).await,
            Err(e) => Response::error("BAD_REQUEST", e),
        };
        let mut payload = serde_json::to_vec(&response).unwrap_or_else(|e| {
            format!(r#"{{"result":"error","code":"INTERNAL","message":"{e}"}}"#).into_bytes()
        });
        payload.push(b'\n');
        write_half.write_all(&payload).await?;
    }
    Ok(())
}

async fn dispatch(ctx: &ListenCtx, request: Request) -> Response {
    match request {
        Request::StartJob(request) => start_job(ctx, request).await,
        Request::StartWorkflow(request) => start_workflow(ctx, request).await,
        Request::StopJob(request) => {
            let id = JobId::new(request.job_id);
            match ctx.orchestrator.stop(&id, request.force).await {
                Ok(()) => Response::Ok,
                Err(e) => Response::error(e.taxonomy().code(), e),
            }
        }
        Request::DeleteJob(request) => {
            let id = JobId::new(request.job_id);
            match ctx.orchestrator.delete(&id) {
                Ok(()) => Response::Ok,
                Err(e) => Response::error(e.taxonomy().code(), e),
            }
        }
        Request::DeleteAllJobs => {
            let (deleted_count, skipped_count) = ctx.orchestrator.delete_all();
            Response::Deleted {
                deleted_count,
                skipped_count,
            }
        }
        Request::GetJob { job_id } => match ctx.orchestrator.jobs().get(&JobId::new(job_id)) {
            Some(job) => Response::Job {
                job: JobView::from(&job),
            },
            None => Response::error("VALIDATION_ERROR", "job not found"),
        },
        Request::ListJobs => {
            let mut jobs = ctx.orchestrator.jobs().list();
            jobs.sort_by_key(|j| j.started_at_ms.unwrap_or(u64::MAX));
            Response::Jobs {
                jobs: jobs.iter().map(JobView::from).collect(),
            }
        }
        Request::WorkflowStatus { workflow_id } => {
            match ctx.workflows.status(jl_core::WorkflowId(workflow_id)) {
                Ok(workflow) => Response::Workflow { workflow },
                Err(e) => Response::error("VALIDATION_ERROR", e),
            }
        }
        Request::ListWorkflows => Response::Workflows {
            workflows: ctx.workflows.list(),
        },
        Request::CreateVolume(request) => create_volume(ctx, request).await,
        Request::DeleteVolume { name } => delete_volume(ctx, &name).await,
        Request::CreateNetwork { name, cidr } => create_network(ctx, &name, &cidr).await,
        Request::DeleteNetwork { name } => delete_network(ctx, &name).await,
        Request::Shutdown => {
            ctx.shutdown.notify_one();
            Response::Ok
        }
    }
}

async fn start_job(ctx: &ListenCtx, request: StartJobRequest) -> Response {
    if request.workflow_uuid.is_some() || !request.dependencies.is_empty() {
        return Response::error(
            "VALIDATION_ERROR",
            "jobs with dependencies are submitted as a workflow",
        );
    }
    let spec = match request.to_spec() {
        Ok(spec) => spec,
        Err(e) => return Response::error("VALIDATION_ERROR", e),
    };
    let contents = request.upload_contents();
    match ctx
        .orchestrator
        .submit_with_uploads(request.name, spec, contents)
        .await
    {
        Ok(job) => Response::Job {
            job: JobView::from(&job),
        },
        Err(e) => Response::error(e.taxonomy().code(), e),
    }
}

async fn start_workflow(ctx: &ListenCtx, request: StartWorkflowRequest) -> Response {
    let mut jobs = Vec::with_capacity(request.jobs.len());
    for member in &request.jobs {
        let Some(name) = member.name.clone() else {
            return Response::error("VALIDATION_ERROR", "workflow jobs need a name");
        };
        let spec = match member.to_spec() {
            Ok(spec) => spec,
            Err(e) => return Response::error("VALIDATION_ERROR", e),
        };
        let requires = match member.requirements() {
            Ok(requires) => requires,
            Err(e) => return Response::error("VALIDATION_ERROR", e),
        };
        jobs.push(WorkflowJobSubmission {
            name,
            spec,
            requires,
            contents: member.upload_contents(),
        });
    }

    match ctx
        .workflows
        .submit_workflow(&request.name, &request.source, jobs)
        .await
    {
        Ok(id) => match ctx.workflows.status(id) {
            Ok(workflow) => Response::Workflow { workflow },
            Err(e) => Response::error("VALIDATION_ERROR", e),
        },
        Err(e) => Response::error(e.taxonomy().code(), e),
    }
}

async fn create_volume(ctx: &ListenCtx, request: CreateVolumeRequest) -> Response {
    let mut volume = Volume::new(&request.name, request.size_mb, request.kind);
    volume.created_at_ms = ctx.orchestrator.clock().epoch_ms();

    if let Err(e) = ctx.orchestrator.volume_mounts().create(&volume) {
        return Response::error("RESOURCE_SETUP_FAILED", e);
    }
    if let Err(e) = ctx.volumes.put(volume.clone()) {
        return Response::error("VALIDATION_ERROR", e);
    }
    publish(
        ctx,
        Event::VolumeCreated {
            name: volume.name,
            at_ms: volume.created_at_ms,
            size_mb: volume.size_mb,
            kind: volume.kind,
        },
    )
    .await;
    Response::Ok
}

async fn delete_volume(ctx: &ListenCtx, name: &str) -> Response {
    let volume = match ctx.volumes.delete(name) {
        Ok(volume) => volume,
        Err(e) => return Response::error("VALIDATION_ERROR", e),
    };
    if let Err(e) = ctx.orchestrator.volume_mounts().remove(&volume) {
        tracing::warn!(volume = name, error = %e, "volume data removal failed");
    }
    publish(
        ctx,
        Event::VolumeDeleted {
            name: name.to_string(),
            at_ms: ctx.orchestrator.clock().epoch_ms(),
        },
    )
    .await;
    Response::Ok
}

async fn create_network(ctx: &ListenCtx, name: &str, cidr: &str) -> Response {
    let subnet = match Subnet::parse(cidr) {
        Ok(subnet) => subnet,
        Err(e) => return Response::error("VALIDATION_ERROR", e),
    };
    let mut network = Network::new(name, subnet);
    network.created_at_ms = ctx.orchestrator.clock().epoch_ms();
    if let Err(e) = ctx.networks.put(network) {
        return Response::error("VALIDATION_ERROR", e);
    }
    publish(
        ctx,
        Event::NetworkSetup {
            name: name.to_string(),
            at_ms: ctx.orchestrator.clock().epoch_ms(),
            cidr: subnet.to_string(),
        },
    )
    .await;
    Response::Ok
}

async fn delete_network(ctx: &ListenCtx, name: &str) -> Response {
    let network = match ctx.networks.delete(name) {
        Ok(network) => network,
        Err(e) => return Response::error("VALIDATION_ERROR", e),
    };
    if let Err(e) = ctx
        .orchestrator
        .network_controller()
        .teardown_bridge(&network)
        .await
    {
        tracing::debug!(network = name, error = %e, "bridge teardown skipped");
    }
    publish(
        ctx,
        Event::NetworkTornDown {
            name: name.to_string(),
            at_ms: ctx.orchestrator.clock().epoch_ms(),
        },
    )
    .await;
    Response::Ok
}

async fn publish(ctx: &ListenCtx, event: Event) {
    if let Err(e) = ctx.bus.publish(event).await {
        tracing::warn!(error = %e, "event fan-out reported failures");
    }
}
