// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Workflow coordination: submission, admission, and the event loop glue.
//!
//! The workflow engine is the only bridge between the resolver and the
//! orchestrator: it registers member jobs, admits ready ones into the
//! scheduler, and subscribes to lifecycle events so completions re-evaluate
//! readiness and failures cascade. The coupling runs through the event bus;
//! neither side references the other.

use crate::bus::{EventBus, HandlerError, Subscriber};
use crate::error::EngineError;
use crate::lifecycle::Orchestrator;
use crate::resolver::{DependencyResolver, WorkflowStatusView};
use jl_core::{
    Clock, Event, EventKind, IdGen, JobDependency, JobId, JobSpec, JobState, Requirement,
    WorkflowId,
};
use std::sync::Arc;

/// One named job inside a workflow submission. Submission order is the
/// caller's topological order.
#[derive(Debug, Clone)]
pub struct WorkflowJobSubmission {
    pub name: String,
    pub spec: JobSpec,
    pub requires: Vec<Requirement>,
    /// Upload content keyed by declared path, staged before dispatch.
    pub contents: Vec<(String, Vec<u8>)>,
}

/// Bridges the dependency resolver and the orchestrator.
pub struct WorkflowEngine<C: Clock, G: IdGen> {
    orchestrator: Arc<Orchestrator<C, G>>,
    resolver: Arc<DependencyResolver>,
}

impl<C: Clock, G: IdGen + 'static> WorkflowEngine<C, G> {
    pub fn new(
        orchestrator: Arc<Orchestrator<C, G>>,
        resolver: Arc<DependencyResolver>,
    ) -> Arc<Self> {
        Arc::new(Self {
            orchestrator,
            resolver,
        })
    }

    /// Subscribe to the lifecycle events that drive the DAG.
    pub fn attach(self: &Arc<Self>, bus: &EventBus) {
        let kinds = [
            EventKind::JobStarted,
            EventKind::JobCompleted,
            EventKind::JobFailed,
            EventKind::JobStopped,
            EventKind::JobCancelled,
        ];
        bus.subscribe_many(&kinds, Arc::clone(self) as Arc<dyn Subscriber>);
    }

    /// Register a workflow: validate every member spec, build the DAG,
    /// create the member job records, and admit the initial ready set.
    ///
    /// Nothing is registered when any validation fails.
    pub async fn submit_workflow(
        &self,
        name: &str,
        source: &str,
        jobs: Vec<WorkflowJobSubmission>,
    ) -> Result<WorkflowId, EngineError> {
        if jobs.is_empty() {
            return Err(EngineError::Validation(
                "workflow needs at least one job".to_string(),
            ));
        }
        for submission in &jobs {
            if submission.name.is_empty() {
                return Err(EngineError::Validation(
                    "workflow jobs need a name".to_string(),
                ));
            }
            self.orchestrator.validate_spec(&submission.spec)?;
        }

        let order: Vec<String> = jobs.iter().map(|j| j.name.clone()).collect();
        let members: Vec<JobDependency> = jobs
            .iter()
            .map(|j| JobDependency::new(j.name.clone(), j.requires.clone()))
            .collect();
        let id = self.resolver.create_workflow(name, source, members, order)?;

        for submission in jobs {
            let job = self.orchestrator.register_member(
                id,
                &submission.name,
                submission.spec,
                submission.contents,
            )?;
            self.resolver.bind_job(id, &submission.name, job.id)?;
        }

        self.admit_ready_members(id)?;
        Ok(id)
    }

    fn admit_ready_members(&self, id: WorkflowId) -> Result<(), EngineError> {
        for (name, job_id) in self.resolver.ready_jobs(id)? {
            self.resolver.mark_admitted(id, &name)?;
            tracing::debug!(workflow = %id, member = name, "admitting ready member");
            self.orchestrator.enqueue(job_id);
        }
        Ok(())
    }

    pub fn status(&self, id: WorkflowId) -> Result<WorkflowStatusView, EngineError> {
        Ok(self.resolver.workflow_status(id)?)
    }

    pub fn list(&self) -> Vec<WorkflowStatusView> {
        self.resolver.list_workflows()
    }

    async fn fold_state_change(&self, job: &JobId, state: JobState) {
        let Some(outcome) = self.resolver.on_job_state_change(job, state) else {
            return;
        };

        for (member, member_job) in &outcome.cancelled {
            tracing::info!(
                workflow = %outcome.workflow,
                member = %member,
                "cancelling member with unsatisfiable requirements"
            );
            if let Err(e) = self
                .orchestrator
                .cancel(member_job, "dependency unsatisfiable")
                .await
            {
                tracing::warn!(member = %member, error = %e, "cascade cancel failed");
            }
        }

        for (member, member_job) in outcome.newly_ready {
            if let Err(e) = self.resolver.mark_admitted(outcome.workflow, &member) {
                tracing::warn!(member = %member, error = %e, "admission failed");
                continue;
            }
            self.orchestrator.enqueue(member_job);
        }
    }
}

#[async_trait::async_trait]
impl<C: Clock, G: IdGen + 'static> Subscriber for WorkflowEngine<C, G> {
    fn name(&self) -> &str {
        "workflow-engine"
    }

    async fn handle(&self, event: &Event) -> Result<(), HandlerError> {
        let folded = match event {
            Event::JobStarted { job_id, .. } => Some((job_id, JobState::Running)),
            Event::JobCompleted { job_id, .. } => Some((job_id, JobState::Completed)),
            Event::JobFailed { job_id, .. } => Some((job_id, JobState::Failed)),
            Event::JobStopped { job_id, .. } => Some((job_id, JobState::Stopped)),
            Event::JobCancelled { job_id, .. } => Some((job_id, JobState::Cancelled)),
            _ => None,
        };
        if let Some((job_id, state)) = folded {
            self.fold_state_change(job_id, state).await;
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "workflow_tests.rs"]
mod tests;
