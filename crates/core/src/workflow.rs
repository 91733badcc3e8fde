// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Workflows: DAGs of named jobs gated by requirements.

use crate::job::{JobId, JobState};
use jl_expr::{Expr, Status};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// Monotonic workflow identifier, assigned at registration.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(transparent)]
pub struct WorkflowId(pub u64);

impl std::fmt::Display for WorkflowId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Aggregate state of a workflow, a pure function of its members' states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkflowState {
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl std::fmt::Display for WorkflowState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WorkflowState::Running => write!(f, "running"),
            WorkflowState::Completed => write!(f, "completed"),
            WorkflowState::Failed => write!(f, "failed"),
            WorkflowState::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// A predicate on upstream job states gating a dependent job's readiness.
///
/// Tagged sum, not a hierarchy: either a single `job=STATUS` check or a
/// boolean expression over such atoms.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Requirement {
    /// `job` must currently be in exactly `status`.
    Simple { job: String, status: Status },
    /// Boolean formula over `job=STATUS` atoms.
    Expression { expr: Expr },
}

impl Requirement {
    /// Evaluate against current member states.
    pub fn eval(&self, states: &dyn Fn(&str) -> Option<Status>) -> bool {
        match self {
            Requirement::Simple { job, status } => states(job) == Some(*status),
            Requirement::Expression { expr } => expr.eval(states),
        }
    }

    /// Can this requirement still become true once the jobs in `fixed` are
    /// pinned to their final statuses?
    pub fn satisfiable(&self, fixed: &BTreeMap<String, Status>) -> bool {
        match self {
            Requirement::Simple { job, status } => match fixed.get(job) {
                Some(actual) => actual == status,
                None => true,
            },
            Requirement::Expression { expr } => expr.satisfiable(fixed),
        }
    }

    /// Job names this requirement references.
    pub fn jobs(&self) -> BTreeSet<&str> {
        match self {
            Requirement::Simple { job, .. } => {
                let mut set = BTreeSet::new();
                set.insert(job.as_str());
                set
            }
            Requirement::Expression { expr } => expr.jobs(),
        }
    }
}

impl std::fmt::Display for Requirement {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Requirement::Simple { job, status } => write!(f, "{job}={status}"),
            Requirement::Expression { expr } => write!(f, "{expr}"),
        }
    }
}

/// Per-job node in a workflow DAG.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobDependency {
    /// Name unique within the workflow.
    pub name: String,
    /// UUID of the registered job record.
    pub job_id: Option<JobId>,
    pub state: JobState,
    /// All must hold for the job to become ready.
    pub requires: Vec<Requirement>,
}

impl JobDependency {
    pub fn new(name: impl Into<String>, requires: Vec<Requirement>) -> Self {
        Self {
            name: name.into(),
            job_id: None,
            state: JobState::Pending,
            requires,
        }
    }
}

/// A registered workflow: members by name plus the topological dispatch order.
///
/// Members hold job UUIDs only, never `Job` handles; job records live in the
/// job store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Workflow {
    pub id: WorkflowId,
    pub name: String,
    /// Where the definition came from (template path, `api`, ...).
    #[serde(default)]
    pub source: String,
    pub members: HashMap<String, JobDependency>,
    /// Member names in topological order; drives deterministic dispatch.
    pub order: Vec<String>,
    pub state: WorkflowState,
}

impl Workflow {
    /// Current member states keyed by member name.
    pub fn member_states(&self) -> BTreeMap<String, Status> {
        self.members
            .iter()
            .map(|(name, dep)| (name.clone(), dep.state.as_status()))
            .collect()
    }

    /// Member states that are terminal, i.e. permanent for satisfiability.
    pub fn terminal_states(&self) -> BTreeMap<String, Status> {
        self.members
            .iter()
            .filter(|(_, dep)| dep.state.is_terminal())
            .map(|(name, dep)| (name.clone(), dep.state.as_status()))
            .collect()
    }

    /// Recompute the aggregate state from member states.
    ///
    /// `Running` while any member can still move; once all are terminal:
    /// `Completed` iff every member completed, `Failed` if any failed or was
    /// stopped, otherwise `Cancelled`.
    pub fn derived_state(&self) -> WorkflowState {
        let any_active = self.members.values().any(|d| !d.state.is_terminal());
        if any_active {
            return WorkflowState::Running;
        }
        let any_failed = self
            .members
            .values()
            .any(|d| matches!(d.state, JobState::Failed | JobState::Stopped));
        if any_failed {
            return WorkflowState::Failed;
        }
        let any_cancelled = self
            .members
            .values()
            .any(|d| d.state == JobState::Cancelled);
        if any_cancelled {
            return WorkflowState::Cancelled;
        }
        WorkflowState::Completed
    }
}

#[cfg(test)]
#[path = "workflow_tests.rs"]
mod tests;
