// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Workflow dependency resolution: registration, readiness, cascade.
//!
//! The DAG is kept as two parallel tables per workflow: members by name and
//! a dependents adjacency derived from requirement references. Reverse
//! traversal during cascade uses the adjacency index; members hold job UUIDs
//! only, never job handles (records live in the job store).
//!
//! `on_job_state_change` serializes per workflow: each workflow sits behind
//! its own mutex, so DAG evaluation sees one writer at a time while separate
//! workflows proceed independently.

use jl_core::{JobDependency, JobId, JobState, Workflow, WorkflowId, WorkflowState};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use thiserror::Error;

/// Errors from workflow registration and lookups.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ResolverError {
    #[error("duplicate job name '{0}'")]
    DuplicateJobName(String),

    #[error("job '{job}' requires unknown job '{target}'")]
    UnknownRequirementTarget { job: String, target: String },

    #[error("dependency cycle involving '{0}'")]
    Cycle(String),

    #[error("order must list every job exactly once")]
    OrderMismatch,

    #[error("order is not topological: '{dependent}' precedes its requirement '{target}'")]
    OrderNotTopological { dependent: String, target: String },

    #[error("workflow {0} not found")]
    WorkflowNotFound(u64),

    #[error("job '{0}' not found in workflow")]
    MemberNotFound(String),
}

/// Snapshot of a workflow for callers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowStatusView {
    pub id: WorkflowId,
    pub name: String,
    pub state: WorkflowState,
    /// Member states keyed by job name.
    pub jobs: BTreeMap<String, JobState>,
}

/// What changed in a workflow after one member's state change.
#[derive(Debug, Clone)]
pub struct StateChangeOutcome {
    pub workflow: WorkflowId,
    /// Members that became ready, in topological order, with their job ids.
    pub newly_ready: Vec<(String, JobId)>,
    /// Members cancelled by cascade, with their job ids.
    pub cancelled: Vec<(String, JobId)>,
    pub workflow_state: WorkflowState,
}

impl StateChangeOutcome {
    fn empty(workflow: WorkflowId) -> Self {
        Self {
            workflow,
            newly_ready: Vec::new(),
            cancelled: Vec::new(),
            workflow_state: WorkflowState::Running,
        }
    }
}

/// Registry of workflows and the readiness/cascade logic over them.
pub struct DependencyResolver {
    workflows: RwLock<HashMap<u64, Arc<Mutex<Workflow>>>>,
    /// job UUID -> (workflow, member name); the only reverse index.
    job_index: RwLock<HashMap<JobId, (WorkflowId, String)>>,
    next_id: AtomicU64,
}

impl Default for DependencyResolver {
    fn default() -> Self {
        Self::new()
    }
}

impl DependencyResolver {
    pub fn new() -> Self {
        Self {
            workflows: RwLock::new(HashMap::new()),
            job_index: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Register a workflow from its members and the caller's topological
    /// order. Rejects duplicate names, unknown requirement targets, orders
    /// that are not a permutation of the names or not topological, and
    /// cycles. Nothing is registered on failure.
    pub fn create_workflow(
        &self,
        name: &str,
        source: &str,
        members: Vec<JobDependency>,
        order: Vec<String>,
    ) -> Result<WorkflowId, ResolverError> {
        let mut by_name: HashMap<String, JobDependency> = HashMap::new();
        for member in members {
            if by_name.contains_key(&member.name) {
                return Err(ResolverError::DuplicateJobName(member.name));
            }
            by_name.insert(member.name.clone(), member);
        }

        // The order must mention every member exactly once.
        if order.len() != by_name.len() {
            return Err(ResolverError::OrderMismatch);
        }
        let order_set: HashSet<&String> = order.iter().collect();
        if order_set.len() != order.len() || !by_name.keys().all(|n| order_set.contains(n)) {
            return Err(ResolverError::OrderMismatch);
        }

        // Requirement targets must exist.
        for member in by_name.values() {
            for requirement in &member.requires {
                for target in requirement.jobs() {
                    if !by_name.contains_key(target) {
                        return Err(ResolverError::UnknownRequirementTarget {
                            job: member.name.clone(),
                            target: target.to_string(),
                        });
                    }
                }
            }
        }

        // Kahn's algorithm over target -> dependent edges.
        verify_acyclic(&by_name)?;

        // Every requirement target must precede its dependent in the
        // caller's order; a violation means their topological sort failed.
        let position: HashMap<&str, usize> = order
            .iter()
            .enumerate()
            .map(|(i, n)| (n.as_str(), i))
            .collect();
        for member in by_name.values() {
            let member_pos = position.get(member.name.as_str()).copied();
            for requirement in &member.requires {
                for target in requirement.jobs() {
                    let target_pos = position.get(target).copied();
                    if let (Some(target_pos), Some(member_pos)) = (target_pos, member_pos) {
                        if target_pos >= member_pos {
                            return Err(ResolverError::OrderNotTopological {
                                dependent: member.name.clone(),
                                target: target.to_string(),
                            });
                        }
                    }
                }
            }
        }

        let id = WorkflowId(self.next_id.fetch_add(1, Ordering::SeqCst));
        let workflow = Workflow {
            id,
            name: name.to_string(),
            source: source.to_string(),
            members: by_name,
            order,
            state: WorkflowState::Running,
        };
        self.workflows.write().insert(id.0, Arc::new(Mutex::new(workflow)));
        tracing::info!(workflow = %id, name, source, "workflow registered");
        Ok(id)
    }

    fn workflow(&self, id: WorkflowId) -> Result<Arc<Mutex<Workflow>>, ResolverError> {
        self.workflows
            .read()
            .get(&id.0)
            .cloned()
            .ok_or(ResolverError::WorkflowNotFound(id.0))
    }

    /// Attach the job-store UUID to a member.
    pub fn bind_job(
        &self,
        id: WorkflowId,
        member: &str,
        job: JobId,
    ) -> Result<(), ResolverError> {
        let workflow = self.workflow(id)?;
        let mut workflow = workflow.lock();
        let dep = workflow
            .members
            .get_mut(member)
            .ok_or_else(|| ResolverError::MemberNotFound(member.to_string()))?;
        dep.job_id = Some(job.clone());
        self.job_index.write().insert(job, (id, member.to_string()));
        Ok(())
    }

    /// Pending members whose requirements all hold, in topological order.
    pub fn ready_jobs(&self, id: WorkflowId) -> Result<Vec<(String, JobId)>, ResolverError> {
        let workflow = self.workflow(id)?;
        let workflow = workflow.lock();
        Ok(ready_members(&workflow))
    }

    /// Mark a member as handed to the scheduler so readiness stops
    /// returning it. Member state becomes `Scheduled`.
    pub fn mark_admitted(&self, id: WorkflowId, member: &str) -> Result<(), ResolverError> {
        let workflow = self.workflow(id)?;
        let mut workflow = workflow.lock();
        let dep = workflow
            .members
            .get_mut(member)
            .ok_or_else(|| ResolverError::MemberNotFound(member.to_string()))?;
        dep.state = JobState::Scheduled;
        Ok(())
    }

    /// Fold one job's new state into its workflow.
    ///
    /// Returns `None` for jobs that belong to no workflow. Otherwise updates
    /// the member, cascades cancellation through members that can never
    /// become ready, recomputes the aggregate state, and reports what
    /// changed.
    pub fn on_job_state_change(
        &self,
        job: &JobId,
        state: JobState,
    ) -> Option<StateChangeOutcome> {
        let (workflow_id, member_name) = self.job_index.read().get(job).cloned()?;
        let workflow = self.workflow(workflow_id).ok()?;
        let mut workflow = workflow.lock();

        let mut outcome = StateChangeOutcome::empty(workflow_id);

        if let Some(dep) = workflow.members.get_mut(&member_name) {
            if dep.state == state {
                // Echo of a cascade we initiated; nothing new to fold in.
                outcome.workflow_state = workflow.state;
                return Some(outcome);
            }
            dep.state = state;
        }

        if state.is_failure_like() {
            outcome.cancelled = cascade_cancel(&mut workflow);
        }
        outcome.newly_ready = ready_members(&workflow);

        workflow.state = workflow.derived_state();
        outcome.workflow_state = workflow.state;

        tracing::debug!(
            workflow = %workflow_id,
            member = %member_name,
            state = %state,
            ready = outcome.newly_ready.len(),
            cancelled = outcome.cancelled.len(),
            aggregate = %workflow.state,
            "workflow state change"
        );
        Some(outcome)
    }

    /// Snapshot for status queries.
    pub fn workflow_status(&self, id: WorkflowId) -> Result<WorkflowStatusView, ResolverError> {
        let workflow = self.workflow(id)?;
        let workflow = workflow.lock();
        Ok(WorkflowStatusView {
            id: workflow.id,
            name: workflow.name.clone(),
            state: workflow.state,
            jobs: workflow
                .members
                .iter()
                .map(|(name, dep)| (name.clone(), dep.state))
                .collect(),
        })
    }

    /// Snapshots of every registered workflow, newest last.
    pub fn list_workflows(&self) -> Vec<WorkflowStatusView> {
        let ids: Vec<u64> = {
            let mut ids: Vec<u64> = self.workflows.read().keys().copied().collect();
            ids.sort_unstable();
            ids
        };
        ids.into_iter()
            .filter_map(|id| self.workflow_status(WorkflowId(id)).ok())
            .collect()
    }
}

/// Pending members whose requirements all evaluate true, in topo order.
fn ready_members(workflow: &Workflow) -> Vec<(String, JobId)> {
    let states = workflow.member_states();
    let lookup = |job: &str| states.get(job).copied();

    workflow
        .order
        .iter()
        .filter_map(|name| {
            let dep = workflow.members.get(name)?;
            if dep.state != JobState::Pending {
                return None;
            }
            if !dep.requires.iter().all(|r| r.eval(&lookup)) {
                return None;
            }
            let job_id = dep.job_id.clone()?;
            Some((name.clone(), job_id))
        })
        .collect()
}

/// Transitively cancel members that can never become ready.
///
/// Terminal member states are treated as permanent; any pending member whose
/// requirements have no remaining satisfying assignment is cancelled, which
/// in turn pins its state and may doom further dependents, so the pass
/// repeats until a fixpoint.
fn cascade_cancel(workflow: &mut Workflow) -> Vec<(String, JobId)> {
    let mut cancelled = Vec::new();

    loop {
        let fixed = workflow.terminal_states();
        let doomed: Vec<String> = workflow
            .order
            .iter()
            .filter(|name| {
                let Some(dep) = workflow.members.get(name.as_str()) else {
                    return false;
                };
                if dep.state.is_terminal() || dep.state == JobState::Running {
                    return false;
                }
                !dep.requires.iter().all(|r| r.satisfiable(&fixed))
            })
            .cloned()
            .collect();

        if doomed.is_empty() {
            break;
        }
        for name in doomed {
            if let Some(dep) = workflow.members.get_mut(&name) {
                dep.state = JobState::Cancelled;
                if let Some(job_id) = dep.job_id.clone() {
                    cancelled.push((name, job_id));
                }
            }
        }
    }

    cancelled
}

/// Kahn's algorithm over target -> dependent edges.
fn verify_acyclic(members: &HashMap<String, JobDependency>) -> Result<(), ResolverError> {
    let mut in_degree: HashMap<&str, usize> = members.keys().map(|n| (n.as_str(), 0)).collect();
    let mut dependents: HashMap<&str, Vec<&str>> = HashMap::new();

    for member in members.values() {
        let mut targets: HashSet<&str> = HashSet::new();
        for requirement in &member.requires {
            targets.extend(requirement.jobs());
        }
        for target in targets {
            if target == member.name {
                return Err(ResolverError::Cycle(member.name.clone()));
            }
            dependents.entry(target).or_default().push(&member.name);
            if let Some(degree) = in_degree.get_mut(member.name.as_str()) {
                *degree += 1;
            }
        }
    }

    let mut queue: VecDeque<&str> = in_degree
        .iter()
        .filter(|(_, d)| **d == 0)
        .map(|(n, _)| *n)
        .collect();
    let mut visited = 0usize;

    while let Some(node) = queue.pop_front() {
        visited += 1;
        if let Some(next) = dependents.get(node) {
            for dependent in next {
                if let Some(degree) = in_degree.get_mut(dependent) {
                    *degree -= 1;
                    if *degree == 0 {
                        queue.push_back(dependent);
                    }
                }
            }
        }
    }

    if visited != members.len() {
        let stuck = in_degree
            .iter()
            .find(|(_, d)| **d > 0)
            .map(|(n, _)| n.to_string())
            .unwrap_or_default();
        return Err(ResolverError::Cycle(stuck));
    }
    Ok(())
}

#[cfg(test)]
#[path = "resolver_tests.rs"]
mod tests;
