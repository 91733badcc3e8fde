// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Job registry: the single owner of all `Job` records.

use crate::error::StoreError;
use jl_core::{Job, JobId, JobState};
use parking_lot::RwLock;
use std::collections::HashMap;

/// In-memory job table guarded by a reader-writer lock.
///
/// All mutation goes through [`JobStore::update`], which enforces the
/// terminal-immutability rule: once a job is `Completed`/`Failed`/`Stopped`/
/// `Cancelled` only resource-field cleanup is allowed.
#[derive(Default)]
pub struct JobStore {
    jobs: RwLock<HashMap<JobId, Job>>,
}

impl JobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new job. Fails if the id is already taken.
    pub fn put(&self, job: Job) -> Result<(), StoreError> {
        let mut jobs = self.jobs.write();
        if jobs.contains_key(&job.id) {
            return Err(StoreError::AlreadyExists(job.id.to_string()));
        }
        jobs.insert(job.id.clone(), job);
        Ok(())
    }

    /// Snapshot of a job by id.
    pub fn get(&self, id: &JobId) -> Option<Job> {
        self.jobs.read().get(id).cloned()
    }

    /// Snapshot of all jobs, unordered.
    pub fn list(&self) -> Vec<Job> {
        self.jobs.read().values().cloned().collect()
    }

    /// Apply a mutation to a live (non-terminal) job.
    pub fn update<F>(&self, id: &JobId, mutate: F) -> Result<Job, StoreError>
    where
        F: FnOnce(&mut Job),
    {
        let mut jobs = self.jobs.write();
        let job = jobs
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        if job.is_terminal() {
            return Err(StoreError::TerminalImmutable(id.to_string()));
        }
        mutate(job);
        Ok(job.clone())
    }

    /// Transition a job into a state, recording timestamps.
    ///
    /// The transition itself may enter a terminal state; what is rejected is
    /// mutating a job that already reached one.
    pub fn transition(&self, id: &JobId, state: JobState, at_ms: u64) -> Result<Job, StoreError> {
        self.update(id, |job| {
            job.state = state;
            match state {
                JobState::Running => job.started_at_ms = Some(at_ms),
                s if s.is_terminal() => job.ended_at_ms = Some(at_ms),
                _ => {}
            }
        })
    }

    /// Clear resource fields on a terminal job (metadata cleanup).
    ///
    /// This is the one mutation allowed after a terminal transition; the
    /// lifecycle layer calls it exactly once per release.
    pub fn clear_resources(&self, id: &JobId) -> Result<(), StoreError> {
        let mut jobs = self.jobs.write();
        let job = jobs
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        job.cgroup_path = None;
        job.ip = None;
        Ok(())
    }

    /// Remove a job record.
    pub fn delete(&self, id: &JobId) -> Result<Job, StoreError> {
        self.jobs
            .write()
            .remove(id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))
    }

    pub fn len(&self) -> usize {
        self.jobs.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.read().is_empty()
    }
}

#[cfg(test)]
#[path = "job_store_tests.rs"]
mod tests;
