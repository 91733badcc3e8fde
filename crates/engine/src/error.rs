// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Error types for the engine.

use jl_core::JobletError;
use jl_storage::StoreError;
use thiserror::Error;

/// Errors from the orchestrator and its collaborators.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("validation: {0}")]
    Validation(String),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Isolation(#[from] jl_isolation::IsolationError),

    #[error(transparent)]
    Resolver(#[from] crate::resolver::ResolverError),

    #[error("job not found: {0}")]
    JobNotFound(String),

    #[error("job {0} is not in a stoppable or deletable state")]
    InvalidState(String),

    #[error("job {0} still holds resources")]
    ResourcesHeld(String),

    #[error("spawn failed: {0}")]
    Spawn(String),
}

impl EngineError {
    /// Map onto the caller-facing taxonomy.
    pub fn taxonomy(&self) -> JobletError {
        match self {
            EngineError::Validation(msg) => JobletError::Validation(msg.clone()),
            EngineError::Store(StoreError::NoCapacity(name)) => {
                JobletError::NoCapacity(name.clone())
            }
            EngineError::Store(e) => JobletError::Validation(e.to_string()),
            EngineError::Isolation(e) => JobletError::ResourceSetup(e.to_string()),
            EngineError::Resolver(e) => JobletError::Validation(e.to_string()),
            EngineError::JobNotFound(id) => JobletError::Validation(format!("job not found: {id}")),
            EngineError::InvalidState(id) => {
                JobletError::Validation(format!("invalid state for job {id}"))
            }
            EngineError::ResourcesHeld(id) => {
                JobletError::Validation(format!("job {id} still holds resources"))
            }
            EngineError::Spawn(msg) => JobletError::ResourceSetup(msg.clone()),
        }
    }
}
