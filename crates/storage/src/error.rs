// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Store error types.

use thiserror::Error;

/// Errors from the job/volume/network registries.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("already exists: {0}")]
    AlreadyExists(String),

    /// Terminal jobs are immutable apart from resource-field cleanup.
    #[error("job {0} is terminal")]
    TerminalImmutable(String),

    /// The network's address pool is exhausted.
    #[error("network {0} has no free addresses")]
    NoCapacity(String),

    /// A network cannot be deleted while jobs hold leases.
    #[error("network {name} has {leases} active leases")]
    LeasesHeld { name: String, leases: usize },

    #[error("invalid subnet: {0}")]
    InvalidSubnet(#[from] jl_core::SubnetError),
}
