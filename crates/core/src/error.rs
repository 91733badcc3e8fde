// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The system-wide error taxonomy surfaced to callers.

use thiserror::Error;

/// Classified errors with a fixed recovery policy per kind.
///
/// `Transient` is the only kind recovered silently (logged, aggregated by the
/// event bus); every other kind either rejects the request before resources
/// are acquired (`Validation`, `NoCapacity`) or transitions the job to a
/// terminal state with exactly one event.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum JobletError {
    /// Bad submission: unknown runtime, malformed expression, missing
    /// network/volume. No resources were acquired.
    #[error("validation: {0}")]
    Validation(String),

    /// A pool (IP addresses) is exhausted.
    #[error("no capacity: {0}")]
    NoCapacity(String),

    /// Kernel resource acquisition or init-side setup failed; the job goes
    /// to `Failed` and partial acquisitions are released.
    #[error("resource setup failed: {0}")]
    ResourceSetup(String),

    /// The upload stream closed before all declared bytes arrived.
    #[error("upload incomplete: {0}")]
    UploadIncomplete(String),

    /// The child exited on a signal.
    #[error("child crashed: signal {signal}")]
    ChildCrashed { signal: i32 },

    /// An upstream failure made a dependent's requirements unsatisfiable.
    #[error("dependency unsatisfiable: {0}")]
    DependencyUnsatisfiable(String),

    /// Recoverable internal hiccup (event handler failure).
    #[error("transient: {0}")]
    Transient(String),
}

impl JobletError {
    /// Stable wire code for the transport surface.
    pub fn code(&self) -> &'static str {
        match self {
            JobletError::Validation(_) => "VALIDATION_ERROR",
            JobletError::NoCapacity(_) => "NO_CAPACITY",
            JobletError::ResourceSetup(_) => "RESOURCE_SETUP_FAILED",
            JobletError::UploadIncomplete(_) => "UPLOAD_INCOMPLETE",
            JobletError::ChildCrashed { .. } => "CHILD_CRASHED",
            JobletError::DependencyUnsatisfiable(_) => "DEPENDENCY_UNSATISFIABLE",
            JobletError::Transient(_) => "TRANSIENT",
        }
    }
}
