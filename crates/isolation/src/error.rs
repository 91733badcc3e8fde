// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Error types for the isolation layer (parent side).

use std::path::PathBuf;
use thiserror::Error;

/// Errors from acquiring or releasing kernel resources for a job.
#[derive(Debug, Error)]
pub enum IsolationError {
    #[error("io error at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid cpu list '{0}'")]
    InvalidCpuList(String),

    #[error("command `{command}` failed: {detail}")]
    CommandFailed { command: String, detail: String },

    #[error("command `{command}` timed out after {seconds}s")]
    CommandTimeout { command: String, seconds: u64 },

    #[error("upload error: {0}")]
    Upload(String),

    #[error("volume {0} not found on disk")]
    VolumeMissing(String),
}

impl IsolationError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
