// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! jl-isolation: kernel resources and the parent/init handoff.
//!
//! The parent side acquires cgroups, network namespaces, and volume mounts
//! for a job, stages uploads, and emits the environment contract; the init
//! side (the re-executed child, entered via `JOBLET_MODE=init`) reads that
//! contract back, finishes isolation setup, and execs the user command.

pub mod cgroup;
pub mod cpuset;
pub mod env_abi;
pub mod error;
pub mod init;
pub mod network;
pub mod upload;
pub mod volumes;

pub use cgroup::{CgroupController, CgroupHandle};
pub use env_abi::{InitConfig, JobEnvironment};
pub use error::IsolationError;
pub use init::InitError;
pub use network::{NetworkController, NetworkHandle};
pub use upload::{
    StreamConsumer, StreamPair, StreamProducer, UploadError, UploadManager, UploadSession,
    UploadTransport,
};
pub use volumes::{MountFs, MountSpec, VolumeMounts};
