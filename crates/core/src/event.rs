// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Event types published on the in-process bus.
//!
//! Serializes with `{"type": "job.started", ...fields}` format. Payloads
//! carry only plain data; secret environment values never appear here.

use crate::job::JobId;
use crate::volume::VolumeKind;
use serde::{Deserialize, Serialize};

/// Events signalling lifecycle transitions and resource changes.
///
/// One event per job transition; resource events for volume/network
/// administration. In-process signals only, nothing is persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Event {
    // -- job --
    #[serde(rename = "job.scheduled")]
    JobScheduled {
        job_id: JobId,
        at_ms: u64,
        /// Wall-clock dispatch target.
        scheduled_for_ms: u64,
    },

    #[serde(rename = "job.started")]
    JobStarted {
        job_id: JobId,
        at_ms: u64,
        #[serde(default)]
        node: String,
    },

    #[serde(rename = "job.completed")]
    JobCompleted {
        job_id: JobId,
        at_ms: u64,
        exit_code: i32,
    },

    #[serde(rename = "job.failed")]
    JobFailed {
        job_id: JobId,
        at_ms: u64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        exit_code: Option<i32>,
        reason: String,
    },

    #[serde(rename = "job.stopped")]
    JobStopped { job_id: JobId, at_ms: u64 },

    #[serde(rename = "job.cancelled")]
    JobCancelled {
        job_id: JobId,
        at_ms: u64,
        reason: String,
    },

    // -- volume --
    #[serde(rename = "volume.created")]
    VolumeCreated {
        name: String,
        at_ms: u64,
        size_mb: u64,
        kind: VolumeKind,
    },

    #[serde(rename = "volume.deleted")]
    VolumeDeleted { name: String, at_ms: u64 },

    // -- network --
    #[serde(rename = "network.setup")]
    NetworkSetup {
        name: String,
        at_ms: u64,
        cidr: String,
    },

    #[serde(rename = "network.torn_down")]
    NetworkTornDown { name: String, at_ms: u64 },
}

/// Tag-only variant of [`Event`] used as the subscription key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    JobScheduled,
    JobStarted,
    JobCompleted,
    JobFailed,
    JobStopped,
    JobCancelled,
    VolumeCreated,
    VolumeDeleted,
    NetworkSetup,
    NetworkTornDown,
}

impl EventKind {
    /// Every kind, for subscribers that want the full stream.
    pub const ALL: [EventKind; 10] = [
        EventKind::JobScheduled,
        EventKind::JobStarted,
        EventKind::JobCompleted,
        EventKind::JobFailed,
        EventKind::JobStopped,
        EventKind::JobCancelled,
        EventKind::VolumeCreated,
        EventKind::VolumeDeleted,
        EventKind::NetworkSetup,
        EventKind::NetworkTornDown,
    ];

    /// Kinds marking a job's terminal transition.
    pub const JOB_TERMINAL: [EventKind; 4] = [
        EventKind::JobCompleted,
        EventKind::JobFailed,
        EventKind::JobStopped,
        EventKind::JobCancelled,
    ];

    /// The wire name, matching the serde tag.
    pub fn name(&self) -> &'static str {
        match self {
            EventKind::JobScheduled => "job.scheduled",
            EventKind::JobStarted => "job.started",
            EventKind::JobCompleted => "job.completed",
            EventKind::JobFailed => "job.failed",
            EventKind::JobStopped => "job.stopped",
            EventKind::JobCancelled => "job.cancelled",
            EventKind::VolumeCreated => "volume.created",
            EventKind::VolumeDeleted => "volume.deleted",
            EventKind::NetworkSetup => "network.setup",
            EventKind::NetworkTornDown => "network.torn_down",
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl Event {
    /// The subscription key for this event.
    pub fn kind(&self) -> EventKind {
        match self {
            Event::JobScheduled { .. } => EventKind::JobScheduled,
            Event::JobStarted { .. } => EventKind::JobStarted,
            Event::JobCompleted { .. } => EventKind::JobCompleted,
            Event::JobFailed { .. } => EventKind::JobFailed,
            Event::JobStopped { .. } => EventKind::JobStopped,
            Event::JobCancelled { .. } => EventKind::JobCancelled,
            Event::VolumeCreated { .. } => EventKind::VolumeCreated,
            Event::VolumeDeleted { .. } => EventKind::VolumeDeleted,
            Event::NetworkSetup { .. } => EventKind::NetworkSetup,
            Event::NetworkTornDown { .. } => EventKind::NetworkTornDown,
        }
    }

    pub fn name(&self) -> &'static str {
        self.kind().name()
    }

    pub fn job_id(&self) -> Option<&JobId> {
        match self {
            Event::JobScheduled { job_id, .. }
            | Event::JobStarted { job_id, .. }
            | Event::JobCompleted { job_id, .. }
            | Event::JobFailed { job_id, .. }
            | Event::JobStopped { job_id, .. }
            | Event::JobCancelled { job_id, .. } => Some(job_id),
            _ => None,
        }
    }

    /// Event timestamp in epoch milliseconds.
    pub fn at_ms(&self) -> u64 {
        match self {
            Event::JobScheduled { at_ms, .. }
            | Event::JobStarted { at_ms, .. }
            | Event::JobCompleted { at_ms, .. }
            | Event::JobFailed { at_ms, .. }
            | Event::JobStopped { at_ms, .. }
            | Event::JobCancelled { at_ms, .. }
            | Event::VolumeCreated { at_ms, .. }
            | Event::VolumeDeleted { at_ms, .. }
            | Event::NetworkSetup { at_ms, .. }
            | Event::NetworkTornDown { at_ms, .. } => *at_ms,
        }
    }

    /// One-line form for log output.
    pub fn log_summary(&self) -> String {
        let t = self.name();
        match self {
            Event::JobScheduled {
                job_id,
                scheduled_for_ms,
                ..
            } => format!("{t} job={} for_ms={scheduled_for_ms}", job_id.short(8)),
            Event::JobStarted { job_id, node, .. } => {
                if node.is_empty() {
                    format!("{t} job={}", job_id.short(8))
                } else {
                    format!("{t} job={} node={node}", job_id.short(8))
                }
            }
            Event::JobCompleted {
                job_id, exit_code, ..
            } => format!("{t} job={} exit={exit_code}", job_id.short(8)),
            Event::JobFailed {
                job_id,
                exit_code,
                reason,
                ..
            } => match exit_code {
                Some(code) => format!("{t} job={} exit={code} reason={reason}", job_id.short(8)),
                None => format!("{t} job={} reason={reason}", job_id.short(8)),
            },
            Event::JobStopped { job_id, .. } => format!("{t} job={}", job_id.short(8)),
            Event::JobCancelled { job_id, reason, .. } => {
                format!("{t} job={} reason={reason}", job_id.short(8))
            }
            Event::VolumeCreated {
                name, size_mb, kind, ..
            } => format!("{t} volume={name} size_mb={size_mb} kind={kind}"),
            Event::VolumeDeleted { name, .. } => format!("{t} volume={name}"),
            Event::NetworkSetup { name, cidr, .. } => format!("{t} network={name} cidr={cidr}"),
            Event::NetworkTornDown { name, .. } => format!("{t} network={name}"),
        }
    }
}

#[cfg(test)]
#[path = "event_tests.rs"]
mod tests;
