// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Named persistent volumes mountable into job roots.

use serde::{Deserialize, Serialize};

/// Backing store of a volume.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VolumeKind {
    /// Directory on the host volume root, persists across jobs.
    #[default]
    Filesystem,
    /// tmpfs sized to the volume, vanishes with the job.
    Memory,
}

impl std::fmt::Display for VolumeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VolumeKind::Filesystem => write!(f, "filesystem"),
            VolumeKind::Memory => write!(f, "memory"),
        }
    }
}

/// A named, sized volume.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Volume {
    pub name: String,
    pub size_mb: u64,
    #[serde(default)]
    pub kind: VolumeKind,
    /// Mount point inside the job root.
    pub mount_path: String,
    #[serde(default)]
    pub created_at_ms: u64,
}

impl Volume {
    pub fn new(name: impl Into<String>, size_mb: u64, kind: VolumeKind) -> Self {
        let name = name.into();
        let mount_path = format!("/volumes/{name}");
        Self {
            name,
            size_mb,
            kind,
            mount_path,
            created_at_ms: 0,
        }
    }
}

#[cfg(test)]
#[path = "volume_tests.rs"]
mod tests;
