// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Host-side volume directories and the mount plan handed to init.

use crate::error::IsolationError;
use jl_core::{Volume, VolumeKind};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Filesystem type of one mount the init child performs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum MountFs {
    /// Bind-mount a host directory.
    Bind,
    /// Fresh tmpfs capped at `size_mb`.
    Tmpfs { size_mb: u64 },
}

/// One mount the init child performs inside the job root.
///
/// Serialized into a single env var value as `target|fs|source` where `fs`
/// is `bind` or `tmpfs:<size_mb>`; paths never contain `|`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MountSpec {
    /// Host source directory (empty for tmpfs).
    pub source: PathBuf,
    /// Mount point inside the job root.
    pub target: PathBuf,
    pub fs: MountFs,
}

impl MountSpec {
    /// Encode for the env ABI.
    pub fn encode(&self) -> String {
        let fs = match &self.fs {
            MountFs::Bind => "bind".to_string(),
            MountFs::Tmpfs { size_mb } => format!("tmpfs:{size_mb}"),
        };
        format!("{}|{}|{}", self.target.display(), fs, self.source.display())
    }

    /// Decode an env ABI value.
    pub fn decode(value: &str) -> Option<MountSpec> {
        let mut parts = value.splitn(3, '|');
        let target = PathBuf::from(parts.next()?);
        let fs = parts.next()?;
        let source = PathBuf::from(parts.next()?);
        let fs = if fs == "bind" {
            MountFs::Bind
        } else {
            let size_mb = fs.strip_prefix("tmpfs:")?.parse().ok()?;
            MountFs::Tmpfs { size_mb }
        };
        Some(MountSpec { source, target, fs })
    }
}

/// Manages volume data directories under the configured volume root.
pub struct VolumeMounts {
    root: PathBuf,
}

impl VolumeMounts {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Host data directory backing a filesystem volume.
    pub fn data_dir(&self, volume: &str) -> PathBuf {
        self.root.join(volume)
    }

    /// Create the backing directory for a new volume.
    pub fn create(&self, volume: &Volume) -> Result<(), IsolationError> {
        if volume.kind == VolumeKind::Filesystem {
            let dir = self.data_dir(&volume.name);
            std::fs::create_dir_all(&dir).map_err(|e| IsolationError::io(&dir, e))?;
        }
        Ok(())
    }

    /// Remove a volume's backing directory and its data.
    pub fn remove(&self, volume: &Volume) -> Result<(), IsolationError> {
        if volume.kind == VolumeKind::Filesystem {
            let dir = self.data_dir(&volume.name);
            match std::fs::remove_dir_all(&dir) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(IsolationError::io(&dir, e)),
            }
        }
        Ok(())
    }

    /// Build the mount plan for a job's requested volumes.
    ///
    /// Filesystem volumes bind their host data dir; memory volumes become
    /// tmpfs mounts. Fails if a filesystem volume has no backing directory.
    pub fn mount_plan(&self, volumes: &[Volume]) -> Result<Vec<MountSpec>, IsolationError> {
        let mut plan = Vec::with_capacity(volumes.len());
        for volume in volumes {
            let spec = match volume.kind {
                VolumeKind::Filesystem => {
                    let source = self.data_dir(&volume.name);
                    if !source.is_dir() {
                        return Err(IsolationError::VolumeMissing(volume.name.clone()));
                    }
                    MountSpec {
                        source,
                        target: PathBuf::from(&volume.mount_path),
                        fs: MountFs::Bind,
                    }
                }
                VolumeKind::Memory => MountSpec {
                    source: PathBuf::new(),
                    target: PathBuf::from(&volume.mount_path),
                    fs: MountFs::Tmpfs {
                        size_mb: volume.size_mb,
                    },
                },
            };
            plan.push(spec);
        }
        Ok(plan)
    }
}

/// Ensure a mount target exists under the job root.
pub(crate) fn ensure_target(root: &Path, target: &Path) -> Result<PathBuf, IsolationError> {
    let rel = target.strip_prefix("/").unwrap_or(target);
    let full = root.join(rel);
    std::fs::create_dir_all(&full).map_err(|e| IsolationError::io(&full, e))?;
    Ok(full)
}

#[cfg(test)]
#[path = "volumes_tests.rs"]
mod tests;
