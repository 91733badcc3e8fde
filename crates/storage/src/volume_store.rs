// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Volume registry.

use crate::error::StoreError;
use jl_core::Volume;
use parking_lot::RwLock;
use std::collections::HashMap;

/// In-memory volume table keyed by name.
#[derive(Default)]
pub struct VolumeStore {
    volumes: RwLock<HashMap<String, Volume>>,
}

impl VolumeStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&self, volume: Volume) -> Result<(), StoreError> {
        let mut volumes = self.volumes.write();
        if volumes.contains_key(&volume.name) {
            return Err(StoreError::AlreadyExists(volume.name.clone()));
        }
        volumes.insert(volume.name.clone(), volume);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<Volume> {
        self.volumes.read().get(name).cloned()
    }

    pub fn list(&self) -> Vec<Volume> {
        let mut all: Vec<Volume> = self.volumes.read().values().cloned().collect();
        all.sort_by(|a, b| a.name.cmp(&b.name));
        all
    }

    pub fn delete(&self, name: &str) -> Result<Volume, StoreError> {
        self.volumes
            .write()
            .remove(name)
            .ok_or_else(|| StoreError::NotFound(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.volumes.read().contains_key(name)
    }
}

#[cfg(test)]
#[path = "volume_store_tests.rs"]
mod tests;
