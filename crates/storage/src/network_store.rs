// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Network registry with per-job IP leases.

use crate::error::StoreError;
use jl_core::{JobId, Network};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::net::Ipv4Addr;

struct NetworkEntry {
    network: Network,
    /// job id -> leased address. At most one lease per (job, network).
    leases: HashMap<JobId, Ipv4Addr>,
}

/// In-memory network table keyed by name, owning the address pools.
#[derive(Default)]
pub struct NetworkStore {
    networks: RwLock<HashMap<String, NetworkEntry>>,
}

impl NetworkStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&self, network: Network) -> Result<(), StoreError> {
        let mut networks = self.networks.write();
        if networks.contains_key(&network.name) {
            return Err(StoreError::AlreadyExists(network.name.clone()));
        }
        networks.insert(
            network.name.clone(),
            NetworkEntry {
                network,
                leases: HashMap::new(),
            },
        );
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<Network> {
        self.networks.read().get(name).map(|e| e.network.clone())
    }

    pub fn list(&self) -> Vec<Network> {
        let mut all: Vec<Network> = self
            .networks
            .read()
            .values()
            .map(|e| e.network.clone())
            .collect();
        all.sort_by(|a, b| a.name.cmp(&b.name));
        all
    }

    /// Remove a network. Refused while any job still holds a lease.
    pub fn delete(&self, name: &str) -> Result<Network, StoreError> {
        let mut networks = self.networks.write();
        let entry = networks
            .get(name)
            .ok_or_else(|| StoreError::NotFound(name.to_string()))?;
        if !entry.leases.is_empty() {
            return Err(StoreError::LeasesHeld {
                name: name.to_string(),
                leases: entry.leases.len(),
            });
        }
        match networks.remove(name) {
            Some(entry) => Ok(entry.network),
            None => Err(StoreError::NotFound(name.to_string())),
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.networks.read().contains_key(name)
    }

    /// Lease the next free address in the named network's pool.
    ///
    /// A job that already holds a lease gets the same address back; an
    /// exhausted pool fails with [`StoreError::NoCapacity`].
    pub fn allocate_ip(&self, name: &str, job: &JobId) -> Result<Ipv4Addr, StoreError> {
        let mut networks = self.networks.write();
        let entry = networks
            .get_mut(name)
            .ok_or_else(|| StoreError::NotFound(name.to_string()))?;

        if let Some(addr) = entry.leases.get(job) {
            return Ok(*addr);
        }

        let subnet = entry.network.subnet;
        let first = u32::from(subnet.first_lease());
        let last = u32::from(subnet.last_lease());
        let taken: std::collections::HashSet<u32> =
            entry.leases.values().map(|a| u32::from(*a)).collect();

        for candidate in first..=last {
            if !taken.contains(&candidate) {
                let addr = Ipv4Addr::from(candidate);
                entry.leases.insert(job.clone(), addr);
                tracing::debug!(network = name, job = %job.short(8), ip = %addr, "leased address");
                return Ok(addr);
            }
        }

        Err(StoreError::NoCapacity(name.to_string()))
    }

    /// Release a job's lease. Idempotent: releasing a lease that does not
    /// exist is a no-op.
    pub fn release_ip(&self, name: &str, job: &JobId) {
        let mut networks = self.networks.write();
        if let Some(entry) = networks.get_mut(name) {
            if entry.leases.remove(job).is_some() {
                tracing::debug!(network = name, job = %job.short(8), "released address");
            }
        }
    }

    /// Number of active leases in the named network.
    pub fn lease_count(&self, name: &str) -> usize {
        self.networks
            .read()
            .get(name)
            .map(|e| e.leases.len())
            .unwrap_or(0)
    }
}

#[cfg(test)]
#[path = "network_store_tests.rs"]
mod tests;
