// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Bridge-backed job networks and their address pools.

use serde::{Deserialize, Serialize};
use std::net::Ipv4Addr;
use thiserror::Error;

/// Errors from parsing a subnet in CIDR form.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SubnetError {
    #[error("invalid CIDR '{0}'")]
    Invalid(String),
    #[error("prefix length {0} out of range (8-30)")]
    PrefixOutOfRange(u8),
}

/// An IPv4 subnet with derived gateway and allocatable host range.
///
/// The first host address is the bridge gateway; jobs lease addresses from
/// the second host up to (not including) broadcast.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subnet {
    base: Ipv4Addr,
    prefix: u8,
}

impl Subnet {
    /// Parse `a.b.c.d/len`. Host bits in the base address are masked off.
    pub fn parse(cidr: &str) -> Result<Self, SubnetError> {
        let (addr, prefix) = cidr
            .split_once('/')
            .ok_or_else(|| SubnetError::Invalid(cidr.to_string()))?;
        let addr: Ipv4Addr = addr
            .parse()
            .map_err(|_| SubnetError::Invalid(cidr.to_string()))?;
        let prefix: u8 = prefix
            .parse()
            .map_err(|_| SubnetError::Invalid(cidr.to_string()))?;
        if !(8..=30).contains(&prefix) {
            return Err(SubnetError::PrefixOutOfRange(prefix));
        }
        let mask = u32::MAX << (32 - prefix);
        let base = Ipv4Addr::from(u32::from(addr) & mask);
        Ok(Self { base, prefix })
    }

    pub fn prefix(&self) -> u8 {
        self.prefix
    }

    /// Gateway address: first host in the subnet.
    pub fn gateway(&self) -> Ipv4Addr {
        Ipv4Addr::from(u32::from(self.base) + 1)
    }

    /// First address jobs may lease.
    pub fn first_lease(&self) -> Ipv4Addr {
        Ipv4Addr::from(u32::from(self.base) + 2)
    }

    /// Last address jobs may lease (one below broadcast).
    pub fn last_lease(&self) -> Ipv4Addr {
        let broadcast = u32::from(self.base) | (u32::MAX >> self.prefix);
        Ipv4Addr::from(broadcast - 1)
    }

    /// Number of leasable addresses.
    pub fn capacity(&self) -> u32 {
        let total = 1u32 << (32 - self.prefix);
        total.saturating_sub(3)
    }

    /// Whether the address lies inside this subnet.
    pub fn contains(&self, addr: Ipv4Addr) -> bool {
        let mask = u32::MAX << (32 - self.prefix);
        (u32::from(addr) & mask) == u32::from(self.base)
    }
}

impl std::fmt::Display for Subnet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.base, self.prefix)
    }
}

/// A named L3 network jobs can attach to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Network {
    pub name: String,
    pub subnet: Subnet,
    /// Host bridge interface carrying the subnet.
    pub bridge: String,
    #[serde(default)]
    pub created_at_ms: u64,
}

impl Network {
    pub fn new(name: impl Into<String>, subnet: Subnet) -> Self {
        let name = name.into();
        let bridge = format!("jl-{name}");
        Self {
            name,
            subnet,
            bridge,
            created_at_ms: 0,
        }
    }
}

#[cfg(test)]
#[path = "network_tests.rs"]
mod tests;
