// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-job network namespaces attached to named bridges.
//!
//! Setup shells out to `ip` and `iptables`; each invocation carries its own
//! deadline so a wedged netlink operation fails the job instead of hanging
//! the daemon. Operations serialize per network name.

use crate::error::IsolationError;
use jl_core::{JobId, Network};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::Duration;
use tokio::process::Command;

/// Deadline for each external network command.
const COMMAND_TIMEOUT: Duration = Duration::from_secs(30);

/// Handle for a job's network attachment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkHandle {
    /// Named network namespace, `jl-<short job id>`.
    pub netns: String,
    /// Host-side veth interface name.
    pub veth_host: String,
    pub network: String,
    pub ip: Ipv4Addr,
}

/// Namespace name for a job, `jl-<short id>`.
pub fn netns_name(job: &JobId) -> String {
    format!("jl-{}", job.short(8))
}

/// Host-side veth name for a job. Stays under the kernel's 15-char
/// interface name limit.
pub fn veth_host_name(job: &JobId) -> String {
    format!("jlh-{}", job.short(8))
}

/// Job-side veth name, moved into the namespace.
pub fn veth_job_name(job: &JobId) -> String {
    format!("jlj-{}", job.short(8))
}

/// Acquires and releases bridge attachments for jobs.
pub struct NetworkController {
    /// One lock per network name; kernel bridge operations on the same
    /// bridge must not interleave.
    locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl Default for NetworkController {
    fn default() -> Self {
        Self::new()
    }
}

impl NetworkController {
    pub fn new() -> Self {
        Self {
            locks: Mutex::new(HashMap::new()),
        }
    }

    fn lock_for(&self, network: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.locks.lock();
        Arc::clone(
            locks
                .entry(network.to_string())
                .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(()))),
        )
    }

    /// Ensure the bridge for a network exists, is addressed, and NATs out.
    pub async fn setup_bridge(&self, network: &Network) -> Result<(), IsolationError> {
        let lock = self.lock_for(&network.name);
        let _guard = lock.lock().await;

        let bridge = &network.bridge;
        let gateway = network.subnet.gateway();
        let prefix = network.subnet.prefix();

        if run("ip", &["link", "show", bridge]).await.is_err() {
            run("ip", &["link", "add", "name", bridge, "type", "bridge"]).await?;
            run(
                "ip",
                &["addr", "add", &format!("{gateway}/{prefix}"), "dev", bridge],
            )
            .await?;
        }
        run("ip", &["link", "set", bridge, "up"]).await?;

        // NAT for outbound traffic; -C probes so the rule is added once.
        let subnet = network.subnet.to_string();
        let nat_rule = [
            "-t",
            "nat",
            "-C",
            "POSTROUTING",
            "-s",
            &subnet,
            "-j",
            "MASQUERADE",
        ];
        if run("iptables", &nat_rule).await.is_err() {
            run(
                "iptables",
                &[
                    "-t",
                    "nat",
                    "-A",
                    "POSTROUTING",
                    "-s",
                    &subnet,
                    "-j",
                    "MASQUERADE",
                ],
            )
            .await?;
        }
        Ok(())
    }

    /// Tear down the bridge and NAT rule for a network.
    pub async fn teardown_bridge(&self, network: &Network) -> Result<(), IsolationError> {
        let lock = self.lock_for(&network.name);
        let _guard = lock.lock().await;

        let subnet = network.subnet.to_string();
        let _ = run(
            "iptables",
            &[
                "-t",
                "nat",
                "-D",
                "POSTROUTING",
                "-s",
                &subnet,
                "-j",
                "MASQUERADE",
            ],
        )
        .await;
        run("ip", &["link", "del", &network.bridge]).await
    }

    /// Create the job's namespace, veth pair, bridge attachment, address,
    /// and default route.
    pub async fn acquire(
        &self,
        job: &JobId,
        network: &Network,
        ip: Ipv4Addr,
    ) -> Result<NetworkHandle, IsolationError> {
        let lock = self.lock_for(&network.name);
        let _guard = lock.lock().await;

        let netns = netns_name(job);
        let veth_host = veth_host_name(job);
        let veth_job = veth_job_name(job);
        let prefix = network.subnet.prefix();
        let gateway = network.subnet.gateway().to_string();

        run("ip", &["netns", "add", &netns]).await?;

        let result: Result<(), IsolationError> = async {
            run(
                "ip",
                &[
                    "link", "add", &veth_host, "type", "veth", "peer", "name", &veth_job,
                ],
            )
            .await?;
            run("ip", &["link", "set", &veth_host, "master", &network.bridge]).await?;
            run("ip", &["link", "set", &veth_host, "up"]).await?;
            run("ip", &["link", "set", &veth_job, "netns", &netns]).await?;
            run(
                "ip",
                &[
                    "netns", "exec", &netns, "ip", "addr", "add",
                    &format!("{ip}/{prefix}"), "dev", &veth_job,
                ],
            )
            .await?;
            run(
                "ip",
                &["netns", "exec", &netns, "ip", "link", "set", &veth_job, "up"],
            )
            .await?;
            run(
                "ip",
                &["netns", "exec", &netns, "ip", "link", "set", "lo", "up"],
            )
            .await?;
            run(
                "ip",
                &[
                    "netns", "exec", &netns, "ip", "route", "add", "default", "via", &gateway,
                ],
            )
            .await?;
            Ok(())
        }
        .await;

        if let Err(e) = result {
            // Unwind the half-built attachment before surfacing the error.
            let _ = run("ip", &["link", "del", &veth_host]).await;
            let _ = run("ip", &["netns", "del", &netns]).await;
            return Err(e);
        }

        tracing::info!(job = %job.short(8), netns = %netns, ip = %ip, network = %network.name, "network attached");
        Ok(NetworkHandle {
            netns,
            veth_host,
            network: network.name.clone(),
            ip,
        })
    }

    /// Remove the job's namespace and veth pair. Idempotent.
    pub async fn release(&self, handle: &NetworkHandle) -> Result<(), IsolationError> {
        let lock = self.lock_for(&handle.network);
        let _guard = lock.lock().await;

        let _ = run("ip", &["link", "del", &handle.veth_host]).await;
        let _ = run("ip", &["netns", "del", &handle.netns]).await;
        Ok(())
    }
}

/// Run an external command with the standard deadline.
async fn run(program: &str, args: &[&str]) -> Result<(), IsolationError> {
    let rendered = || format!("{program} {}", args.join(" "));

    let output = tokio::time::timeout(
        COMMAND_TIMEOUT,
        Command::new(program).args(args).output(),
    )
    .await
    .map_err(|_| IsolationError::CommandTimeout {
        command: rendered(),
        seconds: COMMAND_TIMEOUT.as_secs(),
    })?
    .map_err(|e| IsolationError::CommandFailed {
        command: rendered(),
        detail: e.to_string(),
    })?;

    if output.status.success() {
        Ok(())
    } else {
        Err(IsolationError::CommandFailed {
            command: rendered(),
            detail: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        })
    }
}

#[cfg(test)]
#[path = "network_tests.rs"]
mod tests;
