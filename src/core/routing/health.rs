// src/core/routing/health.rs

//! The periodic liveness prober.
//!
//! Every cycle the checker snapshots the authoritative peer list, probes each
//! (group, role) pair concurrently, flips the alive bits that changed, and
//! rebuilds the derived view exactly once when anything did. A cycle never
//! blocks the next one: an overrunning cycle is abandoned with a warning.

use crate::core::backend::{BackendOp, BackendResponse, OpParams, Transport};
use crate::core::routing::{PartitionMap, Role};
use futures::stream::{FuturesUnordered, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::MissedTickBehavior;
use tracing::{info, warn};

pub struct HealthChecker {
    partition: Arc<PartitionMap>,
    transport: Arc<dyn Transport>,
    cycle: Duration,
    probe_timeout: Duration,
}

impl HealthChecker {
    pub fn new(
        partition: Arc<PartitionMap>,
        transport: Arc<dyn Transport>,
        cycle: Duration,
        probe_timeout: Duration,
    ) -> Self {
        Self {
            partition,
            transport,
            cycle,
            probe_timeout,
        }
    }

    pub async fn run(self, mut shutdown_rx: broadcast::Receiver<()>) {
        info!(
            "Health checker started: cycle {:?}, probe timeout {:?}",
            self.cycle, self.probe_timeout
        );
        let mut interval = tokio::time::interval(self.cycle);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick fires immediately; skip it so backends that are
        // still starting alongside the gate get one full cycle of grace.
        interval.tick().await;

        loop {
            tokio::select! {
                biased;
                _ = shutdown_rx.recv() => {
                    info!("Health checker shutting down.");
                    return;
                }
                _ = interval.tick() => {
                    if tokio::time::timeout(self.cycle, self.check_once()).await.is_err() {
                        warn!(
                            "Health check cycle overran its {:?} budget; abandoning outstanding probes",
                            self.cycle
                        );
                    }
                }
            }
        }
    }

    /// Runs one full probe cycle. Public so tests can drive cycles directly.
    pub async fn check_once(&self) {
        let groups = self.partition.snapshot_groups();

        let mut probes = FuturesUnordered::new();
        for (index, group) in groups.iter().enumerate() {
            for role in [Role::Master, Role::Slave] {
                let backend = group.backends.get(role);
                probes.push(self.probe(index, role, backend.host.clone(), backend.alive));
            }
        }

        let mut changed = false;
        while let Some(flipped) = probes.next().await {
            changed |= flipped;
        }

        if changed {
            self.partition.rebuild_derived();
        }
    }

    /// Probes one backend and records the verdict when it differs from the
    /// current alive bit. Returns whether the bit flipped.
    async fn probe(&self, group_index: usize, role: Role, host: String, recorded: bool) -> bool {
        let response: BackendResponse = self
            .transport
            .call(&host, BackendOp::Alive, &OpParams::new(), None, self.probe_timeout)
            .await;
        let observed = response.is_ok();
        if observed == recorded {
            return false;
        }
        if !observed {
            warn!("Backend {host} ({role:?} of group {group_index}) went down");
        } else {
            info!("Backend {host} ({role:?} of group {group_index}) came back");
        }
        self.partition.set_alive(group_index, role, observed)
    }
}
