// src/core/routing/partition.rs

//! The two-view partition map.
//!
//! The authoritative view is the ordered list of peer groups from the config
//! file, guarded by a readers-writer lock and mutated only by reload and the
//! health checker. The derived view is a flat slot-indexed table published
//! through an atomic reference swap, so dispatch paths read it without taking
//! any lock. After a liveness flip the derived view is rebuilt wholesale and
//! swapped in; readers observe either the pre- or post-rebuild snapshot,
//! never a torn one.

use crate::core::HustGateError;
use crate::core::routing::slot::NUM_SLOTS;
use arc_swap::ArcSwap;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::info;

/// The role of a backend within its peer group.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Master,
    Slave,
}

fn default_alive() -> bool {
    true
}

/// One backend of a peer group: its host and the last health-check verdict.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackendSlot {
    pub host: String,
    #[serde(default = "default_alive")]
    pub alive: bool,
}

/// The `(master, slave)` backend pair owning a slot range.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackendPair {
    pub master: BackendSlot,
    pub slave: BackendSlot,
}

impl BackendPair {
    /// A pair whose two roles point at the same host is a single replica.
    pub fn is_degenerate(&self) -> bool {
        self.master.host == self.slave.host
    }

    pub fn get(&self, role: Role) -> &BackendSlot {
        match role {
            Role::Master => &self.master,
            Role::Slave => &self.slave,
        }
    }

    fn get_mut(&mut self, role: Role) -> &mut BackendSlot {
        match role {
            Role::Master => &mut self.master,
            Role::Slave => &mut self.slave,
        }
    }

    /// The hosts currently usable for dispatch, master first. A degenerate
    /// pair contributes at most one entry.
    pub fn live_hosts(&self) -> Vec<String> {
        let mut hosts = Vec::with_capacity(2);
        if self.master.alive {
            hosts.push(self.master.host.clone());
        }
        if self.slave.alive && !self.is_degenerate() {
            hosts.push(self.slave.host.clone());
        }
        hosts
    }
}

/// A contiguous slot range `[lo, hi)` and the backend pair that owns it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PeerGroup {
    pub region: [usize; 2],
    pub backends: BackendPair,
}

/// The derived view: one `BackendPair` per slot, duplicated from the owning
/// group so dispatch reads are a single index.
#[derive(Debug)]
pub struct SlotTable {
    entries: Vec<BackendPair>,
}

impl SlotTable {
    fn build(groups: &[PeerGroup]) -> Self {
        let placeholder = BackendPair {
            master: BackendSlot {
                host: String::new(),
                alive: false,
            },
            slave: BackendSlot {
                host: String::new(),
                alive: false,
            },
        };
        let mut entries = vec![placeholder; NUM_SLOTS];
        for group in groups {
            for entry in &mut entries[group.region[0]..group.region[1]] {
                *entry = group.backends.clone();
            }
        }
        Self { entries }
    }
}

/// The partition map: authoritative peer groups plus the published slot table.
#[derive(Debug)]
pub struct PartitionMap {
    groups: RwLock<Vec<PeerGroup>>,
    slots: ArcSwap<SlotTable>,
    /// Bumped on every derived-view rebuild. Binlog replay workers waiting
    /// for a dead target park on this channel instead of polling.
    rebuild_tx: watch::Sender<u64>,
}

impl PartitionMap {
    /// Builds the map from the configured peer groups, validating that the
    /// regions partition `[0, NUM_SLOTS)` exactly.
    pub fn from_groups(mut groups: Vec<PeerGroup>) -> Result<Self, HustGateError> {
        Self::validate(&groups)?;
        for group in &mut groups {
            normalize_degenerate(&mut group.backends);
        }
        let table = SlotTable::build(&groups);
        let (rebuild_tx, _) = watch::channel(0);
        Ok(Self {
            groups: RwLock::new(groups),
            slots: ArcSwap::from_pointee(table),
            rebuild_tx,
        })
    }

    fn validate(groups: &[PeerGroup]) -> Result<(), HustGateError> {
        let mut owners = [0u8; NUM_SLOTS];
        for (idx, group) in groups.iter().enumerate() {
            let [lo, hi] = group.region;
            if lo >= hi || hi > NUM_SLOTS {
                return Err(HustGateError::Partition(format!(
                    "group {idx} has invalid region [{lo}, {hi})"
                )));
            }
            for owner in &mut owners[lo..hi] {
                *owner += 1;
            }
        }
        for (slot, &count) in owners.iter().enumerate() {
            if count != 1 {
                return Err(HustGateError::Partition(format!(
                    "slot {slot} is claimed by {count} groups, expected exactly 1"
                )));
            }
        }
        Ok(())
    }

    /// O(1), lock-free lookup on the derived view.
    pub fn lookup(&self, slot: usize) -> BackendPair {
        self.slots.load().entries[slot].clone()
    }

    /// The live hosts in a slot's pair, master first (0, 1, or 2 entries).
    pub fn live_hosts(&self, slot: usize) -> Vec<String> {
        self.slots.load().entries[slot].live_hosts()
    }

    /// Selects the coordinating host for single-host writes: the live master
    /// if any, otherwise the live slave, each paired with its sibling so the
    /// backend can run its own sync.
    pub fn coord_pair(&self, slot: usize) -> Option<(String, String)> {
        let pair = &self.slots.load().entries[slot];
        if pair.master.alive {
            Some((pair.master.host.clone(), pair.slave.host.clone()))
        } else if pair.slave.alive {
            Some((pair.slave.host.clone(), pair.master.host.clone()))
        } else {
            None
        }
    }

    /// One live host per peer group for scatter statistics, preferring the
    /// master, deduplicated. Returns an empty list when any group has no
    /// live member, since a partial sum would be silently wrong.
    pub fn stat_targets(&self) -> Vec<String> {
        let groups = self.groups.read();
        let mut targets: Vec<String> = Vec::with_capacity(groups.len());
        for group in groups.iter() {
            let pair = &group.backends;
            let host = if pair.master.alive {
                &pair.master.host
            } else if pair.slave.alive {
                &pair.slave.host
            } else {
                return Vec::new();
            };
            if !targets.iter().any(|t| t == host) {
                targets.push(host.clone());
            }
        }
        targets
    }

    /// Flips one alive bit in the authoritative view. Returns whether the bit
    /// actually changed; the caller must trigger [`Self::rebuild_derived`]
    /// once per batch of changes.
    pub fn set_alive(&self, group_index: usize, role: Role, alive: bool) -> bool {
        let mut groups = self.groups.write();
        let Some(group) = groups.get_mut(group_index) else {
            return false;
        };
        let degenerate = group.backends.is_degenerate();
        let slot = group.backends.get_mut(role);
        if slot.alive == alive {
            return false;
        }
        slot.alive = alive;
        if degenerate {
            // Single replica: both flags collapse.
            group.backends.master.alive = alive;
            group.backends.slave.alive = alive;
        }
        true
    }

    /// Recomputes the slot table from the authoritative view and publishes it
    /// atomically. Must be called after any `set_alive` that returned true.
    pub fn rebuild_derived(&self) {
        let table = {
            let groups = self.groups.read();
            SlotTable::build(&groups)
        };
        self.slots.store(Arc::new(table));
        self.rebuild_tx.send_modify(|generation| *generation += 1);
    }

    /// Replaces the authoritative view from a JSON file. On any parse or
    /// validation error the prior view is retained untouched.
    pub fn reload(&self, path: &Path) -> Result<(), HustGateError> {
        let raw = std::fs::read(path)?;
        let mut groups: Vec<PeerGroup> = parse_peer_groups(&raw)?;
        Self::validate(&groups)?;
        for group in &mut groups {
            normalize_degenerate(&mut group.backends);
        }
        *self.groups.write() = groups;
        self.rebuild_derived();
        info!("Partition table reloaded from {}", path.display());
        Ok(())
    }

    /// Clones the authoritative view for out-of-band consumers (health
    /// checker probes). Dispatch paths never use this.
    pub fn snapshot_groups(&self) -> Vec<PeerGroup> {
        self.groups.read().clone()
    }

    /// Whether the host is currently an alive member of any group.
    pub fn is_alive(&self, host: &str) -> bool {
        self.groups.read().iter().any(|group| {
            let pair = &group.backends;
            (pair.master.alive && pair.master.host == host)
                || (pair.slave.alive && pair.slave.host == host)
        })
    }

    /// Subscribes to derived-view rebuilds. The value is a generation counter.
    pub fn subscribe_rebuilds(&self) -> watch::Receiver<u64> {
        self.rebuild_tx.subscribe()
    }
}

fn normalize_degenerate(pair: &mut BackendPair) {
    if pair.master.host == pair.slave.host {
        pair.slave.alive = pair.master.alive;
    }
}

/// Accepts either a bare peer-group array or a full `ha.json` document with a
/// `peers` field, so the same file handed to `-conf` can be reloaded in place.
fn parse_peer_groups(raw: &[u8]) -> Result<Vec<PeerGroup>, HustGateError> {
    let value: serde_json::Value = serde_json::from_slice(raw)
        .map_err(|e| HustGateError::Partition(format!("invalid peer table JSON: {e}")))?;
    let peers = match &value {
        serde_json::Value::Object(map) => map
            .get("peers")
            .cloned()
            .ok_or_else(|| HustGateError::Partition("document has no peers field".into()))?,
        _ => value,
    };
    serde_json::from_value(peers)
        .map_err(|e| HustGateError::Partition(format!("invalid peer table JSON: {e}")))
}
