//! Read-pressure replication policy.
//!
//! Every shared lock on a file counts as one read request. Once per
//! `REPLICA_GRANULARITY` requests the coarse counter is refreshed, and the
//! desired replica count is `min(floor(ALPHA * coarse), REPLICA_UPPER_BOUND)`.
//! Targets are chosen in registry order among servers not already holding
//! (or receiving) a copy, and are reserved as pending before any copy RPC is
//! issued, so overlapping readers cannot schedule the same copy twice.

use crate::tree::{FileMeta, StorageRef};

pub const ALPHA: f64 = 0.2;
pub const REPLICA_GRANULARITY: u64 = 20;
pub const REPLICA_UPPER_BOUND: usize = 3;

pub fn desired_replicas(coarse: u64) -> usize {
    ((ALPHA * coarse as f64) as usize).min(REPLICA_UPPER_BOUND)
}

/// Counts one read request, refreshing the coarse counter at granularity
/// boundaries.
pub fn note_read(meta: &mut FileMeta) {
    meta.requests += 1;
    if meta.requests % REPLICA_GRANULARITY == 0 {
        meta.coarse = meta.requests;
    }
}

/// Chooses the servers that should receive a new replica and reserves them
/// in `meta.pending`. Returns the chosen targets, possibly none.
pub fn plan_replication(meta: &mut FileMeta, registry: &[StorageRef]) -> Vec<StorageRef> {
    let held = meta.replicas.len() + meta.pending.len();
    let desired = desired_replicas(meta.coarse);

    let mut targets = Vec::new();
    for server in registry {
        if held + targets.len() >= desired {
            break;
        }
        if meta.replicas.contains(server) || meta.pending.contains(server) {
            continue;
        }
        targets.push(server.clone());
    }

    meta.pending.extend(targets.iter().cloned());
    targets
}
