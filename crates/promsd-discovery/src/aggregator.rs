//! Snapshot aggregation.
//!
//! The aggregator is the only owner of the list being built, so the query
//! tasks never share mutable state; they only hold senders.

use promsd_core::{Snapshot, TargetGroup};
use tokio::sync::mpsc;
use tracing::trace;

/// Capacity of the channel between query tasks and the aggregator
pub const FANOUT_CHANNEL_CAPACITY: usize = 256;

/// Collects every group sent on `receiver` until all senders are gone.
///
/// Groups keep their arrival order; sorting happens when the snapshot is
/// serialized. Always yields exactly one snapshot, empty if nothing arrived.
pub async fn collect(mut receiver: mpsc::Receiver<TargetGroup>) -> Snapshot {
    let mut snapshot = Snapshot::new();
    while let Some(group) = receiver.recv().await {
        trace!(target = ?group.first_target(), "Collected target group");
        snapshot.push(group);
    }
    snapshot
}
