//! Change detection between consecutive snapshots.
//!
//! Each snapshot is sorted and serialized, and the bytes are hashed. A
//! snapshot is only written out when its fingerprint differs from the last
//! one that was written successfully.

use crate::error::Result;
use crate::output::SnapshotSink;
use promsd_core::Snapshot;
use std::collections::hash_map::DefaultHasher;
use std::hash::Hasher;
use tokio::sync::mpsc;
use tracing::{debug, info};

/// 64-bit fingerprint of a serialized snapshot.
pub fn fingerprint(payload: &[u8]) -> u64 {
    let mut hasher = DefaultHasher::new();
    hasher.write(payload);
    hasher.finish()
}

/// Result of evaluating one snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeDecision {
    /// Same content as the last emission
    Unchanged,
    /// New content; write `payload`, then commit `fingerprint`
    Changed { payload: Vec<u8>, fingerprint: u64 },
}

/// Counters returned by [`ChangeFilter::run`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EmitStats {
    pub received: u64,
    pub emitted: u64,
}

impl EmitStats {
    pub fn suppressed(&self) -> u64 {
        self.received - self.emitted
    }
}

#[derive(Debug, Default)]
pub struct ChangeFilter {
    last_fingerprint: Option<u64>,
}

impl ChangeFilter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fingerprint of the last snapshot written, `None` before the first.
    pub fn last_fingerprint(&self) -> Option<u64> {
        self.last_fingerprint
    }

    /// Sorts and serializes `snapshot` and compares it to the last
    /// emission. Does not update any state.
    pub fn evaluate(&self, mut snapshot: Snapshot) -> Result<ChangeDecision> {
        snapshot.sort();
        let payload = snapshot.to_json()?;
        let fingerprint = fingerprint(&payload);

        if self.last_fingerprint == Some(fingerprint) {
            Ok(ChangeDecision::Unchanged)
        } else {
            Ok(ChangeDecision::Changed {
                payload,
                fingerprint,
            })
        }
    }

    /// Records a fingerprint as emitted. Call only after the payload has
    /// been written.
    pub fn commit(&mut self, fingerprint: u64) {
        self.last_fingerprint = Some(fingerprint);
    }

    /// Writes every changed snapshot from `snapshots` to `sink`.
    ///
    /// Returns when the channel closes, or with the first write error.
    pub async fn run<S: SnapshotSink + ?Sized>(
        &mut self,
        mut snapshots: mpsc::Receiver<Snapshot>,
        sink: &mut S,
    ) -> Result<EmitStats> {
        let mut stats = EmitStats::default();

        while let Some(snapshot) = snapshots.recv().await {
            stats.received += 1;
            let groups = snapshot.len();

            match self.evaluate(snapshot)? {
                ChangeDecision::Unchanged => {
                    debug!(groups, "Targets unchanged");
                }
                ChangeDecision::Changed {
                    payload,
                    fingerprint,
                } => {
                    sink.write(&payload)?;
                    self.commit(fingerprint);
                    stats.emitted += 1;
                    info!(groups, fingerprint = format_args!("{:016x}", fingerprint), "Targets updated");
                }
            }
        }

        debug!(
            received = stats.received,
            emitted = stats.emitted,
            "Snapshot stream ended"
        );
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DiscoveryError;
    use promsd_core::TargetGroup;

    #[derive(Default)]
    struct MemorySink {
        writes: Vec<Vec<u8>>,
        fail: bool,
    }

    impl SnapshotSink for MemorySink {
        fn write(&mut self, payload: &[u8]) -> Result<()> {
            if self.fail {
                return Err(DiscoveryError::Output {
                    destination: "memory".to_string(),
                    source: std::io::Error::new(std::io::ErrorKind::Other, "disk full"),
                });
            }
            self.writes.push(payload.to_vec());
            Ok(())
        }
    }

    fn snapshot(targets: &[&str]) -> Snapshot {
        targets
            .iter()
            .map(|t| TargetGroup::new(*t).with_label("instance", *t))
            .collect()
    }

    #[test]
    fn test_first_snapshot_is_changed() {
        let filter = ChangeFilter::new();
        assert_eq!(filter.last_fingerprint(), None);
        assert!(matches!(
            filter.evaluate(snapshot(&["a:1"])).unwrap(),
            ChangeDecision::Changed { .. }
        ));
    }

    #[test]
    fn test_empty_snapshot_is_emitted_once() {
        let mut filter = ChangeFilter::new();
        let ChangeDecision::Changed {
            payload,
            fingerprint,
        } = filter.evaluate(Snapshot::new()).unwrap()
        else {
            panic!("first empty snapshot must be emitted");
        };
        assert_eq!(payload, b"[]");

        filter.commit(fingerprint);
        assert_eq!(
            filter.evaluate(Snapshot::new()).unwrap(),
            ChangeDecision::Unchanged
        );
    }

    #[test]
    fn test_order_does_not_matter() {
        let mut filter = ChangeFilter::new();
        let ChangeDecision::Changed { fingerprint, .. } =
            filter.evaluate(snapshot(&["b:1", "a:1", "c:1"])).unwrap()
        else {
            panic!("expected change");
        };
        filter.commit(fingerprint);

        assert_eq!(
            filter.evaluate(snapshot(&["c:1", "a:1", "b:1"])).unwrap(),
            ChangeDecision::Unchanged
        );
    }

    #[test]
    fn test_evaluate_leaves_state_alone() {
        let filter = ChangeFilter::new();
        filter.evaluate(snapshot(&["a:1"])).unwrap();
        assert_eq!(filter.last_fingerprint(), None);
    }

    #[test]
    fn test_fingerprint_is_stable() {
        assert_eq!(fingerprint(b"[]"), fingerprint(b"[]"));
        assert_ne!(fingerprint(b"[]"), fingerprint(b"[ ]"));
    }

    #[tokio::test]
    async fn test_run_suppresses_repeats() {
        let (tx, rx) = mpsc::channel(8);
        for s in [
            snapshot(&["a:1"]),
            snapshot(&["a:1"]),
            snapshot(&["a:1", "b:1"]),
            snapshot(&["b:1", "a:1"]),
            snapshot(&["a:1"]),
        ] {
            tx.send(s).await.unwrap();
        }
        drop(tx);

        let mut filter = ChangeFilter::new();
        let mut sink = MemorySink::default();
        let stats = filter.run(rx, &mut sink).await.unwrap();

        assert_eq!(stats.received, 5);
        assert_eq!(stats.emitted, 3);
        assert_eq!(stats.suppressed(), 2);
        assert_eq!(sink.writes.len(), 3);
        assert_eq!(sink.writes[0], sink.writes[2]);
        assert_eq!(filter.last_fingerprint(), Some(fingerprint(&sink.writes[2])));
    }

    #[tokio::test]
    async fn test_run_stops_on_write_error_without_commit() {
        let (tx, rx) = mpsc::channel(2);
        tx.send(snapshot(&["a:1"])).await.unwrap();
        tx.send(snapshot(&["b:1"])).await.unwrap();
        drop(tx);

        let mut filter = ChangeFilter::new();
        let mut sink = MemorySink {
            fail: true,
            ..Default::default()
        };
        let err = filter.run(rx, &mut sink).await.unwrap_err();

        assert!(matches!(err, DiscoveryError::Output { .. }));
        assert_eq!(filter.last_fingerprint(), None);
    }
}
