use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::ids::{Partition, StreamId};

/// Materialized state of a stream at a chosen revision.
///
/// Snapshots bound rehydration cost: a stream opened from a snapshot only
/// replays commits after the snapshot's revision. Later snapshots for the
/// same stream overwrite earlier ones via upsert.
///
/// Two snapshots compare equal when they identify the same
/// `(stream, revision)` point, regardless of payload.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Snapshot {
    /// The partition the snapshotted stream lives in.
    pub partition: Partition,
    /// The snapshotted stream.
    pub stream_id: StreamId,
    /// Revision of the last event folded into the payload. At least 1.
    pub stream_revision: u64,
    /// The materialized state, opaque to the store.
    pub payload: Value,
}

impl Snapshot {
    /// Create a snapshot record.
    pub fn new(
        partition: Partition,
        stream_id: impl Into<StreamId>,
        stream_revision: u64,
        payload: Value,
    ) -> Self {
        Self {
            partition,
            stream_id: stream_id.into(),
            stream_revision,
            payload,
        }
    }
}

impl PartialEq for Snapshot {
    fn eq(&self, other: &Self) -> bool {
        self.stream_id == other.stream_id && self.stream_revision == other.stream_revision
    }
}

impl Eq for Snapshot {}

impl Hash for Snapshot {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.stream_id.hash(state);
        self.stream_revision.hash(state);
    }
}

/// Per-`(partition, stream)` bookkeeping record driving snapshot selection.
///
/// Owned exclusively by the persistence layer and derived from the commit
/// log: it is created on a stream's first commit, advanced on every commit
/// and snapshot, and must always be reconstructible by replaying commits.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamHead {
    /// The partition the stream lives in.
    pub partition: Partition,
    /// The stream this record summarizes.
    pub stream_id: StreamId,
    /// Highest persisted stream revision.
    pub head_revision: u64,
    /// Revision of the most recent snapshot, or 0 if none exists.
    pub snapshot_revision: u64,
}

impl StreamHead {
    /// Number of events committed since the last snapshot.
    ///
    /// Derived rather than stored so the record can never disagree with
    /// itself; saturates at 0 if an out-of-order head update is observed.
    pub fn unsnapshotted(&self) -> u64 {
        self.head_revision.saturating_sub(self.snapshot_revision)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn snapshot_equality_is_by_stream_and_revision() {
        let a = Snapshot::new(Partition::default(), "s-1", 2, json!({"n": 1}));
        let b = Snapshot::new(Partition::default(), "s-1", 2, json!({"n": 999}));
        let c = Snapshot::new(Partition::default(), "s-1", 3, json!({"n": 1}));
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn unsnapshotted_is_head_minus_snapshot() {
        let head = StreamHead {
            partition: Partition::default(),
            stream_id: StreamId::new("s-1"),
            head_revision: 7,
            snapshot_revision: 4,
        };
        assert_eq!(head.unsnapshotted(), 3);
    }

    #[test]
    fn unsnapshotted_saturates() {
        // A stale head update may briefly leave head_revision behind.
        let head = StreamHead {
            partition: Partition::default(),
            stream_id: StreamId::new("s-1"),
            head_revision: 2,
            snapshot_revision: 5,
        };
        assert_eq!(head.unsnapshotted(), 0);
    }

    #[test]
    fn serde_roundtrip() {
        let snap = Snapshot::new(Partition::new("tenant-a"), "s-1", 5, json!([1, 2, 3]));
        let json = serde_json::to_string(&snap).unwrap();
        let parsed: Snapshot = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.payload, snap.payload);
        assert_eq!(parsed.partition, snap.partition);
    }
}
