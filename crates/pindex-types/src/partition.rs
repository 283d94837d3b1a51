//! Per-partition sequence bookkeeping.
//!
//! Mutation ordering is only guaranteed within a partition, so every value
//! here is scoped to one partition id.

use serde::{Deserialize, Serialize};

/// Batch boundary announced by `OnSnapshotStart`.
///
/// The upstream source guarantees that the mutations with sequences in
/// `start..=end` form a consistent batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotRange {
    pub start: u64,
    pub end: u64,
}

impl SnapshotRange {
    pub fn new(start: u64, end: u64) -> Self {
        Self { start, end }
    }

    /// True if `seq` falls inside the batch.
    pub fn contains(&self, seq: u64) -> bool {
        seq >= self.start && seq <= self.end
    }

    /// True once `seq` completes the batch.
    pub fn is_complete_at(&self, seq: u64) -> bool {
        seq >= self.end
    }
}

/// Progress of one partition as observed by consistency waiters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PartitionProgress {
    /// Highest sequence whose effects are visible to queries
    pub seq: u64,
    /// Target of the most recent rollback, if any happened
    pub rollback_seq: Option<u64>,
    /// Number of rollbacks applied so far
    pub rollbacks: u64,
}
