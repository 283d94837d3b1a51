//! Per-partition sequence tracking shared by the real backends.
//!
//! Each partition keeps two numbers: the highest sequence *accepted* (used
//! to reject out-of-order mutations) and the highest sequence *visible* to
//! queries. Backends whose writes become visible immediately publish as they
//! accept; backends with commit-driven visibility publish after the commit.
//! Visible never runs ahead of accepted.
//!
//! Consistency waiters subscribe to a `watch` channel per partition, so a
//! waiter on one partition never holds anything another partition's
//! ingestion needs.

use std::sync::atomic::{AtomicBool, Ordering};

use dashmap::mapref::one::RefMut;
use dashmap::DashMap;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use pindex_types::{
    ConsistencyLevel, ConsistencyStatus, PIndexError, PartitionProgress, Result, SnapshotRange,
};

struct PartitionSlot {
    progress: watch::Sender<PartitionProgress>,
    accepted: u64,
    snapshot: Option<SnapshotRange>,
}

impl PartitionSlot {
    fn new(seq: u64) -> Self {
        let (progress, _) = watch::channel(PartitionProgress {
            seq,
            ..PartitionProgress::default()
        });
        Self {
            progress,
            accepted: seq,
            snapshot: None,
        }
    }
}

/// Sequence state for every partition of one pindex.
pub struct SeqTracker {
    name: String,
    partitions: DashMap<String, PartitionSlot>,
    closed: AtomicBool,
}

impl SeqTracker {
    /// Create a tracker; `name` only appears in errors and logs.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            partitions: DashMap::new(),
            closed: AtomicBool::new(false),
        }
    }

    fn slot(&self, partition: &str) -> RefMut<'_, String, PartitionSlot> {
        self.partitions
            .entry(partition.to_string())
            .or_insert_with(|| PartitionSlot::new(0))
    }

    fn ensure_open(&self) -> Result<()> {
        if self.is_closed() {
            return Err(PIndexError::Closed(self.name.clone()));
        }
        Ok(())
    }

    /// Seed a partition from a recovered checkpoint.
    pub fn seed(&self, partition: &str, seq: u64) {
        self.partitions
            .insert(partition.to_string(), PartitionSlot::new(seq));
    }

    /// Record a snapshot boundary for the partition.
    pub fn on_snapshot(&self, partition: &str, range: SnapshotRange) -> Result<()> {
        self.ensure_open()?;
        let mut slot = self.slot(partition);
        slot.snapshot = Some(range);
        debug!(partition, start = range.start, end = range.end, "Snapshot start");
        Ok(())
    }

    /// Current snapshot of the partition, if one was asserted.
    pub fn snapshot(&self, partition: &str) -> Option<SnapshotRange> {
        self.partitions.get(partition).and_then(|s| s.snapshot)
    }

    /// Reject `seq` if it is older than what the partition already accepted.
    pub fn check_order(&self, partition: &str, seq: u64) -> Result<()> {
        self.ensure_open()?;
        match self.partitions.get(partition) {
            Some(slot) if seq < slot.accepted => Err(PIndexError::OutOfOrder {
                partition: partition.to_string(),
                seq,
                last: slot.accepted,
            }),
            _ => Ok(()),
        }
    }

    /// Record `seq` as applied but not yet visible.
    pub fn accept(&self, partition: &str, seq: u64) -> Result<()> {
        self.ensure_open()?;
        let mut slot = self.slot(partition);
        if seq < slot.accepted {
            return Err(PIndexError::OutOfOrder {
                partition: partition.to_string(),
                seq,
                last: slot.accepted,
            });
        }
        slot.accepted = seq;
        Ok(())
    }

    /// Make everything up to `seq` visible and wake waiters.
    pub fn publish(&self, partition: &str, seq: u64) {
        let slot = self.slot(partition);
        let seq = seq.min(slot.accepted);
        slot.progress.send_if_modified(|p| {
            if seq > p.seq {
                p.seq = seq;
                true
            } else {
                false
            }
        });
    }

    /// Accept and publish in one step.
    pub fn advance(&self, partition: &str, seq: u64) -> Result<()> {
        self.accept(partition, seq)?;
        self.publish(partition, seq);
        Ok(())
    }

    /// Record a rollback: clamp both sequences to `seq` and wake waiters so
    /// the ones that can no longer be satisfied return.
    ///
    /// A rollback to or past the accepted sequence undoes nothing and is
    /// ignored; returns whether anything was rolled back.
    pub fn rolled_back(&self, partition: &str, seq: u64) -> bool {
        let mut slot = self.slot(partition);
        if seq >= slot.accepted {
            return false;
        }
        slot.accepted = seq;
        slot.snapshot = None;
        slot.progress.send_modify(|p| {
            p.seq = p.seq.min(seq);
            p.rollback_seq = Some(seq);
            p.rollbacks += 1;
        });
        debug!(partition, seq, "Partition rolled back");
        true
    }

    /// Highest accepted sequence (0 for an unknown partition).
    pub fn applied(&self, partition: &str) -> u64 {
        self.partitions.get(partition).map_or(0, |s| s.accepted)
    }

    /// Highest visible sequence (0 for an unknown partition).
    pub fn visible(&self, partition: &str) -> u64 {
        self.partitions
            .get(partition)
            .map_or(0, |s| s.progress.borrow().seq)
    }

    /// Partitions with accepted-but-unpublished mutations, with the
    /// sequence to publish once they become visible.
    pub fn pending(&self) -> Vec<(String, u64)> {
        self.partitions
            .iter()
            .filter(|e| e.accepted > e.progress.borrow().seq)
            .map(|e| (e.key().clone(), e.accepted))
            .collect()
    }

    /// Every partition seen so far.
    pub fn partitions(&self) -> Vec<String> {
        let mut names: Vec<String> = self.partitions.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    /// Fail every current and future waiter with `Closed`.
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.partitions.clear();
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Block until `target` is visible on the partition.
    ///
    /// Returns promptly with `ConsistencyWaitCancelled` when `cancel` fires
    /// and with `ConsistencyWaitRolledBack` when a rollback below `target`
    /// happens while waiting. A target of 0 is always satisfied.
    pub async fn wait(
        &self,
        partition: &str,
        level: ConsistencyLevel,
        target: u64,
        cancel: &CancellationToken,
    ) -> Result<ConsistencyStatus> {
        self.ensure_open()?;
        let mut rx = self.slot(partition).progress.subscribe();
        // close() may have cleared the map between the check and subscribe
        self.ensure_open()?;

        let start = *rx.borrow_and_update();
        if level == ConsistencyLevel::None || target == 0 || start.seq >= target {
            return Ok(ConsistencyStatus {
                cur_seq: start.seq,
                rollback_tried_seq: 0,
            });
        }

        debug!(partition, target, cur_seq = start.seq, "Waiting for consistency");

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    return Err(PIndexError::ConsistencyWaitCancelled {
                        partition: partition.to_string(),
                        target,
                        cur_seq: rx.borrow().seq,
                    });
                }
                changed = rx.changed() => {
                    if changed.is_err() {
                        return Err(PIndexError::Closed(self.name.clone()));
                    }
                    let progress = *rx.borrow_and_update();
                    let rolled_back = progress.rollbacks > start.rollbacks;
                    let rollback_tried_seq = if rolled_back {
                        progress.rollback_seq.unwrap_or(0)
                    } else {
                        0
                    };

                    if progress.seq >= target {
                        return Ok(ConsistencyStatus {
                            cur_seq: progress.seq,
                            rollback_tried_seq,
                        });
                    }
                    if rolled_back && rollback_tried_seq < target {
                        return Err(PIndexError::ConsistencyWaitRolledBack {
                            partition: partition.to_string(),
                            target,
                            cur_seq: progress.seq,
                            rollback_seq: rollback_tried_seq,
                        });
                    }
                }
            }
        }
    }
}

impl std::fmt::Debug for SeqTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SeqTracker")
            .field("name", &self.name)
            .field("partitions", &self.partitions.len())
            .field("closed", &self.is_closed())
            .finish()
    }
}
