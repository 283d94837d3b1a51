//! The Dest contract every partition-index backend implements.
//!
//! A feed producer drives one logically serial stream of calls per
//! partition; query callers use `consistency_wait`, `count` and `query`
//! concurrently with ingestion. Calls for different partitions carry no
//! ordering relationship and may run in parallel.

use std::io::Write;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use pindex_types::{Checkpoint, ConsistencyLevel, ConsistencyStatus, Result};

use crate::pindex::PIndex;

/// Ingestion and consistency surface of a backend.
///
/// Sequence numbers are non-decreasing per partition. A backend that
/// detects a regression must reject it (or ignore it idempotently) and never
/// reorder.
#[async_trait]
pub trait Dest: Send + Sync {
    /// Announce that mutations up to `end` form a consistent batch starting
    /// at `start`. Arrives before any mutation of the batch.
    fn on_snapshot_start(&self, partition: &str, start: u64, end: u64) -> Result<()>;

    /// Apply an insert or update of `key`.
    fn on_data_update(&self, partition: &str, key: &[u8], seq: u64, value: &[u8]) -> Result<()>;

    /// Apply a delete of `key`.
    fn on_data_delete(&self, partition: &str, key: &[u8], seq: u64) -> Result<()>;

    /// Persist `value` together with the partition's last applied sequence.
    fn set_opaque(&self, partition: &str, value: &[u8]) -> Result<()>;

    /// Read back the checkpoint; a partition without one yields
    /// `Checkpoint::default()`.
    fn get_opaque(&self, partition: &str) -> Result<Checkpoint>;

    /// Discard every effect with sequence above `rollback_seq`. The sequence
    /// actually rolled back to is reported by the next `get_opaque`.
    fn rollback(&self, partition: &str, rollback_seq: u64) -> Result<()>;

    /// Wait until the partition has made `seq` visible, the target becomes
    /// unreachable, or `cancel` fires.
    async fn consistency_wait(
        &self,
        partition: &str,
        level: ConsistencyLevel,
        seq: u64,
        cancel: &CancellationToken,
    ) -> Result<ConsistencyStatus>;

    /// Count indexed entities.
    async fn count(&self, pindex: &PIndex, cancel: &CancellationToken) -> Result<u64>;

    /// Run `req` against currently visible state and stream results to `res`.
    async fn query(
        &self,
        pindex: &PIndex,
        req: &[u8],
        res: &mut (dyn Write + Send),
        cancel: &CancellationToken,
    ) -> Result<()>;
}

/// Lifecycle side of a backend instance.
pub trait PIndexImpl: Send + Sync {
    /// Release the backend's resources. Calling it again is a no-op.
    fn close(&self) -> Result<()>;
}
