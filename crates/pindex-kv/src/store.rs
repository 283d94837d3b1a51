//! RocksDB wrapper for the kv backend.
//!
//! Provides:
//! - Database open with column family setup
//! - Mutations written atomically with their undo record and applied seq
//! - Checkpoints stored with the applied seq they describe
//! - Exact rollback by replaying undo records in reverse
//!
//! Undo records are kept for the newest `history_retain_ops` mutations of
//! each partition. Older ones are dropped with a range delete, and the seq
//! of the newest dropped record becomes the partition's rollback horizon:
//! a rollback below it can no longer be exact and clears the partition.

use std::path::Path;

use rocksdb::{ColumnFamily, Direction, IteratorMode, Options, WriteBatch, DB};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use pindex_types::Checkpoint;

use crate::column_families::{
    build_cf_descriptors, ALL_CF_NAMES, CF_CHECKPOINTS, CF_DATA, CF_HISTORY, CF_SEQS,
};
use crate::error::KvError;
use crate::keys::{partition_prefix, DataKey, HistoryKey};

/// Keys scanned between cancellation checks.
const CANCEL_CHECK_INTERVAL: u64 = 1024;

const PARTITION_STATE_LEN: usize = 32;

/// Applied sequence and history bookkeeping of a partition.
///
/// Undo records live at ops `first_op..next_op`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PartitionState {
    pub applied_seq: u64,
    pub next_op: u64,
    pub first_op: u64,
    /// Seq of the newest dropped undo record; exact rollback needs a
    /// target at or above it
    pub horizon_seq: u64,
}

impl PartitionState {
    pub fn to_bytes(&self) -> [u8; PARTITION_STATE_LEN] {
        let mut buf = [0u8; PARTITION_STATE_LEN];
        buf[..8].copy_from_slice(&self.applied_seq.to_be_bytes());
        buf[8..16].copy_from_slice(&self.next_op.to_be_bytes());
        buf[16..24].copy_from_slice(&self.first_op.to_be_bytes());
        buf[24..].copy_from_slice(&self.horizon_seq.to_be_bytes());
        buf
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, KvError> {
        if bytes.len() != PARTITION_STATE_LEN {
            return Err(KvError::Serialization(format!(
                "partition state is {} bytes, expected {}",
                bytes.len(),
                PARTITION_STATE_LEN
            )));
        }
        let word = |i: usize| {
            let mut buf = [0u8; 8];
            buf.copy_from_slice(&bytes[i * 8..(i + 1) * 8]);
            u64::from_be_bytes(buf)
        };
        Ok(Self {
            applied_seq: word(0),
            next_op: word(1),
            first_op: word(2),
            horizon_seq: word(3),
        })
    }

    /// Number of undo records currently kept.
    pub fn retained_ops(&self) -> u64 {
        self.next_op - self.first_op
    }
}

/// Store behaviour fixed when the pindex is created.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreOptions {
    /// Keep undo records so rollback is exact
    pub history: bool,
    /// Undo records kept per partition
    pub history_retain_ops: u64,
}

/// What a mutation overwrote, so rollback can put it back.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UndoRecord {
    pub seq: u64,
    pub key: Vec<u8>,
    /// Value before the mutation; None if the key did not exist
    pub prev: Option<Vec<u8>>,
}

/// One entry returned by a scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataEntry {
    pub partition: String,
    pub key: Vec<u8>,
    pub value: Vec<u8>,
}

pub struct KvStore {
    db: DB,
    options: StoreOptions,
}

impl KvStore {
    /// Open the store at `path`. `create` allows an empty directory.
    pub fn open(path: &Path, options: StoreOptions, create: bool) -> Result<Self, KvError> {
        info!(
            path = ?path,
            history = options.history,
            retain_ops = options.history_retain_ops,
            create,
            "Opening kv store"
        );

        let mut db_opts = Options::default();
        db_opts.create_if_missing(create);
        db_opts.create_missing_column_families(true);

        let db = DB::open_cf_descriptors(&db_opts, path, build_cf_descriptors())?;
        Ok(Self { db, options })
    }

    fn cf(&self, name: &str) -> Result<&ColumnFamily, KvError> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| KvError::ColumnFamilyNotFound(name.to_string()))
    }

    /// Applied seq and history counter of a partition (zero if unseen).
    pub fn partition_state(&self, partition: &str) -> Result<PartitionState, KvError> {
        let seqs_cf = self.cf(CF_SEQS)?;
        match self.db.get_cf(seqs_cf, partition.as_bytes())? {
            Some(bytes) => PartitionState::from_bytes(&bytes),
            None => Ok(PartitionState::default()),
        }
    }

    /// Every partition with persisted state.
    pub fn partition_states(&self) -> Result<Vec<(String, PartitionState)>, KvError> {
        let seqs_cf = self.cf(CF_SEQS)?;
        let mut states = Vec::new();
        for item in self.db.iterator_cf(seqs_cf, IteratorMode::Start) {
            let (key, value) = item?;
            let partition = String::from_utf8(key.to_vec())
                .map_err(|e| KvError::Key(format!("Invalid UTF-8 partition: {}", e)))?;
            states.push((partition, PartitionState::from_bytes(&value)?));
        }
        Ok(states)
    }

    /// Write (`Some`) or delete (`None`) a key together with its undo
    /// record and the partition's new applied seq.
    pub fn apply(
        &self,
        partition: &str,
        key: &[u8],
        seq: u64,
        value: Option<&[u8]>,
    ) -> Result<(), KvError> {
        let data_cf = self.cf(CF_DATA)?;
        let seqs_cf = self.cf(CF_SEQS)?;

        let data_key = DataKey::new(partition, key).to_bytes()?;
        let mut state = self.partition_state(partition)?;
        let mut batch = WriteBatch::default();

        if self.options.history {
            // trim in chunks so the history stays under twice the retention
            if state.retained_ops() >= self.options.history_retain_ops.saturating_mul(2) {
                self.trim_history(partition, &mut state, &mut batch)?;
            }

            let history_cf = self.cf(CF_HISTORY)?;
            let record = UndoRecord {
                seq,
                key: key.to_vec(),
                prev: self.db.get_cf(data_cf, &data_key)?,
            };
            let history_key = HistoryKey::new(partition, state.next_op).to_bytes()?;
            batch.put_cf(history_cf, history_key, serde_json::to_vec(&record)?);
            state.next_op += 1;
        }

        match value {
            Some(value) => batch.put_cf(data_cf, &data_key, value),
            None => batch.delete_cf(data_cf, &data_key),
        }

        state.applied_seq = state.applied_seq.max(seq);
        batch.put_cf(seqs_cf, partition.as_bytes(), state.to_bytes());

        self.db.write(batch)?;
        Ok(())
    }

    pub fn get(&self, partition: &str, key: &[u8]) -> Result<Option<Vec<u8>>, KvError> {
        let data_cf = self.cf(CF_DATA)?;
        let data_key = DataKey::new(partition, key).to_bytes()?;
        Ok(self.db.get_cf(data_cf, data_key)?)
    }

    /// Entries whose key starts with `prefix`, in key order, optionally
    /// restricted to one partition.
    pub fn scan(
        &self,
        partition: Option<&str>,
        prefix: &[u8],
        limit: usize,
        cancel: &CancellationToken,
    ) -> Result<Vec<DataEntry>, KvError> {
        let data_cf = self.cf(CF_DATA)?;

        let start = match partition {
            Some(p) => DataKey::new(p, prefix).to_bytes()?,
            None => Vec::new(),
        };
        let iter = self
            .db
            .iterator_cf(data_cf, IteratorMode::From(&start, Direction::Forward));

        let mut entries = Vec::new();
        let mut scanned: u64 = 0;
        for item in iter {
            if entries.len() >= limit {
                break;
            }
            scanned += 1;
            if scanned % CANCEL_CHECK_INTERVAL == 0 && cancel.is_cancelled() {
                return Err(KvError::Cancelled);
            }

            let (raw_key, value) = item?;
            if partition.is_some() && !raw_key.starts_with(&start) {
                break;
            }
            let key = DataKey::from_bytes(&raw_key)?;
            if !key.key.starts_with(prefix) {
                continue;
            }
            entries.push(DataEntry {
                partition: key.partition,
                key: key.key,
                value: value.to_vec(),
            });
        }

        Ok(entries)
    }

    /// Number of live keys across all partitions.
    pub fn count(&self, cancel: &CancellationToken) -> Result<u64, KvError> {
        let data_cf = self.cf(CF_DATA)?;
        let mut count = 0u64;
        for item in self.db.iterator_cf(data_cf, IteratorMode::Start) {
            item?;
            count += 1;
            if count % CANCEL_CHECK_INTERVAL == 0 && cancel.is_cancelled() {
                return Err(KvError::Cancelled);
            }
        }
        Ok(count)
    }

    /// Drop undo records older than the newest `history_retain_ops` and
    /// move the rollback horizon up to the newest one dropped.
    fn trim_history(
        &self,
        partition: &str,
        state: &mut PartitionState,
        batch: &mut WriteBatch,
    ) -> Result<u64, KvError> {
        let cutoff = state.next_op.saturating_sub(self.options.history_retain_ops);
        if cutoff <= state.first_op {
            return Ok(0);
        }

        let history_cf = self.cf(CF_HISTORY)?;
        let newest_key = HistoryKey::new(partition, cutoff - 1).to_bytes()?;
        let newest: UndoRecord = match self.db.get_cf(history_cf, &newest_key)? {
            Some(bytes) => serde_json::from_slice(&bytes).map_err(|e| {
                KvError::CorruptHistory(format!("partition {}: {}", partition, e))
            })?,
            None => {
                return Err(KvError::CorruptHistory(format!(
                    "partition {}: missing undo record {}",
                    partition,
                    cutoff - 1
                )))
            }
        };

        let from = HistoryKey::new(partition, state.first_op).to_bytes()?;
        let to = HistoryKey::new(partition, cutoff).to_bytes()?;
        batch.delete_range_cf(history_cf, from, to);

        let dropped = cutoff - state.first_op;
        state.first_op = cutoff;
        state.horizon_seq = state.horizon_seq.max(newest.seq);
        debug!(partition, dropped, horizon = state.horizon_seq, "Trimmed history");
        Ok(dropped)
    }

    /// Store `opaque` with the partition's current applied seq, trimming
    /// undo records beyond the retention.
    pub fn put_checkpoint(&self, partition: &str, opaque: &[u8]) -> Result<Checkpoint, KvError> {
        let cp_cf = self.cf(CF_CHECKPOINTS)?;
        let seqs_cf = self.cf(CF_SEQS)?;
        let mut state = self.partition_state(partition)?;
        let checkpoint = Checkpoint::new(opaque, state.applied_seq);

        let mut batch = WriteBatch::default();
        batch.put_cf(cp_cf, partition.as_bytes(), serde_json::to_vec(&checkpoint)?);
        if self.options.history && self.trim_history(partition, &mut state, &mut batch)? > 0 {
            batch.put_cf(seqs_cf, partition.as_bytes(), state.to_bytes());
        }
        self.db.write(batch)?;
        Ok(checkpoint)
    }

    pub fn checkpoint(&self, partition: &str) -> Result<Option<Checkpoint>, KvError> {
        let cp_cf = self.cf(CF_CHECKPOINTS)?;
        match self.db.get_cf(cp_cf, partition.as_bytes())? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Undo every mutation of `partition` with a seq above `seq`.
    ///
    /// With history disabled, or with `seq` below the rollback horizon, the
    /// partition is cleared instead and the returned seq is 0. Returns the
    /// partition's applied seq afterwards.
    pub fn rollback(&self, partition: &str, seq: u64) -> Result<u64, KvError> {
        let data_cf = self.cf(CF_DATA)?;
        let history_cf = self.cf(CF_HISTORY)?;
        let seqs_cf = self.cf(CF_SEQS)?;
        let cp_cf = self.cf(CF_CHECKPOINTS)?;

        let mut state = self.partition_state(partition)?;
        if seq >= state.applied_seq {
            debug!(partition, seq, applied = state.applied_seq, "Rollback is a no-op");
            return Ok(state.applied_seq);
        }

        let mut batch = WriteBatch::default();
        let new_seq = if self.options.history && seq >= state.horizon_seq {
            let prefix = partition_prefix(partition)?;
            let end = HistoryKey::partition_end(partition)?;
            let iter = self
                .db
                .iterator_cf(history_cf, IteratorMode::From(&end, Direction::Reverse));

            let mut undone = 0;
            let mut lowest_op = None;
            for item in iter {
                let (history_key, value) = item?;
                if !history_key.starts_with(&prefix) {
                    break;
                }
                let record: UndoRecord = serde_json::from_slice(&value).map_err(|e| {
                    KvError::CorruptHistory(format!("partition {}: {}", partition, e))
                })?;
                if record.seq <= seq {
                    break;
                }

                let data_key = DataKey::new(partition, record.key).to_bytes()?;
                match record.prev {
                    Some(prev) => batch.put_cf(data_cf, &data_key, prev),
                    None => batch.delete_cf(data_cf, &data_key),
                }
                batch.delete_cf(history_cf, &history_key);
                lowest_op = Some(HistoryKey::from_bytes(&history_key)?.op);
                undone += 1;
            }
            // undone records are the newest ones, so their slots are reused
            if let Some(op) = lowest_op {
                state.next_op = op;
            }
            debug!(partition, seq, undone, "Undoing mutations");
            seq
        } else {
            let prefix = partition_prefix(partition)?;
            let iter = self
                .db
                .iterator_cf(data_cf, IteratorMode::From(&prefix, Direction::Forward));
            for item in iter {
                let (key, _) = item?;
                if !key.starts_with(&prefix) {
                    break;
                }
                batch.delete_cf(data_cf, &key);
            }
            if self.options.history {
                warn!(
                    partition,
                    seq,
                    horizon = state.horizon_seq,
                    "Rollback target below retained history, clearing partition"
                );
                let from = HistoryKey::new(partition, state.first_op).to_bytes()?;
                let to = HistoryKey::new(partition, state.next_op).to_bytes()?;
                batch.delete_range_cf(history_cf, from, to);
                state.first_op = state.next_op;
                state.horizon_seq = 0;
            }
            0
        };

        state.applied_seq = new_seq;
        batch.put_cf(seqs_cf, partition.as_bytes(), state.to_bytes());

        if let Some(mut checkpoint) = self.checkpoint(partition)? {
            checkpoint.clamp_to(new_seq);
            batch.put_cf(cp_cf, partition.as_bytes(), serde_json::to_vec(&checkpoint)?);
        }

        self.db.write(batch)?;
        info!(partition, seq = new_seq, "Rolled back partition");
        Ok(new_seq)
    }

    /// Flush all column families to disk
    pub fn flush(&self) -> Result<(), KvError> {
        for cf_name in ALL_CF_NAMES {
            if let Some(cf) = self.db.cf_handle(cf_name) {
                self.db.flush_cf(cf)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn open(dir: &TempDir, history: bool) -> KvStore {
        open_retaining(dir, history, 1000)
    }

    fn open_retaining(dir: &TempDir, history: bool, history_retain_ops: u64) -> KvStore {
        let options = StoreOptions {
            history,
            history_retain_ops,
        };
        KvStore::open(dir.path(), options, true).unwrap()
    }

    fn history_len(store: &KvStore, partition: &str) -> usize {
        let history_cf = store.cf(CF_HISTORY).unwrap();
        let prefix = partition_prefix(partition).unwrap();
        store
            .db
            .prefix_iterator_cf(history_cf, &prefix)
            .map(|item| item.unwrap())
            .take_while(|(key, _)| key.starts_with(&prefix))
            .count()
    }

    #[test]
    fn test_apply_and_get() {
        let dir = TempDir::new().unwrap();
        let store = open(&dir, true);

        store.apply("0", b"a", 1, Some(b"one")).unwrap();
        store.apply("0", b"a", 2, Some(b"two")).unwrap();
        store.apply("1", b"a", 1, Some(b"other")).unwrap();

        assert_eq!(store.get("0", b"a").unwrap(), Some(b"two".to_vec()));
        assert_eq!(store.get("1", b"a").unwrap(), Some(b"other".to_vec()));
        assert_eq!(store.partition_state("0").unwrap().applied_seq, 2);
        assert_eq!(store.partition_state("0").unwrap().next_op, 2);

        store.apply("0", b"a", 3, None).unwrap();
        assert_eq!(store.get("0", b"a").unwrap(), None);
    }

    #[test]
    fn test_open_without_create_fails_on_empty_dir() {
        let dir = TempDir::new().unwrap();
        let options = StoreOptions {
            history: true,
            history_retain_ops: 10,
        };
        assert!(KvStore::open(&dir.path().join("missing"), options, false).is_err());
    }

    #[test]
    fn test_rollback_restores_previous_values() {
        let dir = TempDir::new().unwrap();
        let store = open(&dir, true);

        store.apply("0", b"a", 1, Some(b"a1")).unwrap();
        store.apply("0", b"b", 2, Some(b"b2")).unwrap();
        store.apply("0", b"a", 3, Some(b"a3")).unwrap();
        store.apply("0", b"b", 4, None).unwrap();
        store.apply("0", b"c", 5, Some(b"c5")).unwrap();

        assert_eq!(store.rollback("0", 2).unwrap(), 2);
        assert_eq!(store.get("0", b"a").unwrap(), Some(b"a1".to_vec()));
        assert_eq!(store.get("0", b"b").unwrap(), Some(b"b2".to_vec()));
        assert_eq!(store.get("0", b"c").unwrap(), None);
        assert_eq!(store.partition_state("0").unwrap().applied_seq, 2);
    }

    #[test]
    fn test_rollback_leaves_other_partitions() {
        let dir = TempDir::new().unwrap();
        let store = open(&dir, true);

        store.apply("0", b"a", 1, Some(b"x")).unwrap();
        store.apply("00", b"a", 5, Some(b"y")).unwrap();

        store.rollback("0", 0).unwrap();
        assert_eq!(store.get("0", b"a").unwrap(), None);
        assert_eq!(store.get("00", b"a").unwrap(), Some(b"y".to_vec()));
    }

    #[test]
    fn test_rollback_above_applied_is_noop() {
        let dir = TempDir::new().unwrap();
        let store = open(&dir, true);
        store.apply("0", b"a", 3, Some(b"x")).unwrap();
        assert_eq!(store.rollback("0", 10).unwrap(), 3);
        assert_eq!(store.get("0", b"a").unwrap(), Some(b"x".to_vec()));
    }

    #[test]
    fn test_rollback_without_history_clears_partition() {
        let dir = TempDir::new().unwrap();
        let store = open(&dir, false);

        store.apply("0", b"a", 1, Some(b"x")).unwrap();
        store.apply("0", b"b", 2, Some(b"y")).unwrap();
        store.apply("1", b"a", 1, Some(b"z")).unwrap();

        assert_eq!(store.rollback("0", 1).unwrap(), 0);
        assert_eq!(store.get("0", b"a").unwrap(), None);
        assert_eq!(store.get("0", b"b").unwrap(), None);
        assert_eq!(store.get("1", b"a").unwrap(), Some(b"z".to_vec()));
    }

    #[test]
    fn test_rollback_clamps_checkpoint() {
        let dir = TempDir::new().unwrap();
        let store = open(&dir, true);

        store.apply("0", b"a", 10, Some(b"x")).unwrap();
        let cp = store.put_checkpoint("0", b"cursor").unwrap();
        assert_eq!(cp.last_seq, 10);

        store.rollback("0", 4).unwrap();
        let cp = store.checkpoint("0").unwrap().unwrap();
        assert_eq!(cp.last_seq, 4);
        assert_eq!(cp.opaque, b"cursor".to_vec());
    }

    #[test]
    fn test_corrupt_history_record() {
        let dir = TempDir::new().unwrap();
        let store = open(&dir, true);
        store.apply("0", b"a", 1, Some(b"x")).unwrap();

        let history_cf = store.cf(CF_HISTORY).unwrap();
        let key = HistoryKey::new("0", 0).to_bytes().unwrap();
        store.db.put_cf(history_cf, key, b"not json").unwrap();

        let err = store.rollback("0", 0).unwrap_err();
        assert!(matches!(err, KvError::CorruptHistory(_)));
        // nothing was undone
        assert_eq!(store.get("0", b"a").unwrap(), Some(b"x".to_vec()));
    }

    #[test]
    fn test_scan_by_partition_and_prefix() {
        let dir = TempDir::new().unwrap();
        let store = open(&dir, true);
        let cancel = CancellationToken::new();

        store.apply("0", b"beer:1", 1, Some(b"ipa")).unwrap();
        store.apply("0", b"beer:2", 2, Some(b"stout")).unwrap();
        store.apply("0", b"wine:1", 3, Some(b"red")).unwrap();
        store.apply("1", b"beer:3", 1, Some(b"lager")).unwrap();

        let in_partition = store.scan(Some("0"), b"beer:", 10, &cancel).unwrap();
        assert_eq!(in_partition.len(), 2);
        assert_eq!(in_partition[1].value, b"stout".to_vec());

        let everywhere = store.scan(None, b"beer:", 10, &cancel).unwrap();
        assert_eq!(everywhere.len(), 3);

        let limited = store.scan(None, b"", 2, &cancel).unwrap();
        assert_eq!(limited.len(), 2);
    }

    #[test]
    fn test_count_and_states() {
        let dir = TempDir::new().unwrap();
        let store = open(&dir, true);
        let cancel = CancellationToken::new();

        store.apply("0", b"a", 1, Some(b"x")).unwrap();
        store.apply("1", b"b", 7, Some(b"y")).unwrap();
        store.apply("1", b"b", 8, None).unwrap();

        assert_eq!(store.count(&cancel).unwrap(), 1);
        let states = store.partition_states().unwrap();
        assert_eq!(states.len(), 2);
        assert_eq!(states[1].0, "1");
        assert_eq!(states[1].1.applied_seq, 8);
    }

    #[test]
    fn test_partition_state_rejects_bad_length() {
        assert!(PartitionState::from_bytes(&[0; 3]).is_err());
        assert!(PartitionState::from_bytes(&[0; 16]).is_err());
    }

    #[test]
    fn test_checkpoint_trims_history_to_retention() {
        let dir = TempDir::new().unwrap();
        let store = open_retaining(&dir, true, 3);

        for seq in 1..=10u64 {
            store.apply("0", b"a", seq, Some(&seq.to_be_bytes())).unwrap();
        }
        store.apply("1", b"a", 1, Some(b"x")).unwrap();
        store.put_checkpoint("0", b"cp").unwrap();

        assert_eq!(history_len(&store, "0"), 3);
        assert_eq!(history_len(&store, "1"), 1);
        let state = store.partition_state("0").unwrap();
        assert_eq!(state.first_op, 7);
        assert_eq!(state.horizon_seq, 7);

        // rollback inside the retained window stays exact
        assert_eq!(store.rollback("0", 8).unwrap(), 8);
        assert_eq!(store.get("0", b"a").unwrap(), Some(8u64.to_be_bytes().to_vec()));
        assert_eq!(store.partition_state("0").unwrap().next_op, 8);
    }

    #[test]
    fn test_apply_keeps_history_bounded_without_checkpoints() {
        let dir = TempDir::new().unwrap();
        let store = open_retaining(&dir, true, 4);

        for seq in 1..=50u64 {
            store.apply("0", b"a", seq, Some(b"x")).unwrap();
        }
        assert!(history_len(&store, "0") <= 8);
        assert_eq!(
            history_len(&store, "0") as u64,
            store.partition_state("0").unwrap().retained_ops()
        );
    }

    #[test]
    fn test_rollback_below_horizon_clears_partition() {
        let dir = TempDir::new().unwrap();
        let store = open_retaining(&dir, true, 2);

        for seq in 1..=6u64 {
            store.apply("0", format!("k{}", seq).as_bytes(), seq, Some(b"x")).unwrap();
        }
        store.put_checkpoint("0", b"cursor").unwrap();
        assert_eq!(store.partition_state("0").unwrap().horizon_seq, 4);

        assert_eq!(store.rollback("0", 3).unwrap(), 0);
        assert_eq!(store.count(&CancellationToken::new()).unwrap(), 0);
        assert_eq!(history_len(&store, "0"), 0);
        assert_eq!(store.checkpoint("0").unwrap().unwrap().last_seq, 0);

        // the partition starts over with exact rollback available again
        store.apply("0", b"a", 1, Some(b"a1")).unwrap();
        store.apply("0", b"a", 2, Some(b"a2")).unwrap();
        assert_eq!(store.rollback("0", 1).unwrap(), 1);
        assert_eq!(store.get("0", b"a").unwrap(), Some(b"a1".to_vec()));
    }
}
