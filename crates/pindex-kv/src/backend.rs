//! Dest implementation over the kv store.
//!
//! Writes become visible as soon as their batch lands, so the tracker is
//! advanced right after each write. A per-partition mutex serializes
//! mutations with rollback and checkpointing on the same partition without
//! blocking other partitions. Scans for count and query run on the
//! blocking pool.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, RwLock};

use async_trait::async_trait;
use dashmap::DashMap;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use pindex_core::{Dest, PIndex, PIndexImpl, RestartNotifier, SeqTracker};
use pindex_types::{
    Checkpoint, ConsistencyLevel, ConsistencyStatus, PIndexError, Result, SnapshotRange,
};

use crate::error::KvError;
use crate::query::{KvLookup, KvQuery, KvRow};
use crate::store::KvStore;

pub struct KvDest {
    name: String,
    path: PathBuf,
    store: RwLock<Option<Arc<KvStore>>>,
    tracker: SeqTracker,
    locks: DashMap<String, Arc<Mutex<()>>>,
    restart: RestartNotifier,
}

impl KvDest {
    /// Wrap an open store, seeding sequence state from what it persisted.
    pub fn new(path: &Path, store: KvStore, restart: RestartNotifier) -> Result<Self> {
        let name = restart.pindex_name().to_string();
        let tracker = SeqTracker::new(name.clone());
        for (partition, state) in store.partition_states()? {
            tracker.seed(&partition, state.applied_seq);
        }

        Ok(Self {
            name,
            path: path.to_path_buf(),
            store: RwLock::new(Some(Arc::new(store))),
            tracker,
            locks: DashMap::new(),
            restart,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn tracker(&self) -> &SeqTracker {
        &self.tracker
    }

    fn partition_lock(&self, partition: &str) -> Arc<Mutex<()>> {
        self.locks
            .entry(partition.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Shared handle to the open store.
    fn store(&self) -> Result<Arc<KvStore>> {
        let guard = self
            .store
            .read()
            .map_err(|e| PIndexError::Storage(format!("kv store lock poisoned: {}", e)))?;
        guard
            .clone()
            .ok_or_else(|| PIndexError::Closed(self.name.clone()))
    }

    fn with_store<R>(&self, f: impl FnOnce(&KvStore) -> std::result::Result<R, KvError>) -> Result<R> {
        let store = self.store()?;
        f(&store).map_err(PIndexError::from)
    }

    /// Undecodable history leaves the partition unrecoverable in place.
    fn restart_on_corrupt<R>(&self, partition: &str, op: &str, result: Result<R>) -> Result<R> {
        if let Err(PIndexError::Corrupt(msg)) = &result {
            self.restart
                .notify(format!("{} of partition {} failed: {}", op, partition, msg));
        }
        result
    }

    fn mutate(&self, partition: &str, key: &[u8], seq: u64, value: Option<&[u8]>) -> Result<()> {
        let lock = self.partition_lock(partition);
        let _guard = lock
            .lock()
            .map_err(|e| PIndexError::Storage(format!("partition lock poisoned: {}", e)))?;

        self.tracker.check_order(partition, seq)?;
        let applied = self.with_store(|store| store.apply(partition, key, seq, value));
        self.restart_on_corrupt(partition, "mutation", applied)?;
        self.tracker.advance(partition, seq)?;

        debug!(partition, seq, delete = value.is_none(), "Applied mutation");
        Ok(())
    }
}

fn run_query(store: &KvStore, query: &KvQuery, cancel: &CancellationToken) -> Result<Vec<KvRow>> {
    match query.lookup()? {
        KvLookup::Get { partition, key } => {
            let value = store.get(&partition, key.as_bytes())?;
            Ok(value
                .map(|v| vec![KvRow::new(&partition, key.as_bytes(), &v)])
                .unwrap_or_default())
        }
        KvLookup::Scan {
            partition,
            prefix,
            limit,
        } => {
            let entries = store.scan(partition.as_deref(), prefix.as_bytes(), limit, cancel)?;
            Ok(entries.into_iter().map(KvRow::from).collect())
        }
    }
}

impl PIndexImpl for KvDest {
    fn close(&self) -> Result<()> {
        let mut guard = self
            .store
            .write()
            .map_err(|e| PIndexError::Storage(format!("kv store lock poisoned: {}", e)))?;
        let Some(store) = guard.take() else {
            return Ok(());
        };

        if let Err(e) = store.flush() {
            warn!(pindex = %self.name, error = %e, "Flush on close failed");
        }
        // scans still running hold the last references
        drop(store);
        self.tracker.close();

        info!(pindex = %self.name, path = ?self.path, "Closed kv store");
        Ok(())
    }
}

#[async_trait]
impl Dest for KvDest {
    fn on_snapshot_start(&self, partition: &str, start: u64, end: u64) -> Result<()> {
        self.tracker
            .on_snapshot(partition, SnapshotRange::new(start, end))
    }

    fn on_data_update(&self, partition: &str, key: &[u8], seq: u64, value: &[u8]) -> Result<()> {
        self.mutate(partition, key, seq, Some(value))
    }

    fn on_data_delete(&self, partition: &str, key: &[u8], seq: u64) -> Result<()> {
        self.mutate(partition, key, seq, None)
    }

    fn set_opaque(&self, partition: &str, value: &[u8]) -> Result<()> {
        let lock = self.partition_lock(partition);
        let _guard = lock
            .lock()
            .map_err(|e| PIndexError::Storage(format!("partition lock poisoned: {}", e)))?;

        let stored = self.with_store(|store| store.put_checkpoint(partition, value));
        let checkpoint = self.restart_on_corrupt(partition, "checkpoint", stored)?;
        debug!(partition, last_seq = checkpoint.last_seq, "Stored checkpoint");
        Ok(())
    }

    fn get_opaque(&self, partition: &str) -> Result<Checkpoint> {
        Ok(self
            .with_store(|store| store.checkpoint(partition))?
            .unwrap_or_default())
    }

    fn rollback(&self, partition: &str, rollback_seq: u64) -> Result<()> {
        let lock = self.partition_lock(partition);
        let _guard = lock
            .lock()
            .map_err(|e| PIndexError::Storage(format!("partition lock poisoned: {}", e)))?;

        let rolled = self.with_store(|store| store.rollback(partition, rollback_seq));
        let seq = self.restart_on_corrupt(partition, "rollback", rolled)?;
        // the tracker ignores a rollback that undid nothing, so waiters
        // above the applied seq keep waiting
        if !self.tracker.rolled_back(partition, seq) {
            debug!(partition, rollback_seq, applied = seq, "Rollback is a no-op");
        }
        Ok(())
    }

    async fn consistency_wait(
        &self,
        partition: &str,
        level: ConsistencyLevel,
        seq: u64,
        cancel: &CancellationToken,
    ) -> Result<ConsistencyStatus> {
        self.tracker.wait(partition, level, seq, cancel).await
    }

    async fn count(&self, _pindex: &PIndex, cancel: &CancellationToken) -> Result<u64> {
        if cancel.is_cancelled() {
            return Err(PIndexError::Cancelled);
        }
        let store = self.store()?;
        let cancel = cancel.clone();
        let count = tokio::task::spawn_blocking(move || store.count(&cancel))
            .await
            .map_err(|e| KvError::Task(e.to_string()))??;
        Ok(count)
    }

    async fn query(
        &self,
        _pindex: &PIndex,
        req: &[u8],
        res: &mut (dyn Write + Send),
        cancel: &CancellationToken,
    ) -> Result<()> {
        let query = KvQuery::parse(req)?;
        let store = self.store()?;
        let cancel = cancel.clone();
        let rows = tokio::task::spawn_blocking(move || run_query(&store, &query, &cancel))
            .await
            .map_err(|e| KvError::Task(e.to_string()))??;
        serde_json::to_writer(&mut *res, &rows)?;
        Ok(())
    }
}

impl std::fmt::Debug for KvDest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KvDest")
            .field("name", &self.name)
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}
