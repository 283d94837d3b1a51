//! Dest implementation over a Tantivy index.
//!
//! Documents are not visible until a commit, so mutations are accepted on
//! the tracker when written and only published after the commit that
//! contains them. Checkpoints and applied sequences travel in the commit
//! payload, which makes them atomic with the documents.
//!
//! Adds and deletes share the writer, so partitions only serialize on the
//! commit itself. Each partition has its own mutex to keep its mutations,
//! checkpoints and rollbacks in order.

use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, RwLock};

use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tantivy::collector::{Count, TopDocs};
use tantivy::query::QueryParser;
use tantivy::schema::Value;
use tantivy::{Index, IndexReader, IndexWriter, ReloadPolicy, TantivyDocument};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use pindex_core::{Dest, PIndex, PIndexImpl, RestartNotifier, SeqTracker};
use pindex_types::{
    Checkpoint, ConsistencyLevel, ConsistencyStatus, PIndexError, Result, SnapshotRange,
};

use crate::document::{doc_term, mutation_to_doc, partition_term};
use crate::error::FullTextError;
use crate::query::{FullTextQuery, FullTextResult, Hit};
use crate::schema::FullTextSchema;

/// State persisted as the Tantivy commit payload.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitPayload {
    #[serde(default)]
    pub checkpoints: BTreeMap<String, Checkpoint>,
    /// Applied sequence per partition at commit time
    #[serde(default)]
    pub seqs: BTreeMap<String, u64>,
}

impl CommitPayload {
    /// Payload of the last commit, empty for a fresh index.
    pub fn load(index: &Index) -> std::result::Result<Self, FullTextError> {
        match index.load_metas()?.payload {
            Some(payload) if !payload.is_empty() => Ok(serde_json::from_str(&payload)?),
            _ => Ok(Self::default()),
        }
    }
}

/// Tunables fixed at construction.
#[derive(Debug, Clone, Copy)]
pub struct WriterOptions {
    pub writer_memory_mb: usize,
    pub batch_max_ops: usize,
}

pub struct FullTextDest {
    name: String,
    path: PathBuf,
    index: Index,
    schema: FullTextSchema,
    reader: IndexReader,
    query_parser: QueryParser,
    /// Shared for add/delete, exclusive for commit and close
    writer: RwLock<Option<IndexWriter>>,
    checkpoints: Mutex<BTreeMap<String, Checkpoint>>,
    locks: DashMap<String, Arc<Mutex<()>>>,
    pending_ops: AtomicUsize,
    commits: AtomicU64,
    tracker: SeqTracker,
    batch_max_ops: usize,
    restart: RestartNotifier,
    closed: AtomicBool,
}

impl FullTextDest {
    /// Attach to an open index, recovering state from the last commit.
    pub fn new(
        path: &Path,
        index: Index,
        options: WriterOptions,
        restart: RestartNotifier,
    ) -> std::result::Result<Self, FullTextError> {
        let schema = FullTextSchema::from_schema(index.schema())?;
        let payload = CommitPayload::load(&index)?;

        let writer: IndexWriter = index.writer(options.writer_memory_mb * 1024 * 1024)?;
        let reader: IndexReader = index
            .reader_builder()
            .reload_policy(ReloadPolicy::Manual)
            .try_into()?;
        let query_parser = QueryParser::for_index(&index, vec![schema.body]);

        let name = restart.pindex_name().to_string();
        let tracker = SeqTracker::new(name.clone());
        for (partition, seq) in &payload.seqs {
            tracker.seed(partition, *seq);
        }

        debug!(
            pindex = %name,
            partitions = payload.seqs.len(),
            memory_mb = options.writer_memory_mb,
            "Created index writer"
        );

        Ok(Self {
            name,
            path: path.to_path_buf(),
            index,
            schema,
            reader,
            query_parser,
            writer: RwLock::new(Some(writer)),
            checkpoints: Mutex::new(payload.checkpoints),
            locks: DashMap::new(),
            pending_ops: AtomicUsize::new(0),
            commits: AtomicU64::new(0),
            tracker,
            batch_max_ops: options.batch_max_ops,
            restart,
            closed: AtomicBool::new(false),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn index(&self) -> &Index {
        &self.index
    }

    pub fn tracker(&self) -> &SeqTracker {
        &self.tracker
    }

    /// Commits made since the index was opened.
    pub fn commit_count(&self) -> u64 {
        self.commits.load(Ordering::SeqCst)
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(PIndexError::Closed(self.name.clone()));
        }
        Ok(())
    }

    fn partition_lock(&self, partition: &str) -> Arc<Mutex<()>> {
        self.locks
            .entry(partition.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    fn lock_partition<'a>(&self, lock: &'a Mutex<()>) -> Result<MutexGuard<'a, ()>> {
        lock.lock()
            .map_err(|e| FullTextError::WriterLocked(format!("partition lock: {}", e)).into())
    }

    fn lock_checkpoints(&self) -> Result<MutexGuard<'_, BTreeMap<String, Checkpoint>>> {
        self.checkpoints
            .lock()
            .map_err(|e| FullTextError::WriterLocked(format!("checkpoints: {}", e)).into())
    }

    /// Run `f` with shared access to the writer.
    fn with_writer<R>(&self, f: impl FnOnce(&IndexWriter) -> Result<R>) -> Result<R> {
        let guard = self
            .writer
            .read()
            .map_err(|e| FullTextError::WriterLocked(e.to_string()))?;
        let writer = guard
            .as_ref()
            .ok_or_else(|| PIndexError::Closed(self.name.clone()))?;
        f(writer)
    }

    fn payload(&self) -> Result<CommitPayload> {
        let seqs = self
            .tracker
            .partitions()
            .into_iter()
            .map(|p| {
                let seq = self.tracker.applied(&p);
                (p, seq)
            })
            .collect();
        Ok(CommitPayload {
            checkpoints: self.lock_checkpoints()?.clone(),
            seqs,
        })
    }

    /// Commit everything written so far and publish it.
    fn commit(&self) -> Result<()> {
        let mut guard = self
            .writer
            .write()
            .map_err(|e| FullTextError::WriterLocked(e.to_string()))?;
        let writer = guard
            .as_mut()
            .ok_or_else(|| PIndexError::Closed(self.name.clone()))?;
        self.commit_locked(writer)
    }

    /// Commit with the writer held exclusively. No add or delete is in
    /// flight, so every accepted seq is covered by this commit. A failed
    /// commit leaves the writer in an unknown state, so the pindex asks
    /// for a rebuild.
    fn commit_locked(&self, writer: &mut IndexWriter) -> Result<()> {
        let payload = serde_json::to_string(&self.payload()?)?;

        let committed = (|| -> std::result::Result<u64, FullTextError> {
            let mut prepared = writer.prepare_commit()?;
            prepared.set_payload(&payload);
            let opstamp = prepared.commit()?;
            self.reader.reload()?;
            Ok(opstamp)
        })();

        match committed {
            Ok(opstamp) => {
                let ops = self.pending_ops.swap(0, Ordering::SeqCst);
                self.commits.fetch_add(1, Ordering::SeqCst);
                for (partition, seq) in self.tracker.pending() {
                    self.tracker.publish(&partition, seq);
                }
                debug!(pindex = %self.name, opstamp, ops, "Committed");
                Ok(())
            }
            Err(e) => {
                self.restart.notify(format!("commit failed: {}", e));
                Err(e.into())
            }
        }
    }

    fn should_commit(&self, partition: &str, seq: u64) -> bool {
        if self.pending_ops.load(Ordering::SeqCst) >= self.batch_max_ops {
            return true;
        }
        match self.tracker.snapshot(partition) {
            Some(snapshot) if snapshot.contains(seq) => snapshot.is_complete_at(seq),
            _ => true,
        }
    }

    fn mutate(&self, partition: &str, key: &[u8], seq: u64, value: Option<&[u8]>) -> Result<()> {
        self.ensure_open()?;
        let lock = self.partition_lock(partition);
        let _guard = self.lock_partition(&lock)?;

        self.tracker.check_order(partition, seq)?;
        let term = doc_term(&self.schema, partition, key)?;
        let doc = value
            .map(|value| mutation_to_doc(&self.schema, partition, key, seq, value))
            .transpose()?;

        // accept inside the shared section so a commit sees the write and
        // its seq together
        let written_at = self.with_writer(|writer| {
            writer.delete_term(term);
            if let Some(doc) = doc {
                writer.add_document(doc).map_err(FullTextError::from)?;
            }
            self.pending_ops.fetch_add(1, Ordering::SeqCst);
            self.tracker.accept(partition, seq)?;
            Ok(self.commits.load(Ordering::SeqCst))
        })?;

        if !self.should_commit(partition, seq) {
            return Ok(());
        }
        let mut guard = self
            .writer
            .write()
            .map_err(|e| FullTextError::WriterLocked(e.to_string()))?;
        let writer = guard
            .as_mut()
            .ok_or_else(|| PIndexError::Closed(self.name.clone()))?;
        // a commit made while we waited for the lock already covers us
        if self.commits.load(Ordering::SeqCst) > written_at {
            return Ok(());
        }
        self.commit_locked(writer)
    }
}

/// Run a parsed query against a searcher snapshot.
fn search(
    reader: &IndexReader,
    query_parser: &QueryParser,
    schema: &FullTextSchema,
    query: &FullTextQuery,
) -> std::result::Result<FullTextResult, FullTextError> {
    if query.query.trim().is_empty() {
        return Ok(FullTextResult::default());
    }

    let searcher = reader.searcher();
    let parsed = query_parser.parse_query(&query.query)?;
    let (total_hits, top_docs) =
        searcher.search(&parsed, &(Count, TopDocs::with_limit(query.limit())))?;

    let mut hits = Vec::with_capacity(top_docs.len());
    for (score, address) in top_docs {
        let doc: TantivyDocument = searcher.doc(address)?;
        let text = |field| {
            doc.get_first(field)
                .and_then(|v| v.as_str())
                .unwrap_or("")
                .to_string()
        };
        hits.push(Hit {
            partition: text(schema.partition),
            key: text(schema.key),
            seq: doc
                .get_first(schema.seq)
                .and_then(|v| v.as_u64())
                .unwrap_or(0),
            score,
        });
    }

    Ok(FullTextResult {
        total_hits: total_hits as u64,
        hits,
    })
}

impl PIndexImpl for FullTextDest {
    fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        let mut guard = self
            .writer
            .write()
            .map_err(|e| FullTextError::WriterLocked(e.to_string()))?;
        if let Some(mut writer) = guard.take() {
            if self.pending_ops.load(Ordering::SeqCst) > 0 {
                if let Err(e) = self.commit_locked(&mut writer) {
                    warn!(pindex = %self.name, error = %e, "Commit on close failed");
                }
            }
            if let Err(e) = writer.wait_merging_threads() {
                warn!(pindex = %self.name, error = %e, "Merge threads did not finish");
            }
        }
        self.tracker.close();

        info!(
            pindex = %self.name,
            path = ?self.path,
            commits = self.commit_count(),
            "Closed fulltext index"
        );
        Ok(())
    }
}

#[async_trait]
impl Dest for FullTextDest {
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
        self.ensure_open()?;
        let lock = self.partition_lock(partition);
        let _guard = self.lock_partition(&lock)?;

        let checkpoint = Checkpoint::new(value, self.tracker.applied(partition));
        let last_seq = checkpoint.last_seq;
        self.lock_checkpoints()?
            .insert(partition.to_string(), checkpoint);
        self.commit()?;

        debug!(partition, last_seq, "Stored checkpoint");
        Ok(())
    }

    fn get_opaque(&self, partition: &str) -> Result<Checkpoint> {
        self.ensure_open()?;
        Ok(self
            .lock_checkpoints()?
            .get(partition)
            .cloned()
            .unwrap_or_default())
    }

    /// Documents do not keep their history, so a rollback that has to undo
    /// anything clears the partition and restarts it from sequence 0.
    fn rollback(&self, partition: &str, rollback_seq: u64) -> Result<()> {
        self.ensure_open()?;
        let lock = self.partition_lock(partition);
        let _guard = self.lock_partition(&lock)?;

        let applied = self.tracker.applied(partition);
        if rollback_seq >= applied {
            debug!(partition, rollback_seq, applied, "Rollback is a no-op");
            return Ok(());
        }

        let term = partition_term(&self.schema, partition);
        self.with_writer(|writer| {
            writer.delete_term(term);
            self.lock_checkpoints()?.remove(partition);
            self.tracker.rolled_back(partition, 0);
            Ok(())
        })?;
        self.commit()?;

        info!(partition, rollback_seq, applied, "Cleared partition for rollback");
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
        self.ensure_open()?;
        Ok(self.reader.searcher().num_docs())
    }

    async fn query(
        &self,
        _pindex: &PIndex,
        req: &[u8],
        res: &mut (dyn Write + Send),
        cancel: &CancellationToken,
    ) -> Result<()> {
        let query = FullTextQuery::parse(req)?;
        if cancel.is_cancelled() {
            return Err(PIndexError::Cancelled);
        }
        self.ensure_open()?;

        let reader = self.reader.clone();
        let query_parser = self.query_parser.clone();
        let schema = self.schema.clone();
        let result =
            tokio::task::spawn_blocking(move || search(&reader, &query_parser, &schema, &query))
                .await
                .map_err(|e| FullTextError::Task(e.to_string()))??;

        serde_json::to_writer(&mut *res, &result)?;
        Ok(())
    }
}

impl std::fmt::Debug for FullTextDest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FullTextDest")
            .field("name", &self.name)
            .field("path", &self.path)
            .field("batch_max_ops", &self.batch_max_ops)
            .field("commits", &self.commit_count())
            .finish_non_exhaustive()
    }
}
