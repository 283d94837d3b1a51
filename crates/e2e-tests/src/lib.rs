//! End-to-end test infrastructure for the partition-index layer.
//!
//! Provides a shared TestHarness that wires a registry with every index
//! type, an in-memory index definition store and a manager over a temp
//! data directory, plus helpers that play the feed producer.

use std::path::PathBuf;
use std::sync::Arc;

use pindex_core::{
    register_builtin_types, CancellationToken, Dest, MemIndexDefs, PIndex, PIndexImplRegistry,
    PIndexManager,
};
use pindex_fulltext::register_fulltext;
use pindex_kv::register_kv;
use pindex_types::{FullTextSettings, IndexDef, KvSettings};

/// Shared test harness for E2E tests.
pub struct TestHarness {
    /// Keeps temp dir alive for the lifetime of the harness
    pub _temp_dir: tempfile::TempDir,
    pub data_dir: PathBuf,
    pub cfg: Arc<MemIndexDefs>,
    pub registry: Arc<PIndexImplRegistry>,
    pub manager: Arc<PIndexManager>,
}

impl TestHarness {
    /// Create a harness with blackhole, kv and fulltext registered.
    pub fn new() -> Self {
        let temp_dir = tempfile::TempDir::new().expect("Failed to create temp dir");
        let data_dir = temp_dir.path().join("data");
        std::fs::create_dir_all(&data_dir).expect("Failed to create data dir");

        let registry = Arc::new(test_registry());
        let cfg = Arc::new(MemIndexDefs::new());
        let manager = Arc::new(PIndexManager::new(
            registry.clone(),
            cfg.clone(),
            data_dir.clone(),
        ));

        Self {
            _temp_dir: temp_dir,
            data_dir,
            cfg,
            registry,
            manager,
        }
    }

    /// Store an index definition and return it.
    pub fn define_index(&self, name: &str, index_type: &str, params: &str) -> IndexDef {
        let def = IndexDef::new(name, index_type, params);
        self.cfg.put(def.clone()).expect("Failed to store index def");
        def
    }

    /// Create `count` pindexes for `index_name`, each covering two
    /// partitions: pindex i owns partitions `2i` and `2i+1`.
    pub fn create_pindexes(&self, index_name: &str, count: usize) -> Vec<Arc<PIndex>> {
        (0..count)
            .map(|i| {
                let partitions = vec![(2 * i).to_string(), (2 * i + 1).to_string()];
                self.manager
                    .create_pindex(index_name, &format!("{}_{}", index_name, i), partitions)
                    .expect("Failed to create pindex")
            })
            .collect()
    }

    /// A fresh manager over the same data dir, as after a process restart.
    pub fn reopened_manager(&self) -> Arc<PIndexManager> {
        Arc::new(PIndexManager::new(
            self.registry.clone(),
            self.cfg.clone(),
            self.data_dir.clone(),
        ))
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}

/// Registry with every index type and default settings.
pub fn test_registry() -> PIndexImplRegistry {
    let mut registry = PIndexImplRegistry::new();
    register_builtin_types(&mut registry);
    register_kv(&mut registry, KvSettings::default());
    register_fulltext(&mut registry, FullTextSettings::default());
    registry
}

/// One upstream mutation. `value: None` is a delete.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mutation {
    pub key: String,
    pub seq: u64,
    pub value: Option<String>,
}

impl Mutation {
    pub fn update(key: &str, seq: u64, value: &str) -> Self {
        Self {
            key: key.to_string(),
            seq,
            value: Some(value.to_string()),
        }
    }

    pub fn delete(key: &str, seq: u64) -> Self {
        Self {
            key: key.to_string(),
            seq,
            value: None,
        }
    }
}

/// Create `count` updates with sequences `first_seq..`, keys `key-{n}` and
/// values built from `base_text`.
pub fn create_test_mutations(first_seq: u64, count: usize, base_text: &str) -> Vec<Mutation> {
    (0..count as u64)
        .map(|i| {
            let seq = first_seq + i;
            Mutation::update(
                &format!("key-{}", seq),
                seq,
                &format!("{} (doc {})", base_text, seq),
            )
        })
        .collect()
}

/// Feed one snapshot of mutations into a partition, then store `opaque`
/// as its checkpoint.
pub fn feed_snapshot(dest: &dyn Dest, partition: &str, mutations: &[Mutation], opaque: &[u8]) {
    let (Some(first), Some(last)) = (mutations.first(), mutations.last()) else {
        return;
    };
    dest.on_snapshot_start(partition, first.seq, last.seq)
        .expect("Failed to start snapshot");
    for m in mutations {
        match &m.value {
            Some(value) => dest
                .on_data_update(partition, m.key.as_bytes(), m.seq, value.as_bytes())
                .expect("Failed to apply update"),
            None => dest
                .on_data_delete(partition, m.key.as_bytes(), m.seq)
                .expect("Failed to apply delete"),
        }
    }
    dest.set_opaque(partition, opaque)
        .expect("Failed to store checkpoint");
}

/// Run an index-level query through the manager and parse the JSON reply.
pub async fn query_json<T: serde::de::DeserializeOwned>(
    manager: &PIndexManager,
    index_name: &str,
    req: &str,
) -> T {
    let mut out = Vec::new();
    manager
        .query(index_name, req.as_bytes(), &mut out, &CancellationToken::new())
        .await
        .expect("Query failed");
    serde_json::from_slice(&out).expect("Query returned invalid JSON")
}
