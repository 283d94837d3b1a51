//! The `kv` index type: construction, recovery and index-level queries.

use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::info;

use pindex_core::{PIndexImplPair, PIndexImplRegistry, PIndexImplType, PIndexManager, RestartNotifier};
use pindex_types::{KvSettings, PIndexError, Result};

use crate::backend::KvDest;
use crate::error::KvError;
use crate::query::{KvQuery, KvRow};
use crate::store::{KvStore, StoreOptions};

pub const KV_TYPE: &str = "kv";

/// Marker written next to the store by `new_impl`.
pub const KV_META: &str = "KV_META";

/// RocksDB directory under the pindex path.
pub const STORE_DIR: &str = "store";

const DESCRIPTION: &str =
    "kv - key/value store per partition with exact rollback; point and prefix queries";

/// Backend params accepted in the index definition.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct KvParams {
    #[serde(default)]
    pub history: Option<bool>,
    #[serde(default)]
    pub history_retain_ops: Option<u64>,
}

impl KvParams {
    pub fn parse(params: &str) -> Result<Self> {
        if params.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_json::from_str(params).map_err(|e| PIndexError::InvalidParams(e.to_string()))
    }

    /// Fill unset params from `defaults` and validate the result.
    pub fn resolve(&self, defaults: &KvSettings) -> Result<StoreOptions> {
        let settings = KvSettings {
            history: self.history.unwrap_or(defaults.history),
            history_retain_ops: self
                .history_retain_ops
                .unwrap_or(defaults.history_retain_ops),
        };
        settings.validate().map_err(PIndexError::InvalidParams)?;
        Ok(StoreOptions {
            history: settings.history,
            history_retain_ops: settings.history_retain_ops,
        })
    }
}

fn default_history_retain_ops() -> u64 {
    KvSettings::default().history_retain_ops
}

/// Contents of `KV_META`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KvMeta {
    #[serde(rename = "type")]
    pub index_type: String,
    pub history: bool,
    #[serde(default = "default_history_retain_ops")]
    pub history_retain_ops: u64,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub created_at: DateTime<Utc>,
}

impl KvMeta {
    fn read(path: &Path) -> std::result::Result<Self, KvError> {
        let bytes = std::fs::read(path.join(KV_META))
            .map_err(|e| KvError::Meta(format!("{}: {}", KV_META, e)))?;
        let meta: KvMeta = serde_json::from_slice(&bytes)
            .map_err(|e| KvError::Meta(format!("{}: {}", KV_META, e)))?;
        if meta.index_type != KV_TYPE {
            return Err(KvError::Meta(format!(
                "{} names type {:?}, expected {:?}",
                KV_META, meta.index_type, KV_TYPE
            )));
        }
        Ok(meta)
    }

    fn store_options(&self) -> StoreOptions {
        StoreOptions {
            history: self.history,
            history_retain_ops: self.history_retain_ops,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct KvType {
    defaults: KvSettings,
}

impl KvType {
    pub fn new(defaults: KvSettings) -> Self {
        Self { defaults }
    }
}

/// Register the `kv` type.
pub fn register_kv(registry: &mut PIndexImplRegistry, defaults: KvSettings) {
    registry.register(KV_TYPE, Arc::new(KvType::new(defaults)));
}

#[async_trait]
impl PIndexImplType for KvType {
    fn description(&self) -> &str {
        DESCRIPTION
    }

    fn new_impl(
        &self,
        _index_type: &str,
        index_params: &str,
        path: &Path,
        restart: RestartNotifier,
    ) -> Result<PIndexImplPair> {
        let options = KvParams::parse(index_params)?.resolve(&self.defaults)?;

        std::fs::create_dir_all(path)?;
        let store = KvStore::open(&path.join(STORE_DIR), options, true)?;

        let meta = KvMeta {
            index_type: KV_TYPE.to_string(),
            history: options.history,
            history_retain_ops: options.history_retain_ops,
            created_at: Utc::now(),
        };
        std::fs::write(path.join(KV_META), serde_json::to_vec_pretty(&meta)?)?;

        info!(
            path = ?path,
            history = options.history,
            retain_ops = options.history_retain_ops,
            "Created kv pindex"
        );
        let dest = KvDest::new(path, store, restart)?;
        Ok(PIndexImplPair::shared(Arc::new(dest)))
    }

    fn open_impl(
        &self,
        _index_type: &str,
        path: &Path,
        restart: RestartNotifier,
    ) -> Result<PIndexImplPair> {
        let meta = KvMeta::read(path)?;
        let store = KvStore::open(&path.join(STORE_DIR), meta.store_options(), false)?;

        info!(path = ?path, history = meta.history, "Opened kv pindex");
        let dest = KvDest::new(path, store, restart)?;
        Ok(PIndexImplPair::shared(Arc::new(dest)))
    }

    /// Concatenates rows from every local pindex, sorted by partition and
    /// key, then applies the request's limit.
    async fn query(
        &self,
        mgr: &PIndexManager,
        index_name: &str,
        index_uuid: &str,
        req: &[u8],
        res: &mut (dyn Write + Send),
        cancel: &CancellationToken,
    ) -> Result<()> {
        let query = KvQuery::parse(req)?;
        // validate before fanning out
        query.lookup()?;

        let pindexes = mgr.pindexes_for_index(index_name, index_uuid);
        if pindexes.is_empty() {
            return Err(PIndexError::NotFound(format!(
                "no local pindexes, index_name: {}",
                index_name
            )));
        }

        let mut rows: Vec<KvRow> = Vec::new();
        for pindex in &pindexes {
            if cancel.is_cancelled() {
                return Err(PIndexError::Cancelled);
            }
            let mut buf = Vec::new();
            pindex.dest().query(pindex, req, &mut buf, cancel).await?;
            let part: Vec<KvRow> = serde_json::from_slice(&buf)?;
            rows.extend(part);
        }

        rows.sort();
        rows.truncate(query.effective_limit());
        serde_json::to_writer(&mut *res, &rows)?;
        Ok(())
    }
}
