//! The `fulltext` index type.

use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tantivy::Index;
use tokio_util::sync::CancellationToken;
use tracing::info;

use pindex_core::{PIndexImplPair, PIndexImplRegistry, PIndexImplType, PIndexManager, RestartNotifier};
use pindex_types::{FullTextSettings, PIndexError, Result};

use crate::backend::{FullTextDest, WriterOptions};
use crate::error::FullTextError;
use crate::query::{FullTextQuery, FullTextResult};
use crate::schema::build_schema;

pub const FULLTEXT_TYPE: &str = "fulltext";

/// Marker written next to the index by `new_impl`.
pub const FULLTEXT_META: &str = "FULLTEXT_META";

/// Tantivy directory under the pindex path.
pub const INDEX_DIR: &str = "index";

const DESCRIPTION: &str =
    "fulltext - tokenized text search over values; commit-driven visibility";

/// Backend params accepted in the index definition. Unset fields fall back
/// to the `[fulltext]` settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FullTextParams {
    #[serde(default)]
    pub writer_memory_mb: Option<usize>,
    #[serde(default)]
    pub batch_max_ops: Option<usize>,
}

impl FullTextParams {
    pub fn parse(params: &str) -> Result<Self> {
        if params.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_json::from_str(params).map_err(|e| PIndexError::InvalidParams(e.to_string()))
    }

    fn resolve(&self, defaults: &FullTextSettings) -> Result<FullTextSettings> {
        let settings = FullTextSettings {
            writer_memory_mb: self.writer_memory_mb.unwrap_or(defaults.writer_memory_mb),
            batch_max_ops: self.batch_max_ops.unwrap_or(defaults.batch_max_ops),
        };
        settings.validate().map_err(PIndexError::InvalidParams)?;
        Ok(settings)
    }
}

/// Contents of `FULLTEXT_META`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FullTextMeta {
    #[serde(rename = "type")]
    pub index_type: String,
    pub writer_memory_mb: usize,
    pub batch_max_ops: usize,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub created_at: DateTime<Utc>,
}

impl FullTextMeta {
    fn read(path: &Path) -> std::result::Result<Self, FullTextError> {
        let bytes = std::fs::read(path.join(FULLTEXT_META))
            .map_err(|e| FullTextError::Meta(format!("{}: {}", FULLTEXT_META, e)))?;
        let meta: FullTextMeta = serde_json::from_slice(&bytes)
            .map_err(|e| FullTextError::Meta(format!("{}: {}", FULLTEXT_META, e)))?;
        if meta.index_type != FULLTEXT_TYPE {
            return Err(FullTextError::Meta(format!(
                "{} names type {:?}, expected {:?}",
                FULLTEXT_META, meta.index_type, FULLTEXT_TYPE
            )));
        }
        Ok(meta)
    }

    fn options(&self) -> WriterOptions {
        WriterOptions {
            writer_memory_mb: self.writer_memory_mb,
            batch_max_ops: self.batch_max_ops,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct FullTextType {
    defaults: FullTextSettings,
}

impl FullTextType {
    pub fn new(defaults: FullTextSettings) -> Self {
        Self { defaults }
    }
}

/// Register the `fulltext` type.
pub fn register_fulltext(registry: &mut PIndexImplRegistry, defaults: FullTextSettings) {
    registry.register(FULLTEXT_TYPE, Arc::new(FullTextType::new(defaults)));
}

#[async_trait]
impl PIndexImplType for FullTextType {
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
        let settings = FullTextParams::parse(index_params)?.resolve(&self.defaults)?;

        let index_path = path.join(INDEX_DIR);
        std::fs::create_dir_all(&index_path)?;
        let index = Index::create_in_dir(&index_path, build_schema().schema().clone())
            .map_err(FullTextError::from)?;

        let meta = FullTextMeta {
            index_type: FULLTEXT_TYPE.to_string(),
            writer_memory_mb: settings.writer_memory_mb,
            batch_max_ops: settings.batch_max_ops,
            created_at: Utc::now(),
        };
        std::fs::write(path.join(FULLTEXT_META), serde_json::to_vec_pretty(&meta)?)?;

        info!(path = ?path, batch_max_ops = meta.batch_max_ops, "Created fulltext pindex");
        let dest = FullTextDest::new(path, index, meta.options(), restart)?;
        Ok(PIndexImplPair::shared(Arc::new(dest)))
    }

    fn open_impl(
        &self,
        _index_type: &str,
        path: &Path,
        restart: RestartNotifier,
    ) -> Result<PIndexImplPair> {
        let meta = FullTextMeta::read(path)?;
        let index = Index::open_in_dir(path.join(INDEX_DIR)).map_err(FullTextError::from)?;

        info!(path = ?path, "Opened fulltext pindex");
        let dest = FullTextDest::new(path, index, meta.options(), restart)?;
        Ok(PIndexImplPair::shared(Arc::new(dest)))
    }

    /// Runs the query on every local pindex and re-ranks the hits.
    async fn query(
        &self,
        mgr: &PIndexManager,
        index_name: &str,
        index_uuid: &str,
        req: &[u8],
        res: &mut (dyn Write + Send),
        cancel: &CancellationToken,
    ) -> Result<()> {
        let query = FullTextQuery::parse(req)?;

        let pindexes = mgr.pindexes_for_index(index_name, index_uuid);
        if pindexes.is_empty() {
            return Err(PIndexError::NotFound(format!(
                "no local pindexes, index_name: {}",
                index_name
            )));
        }

        let mut parts = Vec::with_capacity(pindexes.len());
        for pindex in &pindexes {
            if cancel.is_cancelled() {
                return Err(PIndexError::Cancelled);
            }
            let mut buf = Vec::new();
            pindex.dest().query(pindex, req, &mut buf, cancel).await?;
            parts.push(serde_json::from_slice::<FullTextResult>(&buf)?);
        }

        let merged = FullTextResult::merge(parts, query.limit());
        serde_json::to_writer(&mut *res, &merged)?;
        Ok(())
    }
}
