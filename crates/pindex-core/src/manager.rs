//! Owner of the local pindexes.
//!
//! The manager keeps the name -> pindex map, lays pindexes out under the
//! data directory as `<name>.pindex`, routes index-level count/query to the
//! type descriptor, and consumes restart requests from backends.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use dashmap::DashMap;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use pindex_types::{PIndexError, PIndexMeta, Result};

use crate::cfg::{impl_type_for_index, IndexDefSource};
use crate::pindex::PIndex;
use crate::registry::PIndexImplRegistry;
use crate::restart::{RestartNotifier, RestartRequest};

/// Directory suffix for pindexes under the data directory.
pub const PINDEX_DIR_SUFFIX: &str = ".pindex";

pub struct PIndexManager {
    registry: Arc<PIndexImplRegistry>,
    cfg: Arc<dyn IndexDefSource>,
    data_dir: PathBuf,
    pindexes: DashMap<String, Arc<PIndex>>,
    restart_tx: mpsc::UnboundedSender<RestartRequest>,
    restart_rx: Mutex<Option<mpsc::UnboundedReceiver<RestartRequest>>>,
}

impl PIndexManager {
    pub fn new(
        registry: Arc<PIndexImplRegistry>,
        cfg: Arc<dyn IndexDefSource>,
        data_dir: impl Into<PathBuf>,
    ) -> Self {
        let (restart_tx, restart_rx) = mpsc::unbounded_channel();
        Self {
            registry,
            cfg,
            data_dir: data_dir.into(),
            pindexes: DashMap::new(),
            restart_tx,
            restart_rx: Mutex::new(Some(restart_rx)),
        }
    }

    pub fn registry(&self) -> &Arc<PIndexImplRegistry> {
        &self.registry
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Path a pindex named `pindex_name` lives at.
    pub fn pindex_path(&self, pindex_name: &str) -> PathBuf {
        self.data_dir
            .join(format!("{}{}", pindex_name, PINDEX_DIR_SUFFIX))
    }

    fn notifier(&self, pindex_name: &str) -> RestartNotifier {
        RestartNotifier::from_sender(pindex_name, self.restart_tx.clone())
    }

    /// Create a pindex for `index_name` covering `partitions`.
    pub fn create_pindex(
        &self,
        index_name: &str,
        pindex_name: &str,
        partitions: Vec<String>,
    ) -> Result<Arc<PIndex>> {
        if self.pindexes.contains_key(pindex_name) {
            return Err(PIndexError::Storage(format!(
                "pindex {} already registered",
                pindex_name
            )));
        }

        let (_, def) = impl_type_for_index(self.cfg.as_ref(), &self.registry, index_name)?;
        let meta = PIndexMeta::for_index(&def, pindex_name, partitions);
        self.create_from_meta(meta)
    }

    fn create_from_meta(&self, meta: PIndexMeta) -> Result<Arc<PIndex>> {
        let path = self.pindex_path(&meta.name);
        let notifier = self.notifier(&meta.name);
        let pindex = Arc::new(PIndex::create(&self.registry, meta, &path, notifier)?);
        self.pindexes
            .insert(pindex.name().to_string(), pindex.clone());
        Ok(pindex)
    }

    /// Open every `*.pindex` directory under the data directory.
    ///
    /// A pindex that fails to open is logged and skipped. Returns how many
    /// were opened.
    pub fn load_data_dir(&self) -> Result<usize> {
        std::fs::create_dir_all(&self.data_dir)?;

        let mut opened = 0;
        for entry in std::fs::read_dir(&self.data_dir)? {
            let entry = entry?;
            let path = entry.path();
            let is_pindex = path.is_dir()
                && path
                    .file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(|n| n.ends_with(PINDEX_DIR_SUFFIX));
            if !is_pindex {
                continue;
            }

            let meta = match PIndex::read_meta(&path) {
                Ok(meta) => meta,
                Err(e) => {
                    warn!(path = ?path, error = %e, "Skipping unreadable pindex");
                    continue;
                }
            };
            if self.pindexes.contains_key(&meta.name) {
                debug!(pindex = %meta.name, "Already loaded");
                continue;
            }

            match PIndex::open(&self.registry, &path, self.notifier(&meta.name)) {
                Ok(pindex) => {
                    self.pindexes
                        .insert(pindex.name().to_string(), Arc::new(pindex));
                    opened += 1;
                }
                Err(e) => {
                    warn!(path = ?path, error = %e, "Failed to open pindex");
                }
            }
        }

        info!(data_dir = ?self.data_dir, opened, "Loaded data dir");
        Ok(opened)
    }

    pub fn pindex(&self, pindex_name: &str) -> Option<Arc<PIndex>> {
        self.pindexes.get(pindex_name).map(|p| p.value().clone())
    }

    /// All pindexes, sorted by name.
    pub fn pindexes(&self) -> Vec<Arc<PIndex>> {
        let mut all: Vec<Arc<PIndex>> = self.pindexes.iter().map(|p| p.value().clone()).collect();
        all.sort_by(|a, b| a.name().cmp(b.name()));
        all
    }

    /// Pindexes of one logical index, sorted by name. An empty `index_uuid`
    /// matches any incarnation of the index.
    pub fn pindexes_for_index(&self, index_name: &str, index_uuid: &str) -> Vec<Arc<PIndex>> {
        self.pindexes()
            .into_iter()
            .filter(|p| {
                let meta = p.meta();
                meta.index_name == index_name
                    && (index_uuid.is_empty() || meta.index_uuid == index_uuid)
            })
            .collect()
    }

    /// Unregister and close a pindex. Returns false when it was not present.
    pub fn remove_pindex(&self, pindex_name: &str, remove_files: bool) -> Result<bool> {
        let Some((_, pindex)) = self.pindexes.remove(pindex_name) else {
            return Ok(false);
        };
        pindex.close(remove_files)?;
        Ok(true)
    }

    /// Count entities of a logical index.
    pub async fn count(&self, index_name: &str, cancel: &CancellationToken) -> Result<u64> {
        let (descriptor, def) = impl_type_for_index(self.cfg.as_ref(), &self.registry, index_name)?;
        descriptor.count(self, index_name, &def.uuid, cancel).await
    }

    /// Query a logical index, writing the response to `res`.
    pub async fn query(
        &self,
        index_name: &str,
        req: &[u8],
        res: &mut (dyn Write + Send),
        cancel: &CancellationToken,
    ) -> Result<()> {
        let (descriptor, def) = impl_type_for_index(self.cfg.as_ref(), &self.registry, index_name)?;
        descriptor
            .query(self, index_name, &def.uuid, req, res, cancel)
            .await
    }

    /// Tear down and recreate one pindex from `New`, keeping its name,
    /// index and partitions.
    pub fn restart_pindex(&self, req: &RestartRequest) -> Result<Option<Arc<PIndex>>> {
        let Some((_, old)) = self.pindexes.remove(&req.pindex_name) else {
            debug!(pindex = %req.pindex_name, "Restart for unknown pindex ignored");
            return Ok(None);
        };

        info!(pindex = %req.pindex_name, reason = %req.reason, "Restarting pindex");

        let meta = old.meta().renewed();
        if let Err(e) = old.close(true) {
            warn!(pindex = %req.pindex_name, error = %e, "Close during restart failed");
            let path = old.path();
            if path.exists() {
                std::fs::remove_dir_all(path)?;
            }
        }

        self.create_from_meta(meta).map(Some)
    }

    /// Consume restart requests until `shutdown` fires.
    ///
    /// Only one loop may run per manager.
    pub async fn run_restart_loop(self: Arc<Self>, shutdown: CancellationToken) -> Result<()> {
        let mut rx = self
            .restart_rx
            .lock()
            .map_err(|e| PIndexError::Storage(format!("restart receiver lock poisoned: {}", e)))?
            .take()
            .ok_or_else(|| PIndexError::Config("restart loop already running".to_string()))?;

        info!("Restart loop started");
        loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                req = rx.recv() => {
                    let Some(req) = req else { break };
                    if let Err(e) = self.restart_pindex(&req) {
                        error!(pindex = %req.pindex_name, error = %e, "Pindex restart failed");
                    }
                }
            }
        }
        info!("Restart loop stopped");
        Ok(())
    }

    /// Close every pindex, keeping their files. Returns the first error
    /// after attempting all of them.
    pub fn shutdown(&self) -> Result<()> {
        let mut first_err = None;
        for pindex in self.pindexes() {
            self.pindexes.remove(pindex.name());
            if let Err(e) = pindex.close(false) {
                error!(pindex = %pindex.name(), error = %e, "Close failed");
                first_err.get_or_insert(e);
            }
        }
        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

impl std::fmt::Debug for PIndexManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PIndexManager")
            .field("data_dir", &self.data_dir)
            .field("pindexes", &self.pindexes.len())
            .finish()
    }
}
