//! Partition index handle.
//!
//! A `PIndex` binds a name, type and on-disk path to a live backend. The
//! metadata needed to reopen it is persisted in `PINDEX_META` next to the
//! backend's own files.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::{info, warn};

use pindex_types::{PIndexError, PIndexMeta, Result};

use crate::dest::{Dest, PIndexImpl};
use crate::registry::PIndexImplRegistry;
use crate::restart::RestartNotifier;

/// Metadata file name under every pindex path.
pub const PINDEX_META: &str = "PINDEX_META";

/// Live partition index.
pub struct PIndex {
    meta: PIndexMeta,
    path: PathBuf,
    pimpl: Arc<dyn PIndexImpl>,
    dest: Arc<dyn Dest>,
    closed: AtomicBool,
}

impl PIndex {
    /// Create a new pindex at `path`.
    ///
    /// Fails with `UnknownIndexType` before touching the filesystem when the
    /// type is not registered, and with `Storage` when a pindex already
    /// lives at `path`.
    pub fn create(
        registry: &PIndexImplRegistry,
        meta: PIndexMeta,
        path: &Path,
        restart: RestartNotifier,
    ) -> Result<Self> {
        if !registry.contains(&meta.index_type) {
            return Err(PIndexError::UnknownIndexType(meta.index_type.clone()));
        }
        if path.join(PINDEX_META).exists() {
            return Err(PIndexError::Storage(format!(
                "pindex already exists at {}",
                path.display()
            )));
        }

        let pair = registry.new_pindex_impl(&meta.index_type, &meta.index_params, path, restart)?;

        let write_meta = || -> Result<()> {
            std::fs::create_dir_all(path)?;
            std::fs::write(path.join(PINDEX_META), meta.to_bytes()?)?;
            Ok(())
        };
        if let Err(e) = write_meta() {
            if let Err(close_err) = pair.pimpl.close() {
                warn!(error = %close_err, "Close after failed meta write");
            }
            return Err(e);
        }

        info!(pindex = %meta.name, index_type = %meta.index_type, path = ?path, "Created pindex");

        Ok(Self {
            meta,
            path: path.to_path_buf(),
            pimpl: pair.pimpl,
            dest: pair.dest,
            closed: AtomicBool::new(false),
        })
    }

    /// Reopen the pindex persisted at `path`.
    pub fn open(registry: &PIndexImplRegistry, path: &Path, restart: RestartNotifier) -> Result<Self> {
        let meta = Self::read_meta(path)?;
        let pair = registry.open_pindex_impl(&meta.index_type, path, restart)?;

        info!(pindex = %meta.name, index_type = %meta.index_type, path = ?path, "Opened pindex");

        Ok(Self {
            meta,
            path: path.to_path_buf(),
            pimpl: pair.pimpl,
            dest: pair.dest,
            closed: AtomicBool::new(false),
        })
    }

    /// Read `PINDEX_META` without opening the backend.
    pub fn read_meta(path: &Path) -> Result<PIndexMeta> {
        let bytes = std::fs::read(path.join(PINDEX_META))?;
        PIndexMeta::from_bytes(&bytes).map_err(|e| {
            PIndexError::Corrupt(format!("{} at {}: {}", PINDEX_META, path.display(), e))
        })
    }

    /// Close the backend and optionally delete the pindex directory.
    ///
    /// Only the first call does anything.
    pub fn close(&self, remove: bool) -> Result<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        self.pimpl.close()?;
        if remove && self.path.exists() {
            std::fs::remove_dir_all(&self.path)?;
        }

        info!(pindex = %self.meta.name, remove, "Closed pindex");
        Ok(())
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn name(&self) -> &str {
        &self.meta.name
    }

    pub fn index_type(&self) -> &str {
        &self.meta.index_type
    }

    pub fn index_name(&self) -> &str {
        &self.meta.index_name
    }

    pub fn meta(&self) -> &PIndexMeta {
        &self.meta
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn dest(&self) -> &Arc<dyn Dest> {
        &self.dest
    }

    pub fn pimpl(&self) -> &Arc<dyn PIndexImpl> {
        &self.pimpl
    }
}

impl std::fmt::Debug for PIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PIndex")
            .field("name", &self.meta.name)
            .field("index_type", &self.meta.index_type)
            .field("path", &self.path)
            .field("closed", &self.is_closed())
            .finish()
    }
}
