//! Registry of index types.
//!
//! The registry is an explicit object: it is filled during startup through
//! `&mut self` and then shared as `Arc<PIndexImplRegistry>`, after which
//! lookups need no locking.

use std::collections::HashMap;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use pindex_types::{PIndexError, Result};

use crate::blackhole::register_blackhole;
use crate::dest::{Dest, PIndexImpl};
use crate::manager::PIndexManager;
use crate::restart::RestartNotifier;

/// What `New` and `Open` hand back: the lifecycle half and the Dest half of
/// one backend instance (often the same object).
#[derive(Clone)]
pub struct PIndexImplPair {
    pub pimpl: Arc<dyn PIndexImpl>,
    pub dest: Arc<dyn Dest>,
}

impl PIndexImplPair {
    /// Pair for a backend that implements both traits on one object.
    pub fn shared<T>(backend: Arc<T>) -> Self
    where
        T: PIndexImpl + Dest + 'static,
    {
        Self {
            pimpl: backend.clone(),
            dest: backend,
        }
    }
}

impl std::fmt::Debug for PIndexImplPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PIndexImplPair").finish_non_exhaustive()
    }
}

/// Descriptor of one index type.
///
/// `count` and `query` work at the logical-index level: they see every
/// local pindex of the index through the manager.
#[async_trait]
pub trait PIndexImplType: Send + Sync {
    /// Human-readable description for listings.
    fn description(&self) -> &str;

    /// Create a brand-new, empty backend at `path`.
    fn new_impl(
        &self,
        index_type: &str,
        index_params: &str,
        path: &Path,
        restart: RestartNotifier,
    ) -> Result<PIndexImplPair>;

    /// Recover a backend previously created at `path`, validating what is
    /// on disk.
    fn open_impl(&self, index_type: &str, path: &Path, restart: RestartNotifier)
        -> Result<PIndexImplPair>;

    /// Count entities across the local pindexes of an index.
    async fn count(
        &self,
        mgr: &PIndexManager,
        index_name: &str,
        index_uuid: &str,
        cancel: &CancellationToken,
    ) -> Result<u64> {
        let mut total = 0;
        for pindex in mgr.pindexes_for_index(index_name, index_uuid) {
            if cancel.is_cancelled() {
                return Err(PIndexError::Cancelled);
            }
            total += pindex.dest().count(&pindex, cancel).await?;
        }
        Ok(total)
    }

    /// Query an index. The default handles the single-pindex case only;
    /// types that can merge partial results override it.
    async fn query(
        &self,
        mgr: &PIndexManager,
        index_name: &str,
        index_uuid: &str,
        req: &[u8],
        res: &mut (dyn Write + Send),
        cancel: &CancellationToken,
    ) -> Result<()> {
        let pindexes = mgr.pindexes_for_index(index_name, index_uuid);
        match pindexes.as_slice() {
            [] => Err(PIndexError::NotFound(format!(
                "no local pindexes, index_name: {}",
                index_name
            ))),
            [pindex] => pindex.dest().query(pindex, req, res, cancel).await,
            many => Err(PIndexError::InvalidQuery(format!(
                "index {} spans {} pindexes and its type cannot merge results",
                index_name,
                many.len()
            ))),
        }
    }
}

/// Mapping from index-type name to descriptor.
#[derive(Default)]
pub struct PIndexImplRegistry {
    types: HashMap<String, Arc<dyn PIndexImplType>>,
}

impl PIndexImplRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Install a descriptor. Registering a name twice replaces the earlier
    /// descriptor, which is returned.
    pub fn register(
        &mut self,
        index_type: impl Into<String>,
        descriptor: Arc<dyn PIndexImplType>,
    ) -> Option<Arc<dyn PIndexImplType>> {
        let index_type = index_type.into();
        debug!(index_type = %index_type, "Registering index type");
        self.types.insert(index_type, descriptor)
    }

    /// Find the descriptor for `index_type`.
    pub fn lookup(&self, index_type: &str) -> Option<Arc<dyn PIndexImplType>> {
        self.types.get(index_type).cloned()
    }

    pub fn contains(&self, index_type: &str) -> bool {
        self.types.contains_key(index_type)
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    /// `(name, description)` for every type, sorted by name.
    pub fn types(&self) -> Vec<(String, String)> {
        let mut types: Vec<(String, String)> = self
            .types
            .iter()
            .map(|(name, t)| (name.clone(), t.description().to_string()))
            .collect();
        types.sort();
        types
    }

    fn require(&self, index_type: &str) -> Result<Arc<dyn PIndexImplType>> {
        self.lookup(index_type)
            .ok_or_else(|| PIndexError::UnknownIndexType(index_type.to_string()))
    }

    /// Construct a fresh backend of `index_type` at `path`.
    pub fn new_pindex_impl(
        &self,
        index_type: &str,
        index_params: &str,
        path: &Path,
        restart: RestartNotifier,
    ) -> Result<PIndexImplPair> {
        let descriptor = self.require(index_type)?;
        info!(index_type, path = ?path, "Creating pindex impl");
        descriptor.new_impl(index_type, index_params, path, restart)
    }

    /// Reopen a backend of `index_type` at `path`.
    pub fn open_pindex_impl(
        &self,
        index_type: &str,
        path: &Path,
        restart: RestartNotifier,
    ) -> Result<PIndexImplPair> {
        let descriptor = self.require(index_type)?;
        info!(index_type, path = ?path, "Opening pindex impl");
        descriptor.open_impl(index_type, path, restart)
    }
}

impl std::fmt::Debug for PIndexImplRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<&String> = self.types.keys().collect();
        names.sort();
        f.debug_struct("PIndexImplRegistry")
            .field("types", &names)
            .finish()
    }
}

/// Register the types that ship with the core (`blackhole` and its `null`
/// alias).
pub fn register_builtin_types(registry: &mut PIndexImplRegistry) {
    register_blackhole(registry);
}
