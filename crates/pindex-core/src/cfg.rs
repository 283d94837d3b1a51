//! Index definitions as seen by the plugin layer.
//!
//! The real configuration store lives elsewhere; this module only needs a
//! way to read the current set of definitions.

use std::sync::{Arc, RwLock};

use tracing::debug;

use pindex_types::{IndexDef, IndexDefs, PIndexError, Result};

use crate::registry::{PIndexImplRegistry, PIndexImplType};

/// Read access to the current index definitions.
pub trait IndexDefSource: Send + Sync {
    fn index_defs(&self) -> Result<IndexDefs>;
}

/// In-memory definition store, used by tests and the admin tool.
#[derive(Debug, Default)]
pub struct MemIndexDefs {
    defs: RwLock<IndexDefs>,
}

impl MemIndexDefs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a definition, bumping the version.
    pub fn put(&self, def: IndexDef) -> Result<()> {
        let mut defs = self
            .defs
            .write()
            .map_err(|e| PIndexError::Storage(format!("index defs lock poisoned: {}", e)))?;
        defs.version += 1;
        defs.index_defs.insert(def.name.clone(), def);
        Ok(())
    }

    /// Remove a definition. Returns whether it existed.
    pub fn delete(&self, index_name: &str) -> Result<bool> {
        let mut defs = self
            .defs
            .write()
            .map_err(|e| PIndexError::Storage(format!("index defs lock poisoned: {}", e)))?;
        let existed = defs.index_defs.remove(index_name).is_some();
        if existed {
            defs.version += 1;
        }
        Ok(existed)
    }
}

impl IndexDefSource for MemIndexDefs {
    fn index_defs(&self) -> Result<IndexDefs> {
        self.defs
            .read()
            .map(|defs| defs.clone())
            .map_err(|e| PIndexError::Storage(format!("index defs lock poisoned: {}", e)))
    }
}

impl<T: IndexDefSource + ?Sized> IndexDefSource for Arc<T> {
    fn index_defs(&self) -> Result<IndexDefs> {
        (**self).index_defs()
    }
}

/// Resolve the descriptor responsible for `index_name`.
pub fn impl_type_for_index(
    cfg: &dyn IndexDefSource,
    registry: &PIndexImplRegistry,
    index_name: &str,
) -> Result<(Arc<dyn PIndexImplType>, IndexDef)> {
    let defs = cfg
        .index_defs()
        .map_err(|e| PIndexError::Config(format!("could not get indexDefs: {}", e)))?;

    let def = defs
        .get(index_name)
        .cloned()
        .ok_or_else(|| PIndexError::NotFound(format!("no indexDef, indexName: {}", index_name)))?;

    let descriptor = registry.lookup(&def.index_type).ok_or_else(|| {
        PIndexError::UnknownIndexType(format!(
            "no pindexImplType, indexName: {}, indexDef.Type: {}",
            index_name, def.index_type
        ))
    })?;

    debug!(index_name, index_type = %def.index_type, "Resolved index type");
    Ok((descriptor, def))
}
