//! Index definitions and persisted pindex metadata.
//!
//! `IndexDef` is what the configuration store hands out for an index name;
//! `PIndexMeta` is what a partition index writes next to its data so it can
//! be reopened without consulting the store.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use ulid::Ulid;

use crate::error::PIndexError;

/// Definition of a logical index as held by the configuration store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexDef {
    /// Index name, unique in the store
    pub name: String,
    /// Changes whenever the index is redefined
    pub uuid: String,
    /// Registered index type ("blackhole", "kv", "fulltext", ...)
    #[serde(rename = "type")]
    pub index_type: String,
    /// Backend-specific params, usually JSON; empty means defaults
    #[serde(default)]
    pub params: String,
}

impl IndexDef {
    /// Create a definition with a fresh uuid.
    pub fn new(
        name: impl Into<String>,
        index_type: impl Into<String>,
        params: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            uuid: Ulid::new().to_string(),
            index_type: index_type.into(),
            params: params.into(),
        }
    }
}

/// Snapshot of all index definitions.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexDefs {
    /// Bumped on every change to the set
    pub version: u64,
    #[serde(default)]
    pub index_defs: BTreeMap<String, IndexDef>,
}

impl IndexDefs {
    pub fn get(&self, index_name: &str) -> Option<&IndexDef> {
        self.index_defs.get(index_name)
    }
}

/// Metadata persisted in `PINDEX_META` at the pindex path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PIndexMeta {
    pub name: String,
    pub uuid: String,
    #[serde(rename = "type")]
    pub index_type: String,
    pub index_name: String,
    pub index_uuid: String,
    #[serde(default)]
    pub index_params: String,
    /// Upstream partitions fed into this pindex
    #[serde(default)]
    pub source_partitions: Vec<String>,
}

impl PIndexMeta {
    /// Build metadata for a new pindex of `def` covering `partitions`.
    pub fn for_index(def: &IndexDef, pindex_name: impl Into<String>, partitions: Vec<String>) -> Self {
        Self {
            name: pindex_name.into(),
            uuid: Ulid::new().to_string(),
            index_type: def.index_type.clone(),
            index_name: def.name.clone(),
            index_uuid: def.uuid.clone(),
            index_params: def.params.clone(),
            source_partitions: partitions,
        }
    }

    /// Same pindex identity under a new instance uuid, used when a pindex is
    /// rebuilt from scratch.
    pub fn renewed(&self) -> Self {
        Self {
            uuid: Ulid::new().to_string(),
            ..self.clone()
        }
    }

    /// Serialize to pretty JSON bytes for the meta file
    pub fn to_bytes(&self) -> Result<Vec<u8>, PIndexError> {
        serde_json::to_vec_pretty(self).map_err(PIndexError::from)
    }

    /// Deserialize from JSON bytes
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, PIndexError> {
        serde_json::from_slice(bytes).map_err(PIndexError::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_index_def_uuid_is_fresh() {
        let a = IndexDef::new("beers", "fulltext", "");
        let b = IndexDef::new("beers", "fulltext", "");
        assert_ne!(a.uuid, b.uuid);
    }

    #[test]
    fn test_index_def_json_uses_type_key() {
        let def = IndexDef::new("beers", "kv", "{}");
        let json = serde_json::to_string(&def).unwrap();
        assert!(json.contains("\"type\":\"kv\""));
    }

    #[test]
    fn test_meta_inherits_index_def() {
        let def = IndexDef::new("beers", "fulltext", "{\"batch_max_ops\":5}");
        let meta = PIndexMeta::for_index(&def, "beers_0", vec!["0".into(), "1".into()]);
        assert_eq!(meta.index_name, "beers");
        assert_eq!(meta.index_uuid, def.uuid);
        assert_eq!(meta.index_type, "fulltext");
        assert_eq!(meta.index_params, def.params);

        let decoded = PIndexMeta::from_bytes(&meta.to_bytes().unwrap()).unwrap();
        assert_eq!(decoded, meta);
    }

    #[test]
    fn test_renewed_keeps_identity() {
        let def = IndexDef::new("beers", "kv", "");
        let meta = PIndexMeta::for_index(&def, "beers_0", vec!["0".into()]);
        let renewed = meta.renewed();
        assert_ne!(renewed.uuid, meta.uuid);
        assert_eq!(renewed.name, meta.name);
        assert_eq!(renewed.index_uuid, meta.index_uuid);
    }

    #[test]
    fn test_meta_rejects_garbage() {
        assert!(PIndexMeta::from_bytes(b"not json").is_err());
    }
}
