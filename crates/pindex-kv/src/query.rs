//! Query requests and results for the kv backend.
//!
//! Requests are JSON:
//! - `{"partition": "0", "key": "beer:1"}` point lookup
//! - `{"partition": "0", "prefix": "beer:", "limit": 10}` prefix scan; the
//!   partition is optional and every field may be omitted
//!
//! The response is a JSON array of rows.

use serde::{Deserialize, Serialize};

use pindex_types::{PIndexError, Result};

use crate::store::DataEntry;

pub const DEFAULT_SCAN_LIMIT: usize = 1000;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct KvQuery {
    #[serde(default)]
    pub partition: Option<String>,
    #[serde(default)]
    pub key: Option<String>,
    #[serde(default)]
    pub prefix: Option<String>,
    #[serde(default)]
    pub limit: Option<usize>,
}

/// What a request asks the store for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KvLookup {
    Get {
        partition: String,
        key: String,
    },
    Scan {
        partition: Option<String>,
        prefix: String,
        limit: usize,
    },
}

impl KvQuery {
    pub fn parse(req: &[u8]) -> Result<Self> {
        serde_json::from_slice(req).map_err(|e| PIndexError::InvalidQuery(e.to_string()))
    }

    /// Row limit for scans and merged results.
    pub fn effective_limit(&self) -> usize {
        self.limit.unwrap_or(DEFAULT_SCAN_LIMIT)
    }

    pub fn lookup(&self) -> Result<KvLookup> {
        match (&self.key, &self.prefix) {
            (Some(_), Some(_)) => Err(PIndexError::InvalidQuery(
                "key and prefix are mutually exclusive".to_string(),
            )),
            (Some(key), None) => {
                let partition = self.partition.clone().ok_or_else(|| {
                    PIndexError::InvalidQuery("key lookup needs a partition".to_string())
                })?;
                Ok(KvLookup::Get {
                    partition,
                    key: key.clone(),
                })
            }
            (None, prefix) => {
                let limit = self.effective_limit();
                if limit == 0 {
                    return Err(PIndexError::InvalidQuery("limit must be > 0".to_string()));
                }
                Ok(KvLookup::Scan {
                    partition: self.partition.clone(),
                    prefix: prefix.clone().unwrap_or_default(),
                    limit,
                })
            }
        }
    }
}

/// One result row. Keys and values are rendered as (lossy) UTF-8.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct KvRow {
    pub partition: String,
    pub key: String,
    pub value: String,
}

impl KvRow {
    pub fn new(partition: &str, key: &[u8], value: &[u8]) -> Self {
        Self {
            partition: partition.to_string(),
            key: String::from_utf8_lossy(key).into_owned(),
            value: String::from_utf8_lossy(value).into_owned(),
        }
    }
}

impl From<DataEntry> for KvRow {
    fn from(entry: DataEntry) -> Self {
        Self::new(&entry.partition, &entry.key, &entry.value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_point_lookup() {
        let q = KvQuery::parse(br#"{"partition":"0","key":"a"}"#).unwrap();
        assert_eq!(
            q.lookup().unwrap(),
            KvLookup::Get {
                partition: "0".to_string(),
                key: "a".to_string()
            }
        );
    }

    #[test]
    fn test_empty_request_scans_everything() {
        let q = KvQuery::parse(b"{}").unwrap();
        assert_eq!(
            q.lookup().unwrap(),
            KvLookup::Scan {
                partition: None,
                prefix: String::new(),
                limit: DEFAULT_SCAN_LIMIT
            }
        );
    }

    #[test]
    fn test_invalid_requests() {
        assert!(matches!(
            KvQuery::parse(b"not json"),
            Err(PIndexError::InvalidQuery(_))
        ));
        assert!(matches!(
            KvQuery::parse(br#"{"color":"red"}"#),
            Err(PIndexError::InvalidQuery(_))
        ));

        let no_partition = KvQuery::parse(br#"{"key":"a"}"#).unwrap();
        assert!(no_partition.lookup().is_err());

        let both = KvQuery::parse(br#"{"partition":"0","key":"a","prefix":"b"}"#).unwrap();
        assert!(both.lookup().is_err());

        let zero = KvQuery::parse(br#"{"limit":0}"#).unwrap();
        assert!(zero.lookup().is_err());
    }

    #[test]
    fn test_row_renders_lossy_utf8() {
        let row = KvRow::new("0", &[b'k', 0xff], b"v");
        assert_eq!(row.key, "k\u{fffd}");
    }
}
