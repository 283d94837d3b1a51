//! Key-value backend error types.

use thiserror::Error;

use pindex_types::PIndexError;

/// Errors raised inside the kv backend
#[derive(Error, Debug)]
pub enum KvError {
    /// RocksDB operation failed
    #[error("RocksDB error: {0}")]
    RocksDb(#[from] rocksdb::Error),

    /// Column family not found
    #[error("Column family not found: {0}")]
    ColumnFamilyNotFound(String),

    /// Key encoding/decoding error
    #[error("Key error: {0}")]
    Key(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// An undo record could not be decoded
    #[error("Corrupt history record: {0}")]
    CorruptHistory(String),

    /// KV_META missing or not a kv marker
    #[error("Invalid kv metadata: {0}")]
    Meta(String),

    /// Caller cancelled a scan
    #[error("Cancelled")]
    Cancelled,

    /// Blocking scan task did not finish
    #[error("Scan task failed: {0}")]
    Task(String),
}

impl From<serde_json::Error> for KvError {
    fn from(err: serde_json::Error) -> Self {
        KvError::Serialization(err.to_string())
    }
}

impl From<KvError> for PIndexError {
    fn from(err: KvError) -> Self {
        match err {
            KvError::CorruptHistory(msg) => PIndexError::Corrupt(msg),
            KvError::Meta(msg) => PIndexError::Corrupt(msg),
            KvError::Serialization(msg) => PIndexError::Serialization(msg),
            KvError::Cancelled => PIndexError::Cancelled,
            other => PIndexError::Storage(other.to_string()),
        }
    }
}
