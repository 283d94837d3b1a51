//! Error types for the partition-index layer.

use thiserror::Error;

/// Convenience alias used across the workspace.
pub type Result<T, E = PIndexError> = std::result::Result<T, E>;

/// Unified error type for registry, construction and Dest operations.
#[derive(Debug, Error)]
pub enum PIndexError {
    /// Configuration error (settings, index definitions)
    #[error("Configuration error: {0}")]
    Config(String),

    /// No descriptor registered for the index type
    #[error("Unknown index type: {0}")]
    UnknownIndexType(String),

    /// Backend rejected its index params
    #[error("Invalid index params: {0}")]
    InvalidParams(String),

    /// Backend storage failure
    #[error("Storage error: {0}")]
    Storage(String),

    /// Persisted state exists but is not what the backend expects
    #[error("Corrupt index state: {0}")]
    Corrupt(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// The index type does not support counting
    #[error("{0} is uncountable")]
    Uncountable(String),

    /// The index type does not support queries
    #[error("{0} is unqueryable")]
    Unqueryable(String),

    /// Query request could not be understood by the backend
    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    /// A mutation arrived with a sequence lower than one already accepted
    #[error("Out of order mutation on partition {partition}: seq {seq} < last {last}")]
    OutOfOrder {
        partition: String,
        seq: u64,
        last: u64,
    },

    /// Consistency level string not understood
    #[error("Unsupported consistency level: {0:?}")]
    UnsupportedConsistencyLevel(String),

    /// Caller cancelled a consistency wait
    #[error("Consistency wait cancelled on partition {partition}: target {target}, current {cur_seq}")]
    ConsistencyWaitCancelled {
        partition: String,
        target: u64,
        cur_seq: u64,
    },

    /// A rollback below the target happened while waiting
    #[error(
        "Consistency wait on partition {partition} cannot reach {target}: rolled back to {rollback_seq}, current {cur_seq}"
    )]
    ConsistencyWaitRolledBack {
        partition: String,
        target: u64,
        cur_seq: u64,
        rollback_seq: u64,
    },

    /// Caller cancelled a count or query
    #[error("Operation cancelled")]
    Cancelled,

    /// The pindex has been closed
    #[error("PIndex closed: {0}")]
    Closed(String),

    /// Not found error
    #[error("Not found: {0}")]
    NotFound(String),
}

impl PIndexError {
    /// True for the "operation not supported by this index type" results,
    /// which are distinct from empty results and from faults.
    pub fn is_capability_absence(&self) -> bool {
        matches!(self, PIndexError::Uncountable(_) | PIndexError::Unqueryable(_))
    }
}

impl From<serde_json::Error> for PIndexError {
    fn from(err: serde_json::Error) -> Self {
        PIndexError::Serialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = PIndexError::Uncountable("blackhole".to_string());
        assert_eq!(err.to_string(), "blackhole is uncountable");

        let err = PIndexError::UnknownIndexType("nope".to_string());
        assert_eq!(err.to_string(), "Unknown index type: nope");

        let err = PIndexError::OutOfOrder {
            partition: "7".to_string(),
            seq: 3,
            last: 9,
        };
        assert_eq!(
            err.to_string(),
            "Out of order mutation on partition 7: seq 3 < last 9"
        );
    }

    #[test]
    fn test_capability_absence() {
        assert!(PIndexError::Uncountable("x".into()).is_capability_absence());
        assert!(PIndexError::Unqueryable("x".into()).is_capability_absence());
        assert!(!PIndexError::Cancelled.is_capability_absence());
        assert!(!PIndexError::NotFound("x".into()).is_capability_absence());
    }

    #[test]
    fn test_from_serde_error() {
        let json_err = serde_json::from_str::<i32>("not a number").unwrap_err();
        let err: PIndexError = json_err.into();
        assert!(matches!(err, PIndexError::Serialization(_)));
    }
}
