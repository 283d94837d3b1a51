//! Full-text backend error types.

use thiserror::Error;

use pindex_types::PIndexError;

/// Errors that can occur in the full-text backend.
#[derive(Debug, Error)]
pub enum FullTextError {
    /// Tantivy index error
    #[error("Tantivy error: {0}")]
    Tantivy(#[from] tantivy::TantivyError),

    /// Query parse error
    #[error("Query parse error: {0}")]
    QueryParse(#[from] tantivy::query::QueryParserError),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Schema mismatch
    #[error("Schema mismatch: {0}")]
    SchemaMismatch(String),

    /// FULLTEXT_META missing or invalid
    #[error("Invalid fulltext metadata: {0}")]
    Meta(String),

    /// Commit payload could not be encoded or decoded
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Writer lock poisoned
    #[error("Writer lock poisoned: {0}")]
    WriterLocked(String),

    /// Partition id or key cannot be encoded as a document id
    #[error("Invalid document key: {0}")]
    Key(String),

    /// Blocking search task did not finish
    #[error("Search task failed: {0}")]
    Task(String),
}

impl From<serde_json::Error> for FullTextError {
    fn from(err: serde_json::Error) -> Self {
        FullTextError::Serialization(err.to_string())
    }
}

impl From<FullTextError> for PIndexError {
    fn from(err: FullTextError) -> Self {
        match err {
            FullTextError::QueryParse(e) => PIndexError::InvalidQuery(e.to_string()),
            FullTextError::Io(e) => PIndexError::Io(e),
            FullTextError::SchemaMismatch(msg) | FullTextError::Meta(msg) => {
                PIndexError::Corrupt(msg)
            }
            FullTextError::Serialization(msg) => PIndexError::Serialization(msg),
            other => PIndexError::Storage(other.to_string()),
        }
    }
}
