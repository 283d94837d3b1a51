//! # pindex-fulltext
//!
//! Full-text partition index backed by Tantivy.
//!
//! Values are indexed as text, one document per (partition, key). Writes
//! are buffered in the index writer and become searchable when a snapshot
//! completes, when `batch_max_ops` mutations are pending, or when a
//! checkpoint is stored. Consistency waits observe exactly that.

pub mod backend;
pub mod descriptor;
pub mod document;
pub mod error;
pub mod query;
pub mod schema;

pub use backend::{CommitPayload, FullTextDest, WriterOptions};
pub use descriptor::{
    register_fulltext, FullTextMeta, FullTextParams, FullTextType, FULLTEXT_META, FULLTEXT_TYPE,
    INDEX_DIR,
};
pub use error::FullTextError;
pub use query::{FullTextQuery, FullTextResult, Hit, DEFAULT_LIMIT};
pub use schema::{build_schema, FullTextSchema};
