//! # pindex-types
//!
//! Shared domain types for the partition-index plugin layer.
//!
//! This crate defines the values that cross the boundary between the feed
//! producer, the index backends and the query layer:
//! - Snapshot ranges and sequence bookkeeping for a partition
//! - Checkpoints: the opaque blob persisted with the last applied sequence
//! - Consistency levels and wait results
//! - Index definitions and persisted pindex metadata
//! - Settings: layered configuration
//!
//! ## Usage
//!
//! ```rust
//! use pindex_types::{Checkpoint, ConsistencyLevel};
//!
//! let cp = Checkpoint::default();
//! assert!(cp.is_empty());
//! assert_eq!(ConsistencyLevel::parse("at_plus").unwrap(), ConsistencyLevel::AtPlus);
//! ```

pub mod checkpoint;
pub mod config;
pub mod consistency;
pub mod error;
pub mod index_def;
pub mod partition;

pub use checkpoint::Checkpoint;
pub use config::{FullTextSettings, KvSettings, Settings};
pub use consistency::{ConsistencyLevel, ConsistencyStatus};
pub use error::{PIndexError, Result};
pub use index_def::{IndexDef, IndexDefs, PIndexMeta};
pub use partition::{PartitionProgress, SnapshotRange};
