//! # pindex-kv
//!
//! Key/value partition index backed by RocksDB.
//!
//! Every mutation is written in one batch with an undo record, so rollback
//! to any earlier sequence is exact. Checkpoints are stored per partition
//! together with the applied sequence they describe.
//!
//! ## Usage
//!
//! ```ignore
//! let mut registry = PIndexImplRegistry::new();
//! register_builtin_types(&mut registry);
//! pindex_kv::register_kv(&mut registry, settings.kv.clone());
//! ```

pub mod backend;
pub mod column_families;
pub mod descriptor;
pub mod error;
pub mod keys;
pub mod query;
pub mod store;

pub use backend::KvDest;
pub use descriptor::{register_kv, KvMeta, KvParams, KvType, KV_META, KV_TYPE, STORE_DIR};
pub use error::KvError;
pub use query::{KvQuery, KvRow, DEFAULT_SCAN_LIMIT};
pub use store::{KvStore, StoreOptions};
