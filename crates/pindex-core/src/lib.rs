//! # pindex-core
//!
//! The contract between pluggable partition-index backends and the layers
//! that feed and query them.
//!
//! ## Key Components
//!
//! - [`PIndexImplRegistry`]: explicit registry of index types, built at startup
//! - [`PIndexImplType`]: per-type descriptor (new, open, count, query)
//! - [`Dest`]: ordered ingestion, checkpoints, rollback and consistency waits
//! - [`PIndex`]: live handle binding a name and path to a backend instance
//! - [`PIndexManager`]: owns pindexes and rebuilds them on restart requests
//! - [`SeqTracker`]: per-partition sequence state backends embed for waits
//! - [`BlackHole`]: reference backend that discards everything
//!
//! ## Example
//!
//! ```ignore
//! let mut registry = PIndexImplRegistry::new();
//! register_builtin_types(&mut registry);
//! let registry = Arc::new(registry);
//!
//! let pair = registry.new_pindex_impl("blackhole", "", path, RestartNotifier::detached("p1"))?;
//! pair.dest.on_data_update("0", b"k", 1, b"v")?;
//! pair.pimpl.close()?;
//! ```

pub mod blackhole;
pub mod cfg;
pub mod dest;
pub mod logging;
pub mod manager;
pub mod pindex;
pub mod registry;
pub mod restart;
pub mod tracker;

pub use blackhole::{BlackHole, BlackHoleType, BLACKHOLE_MARKER};
pub use cfg::{impl_type_for_index, IndexDefSource, MemIndexDefs};
pub use dest::{Dest, PIndexImpl};
pub use logging::init_logging;
pub use manager::{PIndexManager, PINDEX_DIR_SUFFIX};
pub use pindex::{PIndex, PINDEX_META};
pub use registry::{register_builtin_types, PIndexImplPair, PIndexImplRegistry, PIndexImplType};
pub use restart::{RestartNotifier, RestartRequest};
pub use tracker::SeqTracker;

pub use tokio_util::sync::CancellationToken;
