//! Reference backend that accepts everything and keeps nothing.
//!
//! It obeys the whole Dest contract: mutations succeed and are counted,
//! snapshot/opaque/rollback are no-ops, there is never a checkpoint, waits
//! succeed immediately, and count/query report that the capability does not
//! exist rather than returning an empty result.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use pindex_types::{Checkpoint, ConsistencyLevel, ConsistencyStatus, PIndexError, Result};

use crate::dest::{Dest, PIndexImpl};
use crate::manager::PIndexManager;
use crate::pindex::PIndex;
use crate::registry::{PIndexImplPair, PIndexImplRegistry, PIndexImplType};
use crate::restart::RestartNotifier;

/// Marker file written by `New` and required (empty) by `Open`.
pub const BLACKHOLE_MARKER: &str = "black.hole";

const DESCRIPTION: &str =
    "blackhole - ignores all incoming data and is not queryable; used for testing";

/// Descriptor for the blackhole type.
#[derive(Debug, Default, Clone, Copy)]
pub struct BlackHoleType;

/// Register the blackhole descriptor under `blackhole` and `null`.
pub fn register_blackhole(registry: &mut PIndexImplRegistry) {
    let descriptor = Arc::new(BlackHoleType);
    registry.register("blackhole", descriptor.clone());
    registry.register("null", descriptor);
}

#[async_trait]
impl PIndexImplType for BlackHoleType {
    fn description(&self) -> &str {
        DESCRIPTION
    }

    fn new_impl(
        &self,
        _index_type: &str,
        _index_params: &str,
        path: &Path,
        _restart: RestartNotifier,
    ) -> Result<PIndexImplPair> {
        std::fs::create_dir_all(path)?;
        std::fs::write(path.join(BLACKHOLE_MARKER), b"")?;

        Ok(PIndexImplPair::shared(Arc::new(BlackHole::new(path))))
    }

    fn open_impl(
        &self,
        _index_type: &str,
        path: &Path,
        _restart: RestartNotifier,
    ) -> Result<PIndexImplPair> {
        let buf = std::fs::read(path.join(BLACKHOLE_MARKER))?;
        if !buf.is_empty() {
            return Err(PIndexError::Corrupt(format!(
                "expected {} to be empty",
                BLACKHOLE_MARKER
            )));
        }

        Ok(PIndexImplPair::shared(Arc::new(BlackHole::new(path))))
    }

    async fn count(
        &self,
        _mgr: &PIndexManager,
        _index_name: &str,
        _index_uuid: &str,
        _cancel: &CancellationToken,
    ) -> Result<u64> {
        Err(PIndexError::Uncountable("blackhole".to_string()))
    }

    async fn query(
        &self,
        _mgr: &PIndexManager,
        _index_name: &str,
        _index_uuid: &str,
        _req: &[u8],
        _res: &mut (dyn Write + Send),
        _cancel: &CancellationToken,
    ) -> Result<()> {
        Err(PIndexError::Unqueryable("blackhole".to_string()))
    }
}

/// Implements both Dest and PIndexImpl.
#[derive(Debug)]
pub struct BlackHole {
    path: PathBuf,
    tot_update: AtomicU64,
    tot_delete: AtomicU64,
}

impl BlackHole {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            tot_update: AtomicU64::new(0),
            tot_delete: AtomicU64::new(0),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Updates received since construction.
    pub fn total_updates(&self) -> u64 {
        self.tot_update.load(Ordering::Relaxed)
    }

    /// Deletes received since construction.
    pub fn total_deletes(&self) -> u64 {
        self.tot_delete.load(Ordering::Relaxed)
    }
}

impl PIndexImpl for BlackHole {
    fn close(&self) -> Result<()> {
        debug!(path = ?self.path, updates = self.total_updates(), "Closing blackhole");
        Ok(())
    }
}

#[async_trait]
impl Dest for BlackHole {
    fn on_snapshot_start(&self, _partition: &str, _start: u64, _end: u64) -> Result<()> {
        Ok(())
    }

    fn on_data_update(&self, _partition: &str, _key: &[u8], _seq: u64, _value: &[u8]) -> Result<()> {
        self.tot_update.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn on_data_delete(&self, _partition: &str, _key: &[u8], _seq: u64) -> Result<()> {
        self.tot_delete.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn set_opaque(&self, _partition: &str, _value: &[u8]) -> Result<()> {
        Ok(())
    }

    fn get_opaque(&self, _partition: &str) -> Result<Checkpoint> {
        Ok(Checkpoint::default())
    }

    fn rollback(&self, _partition: &str, _rollback_seq: u64) -> Result<()> {
        Ok(())
    }

    async fn consistency_wait(
        &self,
        _partition: &str,
        _level: ConsistencyLevel,
        _seq: u64,
        _cancel: &CancellationToken,
    ) -> Result<ConsistencyStatus> {
        Ok(ConsistencyStatus::default())
    }

    async fn count(&self, _pindex: &PIndex, _cancel: &CancellationToken) -> Result<u64> {
        Err(PIndexError::Uncountable("blackhole".to_string()))
    }

    async fn query(
        &self,
        _pindex: &PIndex,
        _req: &[u8],
        _res: &mut (dyn Write + Send),
        _cancel: &CancellationToken,
    ) -> Result<()> {
        Err(PIndexError::Unqueryable("blackhole".to_string()))
    }
}
