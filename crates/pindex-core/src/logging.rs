//! Tracing subscriber setup shared by binaries and test harnesses.

use tracing_subscriber::{fmt, EnvFilter};

use pindex_types::{PIndexError, Result};

/// Install a global fmt subscriber.
///
/// `RUST_LOG` wins over `level` when set.
pub fn init_logging(level: &str) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let subscriber = fmt().with_env_filter(filter).with_target(true).finish();

    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| PIndexError::Config(format!("failed to set tracing subscriber: {}", e)))
}
