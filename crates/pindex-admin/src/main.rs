//! pindex-admin
//!
//! Configuration is loaded in order (later sources override earlier):
//! 1. Built-in defaults
//! 2. Config file (~/.config/pindex/config)
//! 3. `--config FILE`
//! 4. Environment variables (PINDEX_*)
//! 5. CLI flags

use anyhow::Result;
use clap::Parser;

use pindex_admin::{run, Cli};

#[tokio::main]
async fn main() -> Result<()> {
    run(Cli::parse()).await
}
