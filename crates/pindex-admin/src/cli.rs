//! CLI argument parsing for the admin tool.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Partition index admin
///
/// Inspects and queries pindex directories on local disk.
#[derive(Parser, Debug)]
#[command(name = "pindex-admin")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to config file (overrides default ~/.config/pindex/config)
    #[arg(short, long, global = true)]
    pub config: Option<String>,

    /// Set log level (trace, debug, info, warn, error)
    #[arg(short, long, global = true)]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// List registered index types
    Types,

    /// List the pindexes found in a data directory
    List {
        /// Override data directory
        #[arg(long)]
        data_dir: Option<PathBuf>,
    },

    /// Show a pindex's metadata and per-partition checkpoints
    Inspect {
        /// Path to a `<name>.pindex` directory
        path: PathBuf,
    },

    /// Count documents in a pindex
    Count {
        path: PathBuf,
    },

    /// Run a backend query against a pindex
    Query {
        path: PathBuf,

        /// Query request as JSON, e.g. '{"query":"pale ale"}'
        request: String,
    },
}
