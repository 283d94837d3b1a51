//! Operator CLI for partition indexes.
//!
//! ```bash
//! pindex-admin types
//! pindex-admin list [--data-dir DIR]
//! pindex-admin inspect <pindex-dir>
//! pindex-admin count <pindex-dir>
//! pindex-admin query <pindex-dir> '<json>'
//! ```

pub mod cli;
pub mod commands;

pub use cli::{Cli, Commands};
pub use commands::{build_registry, count, inspect, list_pindexes, list_types, query, run};
