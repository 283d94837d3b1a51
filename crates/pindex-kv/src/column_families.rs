//! Column family definitions for the kv store.
//!
//! - data: current value of every key, partition-prefixed
//! - history: undo records used for exact rollback
//! - seqs: per-partition applied sequence and history counter
//! - checkpoints: per-partition opaque + last_seq

use rocksdb::{ColumnFamilyDescriptor, Options};

pub const CF_DATA: &str = "data";

pub const CF_HISTORY: &str = "history";

pub const CF_SEQS: &str = "seqs";

pub const CF_CHECKPOINTS: &str = "checkpoints";

pub const ALL_CF_NAMES: &[&str] = &[CF_DATA, CF_HISTORY, CF_SEQS, CF_CHECKPOINTS];

/// History is written once and read back in reverse, compress it
fn history_options() -> Options {
    let mut opts = Options::default();
    opts.set_compression_type(rocksdb::DBCompressionType::Zstd);
    opts
}

pub fn build_cf_descriptors() -> Vec<ColumnFamilyDescriptor> {
    vec![
        ColumnFamilyDescriptor::new(CF_DATA, Options::default()),
        ColumnFamilyDescriptor::new(CF_HISTORY, history_options()),
        ColumnFamilyDescriptor::new(CF_SEQS, Options::default()),
        ColumnFamilyDescriptor::new(CF_CHECKPOINTS, Options::default()),
    ]
}
