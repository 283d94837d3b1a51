//! Command implementations.
//!
//! Every command writes to a caller-supplied writer so tests can capture
//! the output; `run` wires them to stdout.

use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::{debug, info, warn};

use pindex_core::{
    init_logging, register_builtin_types, CancellationToken, PIndex, PIndexImplRegistry,
    RestartNotifier, PINDEX_DIR_SUFFIX,
};
use pindex_fulltext::register_fulltext;
use pindex_kv::register_kv;
use pindex_types::{PIndexMeta, Settings};

use crate::cli::{Cli, Commands};

/// Registry with every type this build knows about.
pub fn build_registry(settings: &Settings) -> PIndexImplRegistry {
    let mut registry = PIndexImplRegistry::new();
    register_builtin_types(&mut registry);
    register_kv(&mut registry, settings.kv.clone());
    register_fulltext(&mut registry, settings.fulltext.clone());
    registry
}

/// Open a pindex for inspection. Restart requests from a CLI session have
/// nowhere to go, so the notifier is detached.
fn open_pindex(registry: &PIndexImplRegistry, path: &Path) -> Result<PIndex> {
    let meta = PIndex::read_meta(path)
        .with_context(|| format!("Failed to read pindex metadata in {:?}", path))?;
    PIndex::open(registry, path, RestartNotifier::detached(meta.name))
        .with_context(|| format!("Failed to open pindex {:?}", path))
}

fn close_quietly(pindex: &PIndex) {
    if let Err(e) = pindex.close(false) {
        warn!(pindex = %pindex.name(), error = %e, "Close failed");
    }
}

pub fn list_types(registry: &PIndexImplRegistry, out: &mut impl Write) -> Result<()> {
    for (name, description) in registry.types() {
        writeln!(out, "{:<12} {}", name, description)?;
    }
    Ok(())
}

/// Print `name  type  index  partitions` for each pindex under `data_dir`.
pub fn list_pindexes(data_dir: &Path, out: &mut impl Write) -> Result<()> {
    let entries = std::fs::read_dir(data_dir)
        .with_context(|| format!("Failed to read data directory {:?}", data_dir))?;

    let mut metas: Vec<PIndexMeta> = Vec::new();
    for entry in entries {
        let path = entry?.path();
        let is_pindex = path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.ends_with(PINDEX_DIR_SUFFIX));
        if !path.is_dir() || !is_pindex {
            continue;
        }
        match PIndex::read_meta(&path) {
            Ok(meta) => metas.push(meta),
            Err(e) => warn!(path = ?path, error = %e, "Skipping unreadable pindex"),
        }
    }
    metas.sort_by(|a, b| a.name.cmp(&b.name));

    for meta in &metas {
        writeln!(
            out,
            "{}\t{}\t{}\t{}",
            meta.name,
            meta.index_type,
            meta.index_name,
            meta.source_partitions.join(",")
        )?;
    }
    debug!(data_dir = ?data_dir, count = metas.len(), "Listed pindexes");
    Ok(())
}

#[derive(Debug, Serialize)]
struct PartitionReport {
    partition: String,
    last_seq: u64,
    opaque_len: usize,
}

#[derive(Debug, Serialize)]
struct InspectReport<'a> {
    meta: &'a PIndexMeta,
    partitions: Vec<PartitionReport>,
}

pub fn inspect(registry: &PIndexImplRegistry, path: &Path, out: &mut impl Write) -> Result<()> {
    let pindex = open_pindex(registry, path)?;

    let report = (|| -> Result<()> {
        let mut partitions = Vec::with_capacity(pindex.meta().source_partitions.len());
        for partition in &pindex.meta().source_partitions {
            let checkpoint = pindex
                .dest()
                .get_opaque(partition)
                .with_context(|| format!("Failed to read checkpoint of partition {}", partition))?;
            partitions.push(PartitionReport {
                partition: partition.clone(),
                last_seq: checkpoint.last_seq,
                opaque_len: checkpoint.opaque.len(),
            });
        }
        let report = InspectReport {
            meta: pindex.meta(),
            partitions,
        };
        serde_json::to_writer_pretty(&mut *out, &report)?;
        writeln!(out)?;
        Ok(())
    })();

    close_quietly(&pindex);
    report
}

pub async fn count(registry: &PIndexImplRegistry, path: &Path, out: &mut impl Write) -> Result<()> {
    let pindex = open_pindex(registry, path)?;
    let result = pindex
        .dest()
        .count(&pindex, &CancellationToken::new())
        .await
        .with_context(|| format!("Count failed for {}", pindex.name()));
    close_quietly(&pindex);

    writeln!(out, "{}", result?)?;
    Ok(())
}

pub async fn query(
    registry: &PIndexImplRegistry,
    path: &Path,
    request: &str,
    out: &mut (dyn Write + Send),
) -> Result<()> {
    let pindex = open_pindex(registry, path)?;
    let result = pindex
        .dest()
        .query(&pindex, request.as_bytes(), &mut *out, &CancellationToken::new())
        .await
        .with_context(|| format!("Query failed for {}", pindex.name()));
    close_quietly(&pindex);

    result?;
    writeln!(out)?;
    Ok(())
}

/// Load settings, initialize logging and dispatch.
pub async fn run(cli: Cli) -> Result<()> {
    let mut settings = Settings::load(cli.config.as_deref()).context("Failed to load configuration")?;
    if let Some(log_level) = cli.log_level {
        settings.log_level = log_level;
    }
    init_logging(&settings.log_level).context("Failed to set tracing subscriber")?;

    let registry = build_registry(&settings);
    let mut stdout = std::io::stdout();
    info!(types = registry.len(), "Registry ready");

    match cli.command {
        Commands::Types => list_types(&registry, &mut stdout),
        Commands::List { data_dir } => {
            let data_dir = data_dir.unwrap_or_else(|| settings.expanded_data_dir());
            list_pindexes(&data_dir, &mut stdout)
        }
        Commands::Inspect { path } => inspect(&registry, &path, &mut stdout),
        Commands::Count { path } => count(&registry, &path, &mut stdout).await,
        Commands::Query { path, request } => query(&registry, &path, &request, &mut stdout).await,
    }
}
