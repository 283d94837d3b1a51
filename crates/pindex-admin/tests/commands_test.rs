//! Admin commands against real pindex directories.

use std::path::{Path, PathBuf};

use tempfile::TempDir;

use pindex_admin::{build_registry, count, inspect, list_pindexes, list_types, query};
use pindex_core::{PIndex, PIndexImplRegistry, RestartNotifier};
use pindex_types::{IndexDef, PIndexMeta, Settings};

fn create(registry: &PIndexImplRegistry, dir: &Path, name: &str, index_type: &str) -> PathBuf {
    let def = IndexDef::new("beers", index_type, "");
    let meta = PIndexMeta::for_index(&def, name, vec!["0".into(), "1".into()]);
    let path = dir.join(format!("{}.pindex", name));
    let pindex = PIndex::create(registry, meta, &path, RestartNotifier::detached(name)).unwrap();

    let dest = pindex.dest();
    if index_type != "blackhole" {
        dest.on_data_update("0", b"ale:1", 1, b"pale ale").unwrap();
        dest.on_data_update("1", b"stout:1", 1, b"oatmeal stout").unwrap();
        dest.set_opaque("0", b"cursor").unwrap();
    }
    pindex.close(false).unwrap();
    path
}

#[test]
fn test_types_lists_every_backend() {
    let registry = build_registry(&Settings::default());
    let mut out = Vec::new();
    list_types(&registry, &mut out).unwrap();

    let out = String::from_utf8(out).unwrap();
    for name in ["blackhole", "fulltext", "kv"] {
        assert!(out.contains(name), "missing {} in {}", name, out);
    }
}

#[test]
fn test_list_skips_foreign_directories() {
    let dir = TempDir::new().unwrap();
    let registry = build_registry(&Settings::default());
    create(&registry, dir.path(), "beers_1", "kv");
    create(&registry, dir.path(), "beers_0", "blackhole");
    std::fs::create_dir(dir.path().join("scratch")).unwrap();
    std::fs::create_dir(dir.path().join("broken.pindex")).unwrap();

    let mut out = Vec::new();
    list_pindexes(dir.path(), &mut out).unwrap();
    let out = String::from_utf8(out).unwrap();
    let names: Vec<&str> = out.lines().map(|l| l.split('\t').next().unwrap()).collect();
    assert_eq!(names, vec!["beers_0", "beers_1"]);
}

#[test]
fn test_inspect_reports_checkpoints() {
    let dir = TempDir::new().unwrap();
    let registry = build_registry(&Settings::default());
    let path = create(&registry, dir.path(), "beers_0", "kv");

    let mut out = Vec::new();
    inspect(&registry, &path, &mut out).unwrap();
    let report: serde_json::Value = serde_json::from_slice(&out).unwrap();

    assert_eq!(report["meta"]["name"], "beers_0");
    assert_eq!(report["partitions"][0]["partition"], "0");
    assert_eq!(report["partitions"][0]["last_seq"], 1);
    assert_eq!(report["partitions"][0]["opaque_len"], 6);
    assert_eq!(report["partitions"][1]["last_seq"], 0);
}

#[tokio::test]
async fn test_count_and_query() {
    let dir = TempDir::new().unwrap();
    let registry = build_registry(&Settings::default());
    let kv = create(&registry, dir.path(), "beers_kv", "kv");
    let ft = create(&registry, dir.path(), "beers_ft", "fulltext");

    let mut out = Vec::new();
    count(&registry, &kv, &mut out).await.unwrap();
    assert_eq!(String::from_utf8(out).unwrap().trim(), "2");

    let mut out: Vec<u8> = Vec::new();
    query(&registry, &ft, r#"{"query":"stout"}"#, &mut out).await.unwrap();
    let result: serde_json::Value = serde_json::from_slice(&out).unwrap();
    assert_eq!(result["total_hits"], 1);
    assert_eq!(result["hits"][0]["key"], "stout:1");
}

#[tokio::test]
async fn test_blackhole_count_is_an_error() {
    let dir = TempDir::new().unwrap();
    let registry = build_registry(&Settings::default());
    let path = create(&registry, dir.path(), "void", "blackhole");

    let mut out = Vec::new();
    let err = count(&registry, &path, &mut out).await.unwrap_err();
    assert!(format!("{:#}", err).contains("void"));
    assert!(out.is_empty());
}

#[test]
fn test_inspect_missing_dir_fails() {
    let dir = TempDir::new().unwrap();
    let registry = build_registry(&Settings::default());
    let mut out = Vec::new();
    assert!(inspect(&registry, &dir.path().join("nope.pindex"), &mut out).is_err());
}
