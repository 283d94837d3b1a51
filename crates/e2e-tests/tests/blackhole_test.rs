//! Reference backend and construction-protocol scenarios.

use std::io::Write;

use pretty_assertions::assert_eq;

use e2e_tests::{test_registry, TestHarness};
use pindex_core::{CancellationToken, PIndex, RestartNotifier, BLACKHOLE_MARKER, PINDEX_META};
use pindex_types::{IndexDef, PIndexError, PIndexMeta};

#[tokio::test]
async fn test_blackhole_null_scenario() {
    let harness = TestHarness::new();
    harness.define_index("void", "blackhole", "");
    let pindex = harness.create_pindexes("void", 1).remove(0);

    let dest = pindex.dest();
    dest.on_snapshot_start("0", 1, 2).unwrap();
    dest.on_data_update("0", b"k", 1, b"v").unwrap();
    dest.on_data_delete("0", b"k", 2).unwrap();
    dest.set_opaque("0", b"ignored").unwrap();
    dest.rollback("0", 0).unwrap();
    assert!(dest.get_opaque("0").unwrap().is_empty());

    let err = harness
        .manager
        .count("void", &CancellationToken::new())
        .await
        .unwrap_err();
    assert!(err.is_capability_absence());
    assert!(matches!(err, PIndexError::Uncountable(_)));

    let mut out = Vec::new();
    let err = harness
        .manager
        .query("void", b"{}", &mut out, &CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, PIndexError::Unqueryable(_)));
    assert!(out.is_empty());

    let status = dest
        .consistency_wait(
            "0",
            pindex_types::ConsistencyLevel::AtPlus,
            1_000,
            &CancellationToken::new(),
        )
        .await
        .unwrap();
    assert_eq!(status.rollback_tried_seq, 0);

    harness.manager.shutdown().unwrap();
    assert!(pindex.is_closed());
}

#[test]
fn test_blackhole_reopen_checks_marker() {
    let harness = TestHarness::new();
    harness.define_index("void", "blackhole", "");
    let pindex = harness.create_pindexes("void", 1).remove(0);
    let path = pindex.path().to_path_buf();
    harness.manager.shutdown().unwrap();

    let registry = test_registry();
    let reopened = PIndex::open(&registry, &path, RestartNotifier::detached("void_0")).unwrap();
    reopened.close(false).unwrap();

    let mut marker = std::fs::OpenOptions::new()
        .append(true)
        .open(path.join(BLACKHOLE_MARKER))
        .unwrap();
    marker.write_all(b"not empty").unwrap();
    drop(marker);

    let err = PIndex::open(&registry, &path, RestartNotifier::detached("void_0"))
        .err()
        .unwrap();
    assert!(matches!(err, PIndexError::Corrupt(_)), "{:?}", err);
}

#[test]
fn test_unknown_type_creates_nothing() {
    let harness = TestHarness::new();
    let def = IndexDef::new("ghost", "vector", "");
    let meta = PIndexMeta::for_index(&def, "ghost_0", vec!["0".into()]);
    let path = harness.data_dir.join("ghost_0.pindex");

    let err = PIndex::create(
        &harness.registry,
        meta,
        &path,
        RestartNotifier::detached("ghost_0"),
    )
    .err()
    .unwrap();
    assert!(matches!(err, PIndexError::UnknownIndexType(_)));
    assert!(!path.exists());

    // the manager path fails the same way, through the index definition
    harness.define_index("ghost", "vector", "");
    let err = harness
        .manager
        .create_pindex("ghost", "ghost_1", vec!["0".into()])
        .err()
        .unwrap();
    assert!(matches!(err, PIndexError::UnknownIndexType(_)));
    assert!(!harness.manager.pindex_path("ghost_1").exists());
}

#[test]
fn test_open_unknown_type_touches_nothing() {
    let harness = TestHarness::new();
    let path = harness.data_dir.join("alien.pindex");
    std::fs::create_dir_all(&path).unwrap();

    let def = IndexDef::new("alien", "geo", "");
    let meta = PIndexMeta::for_index(&def, "alien", vec![]);
    std::fs::write(path.join(PINDEX_META), meta.to_bytes().unwrap()).unwrap();

    let err = PIndex::open(&harness.registry, &path, RestartNotifier::detached("alien"))
        .err()
        .unwrap();
    assert!(matches!(err, PIndexError::UnknownIndexType(_)));

    let entries: Vec<_> = std::fs::read_dir(&path)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    assert_eq!(entries, vec![PINDEX_META.to_string()]);
}
