//! Dest behaviour of the kv backend through a PIndex.

use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;
use tokio::sync::mpsc::UnboundedReceiver;

use pindex_core::{CancellationToken, PIndex, PIndexImplRegistry, RestartNotifier, RestartRequest};
use pindex_kv::{register_kv, KvRow, KV_TYPE};
use pindex_types::{ConsistencyLevel, IndexDef, KvSettings, PIndexError, PIndexMeta};

fn create(dir: &TempDir, params: &str) -> (PIndex, UnboundedReceiver<RestartRequest>) {
    let mut registry = PIndexImplRegistry::new();
    register_kv(&mut registry, KvSettings::default());
    let def = IndexDef::new("beers", KV_TYPE, params);
    let meta = PIndexMeta::for_index(&def, "beers_0", vec!["0".into(), "1".into()]);
    let (notifier, rx) = RestartNotifier::channel("beers_0");
    let pindex = PIndex::create(&registry, meta, &dir.path().join("beers_0.pindex"), notifier).unwrap();
    (pindex, rx)
}

async fn query(pindex: &PIndex, req: &str) -> Vec<KvRow> {
    let mut out = Vec::new();
    pindex
        .dest()
        .query(pindex, req.as_bytes(), &mut out, &CancellationToken::new())
        .await
        .unwrap();
    serde_json::from_slice(&out).unwrap()
}

#[tokio::test]
async fn test_checkpoint_reflects_last_applied() {
    let dir = TempDir::new().unwrap();
    let (pindex, _rx) = create(&dir, "");
    let dest = pindex.dest();

    dest.on_snapshot_start("0", 1, 3).unwrap();
    dest.on_data_update("0", b"a", 1, b"1").unwrap();
    dest.on_data_update("0", b"b", 2, b"2").unwrap();
    dest.on_data_delete("0", b"a", 3).unwrap();
    dest.set_opaque("0", b"failover-log").unwrap();

    let cp = dest.get_opaque("0").unwrap();
    assert_eq!(cp.last_seq, 3);
    assert_eq!(cp.opaque, b"failover-log".to_vec());
    assert!(dest.get_opaque("1").unwrap().is_empty());

    let rows = query(&pindex, r#"{"partition":"0"}"#).await;
    assert_eq!(rows, vec![KvRow::new("0", b"b", b"2")]);
    pindex.close(false).unwrap();
}

#[tokio::test]
async fn test_rollback_then_replay_is_idempotent() {
    let dir = TempDir::new().unwrap();
    let (pindex, _rx) = create(&dir, "");
    let dest = pindex.dest();

    let mutations = [(1u64, "a", "a1"), (2, "b", "b2"), (3, "a", "a3"), (4, "c", "c4")];
    for (seq, key, value) in mutations {
        dest.on_data_update("0", key.as_bytes(), seq, value.as_bytes()).unwrap();
    }
    let before = query(&pindex, "{}").await;

    dest.rollback("0", 2).unwrap();
    assert!(dest.get_opaque("0").unwrap().last_seq <= 2);
    assert_eq!(
        query(&pindex, "{}").await,
        vec![KvRow::new("0", b"a", b"a1"), KvRow::new("0", b"b", b"b2")]
    );

    for (seq, key, value) in mutations.into_iter().filter(|m| m.0 > 2) {
        dest.on_data_update("0", key.as_bytes(), seq, value.as_bytes()).unwrap();
    }
    assert_eq!(query(&pindex, "{}").await, before);
}

#[tokio::test]
async fn test_rollback_without_history_reports_zero() {
    let dir = TempDir::new().unwrap();
    let (pindex, _rx) = create(&dir, r#"{"history":false}"#);
    let dest = pindex.dest();

    dest.on_data_update("0", b"a", 1, b"x").unwrap();
    dest.on_data_update("0", b"b", 2, b"y").unwrap();
    dest.set_opaque("0", b"cursor").unwrap();
    dest.rollback("0", 1).unwrap();

    assert_eq!(dest.get_opaque("0").unwrap().last_seq, 0);
    assert!(query(&pindex, "{}").await.is_empty());
}

#[tokio::test]
async fn test_out_of_order_rejected() {
    let dir = TempDir::new().unwrap();
    let (pindex, _rx) = create(&dir, "");
    let dest = pindex.dest();

    dest.on_data_update("0", b"a", 10, b"x").unwrap();
    let err = dest.on_data_update("0", b"a", 9, b"y").unwrap_err();
    assert!(matches!(err, PIndexError::OutOfOrder { seq: 9, last: 10, .. }));
    // other partitions are independent
    dest.on_data_update("1", b"a", 1, b"z").unwrap();
}

#[tokio::test]
async fn test_consistency_wait_released_by_update() {
    let dir = TempDir::new().unwrap();
    let (pindex, _rx) = create(&dir, "");
    let pindex = Arc::new(pindex);

    let waiter = {
        let pindex = pindex.clone();
        tokio::spawn(async move {
            pindex
                .dest()
                .consistency_wait("0", ConsistencyLevel::AtPlus, 2, &CancellationToken::new())
                .await
        })
    };

    tokio::time::sleep(Duration::from_millis(20)).await;
    pindex.dest().on_data_update("0", b"a", 1, b"x").unwrap();
    pindex.dest().on_data_update("0", b"b", 2, b"y").unwrap();

    let status = tokio::time::timeout(Duration::from_secs(5), waiter)
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    assert!(status.cur_seq >= 2);
}

#[tokio::test]
async fn test_corrupt_history_fires_restart() {
    let dir = TempDir::new().unwrap();
    let (pindex, mut rx) = create(&dir, "");
    pindex.dest().on_data_update("0", b"a", 1, b"x").unwrap();
    pindex.close(false).unwrap();

    // overwrite the undo record with garbage through a raw handle
    {
        let store_path = pindex.path().join(pindex_kv::STORE_DIR);
        let db = rocksdb::DB::open_cf(
            &rocksdb::Options::default(),
            &store_path,
            pindex_kv::column_families::ALL_CF_NAMES,
        )
        .unwrap();
        let cf = db.cf_handle(pindex_kv::column_families::CF_HISTORY).unwrap();
        let key = pindex_kv::keys::HistoryKey::new("0", 0).to_bytes().unwrap();
        db.put_cf(cf, key, b"garbage").unwrap();
    }

    let mut registry = PIndexImplRegistry::new();
    register_kv(&mut registry, KvSettings::default());
    let (notifier, mut reopened_rx) = RestartNotifier::channel("beers_0");
    let reopened = PIndex::open(&registry, pindex.path(), notifier).unwrap();

    let err = reopened.dest().rollback("0", 0).unwrap_err();
    assert!(matches!(err, PIndexError::Corrupt(_)));
    let req = reopened_rx.try_recv().unwrap();
    assert_eq!(req.pindex_name, "beers_0");
    assert!(rx.try_recv().is_err());
    reopened.close(false).unwrap();
}

#[tokio::test]
async fn test_count_and_invalid_query() {
    let dir = TempDir::new().unwrap();
    let (pindex, _rx) = create(&dir, "");
    let dest = pindex.dest();
    let cancel = CancellationToken::new();

    dest.on_data_update("0", b"a", 1, b"x").unwrap();
    dest.on_data_update("1", b"b", 1, b"y").unwrap();
    assert_eq!(dest.count(&pindex, &cancel).await.unwrap(), 2);

    let mut out = Vec::new();
    let err = dest
        .query(&pindex, b"{\"key\":\"a\"}", &mut out, &cancel)
        .await
        .unwrap_err();
    assert!(matches!(err, PIndexError::InvalidQuery(_)));

    cancel.cancel();
    assert!(matches!(
        dest.count(&pindex, &cancel).await,
        Err(PIndexError::Cancelled)
    ));
}

#[tokio::test]
async fn test_rollback_past_applied_keeps_waiters() {
    let dir = TempDir::new().unwrap();
    let (pindex, _rx) = create(&dir, "");
    let pindex = Arc::new(pindex);
    pindex.dest().on_data_update("0", b"a", 10, b"x").unwrap();

    let waiter = {
        let pindex = pindex.clone();
        tokio::spawn(async move {
            pindex
                .dest()
                .consistency_wait("0", ConsistencyLevel::AtPlus, 12, &CancellationToken::new())
                .await
        })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;

    pindex.dest().rollback("0", 15).unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(!waiter.is_finished());
    assert_eq!(query(&pindex, "{}").await, vec![KvRow::new("0", b"a", b"x")]);

    pindex.dest().on_data_update("0", b"b", 12, b"y").unwrap();
    let status = tokio::time::timeout(Duration::from_secs(5), waiter)
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    assert_eq!(status.cur_seq, 12);
    assert_eq!(status.rollback_tried_seq, 0);
}

#[tokio::test]
async fn test_rollback_behind_retained_history_reports_zero() {
    let dir = TempDir::new().unwrap();
    let (pindex, _rx) = create(&dir, r#"{"history_retain_ops":2}"#);
    let dest = pindex.dest();

    for seq in 1..=6u64 {
        dest.on_data_update("0", format!("k{}", seq).as_bytes(), seq, b"v").unwrap();
    }
    dest.set_opaque("0", b"cursor").unwrap();

    // the last two mutations can still be undone exactly
    dest.rollback("0", 5).unwrap();
    assert_eq!(dest.get_opaque("0").unwrap().last_seq, 5);
    assert_eq!(query(&pindex, "{}").await.len(), 5);

    // older ones were dropped, so the partition starts over
    dest.rollback("0", 2).unwrap();
    let cp = dest.get_opaque("0").unwrap();
    assert_eq!(cp.last_seq, 0);
    assert_eq!(cp.opaque, b"cursor".to_vec());
    assert!(query(&pindex, "{}").await.is_empty());

    dest.on_data_update("0", b"k1", 1, b"v").unwrap();
}
