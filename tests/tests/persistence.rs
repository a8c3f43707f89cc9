//! Datastore and live-log durability across an engine restart against
//! the same data directory (spec.md §4.3 "tail_data" recovery; §4.4
//! live-log snapshot save/restore).

use integration_tests::setup::TestContext;
use metricsd_registry::Family;

#[tokio::test(start_paused = true)]
async fn persisted_counter_survives_restart() {
    let dir = tempfile::tempdir().unwrap();

    let ctx = TestContext::open(dir.path());
    ctx.handle.inject(Family::Counter, "orders", 5.0, 1.0).unwrap();
    // Cross at least one minute boundary so the flush actually persists.
    ctx.advance_seconds(61).await;
    let before = ctx.handle.list_names("orders:*").unwrap();
    assert!(before.contains(&"orders:counter".to_string()));
    ctx.shutdown().await;

    let ctx2 = TestContext::open(dir.path());
    let after = ctx2.handle.list_names("orders:*").unwrap();
    assert!(after.contains(&"orders:counter".to_string()));
    ctx2.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn live_log_survives_restart_without_error() {
    let dir = tempfile::tempdir().unwrap();

    let ctx = TestContext::open(dir.path());
    ctx.handle.inject(Family::Counter, "orders", 5.0, 1.0).unwrap();
    ctx.advance_seconds(5).await;
    ctx.shutdown().await;

    let ctx2 = TestContext::open(dir.path());
    let (rows, _oldest_ts) = ctx2
        .handle
        .live_log("orders", &["counter".to_string()])
        .expect("live log survives a restart");
    assert_eq!(rows.len(), metricsd_core::LIVE_LOG_SIZE);
    ctx2.shutdown().await;
}
