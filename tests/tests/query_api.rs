//! HTTP query API tests: `type=live|archive|list` dispatch and the
//! plain-text error responses for malformed requests.

use axum::http::StatusCode;
use axum_test::TestServer;

use integration_tests::setup::TestContext;
use metricsd_registry::Family;

#[tokio::test(start_paused = true)]
async fn missing_type_param_is_a_bad_request() {
    let dir = tempfile::tempdir().unwrap();
    let ctx = TestContext::open(dir.path());
    let server = TestServer::new(ctx.router.clone()).unwrap();

    let response = server.get("/").await;
    response.assert_status(StatusCode::BAD_REQUEST);

    ctx.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn unknown_type_is_a_bad_request() {
    let dir = tempfile::tempdir().unwrap();
    let ctx = TestContext::open(dir.path());
    let server = TestServer::new(ctx.router.clone()).unwrap();

    let response = server.get("/?type=nonsense").await;
    response.assert_status(StatusCode::BAD_REQUEST);

    ctx.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn live_without_metric_is_a_bad_request() {
    let dir = tempfile::tempdir().unwrap();
    let ctx = TestContext::open(dir.path());
    let server = TestServer::new(ctx.router.clone()).unwrap();

    let response = server.get("/?type=live&channels=counter").await;
    response.assert_status(StatusCode::BAD_REQUEST);

    ctx.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn live_with_an_unknown_channel_is_a_bad_request() {
    let dir = tempfile::tempdir().unwrap();
    let ctx = TestContext::open(dir.path());
    let server = TestServer::new(ctx.router.clone()).unwrap();

    let response = server.get("/?type=live&metric=requests&channels=bogus").await;
    response.assert_status(StatusCode::BAD_REQUEST);

    ctx.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn archive_requires_from_length_and_granularity() {
    let dir = tempfile::tempdir().unwrap();
    let ctx = TestContext::open(dir.path());
    let server = TestServer::new(ctx.router.clone()).unwrap();

    let response = server.get("/?type=archive&metric=requests&channels=counter").await;
    response.assert_status(StatusCode::BAD_REQUEST);

    ctx.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn list_with_no_pattern_defaults_to_everything() {
    let dir = tempfile::tempdir().unwrap();
    let ctx = TestContext::open(dir.path());

    ctx.handle.inject(Family::Counter, "orders", 3.0, 1.0).unwrap();
    // Cross at least one minute boundary so the counter channel flushes
    // and persists — consecutive tick timestamps always include a
    // multiple of 60 within any 60-tick span.
    ctx.advance_seconds(61).await;

    let server = TestServer::new(ctx.router.clone()).unwrap();
    let response = server.get("/?type=list").await;
    response.assert_status_ok();
    assert!(response.text().contains("orders:counter"));

    ctx.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn list_pattern_filters_to_matching_names() {
    let dir = tempfile::tempdir().unwrap();
    let ctx = TestContext::open(dir.path());

    ctx.handle.inject(Family::Counter, "orders", 3.0, 1.0).unwrap();
    ctx.handle.inject(Family::Counter, "refunds", 1.0, 1.0).unwrap();
    ctx.advance_seconds(61).await;

    let server = TestServer::new(ctx.router.clone()).unwrap();
    let response = server.get("/?type=list&pattern=orders:*").await;
    response.assert_status_ok();
    let body = response.text();
    assert!(body.contains("orders:counter"));
    assert!(!body.contains("refunds:counter"));

    ctx.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn archive_over_websocket_streams_aggregated_rows() {
    let dir = tempfile::tempdir().unwrap();
    let ctx = TestContext::open(dir.path());

    ctx.handle.inject(Family::Counter, "requests", 1.0, 1.0).unwrap();
    ctx.handle.inject(Family::Counter, "requests", 1.0, 1.0).unwrap();

    // watch() subscribes without needing any particular minute
    // alignment: offset 0 just anchors the window grid at the epoch.
    let mut watcher = ctx.handle.watch("requests", &["counter".to_string()], 0, 1).unwrap();
    ctx.advance_seconds(61).await;

    let row = watcher.recv().await.expect("archive row");
    assert_eq!(row.1.len(), 1);

    watcher.close();
    ctx.shutdown().await;
}
