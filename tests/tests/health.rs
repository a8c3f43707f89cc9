//! Tests for health check endpoints.
//!
//! `health()` is process-global, so these only assert properties that
//! hold regardless of what other tests in this binary have flipped.

use axum::http::StatusCode;
use axum_test::TestServer;

use integration_tests::setup::TestContext;
use metricsd_telemetry::health;

#[tokio::test(start_paused = true)]
async fn health_reports_all_three_components() {
    let dir = tempfile::tempdir().unwrap();
    let ctx = TestContext::open(dir.path());
    let server = TestServer::new(ctx.router.clone()).unwrap();

    let response = server.get("/health").await;
    response.assert_status_ok();

    let body: serde_json::Value = response.json();
    assert!(body.get("status").is_some());
    let names: Vec<&str> = body["components"]
        .as_array()
        .unwrap()
        .iter()
        .map(|c| c["name"].as_str().unwrap())
        .collect();
    assert!(names.contains(&"datastore"));
    assert!(names.contains(&"engine"));
    assert!(names.contains(&"ingress"));

    ctx.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn ready_and_live_return_a_probe_status_code() {
    let dir = tempfile::tempdir().unwrap();
    let ctx = TestContext::open(dir.path());
    let server = TestServer::new(ctx.router.clone()).unwrap();

    let ready = server.get("/health/ready").await;
    assert!(matches!(ready.status_code(), StatusCode::OK | StatusCode::SERVICE_UNAVAILABLE));

    let live = server.get("/health/live").await;
    assert_eq!(live.status_code(), StatusCode::OK);

    ctx.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn engine_healthy_makes_ready_return_ok() {
    health().engine.set_healthy();

    let dir = tempfile::tempdir().unwrap();
    let ctx = TestContext::open(dir.path());
    let server = TestServer::new(ctx.router.clone()).unwrap();

    let response = server.get("/health/ready").await;
    response.assert_status_ok();

    ctx.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn health_endpoints_require_no_authentication() {
    let dir = tempfile::tempdir().unwrap();
    let ctx = TestContext::open(dir.path());
    let server = TestServer::new(ctx.router.clone()).unwrap();

    for path in ["/health", "/health/ready", "/health/live"] {
        let response = server.get(path).await;
        assert_ne!(response.status_code(), StatusCode::UNAUTHORIZED);
    }

    ctx.shutdown().await;
}
