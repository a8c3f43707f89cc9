//! End-to-end ingestion tests: wire protocol in over TCP/UDP, through
//! the engine, out through the HTTP query API.

use std::net::SocketAddr;
use std::time::Duration;

use axum_test::TestServer;
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream, UdpSocket};

use integration_tests::setup::TestContext;
use metricsd_registry::Family;

async fn free_addr() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap()
}

/// Gives a just-spawned listener task a scheduling turn to finish
/// binding before the test connects to it.
async fn settle() {
    tokio::time::sleep(Duration::from_millis(1)).await;
}

#[tokio::test(start_paused = true)]
async fn direct_inject_shows_up_in_the_live_log_over_http() {
    let dir = tempfile::tempdir().unwrap();
    let ctx = TestContext::open(dir.path());

    ctx.handle.inject(Family::Counter, "requests", 1.0, 1.0).unwrap();
    ctx.handle.inject(Family::Counter, "requests", 2.0, 1.0).unwrap();
    ctx.advance_seconds(1).await;

    let server = TestServer::new(ctx.router.clone()).unwrap();
    let response = server.get("/?type=live&metric=requests&channels=counter").await;
    response.assert_status_ok();

    let body = response.text();
    let rows: Vec<&str> = body.lines().collect();
    assert_eq!(rows.len(), metricsd_core::LIVE_LOG_SIZE);
    assert!(rows.last().unwrap().ends_with(",3"));

    ctx.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn tcp_ingress_feeds_the_engine() {
    let dir = tempfile::tempdir().unwrap();
    let ctx = TestContext::open(dir.path());

    let addr = free_addr().await;
    let ingress_handle = ctx.handle.clone();
    tokio::spawn(async move {
        let _ = metricsd_protocol::serve_tcp(addr, ingress_handle).await;
    });
    settle().await;

    let mut stream = TcpStream::connect(addr).await.expect("connect to tcp ingress");
    stream.write_all(b"requests:1|c\nrequests:1|c\n").await.unwrap();
    stream.flush().await.unwrap();
    settle().await;

    ctx.advance_seconds(1).await;

    let server = TestServer::new(ctx.router.clone()).unwrap();
    let response = server.get("/?type=live&metric=requests&channels=counter").await;
    response.assert_status_ok();
    assert!(response.text().lines().last().unwrap().ends_with(",2"));

    ctx.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn tcp_ingress_drops_unparseable_lines_without_affecting_the_rest() {
    let dir = tempfile::tempdir().unwrap();
    let ctx = TestContext::open(dir.path());

    let addr = free_addr().await;
    let ingress_handle = ctx.handle.clone();
    tokio::spawn(async move {
        let _ = metricsd_protocol::serve_tcp(addr, ingress_handle).await;
    });
    settle().await;

    let mut stream = TcpStream::connect(addr).await.expect("connect to tcp ingress");
    stream
        .write_all(b"not a metric line\nrequests:5|c\nalso garbage|\n")
        .await
        .unwrap();
    stream.flush().await.unwrap();
    settle().await;

    ctx.advance_seconds(1).await;

    let server = TestServer::new(ctx.router.clone()).unwrap();
    let response = server.get("/?type=live&metric=requests&channels=counter").await;
    response.assert_status_ok();
    assert!(response.text().lines().last().unwrap().ends_with(",5"));

    ctx.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn udp_ingress_feeds_the_engine() {
    let dir = tempfile::tempdir().unwrap();
    let ctx = TestContext::open(dir.path());

    let addr = free_addr().await;
    let ingress_handle = ctx.handle.clone();
    tokio::spawn(async move {
        let _ = metricsd_protocol::serve_udp(addr, ingress_handle).await;
    });
    settle().await;

    let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    client.send_to(b"hits:1|c\nhits:1|c\nhits:1|c\n", addr).await.unwrap();
    settle().await;

    ctx.advance_seconds(1).await;

    let server = TestServer::new(ctx.router.clone()).unwrap();
    let response = server.get("/?type=live&metric=hits&channels=counter").await;
    response.assert_status_ok();
    assert!(response.text().lines().last().unwrap().ends_with(",3"));

    ctx.shutdown().await;
}
