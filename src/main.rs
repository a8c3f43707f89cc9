//! metricsd — StatsD-family metrics ingestion, aggregation and query
//! service (spec.md §6 "CLI").
//!
//! Wires the datastore, aggregation engine, UDP/TCP wire-protocol
//! ingress, and the HTTP/WebSocket query API together, then runs until
//! SIGINT/SIGTERM, persisting in-flight state on the way out.

use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal;
use tracing::{error, info};

use metricsd_api::{router, AppState};
use metricsd_datastore::Datastore;
use metricsd_engine::{Engine, EngineConfig};
use metricsd_telemetry::{health, init_tracing_from_env};

/// Layered defaults read from an optional TOML file and `METRICSD_*`
/// environment variables, beneath whatever the CLI flags supply
/// (spec.md's ambient "Configuration" note — CLI takes precedence).
#[derive(Debug, Default, serde::Deserialize)]
struct FileDefaults {
    data: Option<PathBuf>,
    api: Option<String>,
    udp: Option<String>,
    tcp: Option<String>,
    nosync: Option<bool>,
}

fn load_file_defaults(config_path: &Option<PathBuf>) -> Result<FileDefaults> {
    let mut builder = config::Config::builder();
    if let Some(path) = config_path {
        builder = builder.add_source(config::File::from(path.clone()).required(true));
    } else {
        builder = builder.add_source(
            config::File::with_name("config/default")
                .required(false)
                .format(config::FileFormat::Toml),
        );
    }
    builder = builder.add_source(
        config::Environment::with_prefix("METRICSD")
            .try_parsing(true)
            .separator("_"),
    );
    let built = builder.build().context("failed to build configuration")?;
    built
        .try_deserialize()
        .or_else(|_| Ok(FileDefaults::default()))
}

/// `metricsd --data DIR [--api ADDR] [--udp ADDR] [--tcp ADDR] [--nosync]`
#[derive(Parser, Debug)]
#[command(name = "metricsd", version, about = "StatsD-family metrics ingestion, aggregation and query service")]
struct Cli {
    /// Data directory holding per-stream .dat/.idx files, tail_data, live_log.
    #[arg(long)]
    data: Option<PathBuf>,
    /// HTTP/WebSocket query API bind address.
    #[arg(long)]
    api: Option<String>,
    /// UDP ingress bind address.
    #[arg(long)]
    udp: Option<String>,
    /// TCP ingress bind address.
    #[arg(long)]
    tcp: Option<String>,
    /// Disable fsync on every datastore flush.
    #[arg(long, default_value_t = false)]
    nosync: bool,
    /// Optional TOML config file (defaults to `config/default.toml` if present).
    #[arg(long)]
    config: Option<PathBuf>,
}

const DEFAULT_API_ADDR: &str = ":5999";
const DEFAULT_UDP_ADDR: &str = ":6000";
const DEFAULT_TCP_ADDR: &str = ":6000";

/// `:PORT` binds all interfaces; anything else is parsed as a full
/// `host:port` pair.
fn parse_addr(addr: &str) -> Result<SocketAddr> {
    if let Some(port) = addr.strip_prefix(':') {
        format!("0.0.0.0:{port}").parse().context("invalid bind address")
    } else {
        addr.parse().context("invalid bind address")
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    init_tracing_from_env();

    let cli = Cli::parse();
    let defaults = load_file_defaults(&cli.config)?;

    let data_dir = cli
        .data
        .or(defaults.data)
        .context("--data DIR is required (or METRICSD_DATA / config file)")?;
    let api_addr = parse_addr(&cli.api.or(defaults.api).unwrap_or_else(|| DEFAULT_API_ADDR.to_string()))?;
    let udp_addr = parse_addr(&cli.udp.or(defaults.udp).unwrap_or_else(|| DEFAULT_UDP_ADDR.to_string()))?;
    let tcp_addr = parse_addr(&cli.tcp.or(defaults.tcp).unwrap_or_else(|| DEFAULT_TCP_ADDR.to_string()))?;
    let nosync = cli.nosync || defaults.nosync.unwrap_or(false);

    info!(?data_dir, %api_addr, %udp_addr, %tcp_addr, nosync, "starting metricsd");

    let datastore = Datastore::open(&data_dir, metricsd_datastore::DEFAULT_SHARDS, nosync)
        .context("failed to open datastore")?;
    health().datastore.set_healthy();

    let engine = Engine::start(
        datastore,
        EngineConfig {
            prefix: String::new(),
            live_log_path: data_dir.join("live_log"),
        },
    )
    .context("failed to start aggregation engine")?;
    health().engine.set_healthy();
    let engine_handle = engine.handle();

    let udp_handle = engine_handle.clone();
    let udp_task = tokio::spawn(async move {
        if let Err(e) = metricsd_protocol::serve_udp(udp_addr, udp_handle).await {
            error!(error = %e, "udp ingress exited");
        }
    });

    let tcp_handle = engine_handle.clone();
    let tcp_task = tokio::spawn(async move {
        if let Err(e) = metricsd_protocol::serve_tcp(tcp_addr, tcp_handle).await {
            error!(error = %e, "tcp ingress exited");
        }
    });
    health().ingress.set_healthy();

    {
        // Scoped so `state`/`app` (and their `EngineHandle` clone) are
        // dropped here, before `engine.shutdown()` needs to be the sole
        // owner of the inner `Arc`.
        let state = AppState::new(engine_handle);
        let app = router(state);
        let listener = tokio::net::TcpListener::bind(api_addr)
            .await
            .context("failed to bind HTTP query API")?;

        info!(%api_addr, "query API listening");
        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await
            .context("HTTP server error")?;
    }

    info!("shutting down");
    udp_task.abort();
    tcp_task.abort();
    let _ = udp_task.await;
    let _ = tcp_task.await;
    engine.shutdown().await.context("engine shutdown failed")?;
    info!("shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received SIGINT"),
        _ = terminate => info!("received SIGTERM"),
    }
}
