//! TCP ingress: newline-delimited lines, one metric per line, with a
//! bounded line buffer and an overflow-drop policy (spec.md §6, §9
//! "TCP/UDP listeners" — ported from `tcp_injector.go`). Each
//! connection is an independent Tokio task rather than a
//! goroutine-per-connection.

use std::net::SocketAddr;

use tokio::io::AsyncReadExt;
use tokio::net::{TcpListener, TcpStream};

use metricsd_core::Result;
use metricsd_engine::EngineHandle;
use metricsd_telemetry::metrics;

use crate::parse::parse_line;

/// Matches the source's fixed per-connection line buffer. A line
/// longer than this is dropped in full, not truncated and injected.
const TCP_LINE_BUF_SIZE: usize = 128;

/// Binds `addr` and spawns one task per accepted connection, each
/// injecting parsed lines into `engine` until its peer disconnects.
pub async fn serve_tcp(addr: SocketAddr, engine: EngineHandle) -> Result<()> {
    let listener = TcpListener::bind(addr).await?;
    tracing::info!(%addr, "tcp ingress listening");

    loop {
        let (socket, peer) = listener.accept().await?;
        let engine = engine.clone();
        tokio::spawn(async move {
            if let Err(e) = handle_connection(socket, &engine).await {
                tracing::debug!(%peer, error = %e, "tcp connection closed");
            }
        });
    }
}

async fn handle_connection(mut socket: TcpStream, engine: &EngineHandle) -> Result<()> {
    let mut line = Vec::with_capacity(TCP_LINE_BUF_SIZE);
    let mut overflowing = false;
    let mut chunk = [0u8; 512];

    loop {
        let n = socket.read(&mut chunk).await?;
        if n == 0 {
            return Ok(());
        }
        for &b in &chunk[..n] {
            if b == b'\n' {
                if !overflowing {
                    process_line(engine, &line);
                }
                line.clear();
                overflowing = false;
                continue;
            }
            if overflowing {
                continue;
            }
            if line.len() == TCP_LINE_BUF_SIZE {
                tracing::debug!("dropping oversized tcp line");
                metrics().tcp_lines_overflowed.inc();
                overflowing = true;
                line.clear();
                continue;
            }
            line.push(b);
        }
    }
}

fn process_line(engine: &EngineHandle, raw: &[u8]) {
    let line = match std::str::from_utf8(raw) {
        Ok(s) => s.trim(),
        Err(_) => {
            tracing::warn!("dropped non-utf8 tcp line");
            return;
        }
    };
    if line.is_empty() {
        return;
    }
    metrics().lines_received.inc();
    match parse_line(line) {
        Ok(m) => {
            metrics().lines_parsed.inc();
            if let Err(e) = engine.inject(m.family, &m.name, m.value, m.sample_rate) {
                metrics().lines_rejected.inc();
                tracing::debug!(line, error = %e, "rejected injection");
            }
        }
        Err(e) => {
            metrics().lines_rejected.inc();
            tracing::debug!(line, error = %e, "dropped unparseable line");
        }
    }
}
