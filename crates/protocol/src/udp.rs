//! UDP ingress: one datagram per batch, each line within it one metric
//! (spec.md §6, §9 "TCP/UDP listeners" — ported from `udp_injector.go`).

use std::net::SocketAddr;

use tokio::net::UdpSocket;

use metricsd_core::Result;
use metricsd_engine::EngineHandle;
use metricsd_telemetry::metrics;

use crate::parse::parse_line;

/// Matches the source's fixed datagram buffer; a StatsD line batch
/// rarely approaches this and UDP datagrams larger than it are
/// truncated by the kernel before we ever see them.
const UDP_BUF_SIZE: usize = 512;

/// Binds `addr` and injects every parsed line from every datagram into
/// `engine` until the socket errors or the task is cancelled.
pub async fn serve_udp(addr: SocketAddr, engine: EngineHandle) -> Result<()> {
    let socket = UdpSocket::bind(addr).await?;
    tracing::info!(%addr, "udp ingress listening");

    let mut buf = [0u8; UDP_BUF_SIZE];
    loop {
        let (n, peer) = socket.recv_from(&mut buf).await?;
        metrics().udp_datagrams_received.inc();
        let datagram = match std::str::from_utf8(&buf[..n]) {
            Ok(s) => s,
            Err(_) => {
                tracing::warn!(%peer, "dropped non-utf8 udp datagram");
                continue;
            }
        };
        for line in datagram.lines() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            inject_line(&engine, line);
        }
    }
}

fn inject_line(engine: &EngineHandle, line: &str) {
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
