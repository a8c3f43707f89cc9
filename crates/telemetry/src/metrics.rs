//! Internal self-observability metrics for metricsd itself — not to be
//! confused with the StatsD-family metrics the service ingests.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// A counter metric.
#[derive(Debug, Default)]
pub struct Counter(AtomicU64);

impl Counter {
    pub fn new() -> Self {
        Self(AtomicU64::new(0))
    }

    pub fn inc(&self) {
        self.0.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_by(&self, n: u64) {
        self.0.fetch_add(n, Ordering::Relaxed);
    }

    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }

    pub fn reset(&self) -> u64 {
        self.0.swap(0, Ordering::Relaxed)
    }
}

/// A gauge metric (can go up or down).
#[derive(Debug, Default)]
pub struct Gauge(AtomicU64);

impl Gauge {
    pub fn new() -> Self {
        Self(AtomicU64::new(0))
    }

    pub fn set(&self, val: u64) {
        self.0.store(val, Ordering::Relaxed);
    }

    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }

    pub fn inc(&self) {
        self.0.fetch_add(1, Ordering::Relaxed);
    }

    pub fn dec(&self) {
        self.0.fetch_sub(1, Ordering::Relaxed);
    }
}

/// Histogram for latency tracking.
#[derive(Debug)]
pub struct Histogram {
    /// Buckets: 1ms, 5ms, 10ms, 25ms, 50ms, 100ms, 250ms, 500ms, 1s, 5s, 10s
    buckets: [AtomicU64; 11],
    sum: AtomicU64,
    count: AtomicU64,
}

impl Default for Histogram {
    fn default() -> Self {
        Self::new()
    }
}

impl Histogram {
    const BUCKET_BOUNDS: [u64; 11] = [1, 5, 10, 25, 50, 100, 250, 500, 1000, 5000, 10000];

    pub fn new() -> Self {
        Self {
            buckets: Default::default(),
            sum: AtomicU64::new(0),
            count: AtomicU64::new(0),
        }
    }

    /// Records a value in milliseconds.
    pub fn observe(&self, ms: u64) {
        self.sum.fetch_add(ms, Ordering::Relaxed);
        self.count.fetch_add(1, Ordering::Relaxed);

        for (i, &bound) in Self::BUCKET_BOUNDS.iter().enumerate() {
            if ms <= bound {
                self.buckets[i].fetch_add(1, Ordering::Relaxed);
                return;
            }
        }
        // Value exceeds all buckets, add to last
        self.buckets[10].fetch_add(1, Ordering::Relaxed);
    }

    pub fn count(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }

    pub fn sum(&self) -> u64 {
        self.sum.load(Ordering::Relaxed)
    }

    pub fn mean(&self) -> f64 {
        let count = self.count();
        if count == 0 {
            0.0
        } else {
            self.sum() as f64 / count as f64
        }
    }

    /// Returns bucket counts.
    pub fn buckets(&self) -> Vec<(u64, u64)> {
        Self::BUCKET_BOUNDS
            .iter()
            .zip(self.buckets.iter())
            .map(|(&bound, count)| (bound, count.load(Ordering::Relaxed)))
            .collect()
    }
}

/// Collected metrics for metricsd itself.
#[derive(Debug, Default)]
pub struct Metrics {
    // Ingress
    pub lines_received: Counter,
    pub lines_parsed: Counter,
    pub lines_rejected: Counter,
    pub udp_datagrams_received: Counter,
    pub tcp_lines_overflowed: Counter,

    // Engine
    pub injects: Counter,
    pub entries_evicted: Counter,
    pub active_watchers: Gauge,
    pub tick_latency_ms: Histogram,

    // Datastore
    pub datastore_writes: Counter,
    pub datastore_write_errors: Counter,
    pub datastore_write_latency_ms: Histogram,

    // HTTP/WS query API
    pub queries_received: Counter,
    pub query_errors: Counter,
    pub active_ws_streams: Gauge,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }
}

/// A snapshot of metrics at a point in time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub timestamp: DateTime<Utc>,
    pub lines_received: u64,
    pub lines_parsed: u64,
    pub lines_rejected: u64,
    pub injects: u64,
    pub entries_evicted: u64,
    pub active_watchers: u64,
    pub tick_latency_mean_ms: f64,
    pub datastore_writes: u64,
    pub datastore_write_errors: u64,
    pub datastore_write_latency_mean_ms: f64,
    pub queries_received: u64,
    pub query_errors: u64,
    pub active_ws_streams: u64,
}

impl Metrics {
    /// Takes a snapshot of current metrics.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            timestamp: Utc::now(),
            lines_received: self.lines_received.get(),
            lines_parsed: self.lines_parsed.get(),
            lines_rejected: self.lines_rejected.get(),
            injects: self.injects.get(),
            entries_evicted: self.entries_evicted.get(),
            active_watchers: self.active_watchers.get(),
            tick_latency_mean_ms: self.tick_latency_ms.mean(),
            datastore_writes: self.datastore_writes.get(),
            datastore_write_errors: self.datastore_write_errors.get(),
            datastore_write_latency_mean_ms: self.datastore_write_latency_ms.mean(),
            queries_received: self.queries_received.get(),
            query_errors: self.query_errors.get(),
            active_ws_streams: self.active_ws_streams.get(),
        }
    }
}

/// Global metrics registry.
pub static METRICS: std::sync::LazyLock<Metrics> = std::sync::LazyLock::new(Metrics::new);

/// Get the global metrics instance.
pub fn metrics() -> &'static Metrics {
    &METRICS
}
