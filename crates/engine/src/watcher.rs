//! Streaming subscriptions: live (every second) and archive (every
//! `gran*60` seconds aligned at `offs`) — spec.md §3 "Watcher", §4.2
//! "Watcher creation"/"Watcher output loop".

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc;

use metricsd_registry::Aggregator;

static NEXT_WATCHER_ID: AtomicU64 = AtomicU64::new(1);

pub fn next_id() -> u64 {
    NEXT_WATCHER_ID.fetch_add(1, Ordering::Relaxed)
}

#[derive(Debug, Clone, Copy)]
pub enum WatcherKind {
    Live,
    Archive { gran: i64 },
}

/// One emitted row: the timestamp it's aligned to and the caller's
/// requested channel values.
pub type WatcherRow = (i64, Vec<f64>);

/// The engine-side half of a watcher: lives in a [`crate::entry::MetricEntry`]'s
/// watcher list, fed by the tick/flush pass, writing into an unbounded
/// FIFO that a consumer drains independently (spec.md §4.2 "Watcher
/// output loop" — "an internal unbounded FIFO buffer decouples engine
/// ticks from consumer drain").
pub struct WatcherHandle {
    pub id: u64,
    pub kind: WatcherKind,
    pub chs: Vec<usize>,
    /// Timestamp of the next value this watcher will emit.
    pub ts: i64,
    aggregator: Option<Box<dyn Aggregator>>,
    sender: mpsc::UnboundedSender<WatcherRow>,
}

impl WatcherHandle {
    pub fn new_live(id: u64, chs: Vec<usize>, ts: i64, sender: mpsc::UnboundedSender<WatcherRow>) -> Self {
        Self {
            id,
            kind: WatcherKind::Live,
            chs,
            ts,
            aggregator: None,
            sender,
        }
    }

    pub fn new_archive(
        id: u64,
        chs: Vec<usize>,
        ts: i64,
        gran: i64,
        aggregator: Box<dyn Aggregator>,
        sender: mpsc::UnboundedSender<WatcherRow>,
    ) -> Self {
        Self {
            id,
            kind: WatcherKind::Archive { gran },
            chs,
            ts,
            aggregator: Some(aggregator),
            sender,
        }
    }

    /// Feeds a per-second tick value (live watchers only); delivers
    /// immediately since a live watcher's window is exactly one tick.
    pub fn feed_live(&mut self, ts: i64, tick_data: &[f64]) {
        debug_assert!(matches!(self.kind, WatcherKind::Live));
        let row: Vec<f64> = self.chs.iter().map(|&ch| tick_data[ch]).collect();
        let _ = self.sender.send((ts, row));
        self.ts = ts + 1;
    }

    /// Feeds a per-minute flush tuple into the archive aggregator;
    /// emits and advances `ts` by `gran*60` once the window completes.
    pub fn feed_archive(&mut self, ts: i64, flush_data: &[f64]) {
        let WatcherKind::Archive { gran } = self.kind else {
            return;
        };
        let Some(agg) = self.aggregator.as_mut() else {
            return;
        };
        agg.put(flush_data);
        if ts == self.ts {
            let full = agg.get();
            let row: Vec<f64> = self.chs.iter().map(|&ch| full[ch]).collect();
            let _ = self.sender.send((ts, row));
            self.ts += gran * 60;
        }
    }

    /// Whether the consumer side has dropped its receiver — lets the
    /// engine prune dead watchers instead of paying for a send that
    /// will never be observed.
    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }
}

/// Consumer-visible handle returned by [`crate::Engine::live_watch`]/
/// [`crate::Engine::watch`]. `Close` unlinks the watcher from its
/// entry and is idempotent (spec.md §5 "Cancellation").
pub struct Watcher {
    pub(crate) id: u64,
    pub(crate) key: (metricsd_registry::Family, String),
    rx: mpsc::UnboundedReceiver<WatcherRow>,
    engine: Arc<crate::server::EngineInner>,
    closed: std::sync::atomic::AtomicBool,
}

impl Watcher {
    pub(crate) fn new(
        id: u64,
        key: (metricsd_registry::Family, String),
        rx: mpsc::UnboundedReceiver<WatcherRow>,
        engine: Arc<crate::server::EngineInner>,
    ) -> Self {
        Self {
            id,
            key,
            rx,
            engine,
            closed: std::sync::atomic::AtomicBool::new(false),
        }
    }

    /// Awaits the next delivered row, in strictly increasing `ts`
    /// order. Returns `None` once closed and drained.
    pub async fn recv(&mut self) -> Option<WatcherRow> {
        self.rx.recv().await
    }

    /// Idempotent: unlinks from the entry and closes the input side;
    /// the forwarder (here, the channel itself) drains remaining
    /// buffered values before `recv` finally returns `None`.
    pub fn close(&self) {
        if self
            .closed
            .compare_exchange(
                false,
                true,
                std::sync::atomic::Ordering::SeqCst,
                std::sync::atomic::Ordering::SeqCst,
            )
            .is_ok()
        {
            self.engine.remove_watcher(&self.key, self.id);
        }
    }
}

impl Drop for Watcher {
    fn drop(&mut self) {
        self.close();
    }
}
