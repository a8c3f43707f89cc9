//! Per-`(family, name)` live state: family state machine, live-log
//! rings, idle tracking, and the watcher list (spec.md §3 "Metric
//! entry", §4.2 "State machine of a metric entry").

use metricsd_core::{Record, Result, LIVE_LOG_SIZE};
use metricsd_registry::{create_state, descriptor, Family, MetricState};

use crate::watcher::WatcherHandle;

/// The live in-memory state for one metric. Lives behind a per-entry
/// lock inside the engine's table; the engine-level lock protects only
/// the table itself, never entry internals (spec.md §5).
pub struct MetricEntry {
    pub family: Family,
    pub name: String,
    state: Box<dyn MetricState>,
    /// One ring per channel, oldest sample at `live_ptr`.
    live_log: Vec<Vec<f64>>,
    live_ptr: usize,
    pub last_tick: i64,
    pub idle_ticks: u32,
    recvd_input: bool,
    recvd_input_tick: bool,
    pub watchers: Vec<WatcherHandle>,
}

impl MetricEntry {
    /// `seed` is one value per channel: family defaults for a brand
    /// new metric, or `LatestBefore` results for persisted channels on
    /// first touch after restart (spec.md §4.2 "live watcher").
    pub fn new(family: Family, name: String, seed: Vec<f64>, now: i64) -> Self {
        let mut state = create_state(family);
        state.init(&seed);
        let live_log = seed.iter().map(|&v| vec![v; LIVE_LOG_SIZE]).collect();
        Self {
            family,
            name,
            state,
            live_log,
            live_ptr: 0,
            last_tick: now,
            idle_ticks: 0,
            recvd_input: false,
            recvd_input_tick: false,
            watchers: Vec::new(),
        }
    }

    pub fn channel_count(&self) -> usize {
        descriptor(self.family).channels.len()
    }

    pub fn channel_names(&self) -> &'static [&'static str] {
        descriptor(self.family).channels
    }

    /// This channel's ring, oldest-first — used by the live-log
    /// snapshot at shutdown (spec.md §4.4).
    pub fn ring_oldest_first(&self, ch: usize) -> Vec<f64> {
        let n = LIVE_LOG_SIZE;
        (0..n).map(|i| self.live_log[ch][(self.live_ptr + i) % n]).collect()
    }

    /// Overwrites the leading `kept.len()` slots of `ch`'s ring with
    /// restored data, leaving the rest at their freshly-seeded
    /// defaults. Used only right after [`MetricEntry::new`] while
    /// restoring a live-log snapshot.
    pub fn restore_channel_prefix(&mut self, ch: usize, kept: &[f64]) {
        for (i, &v) in kept.iter().enumerate().take(LIVE_LOG_SIZE) {
            self.live_log[ch][i] = v;
        }
    }

    pub fn set_live_ptr(&mut self, ptr: usize) {
        self.live_ptr = ptr % LIVE_LOG_SIZE;
    }

    /// One measurement delivered from the parser.
    pub fn inject(&mut self, value: f64, sample_rate: f64) -> Result<()> {
        self.state.inject(value, sample_rate)?;
        self.recvd_input = true;
        self.recvd_input_tick = true;
        Ok(())
    }

    /// Per-second update: snapshot into the live log, advance the
    /// ring pointer, update the idle counter. Returns the per-channel
    /// tick values for live watcher fan-out.
    pub fn tick(&mut self, ts: i64) -> Vec<f64> {
        let data = self.state.tick();
        for (ch, &value) in data.iter().enumerate() {
            self.live_log[ch][self.live_ptr] = value;
        }
        self.live_ptr = (self.live_ptr + 1) % LIVE_LOG_SIZE;
        if self.recvd_input_tick {
            self.idle_ticks = 0;
        } else {
            self.idle_ticks += 1;
        }
        self.recvd_input_tick = false;
        self.last_tick = ts;
        data
    }

    /// Minute-boundary tick: does the tick's work and also finalizes
    /// the minute's persisted summary. Returns `(tick_data, flush_data,
    /// had_input)`; `had_input` gates whether flush_data gets written
    /// to the datastore at all (spec.md §4.2 "flush").
    pub fn flush(&mut self, ts: i64) -> (Vec<f64>, Vec<f64>, bool) {
        let had_input = self.recvd_input;
        let tick_data = self.tick(ts);
        let flush_data = self.state.flush();
        self.recvd_input = false;
        (tick_data, flush_data, had_input)
    }

    /// `LiveLogSize` rows oldest-first for the requested channel
    /// indices, plus the timestamp of the oldest slot.
    pub fn live_log(&self, channels: &[usize]) -> (Vec<Vec<f64>>, i64) {
        let n = LIVE_LOG_SIZE;
        let mut rows = Vec::with_capacity(n);
        for i in 0..n {
            let slot = (self.live_ptr + i) % n;
            rows.push(channels.iter().map(|&ch| self.live_log[ch][slot]).collect());
        }
        (rows, self.last_tick - n as i64)
    }

    /// Whether this entry is eligible for eviction: silent for more
    /// than `LIVE_LOG_SIZE` seconds and no live subscribers.
    pub fn is_idle(&self) -> bool {
        self.idle_ticks as usize > LIVE_LOG_SIZE && self.watchers.is_empty()
    }
}

/// Seeds a fresh live-log/state vector for `family`: the persisted
/// channel's `LatestBefore` value when available, else the family's
/// compile-time default. Used by both live-watcher creation and
/// restart-time entry materialization (spec.md §4.2).
pub fn seed_values(
    family: Family,
    name: &str,
    lookup: impl Fn(&str) -> Option<Record>,
) -> Vec<f64> {
    let d = descriptor(family);
    d.channels
        .iter()
        .enumerate()
        .map(|(i, ch)| {
            if d.persist[i] {
                let key = format!("{name}:{ch}");
                lookup(&key).map(|r| r.value).unwrap_or(d.defaults[i])
            } else {
                d.defaults[i]
            }
        })
        .collect()
}
