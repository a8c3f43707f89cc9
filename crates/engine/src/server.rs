//! The `Engine`: the table of live metric entries, the 1 Hz tick/flush
//! driver, watcher construction, and the historical/live query
//! surface (spec.md §4.2).

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use parking_lot::Mutex;
use tokio::sync::{mpsc, Notify};
use tokio::task::JoinHandle;

use metricsd_core::{Error, Record, Result};
use metricsd_datastore::Datastore;
use metricsd_registry::{create_aggregator, descriptor, resolve_channels, Family};
use metricsd_telemetry::metrics;

use crate::entry::{self, MetricEntry};
use crate::livelog;
use crate::watcher::{self, Watcher, WatcherHandle, WatcherKind};

fn unix_seconds() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock before epoch")
        .as_secs() as i64
}

type EntryKey = (Family, String);

pub struct EngineConfig {
    /// Prepended to every datastore key: `prefix + name + ":" + channel`.
    pub prefix: String,
    pub live_log_path: std::path::PathBuf,
}

/// Shared engine state. Cheaply cloned as `Arc<EngineInner>` and handed
/// to the HTTP layer; only [`Engine`] (held by `main`) can drive ticks
/// or shut down.
pub struct EngineInner {
    table: Mutex<HashMap<EntryKey, Arc<Mutex<MetricEntry>>>>,
    datastore: Arc<Datastore>,
    prefix: String,
    last_tick: AtomicI64,
    running: AtomicBool,
    self_weak: std::sync::Weak<EngineInner>,
}

impl EngineInner {
    fn ensure_entry(&self, family: Family, name: &str) -> Arc<Mutex<MetricEntry>> {
        let key = (family, name.to_string());
        let mut table = self.table.lock();
        table
            .entry(key)
            .or_insert_with(|| {
                let now = self.last_tick.load(Ordering::Acquire);
                let seed = self.seed_for(family, name, now);
                Arc::new(Mutex::new(MetricEntry::new(family, name.to_string(), seed, now)))
            })
            .clone()
    }

    fn seed_for(&self, family: Family, name: &str, at: i64) -> Vec<f64> {
        entry::seed_values(family, name, |key| {
            self.datastore.latest_before(&format!("{}{}", self.prefix, key), at).ok()
        })
    }

    /// One measurement from the parser.
    pub fn inject(&self, family: Family, name: &str, value: f64, sample_rate: f64) -> Result<()> {
        if !self.running.load(Ordering::Acquire) {
            return Err(Error::NotRunning);
        }
        let entry = self.ensure_entry(family, name);
        entry.lock().inject(value, sample_rate)
    }

    /// `LiveWatch`: resolves the family from requested channel names,
    /// materializes the entry if absent, appends a live watcher.
    pub fn live_watch(&self, name: &str, channels: &[String]) -> Result<Watcher> {
        let (family, idxs) = resolve_channels(channels)?;
        let entry = self.ensure_entry(family, name);
        let (tx, rx) = mpsc::unbounded_channel();
        let id = watcher::next_id();
        let ts = entry.lock().last_tick;
        entry.lock().watchers.push(WatcherHandle::new_live(id, idxs, ts, tx));
        metrics().active_watchers.inc();
        Ok(Watcher::new(id, (family, name.to_string()), rx, self.shared_self()))
    }

    /// `Watch`: archive subscription aligned at `offs`, granularity
    /// `gran` minutes-of-minutes (i.e. window size is `gran*60` s).
    pub fn watch(&self, name: &str, channels: &[String], offs: i64, gran: i64) -> Result<Watcher> {
        if offs % 60 != 0 {
            return Err(Error::invalid("offset must be a multiple of 60"));
        }
        if gran < 1 {
            return Err(Error::invalid("granularity must be >= 1"));
        }
        let (family, idxs) = resolve_channels(channels)?;
        let entry = self.ensure_entry(family, name);
        let last_tick = entry.lock().last_tick;

        let window_secs = gran * 60;
        let window_start = last_tick - (last_tick - offs).rem_euclid(window_secs);
        let next_emit = window_start + window_secs;

        let mut agg = create_aggregator(family);
        let seed = self.seed_for(family, name, window_start);
        agg.init(&seed);
        for row in self.query_minute_rows(family, name, agg.feed_channels(), window_start, next_emit) {
            if let Some(row) = row {
                agg.put(&row);
            }
        }

        let (tx, rx) = mpsc::unbounded_channel();
        let id = watcher::next_id();
        entry
            .lock()
            .watchers
            .push(WatcherHandle::new_archive(id, idxs, next_emit, gran, agg, tx));
        metrics().active_watchers.inc();
        Ok(Watcher::new(id, (family, name.to_string()), rx, self.shared_self()))
    }

    /// `Log`: historical window query with re-aggregation over `gran`
    /// consecutive per-minute tuples per output row (spec.md §4.2).
    pub fn log(&self, name: &str, channels: &[String], from: i64, length: i64, gran: i64) -> Result<Vec<Vec<f64>>> {
        if from % 60 != 0 {
            return Err(Error::invalid("from must be a multiple of 60"));
        }
        if gran < 1 {
            return Err(Error::invalid("granularity must be >= 1"));
        }
        if length < 0 {
            return Err(Error::invalid("length must be >= 0"));
        }
        let (family, idxs) = resolve_channels(channels)?;

        let last_tick = self.last_tick.load(Ordering::Acquire);
        let max_len = ((last_tick - from) / (gran * 60)).max(0);
        let length = length.min(max_len) as usize;

        let mut agg = create_aggregator(family);
        let seed = self.seed_for(family, name, from);
        agg.init(&seed);

        let until = from + (length as i64) * gran * 60;
        let rows = self.query_minute_rows(family, name, agg.feed_channels(), from, until);

        let mut out = Vec::with_capacity(length);
        for chunk in rows.chunks(gran as usize) {
            for row in chunk {
                if let Some(row) = row {
                    agg.put(row);
                }
            }
            let full = agg.get();
            out.push(idxs.iter().map(|&i| full[i]).collect());
        }
        Ok(out)
    }

    /// `LiveLog`: `LIVE_LOG_SIZE` rows oldest-first plus the oldest
    /// slot's timestamp.
    pub fn live_log(&self, name: &str, channels: &[String]) -> Result<(Vec<Vec<f64>>, i64)> {
        let (family, idxs) = resolve_channels(channels)?;
        let entry = self.ensure_entry(family, name);
        Ok(entry.lock().live_log(&idxs))
    }

    /// `ListNames`: enumerates persisted datastore keys. Exposed
    /// as-is; callers typically strip the trailing `:channel`.
    pub fn list_names(&self, pattern: &str) -> Result<Vec<String>> {
        self.datastore.list_names(pattern)
    }

    /// Per-minute channel tuples over `(from_exclusive, until_inclusive]`,
    /// one entry per elapsed minute, `None` where any feed channel is
    /// missing a record at that exact timestamp.
    fn query_minute_rows(
        &self,
        family: Family,
        name: &str,
        feed_channels: &[usize],
        from_exclusive: i64,
        until_inclusive: i64,
    ) -> Vec<Option<Vec<f64>>> {
        let nch = descriptor(family).channels.len();
        let n_minutes = ((until_inclusive - from_exclusive) / 60).max(0) as usize;
        let mut rows: Vec<Option<Vec<f64>>> = (0..n_minutes).map(|_| Some(vec![0.0; nch])).collect();

        for &ch in feed_channels {
            let chname = descriptor(family).channels[ch];
            let key = format!("{}{}:{}", self.prefix, name, chname);
            let recs = self.datastore.query(&key, from_exclusive + 60, until_inclusive).unwrap_or_default();
            let by_ts: HashMap<i64, f64> = recs.into_iter().map(|r| (r.ts, r.value)).collect();
            for (m, row) in rows.iter_mut().enumerate() {
                let ts = from_exclusive + 60 * (m as i64 + 1);
                match by_ts.get(&ts) {
                    Some(&v) => {
                        if let Some(r) = row.as_mut() {
                            r[ch] = v;
                        }
                    }
                    None => *row = None,
                }
            }
        }
        rows
    }

    pub(crate) fn remove_watcher(&self, key: &EntryKey, id: u64) {
        let table = self.table.lock();
        if let Some(entry) = table.get(key) {
            let mut e = entry.lock();
            let before = e.watchers.len();
            e.watchers.retain(|w| w.id != id);
            if e.watchers.len() < before {
                metrics().active_watchers.dec();
            }
        }
    }

    fn shared_self(&self) -> Arc<EngineInner> {
        // SAFETY-free approach: every EngineInner is always constructed
        // inside an `Arc` by `Engine::start`; this upgrades a borrowed
        // `&self` back to that `Arc` via a weak side-channel stashed at
        // construction time.
        self.self_weak
            .upgrade()
            .expect("EngineInner dropped while still in use")
    }
}

/// One tick-or-flush pass over a single entry. No network or disk I/O
/// blocks here except the datastore's non-blocking `Insert`.
fn process_entry(entry: &Mutex<MetricEntry>, ts: i64, datastore: &Arc<Datastore>, prefix: &str) {
    let mut e = entry.lock();
    if ts % 60 == 0 {
        let (tick_data, flush_data, had_input) = e.flush(ts);
        for w in e.watchers.iter_mut() {
            match w.kind {
                WatcherKind::Live => w.feed_live(ts, &tick_data),
                WatcherKind::Archive { .. } => w.feed_archive(ts, &flush_data),
            }
        }
        if had_input {
            let d = descriptor(e.family);
            for (i, channel) in d.channels.iter().enumerate() {
                let key = format!("{prefix}{}:{}", e.name, channel);
                datastore.insert(&key, Record::new(ts, flush_data[i]));
            }
        }
    } else {
        let tick_data = e.tick(ts);
        for w in e.watchers.iter_mut() {
            if let WatcherKind::Live = w.kind {
                w.feed_live(ts, &tick_data);
            }
        }
    }
    e.watchers.retain(|w| !w.is_closed());
}

/// Owns the ticker task and shutdown sequence. Share [`EngineHandle`]
/// clones with the HTTP layer; only `main` holds an `Engine`.
pub struct Engine {
    inner: Arc<EngineInner>,
    stop: Arc<Notify>,
    ticker: Option<JoinHandle<()>>,
    live_log_path: std::path::PathBuf,
}

pub type EngineHandle = Arc<EngineInner>;

impl Engine {
    /// Opens the live-log snapshot (if present) and starts the 1 Hz
    /// driver. `datastore` must already be open.
    pub fn start(datastore: Datastore, config: EngineConfig) -> Result<Self> {
        let now = unix_seconds();

        let inner = Arc::new_cyclic(|weak: &std::sync::Weak<EngineInner>| EngineInner {
            table: Mutex::new(HashMap::new()),
            datastore: Arc::new(datastore),
            prefix: config.prefix.clone(),
            last_tick: AtomicI64::new(now),
            running: AtomicBool::new(true),
            self_weak: weak.clone(),
        });

        if let Some(loaded) = livelog::load(&config.live_log_path)? {
            restore_live_log(&inner, now, loaded);
        }

        let stop = Arc::new(Notify::new());
        let ticker = spawn_ticker(inner.clone(), stop.clone());

        Ok(Self {
            inner,
            stop,
            ticker: Some(ticker),
            live_log_path: config.live_log_path,
        })
    }

    pub fn handle(&self) -> EngineHandle {
        self.inner.clone()
    }

    /// Stops the ticker, closes every watcher's input, persists the
    /// live-log snapshot, then closes the datastore. Requires the
    /// caller to have dropped every other [`EngineHandle`] clone first
    /// (e.g. the HTTP router) — a stray clone just skips the datastore
    /// close and logs a warning, matching "best-effort on shutdown"
    /// rather than panicking.
    pub async fn shutdown(mut self) -> Result<()> {
        self.inner.running.store(false, Ordering::Release);
        self.stop.notify_waiters();
        if let Some(handle) = self.ticker.take() {
            let _ = handle.await;
        }

        let saved = {
            let table = self.inner.table.lock();
            let mut entries = Vec::with_capacity(table.len());
            for entry in table.values() {
                let mut e = entry.lock();
                for w in e.watchers.drain(..) {
                    drop(w);
                }
                let channels = e
                    .channel_names()
                    .iter()
                    .enumerate()
                    .map(|(i, name)| (name.to_string(), e.ring_oldest_first(i)))
                    .collect();
                entries.push(livelog::SavedEntry {
                    family: e.family,
                    name: e.name.clone(),
                    channels,
                });
            }
            entries
        };
        let saved_ts = self.inner.last_tick.load(Ordering::Acquire);
        livelog::save(&self.live_log_path, saved_ts, metricsd_core::LIVE_LOG_SIZE, &saved)?;

        match Arc::try_unwrap(self.inner) {
            Ok(inner) => match Arc::try_unwrap(inner.datastore) {
                Ok(datastore) => datastore.close()?,
                Err(_) => tracing::warn!("engine shutdown: datastore still referenced, left open"),
            },
            Err(_) => tracing::warn!("engine shutdown: other handles still alive, datastore left open"),
        }
        Ok(())
    }
}

fn restore_live_log(inner: &Arc<EngineInner>, restore_ts: i64, loaded: livelog::Loaded) {
    let mut table = inner.table.lock();
    for saved in loaded.entries {
        let seed = inner.seed_for(saved.family, &saved.name, restore_ts);
        let mut entry = MetricEntry::new(saved.family, saved.name.clone(), seed, restore_ts);

        if let Some((drop_count, keep)) = livelog::alignment(restore_ts, loaded.saved_ts, loaded.ring_size) {
            let names = entry.channel_names();
            for (chname, data) in &saved.channels {
                if let Some(idx) = names.iter().position(|n| n == chname) {
                    let kept = &data[drop_count..(drop_count + keep).min(data.len())];
                    entry.restore_channel_prefix(idx, kept);
                }
            }
            entry.set_live_ptr(keep);
        }

        table.insert((saved.family, saved.name), Arc::new(Mutex::new(entry)));
    }
}

fn spawn_ticker(inner: Arc<EngineInner>, stop: Arc<Notify>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(std::time::Duration::from_secs(1));
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Burst);
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    if !inner.running.load(Ordering::Acquire) {
                        break;
                    }
                    let ts = inner.last_tick.fetch_add(1, Ordering::AcqRel) + 1;
                    do_pass(&inner, ts).await;
                }
                _ = stop.notified() => break,
            }
        }
    })
}

async fn do_pass(inner: &Arc<EngineInner>, ts: i64) {
    let entries: Vec<Arc<Mutex<MetricEntry>>> = inner.table.lock().values().cloned().collect();
    let prefix = inner.prefix.clone();

    let handles = entries.iter().map(|entry| {
        let entry = entry.clone();
        let prefix = prefix.clone();
        let datastore = inner.datastore.clone();
        tokio::spawn(async move {
            process_entry(&entry, ts, &datastore, &prefix);
        })
    });
    futures::future::join_all(handles).await;

    let mut table = inner.table.lock();
    table.retain(|_, e| {
        let idle = e.lock().is_idle();
        if idle {
            metrics().entries_evicted.inc();
        }
        !idle
    });
}
