//! One writer partition: its own queue, condvar, and dedicated OS
//! thread performing blocking file I/O (spec.md §4.3 "Partitioning").
//!
//! Lock order is always shard-state lock → per-stream lock, never the
//! reverse, mirroring the engine→entry ordering in spec.md §5.

use std::collections::{HashMap, VecDeque};
use std::path::PathBuf;
use std::sync::Arc;
use std::thread::JoinHandle;

use parking_lot::{Condvar, Mutex};

use metricsd_core::Record;

use crate::stream::StreamState;

struct ShardState {
    streams: HashMap<String, Arc<Mutex<StreamState>>>,
    dirty: VecDeque<String>,
    closing: bool,
}

/// A single writer partition over a subset of stream names (hashed by
/// [`crate::hash::hash_name`]).
pub struct Shard {
    dir: PathBuf,
    no_sync: bool,
    state: Mutex<ShardState>,
    cv: Condvar,
}

impl Shard {
    pub fn new(dir: PathBuf, no_sync: bool) -> Arc<Self> {
        Arc::new(Self {
            dir,
            no_sync,
            state: Mutex::new(ShardState {
                streams: HashMap::new(),
                dirty: VecDeque::new(),
                closing: false,
            }),
            cv: Condvar::new(),
        })
    }

    /// Spawns the dedicated writer thread. Returns its join handle so
    /// the owning [`crate::store::Datastore`] can wait for it at Close.
    pub fn spawn_writer(self: &Arc<Self>) -> JoinHandle<()> {
        let shard = Arc::clone(self);
        std::thread::spawn(move || shard.writer_loop())
    }

    /// Seeds a restored pending tail directly into the stream map and
    /// marks it dirty, without going through the insert fast path.
    /// Used once at Open to restore `tail_data`.
    pub fn seed_tail(&self, name: &str, records: Vec<Record>) {
        if records.is_empty() {
            return;
        }
        let mut state = self.state.lock();
        let stream = state
            .streams
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(StreamState::new(&self.dir, name))))
            .clone();
        stream.lock().tail.extend(records);
        state.dirty.push_back(name.to_string());
        drop(state);
        self.cv.notify_one();
    }

    /// Enqueues a record in memory. Never touches the filesystem —
    /// spec.md §5: "Insert... never blocks on I/O."
    pub fn insert(&self, name: &str, record: Record) {
        let mut state = self.state.lock();
        let stream = state
            .streams
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(StreamState::new(&self.dir, name))))
            .clone();
        let was_empty = {
            let mut s = stream.lock();
            let was_empty = s.tail.is_empty();
            s.tail.push(record);
            was_empty
        };
        if was_empty {
            state.dirty.push_back(name.to_string());
        }
        drop(state);
        self.cv.notify_one();
    }

    /// Looks up (without creating) the stream handle backing `name`,
    /// for read operations. Returns `None` if nothing has touched this
    /// stream in the current process.
    pub fn stream(&self, name: &str) -> Option<Arc<Mutex<StreamState>>> {
        self.state.lock().streams.get(name).cloned()
    }

    pub fn dir(&self) -> &std::path::Path {
        &self.dir
    }

    /// All stream names this shard has a live (possibly empty) tail
    /// for — used to snapshot remaining pending writes at Close.
    pub fn stream_names(&self) -> Vec<String> {
        self.state.lock().streams.keys().cloned().collect()
    }

    /// Signals the writer thread to drain remaining work and exit.
    pub fn begin_close(&self) {
        self.state.lock().closing = true;
        self.cv.notify_all();
    }

    fn writer_loop(&self) {
        loop {
            let (name, stream) = {
                let mut state = self.state.lock();
                loop {
                    if let Some(name) = state.dirty.pop_front() {
                        match state.streams.get(&name) {
                            Some(s) => break (name, s.clone()),
                            None => continue,
                        }
                    }
                    if state.closing {
                        return;
                    }
                    self.cv.wait(&mut state);
                }
            };

            let result = stream.lock().write_tail(self.no_sync);
            if let Err(e) = result {
                tracing::warn!(stream = %name, error = %e, "datastore writer flush failed");
            }
        }
    }
}
