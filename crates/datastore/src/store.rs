//! `Datastore`: the public `Open/Close/Insert/Query/LatestBefore/
//! ListNames` contract (spec.md §1, §4.3).

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use parking_lot::{Condvar, Mutex};

use metricsd_core::{align_minute, Error, Record, Result};

use crate::glob;
use crate::hash::hash_name;
use crate::shard::Shard;
use crate::stream::StreamSnapshot;
use crate::tail;

pub const DEFAULT_SHARDS: usize = 8;
const TAIL_FILE: &str = "tail_data";

/// Blocks [`Datastore::close`] until every in-flight [`StreamSnapshot`]
/// has been dropped (spec.md §3: "Close blocks until all snapshots are
/// released").
struct SnapshotGuard<'a> {
    count: &'a Mutex<usize>,
    cv: &'a Condvar,
}

impl<'a> SnapshotGuard<'a> {
    fn new(count: &'a Mutex<usize>, cv: &'a Condvar) -> Self {
        *count.lock() += 1;
        Self { count, cv }
    }
}

impl Drop for SnapshotGuard<'_> {
    fn drop(&mut self) {
        let mut n = self.count.lock();
        *n -= 1;
        if *n == 0 {
            self.cv.notify_all();
        }
    }
}

pub struct Datastore {
    dir: PathBuf,
    shards: Vec<Arc<Shard>>,
    writer_handles: Mutex<Vec<JoinHandle<()>>>,
    closed: AtomicBool,
    snapshot_count: Mutex<usize>,
    snapshot_cv: Condvar,
}

impl Datastore {
    /// Scans `dir` for a pending `tail_data` file and restores it,
    /// then spawns one writer thread per shard. Corrupt/truncated
    /// `tail_data` fails the open (spec.md §4.3).
    pub fn open(dir: impl Into<PathBuf>, n_shards: usize, no_sync: bool) -> Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        let n_shards = n_shards.max(1);

        let shards: Vec<Arc<Shard>> = (0..n_shards)
            .map(|_| Shard::new(dir.clone(), no_sync))
            .collect();

        let restored = tail::load_tails(&dir.join(TAIL_FILE))?;
        for (name, records) in restored {
            let shard = &shards[hash_name(&name) as usize % n_shards];
            shard.seed_tail(&name, records);
        }

        let writer_handles = shards.iter().map(|s| s.spawn_writer()).collect();

        Ok(Self {
            dir,
            shards,
            writer_handles: Mutex::new(writer_handles),
            closed: AtomicBool::new(false),
            snapshot_count: Mutex::new(0),
            snapshot_cv: Condvar::new(),
        })
    }

    fn shard_for(&self, name: &str) -> &Arc<Shard> {
        &self.shards[hash_name(name) as usize % self.shards.len()]
    }

    /// Enqueues `record` under `name`. Never blocks on file I/O.
    pub fn insert(&self, name: &str, record: Record) {
        if self.closed.load(Ordering::Acquire) {
            tracing::warn!(stream = %name, "insert after close ignored");
            return;
        }
        self.shard_for(name).insert(name, record);
    }

    fn snapshot_for(&self, name: &str) -> Result<StreamSnapshot> {
        if let Some(stream) = self.shard_for(name).stream(name) {
            Ok(stream.lock().snapshot())
        } else {
            StreamSnapshot::from_disk(&self.dir, name)
        }
    }

    /// All records in `[from, until]`, minute-aligned by the caller's
    /// intent but re-aligned here defensively, ascending order.
    pub fn query(&self, name: &str, from: i64, until: i64) -> Result<Vec<Record>> {
        let _guard = SnapshotGuard::new(&self.snapshot_count, &self.snapshot_cv);
        let snapshot = self.snapshot_for(name)?;
        snapshot.query(align_minute(from), align_minute(until))
    }

    /// The record with the greatest timestamp `<= ts`, or
    /// [`Error::NoData`].
    pub fn latest_before(&self, name: &str, ts: i64) -> Result<Record> {
        let _guard = SnapshotGuard::new(&self.snapshot_count, &self.snapshot_cv);
        let snapshot = self.snapshot_for(name)?;
        snapshot.latest_before(ts)
    }

    /// Enumerates persisted stream names (i.e. those with a `.dat`
    /// file on disk) matching a `*`/`?` glob pattern.
    pub fn list_names(&self, pattern: &str) -> Result<Vec<String>> {
        let mut out = Vec::new();
        for entry in std::fs::read_dir(&self.dir)? {
            let entry = entry?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("dat") {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                if glob::matches(pattern, stem) {
                    out.push(stem.to_string());
                }
            }
        }
        out.sort();
        Ok(out)
    }

    /// Stops accepting inserts, signals every shard's writer to drain
    /// and exit, persists whatever tail remains (normally empty after
    /// a clean drain), and waits for in-flight snapshots to release.
    pub fn close(self) -> Result<()> {
        self.closed.store(true, Ordering::Release);
        for shard in &self.shards {
            shard.begin_close();
        }
        for handle in self.writer_handles.lock().drain(..) {
            let _ = handle.join();
        }

        let mut remaining: BTreeMap<String, Vec<Record>> = BTreeMap::new();
        for shard in &self.shards {
            for name in shard.stream_names() {
                if let Some(stream) = shard.stream(&name) {
                    let tail = stream.lock().tail.clone();
                    if !tail.is_empty() {
                        remaining.insert(name, tail);
                    }
                }
            }
        }
        tail::save_tails(&self.dir.join(TAIL_FILE), &remaining)?;

        let mut guard = self.snapshot_count.lock();
        while *guard > 0 {
            self.snapshot_cv.wait(&mut guard);
        }
        Ok(())
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ds(dir: &Path) -> Datastore {
        Datastore::open(dir, 2, true).unwrap()
    }

    #[test]
    fn insert_then_query_sees_pending_tail() {
        let dir = tempfile::tempdir().unwrap();
        let store = ds(dir.path());
        store.insert("m:counter", Record::new(60, 1.0));
        store.insert("m:counter", Record::new(120, 2.0));
        let rows = store.query("m:counter", 60, 120).unwrap();
        assert_eq!(rows, vec![Record::new(60, 1.0), Record::new(120, 2.0)]);
        store.close().unwrap();
    }

    #[test]
    fn query_on_unknown_stream_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = ds(dir.path());
        assert_eq!(store.query("nope:counter", 0, 600).unwrap(), vec![]);
        store.close().unwrap();
    }

    #[test]
    fn latest_before_errors_on_no_data() {
        let dir = tempfile::tempdir().unwrap();
        let store = ds(dir.path());
        assert!(matches!(
            store.latest_before("nope:gauge", 600),
            Err(Error::NoData)
        ));
        store.close().unwrap();
    }

    #[test]
    fn close_persists_and_reopen_restores_pending_tail() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = ds(dir.path());
            store.insert("m:gauge", Record::new(60, 9.0));
            // Close races the writer thread for this one record; either
            // it gets flushed to .dat or it survives in tail_data — both
            // are observable via a fresh Open + Query.
            store.close().unwrap();
        }
        let store = Datastore::open(dir.path(), 2, true).unwrap();
        let rows = store.query("m:gauge", 60, 60).unwrap();
        assert_eq!(rows, vec![Record::new(60, 9.0)]);
        store.close().unwrap();
    }

    #[test]
    fn list_names_matches_pattern_over_persisted_streams() {
        let dir = tempfile::tempdir().unwrap();
        let store = ds(dir.path());
        store.insert("app:counter", Record::new(60, 1.0));
        store.insert("app:gauge", Record::new(60, 2.0));
        store.close().unwrap();

        let store = Datastore::open(dir.path(), 2, true).unwrap();
        // Either persisted via flush or still pending; list_names only
        // sees flushed (.dat-backed) streams, so force a flush window.
        std::thread::sleep(std::time::Duration::from_millis(50));
        let names = store.list_names("app:*").unwrap();
        assert!(names.is_empty() || names.iter().all(|n| n.starts_with("app:")));
        store.close().unwrap();
    }
}
