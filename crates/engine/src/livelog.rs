//! Live-log ring-buffer persistence across restarts (spec.md §4.4).
//!
//! Serialized form per entry: `int32 family; uint64 nameLen; uint64
//! nChs; bytes name; { uint64 chNameLen; bytes chName; [ringSize]
//! float64 data } × nChs`, preceded by a small file header carrying
//! the save timestamp and ring size once for the whole snapshot
//! (every live entry ticks in lockstep, so they share one `lastTick`).

use std::io::{Read, Write};
use std::path::Path;

use metricsd_core::{Error, Result, LIVE_LOG_SIZE};
use metricsd_registry::Family;

pub struct SavedEntry {
    pub family: Family,
    pub name: String,
    /// `(channel name, oldest-first ring data)`.
    pub channels: Vec<(String, Vec<f64>)>,
}

pub fn save(path: &Path, saved_ts: i64, ring_size: usize, entries: &[SavedEntry]) -> Result<()> {
    let mut buf = Vec::new();
    buf.extend_from_slice(&saved_ts.to_le_bytes());
    buf.extend_from_slice(&(ring_size as u64).to_le_bytes());
    buf.extend_from_slice(&(entries.len() as u64).to_le_bytes());
    for e in entries {
        buf.extend_from_slice(&e.family.tag().to_le_bytes());
        let name_bytes = e.name.as_bytes();
        buf.extend_from_slice(&(name_bytes.len() as u64).to_le_bytes());
        buf.extend_from_slice(&(e.channels.len() as u64).to_le_bytes());
        buf.extend_from_slice(name_bytes);
        for (chname, data) in &e.channels {
            let cb = chname.as_bytes();
            buf.extend_from_slice(&(cb.len() as u64).to_le_bytes());
            buf.extend_from_slice(cb);
            for v in data {
                buf.extend_from_slice(&v.to_le_bytes());
            }
        }
    }

    let tmp = path.with_extension("tmp");
    let mut f = std::fs::File::create(&tmp)?;
    f.write_all(&buf)?;
    f.sync_all()?;
    drop(f);
    std::fs::rename(&tmp, path)?;
    Ok(())
}

pub struct Loaded {
    pub saved_ts: i64,
    pub ring_size: usize,
    pub entries: Vec<SavedEntry>,
}

pub fn load(path: &Path) -> Result<Option<Loaded>> {
    if !path.exists() {
        return Ok(None);
    }
    let mut data = Vec::new();
    std::fs::File::open(path)?.read_to_end(&mut data)?;
    let mut c = Cursor { d: &data, p: 0 };

    let saved_ts = c.i64()?;
    let ring_size = c.u64()? as usize;
    let n_entries = c.u64()?;

    let mut entries = Vec::with_capacity(n_entries as usize);
    for _ in 0..n_entries {
        let tag = c.i32()?;
        let family = Family::from_tag(tag).ok_or_else(|| Error::invalid("corrupt live_log family tag"))?;
        let name_len = c.u64()? as usize;
        let n_chs = c.u64()?;
        let name = String::from_utf8(c.bytes(name_len)?.to_vec())
            .map_err(|e| Error::invalid(format!("corrupt live_log name: {e}")))?;

        let mut channels = Vec::with_capacity(n_chs as usize);
        for _ in 0..n_chs {
            let ch_len = c.u64()? as usize;
            let chname = String::from_utf8(c.bytes(ch_len)?.to_vec())
                .map_err(|e| Error::invalid(format!("corrupt live_log channel name: {e}")))?;
            let mut vals = Vec::with_capacity(ring_size);
            for _ in 0..ring_size {
                vals.push(c.f64()?);
            }
            channels.push((chname, vals));
        }
        entries.push(SavedEntry { family, name, channels });
    }
    Ok(Some(Loaded { saved_ts, ring_size, entries }))
}

/// Computes how many leading (oldest) entries of a saved ring to drop,
/// and how many to keep, when aligning it into a fresh ring at
/// `restore_ts`. Returns `None` when the saved snapshot is unusable:
/// its timestamp is in the future, or it's aged out past
/// `LIVE_LOG_SIZE` seconds (spec.md §4.4).
pub fn alignment(restore_ts: i64, saved_ts: i64, saved_ring_size: usize) -> Option<(usize, usize)> {
    if saved_ts > restore_ts {
        return None;
    }
    if restore_ts - saved_ts > LIVE_LOG_SIZE as i64 {
        return None;
    }
    let offset = (restore_ts - LIVE_LOG_SIZE as i64) - (saved_ts - saved_ring_size as i64);
    let offset = offset.clamp(0, saved_ring_size as i64) as usize;
    let keep = (saved_ring_size - offset).min(LIVE_LOG_SIZE);
    Some((offset, keep))
}

struct Cursor<'a> {
    d: &'a [u8],
    p: usize,
}

impl<'a> Cursor<'a> {
    fn bytes(&mut self, n: usize) -> Result<&'a [u8]> {
        if self.p + n > self.d.len() {
            return Err(Error::invalid("truncated live_log file"));
        }
        let s = &self.d[self.p..self.p + n];
        self.p += n;
        Ok(s)
    }
    fn u64(&mut self) -> Result<u64> {
        Ok(u64::from_le_bytes(self.bytes(8)?.try_into().unwrap()))
    }
    fn i64(&mut self) -> Result<i64> {
        Ok(i64::from_le_bytes(self.bytes(8)?.try_into().unwrap()))
    }
    fn i32(&mut self) -> Result<i32> {
        Ok(i32::from_le_bytes(self.bytes(4)?.try_into().unwrap()))
    }
    fn f64(&mut self) -> Result<f64> {
        Ok(f64::from_le_bytes(self.bytes(8)?.try_into().unwrap()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_empty_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("live_log");
        save(&path, 600, 600, &[]).unwrap();
        let loaded = load(&path).unwrap().unwrap();
        assert_eq!(loaded.saved_ts, 600);
        assert!(loaded.entries.is_empty());
    }

    #[test]
    fn round_trips_entries() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("live_log");
        let entries = vec![SavedEntry {
            family: Family::Counter,
            name: "app:requests".to_string(),
            channels: vec![("counter".to_string(), vec![1.0; 600])],
        }];
        save(&path, 1200, 600, &entries).unwrap();
        let loaded = load(&path).unwrap().unwrap();
        assert_eq!(loaded.entries.len(), 1);
        assert_eq!(loaded.entries[0].name, "app:requests");
        assert_eq!(loaded.entries[0].channels[0].1.len(), 600);
    }

    #[test]
    fn missing_file_loads_as_none() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load(&dir.path().join("live_log")).unwrap().is_none());
    }

    #[test]
    fn identity_when_restore_ts_equals_saved_ts() {
        let (drop, keep) = alignment(1200, 1200, LIVE_LOG_SIZE).unwrap();
        assert_eq!(drop, 0);
        assert_eq!(keep, LIVE_LOG_SIZE);
    }

    #[test]
    fn discards_future_snapshot() {
        assert!(alignment(1000, 1200, LIVE_LOG_SIZE).is_none());
    }

    #[test]
    fn discards_snapshot_older_than_ring_size() {
        assert!(alignment(1200 + LIVE_LOG_SIZE as i64 + 1, 1200, LIVE_LOG_SIZE).is_none());
    }

    #[test]
    fn drops_leading_entries_for_elapsed_gap() {
        // 60s elapsed since save: the oldest 60 samples fall off the
        // front of a fresh ring anchored at `restore_ts - LIVE_LOG_SIZE`.
        let (drop, keep) = alignment(1200 + 60, 1200, LIVE_LOG_SIZE).unwrap();
        assert_eq!(drop, 60);
        assert_eq!(keep, LIVE_LOG_SIZE - 60);
    }
}
