//! One datastore key's on-disk state: append-only `.dat`/`.idx` files
//! plus the in-memory pending tail (spec.md §3, §4.3).

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;

use metricsd_core::{Error, Record, Result};
use metricsd_telemetry::metrics;

/// Sentinel meaning "nothing has ever been written" — mirrors the
/// source's `lastWr = -1 << 63` for a freshly opened, empty stream.
pub const NEVER_WRITTEN: i64 = i64::MIN;

/// Cached, file-backed metadata for one stream. Lives behind a
/// per-stream lock inside a [`crate::shard::Shard`]; the writer worker
/// is the only thing that mutates `dsize`/`isize`/`last_wr`/`valid`.
pub struct StreamState {
    pub name: String,
    pub dat_path: PathBuf,
    pub idx_path: PathBuf,
    pub tail: Vec<Record>,
    pub valid: bool,
    pub last_wr: i64,
    pub dsize: i64,
    pub isize: i64,
    dat: Option<File>,
    idx: Option<File>,
}

impl StreamState {
    pub fn new(dir: &Path, name: &str) -> Self {
        Self {
            name: name.to_string(),
            dat_path: dir.join(format!("{name}.dat")),
            idx_path: dir.join(format!("{name}.idx")),
            tail: Vec::new(),
            valid: false,
            last_wr: NEVER_WRITTEN,
            dsize: 0,
            isize: 0,
            dat: None,
            idx: None,
        }
    }

    /// A lightweight, independent point-in-time view for reads — a
    /// fresh file handle pair plus the frozen sizes/tail observed
    /// under the stream lock, matching spec.md §3's "Read snapshots".
    pub fn snapshot(&self) -> StreamSnapshot {
        StreamSnapshot {
            dat_path: self.dat_path.clone(),
            idx_path: self.idx_path.clone(),
            tail: self.tail.clone(),
            last_wr: self.last_wr,
            dsize: self.dsize,
            isize: self.isize,
        }
    }

    /// Appends all pending tail records to the data/index files,
    /// rejecting out-of-order or misaligned timestamps, then clears
    /// the tail. Mirrors `fsDsStream.writeTail`.
    pub fn write_tail(&mut self, no_sync: bool) -> Result<()> {
        self.open_files()?;

        let mut dbuf = Vec::new();
        let mut ibuf = Vec::new();
        let (mut dsize, mut isize_, mut last_wr) = (self.dsize, self.isize, self.last_wr);

        let mut tail = std::mem::take(&mut self.tail);
        tail.sort_by_key(|r| r.ts);

        for r in &tail {
            if r.ts % 60 != 0 {
                tracing::warn!(stream = %self.name, ts = r.ts, "timestamp not divisible by 60");
                continue;
            }
            if last_wr != NEVER_WRITTEN && last_wr >= r.ts {
                tracing::warn!(stream = %self.name, ts = r.ts, "timestamp in the past");
                continue;
            }

            dbuf.extend_from_slice(&r.value.to_le_bytes());
            dsize += 8;

            // A run continues (no new index entry) only when this record
            // picks up exactly where the last written one left off.
            let continues_run = last_wr != NEVER_WRITTEN && r.ts == last_wr + 60;
            if !continues_run {
                ibuf.extend_from_slice(&r.ts.to_le_bytes());
                ibuf.extend_from_slice(&(dsize - 8).to_le_bytes());
                isize_ += 16;
            }
            last_wr = r.ts;
        }

        let started = Instant::now();
        let result = (|| -> std::io::Result<()> {
            let dat = self.dat.as_mut().expect("open_files");
            dat.seek(SeekFrom::End(0))?;
            dat.write_all(&dbuf)?;
            let idx = self.idx.as_mut().expect("open_files");
            idx.seek(SeekFrom::End(0))?;
            idx.write_all(&ibuf)?;
            if !no_sync {
                self.dat.as_ref().unwrap().sync_all()?;
                self.idx.as_ref().unwrap().sync_all()?;
            }
            Ok(())
        })();
        metrics()
            .datastore_write_latency_ms
            .observe(started.elapsed().as_millis() as u64);

        self.close_files();

        match result {
            Ok(()) => {
                self.dsize = dsize;
                self.isize = isize_;
                self.last_wr = last_wr;
                metrics().datastore_writes.inc();
                Ok(())
            }
            Err(e) => {
                self.valid = false;
                metrics().datastore_write_errors.inc();
                Err(Error::Io(e))
            }
        }
    }

    fn open_files(&mut self) -> Result<()> {
        let dat = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .open(&self.dat_path)?;
        let idx = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .open(&self.idx_path)?;

        if !self.valid {
            self.dsize = dat.metadata()?.len() as i64;
            self.isize = idx.metadata()?.len() as i64;
            self.last_wr = if self.isize == 0 {
                NEVER_WRITTEN
            } else {
                let mut idx_ro = File::open(&self.idx_path)?;
                let (ts, pos) = read_idx_entry(&mut idx_ro, self.isize / 16 - 1)?;
                ts + 60 * ((self.dsize - pos) / 8 - 1)
            };
            self.valid = true;
        }

        self.dat = Some(dat);
        self.idx = Some(idx);
        Ok(())
    }

    fn close_files(&mut self) {
        self.dat = None;
        self.idx = None;
    }
}

pub struct StreamSnapshot {
    pub dat_path: PathBuf,
    pub idx_path: PathBuf,
    pub tail: Vec<Record>,
    pub last_wr: i64,
    pub dsize: i64,
    pub isize: i64,
}

impl StreamSnapshot {
    /// Reads a stat-only snapshot for a stream that has no live entry
    /// in the shard map (e.g. a restart before first write this run).
    pub fn from_disk(dir: &Path, name: &str) -> Result<Self> {
        let dat_path = dir.join(format!("{name}.dat"));
        let idx_path = dir.join(format!("{name}.idx"));
        let dsize = std::fs::metadata(&dat_path).map(|m| m.len() as i64).unwrap_or(0);
        let isize = std::fs::metadata(&idx_path).map(|m| m.len() as i64).unwrap_or(0);
        let last_wr = if isize == 0 {
            NEVER_WRITTEN
        } else {
            let mut idx = File::open(&idx_path)?;
            let (ts, pos) = read_idx_entry(&mut idx, isize / 16 - 1)?;
            ts + 60 * ((dsize - pos) / 8 - 1)
        };
        Ok(Self {
            dat_path,
            idx_path,
            tail: Vec::new(),
            last_wr,
            dsize,
            isize,
        })
    }

    /// Binary search for the index of the greatest entry with
    /// `ts <= target`, or `None` if every entry's timestamp exceeds it.
    fn bisect_le(&self, target: i64) -> Result<Option<i64>> {
        if self.isize == 0 {
            return Ok(None);
        }
        let n = self.isize / 16;
        let mut idx = File::open(&self.idx_path)?;
        let (mut lo, mut hi) = (0i64, n - 1);
        if read_idx_entry(&mut idx, 0)?.0 > target {
            return Ok(None);
        }
        while lo < hi {
            let mid = lo + (hi - lo + 1) / 2;
            let (ts, _) = read_idx_entry(&mut idx, mid)?;
            if ts <= target {
                lo = mid;
            } else {
                hi = mid - 1;
            }
        }
        Ok(Some(lo))
    }

    /// All records in `[from, until]` (already minute-aligned by the
    /// caller), ascending. Mirrors spec.md §4.3's query algorithm.
    pub fn query(&self, from: i64, until: i64) -> Result<Vec<Record>> {
        let mut out = Vec::new();
        if self.isize == 0 && self.tail.is_empty() {
            return Ok(out);
        }

        if let Some(entry_n) = self.bisect_le(from)? {
            let n = self.isize / 16;
            let mut idx = File::open(&self.idx_path)?;
            let mut dat = File::open(&self.dat_path)?;
            let mut k = entry_n;
            while k < n {
                let (ts, pos) = read_idx_entry(&mut idx, k)?;
                let next_pos = if k + 1 < n {
                    read_idx_entry(&mut idx, k + 1)?.1
                } else {
                    self.dsize
                };
                if ts > until {
                    break;
                }
                let start = pos.max(pos + ((from - ts) / 60).max(0) * 8);
                let end = (next_pos - 8).min(pos + ((until - ts) / 60) * 8);
                let mut off = start;
                while off <= end {
                    dat.seek(SeekFrom::Start(off as u64))?;
                    let mut buf = [0u8; 8];
                    dat.read_exact(&mut buf)?;
                    let value = f64::from_le_bytes(buf);
                    let record_ts = ts + 60 * ((off - pos) / 8);
                    if record_ts >= from && record_ts <= until {
                        out.push(Record::new(record_ts, value));
                    }
                    off += 8;
                }
                k += 1;
            }
        }

        for r in &self.tail {
            if r.ts >= from && r.ts <= until && r.ts > self.last_wr {
                out.push(*r);
            }
        }
        out.sort_by_key(|r| r.ts);
        out.dedup_by_key(|r| r.ts);
        Ok(out)
    }

    /// The record with the greatest timestamp `<= ts`, or
    /// [`Error::NoData`]. Mirrors spec.md §4.3's `LatestBefore`.
    pub fn latest_before(&self, ts: i64) -> Result<Record> {
        for r in self.tail.iter().rev() {
            if r.ts <= ts && r.ts % 60 == 0 {
                return Ok(*r);
            }
        }

        let entry_n = match self.bisect_le(ts)? {
            Some(n) => n,
            None => return Err(Error::NoData),
        };
        let n = self.isize / 16;
        let mut idx = File::open(&self.idx_path)?;
        let (entry_ts, pos) = read_idx_entry(&mut idx, entry_n)?;
        let next_pos = if entry_n + 1 < n {
            read_idx_entry(&mut idx, entry_n + 1)?.1
        } else {
            self.dsize
        };
        let max_k = ((ts - entry_ts) / 60).min((next_pos - pos) / 8 - 1);
        let off = pos + max_k * 8;
        let mut dat = File::open(&self.dat_path)?;
        dat.seek(SeekFrom::Start(off as u64))?;
        let mut buf = [0u8; 8];
        dat.read_exact(&mut buf)?;
        Ok(Record::new(entry_ts + 60 * max_k, f64::from_le_bytes(buf)))
    }
}

fn read_idx_entry(idx: &mut File, n: i64) -> Result<(i64, i64)> {
    idx.seek(SeekFrom::Start((16 * n) as u64))?;
    let mut buf = [0u8; 16];
    idx.read_exact(&mut buf)?;
    let ts = i64::from_le_bytes(buf[0..8].try_into().unwrap());
    let pos = i64::from_le_bytes(buf[8..16].try_into().unwrap());
    Ok((ts, pos))
}
