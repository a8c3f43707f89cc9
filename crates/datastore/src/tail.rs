//! Durable pending-tail file: `saveTails`/`loadTails` (spec.md §4.3).
//!
//! Format: `uint64 nStreams`, then per stream `uint64 nameLen; uint64
//! tailLen; bytes name; [tailLen]{int64 ts, float64 value}`. All
//! integers little-endian. A truncated or malformed file fails to
//! load outright — the caller decides whether to delete and retry.

use std::collections::BTreeMap;
use std::io::{Read, Write};
use std::path::Path;

use metricsd_core::{Error, Record, Result};

pub fn save_tails(path: &Path, tails: &BTreeMap<String, Vec<Record>>) -> Result<()> {
    let tmp_path = path.with_extension("tmp");
    let mut buf = Vec::new();
    buf.extend_from_slice(&(tails.len() as u64).to_le_bytes());
    for (name, records) in tails {
        let name_bytes = name.as_bytes();
        buf.extend_from_slice(&(name_bytes.len() as u64).to_le_bytes());
        buf.extend_from_slice(&(records.len() as u64).to_le_bytes());
        buf.extend_from_slice(name_bytes);
        for r in records {
            buf.extend_from_slice(&r.ts.to_le_bytes());
            buf.extend_from_slice(&r.value.to_le_bytes());
        }
    }

    let mut file = std::fs::File::create(&tmp_path)?;
    file.write_all(&buf)?;
    file.sync_all()?;
    drop(file);
    std::fs::rename(&tmp_path, path)?;
    Ok(())
}

pub fn load_tails(path: &Path) -> Result<BTreeMap<String, Vec<Record>>> {
    if !path.exists() {
        return Ok(BTreeMap::new());
    }

    let mut data = Vec::new();
    std::fs::File::open(path)?.read_to_end(&mut data)?;
    let mut cursor = Cursor::new(&data);

    let n_streams = cursor.read_u64()?;
    let mut out = BTreeMap::new();
    for _ in 0..n_streams {
        let name_len = cursor.read_u64()? as usize;
        let tail_len = cursor.read_u64()? as usize;
        let name_bytes = cursor.read_bytes(name_len)?;
        let name = String::from_utf8(name_bytes.to_vec())
            .map_err(|e| Error::invalid(format!("corrupt tail_data name: {e}")))?;

        let mut records = Vec::with_capacity(tail_len);
        for _ in 0..tail_len {
            let ts = cursor.read_i64()?;
            let value = cursor.read_f64()?;
            records.push(Record::new(ts, value));
        }
        out.insert(name, records);
    }
    Ok(out)
}

struct Cursor<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn read_bytes(&mut self, n: usize) -> Result<&'a [u8]> {
        if self.pos + n > self.data.len() {
            return Err(Error::invalid("truncated tail_data file"));
        }
        let out = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(out)
    }

    fn read_u64(&mut self) -> Result<u64> {
        Ok(u64::from_le_bytes(self.read_bytes(8)?.try_into().unwrap()))
    }

    fn read_i64(&mut self) -> Result<i64> {
        Ok(i64::from_le_bytes(self.read_bytes(8)?.try_into().unwrap()))
    }

    fn read_f64(&mut self) -> Result<f64> {
        Ok(f64::from_le_bytes(self.read_bytes(8)?.try_into().unwrap()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tail_data");
        save_tails(&path, &BTreeMap::new()).unwrap();
        let loaded = load_tails(&path).unwrap();
        assert!(loaded.is_empty());
    }

    #[test]
    fn missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let loaded = load_tails(&dir.path().join("tail_data")).unwrap();
        assert!(loaded.is_empty());
    }

    #[test]
    fn round_trips_pending_records() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tail_data");
        let mut tails = BTreeMap::new();
        tails.insert(
            "app:counter".to_string(),
            vec![Record::new(120, 3.0), Record::new(180, 4.0)],
        );
        tails.insert("app:gauge".to_string(), vec![Record::new(120, 7.5)]);
        save_tails(&path, &tails).unwrap();

        let loaded = load_tails(&path).unwrap();
        assert_eq!(loaded, tails);
    }

    #[test]
    fn truncated_file_fails_to_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tail_data");
        std::fs::write(&path, [1, 0, 0, 0, 0, 0, 0, 0]).unwrap();
        assert!(load_tails(&path).is_err());
    }
}
