//! The single unit of stored history: a timestamped sample.

use serde::{Deserialize, Serialize};

/// Every ring buffer holds `LIVE_LOG_SIZE` per-second samples per channel
/// (10 minutes at 1 Hz).
pub const LIVE_LOG_SIZE: usize = 600;

/// `(timestamp, value)` as stored by the datastore and carried through
/// query results. Timestamps written by the engine are always multiples
/// of 60; the datastore itself is agnostic to that convention.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub ts: i64,
    pub value: f64,
}

impl Record {
    pub fn new(ts: i64, value: f64) -> Self {
        Self { ts, value }
    }
}

/// Floors `ts` to the nearest lower multiple of 60.
pub fn align_minute(ts: i64) -> i64 {
    ts - ts.rem_euclid(60)
}
