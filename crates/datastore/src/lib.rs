//! File-backed append-only time-series datastore (spec.md §4.3).
//!
//! Keys are opaque `metricName:channelName` strings. Each key owns a
//! `.dat`/`.idx` file pair plus an in-memory pending tail; a
//! partitioned writer worker drains tails to disk. Reads go through a
//! point-in-time [`stream::StreamSnapshot`] so the writer never races a
//! concurrent query.

pub mod glob;
pub mod hash;
pub mod shard;
pub mod store;
pub mod stream;
pub mod tail;

pub use hash::hash_name;
pub use store::{Datastore, DEFAULT_SHARDS};
pub use stream::{StreamSnapshot, StreamState};
