//! The aggregation engine: per-metric state machines, tick/flush
//! scheduling, live-log ring buffers, and the watcher/subscription
//! fan-out (spec.md §4.2).

pub mod entry;
pub mod livelog;
pub mod server;
pub mod watcher;

pub use entry::MetricEntry;
pub use server::{Engine, EngineConfig, EngineHandle};
pub use watcher::{Watcher, WatcherHandle, WatcherKind};
