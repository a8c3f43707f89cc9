//! HTTP/WebSocket query API for metricsd (spec.md §6).
//!
//! Three query types dispatched from one router: `live` (rolling
//! per-second history), `archive` (historical per-minute windows), and
//! `list` (stream name enumeration). Both CSV (plain HTTP) and a
//! WebSocket streaming mode share the same query parameters.

pub mod response;
pub mod routes;
pub mod state;

pub use routes::router;
pub use state::AppState;
