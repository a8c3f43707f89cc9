//! Internal telemetry: structured logging setup, process health, and
//! self-observability metrics for metricsd.

pub mod health;
pub mod metrics;
pub mod tracing_setup;

pub use health::*;
pub use metrics::*;
pub use tracing_setup::*;
