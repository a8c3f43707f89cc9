//! The metric-type registry: families, channel metadata, per-metric
//! state constructors, and query-time aggregators (spec.md §4.1).

pub mod aggregator;
pub mod descriptor;
pub mod family;
pub mod registry;
pub mod state;

pub use aggregator::{create_aggregator, Aggregator};
pub use descriptor::{descriptor, FamilyDescriptor};
pub use family::Family;
pub use registry::{channel_index, resolve_channels};
pub use state::{create_state, MetricState};
