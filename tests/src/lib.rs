//! Shared integration-test harness for metricsd.

pub mod setup;
