// Observability: Prometheus metrics for every pipeline stage

pub mod metrics;

pub use metrics::{init, render, write_snapshot, MetricName};
