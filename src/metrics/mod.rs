//! Metrics module for Prometheus-based monitoring.
//!
//! Tracks the request controller (queue depth, in-flight jobs, outcomes,
//! retries) and the LLM backends behind it.
//!
//! # Example
//!
//! ```ignore
//! use sketch_gate::metrics::{init_metrics, export_metrics};
//!
//! init_metrics().expect("Failed to initialize metrics");
//! // ... run the controller ...
//! println!("{}", export_metrics());
//! ```

pub mod collectors;
pub mod prometheus;

pub use collectors::MetricsCollector;
pub use prometheus::{export_metrics, init_metrics};

pub use prometheus::{
    JOBS_TOTAL, JOB_DURATION, LLM_LATENCY, LLM_REQUESTS_TOTAL, QUEUE_DEPTH, REGISTRY,
    REQUESTS_IN_FLIGHT, RETRIES_TOTAL,
};
