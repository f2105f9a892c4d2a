//! Prometheus metrics registration and export.
//!
//! This module defines all Prometheus metrics used by sketch-gate and provides
//! functions for initializing, registering, and exporting metrics.

use prometheus::{
    CounterVec, Encoder, Gauge, HistogramOpts, HistogramVec, Opts, Registry, TextEncoder,
};
use std::sync::OnceLock;

/// Global Prometheus registry for all sketch-gate metrics.
pub static REGISTRY: OnceLock<Registry> = OnceLock::new();

/// Number of jobs waiting for admission. Assumes one controller per process.
pub static QUEUE_DEPTH: OnceLock<Gauge> = OnceLock::new();

/// Number of jobs currently admitted (executing or in retry backoff).
pub static REQUESTS_IN_FLIGHT: OnceLock<Gauge> = OnceLock::new();

/// Jobs that reached a terminal state, labeled by priority and outcome.
pub static JOBS_TOTAL: OnceLock<CounterVec> = OnceLock::new();

/// Retries scheduled, labeled by error kind.
pub static RETRIES_TOTAL: OnceLock<CounterVec> = OnceLock::new();

/// Duration of a single job attempt in seconds, labeled by priority.
pub static JOB_DURATION: OnceLock<HistogramVec> = OnceLock::new();

/// Total LLM API requests, labeled by backend and status.
pub static LLM_REQUESTS_TOTAL: OnceLock<CounterVec> = OnceLock::new();

/// LLM API request latency in seconds, labeled by backend.
pub static LLM_LATENCY: OnceLock<HistogramVec> = OnceLock::new();

/// Initialize all metrics and register them with the registry.
///
/// Call once at application startup. Repeated calls are harmless: the first
/// registry wins.
///
/// # Errors
///
/// Returns a `prometheus::Error` if metric registration fails.
pub fn init_metrics() -> Result<(), prometheus::Error> {
    let registry = Registry::new();

    let queue_depth = Gauge::new(
        "sketch_gate_queue_depth",
        "Number of jobs waiting for admission",
    )?;

    let requests_in_flight = Gauge::new(
        "sketch_gate_requests_in_flight",
        "Number of admitted jobs not yet settled",
    )?;

    let jobs_total = CounterVec::new(
        Opts::new("sketch_gate_jobs_total", "Jobs that reached a terminal state"),
        &["priority", "outcome"],
    )?;

    let retries_total = CounterVec::new(
        Opts::new("sketch_gate_retries_total", "Retries scheduled after a failed attempt"),
        &["kind"],
    )?;

    let job_duration = HistogramVec::new(
        HistogramOpts::new(
            "sketch_gate_job_duration_seconds",
            "Duration of a single job attempt in seconds",
        )
        .buckets(vec![0.1, 0.5, 1.0, 2.0, 5.0, 10.0, 30.0, 60.0]),
        &["priority"],
    )?;

    let llm_requests_total = CounterVec::new(
        Opts::new("sketch_gate_llm_requests_total", "Total LLM API requests"),
        &["backend", "status"],
    )?;

    let llm_latency = HistogramVec::new(
        HistogramOpts::new(
            "sketch_gate_llm_latency_seconds",
            "LLM API request latency in seconds",
        )
        .buckets(vec![0.5, 1.0, 2.0, 5.0, 10.0, 30.0]),
        &["backend"],
    )?;

    registry.register(Box::new(queue_depth.clone()))?;
    registry.register(Box::new(requests_in_flight.clone()))?;
    registry.register(Box::new(jobs_total.clone()))?;
    registry.register(Box::new(retries_total.clone()))?;
    registry.register(Box::new(job_duration.clone()))?;
    registry.register(Box::new(llm_requests_total.clone()))?;
    registry.register(Box::new(llm_latency.clone()))?;

    // If any of these fail, metrics were already initialized (idempotent)
    let _ = REGISTRY.set(registry);
    let _ = QUEUE_DEPTH.set(queue_depth);
    let _ = REQUESTS_IN_FLIGHT.set(requests_in_flight);
    let _ = JOBS_TOTAL.set(jobs_total);
    let _ = RETRIES_TOTAL.set(retries_total);
    let _ = JOB_DURATION.set(job_duration);
    let _ = LLM_REQUESTS_TOTAL.set(llm_requests_total);
    let _ = LLM_LATENCY.set(llm_latency);

    tracing::info!("Prometheus metrics initialized successfully");

    Ok(())
}

/// Export all registered metrics in Prometheus text format.
///
/// Returns an explanatory comment line if the registry has not been
/// initialized or encoding fails.
pub fn export_metrics() -> String {
    let Some(registry) = REGISTRY.get() else {
        return "# Metrics not initialized. Call init_metrics() first.\n".to_string();
    };

    let encoder = TextEncoder::new();
    let metric_families = registry.gather();

    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        return format!("# Error encoding metrics: {}\n", e);
    }

    String::from_utf8(buffer)
        .unwrap_or_else(|e| format!("# Error converting metrics to UTF-8: {}\n", e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_metrics() {
        let result = init_metrics();
        assert!(result.is_ok() || REGISTRY.get().is_some());
    }

    #[test]
    fn test_export_metrics_never_empty() {
        // Either real output or the uninitialized notice, depending on test order
        let metrics = export_metrics();
        assert!(!metrics.is_empty());
    }

    #[test]
    fn test_metrics_after_init() {
        let _ = init_metrics();

        if let Some(gauge) = QUEUE_DEPTH.get() {
            gauge.set(2.0);
        }

        let metrics = export_metrics();
        assert!(!metrics.starts_with("# Error"));
        assert!(metrics.contains("sketch_gate_queue_depth"));
    }
}
