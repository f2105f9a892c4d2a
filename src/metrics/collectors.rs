//! Metric recording facade.
//!
//! `MetricsCollector` wraps the raw Prometheus metrics and keeps labeling
//! consistent. Every method is a no-op until `init_metrics()` has run, so
//! library users who do not export metrics pay nothing.

use super::prometheus::{
    JOBS_TOTAL, JOB_DURATION, LLM_LATENCY, LLM_REQUESTS_TOTAL, QUEUE_DEPTH, REQUESTS_IN_FLIGHT,
    RETRIES_TOTAL,
};
use crate::error::ErrorKind;
use crate::scheduler::{JobOutcome, Priority};

/// Metrics collector for recording controller and LLM metrics.
///
/// # Example
///
/// ```ignore
/// use sketch_gate::metrics::{init_metrics, MetricsCollector};
///
/// init_metrics().expect("Failed to init metrics");
/// let collector = MetricsCollector::new();
/// collector.update_queue_state(4, 3);
/// collector.record_llm_request("gemini", true, 1.2);
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct MetricsCollector;

impl MetricsCollector {
    /// Create a new MetricsCollector instance.
    pub fn new() -> Self {
        Self
    }

    /// Publish the controller's queue size and in-flight count.
    pub fn update_queue_state(&self, queue_size: usize, in_flight: usize) {
        if let Some(queue_depth) = QUEUE_DEPTH.get() {
            queue_depth.set(queue_size as f64);
        }
        if let Some(requests_in_flight) = REQUESTS_IN_FLIGHT.get() {
            requests_in_flight.set(in_flight as f64);
        }

        tracing::trace!(
            queue_size = queue_size,
            in_flight = in_flight,
            "Updated queue state metrics"
        );
    }

    /// Record a job reaching its terminal state.
    pub fn record_job(&self, priority: Priority, outcome: JobOutcome) {
        if let Some(jobs_total) = JOBS_TOTAL.get() {
            jobs_total
                .with_label_values(&[priority.as_str(), outcome.as_str()])
                .inc();
        }
    }

    /// Record how long one attempt of a job took.
    pub fn record_attempt(&self, priority: Priority, duration_secs: f64) {
        if let Some(job_duration) = JOB_DURATION.get() {
            job_duration
                .with_label_values(&[priority.as_str()])
                .observe(duration_secs);
        }
    }

    /// Record a retry being scheduled.
    pub fn record_retry(&self, kind: ErrorKind) {
        if let Some(retries_total) = RETRIES_TOTAL.get() {
            retries_total.with_label_values(&[kind.as_str()]).inc();
        }
    }

    /// Record an LLM API request.
    ///
    /// # Arguments
    ///
    /// * `backend` - Backend name (e.g. "gemini", "ollama")
    /// * `success` - Whether the request succeeded
    /// * `latency_secs` - Time until the response (or stream) was available
    pub fn record_llm_request(&self, backend: &str, success: bool, latency_secs: f64) {
        let status = if success { "success" } else { "failure" };

        if let Some(llm_requests) = LLM_REQUESTS_TOTAL.get() {
            llm_requests.with_label_values(&[backend, status]).inc();
        }

        if let Some(llm_latency) = LLM_LATENCY.get() {
            llm_latency
                .with_label_values(&[backend])
                .observe(latency_secs);
        }

        tracing::trace!(
            backend = backend,
            status = status,
            latency_secs = latency_secs,
            "Recorded LLM request metric"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::{export_metrics, init_metrics};

    fn ensure_metrics_init() {
        let _ = init_metrics();
    }

    #[test]
    fn test_metrics_collector_new() {
        let collector = MetricsCollector::new();
        assert!(std::mem::size_of_val(&collector) == 0);
    }

    #[test]
    fn test_record_job_outcomes() {
        ensure_metrics_init();
        let collector = MetricsCollector::new();

        collector.record_job(Priority::High, JobOutcome::Fulfilled);
        collector.record_job(Priority::Normal, JobOutcome::Cleared);

        let exported = export_metrics();
        assert!(exported.contains("sketch_gate_jobs_total"));
        assert!(exported.contains("outcome=\"cleared\""));
    }

    #[test]
    fn test_record_retry_and_attempt() {
        ensure_metrics_init();
        let collector = MetricsCollector::new();

        collector.record_retry(ErrorKind::RateLimited);
        collector.record_attempt(Priority::Normal, 0.25);

        let exported = export_metrics();
        assert!(exported.contains("kind=\"rate_limited\""));
    }

    #[test]
    fn test_update_queue_state() {
        ensure_metrics_init();
        let collector = MetricsCollector::new();

        collector.update_queue_state(5, 3);
        collector.update_queue_state(0, 0);
    }

    #[test]
    fn test_record_llm_request() {
        ensure_metrics_init();
        let collector = MetricsCollector::new();

        collector.record_llm_request("gemini", true, 2.5);
        collector.record_llm_request("ollama", false, 0.1);
    }
}
