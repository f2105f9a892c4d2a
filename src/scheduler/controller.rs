//! Request admission controller.
//!
//! The controller sits between callers and the remote model API. It holds
//! submitted jobs in a [`PendingQueue`], admits at most `max_concurrency` of
//! them at a time, spaces consecutive starts by `min_start_spacing`, and
//! retries transient failures with exponential backoff.
//!
//! # Scheduling
//!
//! A single drain task admits jobs. It is spawned on demand by a submission
//! or by a job settling, and exits as soon as the queue is empty or the
//! concurrency cap is reached. Admitted jobs run in their own tasks; the
//! drain task never waits for them.
//!
//! All state lives behind one mutex that is never held across an `.await`.
//! Every transition (admit, re-queue after backoff, release, drain hand-off)
//! happens inside a single critical section.

use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use futures::FutureExt;
use serde::Serialize;
use tokio::time::{sleep, Instant};
use tracing::{debug, error, info, warn};

use super::config::ControllerConfig;
use super::job::{Job, JobError, JobHandle, JobOutcome, Priority, Termination};
use super::queue::PendingQueue;
use super::retry::Classify;
use crate::error::ConfigError;
use crate::metrics::MetricsCollector;

/// Point-in-time view of the controller, meant to be polled by a UI.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueStatus {
    /// Jobs waiting for admission.
    pub queue_size: usize,
    /// Jobs admitted and not yet settled, including those in retry backoff.
    pub concurrent_requests: usize,
    /// Whether the drain task is currently running.
    pub is_processing: bool,
}

impl QueueStatus {
    /// Returns true when nothing is queued or running.
    pub fn is_idle(&self) -> bool {
        self.queue_size == 0 && self.concurrent_requests == 0
    }
}

struct ControllerState {
    queue: PendingQueue,
    in_flight: usize,
    draining: bool,
    last_start: Option<Instant>,
}

struct Shared {
    config: ControllerConfig,
    state: Mutex<ControllerState>,
    metrics: MetricsCollector,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, ControllerState> {
        // No code panics while holding the lock, so a poisoned state is still consistent.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Writes queue depth and in-flight count to the process-wide gauges.
    ///
    /// The gauges are unlabelled, so they describe one controller per
    /// process. With several controllers the last writer wins.
    fn publish(&self, state: &ControllerState) {
        self.metrics
            .update_queue_state(state.queue.len(), state.in_flight);
    }
}

/// Bounded, spaced, retrying executor for outbound API calls.
///
/// Cloning is cheap and every clone drives the same queue. Construct one per
/// application and hand clones to the components that submit work. The
/// queue gauges exported through [`crate::metrics`] assume a single
/// controller per process.
///
/// # Example
///
/// ```ignore
/// use sketch_gate::scheduler::{ControllerConfig, Priority, RequestController};
///
/// let controller = RequestController::new(ControllerConfig::default());
/// let reply = controller
///     .submit(Priority::High, move || {
///         let backend = backend.clone();
///         async move { backend.generate(request.clone()).await }
///     })
///     .await?;
/// ```
#[derive(Clone)]
pub struct RequestController {
    shared: Arc<Shared>,
}

impl RequestController {
    /// Creates a controller with an empty queue.
    ///
    /// A concurrency cap of zero would never admit anything, so it is raised
    /// to 1.
    pub fn new(mut config: ControllerConfig) -> Self {
        if let Err(err) = config.validate() {
            warn!(error = %err, "Invalid controller config, using a concurrency cap of 1");
            config.max_concurrency = 1;
        }

        Self {
            shared: Arc::new(Shared {
                config,
                state: Mutex::new(ControllerState {
                    queue: PendingQueue::new(),
                    in_flight: 0,
                    draining: false,
                    last_start: None,
                }),
                metrics: MetricsCollector::new(),
            }),
        }
    }

    /// Creates a controller configured from `SKETCH_GATE_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self::new(ControllerConfig::from_env()?))
    }

    /// Returns the controller's configuration.
    pub fn config(&self) -> &ControllerConfig {
        &self.shared.config
    }

    /// Queues a job and returns a handle resolving to its result.
    ///
    /// `body` is called once per attempt; a retry calls it again from
    /// scratch. The job is queued before this function returns, so the
    /// relative order of submissions is the order of the calls. Failures are
    /// only ever reported through the handle.
    ///
    /// # Panics
    ///
    /// Panics if called outside a Tokio runtime.
    pub fn submit<T, E, F, Fut>(&self, priority: Priority, body: F) -> JobHandle<T, E>
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        T: Send + 'static,
        E: Classify + fmt::Display + Send + 'static,
    {
        let (job, handle) = Job::new(priority, body);
        let job_id = job.id;

        let queue_size = {
            let mut state = self.shared.lock();
            state.queue.push(job);
            self.shared.publish(&state);
            state.queue.len()
        };

        info!(
            job_id = %job_id,
            priority = %priority,
            queue_size = queue_size,
            "Job queued"
        );

        kick(&self.shared);
        handle
    }

    /// Submits a job and waits for its result.
    pub async fn run<T, E, F, Fut>(&self, priority: Priority, body: F) -> Result<T, JobError<E>>
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        T: Send + 'static,
        E: Classify + fmt::Display + Send + 'static,
    {
        self.submit(priority, body).await
    }

    /// Returns a snapshot of the queue. Never blocks on running jobs.
    pub fn status(&self) -> QueueStatus {
        let state = self.shared.lock();
        QueueStatus {
            queue_size: state.queue.len(),
            concurrent_requests: state.in_flight,
            is_processing: state.draining,
        }
    }

    /// Fails every job that has not been admitted yet with
    /// [`JobError::Cleared`] and returns how many there were.
    ///
    /// Admitted jobs keep running, and may still retry.
    pub fn clear_queue(&self) -> usize {
        let cleared = {
            let mut state = self.shared.lock();
            let jobs = state.queue.drain_all();
            self.shared.publish(&state);
            jobs
        };

        let count = cleared.len();
        info!(count = count, "Clearing pending jobs");

        for job in cleared {
            self.shared.metrics.record_job(job.priority, JobOutcome::Cleared);
            job.body.terminate(Termination::Cleared);
        }

        count
    }
}

impl Default for RequestController {
    fn default() -> Self {
        Self::new(ControllerConfig::default())
    }
}

impl fmt::Debug for RequestController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestController")
            .field("config", &self.shared.config)
            .field("status", &self.status())
            .finish()
    }
}

/// Starts the drain task unless it is already running or has nothing to do.
fn kick(shared: &Arc<Shared>) {
    {
        let mut state = shared.lock();
        if state.draining
            || state.queue.is_empty()
            || state.in_flight >= shared.config.max_concurrency
        {
            return;
        }
        state.draining = true;
    }

    tokio::spawn(drain(Arc::clone(shared)));
}

enum DrainStep {
    Idle,
    Wait(Duration),
    Admit(Job, usize),
}

/// Admits queued jobs while capacity and spacing allow.
async fn drain(shared: Arc<Shared>) {
    debug!("Drain loop started");

    loop {
        let step = {
            let mut state = shared.lock();
            let spacing = shared.config.min_start_spacing;
            let wait = state
                .last_start
                .map(|last| spacing.saturating_sub(last.elapsed()))
                .unwrap_or(Duration::ZERO);

            if state.queue.is_empty() || state.in_flight >= shared.config.max_concurrency {
                state.draining = false;
                DrainStep::Idle
            } else if !wait.is_zero() {
                DrainStep::Wait(wait)
            } else {
                match state.queue.pop() {
                    Some(job) => {
                        state.last_start = Some(Instant::now());
                        state.in_flight += 1;
                        shared.publish(&state);
                        DrainStep::Admit(job, state.in_flight)
                    }
                    None => {
                        state.draining = false;
                        DrainStep::Idle
                    }
                }
            }
        };

        match step {
            DrainStep::Idle => break,
            DrainStep::Wait(wait) => {
                debug!(wait_ms = wait.as_millis() as u64, "Spacing job starts");
                sleep(wait).await;
            }
            DrainStep::Admit(job, in_flight) => {
                info!(
                    job_id = %job.id,
                    priority = %job.priority,
                    attempt = job.retry_count + 1,
                    queued_ms = job.submitted_at.elapsed().as_millis() as u64,
                    in_flight = in_flight,
                    "Admitting job"
                );
                tokio::spawn(execute(Arc::clone(&shared), job));
            }
        }
    }

    debug!("Drain loop stopped");
}

/// Runs one attempt of an admitted job and settles, retries, or releases it.
async fn execute(shared: Arc<Shared>, mut job: Job) {
    let job_id = job.id;
    let priority = job.priority;
    let started = Instant::now();

    let result = AssertUnwindSafe(job.body.attempt()).catch_unwind().await;
    shared
        .metrics
        .record_attempt(priority, started.elapsed().as_secs_f64());

    let outcome = match result {
        Ok(Ok(())) => {
            info!(
                job_id = %job_id,
                duration_ms = started.elapsed().as_millis() as u64,
                "Job completed successfully"
            );
            JobOutcome::Fulfilled
        }
        Ok(Err(failure)) => {
            let policy = shared.config.retry;
            if policy.should_retry(failure.kind, job.retry_count) {
                job.retry_count += 1;
                let delay = policy.backoff(job.retry_count);

                warn!(
                    job_id = %job_id,
                    kind = %failure.kind,
                    error = %failure.message,
                    retry = job.retry_count,
                    max_retries = policy.max_retries,
                    delay_ms = delay.as_millis() as u64,
                    "Job failed, retrying after backoff"
                );
                shared.metrics.record_retry(failure.kind);

                // The slot stays occupied through the backoff.
                sleep(delay).await;

                {
                    let mut state = shared.lock();
                    state.queue.push_retry(job);
                    state.in_flight -= 1;
                    shared.publish(&state);
                }
                kick(&shared);
                return;
            }

            error!(
                job_id = %job_id,
                kind = %failure.kind,
                error = %failure.message,
                retries = job.retry_count,
                "Job failed permanently"
            );
            job.body.terminate(Termination::Exhausted);
            JobOutcome::Failed
        }
        Err(_) => {
            error!(job_id = %job_id, "Job body panicked, abandoning job");
            job.body.terminate(Termination::Abandoned);
            JobOutcome::Abandoned
        }
    };

    shared.metrics.record_job(priority, outcome);

    {
        let mut state = shared.lock();
        state.in_flight -= 1;
        shared.publish(&state);
    }
    kick(&shared);
}
