//! Job definitions for the request controller.
//!
//! This module defines the core job types used by the controller:
//!
//! - `Priority`: admission class of a job
//! - `JobHandle`: the caller's side of a submitted job, a future of its result
//! - `JobError`: how a job can fail from the caller's point of view
//! - `JobOutcome`: terminal state of a job, for logs and metrics
//! - `Job`: the controller's side, a type-erased unit of work

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::oneshot;
use tokio::time::Instant;
use uuid::Uuid;

use super::retry::Classify;
use crate::error::ErrorKind;

/// Admission class of a job.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum Priority {
    /// Interactive work; jumps ahead of every waiting `Normal` job.
    High,
    /// Background work, served in submission order.
    #[default]
    Normal,
}

impl Priority {
    /// Stable lowercase name, used for log fields and metric labels.
    pub fn as_str(self) -> &'static str {
        match self {
            Priority::High => "high",
            Priority::Normal => "normal",
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failure of a submitted job as seen by its caller.
#[derive(Debug, Error)]
pub enum JobError<E> {
    /// The job body failed and was not (or no longer) retried.
    /// Carries the last error the body returned.
    #[error("{0}")]
    Failed(E),

    /// The job was still waiting when the queue was cleared.
    #[error("Queue cleared")]
    Cleared,

    /// The job body panicked; its result will never arrive.
    #[error("Job abandoned: body panicked")]
    Abandoned,
}

impl<E> JobError<E> {
    /// Returns the body's error, if the job failed on its own.
    pub fn into_inner(self) -> Option<E> {
        match self {
            JobError::Failed(err) => Some(err),
            JobError::Cleared | JobError::Abandoned => None,
        }
    }

    /// Returns whether the job was discarded by `clear_queue`.
    pub fn is_cleared(&self) -> bool {
        matches!(self, JobError::Cleared)
    }
}

/// Terminal state of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobOutcome {
    /// The body returned a value.
    Fulfilled,
    /// The body failed permanently.
    Failed,
    /// Discarded from the queue before admission.
    Cleared,
    /// The body panicked.
    Abandoned,
}

impl JobOutcome {
    /// Stable lowercase name, used for log fields and metric labels.
    pub fn as_str(self) -> &'static str {
        match self {
            JobOutcome::Fulfilled => "fulfilled",
            JobOutcome::Failed => "failed",
            JobOutcome::Cleared => "cleared",
            JobOutcome::Abandoned => "abandoned",
        }
    }
}

impl fmt::Display for JobOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The caller's handle on a submitted job.
///
/// Resolves exactly once with the job's result. Dropping the handle does not
/// cancel the job.
#[must_use = "a JobHandle does nothing unless awaited; the job runs regardless"]
pub struct JobHandle<T, E> {
    id: Uuid,
    rx: oneshot::Receiver<Result<T, JobError<E>>>,
}

impl<T, E> JobHandle<T, E> {
    /// Unique identifier of the job.
    pub fn id(&self) -> Uuid {
        self.id
    }
}

impl<T, E> fmt::Debug for JobHandle<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JobHandle").field("id", &self.id).finish()
    }
}

impl<T, E> Future for JobHandle<T, E> {
    type Output = Result<T, JobError<E>>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        match Pin::new(&mut this.rx).poll(cx) {
            Poll::Ready(Ok(result)) => Poll::Ready(result),
            // The sender only disappears without a value if the job was lost.
            Poll::Ready(Err(_)) => Poll::Ready(Err(JobError::Abandoned)),
            Poll::Pending => Poll::Pending,
        }
    }
}

/// Summary of one failed attempt, enough for the retry policy and logs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct AttemptFailure {
    pub kind: ErrorKind,
    pub message: String,
}

/// Why a job is being settled without a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Termination {
    /// Deliver the last error the body returned.
    Exhausted,
    /// Deliver `JobError::Cleared`.
    Cleared,
    /// Deliver `JobError::Abandoned`.
    Abandoned,
}

/// Type-erased job body plus its completion channel.
#[async_trait]
pub(crate) trait JobBody: Send {
    /// Runs the body once. On success the value has already been delivered.
    async fn attempt(&mut self) -> Result<(), AttemptFailure>;

    /// Settles the job without a value.
    fn terminate(self: Box<Self>, how: Termination);
}

struct Submitted<T, E, F> {
    body: F,
    reply: Option<oneshot::Sender<Result<T, JobError<E>>>>,
    last_error: Option<E>,
}

impl<T, E, F> Submitted<T, E, F> {
    fn deliver(&mut self, result: Result<T, JobError<E>>) {
        if let Some(reply) = self.reply.take() {
            // The caller may have dropped its handle; that is not an error.
            let _ = reply.send(result);
        }
    }
}

#[async_trait]
impl<T, E, F, Fut> JobBody for Submitted<T, E, F>
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = Result<T, E>> + Send + 'static,
    T: Send + 'static,
    E: Classify + fmt::Display + Send + 'static,
{
    async fn attempt(&mut self) -> Result<(), AttemptFailure> {
        match (self.body)().await {
            Ok(value) => {
                self.deliver(Ok(value));
                Ok(())
            }
            Err(err) => {
                let failure = AttemptFailure {
                    kind: err.kind(),
                    message: err.to_string(),
                };
                self.last_error = Some(err);
                Err(failure)
            }
        }
    }

    fn terminate(mut self: Box<Self>, how: Termination) {
        let error = match how {
            Termination::Exhausted => match self.last_error.take() {
                Some(err) => JobError::Failed(err),
                None => JobError::Abandoned,
            },
            Termination::Cleared => JobError::Cleared,
            Termination::Abandoned => JobError::Abandoned,
        };
        self.deliver(Err(error));
    }
}

/// A queued or in-flight unit of work.
pub(crate) struct Job {
    pub id: Uuid,
    pub priority: Priority,
    pub retry_count: u32,
    pub submitted_at: Instant,
    pub body: Box<dyn JobBody>,
}

impl Job {
    /// Wraps a job body and returns it with the caller's handle.
    pub fn new<T, E, F, Fut>(priority: Priority, body: F) -> (Self, JobHandle<T, E>)
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        T: Send + 'static,
        E: Classify + fmt::Display + Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        let id = Uuid::new_v4();
        let job = Self {
            id,
            priority,
            retry_count: 0,
            submitted_at: Instant::now(),
            body: Box::new(Submitted {
                body,
                reply: Some(tx),
                last_error: None,
            }),
        };
        (job, JobHandle { id, rx })
    }
}

impl fmt::Debug for Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Job")
            .field("id", &self.id)
            .field("priority", &self.priority)
            .field("retry_count", &self.retry_count)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::LlmError;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_priority_default_and_display() {
        assert_eq!(Priority::default(), Priority::Normal);
        assert_eq!(format!("{}", Priority::High), "high");
        assert_eq!(format!("{}", Priority::Normal), "normal");
    }

    #[test]
    fn test_job_outcome_display() {
        assert_eq!(JobOutcome::Fulfilled.to_string(), "fulfilled");
        assert_eq!(JobOutcome::Failed.to_string(), "failed");
        assert_eq!(JobOutcome::Cleared.to_string(), "cleared");
        assert_eq!(JobOutcome::Abandoned.to_string(), "abandoned");
    }

    #[test]
    fn test_job_error_helpers() {
        let err: JobError<LlmError> = JobError::Cleared;
        assert!(err.is_cleared());
        assert!(err.to_string().contains("cleared"));
        assert!(err.into_inner().is_none());

        let err = JobError::Failed(LlmError::Timeout("slow".to_string()));
        assert!(!err.is_cleared());
        assert!(err.to_string().contains("slow"));
        assert!(matches!(err.into_inner(), Some(LlmError::Timeout(_))));
    }

    #[tokio::test]
    async fn test_successful_attempt_delivers_value() {
        let (mut job, handle) = Job::new(Priority::Normal, || async { Ok::<_, LlmError>(7) });

        assert_eq!(job.retry_count, 0);
        assert_eq!(job.id, handle.id());
        assert!(job.body.attempt().await.is_ok());
        assert_eq!(handle.await.expect("value delivered"), 7);
    }

    #[tokio::test]
    async fn test_exhausted_job_delivers_last_error() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);
        let (mut job, handle) = Job::new(Priority::High, move || {
            let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
            async move { Err::<(), _>(LlmError::Upstream(format!("timeout #{}", n))) }
        });

        let first = job.body.attempt().await.expect_err("body fails");
        assert_eq!(first.kind, ErrorKind::Timeout);
        let second = job.body.attempt().await.expect_err("body fails again");
        assert!(second.message.contains("#2"));

        job.body.terminate(Termination::Exhausted);
        match handle.await {
            Err(JobError::Failed(err)) => assert!(err.to_string().contains("#2")),
            other => panic!("unexpected result: {:?}", other),
        }
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_cleared_job() {
        let (job, handle) = Job::new(Priority::Normal, || async { Ok::<_, LlmError>(()) });
        job.body.terminate(Termination::Cleared);
        assert!(matches!(handle.await, Err(JobError::Cleared)));
    }

    #[tokio::test]
    async fn test_dropped_job_resolves_abandoned() {
        let (job, handle) = Job::new(Priority::Normal, || async { Ok::<_, LlmError>(()) });
        drop(job);
        assert!(matches!(handle.await, Err(JobError::Abandoned)));
    }
}
