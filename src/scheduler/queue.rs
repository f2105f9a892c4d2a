//! Pending-job queue with priority classes.
//!
//! The queue keeps three FIFO lanes and always serves them in this order:
//!
//! - `retry`: jobs re-inserted after a failed attempt and its backoff
//! - `high`: fresh `Priority::High` submissions
//! - `normal`: fresh `Priority::Normal` submissions
//!
//! Within a lane jobs leave in the order they entered, so repeated
//! high-priority submissions keep their submission order.

use std::collections::VecDeque;

use super::job::{Job, Priority};

/// Ordered collection of jobs waiting for admission.
#[derive(Debug, Default)]
pub(crate) struct PendingQueue {
    retry: VecDeque<Job>,
    high: VecDeque<Job>,
    normal: VecDeque<Job>,
}

impl PendingQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a fresh submission behind every job of its class.
    pub fn push(&mut self, job: Job) {
        match job.priority {
            Priority::High => self.high.push_back(job),
            Priority::Normal => self.normal.push_back(job),
        }
    }

    /// Adds a job that is being retried, ahead of all fresh work.
    pub fn push_retry(&mut self, job: Job) {
        self.retry.push_back(job);
    }

    /// Removes the next job to admit.
    pub fn pop(&mut self) -> Option<Job> {
        self.retry
            .pop_front()
            .or_else(|| self.high.pop_front())
            .or_else(|| self.normal.pop_front())
    }

    pub fn len(&self) -> usize {
        self.retry.len() + self.high.len() + self.normal.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Empties the queue, returning the removed jobs in admission order.
    pub fn drain_all(&mut self) -> Vec<Job> {
        let mut drained = Vec::with_capacity(self.len());
        drained.extend(self.retry.drain(..));
        drained.extend(self.high.drain(..));
        drained.extend(self.normal.drain(..));
        drained
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::LlmError;
    use uuid::Uuid;

    fn create_test_job(priority: Priority) -> (Job, Uuid) {
        let (job, handle) = Job::new(priority, || async { Ok::<_, LlmError>(()) });
        (job, handle.id())
    }

    fn pop_id(queue: &mut PendingQueue) -> Option<Uuid> {
        queue.pop().map(|job| job.id)
    }

    #[test]
    fn test_empty_queue() {
        let mut queue = PendingQueue::new();
        assert!(queue.is_empty());
        assert_eq!(queue.len(), 0);
        assert!(queue.pop().is_none());
        assert!(queue.drain_all().is_empty());
    }

    #[test]
    fn test_normal_jobs_are_fifo() {
        let mut queue = PendingQueue::new();
        let (a, a_id) = create_test_job(Priority::Normal);
        let (b, b_id) = create_test_job(Priority::Normal);
        queue.push(a);
        queue.push(b);

        assert_eq!(pop_id(&mut queue), Some(a_id));
        assert_eq!(pop_id(&mut queue), Some(b_id));
    }

    #[test]
    fn test_high_jumps_ahead_of_normal() {
        let mut queue = PendingQueue::new();
        let (normal, normal_id) = create_test_job(Priority::Normal);
        let (high, high_id) = create_test_job(Priority::High);
        queue.push(normal);
        queue.push(high);

        assert_eq!(queue.len(), 2);
        assert_eq!(pop_id(&mut queue), Some(high_id));
        assert_eq!(pop_id(&mut queue), Some(normal_id));
    }

    #[test]
    fn test_high_jobs_keep_submission_order() {
        let mut queue = PendingQueue::new();
        let (h1, h1_id) = create_test_job(Priority::High);
        let (h2, h2_id) = create_test_job(Priority::High);
        queue.push(h1);
        queue.push(h2);

        assert_eq!(pop_id(&mut queue), Some(h1_id));
        assert_eq!(pop_id(&mut queue), Some(h2_id));
    }

    #[test]
    fn test_retries_come_first() {
        let mut queue = PendingQueue::new();
        let (normal, normal_id) = create_test_job(Priority::Normal);
        let (high, high_id) = create_test_job(Priority::High);
        let (retried, retried_id) = create_test_job(Priority::Normal);
        queue.push(normal);
        queue.push(high);
        queue.push_retry(retried);

        assert_eq!(pop_id(&mut queue), Some(retried_id));
        assert_eq!(pop_id(&mut queue), Some(high_id));
        assert_eq!(pop_id(&mut queue), Some(normal_id));
        assert!(queue.is_empty());
    }

    #[test]
    fn test_drain_all_in_admission_order() {
        let mut queue = PendingQueue::new();
        let (normal, normal_id) = create_test_job(Priority::Normal);
        let (high, high_id) = create_test_job(Priority::High);
        let (retried, retried_id) = create_test_job(Priority::High);
        queue.push(normal);
        queue.push(high);
        queue.push_retry(retried);

        let drained: Vec<Uuid> = queue.drain_all().into_iter().map(|job| job.id).collect();
        assert_eq!(drained, vec![retried_id, high_id, normal_id]);
        assert!(queue.is_empty());
    }
}
