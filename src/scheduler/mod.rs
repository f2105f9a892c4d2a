//! Request admission and retry controller.
//!
//! This module bounds and paces the outbound calls an application makes to a
//! remote model API:
//!
//! - **RequestController**: admits queued jobs, at most `max_concurrency` at a
//!   time and at least `min_start_spacing` apart
//! - **PendingQueue**: retry, high and normal lanes, FIFO within each lane
//! - **RetryPolicy**: exponential backoff for transient failures, keyed off
//!   a structured `ErrorKind`
//!
//! # Architecture
//!
//! ```text
//!    ┌─────────────┐   ┌─────────────┐
//!    │ ChatSession │   │ImageEnhancer│
//!    │   (high)    │   │  (normal)   │
//!    └─────┬───────┘   └─────┬───────┘
//!          │  submit()      │
//!          ▼                ▼
//!    ┌──────────────────────────────┐
//!    │ retry lane │ high │ normal   │   PendingQueue
//!    └──────────────┬───────────────┘
//!                   │ drain task (spacing, cap)
//!         ┌─────────┼─────────┐
//!         ▼         ▼         ▼
//!     ┌───────┐ ┌───────┐ ┌───────┐
//!     │ job 1 │ │ job 2 │ │ job 3 │     in flight
//!     └───────┘ └───────┘ └───────┘
//!         │ transient failure: backoff, then back into the retry lane
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! use sketch_gate::scheduler::{ControllerConfig, Priority, RequestController};
//!
//! let controller = RequestController::new(ControllerConfig::default());
//!
//! let handle = controller.submit(Priority::Normal, || async {
//!     call_the_api().await
//! });
//!
//! // Poll from a status indicator
//! let status = controller.status();
//! println!("{} queued, {} running", status.queue_size, status.concurrent_requests);
//!
//! let value = handle.await?;
//! ```

pub mod config;
pub mod controller;
pub mod job;
pub(crate) mod queue;
pub mod retry;

pub use config::ControllerConfig;
pub use controller::{QueueStatus, RequestController};
pub use job::{JobError, JobHandle, JobOutcome, Priority};
pub use retry::{Classify, RetryPolicy};
