//! sketch-gate: paced, retrying access to generative AI models for a
//! drawing companion.
//!
//! The [`scheduler`] module admits outbound API calls under a concurrency
//! cap and a minimum start spacing, and retries transient failures with
//! exponential backoff. The [`llm`] module builds the chat and image
//! enhancement collaborators on top of it.

pub mod cli;
pub mod error;
pub mod llm;
pub mod metrics;
pub mod scheduler;

// Re-export commonly used types
pub use error::{ConfigError, ErrorKind, LlmError};
pub use scheduler::{
    ControllerConfig, JobError, JobHandle, Priority, QueueStatus, RequestController,
};
