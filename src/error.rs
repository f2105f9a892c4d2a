//! Error types for sketch-gate operations.
//!
//! - `ErrorKind`: structured failure classification used by the retry policy
//! - `LlmError`: failures at the generative AI API boundary
//! - `ConfigError`: invalid configuration values

use std::fmt;

use thiserror::Error;

/// Substrings that mark an otherwise opaque message as a rate limit.
const RATE_LIMIT_MARKERS: &[&str] = &["rate limit", "429"];
/// Substrings that mark an otherwise opaque message as a server fault.
const UNAVAILABLE_MARKERS: &[&str] = &["503", "500"];
/// Substrings that mark an otherwise opaque message as a timeout.
const TIMEOUT_MARKERS: &[&str] = &["timeout"];
/// Substrings that mark an otherwise opaque message as a transport failure.
const NETWORK_MARKERS: &[&str] = &["network", "fetch failed"];

/// Classification of a failed request.
///
/// Produced by the boundary that talks to the remote API. The first four
/// kinds are transient and eligible for retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// The API asked us to slow down (HTTP 429).
    RateLimited,
    /// The API is temporarily failing (HTTP 5xx).
    ServiceUnavailable,
    /// The request or connection timed out.
    Timeout,
    /// The request never reached the API or the connection dropped.
    NetworkFailure,
    /// The request itself was rejected (malformed, content policy, auth).
    ClientError,
    /// Anything else.
    Unknown,
}

impl ErrorKind {
    /// Returns whether failures of this kind are worth retrying.
    pub fn is_retryable(self) -> bool {
        matches!(
            self,
            ErrorKind::RateLimited
                | ErrorKind::ServiceUnavailable
                | ErrorKind::Timeout
                | ErrorKind::NetworkFailure
        )
    }

    /// Classifies an HTTP status code.
    pub fn from_status(code: u16) -> Self {
        match code {
            408 => ErrorKind::Timeout,
            429 => ErrorKind::RateLimited,
            500..=599 => ErrorKind::ServiceUnavailable,
            400..=499 => ErrorKind::ClientError,
            _ => ErrorKind::Unknown,
        }
    }

    /// Classifies free-form error text, case-insensitively.
    ///
    /// Only for errors that carry nothing but a message.
    pub fn from_message(message: &str) -> Self {
        let message = message.to_lowercase();
        let contains_any = |markers: &[&str]| markers.iter().any(|m| message.contains(m));

        if contains_any(RATE_LIMIT_MARKERS) {
            ErrorKind::RateLimited
        } else if contains_any(UNAVAILABLE_MARKERS) {
            ErrorKind::ServiceUnavailable
        } else if contains_any(TIMEOUT_MARKERS) {
            ErrorKind::Timeout
        } else if contains_any(NETWORK_MARKERS) {
            ErrorKind::NetworkFailure
        } else {
            ErrorKind::Unknown
        }
    }

    /// Stable snake_case name, used for log fields and metric labels.
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::RateLimited => "rate_limited",
            ErrorKind::ServiceUnavailable => "service_unavailable",
            ErrorKind::Timeout => "timeout",
            ErrorKind::NetworkFailure => "network_failure",
            ErrorKind::ClientError => "client_error",
            ErrorKind::Unknown => "unknown",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors that can occur during LLM operations.
#[derive(Debug, Error)]
pub enum LlmError {
    #[error("Missing API key: {var} environment variable not set")]
    MissingApiKey { var: &'static str },

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Rate limited: {0}")]
    RateLimited(String),

    #[error("API error ({code}): {message}")]
    ApiError { code: u16, message: String },

    #[error("Failed to parse LLM response: {0}")]
    ParseError(String),

    #[error("Response stream interrupted: {0}")]
    StreamInterrupted(String),

    #[error("No image data returned from the model")]
    NoImageData,

    #[error("Upstream error: {0}")]
    Upstream(String),
}

impl LlmError {
    /// Builds the error for a non-success HTTP response.
    pub fn from_status(code: u16, message: impl Into<String>) -> Self {
        let message = message.into();
        if code == 429 {
            LlmError::RateLimited(message)
        } else {
            LlmError::ApiError { code, message }
        }
    }

    /// Maps a transport-level `reqwest` failure.
    pub fn from_reqwest(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            LlmError::Timeout(err.to_string())
        } else if let Some(status) = err.status() {
            LlmError::from_status(status.as_u16(), err.to_string())
        } else if err.is_connect() || err.is_request() {
            LlmError::Network(err.to_string())
        } else if err.is_decode() {
            LlmError::ParseError(err.to_string())
        } else {
            LlmError::Upstream(err.to_string())
        }
    }

    /// Returns the structured failure kind.
    pub fn kind(&self) -> ErrorKind {
        match self {
            LlmError::MissingApiKey { .. } => ErrorKind::ClientError,
            LlmError::Timeout(_) => ErrorKind::Timeout,
            LlmError::Network(_) => ErrorKind::NetworkFailure,
            LlmError::RateLimited(_) => ErrorKind::RateLimited,
            LlmError::ApiError { code, .. } => ErrorKind::from_status(*code),
            LlmError::ParseError(_) => ErrorKind::Unknown,
            LlmError::StreamInterrupted(_) => ErrorKind::NetworkFailure,
            LlmError::NoImageData => ErrorKind::Unknown,
            LlmError::Upstream(message) => ErrorKind::from_message(message),
        }
    }
}

/// Errors that can occur while reading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid value '{value}' for {var}: {reason}")]
    InvalidValue {
        var: String,
        value: String,
        reason: String,
    },

    #[error("Unknown LLM provider '{0}': expected 'gemini' or 'ollama'")]
    UnknownProvider(String),
}
