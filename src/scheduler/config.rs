//! Configuration for the request admission controller.

use std::env;
use std::time::Duration;

use crate::error::ConfigError;

use super::retry::RetryPolicy;

/// Default number of jobs allowed in flight at once.
pub const DEFAULT_MAX_CONCURRENCY: usize = 3;

/// Default minimum spacing between two job starts.
pub const DEFAULT_MIN_START_SPACING: Duration = Duration::from_millis(1000);

/// Environment variable overriding `max_concurrency`.
pub const ENV_MAX_CONCURRENCY: &str = "SKETCH_GATE_MAX_CONCURRENCY";
/// Environment variable overriding `min_start_spacing` (milliseconds).
pub const ENV_MIN_SPACING_MS: &str = "SKETCH_GATE_MIN_SPACING_MS";
/// Environment variable overriding the retry budget.
pub const ENV_MAX_RETRIES: &str = "SKETCH_GATE_MAX_RETRIES";
/// Environment variable overriding the base backoff delay (milliseconds).
pub const ENV_RETRY_BASE_MS: &str = "SKETCH_GATE_RETRY_BASE_MS";

/// Configuration for the [`RequestController`](super::RequestController).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControllerConfig {
    /// Maximum number of jobs executing at the same time.
    pub max_concurrency: usize,
    /// Minimum wall-clock time between two consecutive job starts.
    pub min_start_spacing: Duration,
    /// Retry budget and backoff for failed jobs.
    pub retry: RetryPolicy,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
            min_start_spacing: DEFAULT_MIN_START_SPACING,
            retry: RetryPolicy::default(),
        }
    }
}

impl ControllerConfig {
    /// Creates a configuration with the given concurrency cap.
    pub fn new(max_concurrency: usize) -> Self {
        Self {
            max_concurrency,
            ..Default::default()
        }
    }

    /// Sets the minimum spacing between job starts.
    pub fn with_min_start_spacing(mut self, spacing: Duration) -> Self {
        self.min_start_spacing = spacing;
        self
    }

    /// Sets the maximum number of retries per job.
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.retry.max_retries = max_retries;
        self
    }

    /// Sets the base delay for exponential backoff.
    pub fn with_base_retry_delay(mut self, delay: Duration) -> Self {
        self.retry.base_delay = delay;
        self
    }

    /// Builds a configuration from `SKETCH_GATE_*` environment variables.
    ///
    /// Unset variables keep their defaults.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` if a variable is set but cannot be
    /// parsed, or if the concurrency cap is zero.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds a configuration from an arbitrary key lookup.
    ///
    /// `from_env` delegates here; tests pass a map instead of touching the
    /// process environment.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(value) = lookup(ENV_MAX_CONCURRENCY) {
            config.max_concurrency = parse_var(ENV_MAX_CONCURRENCY, &value)?;
        }
        if let Some(value) = lookup(ENV_MIN_SPACING_MS) {
            config.min_start_spacing =
                Duration::from_millis(parse_var(ENV_MIN_SPACING_MS, &value)?);
        }
        if let Some(value) = lookup(ENV_MAX_RETRIES) {
            config.retry.max_retries = parse_var(ENV_MAX_RETRIES, &value)?;
        }
        if let Some(value) = lookup(ENV_RETRY_BASE_MS) {
            config.retry.base_delay = Duration::from_millis(parse_var(ENV_RETRY_BASE_MS, &value)?);
        }

        config.validate()?;
        Ok(config)
    }

    /// Checks that the configuration can admit work at all.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_concurrency == 0 {
            return Err(ConfigError::InvalidValue {
                var: ENV_MAX_CONCURRENCY.to_string(),
                value: "0".to_string(),
                reason: "max concurrency must be at least 1".to_string(),
            });
        }
        Ok(())
    }
}

fn parse_var<T>(var: &str, value: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse::<T>()
        .map_err(|e| ConfigError::InvalidValue {
            var: var.to_string(),
            value: value.to_string(),
            reason: e.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_controller_config_default() {
        let config = ControllerConfig::default();

        assert_eq!(config.max_concurrency, 3);
        assert_eq!(config.min_start_spacing, Duration::from_millis(1000));
        assert_eq!(config.retry.max_retries, 3);
        assert_eq!(config.retry.base_delay, Duration::from_millis(2000));
    }

    #[test]
    fn test_controller_config_builder() {
        let config = ControllerConfig::new(5)
            .with_min_start_spacing(Duration::from_millis(250))
            .with_max_retries(1)
            .with_base_retry_delay(Duration::from_millis(100));

        assert_eq!(config.max_concurrency, 5);
        assert_eq!(config.min_start_spacing, Duration::from_millis(250));
        assert_eq!(config.retry.max_retries, 1);
        assert_eq!(config.retry.base_delay, Duration::from_millis(100));
    }

    #[test]
    fn test_from_lookup_empty_keeps_defaults() {
        let config = ControllerConfig::from_lookup(|_| None).expect("defaults are valid");
        assert_eq!(config, ControllerConfig::default());
    }

    #[test]
    fn test_from_lookup_overrides() {
        let config = ControllerConfig::from_lookup(lookup_from(&[
            (ENV_MAX_CONCURRENCY, "2"),
            (ENV_MIN_SPACING_MS, " 500 "),
            (ENV_MAX_RETRIES, "5"),
            (ENV_RETRY_BASE_MS, "750"),
        ]))
        .expect("valid overrides");

        assert_eq!(config.max_concurrency, 2);
        assert_eq!(config.min_start_spacing, Duration::from_millis(500));
        assert_eq!(config.retry.max_retries, 5);
        assert_eq!(config.retry.base_delay, Duration::from_millis(750));
    }

    #[test]
    fn test_from_lookup_rejects_garbage() {
        let err = ControllerConfig::from_lookup(lookup_from(&[(ENV_MAX_RETRIES, "three")]))
            .expect_err("non-numeric value must fail");
        assert!(err.to_string().contains(ENV_MAX_RETRIES));
    }

    #[test]
    fn test_zero_concurrency_is_invalid() {
        let err = ControllerConfig::from_lookup(lookup_from(&[(ENV_MAX_CONCURRENCY, "0")]))
            .expect_err("zero concurrency must fail");
        assert!(err.to_string().contains("at least 1"));
        assert!(ControllerConfig::new(0).validate().is_err());
    }
}
