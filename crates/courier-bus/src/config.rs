//! Bus configuration and validation
//!
//! # Example
//!
//! ```ignore
//! use courier_bus::BusConfigBuilder;
//! use std::time::Duration;
//!
//! let config = BusConfigBuilder::new()
//!     .max_parallelism(8)
//!     .worker_shutdown_timeout(Duration::from_secs(10))
//!     .build()
//!     .expect("Valid config");
//! ```

use std::env;
use std::time::Duration;

use crate::error::BusError;

/// Default ceiling on concurrently processed messages.
pub const DEFAULT_MAX_PARALLELISM: usize = 5;

/// Default bound on the shutdown drain.
pub const DEFAULT_WORKER_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(60);

/// Default worker delay when no slot or message is available.
pub const DEFAULT_IDLE_BACKOFF: Duration = Duration::from_millis(100);

/// Default grace period and poll interval of the shutdown drain.
pub const DEFAULT_SHUTDOWN_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Default prefix for generated worker names.
pub const DEFAULT_WORKER_NAME_PREFIX: &str = "courier worker";

/// Configuration consumed by the worker factory and the bus.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BusConfig {
    /// Maximum number of pipeline invocations in flight across all workers.
    pub max_parallelism: usize,
    /// Upper bound on how long shutdown waits for in-flight work.
    pub worker_shutdown_timeout: Duration,
    /// Delay before a worker retries after finding no slot or no message.
    pub idle_backoff: Duration,
    /// Grace period and poll granularity of the shutdown drain.
    pub shutdown_poll_interval: Duration,
    /// Prefix for worker names; workers are named `"{prefix} {ordinal}"`.
    pub worker_name_prefix: String,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            max_parallelism: DEFAULT_MAX_PARALLELISM,
            worker_shutdown_timeout: DEFAULT_WORKER_SHUTDOWN_TIMEOUT,
            idle_backoff: DEFAULT_IDLE_BACKOFF,
            shutdown_poll_interval: DEFAULT_SHUTDOWN_POLL_INTERVAL,
            worker_name_prefix: DEFAULT_WORKER_NAME_PREFIX.to_string(),
        }
    }
}

impl BusConfig {
    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`BusError::InvalidConfiguration`] if:
    /// - `max_parallelism` is 0
    /// - `idle_backoff` or `shutdown_poll_interval` is zero (busy loop)
    /// - `worker_name_prefix` is empty
    pub fn validate(&self) -> Result<(), BusError> {
        if self.max_parallelism < 1 {
            return Err(BusError::InvalidConfiguration(format!(
                "Max parallelism is {} which is an invalid value",
                self.max_parallelism
            )));
        }

        if self.idle_backoff.is_zero() {
            return Err(BusError::InvalidConfiguration(
                "idle_backoff cannot be zero".to_string(),
            ));
        }

        if self.shutdown_poll_interval.is_zero() {
            return Err(BusError::InvalidConfiguration(
                "shutdown_poll_interval cannot be zero".to_string(),
            ));
        }

        if self.worker_name_prefix.trim().is_empty() {
            return Err(BusError::InvalidConfiguration(
                "worker_name_prefix cannot be empty".to_string(),
            ));
        }

        Ok(())
    }

    /// Create configuration from environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `COURIER_MAX_PARALLELISM`: max in-flight messages (default: 5)
    /// - `COURIER_WORKER_SHUTDOWN_TIMEOUT_MS`: shutdown drain bound (default: 60000)
    /// - `COURIER_IDLE_BACKOFF_MS`: idle worker delay (default: 100)
    ///
    /// # Errors
    ///
    /// Returns [`BusError::InvalidConfiguration`] for values that do not
    /// parse, negative durations, or a configuration that fails
    /// [`BusConfig::validate`].
    pub fn from_env() -> Result<Self, BusError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Create configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, BusError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(raw) = lookup("COURIER_MAX_PARALLELISM") {
            let value: i64 = parse_int("COURIER_MAX_PARALLELISM", &raw)?;
            config.max_parallelism = usize::try_from(value).map_err(|_| {
                BusError::InvalidConfiguration(format!(
                    "Max parallelism is {value} which is an invalid value"
                ))
            })?;
        }

        if let Some(raw) = lookup("COURIER_WORKER_SHUTDOWN_TIMEOUT_MS") {
            config.worker_shutdown_timeout =
                parse_millis("COURIER_WORKER_SHUTDOWN_TIMEOUT_MS", &raw)?;
        }

        if let Some(raw) = lookup("COURIER_IDLE_BACKOFF_MS") {
            config.idle_backoff = parse_millis("COURIER_IDLE_BACKOFF_MS", &raw)?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Builder-style method to set max parallelism
    pub fn with_max_parallelism(mut self, max_parallelism: usize) -> Self {
        self.max_parallelism = max_parallelism;
        self
    }

    /// Builder-style method to set the shutdown timeout
    pub fn with_worker_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.worker_shutdown_timeout = timeout;
        self
    }
}

fn parse_int(key: &str, raw: &str) -> Result<i64, BusError> {
    raw.trim().parse().map_err(|_| {
        BusError::InvalidConfiguration(format!("{key}: '{raw}' is not an integer"))
    })
}

fn parse_millis(key: &str, raw: &str) -> Result<Duration, BusError> {
    let millis = parse_int(key, raw)?;
    u64::try_from(millis).map(Duration::from_millis).map_err(|_| {
        BusError::InvalidConfiguration(format!(
            "Cannot use '{millis}ms' for {key}: durations must not be negative"
        ))
    })
}

/// Builder for [`BusConfig`] with validation
#[derive(Default)]
pub struct BusConfigBuilder {
    max_parallelism: Option<usize>,
    worker_shutdown_timeout: Option<Duration>,
    idle_backoff: Option<Duration>,
    shutdown_poll_interval: Option<Duration>,
    worker_name_prefix: Option<String>,
}

impl BusConfigBuilder {
    /// Create a new builder with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the parallelism ceiling (must be at least 1)
    pub fn max_parallelism(mut self, max_parallelism: usize) -> Self {
        self.max_parallelism = Some(max_parallelism);
        self
    }

    /// Set the shutdown drain bound
    pub fn worker_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.worker_shutdown_timeout = Some(timeout);
        self
    }

    /// Set the idle worker delay
    pub fn idle_backoff(mut self, backoff: Duration) -> Self {
        self.idle_backoff = Some(backoff);
        self
    }

    /// Set the shutdown grace period / poll interval
    pub fn shutdown_poll_interval(mut self, interval: Duration) -> Self {
        self.shutdown_poll_interval = Some(interval);
        self
    }

    /// Set the worker name prefix
    pub fn worker_name_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.worker_name_prefix = Some(prefix.into());
        self
    }

    /// Build the config, validating all parameters
    pub fn build(self) -> Result<BusConfig, BusError> {
        let defaults = BusConfig::default();

        let config = BusConfig {
            max_parallelism: self.max_parallelism.unwrap_or(defaults.max_parallelism),
            worker_shutdown_timeout: self
                .worker_shutdown_timeout
                .unwrap_or(defaults.worker_shutdown_timeout),
            idle_backoff: self.idle_backoff.unwrap_or(defaults.idle_backoff),
            shutdown_poll_interval: self
                .shutdown_poll_interval
                .unwrap_or(defaults.shutdown_poll_interval),
            worker_name_prefix: self
                .worker_name_prefix
                .unwrap_or(defaults.worker_name_prefix),
        };

        config.validate()?;
        Ok(config)
    }
}
