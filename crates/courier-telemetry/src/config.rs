//! Telemetry configuration from environment variables.

use std::env;

/// Logging configuration for a Courier process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TelemetryConfig {
    /// Service name attached to the startup event
    pub service_name: String,

    /// Log level filter (trace, debug, info, warn, error, or a full
    /// `EnvFilter` directive)
    pub log_level: String,

    /// Whether to enable console output
    pub console_output: bool,

    /// Whether to emit JSON formatted logs
    pub json_logs: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            service_name: "courier".to_string(),
            log_level: "info".to_string(),
            console_output: true,
            json_logs: false,
        }
    }
}

impl TelemetryConfig {
    /// Create configuration from environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `COURIER_SERVICE_NAME`: Service name (default: courier)
    /// - `COURIER_LOG_LEVEL` or `RUST_LOG`: Log level (default: info)
    /// - `COURIER_CONSOLE_OUTPUT`: Enable console output (default: true)
    /// - `COURIER_JSON_LOGS`: Enable JSON logs (default: false in dev, true in containers)
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Same as [`TelemetryConfig::from_env`], reading through `lookup`.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let is_container =
            lookup("KUBERNETES_SERVICE_HOST").is_some() || lookup("DOCKER_CONTAINER").is_some();

        Self {
            service_name: lookup("COURIER_SERVICE_NAME").unwrap_or_else(|| "courier".to_string()),

            log_level: lookup("COURIER_LOG_LEVEL")
                .or_else(|| lookup("RUST_LOG"))
                .unwrap_or_else(|| "info".to_string()),

            console_output: lookup("COURIER_CONSOLE_OUTPUT")
                .map(|v| v.to_lowercase() != "false" && v != "0")
                .unwrap_or(true),

            json_logs: lookup("COURIER_JSON_LOGS")
                .map(|v| v.to_lowercase() == "true" || v == "1")
                .unwrap_or(is_container),
        }
    }

    /// Configuration for a named node, keeping the rest of the environment.
    pub fn for_node(node_name: &str) -> Self {
        let mut config = Self::from_env();
        config.service_name = format!("courier-{}", node_name);
        config
    }
}
