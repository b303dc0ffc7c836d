//! # Courier Telemetry
//!
//! Logging bootstrap for Courier processes. Library crates only log through
//! the `tracing` macros; the executable calls [`init_telemetry`] once.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use courier_telemetry::{init_telemetry, TelemetryConfig};
//!
//! fn main() {
//!     let _guard = init_telemetry(TelemetryConfig::from_env()).expect("Failed to init telemetry");
//! }
//! ```
//!
//! ## Environment Variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `COURIER_SERVICE_NAME` | `courier` | Service name on the startup event |
//! | `COURIER_LOG_LEVEL` / `RUST_LOG` | `info` | Log level filter |
//! | `COURIER_CONSOLE_OUTPUT` | `true` | Write logs to stdout |
//! | `COURIER_JSON_LOGS` | `false` (`true` in containers) | JSON log lines |

mod config;
mod logging;

pub use config::TelemetryConfig;
pub use logging::{env_filter, init_logging};

use thiserror::Error;

/// Telemetry initialization errors
#[derive(Error, Debug)]
pub enum TelemetryError {
    #[error("Failed to initialize logger: {0}")]
    LoggerInit(String),

    #[error("Invalid configuration: {0}")]
    Config(String),
}

/// Install logging and return a guard to hold for the life of the process.
pub fn init_telemetry(config: TelemetryConfig) -> Result<TelemetryGuard, TelemetryError> {
    init_logging(&config)?;
    Ok(TelemetryGuard {
        service_name: config.service_name,
    })
}

/// Marks the telemetry lifetime. Logs once when dropped.
pub struct TelemetryGuard {
    service_name: String,
}

impl Drop for TelemetryGuard {
    fn drop(&mut self) {
        tracing::info!(service = %self.service_name, "Shutting down telemetry...");
    }
}

/// Span tagging everything logged on behalf of one bus endpoint.
///
/// ```rust,ignore
/// use tracing::Instrument;
///
/// bus.start(4).instrument(courier_telemetry::endpoint_span!("server")).await?;
/// ```
#[macro_export]
macro_rules! endpoint_span {
    ($endpoint:expr $(, $($field:tt)*)?) => {
        tracing::info_span!("endpoint", endpoint = %$endpoint $(, $($field)*)?)
    };
}
