//! Observability for the Tollgate policy chain engine.
//!
//! This crate provides the ambient observability the engine relies on:
//!
//! - **Logging**: Structured JSON (or pretty) logging via `tracing-subscriber`
//! - **Metrics**: Prometheus-format chain and policy metrics via the `metrics` crate
//!
//! The engine itself only emits `tracing` events and calls the recording
//! helpers in [`metrics`]; installing subscribers and recorders is left to
//! the gateway process through [`init_telemetry`].
//!
//! # Standard Metrics
//!
//! | Metric | Type | Labels | Description |
//! |--------|------|--------|-------------|
//! | `tollgate_chain_outcomes_total` | Counter | `direction`, `outcome` | Completed chains by outcome |
//! | `tollgate_chain_duration_seconds` | Histogram | `direction` | Time from chain start to completion |
//! | `tollgate_chains_in_flight` | Gauge | `direction` | Chains currently running |
//! | `tollgate_policy_executions_total` | Counter | `direction`, `policy`, `status` | Invoked policies by status |
//! | `tollgate_policy_duration_seconds` | Histogram | `direction`, `policy` | Time spent in a policy |
//! | `tollgate_policy_skipped_total` | Counter | `direction`, `policy` | Policies skipped as not runnable |
//! | `tollgate_policy_uncaught_failures_total` | Counter | `direction`, `policy` | Policies that returned an error or panicked |
//!
//! # Example
//!
//! ```rust,ignore
//! use tollgate_telemetry::{init_telemetry, LogConfig, MetricsConfig};
//!
//! init_telemetry(&LogConfig::production(), &MetricsConfig::default())?;
//! tracing::info!("gateway ready");
//! ```

#![warn(missing_docs)]

pub mod error;
pub mod logging;
pub mod metrics;

pub use error::TelemetryError;
pub use logging::{init_logging, LogConfig};
pub use metrics::{init_metrics, MetricsConfig};

/// Result type for telemetry operations.
pub type TelemetryResult<T> = Result<T, TelemetryError>;

/// Initializes logging and metrics.
///
/// Logging is initialized first so that metrics failures are reported
/// through it.
///
/// # Errors
///
/// Returns `TelemetryError` if either subsystem fails to initialize.
pub fn init_telemetry(logging: &LogConfig, metrics: &MetricsConfig) -> TelemetryResult<()> {
    init_logging(logging)?;
    init_metrics(metrics)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_disabled_telemetry() {
        let logging = LogConfig {
            enabled: false,
            ..LogConfig::default()
        };
        let metrics = MetricsConfig {
            enabled: false,
            ..MetricsConfig::default()
        };

        assert!(init_telemetry(&logging, &metrics).is_ok());
    }
}
