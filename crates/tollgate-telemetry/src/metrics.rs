//! Prometheus metrics for policy chains.
//!
//! Recording functions are safe to call before [`init_metrics`]; the
//! `metrics` facade discards observations until a recorder is installed.
//!
//! # Example
//!
//! ```rust,ignore
//! use tollgate_telemetry::metrics::{record_chain_outcome, MetricsConfig, init_metrics};
//!
//! init_metrics(&MetricsConfig::default())?;
//! record_chain_outcome("request", "success", Duration::from_millis(4));
//! ```

use crate::error::TelemetryError;
use crate::TelemetryResult;
use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::sync::OnceLock;
use std::time::Duration;

/// Global metrics handle for rendering.
static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Metrics configuration.
#[derive(Debug, Clone)]
pub struct MetricsConfig {
    /// Whether metrics are enabled.
    pub enabled: bool,

    /// Service name attached to every metric as the `service` label.
    pub service_name: String,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            service_name: "tollgate".to_string(),
        }
    }
}

/// Installs the Prometheus recorder.
///
/// Serving the rendered output is left to the gateway's HTTP listener; use
/// [`render_metrics`] to obtain it.
///
/// # Errors
///
/// Returns `TelemetryError::MetricsInit` if a recorder is already installed.
pub fn init_metrics(config: &MetricsConfig) -> TelemetryResult<()> {
    if !config.enabled {
        return Ok(());
    }

    let handle = PrometheusBuilder::new()
        .add_global_label("service", config.service_name.clone())
        .install_recorder()
        .map_err(|e| TelemetryError::MetricsInit(e.to_string()))?;

    let _ = METRICS_HANDLE.set(handle);

    register_metric_descriptions();
    tracing::debug!(service = %config.service_name, "Prometheus recorder installed");

    Ok(())
}

/// Renders metrics in Prometheus text format.
///
/// Returns `None` if metrics are not initialized.
#[must_use]
pub fn render_metrics() -> Option<String> {
    METRICS_HANDLE.get().map(PrometheusHandle::render)
}

fn register_metric_descriptions() {
    describe_counter!(
        "tollgate_chain_outcomes_total",
        "Total number of completed policy chains by outcome"
    );
    describe_histogram!(
        "tollgate_chain_duration_seconds",
        "Policy chain duration from start to completion in seconds"
    );
    describe_gauge!(
        "tollgate_chains_in_flight",
        "Number of policy chains currently running"
    );
    describe_counter!(
        "tollgate_policy_executions_total",
        "Total number of policy invocations by status"
    );
    describe_histogram!(
        "tollgate_policy_duration_seconds",
        "Time spent inside a policy in seconds"
    );
    describe_counter!(
        "tollgate_policy_skipped_total",
        "Total number of policies skipped because they were not runnable"
    );
    describe_counter!(
        "tollgate_policy_uncaught_failures_total",
        "Total number of policies that returned an error or panicked"
    );
}

// ============================================================================
// Metric Recording Functions
// ============================================================================

/// Records a completed chain.
///
/// # Arguments
///
/// * `direction` - The chain direction (e.g. "request")
/// * `outcome` - The outcome label ("success", "failed", "stream_failed")
/// * `duration` - Time from chain start to completion
pub fn record_chain_outcome(direction: &'static str, outcome: &'static str, duration: Duration) {
    counter!(
        "tollgate_chain_outcomes_total",
        "direction" => direction,
        "outcome" => outcome
    )
    .increment(1);

    histogram!("tollgate_chain_duration_seconds", "direction" => direction)
        .record(duration.as_secs_f64());
}

/// Records an invoked policy.
pub fn record_policy_execution(
    direction: &'static str,
    policy: &str,
    status: &'static str,
    duration: Duration,
) {
    counter!(
        "tollgate_policy_executions_total",
        "direction" => direction,
        "policy" => policy.to_string(),
        "status" => status
    )
    .increment(1);

    histogram!(
        "tollgate_policy_duration_seconds",
        "direction" => direction,
        "policy" => policy.to_string()
    )
    .record(duration.as_secs_f64());
}

/// Records a policy skipped because it was not runnable.
pub fn record_policy_skipped(direction: &'static str, policy: &str) {
    counter!(
        "tollgate_policy_skipped_total",
        "direction" => direction,
        "policy" => policy.to_string()
    )
    .increment(1);
}

/// Records a policy that returned an error or panicked.
pub fn record_uncaught_failure(direction: &'static str, policy: &str) {
    counter!(
        "tollgate_policy_uncaught_failures_total",
        "direction" => direction,
        "policy" => policy.to_string()
    )
    .increment(1);
}

/// Guard that tracks a running chain in `tollgate_chains_in_flight`.
///
/// The gauge is decremented on drop, including when the chain's future is
/// cancelled.
pub struct InFlightGuard {
    direction: &'static str,
}

impl InFlightGuard {
    /// Creates a new guard and increments the in-flight gauge.
    #[must_use]
    pub fn new(direction: &'static str) -> Self {
        gauge!("tollgate_chains_in_flight", "direction" => direction).increment(1.0);
        Self { direction }
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        gauge!("tollgate_chains_in_flight", "direction" => self.direction).decrement(1.0);
    }
}
