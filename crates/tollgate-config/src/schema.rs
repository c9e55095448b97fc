//! Configuration section types.

use serde::{Deserialize, Serialize};
use tollgate_core::Traversal;
use tollgate_telemetry::{LogConfig, MetricsConfig};

/// Policy chain behaviour.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct ChainSettings {
    /// Order in which response-direction chains walk their policies.
    #[serde(default = "default_response_traversal")]
    pub response_traversal: Traversal,

    /// Write the detail of uncaught policy failures into the request metrics.
    #[serde(default = "default_true")]
    pub capture_diagnostics: bool,

    /// Emit Prometheus metrics for chain and policy outcomes.
    #[serde(default = "default_true")]
    pub record_metrics: bool,
}

impl Default for ChainSettings {
    fn default() -> Self {
        Self {
            response_traversal: default_response_traversal(),
            capture_diagnostics: true,
            record_metrics: true,
        }
    }
}

fn default_response_traversal() -> Traversal {
    Traversal::Reverse
}

fn default_true() -> bool {
    true
}

/// Log output format.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// JSON formatted logs (production).
    #[default]
    Json,
    /// Human-readable pretty format (development).
    Pretty,
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct LoggingSettings {
    /// Enable logging.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Log filter (trace, debug, info, warn, error, or directives).
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log output format.
    #[serde(default)]
    pub format: LogFormat,

    /// Include source file and line in logs.
    #[serde(default)]
    pub include_location: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            level: default_log_level(),
            format: LogFormat::default(),
            include_location: false,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Metrics settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct MetricsSettings {
    /// Install the Prometheus recorder.
    #[serde(default = "default_true")]
    pub enabled: bool,
}

impl Default for MetricsSettings {
    fn default() -> Self {
        Self { enabled: true }
    }
}

/// Telemetry settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct TelemetrySection {
    /// Service name attached to metrics.
    #[serde(default = "default_service_name")]
    pub service_name: String,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingSettings,

    /// Metrics settings.
    #[serde(default)]
    pub metrics: MetricsSettings,
}

impl Default for TelemetrySection {
    fn default() -> Self {
        Self {
            service_name: default_service_name(),
            logging: LoggingSettings::default(),
            metrics: MetricsSettings::default(),
        }
    }
}

fn default_service_name() -> String {
    "tollgate".to_string()
}

impl TelemetrySection {
    /// Converts the logging settings into a [`LogConfig`] for `init_logging`.
    #[must_use]
    pub fn log_config(&self) -> LogConfig {
        LogConfig {
            enabled: self.logging.enabled,
            level: self.logging.level.clone(),
            json_format: self.logging.format == LogFormat::Json,
            file_line_info: self.logging.include_location,
            include_target: true,
        }
    }

    /// Converts the metrics settings into a [`MetricsConfig`] for `init_metrics`.
    #[must_use]
    pub fn metrics_config(&self) -> MetricsConfig {
        MetricsConfig {
            enabled: self.metrics.enabled,
            service_name: self.service_name.clone(),
        }
    }
}
