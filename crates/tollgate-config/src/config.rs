//! Root configuration type.
//!
//! This module provides the top-level [`TollgateConfig`] struct and its builder.

use serde::{Deserialize, Serialize};
use tollgate_core::Traversal;

use crate::{ChainSettings, ConfigError, LogFormat, TelemetrySection};

/// Complete Tollgate engine configuration.
///
/// Use [`ConfigLoader`](crate::ConfigLoader) to load configuration from files
/// and environment variables.
///
/// # Example
///
/// ```
/// use tollgate_config::TollgateConfig;
/// use tollgate_core::Traversal;
///
/// let config = TollgateConfig::default();
/// assert_eq!(config.chain.response_traversal, Traversal::Reverse);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(deny_unknown_fields)]
pub struct TollgateConfig {
    /// Policy chain behaviour.
    #[serde(default)]
    pub chain: ChainSettings,

    /// Telemetry configuration (logging, metrics).
    #[serde(default)]
    pub telemetry: TelemetrySection,
}

impl TollgateConfig {
    /// Create a new configuration builder.
    #[must_use]
    pub fn builder() -> TollgateConfigBuilder {
        TollgateConfigBuilder::new()
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if:
    /// - The service name is empty
    /// - Logging is enabled and the log filter does not parse
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.telemetry.service_name.trim().is_empty() {
            return Err(ConfigError::invalid_value(
                "telemetry.service_name",
                "must not be empty",
            ));
        }

        let logging = &self.telemetry.logging;
        if logging.enabled {
            if logging.level.trim().is_empty() {
                return Err(ConfigError::invalid_value(
                    "telemetry.logging.level",
                    "must not be empty",
                ));
            }
            tollgate_telemetry::logging::create_env_filter(&logging.level)
                .map_err(|e| ConfigError::invalid_value("telemetry.logging.level", e.to_string()))?;
        }

        Ok(())
    }

    /// Create a development configuration preset.
    ///
    /// Pretty, debug-level logs with source locations. Metrics stay off so
    /// several local processes don't fight over the global recorder.
    #[must_use]
    pub fn development() -> Self {
        let mut config = Self::default();

        config.telemetry.logging.level = "debug".to_string();
        config.telemetry.logging.format = LogFormat::Pretty;
        config.telemetry.logging.include_location = true;
        config.telemetry.metrics.enabled = false;

        config
    }

    /// Create a production configuration preset.
    ///
    /// JSON logs at info level, metrics on, diagnostics captured.
    #[must_use]
    pub fn production() -> Self {
        let mut config = Self::default();

        config.telemetry.logging.level = "info".to_string();
        config.telemetry.logging.format = LogFormat::Json;
        config.telemetry.metrics.enabled = true;
        config.chain.capture_diagnostics = true;
        config.chain.response_traversal = Traversal::Reverse;

        config
    }
}

/// Builder for [`TollgateConfig`].
#[derive(Debug, Default)]
pub struct TollgateConfigBuilder {
    chain: Option<ChainSettings>,
    telemetry: Option<TelemetrySection>,
}

impl TollgateConfigBuilder {
    /// Create a new builder with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the chain settings.
    #[must_use]
    pub fn chain(mut self, chain: ChainSettings) -> Self {
        self.chain = Some(chain);
        self
    }

    /// Set the telemetry settings.
    #[must_use]
    pub fn telemetry(mut self, telemetry: TelemetrySection) -> Self {
        self.telemetry = Some(telemetry);
        self
    }

    /// Build the configuration. Unset sections use their defaults.
    #[must_use]
    pub fn build(self) -> TollgateConfig {
        TollgateConfig {
            chain: self.chain.unwrap_or_default(),
            telemetry: self.telemetry.unwrap_or_default(),
        }
    }

    /// Build and validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if validation fails.
    pub fn build_validated(self) -> Result<TollgateConfig, ConfigError> {
        let config = self.build();
        config.validate()?;
        Ok(config)
    }
}
