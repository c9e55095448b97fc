//! Typed configuration for the Tollgate policy chain engine.
//!
//! - TOML and JSON configuration files
//! - Environment variable overrides
//! - Strict validation (fails on unknown fields)
//! - Layered configuration (defaults → file → env)
//!
//! # Example
//!
//! ```no_run
//! use tollgate_config::ConfigLoader;
//!
//! # fn main() -> Result<(), tollgate_config::ConfigError> {
//! let config = ConfigLoader::new()
//!     .with_defaults()
//!     .with_optional_file("tollgate.toml")?
//!     .with_env_prefix("TOLLGATE")
//!     .load()?;
//!
//! println!("responses traverse {}", config.chain.response_traversal);
//! # Ok(())
//! # }
//! ```
//!
//! # Configuration File Format
//!
//! ```toml
//! [chain]
//! response_traversal = "reverse"
//! capture_diagnostics = true
//! record_metrics = true
//!
//! [telemetry]
//! service_name = "tollgate"
//!
//! [telemetry.logging]
//! enabled = true
//! level = "info"
//! format = "json"
//! include_location = false
//!
//! [telemetry.metrics]
//! enabled = true
//! ```
//!
//! # Environment Variable Overrides
//!
//! Values can be overridden with `PREFIX__SECTION__KEY` variables:
//!
//! - `TOLLGATE__CHAIN__RESPONSE_TRAVERSAL=forward`
//! - `TOLLGATE__TELEMETRY__LOGGING__LEVEL=debug`
//! - `TOLLGATE__TELEMETRY__METRICS__ENABLED=false`

#![warn(missing_docs)]

mod config;
mod error;
mod loader;
mod schema;

pub use config::{TollgateConfig, TollgateConfigBuilder};
pub use error::ConfigError;
pub use loader::ConfigLoader;
pub use schema::{ChainSettings, LogFormat, LoggingSettings, MetricsSettings, TelemetrySection};
