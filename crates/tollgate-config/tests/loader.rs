//! Integration tests for layered configuration loading.

use std::io::Write;

use tempfile::NamedTempFile;
use tollgate_config::{ConfigError, ConfigLoader, LogFormat};
use tollgate_core::Traversal;

fn temp_config(suffix: &str, content: &str) -> NamedTempFile {
    let mut file = tempfile::Builder::new()
        .suffix(suffix)
        .tempfile()
        .expect("create temp file");
    file.write_all(content.as_bytes()).expect("write temp file");
    file
}

#[test]
fn loads_toml_file() {
    let file = temp_config(
        ".toml",
        r#"
        [chain]
        response_traversal = "forward"
        capture_diagnostics = false

        [telemetry]
        service_name = "edge-gateway"

        [telemetry.logging]
        level = "tollgate_policy=debug,warn"
        format = "pretty"
        "#,
    );

    let config = ConfigLoader::new()
        .with_file(file.path())
        .unwrap()
        .load()
        .unwrap();

    assert_eq!(config.chain.response_traversal, Traversal::Forward);
    assert!(!config.chain.capture_diagnostics);
    assert!(config.chain.record_metrics);
    assert_eq!(config.telemetry.service_name, "edge-gateway");
    assert_eq!(config.telemetry.logging.format, LogFormat::Pretty);
}

#[test]
fn loads_json_file() {
    let file = temp_config(
        ".json",
        r#"{"telemetry": {"metrics": {"enabled": false}}}"#,
    );

    let config = ConfigLoader::new()
        .with_optional_file(file.path())
        .unwrap()
        .load()
        .unwrap();

    assert!(!config.telemetry.metrics.enabled);
    assert_eq!(config.chain.response_traversal, Traversal::Reverse);
}

#[test]
fn rejects_unknown_extension() {
    let file = temp_config(".yaml", "chain: {}");

    let result = ConfigLoader::new().with_file(file.path());
    assert!(matches!(result, Err(ConfigError::ValidationError(_))));
}

#[test]
fn rejects_unknown_fields_in_file() {
    let file = temp_config(
        ".toml",
        r#"
        [telemetry.metrics]
        enabled = true
        addr = "0.0.0.0:9090"
        "#,
    );

    let result = ConfigLoader::new().with_file(file.path());
    assert!(matches!(result, Err(ConfigError::TomlError(_))));
}

#[test]
fn invalid_log_filter_fails_validation() {
    let file = temp_config(
        ".toml",
        r#"
        [telemetry.logging]
        level = "tollgate_policy=verbose"
        "#,
    );

    let result = ConfigLoader::new().with_file(file.path()).unwrap().load();
    assert!(matches!(result, Err(ConfigError::InvalidValue { .. })));
}

#[test]
fn env_overrides_file_values() {
    let file = temp_config(
        ".toml",
        r#"
        [chain]
        response_traversal = "reverse"
        "#,
    );

    std::env::set_var("TGENVOVERRIDE__CHAIN__RESPONSE_TRAVERSAL", "forward");
    std::env::set_var("TGENVOVERRIDE__TELEMETRY__LOGGING__LEVEL", "debug");

    let config = ConfigLoader::new()
        .with_file(file.path())
        .unwrap()
        .with_env_prefix("tgenvoverride")
        .load()
        .unwrap();

    assert_eq!(config.chain.response_traversal, Traversal::Forward);
    assert_eq!(config.telemetry.logging.level, "debug");
}

#[test]
fn env_variables_sharing_the_bare_prefix_are_ignored() {
    std::env::set_var("TGBAREPREFIX_HOME", "/opt/tollgate");
    std::env::set_var("TGBAREPREFIX__CHAIN__CAPTURE_DIAGNOSTICS", "off");

    let config = ConfigLoader::new()
        .with_env_prefix("TGBAREPREFIX")
        .load()
        .unwrap();

    assert!(!config.chain.capture_diagnostics);
}

#[test]
fn invalid_env_value_is_reported() {
    std::env::set_var("TGBADENV__CHAIN__RECORD_METRICS", "sometimes");

    let result = ConfigLoader::new().with_env_prefix("TGBADENV").load();
    match result {
        Err(ConfigError::EnvParseError { var, .. }) => {
            assert_eq!(var, "TGBADENV__CHAIN__RECORD_METRICS");
        }
        other => panic!("expected env parse error, got {other:?}"),
    }
}
