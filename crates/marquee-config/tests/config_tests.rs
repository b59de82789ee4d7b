// SPDX-FileCopyrightText: 2026 Marquee Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Integration tests for the Marquee configuration system.

use marquee_config::diagnostic::ConfigError;
use marquee_config::model::MarqueeConfig;
use marquee_config::{load_and_validate_path, load_and_validate_str, load_config_from_str};

/// Valid TOML with all known fields deserializes successfully.
#[test]
fn valid_toml_deserializes_into_marquee_config() {
    let toml = r#"
[daemon]
name = "lobby-sign"
log_level = "debug"

[storage]
database_path = "/tmp/marquee-test.db"
wal_mode = false
busy_timeout_ms = 250

[retention]
enabled = true
interval_secs = 30
ingest_processed_max_age = "-2 hours"
ingest_unprocessed_max_age = "-1 days"
ingest_max_age = "-1 weeks"
working_max_age = "-6 hours"
sweep_housekeep = false
"#;

    let config = load_config_from_str(toml).expect("valid TOML should deserialize");
    assert_eq!(config.daemon.name, "lobby-sign");
    assert_eq!(config.daemon.log_level, "debug");
    assert_eq!(config.storage.database_path, "/tmp/marquee-test.db");
    assert!(!config.storage.wal_mode);
    assert_eq!(config.storage.busy_timeout_ms, 250);
    assert_eq!(config.retention.interval_secs, 30);
    assert_eq!(config.retention.ingest_processed_max_age, "-2 hours");
    assert_eq!(config.retention.ingest_unprocessed_max_age, "-1 days");
    assert_eq!(config.retention.ingest_max_age, "-1 weeks");
    assert_eq!(config.retention.working_max_age, "-6 hours");
    assert!(!config.retention.sweep_housekeep);
}

/// Missing optional sections use defaults without error.
#[test]
fn missing_optional_sections_use_defaults() {
    let config = load_config_from_str("").expect("empty TOML should use defaults");

    assert_eq!(config.daemon.name, "marquee");
    assert_eq!(config.daemon.log_level, "info");
    assert!(config.storage.database_path.ends_with("marquee.db"));
    assert!(config.storage.wal_mode);
    assert_eq!(config.storage.busy_timeout_ms, 5000);
    assert!(config.retention.enabled);
    assert_eq!(config.retention.interval_secs, 300);
    assert_eq!(config.retention.ingest_processed_max_age, "-2 days");
    assert_eq!(config.retention.ingest_unprocessed_max_age, "-7 days");
    assert_eq!(config.retention.ingest_max_age, "-1 months");
    assert_eq!(config.retention.working_max_age, "-2 days");
    assert!(config.retention.sweep_housekeep);
}

/// Unknown field in [storage] produces an UnknownKey diagnostic with a suggestion.
#[test]
fn unknown_storage_key_suggests_correction() {
    let toml = r#"
[storage]
databse_path = "x.db"
"#;

    let errors = load_and_validate_str(toml).expect_err("should reject unknown field");
    let found = errors.iter().any(|e| {
        matches!(e, ConfigError::UnknownKey { key, suggestion, valid_keys, .. } if {
            key == "databse_path"
                && suggestion.as_deref() == Some("database_path")
                && valid_keys.contains("wal_mode")
        })
    });
    assert!(found, "expected UnknownKey for databse_path, got: {errors:?}");
}

/// Unexpected top-level section is rejected by deny_unknown_fields.
#[test]
fn deny_unknown_fields_at_top_level() {
    let toml = r#"
[display]
brightness = 80
"#;

    let err = load_config_from_str(toml).expect_err("unknown section should be rejected");
    let err_str = format!("{err}");
    assert!(
        err_str.contains("unknown field") || err_str.contains("display"),
        "error should mention unknown field, got: {err_str}"
    );
}

/// Wrong value type produces an InvalidType diagnostic.
#[test]
fn invalid_type_is_reported() {
    let toml = r#"
[retention]
interval_secs = "often"
"#;

    let errors = load_and_validate_str(toml).expect_err("should reject invalid type");
    assert!(
        errors
            .iter()
            .any(|e| matches!(e, ConfigError::InvalidType { key, .. } if key.contains("interval_secs"))),
        "got: {errors:?}"
    );
}

/// A malformed retention expression fails validation with a dedicated diagnostic.
#[test]
fn malformed_retention_expression_fails_validation() {
    let toml = r#"
[retention]
ingest_processed_max_age = "two hours"
"#;

    let errors = load_and_validate_str(toml).expect_err("bad expression should fail");
    assert!(errors.iter().any(|e| matches!(
        e,
        ConfigError::InvalidRetention { key, expression, .. }
            if key == "ingest_processed_max_age" && expression == "two hours"
    )));
}

/// Dotted overrides (what the env provider produces) land in the right field.
#[test]
fn dotted_override_targets_nested_key() {
    use figment::{Figment, providers::Serialized};

    let config: MarqueeConfig = Figment::new()
        .merge(Serialized::defaults(MarqueeConfig::default()))
        .merge(("retention.working_max_age", "-12 hours"))
        .extract()
        .expect("should set working_max_age via dot notation");

    assert_eq!(config.retention.working_max_age, "-12 hours");
}

/// ConfigError renders through miette's graphical handler.
#[test]
fn config_error_renders_with_miette() {
    use miette::{Diagnostic, GraphicalReportHandler};

    let error = ConfigError::InvalidRetention {
        key: "ingest_max_age".to_string(),
        expression: "soon".to_string(),
        reason: "expected `<signed integer> <unit>`".to_string(),
    };
    assert!(error.code().is_some());
    assert!(error.help().is_some());

    let handler = GraphicalReportHandler::new();
    let mut buf = String::new();
    handler
        .render_report(&mut buf, &error)
        .expect("should render without error");
    assert!(buf.contains("ingest_max_age"));
}

/// Diagnostics for a config file point at the offending value.
#[test]
fn file_errors_carry_source_spans() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("marquee.toml");
    std::fs::write(
        &path,
        "[storage]\nwal_mode = true\n\n[retention]\nenabled = true\ninterval_secs = \"often\"\n",
    )
    .unwrap();

    let errors = load_and_validate_path(&path).expect_err("file has a mistyped value");
    match errors.as_slice() {
        [ConfigError::InvalidType { key, span, src, .. }] => {
            assert_eq!(key, "retention.interval_secs");
            let span = span.expect("mistyped value should be located");
            let content = std::fs::read_to_string(&path).unwrap();
            assert_eq!(&content[span.offset()..span.offset() + span.len()], "interval_secs");
            assert!(src.is_some());
        }
        other => panic!("unexpected errors: {other:?}"),
    }
}
