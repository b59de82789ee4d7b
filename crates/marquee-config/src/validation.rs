// SPDX-FileCopyrightText: 2026 Marquee Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Post-deserialization validation for configuration values.
//!
//! Validates semantic constraints that serde attributes cannot express:
//! non-empty paths, known log levels, and parseable retention expressions.

use marquee_core::{RelativeTime, now};

use crate::diagnostic::ConfigError;
use crate::model::MarqueeConfig;

const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// Validate a deserialized configuration for semantic correctness.
///
/// Returns `Ok(())` if all validations pass, or `Err(Vec<ConfigError>)` with
/// all collected validation errors (does not fail fast).
pub fn validate_config(config: &MarqueeConfig) -> Result<(), Vec<ConfigError>> {
    let mut errors = Vec::new();

    if config.storage.database_path.trim().is_empty() {
        errors.push(ConfigError::Validation {
            message: "storage.database_path must not be empty".to_string(),
        });
    }

    let level = config.daemon.log_level.trim().to_ascii_lowercase();
    if !LOG_LEVELS.contains(&level.as_str()) {
        errors.push(ConfigError::Validation {
            message: format!(
                "daemon.log_level `{}` must be one of {}",
                config.daemon.log_level,
                LOG_LEVELS.join(", ")
            ),
        });
    }

    if config.retention.enabled && config.retention.interval_secs == 0 {
        errors.push(ConfigError::Validation {
            message: "retention.interval_secs must be greater than zero".to_string(),
        });
    }

    for (key, expression) in config.retention.age_rules() {
        if expression.trim().is_empty() {
            continue;
        }
        let applied = expression
            .parse::<RelativeTime>()
            .and_then(|rule| rule.apply_to(now()));
        if let Err(e) = applied {
            let reason = match e {
                marquee_core::MarqueeError::InvalidExpression { reason, .. } => reason,
                other => other.to_string(),
            };
            errors.push(ConfigError::InvalidRetention {
                key: key.to_string(),
                expression: expression.to_string(),
                reason,
            });
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_validates() {
        let config = MarqueeConfig::default();
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn empty_database_path_fails_validation() {
        let mut config = MarqueeConfig::default();
        config.storage.database_path = "  ".to_string();
        let errors = validate_config(&config).unwrap_err();
        assert!(errors.iter().any(
            |e| matches!(e, ConfigError::Validation { message } if message.contains("database_path"))
        ));
    }

    #[test]
    fn unknown_log_level_fails_validation() {
        let mut config = MarqueeConfig::default();
        config.daemon.log_level = "verbose".to_string();
        let errors = validate_config(&config).unwrap_err();
        assert!(errors.iter().any(
            |e| matches!(e, ConfigError::Validation { message } if message.contains("log_level"))
        ));
    }

    #[test]
    fn zero_interval_only_matters_when_enabled() {
        let mut config = MarqueeConfig::default();
        config.retention.interval_secs = 0;
        assert!(validate_config(&config).is_err());

        config.retention.enabled = false;
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn bad_retention_expressions_are_all_reported() {
        let mut config = MarqueeConfig::default();
        config.retention.ingest_max_age = "a month".to_string();
        config.retention.working_max_age = "-2 fortnights".to_string();
        let errors = validate_config(&config).unwrap_err();

        let keys: Vec<&str> = errors
            .iter()
            .filter_map(|e| match e {
                ConfigError::InvalidRetention { key, .. } => Some(key.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(keys, vec!["ingest_max_age", "working_max_age"]);
    }

    #[test]
    fn retention_cutoff_beyond_year_9999_fails_validation() {
        let mut config = MarqueeConfig::default();
        config.retention.working_max_age = "+600000 weeks".to_string();
        let errors = validate_config(&config).unwrap_err();
        assert!(matches!(
            &errors[..],
            [ConfigError::InvalidRetention { key, .. }] if key == "working_max_age"
        ));
    }

    #[test]
    fn empty_expression_disables_rule() {
        let mut config = MarqueeConfig::default();
        config.retention.ingest_unprocessed_max_age = String::new();
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn parsed_toml_with_bad_level_and_rule_reports_both() {
        let toml_str = r#"
[daemon]
log_level = "loud"

[retention]
ingest_processed_max_age = "-2 eons"
"#;
        let config: MarqueeConfig = toml::from_str(toml_str).unwrap();
        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 2);
        assert!(matches!(
            &errors[1],
            ConfigError::InvalidRetention { expression, .. } if expression == "-2 eons"
        ));
    }
}
