// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Post-deserialization validation for configuration values.
//!
//! Validates semantic constraints that serde attributes cannot express, such
//! as non-zero intervals and known log levels.

use crate::diagnostic::ConfigError;
use crate::model::{CourierConfig, QueuePolicyConfig};

const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// Validate a deserialized configuration for semantic correctness.
///
/// Returns `Ok(())` if all validations pass, or `Err(Vec<ConfigError>)` with
/// all collected validation errors (does not fail fast).
pub fn validate_config(config: &CourierConfig) -> Result<(), Vec<ConfigError>> {
    let mut errors = Vec::new();

    if !LOG_LEVELS.contains(&config.app.log_level.as_str()) {
        errors.push(ConfigError::validation(format!(
            "app.log_level `{}` must be one of: {}",
            config.app.log_level,
            LOG_LEVELS.join(", ")
        )));
    }

    let session = &config.session;
    if session.auth_dir.trim().is_empty() {
        errors.push(ConfigError::validation("session.auth_dir must not be empty"));
    }
    if session.reconnect_interval_ms == 0 {
        errors.push(ConfigError::validation(
            "session.reconnect_interval_ms must be greater than 0",
        ));
    }
    if session.qr_timeout_ms == 0 {
        errors.push(ConfigError::validation(
            "session.qr_timeout_ms must be greater than 0",
        ));
    }
    if session.qr_refresh_timeout_ms == 0 {
        errors.push(ConfigError::validation(
            "session.qr_refresh_timeout_ms must be greater than 0",
        ));
    }

    if config.queue.poll_interval_ms == 0 {
        errors.push(ConfigError::validation(
            "queue.poll_interval_ms must be greater than 0",
        ));
    }
    validate_policy("queue.direct", &config.queue.direct, &mut errors);
    validate_policy("queue.campaign", &config.queue.campaign, &mut errors);
    validate_policy("queue.notification", &config.queue.notification, &mut errors);

    if config.broadcast.max_recipients == 0 {
        errors.push(ConfigError::validation(
            "broadcast.max_recipients must be at least 1",
        ));
    }

    if config.webhook.timeout_ms == 0 {
        errors.push(ConfigError::validation(
            "webhook.timeout_ms must be greater than 0",
        ));
    }
    if config.webhook.retry_attempts == 0 {
        errors.push(ConfigError::validation(
            "webhook.retry_attempts must be at least 1",
        ));
    }

    if config.storage.database_path.trim().is_empty() {
        errors.push(ConfigError::validation(
            "storage.database_path must not be empty",
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn validate_policy(section: &str, policy: &QueuePolicyConfig, errors: &mut Vec<ConfigError>) {
    if policy.max_attempts == 0 {
        errors.push(ConfigError::validation(format!(
            "{section}.max_attempts must be at least 1"
        )));
    }
    if policy.backoff_base_ms == 0 {
        errors.push(ConfigError::validation(format!(
            "{section}.backoff_base_ms must be greater than 0"
        )));
    }
    if policy.concurrency == 0 {
        errors.push(ConfigError::validation(format!(
            "{section}.concurrency must be at least 1"
        )));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn messages(errors: &[ConfigError]) -> Vec<String> {
        errors.iter().map(|e| e.to_string()).collect()
    }

    #[test]
    fn default_config_validates() {
        assert!(validate_config(&CourierConfig::default()).is_ok());
    }

    #[test]
    fn empty_database_path_fails_validation() {
        let mut config = CourierConfig::default();
        config.storage.database_path = "  ".to_string();
        let errors = validate_config(&config).unwrap_err();
        assert!(messages(&errors).iter().any(|m| m.contains("database_path")));
    }

    #[test]
    fn unknown_log_level_fails_validation() {
        let mut config = CourierConfig::default();
        config.app.log_level = "verbose".to_string();
        let errors = validate_config(&config).unwrap_err();
        assert!(messages(&errors).iter().any(|m| m.contains("app.log_level")));
    }

    #[test]
    fn all_errors_are_collected() {
        let mut config = CourierConfig::default();
        config.queue.direct.concurrency = 0;
        config.queue.notification.max_attempts = 0;
        config.webhook.timeout_ms = 0;
        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 3);
        let msgs = messages(&errors);
        assert!(msgs.iter().any(|m| m.contains("queue.direct.concurrency")));
        assert!(msgs.iter().any(|m| m.contains("queue.notification.max_attempts")));
    }
}
