// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Integration tests for the Courier configuration system.

use courier_config::diagnostic::ConfigError;
use courier_config::model::CourierConfig;
use courier_config::{load_and_validate_path, load_and_validate_str, load_config_from_str};

/// Valid TOML with all known sections deserializes successfully.
#[test]
fn valid_toml_deserializes_into_courier_config() {
    let toml = r#"
[app]
name = "gateway-1"
log_level = "debug"

[session]
auth_dir = "/var/lib/courier/auth"
auto_reconnect = false
max_reconnect_attempts = 2
reconnect_interval_ms = 1000
qr_timeout_ms = 30000

[queue]
poll_interval_ms = 250

[queue.direct]
max_attempts = 4
backoff_base_ms = 500
concurrency = 2

[broadcast]
send_delay_ms = 100
max_recipients = 10

[webhook]
timeout_ms = 5000
retry_attempts = 5

[storage]
database_path = "/tmp/courier.db"
wal_mode = false
"#;

    let config = load_config_from_str(toml).expect("valid TOML should deserialize");
    assert_eq!(config.app.name, "gateway-1");
    assert_eq!(config.app.log_level, "debug");
    assert_eq!(config.session.auth_dir, "/var/lib/courier/auth");
    assert!(!config.session.auto_reconnect);
    assert_eq!(config.session.max_reconnect_attempts, 2);
    assert_eq!(config.session.qr_timeout_ms, 30000);
    assert_eq!(config.queue.poll_interval_ms, 250);
    assert_eq!(config.queue.direct.max_attempts, 4);
    assert_eq!(config.queue.direct.concurrency, 2);
    assert_eq!(config.broadcast.max_recipients, 10);
    assert_eq!(config.webhook.retry_attempts, 5);
    assert_eq!(config.storage.database_path, "/tmp/courier.db");
    assert!(!config.storage.wal_mode);
}

/// A partial queue section keeps that queue's own defaults for the other fields.
#[test]
fn partial_queue_section_merges_with_queue_defaults() {
    let toml = r#"
[queue.campaign]
concurrency = 3
"#;

    let config = load_config_from_str(toml).expect("partial section should merge");
    assert_eq!(config.queue.campaign.concurrency, 3);
    assert_eq!(config.queue.campaign.backoff_base_ms, 3000);
    assert_eq!(config.queue.campaign.retain_completed, 50);
    assert_eq!(config.queue.direct.backoff_base_ms, 2000);
}

/// Missing optional sections use defaults without error.
#[test]
fn missing_optional_sections_use_defaults() {
    let config = load_config_from_str("").expect("empty TOML should use defaults");

    assert_eq!(config.app.name, "courier");
    assert_eq!(config.app.log_level, "info");
    assert!(config.session.auto_reconnect);
    assert_eq!(config.session.max_reconnect_attempts, 5);
    assert_eq!(config.session.reconnect_interval_ms, 5000);
    assert_eq!(config.session.qr_timeout_ms, 60000);
    assert_eq!(config.queue.direct.max_attempts, 3);
    assert_eq!(config.queue.notification.concurrency, 4);
    assert_eq!(config.broadcast.send_delay_ms, 2000);
    assert_eq!(config.broadcast.max_recipients, 1000);
    assert_eq!(config.webhook.timeout_ms, 10000);
    assert_eq!(config.webhook.retry_attempts, 3);
    assert_eq!(config.storage.database_path, "courier.db");
    assert!(config.storage.wal_mode);
}

/// A dotted override (as produced by the env provider) wins over TOML.
#[test]
fn dotted_override_wins_over_toml() {
    use figment::{
        Figment,
        providers::{Format, Serialized, Toml},
    };

    let toml_content = r#"
[queue.direct]
max_attempts = 2
"#;

    let config: CourierConfig = Figment::new()
        .merge(Serialized::defaults(CourierConfig::default()))
        .merge(Toml::string(toml_content))
        .merge(("queue.direct.max_attempts", 7))
        .extract()
        .expect("should merge override");

    assert_eq!(config.queue.direct.max_attempts, 7);
    assert_eq!(config.queue.direct.backoff_base_ms, 2000);
}

/// Unknown key in a nested section is reported with a suggestion.
#[test]
fn unknown_key_in_queue_policy_suggests_correction() {
    let toml = r#"
[queue.direct]
max_attemps = 4
"#;

    let errors = load_and_validate_str(toml).expect_err("should reject unknown field");
    let found = errors.iter().any(|e| {
        matches!(e, ConfigError::UnknownKey { key, suggestion, valid_keys, .. } if {
            key == "max_attemps"
                && suggestion.as_deref() == Some("max_attempts")
                && valid_keys.contains("backoff_base_ms")
        })
    });
    assert!(found, "expected UnknownKey with suggestion, got: {errors:?}");
}

/// Unexpected top-level section is rejected by deny_unknown_fields.
#[test]
fn deny_unknown_fields_at_top_level() {
    let toml = r#"
[redis]
host = "localhost"
"#;

    let err = load_config_from_str(toml).expect_err("unknown top-level section should be rejected");
    let err_str = format!("{err}");
    assert!(
        err_str.contains("unknown field") || err_str.contains("redis"),
        "error should mention unknown field, got: {err_str}"
    );
}

/// Invalid type (string where number expected) produces an InvalidType diagnostic.
#[test]
fn invalid_type_is_reported_with_key_path() {
    let toml = r#"
[broadcast]
send_delay_ms = "fast"
"#;

    let errors = load_and_validate_str(toml).expect_err("should reject invalid type");
    assert!(
        errors.iter().any(|e| matches!(
            e,
            ConfigError::InvalidType { key, .. } if key.contains("send_delay_ms")
        )),
        "got: {errors:?}"
    );
}

/// Semantic validation runs after a successful parse.
#[test]
fn validation_rejects_zero_concurrency() {
    let toml = r#"
[queue.notification]
concurrency = 0
"#;

    let errors = load_and_validate_str(toml).expect_err("zero concurrency should fail");
    assert!(errors.iter().any(|e| {
        matches!(
            e,
            ConfigError::Validation { message }
                if message.contains("queue.notification.concurrency")
        )
    }));
}

/// Loading from an explicit file path works and missing files fall back to defaults.
#[test]
fn load_from_path() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("courier.toml");
    std::fs::write(&path, "[app]\nname = \"from-file\"\n").unwrap();

    let config = load_and_validate_path(&path).expect("file config should validate");
    assert_eq!(config.app.name, "from-file");

    let missing = dir.path().join("absent.toml");
    let config = load_and_validate_path(&missing).expect("missing file uses defaults");
    assert_eq!(config.app.name, "courier");
}

/// ConfigError can be rendered using miette's graphical handler.
#[test]
fn config_error_renders_with_miette() {
    use miette::{Diagnostic, GraphicalReportHandler};

    let error = ConfigError::UnknownKey {
        key: "log_levl".to_string(),
        suggestion: Some("log_level".to_string()),
        valid_keys: "name, log_level".to_string(),
        span: None,
        src: None,
    };

    assert!(error.code().is_some());
    let help = error.help().expect("should have help").to_string();
    assert!(help.contains("did you mean `log_level`"), "got: {help}");

    let mut buf = String::new();
    GraphicalReportHandler::new()
        .render_report(&mut buf, &error)
        .expect("should render without error");
    assert!(buf.contains("log_levl"));
}
