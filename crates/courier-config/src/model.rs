// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration model structs for the Courier messaging gateway.
//!
//! All structs use `#[serde(deny_unknown_fields)]` to reject unrecognized
//! config keys at startup, providing actionable error messages.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Top-level Courier configuration.
///
/// Loaded from TOML files following XDG hierarchy, with environment variable overrides.
/// All sections are optional and default to sensible values.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct CourierConfig {
    /// Process identity and logging.
    #[serde(default)]
    pub app: AppConfig,

    /// Chat-network session lifecycle.
    #[serde(default)]
    pub session: SessionConfig,

    /// Job dispatch engine policies.
    #[serde(default)]
    pub queue: QueueConfig,

    /// Campaign fan-out settings.
    #[serde(default)]
    pub broadcast: BroadcastConfig,

    /// Outbound notification delivery settings.
    #[serde(default)]
    pub webhook: WebhookConfig,

    /// Storage backend settings.
    #[serde(default)]
    pub storage: StorageConfig,
}

/// Process identity and logging configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct AppConfig {
    /// Instance name, used in log output and the notification user agent.
    #[serde(default = "default_app_name")]
    pub name: String,

    /// Logging level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            name: default_app_name(),
            log_level: default_log_level(),
        }
    }
}

fn default_app_name() -> String {
    "courier".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Session lifecycle configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct SessionConfig {
    /// Directory holding the persisted credential blob.
    #[serde(default = "default_auth_dir")]
    pub auth_dir: String,

    /// Reconnect automatically after a transient close.
    #[serde(default = "default_true")]
    pub auto_reconnect: bool,

    /// Consecutive reconnects before giving up.
    #[serde(default = "default_max_reconnect_attempts")]
    pub max_reconnect_attempts: u32,

    /// Base reconnect delay; attempt `n` waits `n * reconnect_interval_ms`.
    #[serde(default = "default_reconnect_interval_ms")]
    pub reconnect_interval_ms: u64,

    /// Lifetime of a credential artifact before it expires.
    #[serde(default = "default_qr_timeout_ms")]
    pub qr_timeout_ms: u64,

    /// How long a refresh waits for a new artifact.
    #[serde(default = "default_qr_refresh_timeout_ms")]
    pub qr_refresh_timeout_ms: u64,

    /// Artifact history older than this is removed by cleanup.
    #[serde(default = "default_qr_history_retention_days")]
    pub qr_history_retention_days: u32,

    /// Also print new artifacts to the terminal.
    #[serde(default = "default_true")]
    pub print_qr_in_terminal: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            auth_dir: default_auth_dir(),
            auto_reconnect: true,
            max_reconnect_attempts: default_max_reconnect_attempts(),
            reconnect_interval_ms: default_reconnect_interval_ms(),
            qr_timeout_ms: default_qr_timeout_ms(),
            qr_refresh_timeout_ms: default_qr_refresh_timeout_ms(),
            qr_history_retention_days: default_qr_history_retention_days(),
            print_qr_in_terminal: true,
        }
    }
}

impl SessionConfig {
    pub fn reconnect_interval(&self) -> Duration {
        Duration::from_millis(self.reconnect_interval_ms)
    }

    pub fn qr_timeout(&self) -> Duration {
        Duration::from_millis(self.qr_timeout_ms)
    }

    pub fn qr_refresh_timeout(&self) -> Duration {
        Duration::from_millis(self.qr_refresh_timeout_ms)
    }
}

fn default_auth_dir() -> String {
    "auth_info".to_string()
}

fn default_true() -> bool {
    true
}

fn default_max_reconnect_attempts() -> u32 {
    5
}

fn default_reconnect_interval_ms() -> u64 {
    5000
}

fn default_qr_timeout_ms() -> u64 {
    60_000
}

fn default_qr_refresh_timeout_ms() -> u64 {
    30_000
}

fn default_qr_history_retention_days() -> u32 {
    7
}

/// Job dispatch engine configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct QueueConfig {
    /// Upper bound on how long an idle worker sleeps before re-checking the store.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    #[serde(default = "default_direct_policy")]
    pub direct: QueuePolicyConfig,

    #[serde(default = "default_campaign_policy")]
    pub campaign: QueuePolicyConfig,

    #[serde(default = "default_notification_policy")]
    pub notification: QueuePolicyConfig,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            direct: default_direct_policy(),
            campaign: default_campaign_policy(),
            notification: default_notification_policy(),
        }
    }
}

impl QueueConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

/// Retry and concurrency policy of one queue.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct QueuePolicyConfig {
    /// Default attempts per job (including the first).
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Exponential backoff base: attempt `k` waits `base * 2^(k-1)`.
    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,

    /// Number of worker tasks claiming from this queue.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Completed jobs kept for inspection.
    #[serde(default = "default_retain")]
    pub retain_completed: u64,

    /// Failed jobs kept for inspection.
    #[serde(default = "default_retain")]
    pub retain_failed: u64,
}

impl QueuePolicyConfig {
    pub fn backoff_base(&self) -> Duration {
        Duration::from_millis(self.backoff_base_ms)
    }
}

fn default_poll_interval_ms() -> u64 {
    1000
}

fn default_max_attempts() -> u32 {
    3
}

fn default_backoff_base_ms() -> u64 {
    1000
}

fn default_concurrency() -> usize {
    1
}

fn default_retain() -> u64 {
    100
}

fn default_direct_policy() -> QueuePolicyConfig {
    QueuePolicyConfig {
        max_attempts: 3,
        backoff_base_ms: 2000,
        concurrency: 1,
        retain_completed: 100,
        retain_failed: 100,
    }
}

fn default_campaign_policy() -> QueuePolicyConfig {
    QueuePolicyConfig {
        max_attempts: 3,
        backoff_base_ms: 3000,
        concurrency: 1,
        retain_completed: 50,
        retain_failed: 50,
    }
}

fn default_notification_policy() -> QueuePolicyConfig {
    QueuePolicyConfig {
        max_attempts: 5,
        backoff_base_ms: 1000,
        concurrency: 4,
        retain_completed: 100,
        retain_failed: 50,
    }
}

/// Campaign fan-out configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct BroadcastConfig {
    /// Pause between consecutive recipients.
    #[serde(default = "default_send_delay_ms")]
    pub send_delay_ms: u64,

    /// Largest recipient list accepted by `create`.
    #[serde(default = "default_max_recipients")]
    pub max_recipients: usize,
}

impl Default for BroadcastConfig {
    fn default() -> Self {
        Self {
            send_delay_ms: default_send_delay_ms(),
            max_recipients: default_max_recipients(),
        }
    }
}

impl BroadcastConfig {
    pub fn send_delay(&self) -> Duration {
        Duration::from_millis(self.send_delay_ms)
    }
}

fn default_send_delay_ms() -> u64 {
    2000
}

fn default_max_recipients() -> usize {
    1000
}

/// Outbound notification configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct WebhookConfig {
    /// Default per-request timeout for new targets.
    #[serde(default = "default_webhook_timeout_ms")]
    pub timeout_ms: u64,

    /// Default delivery attempts for new targets.
    #[serde(default = "default_webhook_retry_attempts")]
    pub retry_attempts: u32,

    /// `User-Agent` header sent with every notification.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            timeout_ms: default_webhook_timeout_ms(),
            retry_attempts: default_webhook_retry_attempts(),
            user_agent: default_user_agent(),
        }
    }
}

fn default_webhook_timeout_ms() -> u64 {
    10_000
}

fn default_webhook_retry_attempts() -> u32 {
    3
}

fn default_user_agent() -> String {
    "Courier-Webhook/1.0".to_string()
}

/// Storage backend configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct StorageConfig {
    /// Path to the SQLite database file.
    #[serde(default = "default_database_path")]
    pub database_path: String,

    /// Enable SQLite WAL mode.
    #[serde(default = "default_true")]
    pub wal_mode: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            wal_mode: true,
        }
    }
}

fn default_database_path() -> String {
    "courier.db".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn queue_defaults_differ_per_queue() {
        let config = QueueConfig::default();
        assert_eq!(config.direct.backoff_base_ms, 2000);
        assert_eq!(config.campaign.backoff_base_ms, 3000);
        assert_eq!(config.notification.max_attempts, 5);
        assert_eq!(config.notification.concurrency, 4);
        assert_eq!(config.notification.retain_failed, 50);
    }

    #[test]
    fn partial_queue_policy_uses_field_defaults() {
        let policy: QueuePolicyConfig = toml::from_str("concurrency = 2").unwrap();
        assert_eq!(policy.concurrency, 2);
        assert_eq!(policy.max_attempts, 3);
    }

    #[test]
    fn duration_helpers() {
        let session = SessionConfig::default();
        assert_eq!(session.reconnect_interval(), Duration::from_secs(5));
        assert_eq!(session.qr_timeout(), Duration::from_secs(60));
        assert_eq!(BroadcastConfig::default().send_delay(), Duration::from_secs(2));
    }
}
