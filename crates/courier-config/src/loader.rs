// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration loader using Figment for layered config merging.
//!
//! Supports XDG hierarchy: `./courier.toml` > `~/.config/courier/courier.toml` > `/etc/courier/courier.toml`
//! with environment variable overrides via `COURIER_` prefix.

#![allow(clippy::result_large_err)] // figment::Error is external and cannot be boxed without wrapper

use std::path::Path;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};

use crate::model::CourierConfig;

/// System-wide configuration file.
pub const SYSTEM_CONFIG_PATH: &str = "/etc/courier/courier.toml";

/// Local configuration file, relative to the working directory.
pub const LOCAL_CONFIG_PATH: &str = "courier.toml";

/// Section prefixes recognized in `COURIER_*` variable names, longest first.
const ENV_SECTIONS: &[(&str, &str)] = &[
    ("queue_direct_", "queue.direct."),
    ("queue_campaign_", "queue.campaign."),
    ("queue_notification_", "queue.notification."),
    ("queue_", "queue."),
    ("app_", "app."),
    ("session_", "session."),
    ("broadcast_", "broadcast."),
    ("webhook_", "webhook."),
    ("storage_", "storage."),
];

/// Load configuration from the standard XDG hierarchy with env var overrides.
///
/// Merge order (later overrides earlier):
/// 1. Compiled defaults
/// 2. `/etc/courier/courier.toml` (system-wide)
/// 3. `~/.config/courier/courier.toml` (user XDG config)
/// 4. `./courier.toml` (local directory)
/// 5. `COURIER_*` environment variables
pub fn load_config() -> Result<CourierConfig, figment::Error> {
    build_figment().extract()
}

/// Load configuration from a TOML string only (no XDG lookup, no env).
///
/// Used for testing and explicit configuration.
pub fn load_config_from_str(toml_content: &str) -> Result<CourierConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(CourierConfig::default()))
        .merge(Toml::string(toml_content))
        .extract()
}

/// Load configuration from a specific file path with env var overrides.
pub fn load_config_from_path(path: &Path) -> Result<CourierConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(CourierConfig::default()))
        .merge(Toml::file(path))
        .merge(env_provider())
        .extract()
}

/// Build the Figment used internally for config loading.
///
/// Returns the Figment before extraction so callers can inspect metadata.
pub fn build_figment() -> Figment {
    Figment::new()
        .merge(Serialized::defaults(CourierConfig::default()))
        .merge(Toml::file(SYSTEM_CONFIG_PATH))
        .merge(Toml::file(user_config_path().unwrap_or_default()))
        .merge(Toml::file(LOCAL_CONFIG_PATH))
        .merge(env_provider())
}

/// `$XDG_CONFIG_HOME/courier/courier.toml`, if a config dir exists.
pub fn user_config_path() -> Option<std::path::PathBuf> {
    dirs::config_dir().map(|d| d.join("courier/courier.toml"))
}

/// Maps a lowercased, prefix-stripped variable name to a dotted config key.
///
/// Uses explicit section prefixes instead of `Env::split("_")` because key
/// names contain underscores: `COURIER_QUEUE_DIRECT_MAX_ATTEMPTS` must map to
/// `queue.direct.max_attempts`, not `queue.direct.max.attempts`.
pub fn env_key(key: &str) -> String {
    for (prefix, section) in ENV_SECTIONS {
        if let Some(rest) = key.strip_prefix(prefix) {
            return format!("{section}{rest}");
        }
    }
    key.to_string()
}

fn env_provider() -> Env {
    Env::prefixed("COURIER_").map(|key| env_key(key.as_str()).into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_keys_map_to_sections() {
        assert_eq!(env_key("app_log_level"), "app.log_level");
        assert_eq!(env_key("queue_poll_interval_ms"), "queue.poll_interval_ms");
        assert_eq!(
            env_key("queue_direct_max_attempts"),
            "queue.direct.max_attempts"
        );
        assert_eq!(
            env_key("queue_notification_concurrency"),
            "queue.notification.concurrency"
        );
        assert_eq!(
            env_key("session_max_reconnect_attempts"),
            "session.max_reconnect_attempts"
        );
        assert_eq!(env_key("unknown"), "unknown");
    }
}
