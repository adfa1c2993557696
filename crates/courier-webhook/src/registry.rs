// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Notification target management.

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use courier_bus::names;
use courier_config::model::WebhookConfig;
use courier_core::traits::NotificationTargetStore;
use courier_core::types::{
    DeliveryOutcome, Job, NewNotificationTarget, NotificationJob, NotificationPayload,
    NotificationTarget, QueueKind, WILDCARD_EVENT,
};
use courier_core::CourierError;
use courier_queue::{EnqueueOptions, JobEngine};

/// Event name used by [`TargetRegistry::test`] when none is given.
pub const TEST_EVENT: &str = "webhook.test";

/// Partial edit of a target. `None` leaves a field unchanged.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetUpdate {
    pub name: Option<String>,
    pub endpoint_url: Option<String>,
    pub secret: Option<String>,
    pub subscribed_events: Option<BTreeSet<String>>,
    pub retry_attempts: Option<u32>,
    pub timeout_ms: Option<u64>,
}

/// Delivery counters of one target.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TargetStats {
    pub success_count: u64,
    pub failure_count: u64,
    pub total: u64,
    pub success_rate: f64,
    pub last_status: Option<DeliveryOutcome>,
    pub last_error: Option<String>,
    pub last_triggered_at: Option<DateTime<Utc>>,
}

/// Accepts only absolute `http`/`https` URLs with a host.
pub fn validate_endpoint(url: &str) -> Result<(), CourierError> {
    let parsed = reqwest::Url::parse(url)
        .map_err(|e| CourierError::Validation(format!("invalid endpoint url {url:?}: {e}")))?;
    if !matches!(parsed.scheme(), "http" | "https") || parsed.host_str().is_none() {
        return Err(CourierError::Validation(format!(
            "endpoint url must be http(s) with a host: {url:?}"
        )));
    }
    Ok(())
}

fn validate_events(events: &BTreeSet<String>) -> Result<(), CourierError> {
    if events.is_empty() {
        return Err(CourierError::Validation(
            "target must subscribe to at least one event".into(),
        ));
    }
    if let Some(unknown) = events
        .iter()
        .find(|e| e.as_str() != WILDCARD_EVENT && !names::ALL.contains(&e.as_str()))
    {
        return Err(CourierError::Validation(format!(
            "unknown event {unknown:?}"
        )));
    }
    Ok(())
}

fn validate_limits(retry_attempts: u32, timeout_ms: u64) -> Result<(), CourierError> {
    if retry_attempts == 0 {
        return Err(CourierError::Validation(
            "retry_attempts must be at least 1".into(),
        ));
    }
    if timeout_ms == 0 {
        return Err(CourierError::Validation("timeout_ms must be positive".into()));
    }
    Ok(())
}

/// Registry of notification targets.
#[derive(Clone)]
pub struct TargetRegistry {
    store: Arc<dyn NotificationTargetStore>,
    engine: JobEngine,
    config: WebhookConfig,
}

impl TargetRegistry {
    pub fn new(
        config: WebhookConfig,
        store: Arc<dyn NotificationTargetStore>,
        engine: JobEngine,
    ) -> Self {
        Self {
            store,
            engine,
            config,
        }
    }

    /// Registers an active target. Unset limits take the configured defaults.
    pub async fn create(
        &self,
        mut target: NewNotificationTarget,
    ) -> Result<NotificationTarget, CourierError> {
        if target.name.trim().is_empty() {
            return Err(CourierError::Validation("target name is required".into()));
        }
        validate_endpoint(&target.endpoint_url)?;
        validate_events(&target.subscribed_events)?;
        let retry_attempts = *target
            .retry_attempts
            .get_or_insert(self.config.retry_attempts);
        let timeout_ms = *target.timeout_ms.get_or_insert(self.config.timeout_ms);
        validate_limits(retry_attempts, timeout_ms)?;

        let created = self
            .store
            .insert_target(target, self.engine.clock().now())
            .await?;
        info!(target_id = created.id, url = %created.endpoint_url, "notification target created");
        Ok(created)
    }

    pub async fn get(&self, id: i64) -> Result<NotificationTarget, CourierError> {
        self.store
            .get_target(id)
            .await?
            .ok_or_else(|| CourierError::not_found("notification target", id))
    }

    pub async fn list(&self, active_only: bool) -> Result<Vec<NotificationTarget>, CourierError> {
        self.store.list_targets(active_only).await
    }

    pub async fn update(
        &self,
        id: i64,
        update: TargetUpdate,
    ) -> Result<NotificationTarget, CourierError> {
        let mut target = self.get(id).await?;
        if let Some(name) = update.name {
            if name.trim().is_empty() {
                return Err(CourierError::Validation("target name is required".into()));
            }
            target.name = name;
        }
        if let Some(url) = update.endpoint_url {
            validate_endpoint(&url)?;
            target.endpoint_url = url;
        }
        if let Some(secret) = update.secret {
            target.secret = Some(secret).filter(|s| !s.is_empty());
        }
        if let Some(events) = update.subscribed_events {
            validate_events(&events)?;
            target.subscribed_events = events;
        }
        if let Some(attempts) = update.retry_attempts {
            target.retry_attempts = attempts;
        }
        if let Some(timeout) = update.timeout_ms {
            target.timeout_ms = timeout;
        }
        validate_limits(target.retry_attempts, target.timeout_ms)?;

        self.store.update_target(&target).await?;
        info!(target_id = id, "notification target updated");
        Ok(target)
    }

    pub async fn delete(&self, id: i64) -> Result<(), CourierError> {
        if !self.store.delete_target(id).await? {
            return Err(CourierError::not_found("notification target", id));
        }
        info!(target_id = id, "notification target deleted");
        Ok(())
    }

    /// Flips `active`. Returns the new value.
    pub async fn toggle(&self, id: i64) -> Result<bool, CourierError> {
        let target = self.get(id).await?;
        let active = !target.active;
        self.store.set_target_active(id, active).await?;
        info!(target_id = id, active, "notification target toggled");
        Ok(active)
    }

    /// Enqueues a test notification to one target, regardless of its subscriptions.
    pub async fn test(&self, id: i64, event: Option<String>) -> Result<Job, CourierError> {
        let target = self.get(id).await?;
        let payload = NotificationPayload {
            event: event.unwrap_or_else(|| TEST_EVENT.to_string()),
            timestamp: self
                .engine
                .clock()
                .now()
                .to_rfc3339_opts(SecondsFormat::Millis, true),
            data: serde_json::json!({
                "test": true,
                "message": "This is a test notification",
            }),
        };
        self.engine
            .enqueue(
                QueueKind::Notification,
                &NotificationJob {
                    target_id: target.id,
                    payload,
                },
                EnqueueOptions::default().max_attempts(target.retry_attempts.max(1)),
            )
            .await
    }

    pub async fn stats(&self, id: i64) -> Result<TargetStats, CourierError> {
        let t = self.get(id).await?;
        let total = t.success_count + t.failure_count;
        let success_rate = if total > 0 {
            t.success_count as f64 / total as f64 * 100.0
        } else {
            0.0
        };
        Ok(TargetStats {
            success_count: t.success_count,
            failure_count: t.failure_count,
            total,
            success_rate,
            last_status: t.last_status,
            last_error: t.last_error,
            last_triggered_at: t.last_triggered_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use courier_config::model::QueueConfig;
    use courier_core::Clock;
    use courier_test_utils::MemoryStore;

    fn registry() -> TargetRegistry {
        let store = Arc::new(MemoryStore::new());
        let engine = JobEngine::new(&QueueConfig::default(), store.clone(), Clock::new());
        TargetRegistry::new(WebhookConfig::default(), store, engine)
    }

    fn new_target(url: &str, events: &[&str]) -> NewNotificationTarget {
        NewNotificationTarget {
            name: "crm".into(),
            endpoint_url: url.into(),
            secret: Some("s3cret".into()),
            subscribed_events: events.iter().map(|e| e.to_string()).collect(),
            retry_attempts: None,
            timeout_ms: None,
        }
    }

    #[test]
    fn endpoint_validation() {
        assert!(validate_endpoint("https://example.com/hook").is_ok());
        assert!(validate_endpoint("http://10.0.0.1:8080").is_ok());
        assert!(validate_endpoint("ftp://example.com").is_err());
        assert!(validate_endpoint("example.com/hook").is_err());
        assert!(validate_endpoint("").is_err());
    }

    #[tokio::test]
    async fn create_applies_configured_defaults() {
        let registry = registry();
        let target = registry
            .create(new_target("https://example.com/hook", &["message.sent"]))
            .await
            .unwrap();
        assert!(target.active);
        assert_eq!(target.retry_attempts, 3);
        assert_eq!(target.timeout_ms, 10_000);
        assert_eq!(target.last_status, Some(DeliveryOutcome::Pending));
    }

    #[tokio::test]
    async fn create_rejects_bad_input() {
        let registry = registry();
        assert!(registry
            .create(new_target("not a url", &["message.sent"]))
            .await
            .is_err());
        assert!(registry
            .create(new_target("https://example.com", &[]))
            .await
            .is_err());
        assert!(registry
            .create(new_target("https://example.com", &["message.exploded"]))
            .await
            .is_err());
        assert!(registry
            .create(new_target("https://example.com", &["*"]))
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn update_toggle_delete() {
        let registry = registry();
        let target = registry
            .create(new_target("https://example.com/hook", &["*"]))
            .await
            .unwrap();

        let updated = registry
            .update(
                target.id,
                TargetUpdate {
                    endpoint_url: Some("https://example.org/v2".into()),
                    retry_attempts: Some(5),
                    ..TargetUpdate::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.endpoint_url, "https://example.org/v2");
        assert_eq!(registry.get(target.id).await.unwrap().retry_attempts, 5);

        assert!(!registry.toggle(target.id).await.unwrap());
        assert!(registry.list(true).await.unwrap().is_empty());
        assert!(registry.toggle(target.id).await.unwrap());

        registry.delete(target.id).await.unwrap();
        assert!(matches!(
            registry.delete(target.id).await,
            Err(CourierError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_enqueues_with_target_attempts() {
        let registry = registry();
        let target = registry
            .create(NewNotificationTarget {
                retry_attempts: Some(2),
                ..new_target("https://example.com/hook", &["message.sent"])
            })
            .await
            .unwrap();
        let job = registry.test(target.id, None).await.unwrap();
        assert_eq!(job.queue, QueueKind::Notification);
        assert_eq!(job.max_attempts, 2);
        let body: NotificationJob = job.payload_as().unwrap();
        assert_eq!(body.payload.event, TEST_EVENT);
        assert_eq!(body.payload.data["test"], true);
    }

    #[tokio::test]
    async fn stats_of_fresh_target() {
        let registry = registry();
        let target = registry
            .create(new_target("https://example.com/hook", &["*"]))
            .await
            .unwrap();
        let stats = registry.stats(target.id).await.unwrap();
        assert_eq!(stats.total, 0);
        assert_eq!(stats.success_rate, 0.0);
    }
}
