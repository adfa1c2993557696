// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SQLite implementation of the store traits.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::debug;

use courier_config::model::StorageConfig;
use courier_core::traits::{ArtifactHistoryStore, CampaignStore, JobStore, NotificationTargetStore};
use courier_core::types::{
    ArtifactRecord, ArtifactStats, ArtifactStatus, Campaign, CampaignStatus, Job, JobState,
    NewCampaign, NewJob, NewNotificationTarget, NotificationTarget, QueueKind, QueueStats,
    RemoveOutcome,
};
use courier_core::CourierError;

use crate::database::{Database, map_tr_err};
use crate::queries;

/// SQLite-backed storage.
///
/// Wraps a [`Database`] handle and delegates every store operation to the
/// typed query modules. Cloning shares the same writer thread.
#[derive(Debug, Clone)]
pub struct SqliteStorage {
    db: Database,
}

impl SqliteStorage {
    /// Open the database described by `config` and run migrations.
    pub async fn open(config: &StorageConfig) -> Result<Self, CourierError> {
        let db = Database::open_with(&config.database_path, config.wal_mode).await?;
        debug!(path = %config.database_path, "SQLite storage initialized");
        Ok(Self { db })
    }

    /// Private in-memory storage.
    pub async fn in_memory() -> Result<Self, CourierError> {
        Ok(Self {
            db: Database::open_in_memory().await?,
        })
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    /// Round-trips a trivial query through the writer thread.
    pub async fn health_check(&self) -> Result<(), CourierError> {
        self.db
            .connection()
            .call(|conn| -> Result<(), rusqlite::Error> {
                conn.execute_batch("SELECT 1;")?;
                Ok(())
            })
            .await
            .map_err(map_tr_err)
    }

    /// Checkpoint the WAL before shutdown. The connection stays usable.
    pub async fn close(&self) -> Result<(), CourierError> {
        self.db.checkpoint().await
    }
}

#[async_trait]
impl JobStore for SqliteStorage {
    async fn insert_job(&self, job: NewJob) -> Result<Job, CourierError> {
        queries::jobs::insert_job(&self.db, job).await
    }

    async fn claim_next(
        &self,
        queue: QueueKind,
        now: DateTime<Utc>,
    ) -> Result<Option<Job>, CourierError> {
        queries::jobs::claim_next(&self.db, queue, now).await
    }

    async fn complete_job(
        &self,
        id: i64,
        result: Option<serde_json::Value>,
        now: DateTime<Utc>,
    ) -> Result<(), CourierError> {
        queries::jobs::complete_job(&self.db, id, result, now).await
    }

    async fn retry_job(
        &self,
        id: i64,
        reason: &str,
        available_at: DateTime<Utc>,
    ) -> Result<(), CourierError> {
        queries::jobs::retry_job(&self.db, id, reason, available_at).await
    }

    async fn fail_job(
        &self,
        id: i64,
        reason: &str,
        now: DateTime<Utc>,
    ) -> Result<(), CourierError> {
        queries::jobs::fail_job(&self.db, id, reason, now).await
    }

    async fn release_job(&self, id: i64) -> Result<(), CourierError> {
        queries::jobs::release_job(&self.db, id).await
    }

    async fn update_progress(&self, id: i64, progress: u8) -> Result<(), CourierError> {
        queries::jobs::update_progress(&self.db, id, progress).await
    }

    async fn get_job(&self, id: i64) -> Result<Option<Job>, CourierError> {
        queries::jobs::get_job(&self.db, id).await
    }

    async fn list_jobs(
        &self,
        queue: QueueKind,
        state: Option<JobState>,
        offset: u64,
        limit: u64,
    ) -> Result<Vec<Job>, CourierError> {
        queries::jobs::list_jobs(&self.db, queue, state, offset, limit).await
    }

    async fn queue_stats(&self, queue: QueueKind) -> Result<QueueStats, CourierError> {
        queries::jobs::queue_stats(&self.db, queue).await
    }

    async fn remove_job(&self, queue: QueueKind, id: i64) -> Result<RemoveOutcome, CourierError> {
        queries::jobs::remove_job(&self.db, queue, id).await
    }

    async fn next_available_at(
        &self,
        queue: QueueKind,
    ) -> Result<Option<DateTime<Utc>>, CourierError> {
        queries::jobs::next_available_at(&self.db, queue).await
    }

    async fn recover_stalled(
        &self,
        queue: QueueKind,
        now: DateTime<Utc>,
    ) -> Result<u64, CourierError> {
        queries::jobs::recover_stalled(&self.db, queue, now).await
    }

    async fn prune_jobs(
        &self,
        queue: QueueKind,
        state: JobState,
        keep: u64,
    ) -> Result<u64, CourierError> {
        queries::jobs::prune_jobs(&self.db, queue, state, keep).await
    }

    async fn clean_jobs(
        &self,
        queue: QueueKind,
        state: JobState,
        older_than: DateTime<Utc>,
    ) -> Result<u64, CourierError> {
        queries::jobs::clean_jobs(&self.db, queue, state, older_than).await
    }
}

#[async_trait]
impl CampaignStore for SqliteStorage {
    async fn insert_campaign(
        &self,
        campaign: NewCampaign,
        status: CampaignStatus,
        now: DateTime<Utc>,
    ) -> Result<Campaign, CourierError> {
        queries::campaigns::insert_campaign(&self.db, campaign, status, now).await
    }

    async fn get_campaign(&self, id: i64) -> Result<Option<Campaign>, CourierError> {
        queries::campaigns::get_campaign(&self.db, id).await
    }

    async fn list_campaigns(
        &self,
        status: Option<CampaignStatus>,
        offset: u64,
        limit: u64,
    ) -> Result<Vec<Campaign>, CourierError> {
        queries::campaigns::list_campaigns(&self.db, status, offset, limit).await
    }

    async fn update_campaign(&self, campaign: &Campaign) -> Result<(), CourierError> {
        queries::campaigns::update_campaign(&self.db, campaign).await
    }

    async fn transition_campaign(
        &self,
        id: i64,
        from: &[CampaignStatus],
        to: CampaignStatus,
        now: DateTime<Utc>,
    ) -> Result<bool, CourierError> {
        queries::campaigns::transition_campaign(&self.db, id, from, to, now).await
    }

    async fn record_campaign_progress(
        &self,
        id: i64,
        sent_count: u32,
        failed_count: u32,
    ) -> Result<(), CourierError> {
        queries::campaigns::record_campaign_progress(&self.db, id, sent_count, failed_count).await
    }

    async fn delete_campaign(&self, id: i64) -> Result<bool, CourierError> {
        queries::campaigns::delete_campaign(&self.db, id).await
    }

    async fn link_campaign_message(
        &self,
        message_id: &str,
        campaign_id: i64,
    ) -> Result<(), CourierError> {
        queries::campaigns::link_campaign_message(&self.db, message_id, campaign_id).await
    }

    async fn record_campaign_delivery(
        &self,
        message_id: &str,
    ) -> Result<Option<i64>, CourierError> {
        queries::campaigns::record_campaign_delivery(&self.db, message_id).await
    }
}

#[async_trait]
impl NotificationTargetStore for SqliteStorage {
    async fn insert_target(
        &self,
        target: NewNotificationTarget,
        now: DateTime<Utc>,
    ) -> Result<NotificationTarget, CourierError> {
        queries::targets::insert_target(&self.db, target, now).await
    }

    async fn get_target(&self, id: i64) -> Result<Option<NotificationTarget>, CourierError> {
        queries::targets::get_target(&self.db, id).await
    }

    async fn list_targets(
        &self,
        active_only: bool,
    ) -> Result<Vec<NotificationTarget>, CourierError> {
        queries::targets::list_targets(&self.db, active_only).await
    }

    async fn update_target(&self, target: &NotificationTarget) -> Result<(), CourierError> {
        queries::targets::update_target(&self.db, target).await
    }

    async fn set_target_active(&self, id: i64, active: bool) -> Result<bool, CourierError> {
        queries::targets::set_target_active(&self.db, id, active).await
    }

    async fn delete_target(&self, id: i64) -> Result<bool, CourierError> {
        queries::targets::delete_target(&self.db, id).await
    }

    async fn record_delivery_success(
        &self,
        id: i64,
        now: DateTime<Utc>,
    ) -> Result<(), CourierError> {
        queries::targets::record_delivery_success(&self.db, id, now).await
    }

    async fn record_delivery_failure(
        &self,
        id: i64,
        error: &str,
        now: DateTime<Utc>,
    ) -> Result<(), CourierError> {
        queries::targets::record_delivery_failure(&self.db, id, error, now).await
    }
}

#[async_trait]
impl ArtifactHistoryStore for SqliteStorage {
    async fn insert_artifact(
        &self,
        generated_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Result<ArtifactRecord, CourierError> {
        queries::qr_history::insert_artifact(&self.db, generated_at, expires_at).await
    }

    async fn set_artifact_status(
        &self,
        id: i64,
        status: ArtifactStatus,
        at: DateTime<Utc>,
    ) -> Result<(), CourierError> {
        queries::qr_history::set_artifact_status(&self.db, id, status, at).await
    }

    async fn list_artifacts(&self, limit: u64) -> Result<Vec<ArtifactRecord>, CourierError> {
        queries::qr_history::list_artifacts(&self.db, limit).await
    }

    async fn artifact_stats(&self) -> Result<ArtifactStats, CourierError> {
        queries::qr_history::artifact_stats(&self.db).await
    }

    async fn delete_artifacts_before(&self, cutoff: DateTime<Utc>) -> Result<u64, CourierError> {
        queries::qr_history::delete_artifacts_before(&self.db, cutoff).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tempfile::tempdir;

    #[tokio::test]
    async fn open_from_config_and_use_through_traits() {
        let dir = tempdir().unwrap();
        let config = StorageConfig {
            database_path: dir.path().join("courier.db").to_string_lossy().into_owned(),
            wal_mode: true,
        };
        let storage = SqliteStorage::open(&config).await.unwrap();
        storage.health_check().await.unwrap();

        let jobs: Arc<dyn JobStore> = Arc::new(storage.clone());
        let now = Utc::now();
        let job = jobs
            .insert_job(NewJob {
                queue: QueueKind::Notification,
                payload: serde_json::json!({"target_id": 1}),
                priority: 15,
                max_attempts: 5,
                created_at: now,
                available_at: now,
            })
            .await
            .unwrap();
        let stats = jobs.queue_stats(QueueKind::Notification).await.unwrap();
        assert_eq!(stats.waiting, 1);
        assert_eq!(
            jobs.get_job(job.id).await.unwrap().unwrap().queue,
            QueueKind::Notification
        );

        storage.close().await.unwrap();
    }

    #[tokio::test]
    async fn in_memory_storage_is_isolated() {
        let a = SqliteStorage::in_memory().await.unwrap();
        let b = SqliteStorage::in_memory().await.unwrap();
        let now = Utc::now();
        a.insert_artifact(now, now).await.unwrap();
        assert_eq!(a.artifact_stats().await.unwrap().total, 1);
        assert_eq!(b.artifact_stats().await.unwrap().total, 0);
    }
}
