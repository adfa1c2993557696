// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Store traits for durable state.
//!
//! Every method takes explicit timestamps instead of reading a clock so the
//! callers decide what "now" means (see [`crate::clock::Clock`]).

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::CourierError;
use crate::types::{
    ArtifactRecord, ArtifactStats, ArtifactStatus, Campaign, CampaignStatus, Job, JobState,
    NewCampaign, NewJob, NewNotificationTarget, NotificationTarget, QueueKind, QueueStats,
    RemoveOutcome,
};

/// Durable job queue storage.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Persists a new job as `waiting` or `delayed` (see [`NewJob::initial_state`]).
    async fn insert_job(&self, job: NewJob) -> Result<Job, CourierError>;

    /// Atomically claims the next eligible job of `queue`.
    ///
    /// Eligible jobs are `waiting`, or `delayed` with `available_at <= now`,
    /// ordered by `priority DESC, created_at ASC, id ASC`. The claimed job
    /// becomes `active`, its `attempts_made` is incremented and
    /// `processed_at` is set to `now`.
    async fn claim_next(
        &self,
        queue: QueueKind,
        now: DateTime<Utc>,
    ) -> Result<Option<Job>, CourierError>;

    /// Marks an active job `completed`.
    async fn complete_job(
        &self,
        id: i64,
        result: Option<serde_json::Value>,
        now: DateTime<Utc>,
    ) -> Result<(), CourierError>;

    /// Moves an active job back to `delayed` until `available_at`.
    async fn retry_job(
        &self,
        id: i64,
        reason: &str,
        available_at: DateTime<Utc>,
    ) -> Result<(), CourierError>;

    /// Marks an active job permanently `failed`.
    async fn fail_job(&self, id: i64, reason: &str, now: DateTime<Utc>)
    -> Result<(), CourierError>;

    /// Hands an active job back to `waiting` without charging the attempt.
    ///
    /// Used when a worker is interrupted by shutdown.
    async fn release_job(&self, id: i64) -> Result<(), CourierError>;

    /// Records handler progress (0..=100).
    async fn update_progress(&self, id: i64, progress: u8) -> Result<(), CourierError>;

    async fn get_job(&self, id: i64) -> Result<Option<Job>, CourierError>;

    /// Lists jobs newest first, optionally filtered by state.
    async fn list_jobs(
        &self,
        queue: QueueKind,
        state: Option<JobState>,
        offset: u64,
        limit: u64,
    ) -> Result<Vec<Job>, CourierError>;

    async fn queue_stats(&self, queue: QueueKind) -> Result<QueueStats, CourierError>;

    /// Deletes a job unless a worker currently holds it.
    async fn remove_job(&self, queue: QueueKind, id: i64) -> Result<RemoveOutcome, CourierError>;

    /// Earliest `available_at` among delayed jobs of `queue`.
    async fn next_available_at(
        &self,
        queue: QueueKind,
    ) -> Result<Option<DateTime<Utc>>, CourierError>;

    /// Returns jobs left `active` by a previous process to `waiting`.
    ///
    /// Jobs that already used all their attempts are marked `failed` instead.
    async fn recover_stalled(
        &self,
        queue: QueueKind,
        now: DateTime<Utc>,
    ) -> Result<u64, CourierError>;

    /// Keeps only the `keep` most recently finished jobs in `state`.
    async fn prune_jobs(
        &self,
        queue: QueueKind,
        state: JobState,
        keep: u64,
    ) -> Result<u64, CourierError>;

    /// Deletes jobs in `state` last touched before `older_than`. Active jobs are never cleaned.
    async fn clean_jobs(
        &self,
        queue: QueueKind,
        state: JobState,
        older_than: DateTime<Utc>,
    ) -> Result<u64, CourierError>;
}

/// Campaign storage.
#[async_trait]
pub trait CampaignStore: Send + Sync {
    async fn insert_campaign(
        &self,
        campaign: NewCampaign,
        status: CampaignStatus,
        now: DateTime<Utc>,
    ) -> Result<Campaign, CourierError>;

    async fn get_campaign(&self, id: i64) -> Result<Option<Campaign>, CourierError>;

    /// Lists campaigns newest first, optionally filtered by status.
    async fn list_campaigns(
        &self,
        status: Option<CampaignStatus>,
        offset: u64,
        limit: u64,
    ) -> Result<Vec<Campaign>, CourierError>;

    /// Overwrites the editable fields (name, message, recipients, schedule, status).
    async fn update_campaign(&self, campaign: &Campaign) -> Result<(), CourierError>;

    /// Compare-and-set status change.
    ///
    /// Succeeds only if the current status is one of `from`. Entering
    /// `running` stamps `started_at`; entering a terminal status stamps
    /// `completed_at`. Returns whether the transition happened.
    async fn transition_campaign(
        &self,
        id: i64,
        from: &[CampaignStatus],
        to: CampaignStatus,
        now: DateTime<Utc>,
    ) -> Result<bool, CourierError>;

    /// Persists absolute sent/failed counters.
    async fn record_campaign_progress(
        &self,
        id: i64,
        sent_count: u32,
        failed_count: u32,
    ) -> Result<(), CourierError>;

    async fn delete_campaign(&self, id: i64) -> Result<bool, CourierError>;

    /// Associates an outbound message id with the campaign that produced it.
    async fn link_campaign_message(
        &self,
        message_id: &str,
        campaign_id: i64,
    ) -> Result<(), CourierError>;

    /// Counts a delivery receipt for a linked message, at most once per message.
    ///
    /// Returns the campaign id when the receipt was counted.
    async fn record_campaign_delivery(&self, message_id: &str)
    -> Result<Option<i64>, CourierError>;
}

/// Notification target registry.
#[async_trait]
pub trait NotificationTargetStore: Send + Sync {
    async fn insert_target(
        &self,
        target: NewNotificationTarget,
        now: DateTime<Utc>,
    ) -> Result<NotificationTarget, CourierError>;

    async fn get_target(&self, id: i64) -> Result<Option<NotificationTarget>, CourierError>;

    async fn list_targets(&self, active_only: bool)
    -> Result<Vec<NotificationTarget>, CourierError>;

    /// Overwrites the editable fields (name, url, secret, events, retry attempts, timeout).
    async fn update_target(&self, target: &NotificationTarget) -> Result<(), CourierError>;

    async fn set_target_active(&self, id: i64, active: bool) -> Result<bool, CourierError>;

    async fn delete_target(&self, id: i64) -> Result<bool, CourierError>;

    /// `success_count += 1`, `last_status = success`, clears `last_error`.
    async fn record_delivery_success(
        &self,
        id: i64,
        now: DateTime<Utc>,
    ) -> Result<(), CourierError>;

    /// `failure_count += 1`, `last_status = failed`, stores `error`.
    async fn record_delivery_failure(
        &self,
        id: i64,
        error: &str,
        now: DateTime<Utc>,
    ) -> Result<(), CourierError>;
}

/// Bounded history of credential artifacts.
#[async_trait]
pub trait ArtifactHistoryStore: Send + Sync {
    /// Records a new `pending` artifact.
    async fn insert_artifact(
        &self,
        generated_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Result<ArtifactRecord, CourierError>;

    /// Moves a `pending` artifact to `status`. Non-pending rows are left alone.
    async fn set_artifact_status(
        &self,
        id: i64,
        status: ArtifactStatus,
        at: DateTime<Utc>,
    ) -> Result<(), CourierError>;

    /// Most recent artifacts first.
    async fn list_artifacts(&self, limit: u64) -> Result<Vec<ArtifactRecord>, CourierError>;

    async fn artifact_stats(&self) -> Result<ArtifactStats, CourierError>;

    /// Deletes history generated before `cutoff`.
    async fn delete_artifacts_before(&self, cutoff: DateTime<Utc>) -> Result<u64, CourierError>;
}
