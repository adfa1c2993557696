// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! In-memory implementation of every store trait.
//!
//! Mirrors the SQLite semantics closely enough for component tests, and never
//! leaves the runtime thread, so tests with a paused clock stay deterministic.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use courier_core::traits::{ArtifactHistoryStore, CampaignStore, JobStore, NotificationTargetStore};
use courier_core::types::{
    ArtifactRecord, ArtifactStats, ArtifactStatus, Campaign, CampaignStatus, DeliveryOutcome, Job,
    JobState, NewCampaign, NewJob, NewNotificationTarget, NotificationTarget, QueueKind,
    QueueStats, RemoveOutcome,
};
use courier_core::CourierError;

const DEFAULT_RETRY_ATTEMPTS: u32 = 3;
const DEFAULT_TIMEOUT_MS: u64 = 10_000;

#[derive(Debug, Default)]
struct State {
    next_id: i64,
    jobs: BTreeMap<i64, Job>,
    campaigns: BTreeMap<i64, Campaign>,
    /// message id -> (campaign id, delivered)
    campaign_messages: HashMap<String, (i64, bool)>,
    targets: BTreeMap<i64, NotificationTarget>,
    artifacts: BTreeMap<i64, ArtifactRecord>,
}

impl State {
    fn id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }
}

/// Store backed by in-process maps.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every job of `queue`, oldest first.
    pub async fn jobs(&self, queue: QueueKind) -> Vec<Job> {
        self.state
            .lock()
            .await
            .jobs
            .values()
            .filter(|j| j.queue == queue)
            .cloned()
            .collect()
    }
}

fn finished_or_created(job: &Job) -> DateTime<Utc> {
    job.finished_at.unwrap_or(job.created_at)
}

#[async_trait]
impl JobStore for MemoryStore {
    async fn insert_job(&self, job: NewJob) -> Result<Job, CourierError> {
        let mut state = self.state.lock().await;
        let id = state.id();
        let record = Job {
            id,
            queue: job.queue,
            state: job.initial_state(),
            payload: job.payload,
            priority: job.priority,
            attempts_made: 0,
            max_attempts: job.max_attempts,
            progress: 0,
            created_at: job.created_at,
            available_at: job.available_at,
            processed_at: None,
            finished_at: None,
            failure_reason: None,
            result: None,
        };
        state.jobs.insert(id, record.clone());
        Ok(record)
    }

    async fn claim_next(
        &self,
        queue: QueueKind,
        now: DateTime<Utc>,
    ) -> Result<Option<Job>, CourierError> {
        let mut state = self.state.lock().await;
        let next = state
            .jobs
            .values()
            .filter(|j| {
                j.queue == queue
                    && (j.state == JobState::Waiting
                        || (j.state == JobState::Delayed && j.available_at <= now))
            })
            .min_by(|a, b| {
                b.priority
                    .cmp(&a.priority)
                    .then(a.created_at.cmp(&b.created_at))
                    .then(a.id.cmp(&b.id))
            })
            .map(|j| j.id);
        let Some(id) = next else {
            return Ok(None);
        };
        let job = state
            .jobs
            .get_mut(&id)
            .ok_or_else(|| CourierError::not_found("job", id))?;
        job.state = JobState::Active;
        job.attempts_made += 1;
        job.processed_at = Some(now);
        Ok(Some(job.clone()))
    }

    async fn complete_job(
        &self,
        id: i64,
        result: Option<serde_json::Value>,
        now: DateTime<Utc>,
    ) -> Result<(), CourierError> {
        let mut state = self.state.lock().await;
        if let Some(job) = state.jobs.get_mut(&id).filter(|j| j.state == JobState::Active) {
            job.state = JobState::Completed;
            job.finished_at = Some(now);
            job.result = result;
            job.failure_reason = None;
        }
        Ok(())
    }

    async fn retry_job(
        &self,
        id: i64,
        reason: &str,
        available_at: DateTime<Utc>,
    ) -> Result<(), CourierError> {
        let mut state = self.state.lock().await;
        if let Some(job) = state.jobs.get_mut(&id).filter(|j| j.state == JobState::Active) {
            job.state = JobState::Delayed;
            job.failure_reason = Some(reason.to_string());
            job.available_at = available_at;
        }
        Ok(())
    }

    async fn fail_job(
        &self,
        id: i64,
        reason: &str,
        now: DateTime<Utc>,
    ) -> Result<(), CourierError> {
        let mut state = self.state.lock().await;
        if let Some(job) = state.jobs.get_mut(&id).filter(|j| j.state == JobState::Active) {
            job.state = JobState::Failed;
            job.failure_reason = Some(reason.to_string());
            job.finished_at = Some(now);
        }
        Ok(())
    }

    async fn release_job(&self, id: i64) -> Result<(), CourierError> {
        let mut state = self.state.lock().await;
        if let Some(job) = state.jobs.get_mut(&id).filter(|j| j.state == JobState::Active) {
            job.state = JobState::Waiting;
            job.processed_at = None;
            job.attempts_made = job.attempts_made.saturating_sub(1);
        }
        Ok(())
    }

    async fn update_progress(&self, id: i64, progress: u8) -> Result<(), CourierError> {
        if let Some(job) = self.state.lock().await.jobs.get_mut(&id) {
            job.progress = progress.min(100);
        }
        Ok(())
    }

    async fn get_job(&self, id: i64) -> Result<Option<Job>, CourierError> {
        Ok(self.state.lock().await.jobs.get(&id).cloned())
    }

    async fn list_jobs(
        &self,
        queue: QueueKind,
        state: Option<JobState>,
        offset: u64,
        limit: u64,
    ) -> Result<Vec<Job>, CourierError> {
        let guard = self.state.lock().await;
        Ok(guard
            .jobs
            .values()
            .rev()
            .filter(|j| j.queue == queue && state.is_none_or(|s| j.state == s))
            .skip(offset as usize)
            .take(limit as usize)
            .cloned()
            .collect())
    }

    async fn queue_stats(&self, queue: QueueKind) -> Result<QueueStats, CourierError> {
        let mut stats = QueueStats::default();
        for job in self.state.lock().await.jobs.values() {
            if job.queue == queue {
                stats.add(job.state, 1);
            }
        }
        Ok(stats)
    }

    async fn remove_job(&self, queue: QueueKind, id: i64) -> Result<RemoveOutcome, CourierError> {
        let mut state = self.state.lock().await;
        let outcome = match state.jobs.get(&id).filter(|j| j.queue == queue) {
            None => RemoveOutcome::NotFound,
            Some(job) if job.state == JobState::Active => RemoveOutcome::Active,
            Some(_) => {
                state.jobs.remove(&id);
                RemoveOutcome::Removed
            }
        };
        Ok(outcome)
    }

    async fn next_available_at(
        &self,
        queue: QueueKind,
    ) -> Result<Option<DateTime<Utc>>, CourierError> {
        Ok(self
            .state
            .lock()
            .await
            .jobs
            .values()
            .filter(|j| j.queue == queue && j.state == JobState::Delayed)
            .map(|j| j.available_at)
            .min())
    }

    async fn recover_stalled(
        &self,
        queue: QueueKind,
        now: DateTime<Utc>,
    ) -> Result<u64, CourierError> {
        let mut count = 0;
        for job in self.state.lock().await.jobs.values_mut() {
            if job.queue != queue || job.state != JobState::Active {
                continue;
            }
            if job.attempts_made >= job.max_attempts {
                job.state = JobState::Failed;
                job.finished_at = Some(now);
                job.failure_reason = Some("job stalled and exhausted its attempts".into());
            } else {
                job.state = JobState::Waiting;
            }
            count += 1;
        }
        Ok(count)
    }

    async fn prune_jobs(
        &self,
        queue: QueueKind,
        state: JobState,
        keep: u64,
    ) -> Result<u64, CourierError> {
        let mut guard = self.state.lock().await;
        let mut matching: Vec<(DateTime<Utc>, i64)> = guard
            .jobs
            .values()
            .filter(|j| j.queue == queue && j.state == state)
            .map(|j| (finished_or_created(j), j.id))
            .collect();
        matching.sort_unstable_by(|a, b| b.cmp(a));
        let doomed: Vec<i64> = matching
            .into_iter()
            .skip(keep as usize)
            .map(|(_, id)| id)
            .collect();
        for id in &doomed {
            guard.jobs.remove(id);
        }
        Ok(doomed.len() as u64)
    }

    async fn clean_jobs(
        &self,
        queue: QueueKind,
        state: JobState,
        older_than: DateTime<Utc>,
    ) -> Result<u64, CourierError> {
        if state == JobState::Active {
            return Ok(0);
        }
        let mut guard = self.state.lock().await;
        let before = guard.jobs.len();
        guard.jobs.retain(|_, j| {
            !(j.queue == queue && j.state == state && finished_or_created(j) < older_than)
        });
        Ok((before - guard.jobs.len()) as u64)
    }
}

#[async_trait]
impl CampaignStore for MemoryStore {
    async fn insert_campaign(
        &self,
        campaign: NewCampaign,
        status: CampaignStatus,
        now: DateTime<Utc>,
    ) -> Result<Campaign, CourierError> {
        let mut state = self.state.lock().await;
        let id = state.id();
        let record = Campaign {
            id,
            name: campaign.name,
            message: campaign.message,
            total_recipients: campaign.recipients.len() as u32,
            recipients: campaign.recipients,
            sent_count: 0,
            delivered_count: 0,
            failed_count: 0,
            status,
            scheduled_at: campaign.scheduled_at,
            started_at: None,
            completed_at: None,
            created_at: now,
        };
        state.campaigns.insert(id, record.clone());
        Ok(record)
    }

    async fn get_campaign(&self, id: i64) -> Result<Option<Campaign>, CourierError> {
        Ok(self.state.lock().await.campaigns.get(&id).cloned())
    }

    async fn list_campaigns(
        &self,
        status: Option<CampaignStatus>,
        offset: u64,
        limit: u64,
    ) -> Result<Vec<Campaign>, CourierError> {
        let state = self.state.lock().await;
        Ok(state
            .campaigns
            .values()
            .rev()
            .filter(|c| status.is_none_or(|s| c.status == s))
            .skip(offset as usize)
            .take(limit as usize)
            .cloned()
            .collect())
    }

    async fn update_campaign(&self, campaign: &Campaign) -> Result<(), CourierError> {
        if let Some(stored) = self.state.lock().await.campaigns.get_mut(&campaign.id) {
            stored.name = campaign.name.clone();
            stored.message = campaign.message.clone();
            stored.recipients = campaign.recipients.clone();
            stored.total_recipients = campaign.recipients.len() as u32;
            stored.scheduled_at = campaign.scheduled_at;
            stored.status = campaign.status;
        }
        Ok(())
    }

    async fn transition_campaign(
        &self,
        id: i64,
        from: &[CampaignStatus],
        to: CampaignStatus,
        now: DateTime<Utc>,
    ) -> Result<bool, CourierError> {
        let mut state = self.state.lock().await;
        let Some(campaign) = state
            .campaigns
            .get_mut(&id)
            .filter(|c| from.contains(&c.status))
        else {
            return Ok(false);
        };
        campaign.status = to;
        if to == CampaignStatus::Running {
            campaign.started_at = Some(now);
        } else if to.is_terminal() {
            campaign.completed_at = Some(now);
        }
        Ok(true)
    }

    async fn record_campaign_progress(
        &self,
        id: i64,
        sent_count: u32,
        failed_count: u32,
    ) -> Result<(), CourierError> {
        let mut state = self.state.lock().await;
        let Some(campaign) = state.campaigns.get_mut(&id) else {
            return Ok(());
        };
        if sent_count + failed_count > campaign.total_recipients {
            return Err(CourierError::Storage {
                source: format!("campaign {id}: counters exceed total recipients").into(),
            });
        }
        campaign.sent_count = sent_count;
        campaign.failed_count = failed_count;
        Ok(())
    }

    async fn delete_campaign(&self, id: i64) -> Result<bool, CourierError> {
        let mut state = self.state.lock().await;
        let removed = state.campaigns.remove(&id).is_some();
        state.campaign_messages.retain(|_, (campaign, _)| *campaign != id);
        Ok(removed)
    }

    async fn link_campaign_message(
        &self,
        message_id: &str,
        campaign_id: i64,
    ) -> Result<(), CourierError> {
        self.state
            .lock()
            .await
            .campaign_messages
            .entry(message_id.to_string())
            .or_insert((campaign_id, false));
        Ok(())
    }

    async fn record_campaign_delivery(
        &self,
        message_id: &str,
    ) -> Result<Option<i64>, CourierError> {
        let mut state = self.state.lock().await;
        let Some((campaign_id, delivered)) = state.campaign_messages.get_mut(message_id) else {
            return Ok(None);
        };
        if *delivered {
            return Ok(None);
        }
        *delivered = true;
        let campaign_id = *campaign_id;
        if let Some(campaign) = state.campaigns.get_mut(&campaign_id) {
            campaign.delivered_count += 1;
        }
        Ok(Some(campaign_id))
    }
}

#[async_trait]
impl NotificationTargetStore for MemoryStore {
    async fn insert_target(
        &self,
        target: NewNotificationTarget,
        now: DateTime<Utc>,
    ) -> Result<NotificationTarget, CourierError> {
        let mut state = self.state.lock().await;
        let id = state.id();
        let record = NotificationTarget {
            id,
            name: target.name,
            endpoint_url: target.endpoint_url,
            secret: target.secret,
            subscribed_events: target.subscribed_events,
            active: true,
            retry_attempts: target.retry_attempts.unwrap_or(DEFAULT_RETRY_ATTEMPTS),
            timeout_ms: target.timeout_ms.unwrap_or(DEFAULT_TIMEOUT_MS),
            success_count: 0,
            failure_count: 0,
            last_status: Some(DeliveryOutcome::Pending),
            last_error: None,
            last_triggered_at: None,
            created_at: now,
        };
        state.targets.insert(id, record.clone());
        Ok(record)
    }

    async fn get_target(&self, id: i64) -> Result<Option<NotificationTarget>, CourierError> {
        Ok(self.state.lock().await.targets.get(&id).cloned())
    }

    async fn list_targets(
        &self,
        active_only: bool,
    ) -> Result<Vec<NotificationTarget>, CourierError> {
        Ok(self
            .state
            .lock()
            .await
            .targets
            .values()
            .filter(|t| !active_only || t.active)
            .cloned()
            .collect())
    }

    async fn update_target(&self, target: &NotificationTarget) -> Result<(), CourierError> {
        if let Some(stored) = self.state.lock().await.targets.get_mut(&target.id) {
            stored.name = target.name.clone();
            stored.endpoint_url = target.endpoint_url.clone();
            stored.secret = target.secret.clone();
            stored.subscribed_events = target.subscribed_events.clone();
            stored.retry_attempts = target.retry_attempts;
            stored.timeout_ms = target.timeout_ms;
        }
        Ok(())
    }

    async fn set_target_active(&self, id: i64, active: bool) -> Result<bool, CourierError> {
        let mut state = self.state.lock().await;
        Ok(state
            .targets
            .get_mut(&id)
            .map(|t| t.active = active)
            .is_some())
    }

    async fn delete_target(&self, id: i64) -> Result<bool, CourierError> {
        Ok(self.state.lock().await.targets.remove(&id).is_some())
    }

    async fn record_delivery_success(
        &self,
        id: i64,
        now: DateTime<Utc>,
    ) -> Result<(), CourierError> {
        if let Some(t) = self.state.lock().await.targets.get_mut(&id) {
            t.success_count += 1;
            t.last_status = Some(DeliveryOutcome::Success);
            t.last_error = None;
            t.last_triggered_at = Some(now);
        }
        Ok(())
    }

    async fn record_delivery_failure(
        &self,
        id: i64,
        error: &str,
        now: DateTime<Utc>,
    ) -> Result<(), CourierError> {
        if let Some(t) = self.state.lock().await.targets.get_mut(&id) {
            t.failure_count += 1;
            t.last_status = Some(DeliveryOutcome::Failed);
            t.last_error = Some(error.to_string());
            t.last_triggered_at = Some(now);
        }
        Ok(())
    }
}

#[async_trait]
impl ArtifactHistoryStore for MemoryStore {
    async fn insert_artifact(
        &self,
        generated_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Result<ArtifactRecord, CourierError> {
        let mut state = self.state.lock().await;
        let id = state.id();
        let record = ArtifactRecord {
            id,
            status: ArtifactStatus::Pending,
            generated_at,
            expires_at,
            scanned_at: None,
        };
        state.artifacts.insert(id, record.clone());
        Ok(record)
    }

    async fn set_artifact_status(
        &self,
        id: i64,
        status: ArtifactStatus,
        at: DateTime<Utc>,
    ) -> Result<(), CourierError> {
        let mut state = self.state.lock().await;
        if let Some(record) = state
            .artifacts
            .get_mut(&id)
            .filter(|r| r.status == ArtifactStatus::Pending)
        {
            record.status = status;
            if status == ArtifactStatus::Scanned {
                record.scanned_at = Some(at);
            }
        }
        Ok(())
    }

    async fn list_artifacts(&self, limit: u64) -> Result<Vec<ArtifactRecord>, CourierError> {
        let state = self.state.lock().await;
        let mut records: Vec<ArtifactRecord> = state.artifacts.values().cloned().collect();
        records.sort_by(|a, b| b.generated_at.cmp(&a.generated_at).then(b.id.cmp(&a.id)));
        records.truncate(limit as usize);
        Ok(records)
    }

    async fn artifact_stats(&self) -> Result<ArtifactStats, CourierError> {
        let state = self.state.lock().await;
        let count = |status: ArtifactStatus| {
            state
                .artifacts
                .values()
                .filter(|r| r.status == status)
                .count() as u64
        };
        Ok(ArtifactStats::new(
            count(ArtifactStatus::Pending),
            count(ArtifactStatus::Scanned),
            count(ArtifactStatus::Expired),
        ))
    }

    async fn delete_artifacts_before(&self, cutoff: DateTime<Utc>) -> Result<u64, CourierError> {
        let mut state = self.state.lock().await;
        let before = state.artifacts.len();
        state.artifacts.retain(|_, r| r.generated_at >= cutoff);
        Ok((before - state.artifacts.len()) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use courier_core::types::MessageContent;

    fn new_job(queue: QueueKind, priority: i32, now: DateTime<Utc>) -> NewJob {
        NewJob {
            queue,
            payload: serde_json::json!({}),
            priority,
            max_attempts: 3,
            created_at: now,
            available_at: now,
        }
    }

    #[tokio::test]
    async fn claims_by_priority_then_age() {
        let store = MemoryStore::new();
        let now = Utc::now();
        let low = store.insert_job(new_job(QueueKind::Direct, 1, now)).await.unwrap();
        let high = store.insert_job(new_job(QueueKind::Direct, 10, now)).await.unwrap();

        let first = store.claim_next(QueueKind::Direct, now).await.unwrap().unwrap();
        assert_eq!(first.id, high.id);
        assert_eq!(first.attempts_made, 1);
        let second = store.claim_next(QueueKind::Direct, now).await.unwrap().unwrap();
        assert_eq!(second.id, low.id);
        assert!(store.claim_next(QueueKind::Direct, now).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn delivery_counted_once() {
        let store = MemoryStore::new();
        let campaign = store
            .insert_campaign(
                NewCampaign {
                    name: "promo".into(),
                    message: MessageContent::text("hi"),
                    recipients: vec!["628111222333".into()],
                    scheduled_at: None,
                },
                CampaignStatus::Draft,
                Utc::now(),
            )
            .await
            .unwrap();
        store.link_campaign_message("M1", campaign.id).await.unwrap();
        assert_eq!(
            store.record_campaign_delivery("M1").await.unwrap(),
            Some(campaign.id)
        );
        assert_eq!(store.record_campaign_delivery("M1").await.unwrap(), None);
        let stored = store.get_campaign(campaign.id).await.unwrap().unwrap();
        assert_eq!(stored.delivered_count, 1);
    }
}
