// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Campaign lifecycle: create, edit, start, cancel, inspect.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use courier_bus::EventBus;
use courier_config::model::BroadcastConfig;
use courier_core::traits::CampaignStore;
use courier_core::types::{
    Campaign, CampaignJob, CampaignStatus, CampaignUpdate, Job, NewCampaign, QueueKind,
};
use courier_core::CourierError;
use courier_queue::{EnqueueOptions, JobEngine};

use crate::handler::CampaignHandler;

/// Cancellation signals of running campaigns, shared with the handler.
pub(crate) type CancelMap = Arc<DashMap<i64, CancellationToken>>;

/// Aggregate view of one campaign.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CampaignStats {
    pub total_recipients: u32,
    pub sent_count: u32,
    pub delivered_count: u32,
    pub failed_count: u32,
    /// `sent_count / total_recipients` as a percentage.
    pub success_rate: f64,
    pub progress: u8,
    pub status: CampaignStatus,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl From<&Campaign> for CampaignStats {
    fn from(c: &Campaign) -> Self {
        let success_rate = if c.total_recipients > 0 {
            f64::from(c.sent_count) / f64::from(c.total_recipients) * 100.0
        } else {
            0.0
        };
        Self {
            total_recipients: c.total_recipients,
            sent_count: c.sent_count,
            delivered_count: c.delivered_count,
            failed_count: c.failed_count,
            success_rate,
            progress: c.progress_percent(),
            status: c.status,
            started_at: c.started_at,
            completed_at: c.completed_at,
        }
    }
}

/// Entry point for campaign management.
#[derive(Clone)]
pub struct BroadcastCoordinator {
    store: Arc<dyn CampaignStore>,
    engine: JobEngine,
    bus: EventBus,
    config: BroadcastConfig,
    cancels: CancelMap,
}

impl std::fmt::Debug for BroadcastCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BroadcastCoordinator")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl BroadcastCoordinator {
    pub fn new(
        config: BroadcastConfig,
        store: Arc<dyn CampaignStore>,
        engine: JobEngine,
        bus: EventBus,
    ) -> Self {
        Self {
            store,
            engine,
            bus,
            config,
            cancels: Arc::new(DashMap::new()),
        }
    }

    /// Handler for the `campaign` queue, sharing this coordinator's cancellation signals.
    pub fn handler(&self) -> CampaignHandler {
        CampaignHandler::new(
            Arc::clone(&self.store),
            self.engine.clone(),
            self.bus.clone(),
            self.config.send_delay(),
            Arc::clone(&self.cancels),
        )
    }

    fn validate(&self, name: &str, recipients: &[String]) -> Result<(), CourierError> {
        if name.trim().is_empty() {
            return Err(CourierError::Validation("campaign name is required".into()));
        }
        if recipients.is_empty() {
            return Err(CourierError::Validation(
                "campaign needs at least one recipient".into(),
            ));
        }
        if recipients.len() > self.config.max_recipients {
            return Err(CourierError::Validation(format!(
                "campaign exceeds {} recipients",
                self.config.max_recipients
            )));
        }
        Ok(())
    }

    /// Validates and stores a new campaign as `scheduled` or `draft`.
    pub async fn create(&self, campaign: NewCampaign) -> Result<Campaign, CourierError> {
        self.validate(&campaign.name, &campaign.recipients)?;
        campaign.message.validate()?;
        let status = if campaign.scheduled_at.is_some() {
            CampaignStatus::Scheduled
        } else {
            CampaignStatus::Draft
        };
        let created = self
            .store
            .insert_campaign(campaign, status, self.engine.clock().now())
            .await?;
        info!(
            campaign_id = created.id,
            recipients = created.total_recipients,
            %status,
            "campaign created"
        );
        Ok(created)
    }

    pub async fn get(&self, id: i64) -> Result<Campaign, CourierError> {
        self.store
            .get_campaign(id)
            .await?
            .ok_or_else(|| CourierError::not_found("campaign", id))
    }

    /// Campaigns newest first.
    pub async fn list(
        &self,
        status: Option<CampaignStatus>,
        offset: u64,
        limit: u64,
    ) -> Result<Vec<Campaign>, CourierError> {
        self.store.list_campaigns(status, offset, limit).await
    }

    /// Edits a campaign that has not started yet.
    pub async fn update(&self, id: i64, update: CampaignUpdate) -> Result<Campaign, CourierError> {
        let mut campaign = self.get(id).await?;
        if !matches!(
            campaign.status,
            CampaignStatus::Draft | CampaignStatus::Scheduled
        ) {
            return Err(CourierError::InvalidState(format!(
                "campaign {id} is {} and can no longer be edited",
                campaign.status
            )));
        }

        if let Some(name) = update.name {
            campaign.name = name;
        }
        if let Some(message) = update.message {
            message.validate()?;
            campaign.message = message;
        }
        if let Some(recipients) = update.recipients {
            campaign.recipients = recipients;
        }
        if let Some(at) = update.scheduled_at {
            campaign.scheduled_at = Some(at);
            campaign.status = CampaignStatus::Scheduled;
        }
        self.validate(&campaign.name, &campaign.recipients)?;
        campaign.total_recipients = campaign.recipients.len() as u32;

        self.store.update_campaign(&campaign).await?;
        info!(campaign_id = id, "campaign updated");
        Ok(campaign)
    }

    /// Deletes a campaign that is not running.
    pub async fn delete(&self, id: i64) -> Result<(), CourierError> {
        let campaign = self.get(id).await?;
        if campaign.status == CampaignStatus::Running {
            return Err(CourierError::InvalidState(format!(
                "campaign {id} is running"
            )));
        }
        self.store.delete_campaign(id).await?;
        info!(campaign_id = id, "campaign deleted");
        Ok(())
    }

    /// Moves a draft or scheduled campaign to `running` and enqueues its fan-out job.
    pub async fn start(&self, id: i64) -> Result<Job, CourierError> {
        let campaign = self.get(id).await?;
        let now = self.engine.clock().now();
        let started = self
            .store
            .transition_campaign(
                id,
                &[CampaignStatus::Draft, CampaignStatus::Scheduled],
                CampaignStatus::Running,
                now,
            )
            .await?;
        if !started {
            return Err(CourierError::InvalidState(format!(
                "campaign {id} can only be started from draft or scheduled, it is {}",
                campaign.status
            )));
        }

        let job = match self
            .engine
            .enqueue(
                QueueKind::Campaign,
                &CampaignJob { campaign_id: id },
                EnqueueOptions::default(),
            )
            .await
        {
            Ok(job) => job,
            Err(e) => {
                warn!(campaign_id = id, error = %e, "failed to enqueue campaign");
                self.store
                    .transition_campaign(
                        id,
                        &[CampaignStatus::Running],
                        CampaignStatus::Failed,
                        now,
                    )
                    .await?;
                return Err(e);
            }
        };
        info!(campaign_id = id, job_id = job.id, "campaign started");
        Ok(job)
    }

    /// Cancels a scheduled or running campaign.
    ///
    /// Recipients not yet enqueued are skipped; messages already enqueued
    /// still go out.
    pub async fn cancel(&self, id: i64) -> Result<Campaign, CourierError> {
        let campaign = self.get(id).await?;
        let cancelled = self
            .store
            .transition_campaign(
                id,
                &[CampaignStatus::Scheduled, CampaignStatus::Running],
                CampaignStatus::Cancelled,
                self.engine.clock().now(),
            )
            .await?;
        if !cancelled {
            return Err(CourierError::InvalidState(format!(
                "only scheduled or running campaigns can be cancelled, campaign {id} is {}",
                campaign.status
            )));
        }
        if let Some(token) = self.cancels.get(&id) {
            token.cancel();
        }
        info!(campaign_id = id, "campaign cancelled");
        self.get(id).await
    }

    pub async fn stats(&self, id: i64) -> Result<CampaignStats, CourierError> {
        Ok(CampaignStats::from(&self.get(id).await?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use courier_config::model::QueueConfig;
    use courier_core::types::MessageContent;
    use courier_core::Clock;
    use courier_test_utils::MemoryStore;

    fn coordinator(store: &Arc<MemoryStore>) -> BroadcastCoordinator {
        let engine = JobEngine::new(&QueueConfig::default(), store.clone(), Clock::new());
        let config = BroadcastConfig {
            send_delay_ms: 2000,
            max_recipients: 3,
        };
        BroadcastCoordinator::new(config, store.clone(), engine, EventBus::new())
    }

    fn new_campaign(recipients: &[&str]) -> NewCampaign {
        NewCampaign {
            name: "launch".into(),
            message: MessageContent::text("we are live"),
            recipients: recipients.iter().map(|r| r.to_string()).collect(),
            scheduled_at: None,
        }
    }

    #[tokio::test]
    async fn create_rejects_empty_and_oversized() {
        let store = Arc::new(MemoryStore::new());
        let coord = coordinator(&store);
        assert!(matches!(
            coord.create(new_campaign(&[])).await,
            Err(CourierError::Validation(_))
        ));
        assert!(matches!(
            coord
                .create(new_campaign(&["628111", "628112", "628113", "628114"]))
                .await,
            Err(CourierError::Validation(_))
        ));
        assert!(coord.list(None, 0, 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn scheduled_at_decides_initial_status() {
        let store = Arc::new(MemoryStore::new());
        let coord = coordinator(&store);
        let draft = coord.create(new_campaign(&["628111222333"])).await.unwrap();
        assert_eq!(draft.status, CampaignStatus::Draft);

        let mut scheduled = new_campaign(&["628111222333"]);
        scheduled.scheduled_at = Some(Utc::now());
        let scheduled = coord.create(scheduled).await.unwrap();
        assert_eq!(scheduled.status, CampaignStatus::Scheduled);
    }

    #[tokio::test]
    async fn start_enqueues_once() {
        let store = Arc::new(MemoryStore::new());
        let coord = coordinator(&store);
        let campaign = coord.create(new_campaign(&["628111222333"])).await.unwrap();

        let job = coord.start(campaign.id).await.unwrap();
        assert_eq!(job.queue, QueueKind::Campaign);
        assert_eq!(job.priority, 1);
        let running = coord.get(campaign.id).await.unwrap();
        assert_eq!(running.status, CampaignStatus::Running);
        assert!(running.started_at.is_some());

        assert!(matches!(
            coord.start(campaign.id).await,
            Err(CourierError::InvalidState(_))
        ));
    }

    #[tokio::test]
    async fn running_campaigns_are_locked() {
        let store = Arc::new(MemoryStore::new());
        let coord = coordinator(&store);
        let campaign = coord.create(new_campaign(&["628111222333"])).await.unwrap();
        coord.start(campaign.id).await.unwrap();

        let edit = CampaignUpdate {
            name: Some("renamed".into()),
            ..CampaignUpdate::default()
        };
        assert!(coord.update(campaign.id, edit).await.is_err());
        assert!(coord.delete(campaign.id).await.is_err());

        let cancelled = coord.cancel(campaign.id).await.unwrap();
        assert_eq!(cancelled.status, CampaignStatus::Cancelled);
        assert!(cancelled.completed_at.is_some());
        assert!(coord.cancel(campaign.id).await.is_err());
        coord.delete(campaign.id).await.unwrap();
        assert!(matches!(
            coord.get(campaign.id).await,
            Err(CourierError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn update_recounts_recipients() {
        let store = Arc::new(MemoryStore::new());
        let coord = coordinator(&store);
        let campaign = coord.create(new_campaign(&["628111222333"])).await.unwrap();
        let updated = coord
            .update(
                campaign.id,
                CampaignUpdate {
                    recipients: Some(vec!["628111222333".into(), "628111222334".into()]),
                    scheduled_at: Some(Utc::now()),
                    ..CampaignUpdate::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.total_recipients, 2);
        assert_eq!(updated.status, CampaignStatus::Scheduled);
        let stored = coord.get(campaign.id).await.unwrap();
        assert_eq!(stored.total_recipients, 2);
    }

    #[test]
    fn stats_success_rate() {
        let now = Utc::now();
        let campaign = Campaign {
            id: 1,
            name: "c".into(),
            message: MessageContent::text("x"),
            recipients: vec!["a".into(), "b".into(), "c".into(), "d".into()],
            total_recipients: 4,
            sent_count: 3,
            delivered_count: 2,
            failed_count: 1,
            status: CampaignStatus::Completed,
            scheduled_at: None,
            started_at: Some(now),
            completed_at: Some(now),
            created_at: now,
        };
        let stats = CampaignStats::from(&campaign);
        assert!((stats.success_rate - 75.0).abs() < f64::EPSILON);
        assert_eq!(stats.progress, 100);
    }
}
