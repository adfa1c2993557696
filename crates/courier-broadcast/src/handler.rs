// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Handler for the `campaign` queue: paced fan-out of one campaign into
//! direct-message jobs.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use courier_bus::{EventBus, EventKind};
use courier_core::address::resolve_recipient;
use courier_core::traits::CampaignStore;
use courier_core::types::{
    progress_percent, Campaign, CampaignJob, CampaignStatus, DirectMessageJob, Job, QueueKind,
};
use courier_core::CourierError;
use courier_queue::{EnqueueOptions, JobContext, JobEngine, JobHandler};

use crate::coordinator::CancelMap;

/// How a fan-out run ended without error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Finished,
    /// Cancelled, or moved out of `running` by someone else.
    Stopped,
}

/// Expands a campaign into one direct-message job per recipient.
///
/// Recipients are processed in list order with `send_delay` between them.
/// Counters are persisted after every recipient so a retried or recovered
/// job resumes after the last processed one.
pub struct CampaignHandler {
    store: Arc<dyn CampaignStore>,
    engine: JobEngine,
    bus: EventBus,
    send_delay: Duration,
    cancels: CancelMap,
}

impl CampaignHandler {
    pub(crate) fn new(
        store: Arc<dyn CampaignStore>,
        engine: JobEngine,
        bus: EventBus,
        send_delay: Duration,
        cancels: CancelMap,
    ) -> Self {
        Self {
            store,
            engine,
            bus,
            send_delay,
            cancels,
        }
    }

    async fn dispatch(&self, campaign: &Campaign, recipient: &str) -> Result<Job, CourierError> {
        let to = resolve_recipient(recipient)?;
        self.engine
            .enqueue(
                QueueKind::Direct,
                &DirectMessageJob {
                    to,
                    content: campaign.message.clone(),
                    campaign_id: Some(campaign.id),
                },
                EnqueueOptions::default(),
            )
            .await
    }

    async fn still_running(&self, id: i64) -> Result<bool, CourierError> {
        Ok(self
            .store
            .get_campaign(id)
            .await?
            .is_some_and(|c| c.status == CampaignStatus::Running))
    }

    async fn fan_out(
        &self,
        campaign: &mut Campaign,
        cancel: &CancellationToken,
        ctx: &JobContext,
    ) -> Result<Outcome, CourierError> {
        let total = campaign.total_recipients;
        let resume_from = campaign.processed() as usize;
        if resume_from > 0 {
            info!(
                campaign_id = campaign.id,
                processed = resume_from,
                "resuming campaign"
            );
        }

        let recipients = campaign.recipients.clone();
        for (index, recipient) in recipients.iter().enumerate().skip(resume_from) {
            if index > resume_from {
                tokio::select! {
                    () = tokio::time::sleep(self.send_delay) => {}
                    () = cancel.cancelled() => return Ok(Outcome::Stopped),
                    () = ctx.shutting_down() => {
                        return Err(CourierError::Internal(
                            "campaign interrupted by shutdown".into(),
                        ));
                    }
                }
            }
            if cancel.is_cancelled() || !self.still_running(campaign.id).await? {
                return Ok(Outcome::Stopped);
            }

            match self.dispatch(campaign, recipient).await {
                Ok(job) => {
                    campaign.sent_count += 1;
                    debug!(campaign_id = campaign.id, job_id = job.id, "recipient enqueued");
                }
                Err(e) => {
                    campaign.failed_count += 1;
                    warn!(campaign_id = campaign.id, %recipient, error = %e, "recipient failed");
                }
            }
            self.store
                .record_campaign_progress(campaign.id, campaign.sent_count, campaign.failed_count)
                .await?;
            ctx.progress(progress_percent(campaign.processed(), total)).await;
        }
        Ok(Outcome::Finished)
    }

    async fn finish(&self, campaign: &Campaign) -> Result<(), CourierError> {
        let completed = self
            .store
            .transition_campaign(
                campaign.id,
                &[CampaignStatus::Running],
                CampaignStatus::Completed,
                self.engine.clock().now(),
            )
            .await?;
        if !completed {
            return Ok(());
        }
        info!(
            campaign_id = campaign.id,
            sent = campaign.sent_count,
            failed = campaign.failed_count,
            "campaign completed"
        );
        self.bus.publish(EventKind::BroadcastCompleted {
            campaign_id: campaign.id,
            name: campaign.name.clone(),
            total_recipients: campaign.total_recipients,
            sent_count: campaign.sent_count,
            failed_count: campaign.failed_count,
        });
        Ok(())
    }
}

#[async_trait]
impl JobHandler for CampaignHandler {
    async fn handle(
        &self,
        job: &Job,
        ctx: &JobContext,
    ) -> Result<Option<serde_json::Value>, CourierError> {
        let CampaignJob { campaign_id } = job.payload_as()?;
        let mut campaign = self
            .store
            .get_campaign(campaign_id)
            .await?
            .ok_or_else(|| CourierError::not_found("campaign", campaign_id))?;
        if campaign.status != CampaignStatus::Running {
            info!(campaign_id, status = %campaign.status, "campaign not running, skipped");
            return Ok(Some(serde_json::json!({
                "campaign_id": campaign_id,
                "status": campaign.status,
            })));
        }

        let cancel = self
            .cancels
            .entry(campaign_id)
            .or_insert_with(CancellationToken::new)
            .clone();
        let run = self.fan_out(&mut campaign, &cancel, ctx).await;
        self.cancels.remove(&campaign_id);

        let outcome = match run {
            Ok(outcome) => outcome,
            Err(e) => {
                if job.attempts_made >= job.max_attempts && !ctx.is_shutting_down() {
                    self.store
                        .transition_campaign(
                            campaign_id,
                            &[CampaignStatus::Running],
                            CampaignStatus::Failed,
                            self.engine.clock().now(),
                        )
                        .await?;
                    warn!(campaign_id, error = %e, "campaign failed");
                }
                return Err(e);
            }
        };

        if outcome == Outcome::Finished {
            self.finish(&campaign).await?;
        } else {
            info!(campaign_id, "campaign stopped before completion");
        }
        Ok(Some(serde_json::json!({
            "campaign_id": campaign_id,
            "sent_count": campaign.sent_count,
            "failed_count": campaign.failed_count,
            "finished": outcome == Outcome::Finished,
        })))
    }
}
