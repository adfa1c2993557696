// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Handler for the `direct` queue: one message to one recipient.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use courier_bus::{EventBus, EventKind};
use courier_core::address::resolve_recipient;
use courier_core::traits::MessageSender;
use courier_core::types::{DirectMessageJob, Job};
use courier_core::CourierError;

use crate::handler::{JobContext, JobHandler};

/// Sends direct-message jobs through the session.
///
/// A closed session surfaces as `NotConnected`, which the engine retries like
/// any other failure. Every successful send publishes `message.sent`.
pub struct DirectMessageHandler {
    sender: Arc<dyn MessageSender>,
    bus: EventBus,
}

impl DirectMessageHandler {
    pub fn new(sender: Arc<dyn MessageSender>, bus: EventBus) -> Self {
        Self { sender, bus }
    }
}

#[async_trait]
impl JobHandler for DirectMessageHandler {
    async fn handle(
        &self,
        job: &Job,
        _ctx: &JobContext,
    ) -> Result<Option<serde_json::Value>, CourierError> {
        let body: DirectMessageJob = job.payload_as()?;
        let to = resolve_recipient(&body.to)?;
        let sent = self.sender.send(&body.to, &body.content).await?;
        debug!(
            job_id = job.id,
            message_id = %sent.message_id,
            campaign_id = ?body.campaign_id,
            "direct message delivered to session"
        );

        self.bus.publish(EventKind::MessageSent {
            message_id: sent.message_id.0.clone(),
            to: to.clone(),
            campaign_id: body.campaign_id,
        });
        Ok(Some(serde_json::json!({
            "message_id": sent.message_id.0,
            "to": to,
            "timestamp": sent.timestamp,
        })))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use courier_bus::names;
    use courier_core::types::{MessageContent, QueueKind};
    use courier_test_utils::{FakeSender, MemoryStore};
    use tokio_util::sync::CancellationToken;

    fn job(payload: serde_json::Value) -> Job {
        let now = chrono::Utc::now();
        Job {
            id: 1,
            queue: QueueKind::Direct,
            payload,
            priority: 5,
            attempts_made: 1,
            max_attempts: 3,
            state: courier_core::JobState::Active,
            progress: 0,
            created_at: now,
            available_at: now,
            processed_at: Some(now),
            finished_at: None,
            failure_reason: None,
            result: None,
        }
    }

    fn ctx() -> JobContext {
        JobContext::new(1, Arc::new(MemoryStore::new()), CancellationToken::new())
    }

    fn payload(to: &str, campaign_id: Option<i64>) -> serde_json::Value {
        serde_json::to_value(DirectMessageJob {
            to: to.into(),
            content: MessageContent::text("hello"),
            campaign_id,
        })
        .unwrap()
    }

    #[tokio::test]
    async fn sends_and_publishes() {
        let sender = Arc::new(FakeSender::connected());
        let bus = EventBus::new();
        let mut sub = bus.subscribe("test");
        let handler = DirectMessageHandler::new(sender.clone(), bus);

        let result = handler
            .handle(&job(payload("+62 811-1222-333", Some(9))), &ctx())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(result["to"], "628111222333@s.whatsapp.net");
        assert_eq!(sender.sent().await.len(), 1);

        let event = sub.try_recv().unwrap();
        assert_eq!(event.kind.name(), Some(names::MESSAGE_SENT));
        assert!(matches!(
            event.kind,
            EventKind::MessageSent { campaign_id: Some(9), .. }
        ));
    }

    #[tokio::test]
    async fn disconnected_session_is_a_failure() {
        let sender = Arc::new(FakeSender::disconnected());
        let handler = DirectMessageHandler::new(sender, EventBus::new());
        let err = handler
            .handle(&job(payload("628111222333", None)), &ctx())
            .await
            .unwrap_err();
        assert!(matches!(err, CourierError::NotConnected));
    }

    #[tokio::test]
    async fn invalid_recipient_is_rejected_before_sending() {
        let sender = Arc::new(FakeSender::connected());
        let handler = DirectMessageHandler::new(sender.clone(), EventBus::new());
        let err = handler
            .handle(&job(payload("12", None)), &ctx())
            .await
            .unwrap_err();
        assert!(matches!(err, CourierError::Validation(_)));
        assert_eq!(sender.attempts().await, 0);
    }
}
