// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Links outbound messages to campaigns and counts their delivery receipts.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::{debug, warn};

use courier_bus::{BusEvent, EventBus, EventKind};
use courier_core::traits::CampaignStore;
use courier_core::CourierError;

/// Bus subscriber maintaining `delivered_count`.
pub struct DeliveryTracker {
    store: Arc<dyn CampaignStore>,
}

impl DeliveryTracker {
    pub fn new(store: Arc<dyn CampaignStore>) -> Self {
        Self { store }
    }

    /// Subscribes to `bus` and processes events until every bus handle is dropped.
    pub fn listen(self, bus: &EventBus) -> JoinHandle<()> {
        let mut events = bus.subscribe("delivery-tracker");
        tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                if let Err(e) = self.observe(&event).await {
                    warn!(event_id = %event.id, error = %e, "delivery tracking failed");
                }
            }
        })
    }

    async fn observe(&self, event: &BusEvent) -> Result<(), CourierError> {
        match &event.kind {
            EventKind::MessageSent {
                message_id,
                campaign_id: Some(campaign_id),
                ..
            } => {
                self.store
                    .link_campaign_message(message_id, *campaign_id)
                    .await
            }
            EventKind::MessageDelivered { message_id, .. } => {
                if let Some(campaign_id) = self.store.record_campaign_delivery(message_id).await? {
                    debug!(campaign_id, %message_id, "campaign delivery counted");
                }
                Ok(())
            }
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use courier_core::types::{CampaignStatus, MessageContent, NewCampaign};
    use courier_test_utils::MemoryStore;

    async fn wait_for_delivered(store: &MemoryStore, id: i64, expected: u32) {
        for _ in 0..200 {
            let campaign = store.get_campaign(id).await.unwrap().unwrap();
            if campaign.delivered_count == expected {
                return;
            }
            tokio::task::yield_now().await;
        }
        panic!("delivered_count never reached {expected}");
    }

    #[tokio::test]
    async fn receipts_count_once_per_linked_message() {
        let store = Arc::new(MemoryStore::new());
        let campaign = store
            .insert_campaign(
                NewCampaign {
                    name: "c".into(),
                    message: MessageContent::text("hi"),
                    recipients: vec!["628111222333".into(), "628111222334".into()],
                    scheduled_at: None,
                },
                CampaignStatus::Running,
                chrono::Utc::now(),
            )
            .await
            .unwrap();
        let bus = EventBus::new();
        let handle = DeliveryTracker::new(store.clone()).listen(&bus);

        bus.publish(EventKind::MessageSent {
            message_id: "M1".into(),
            to: "628111222333@s.whatsapp.net".into(),
            campaign_id: Some(campaign.id),
        });
        bus.publish(EventKind::MessageSent {
            message_id: "M2".into(),
            to: "628111222334@s.whatsapp.net".into(),
            campaign_id: None,
        });
        for id in ["M1", "M1", "M2", "unknown"] {
            bus.publish(EventKind::MessageDelivered {
                message_id: id.into(),
                to: "628111222333@s.whatsapp.net".into(),
            });
        }

        wait_for_delivered(&store, campaign.id, 1).await;
        for _ in 0..50 {
            tokio::task::yield_now().await;
        }
        let campaign = store.get_campaign(campaign.id).await.unwrap().unwrap();
        assert_eq!(campaign.delivered_count, 1);
        handle.abort();
    }
}
