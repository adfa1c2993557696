// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Turns outward bus events into notification jobs.

use std::sync::Arc;

use chrono::SecondsFormat;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use courier_bus::{BusEvent, EventBus};
use courier_core::traits::NotificationTargetStore;
use courier_core::types::{NotificationJob, NotificationPayload, QueueKind};
use courier_core::CourierError;
use courier_queue::{EnqueueOptions, JobEngine};

/// Bus subscriber enqueueing one notification job per subscribed target.
pub struct WebhookFanout {
    store: Arc<dyn NotificationTargetStore>,
    engine: JobEngine,
}

impl WebhookFanout {
    pub fn new(store: Arc<dyn NotificationTargetStore>, engine: JobEngine) -> Self {
        Self { store, engine }
    }

    /// Subscribes to `bus` and fans out events until every bus handle is dropped.
    pub fn listen(self, bus: &EventBus) -> JoinHandle<()> {
        let mut events = bus.subscribe("webhook-fanout");
        tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                if let Err(e) = self.fan_out(&event).await {
                    warn!(event_id = %event.id, error = %e, "notification fan-out failed");
                }
            }
        })
    }

    /// Enqueues `event` for every active target subscribed to it.
    ///
    /// Internal events are skipped. Returns the number of jobs enqueued.
    pub async fn fan_out(&self, event: &BusEvent) -> Result<usize, CourierError> {
        let Some(name) = event.kind.name() else {
            return Ok(0);
        };
        let payload = NotificationPayload {
            event: name.to_string(),
            timestamp: event.timestamp.to_rfc3339_opts(SecondsFormat::Millis, true),
            data: event.kind.data(),
        };

        let mut enqueued = 0;
        for target in self.store.list_targets(true).await? {
            if !target.subscribes_to(name) {
                continue;
            }
            let job = NotificationJob {
                target_id: target.id,
                payload: payload.clone(),
            };
            self.engine
                .enqueue(
                    QueueKind::Notification,
                    &job,
                    EnqueueOptions::default().max_attempts(target.retry_attempts.max(1)),
                )
                .await?;
            enqueued += 1;
        }
        if enqueued > 0 {
            debug!(event = name, targets = enqueued, "notification jobs enqueued");
        }
        Ok(enqueued)
    }
}
