// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Handler for the `notification` queue: one signed POST per job.

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::header::{CONTENT_TYPE, USER_AGENT};
use tracing::{debug, error, warn};

use courier_core::traits::NotificationTargetStore;
use courier_core::types::{Job, NotificationJob, NotificationTarget};
use courier_core::{Clock, CourierError};
use courier_queue::{JobContext, JobHandler};

use crate::signature::{canonical_json, signature_header, SIGNATURE_HEADER};

/// POSTs notification payloads to their target.
///
/// A transport error, timeout or non-2xx response fails the attempt and
/// leaves the retry decision to the queue policy. Target counters change
/// only on success or on the final failed attempt.
pub struct NotificationHandler {
    client: reqwest::Client,
    store: Arc<dyn NotificationTargetStore>,
    user_agent: String,
    clock: Clock,
}

impl NotificationHandler {
    pub fn new(
        store: Arc<dyn NotificationTargetStore>,
        user_agent: impl Into<String>,
        clock: Clock,
    ) -> Result<Self, CourierError> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| CourierError::Delivery {
                message: format!("failed to build HTTP client: {e}"),
                status: None,
                source: Some(Box::new(e)),
            })?;
        Ok(Self {
            client,
            store,
            user_agent: user_agent.into(),
            clock,
        })
    }

    async fn deliver(
        &self,
        target: &NotificationTarget,
        body: String,
    ) -> Result<u16, CourierError> {
        let mut request = self
            .client
            .post(&target.endpoint_url)
            .timeout(target.timeout())
            .header(CONTENT_TYPE, "application/json")
            .header(USER_AGENT, &self.user_agent);
        if let Some(secret) = target.secret.as_deref().filter(|s| !s.is_empty()) {
            request = request.header(SIGNATURE_HEADER, signature_header(secret, body.as_bytes())?);
        }

        let response = request.body(body).send().await.map_err(|e| {
            if e.is_timeout() {
                CourierError::Timeout {
                    duration: target.timeout(),
                }
            } else {
                CourierError::Delivery {
                    message: format!("request to {} failed: {e}", target.endpoint_url),
                    status: None,
                    source: Some(Box::new(e)),
                }
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(CourierError::Delivery {
                message: format!("{} responded with {status}", target.endpoint_url),
                status: Some(status.as_u16()),
                source: None,
            });
        }
        Ok(status.as_u16())
    }
}

#[async_trait]
impl JobHandler for NotificationHandler {
    async fn handle(
        &self,
        job: &Job,
        _ctx: &JobContext,
    ) -> Result<Option<serde_json::Value>, CourierError> {
        let NotificationJob { target_id, payload } = job.payload_as()?;
        let target = self
            .store
            .get_target(target_id)
            .await?
            .ok_or_else(|| CourierError::not_found("notification target", target_id))?;

        let value = serde_json::to_value(&payload).map_err(CourierError::serialization)?;
        match self.deliver(&target, canonical_json(&value)).await {
            Ok(status) => {
                debug!(
                    job_id = job.id,
                    target_id,
                    event = %payload.event,
                    status,
                    "notification delivered"
                );
                // Delivered already; a retry would send it twice.
                if let Err(se) = self
                    .store
                    .record_delivery_success(target_id, self.clock.now())
                    .await
                {
                    error!(
                        job_id = job.id,
                        target_id,
                        error = %se,
                        "failed to record delivery success"
                    );
                }
                Ok(Some(serde_json::json!({ "status": status })))
            }
            Err(e) => {
                warn!(
                    job_id = job.id,
                    target_id,
                    attempt = job.attempts_made,
                    max_attempts = job.max_attempts,
                    error = %e,
                    "notification attempt failed"
                );
                if job.attempts_made >= job.max_attempts {
                    if let Err(se) = self
                        .store
                        .record_delivery_failure(target_id, &e.to_string(), self.clock.now())
                        .await
                    {
                        error!(
                            job_id = job.id,
                            target_id,
                            error = %se,
                            "failed to record delivery failure"
                        );
                    }
                }
                Err(e)
            }
        }
    }
}
