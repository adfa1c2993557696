// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Job handler trait and the per-execution context handed to it.

use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use courier_core::traits::JobStore;
use courier_core::types::Job;
use courier_core::CourierError;

/// Executes the jobs of one queue.
///
/// Returning `Err` is an ordinary failure fed into the queue's retry policy.
/// The optional value is stored as the job result.
#[async_trait]
pub trait JobHandler: Send + Sync {
    async fn handle(
        &self,
        job: &Job,
        ctx: &JobContext,
    ) -> Result<Option<serde_json::Value>, CourierError>;
}

/// Handle given to a handler for one job execution.
#[derive(Clone)]
pub struct JobContext {
    job_id: i64,
    store: Arc<dyn JobStore>,
    shutdown: CancellationToken,
}

impl std::fmt::Debug for JobContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobContext")
            .field("job_id", &self.job_id)
            .finish_non_exhaustive()
    }
}

impl JobContext {
    pub fn new(job_id: i64, store: Arc<dyn JobStore>, shutdown: CancellationToken) -> Self {
        Self {
            job_id,
            store,
            shutdown,
        }
    }

    pub fn job_id(&self) -> i64 {
        self.job_id
    }

    /// Records fractional progress (0..=100). Failures are logged, not raised.
    pub async fn progress(&self, percent: u8) {
        if let Err(e) = self.store.update_progress(self.job_id, percent.min(100)).await {
            warn!(job_id = self.job_id, error = %e, "failed to record job progress");
        }
    }

    /// Whether the engine is shutting down. Long handlers should stop early.
    pub fn is_shutting_down(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    /// Resolves once the engine starts shutting down.
    pub async fn shutting_down(&self) {
        self.shutdown.cancelled().await;
    }
}
