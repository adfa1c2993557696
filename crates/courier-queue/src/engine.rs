// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Job dispatch engine.
//!
//! Three independent queues share one [`JobStore`]. Each started queue runs
//! `concurrency` worker tasks that claim the next eligible job, hand it to the
//! queue's [`JobHandler`], and resolve it as completed, delayed for a retry
//! with exponential backoff, or failed. Idle workers wake on enqueue, when the
//! earliest delayed job becomes due, or after the poll interval, whichever
//! comes first.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::TimeDelta;
use serde::Serialize;
use tokio::sync::{Mutex, Notify, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use courier_config::model::QueueConfig;
use courier_core::traits::JobStore;
use courier_core::types::{Job, JobState, NewJob, QueueKind, QueueStats, RemoveOutcome};
use courier_core::{Clock, CourierError};

use crate::handler::{JobContext, JobHandler};
use crate::policy::{QueuePolicies, QueuePolicy};

/// Per-call overrides for [`JobEngine::enqueue`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EnqueueOptions {
    pub priority: Option<i32>,
    /// Earliest claim is `now + delay`. A non-zero delay enqueues as `delayed`.
    pub delay: Option<Duration>,
    pub max_attempts: Option<u32>,
}

impl EnqueueOptions {
    pub fn priority(mut self, priority: i32) -> Self {
        self.priority = Some(priority);
        self
    }

    pub fn delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = Some(attempts);
        self
    }
}

/// Stats of every queue, keyed by queue name when serialized.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct AllQueueStats {
    pub direct: QueueStats,
    pub campaign: QueueStats,
    pub notification: QueueStats,
}

struct QueueRuntime {
    policy: QueuePolicy,
    wake: Notify,
    paused: watch::Sender<bool>,
}

impl QueueRuntime {
    fn new(policy: QueuePolicy) -> Self {
        let (paused, _) = watch::channel(false);
        Self {
            policy,
            wake: Notify::new(),
            paused,
        }
    }
}

#[derive(Default)]
struct Workers {
    started: HashSet<QueueKind>,
    handles: Vec<JoinHandle<()>>,
}

struct Inner {
    store: Arc<dyn JobStore>,
    clock: Clock,
    poll_interval: Duration,
    direct: QueueRuntime,
    campaign: QueueRuntime,
    notification: QueueRuntime,
    shutdown: CancellationToken,
    workers: Mutex<Workers>,
}

impl Inner {
    fn runtime(&self, queue: QueueKind) -> &QueueRuntime {
        match queue {
            QueueKind::Direct => &self.direct,
            QueueKind::Campaign => &self.campaign,
            QueueKind::Notification => &self.notification,
        }
    }
}

/// Handle to the dispatch engine. Cheap to clone.
#[derive(Clone)]
pub struct JobEngine {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for JobEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobEngine")
            .field("poll_interval", &self.inner.poll_interval)
            .finish_non_exhaustive()
    }
}

impl JobEngine {
    pub fn new(config: &QueueConfig, store: Arc<dyn JobStore>, clock: Clock) -> Self {
        Self::with_policies(
            QueuePolicies::from_config(config),
            config.poll_interval(),
            store,
            clock,
        )
    }

    pub fn with_policies(
        policies: QueuePolicies,
        poll_interval: Duration,
        store: Arc<dyn JobStore>,
        clock: Clock,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                store,
                clock,
                poll_interval,
                direct: QueueRuntime::new(policies.direct),
                campaign: QueueRuntime::new(policies.campaign),
                notification: QueueRuntime::new(policies.notification),
                shutdown: CancellationToken::new(),
                workers: Mutex::new(Workers::default()),
            }),
        }
    }

    pub fn policy(&self, queue: QueueKind) -> &QueuePolicy {
        &self.inner.runtime(queue).policy
    }

    pub fn clock(&self) -> Clock {
        self.inner.clock
    }

    /// Token cancelled when the engine shuts down.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.inner.shutdown.clone()
    }

    /// Recovers stalled jobs of `queue` and spawns its workers.
    ///
    /// Jobs left `active` by a previous process go back to `waiting`, or to
    /// `failed` if they already used every attempt.
    pub async fn start(
        &self,
        queue: QueueKind,
        handler: Arc<dyn JobHandler>,
    ) -> Result<(), CourierError> {
        let mut workers = self.inner.workers.lock().await;
        if self.inner.shutdown.is_cancelled() {
            return Err(CourierError::InvalidState("job engine is shut down".into()));
        }
        if !workers.started.insert(queue) {
            return Err(CourierError::InvalidState(format!(
                "queue {queue} is already started"
            )));
        }

        let recovered = self
            .inner
            .store
            .recover_stalled(queue, self.inner.clock.now())
            .await?;
        if recovered > 0 {
            warn!(%queue, recovered, "recovered stalled jobs");
        }

        let concurrency = self.inner.runtime(queue).policy.concurrency;
        for worker in 0..concurrency {
            let inner = Arc::clone(&self.inner);
            let handler = Arc::clone(&handler);
            workers.handles.push(tokio::spawn(async move {
                run_worker(inner, queue, worker, handler).await;
            }));
        }
        info!(%queue, concurrency, "queue workers started");
        Ok(())
    }

    /// Persists a job and returns it without waiting for execution.
    pub async fn enqueue<T: Serialize + ?Sized>(
        &self,
        queue: QueueKind,
        payload: &T,
        options: EnqueueOptions,
    ) -> Result<Job, CourierError> {
        let payload = serde_json::to_value(payload).map_err(|e| {
            CourierError::Validation(format!("job payload is not serializable: {e}"))
        })?;
        let policy = &self.inner.runtime(queue).policy;
        let now = self.inner.clock.now();
        let available_at = match options.delay {
            Some(delay) if !delay.is_zero() => self.inner.clock.after(delay),
            _ => now,
        };
        let job = self
            .inner
            .store
            .insert_job(NewJob {
                queue,
                payload,
                priority: options.priority.unwrap_or(policy.default_priority),
                max_attempts: options.max_attempts.unwrap_or(policy.max_attempts).max(1),
                created_at: now,
                available_at,
            })
            .await?;
        debug!(
            job_id = job.id,
            %queue,
            priority = job.priority,
            state = %job.state,
            "job enqueued"
        );
        self.inner.runtime(queue).wake.notify_waiters();
        Ok(job)
    }

    pub async fn stats(&self, queue: QueueKind) -> Result<QueueStats, CourierError> {
        self.inner.store.queue_stats(queue).await
    }

    pub async fn all_stats(&self) -> Result<AllQueueStats, CourierError> {
        Ok(AllQueueStats {
            direct: self.stats(QueueKind::Direct).await?,
            campaign: self.stats(QueueKind::Campaign).await?,
            notification: self.stats(QueueKind::Notification).await?,
        })
    }

    /// Stops claiming new jobs from `queue`. Active jobs run to completion.
    pub fn pause(&self, queue: QueueKind) {
        if !self.inner.runtime(queue).paused.send_replace(true) {
            info!(%queue, "queue paused");
        }
    }

    pub fn resume(&self, queue: QueueKind) {
        if self.inner.runtime(queue).paused.send_replace(false) {
            info!(%queue, "queue resumed");
        }
    }

    pub fn is_paused(&self, queue: QueueKind) -> bool {
        *self.inner.runtime(queue).paused.borrow()
    }

    /// Lists jobs of `queue` newest first.
    pub async fn jobs(
        &self,
        queue: QueueKind,
        state: Option<JobState>,
        offset: u64,
        limit: u64,
    ) -> Result<Vec<Job>, CourierError> {
        self.inner.store.list_jobs(queue, state, offset, limit).await
    }

    pub async fn get_job(&self, id: i64) -> Result<Option<Job>, CourierError> {
        self.inner.store.get_job(id).await
    }

    /// Deletes a job that no worker currently holds.
    pub async fn remove_job(&self, queue: QueueKind, id: i64) -> Result<(), CourierError> {
        match self.inner.store.remove_job(queue, id).await? {
            RemoveOutcome::Removed => {
                info!(job_id = id, %queue, "job removed");
                Ok(())
            }
            RemoveOutcome::NotFound => Err(CourierError::not_found("job", id)),
            RemoveOutcome::Active => Err(CourierError::JobActive { id }),
        }
    }

    /// Deletes `state` jobs of `queue` that finished more than `grace` ago.
    pub async fn clean(
        &self,
        queue: QueueKind,
        state: JobState,
        grace: Duration,
    ) -> Result<u64, CourierError> {
        if state == JobState::Active {
            return Err(CourierError::InvalidState(
                "active jobs cannot be cleaned".into(),
            ));
        }
        let grace = TimeDelta::from_std(grace).unwrap_or(TimeDelta::MAX);
        let cutoff = self
            .inner
            .clock
            .now()
            .checked_sub_signed(grace)
            .unwrap_or(chrono::DateTime::<chrono::Utc>::MIN_UTC);
        let removed = self.inner.store.clean_jobs(queue, state, cutoff).await?;
        info!(%queue, %state, removed, "queue cleaned");
        Ok(removed)
    }

    /// Stops every worker and waits for in-flight jobs to settle.
    pub async fn shutdown(&self) {
        self.inner.shutdown.cancel();
        let handles = std::mem::take(&mut self.inner.workers.lock().await.handles);
        let count = handles.len();
        for handle in handles {
            if let Err(e) = handle.await {
                error!(error = %e, "queue worker terminated abnormally");
            }
        }
        info!(workers = count, "job engine stopped");
    }
}

async fn run_worker(
    inner: Arc<Inner>,
    queue: QueueKind,
    worker: usize,
    handler: Arc<dyn JobHandler>,
) {
    let runtime = inner.runtime(queue);
    let mut paused = runtime.paused.subscribe();
    debug!(%queue, worker, "worker started");

    loop {
        if inner.shutdown.is_cancelled() {
            break;
        }
        if *paused.borrow_and_update() {
            tokio::select! {
                _ = inner.shutdown.cancelled() => break,
                changed = paused.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
            continue;
        }

        // Registered before the claim so an enqueue in between is not missed.
        let wake = runtime.wake.notified();
        tokio::pin!(wake);
        wake.as_mut().enable();

        match inner.store.claim_next(queue, inner.clock.now()).await {
            Ok(Some(job)) => execute(&inner, queue, job, &handler).await,
            Ok(None) => {
                let idle = idle_wait(&inner, queue).await;
                tokio::select! {
                    _ = inner.shutdown.cancelled() => break,
                    _ = &mut wake => {}
                    _ = tokio::time::sleep(idle) => {}
                    _ = paused.changed() => {}
                }
            }
            Err(e) => {
                error!(%queue, worker, error = %e, "failed to claim job");
                tokio::select! {
                    _ = inner.shutdown.cancelled() => break,
                    _ = tokio::time::sleep(inner.poll_interval) => {}
                }
            }
        }
    }
    debug!(%queue, worker, "worker stopped");
}

/// How long an idle worker may sleep: until the earliest delayed job is due,
/// capped at the poll interval.
async fn idle_wait(inner: &Inner, queue: QueueKind) -> Duration {
    match inner.store.next_available_at(queue).await {
        Ok(Some(at)) => inner.clock.until(at).min(inner.poll_interval),
        Ok(None) => inner.poll_interval,
        Err(e) => {
            warn!(%queue, error = %e, "failed to read next scheduled job");
            inner.poll_interval
        }
    }
}

async fn execute(inner: &Inner, queue: QueueKind, job: Job, handler: &Arc<dyn JobHandler>) {
    let policy = &inner.runtime(queue).policy;
    let id = job.id;
    let attempt = job.attempts_made;
    debug!(job_id = id, %queue, attempt, max_attempts = job.max_attempts, "job started");

    let ctx = JobContext::new(id, Arc::clone(&inner.store), inner.shutdown.clone());
    let task = {
        let handler = Arc::clone(handler);
        let job = job.clone();
        tokio::spawn(async move { handler.handle(&job, &ctx).await })
    };
    let outcome = match task.await {
        Ok(outcome) => outcome,
        Err(e) => Err(CourierError::Internal(format!("job handler panicked: {e}"))),
    };

    let now = inner.clock.now();
    let resolved = match outcome {
        Ok(result) => {
            info!(job_id = id, %queue, attempt, "job completed");
            inner
                .store
                .complete_job(id, result, now)
                .await
                .and(Ok(Some((JobState::Completed, policy.retain_completed))))
        }
        Err(e) if inner.shutdown.is_cancelled() => {
            info!(job_id = id, %queue, error = %e, "job interrupted by shutdown, released");
            inner.store.release_job(id).await.map(|()| None)
        }
        Err(e) if job.attempts_made < job.max_attempts => {
            let delay = policy.backoff(job.attempts_made);
            warn!(
                job_id = id,
                %queue,
                attempt,
                max_attempts = job.max_attempts,
                delay_ms = delay.as_millis() as u64,
                error = %e,
                "job failed, retry scheduled"
            );
            inner
                .store
                .retry_job(id, &e.to_string(), inner.clock.after(delay))
                .await
                .map(|()| None)
        }
        Err(e) => {
            error!(
                job_id = id,
                %queue,
                attempt,
                max_attempts = job.max_attempts,
                error = %e,
                "job failed permanently"
            );
            inner
                .store
                .fail_job(id, &e.to_string(), now)
                .await
                .and(Ok(Some((JobState::Failed, policy.retain_failed))))
        }
    };

    match resolved {
        Ok(Some((state, keep))) => match inner.store.prune_jobs(queue, state, keep).await {
            Ok(0) => {}
            Ok(pruned) => debug!(%queue, %state, pruned, "retention applied"),
            Err(e) => warn!(%queue, %state, error = %e, "failed to apply retention"),
        },
        Ok(None) => {}
        Err(e) => error!(job_id = id, %queue, error = %e, "failed to record job outcome"),
    }
}
