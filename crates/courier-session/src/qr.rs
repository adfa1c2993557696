// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Credential challenge controller.
//!
//! Turns raw pairing challenges into time-boxed, renderable artifacts. At most
//! one artifact is pending at a time: a new challenge expires the previous
//! one, an opened session marks it scanned, and an expiry timer marks it
//! expired. Every artifact is also recorded in the persisted history.

use std::sync::{Arc, Weak};
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use serde::Serialize;
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use courier_bus::{CloseCause, EventBus, EventKind};
use courier_config::model::SessionConfig;
use courier_core::traits::ArtifactHistoryStore;
use courier_core::types::{ArtifactRecord, ArtifactStats, ArtifactStatus};
use courier_core::{Clock, CourierError};

use crate::manager::ConnectionManager;
use crate::render;

/// A rendered credential challenge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CredentialArtifact {
    pub raw_challenge: String,
    /// SVG rendering as a `data:` URL.
    pub data_url: String,
    /// Half-block rendering for terminals.
    pub terminal: String,
    pub status: ArtifactStatus,
    pub generated_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// External view of the pending artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArtifactView {
    pub artifact: String,
    pub generated_at: DateTime<Utc>,
    pub expires_in_ms: u64,
}

struct Pending {
    artifact: CredentialArtifact,
    record_id: Option<i64>,
    /// Distinguishes successive artifacts for the expiry timer.
    serial: u64,
    timer: JoinHandle<()>,
}

struct Inner {
    config: SessionConfig,
    history: Arc<dyn ArtifactHistoryStore>,
    bus: EventBus,
    clock: Clock,
    pending: Mutex<Option<Pending>>,
    /// Bumped on every new artifact; `refresh` waits on it.
    generated: watch::Sender<u64>,
}

/// Controller for scannable credential artifacts.
#[derive(Clone)]
pub struct QrController {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for QrController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QrController").finish_non_exhaustive()
    }
}

impl QrController {
    pub fn new(
        config: SessionConfig,
        history: Arc<dyn ArtifactHistoryStore>,
        bus: EventBus,
        clock: Clock,
    ) -> Self {
        let (generated, _) = watch::channel(0);
        Self {
            inner: Arc::new(Inner {
                config,
                history,
                bus,
                clock,
                pending: Mutex::new(None),
                generated,
            }),
        }
    }

    /// Subscribes to the bus and drives the controller from session events.
    ///
    /// The subscription is taken before this returns, so no event published
    /// afterwards is missed.
    pub fn listen(&self, bus: &EventBus) -> JoinHandle<()> {
        let mut events = bus.subscribe("qr-controller");
        let controller = self.clone();
        tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                match event.kind {
                    EventKind::CredentialChallenge { raw } => {
                        if let Err(e) = controller.on_challenge(&raw).await {
                            warn!(error = %e, "failed to handle credential challenge");
                        }
                    }
                    EventKind::ConnectionOpen { .. } => controller.on_opened().await,
                    EventKind::ConnectionClose {
                        reason: CloseCause::LoggedOut,
                    } => controller.discard().await,
                    _ => {}
                }
            }
            debug!("qr controller stopped");
        })
    }

    /// Renders and registers a new challenge, superseding any pending one.
    pub async fn on_challenge(&self, raw: &str) -> Result<CredentialArtifact, CourierError> {
        let data_url = render::svg_data_url(raw)?;
        let terminal = render::terminal(raw)?;
        let timeout = self.inner.config.qr_timeout();
        let generated_at = self.inner.clock.now();
        let expires_at = generated_at
            + TimeDelta::from_std(timeout).unwrap_or(TimeDelta::zero());

        let mut pending = self.inner.pending.lock().await;
        if let Some(previous) = pending.take() {
            previous.timer.abort();
            self.inner
                .finish(previous.record_id, ArtifactStatus::Expired, generated_at)
                .await;
            debug!("previous credential artifact superseded");
        }

        let record_id = match self.inner.history.insert_artifact(generated_at, expires_at).await {
            Ok(record) => Some(record.id),
            Err(e) => {
                warn!(error = %e, "failed to record credential artifact history");
                None
            }
        };

        let serial = *self.inner.generated.borrow() + 1;
        let artifact = CredentialArtifact {
            raw_challenge: raw.to_string(),
            data_url,
            terminal,
            status: ArtifactStatus::Pending,
            generated_at,
            expires_at,
        };
        *pending = Some(Pending {
            artifact: artifact.clone(),
            record_id,
            serial,
            timer: spawn_expiry(Arc::downgrade(&self.inner), serial, timeout),
        });
        drop(pending);
        self.inner.generated.send_replace(serial);

        if self.inner.config.print_qr_in_terminal {
            info!("scan this code to pair the session:\n{}", artifact.terminal);
        }
        info!(expires_at = %expires_at, "credential artifact generated");
        self.inner.bus.publish(EventKind::QrGenerated {
            artifact: artifact.data_url.clone(),
            generated_at,
            expires_at,
        });
        Ok(artifact)
    }

    /// The session opened: the pending artifact, if any, was scanned.
    pub async fn on_opened(&self) {
        let taken = self.inner.pending.lock().await.take();
        if let Some(pending) = taken {
            pending.timer.abort();
            let now = self.inner.clock.now();
            self.inner
                .finish(pending.record_id, ArtifactStatus::Scanned, now)
                .await;
            info!("credential artifact scanned");
        }
    }

    /// Drops the pending artifact as expired.
    pub async fn discard(&self) {
        let taken = self.inner.pending.lock().await.take();
        if let Some(pending) = taken {
            pending.timer.abort();
            let now = self.inner.clock.now();
            self.inner
                .finish(pending.record_id, ArtifactStatus::Expired, now)
                .await;
        }
    }

    /// The pending artifact, unless it already passed its expiry instant.
    pub async fn current(&self) -> Option<ArtifactView> {
        let pending = self.inner.pending.lock().await;
        let artifact = &pending.as_ref()?.artifact;
        let now = self.inner.clock.now();
        if now > artifact.expires_at {
            return None;
        }
        Some(ArtifactView {
            artifact: artifact.data_url.clone(),
            generated_at: artifact.generated_at,
            expires_in_ms: (artifact.expires_at - now).num_milliseconds().max(0) as u64,
        })
    }

    /// Full pending artifact, including the terminal rendering.
    pub async fn current_artifact(&self) -> Option<CredentialArtifact> {
        let pending = self.inner.pending.lock().await;
        pending
            .as_ref()
            .map(|p| p.artifact.clone())
            .filter(|a| self.inner.clock.now() <= a.expires_at)
    }

    /// Restarts the session and waits for the next artifact.
    ///
    /// Fails with [`CourierError::Timeout`] if none arrives within the
    /// configured refresh timeout (for example because the stored credentials
    /// were still valid and the session simply reopened).
    pub async fn refresh(&self, manager: &ConnectionManager) -> Result<ArtifactView, CourierError> {
        let mut generated = self.inner.generated.subscribe();
        generated.mark_unchanged();
        manager.restart().await?;

        let wait = self.inner.config.qr_refresh_timeout();
        loop {
            match tokio::time::timeout(wait, generated.changed()).await {
                Ok(Ok(())) => {
                    if let Some(view) = self.current().await {
                        return Ok(view);
                    }
                }
                Ok(Err(_)) => {
                    return Err(CourierError::Internal("qr controller dropped".into()));
                }
                Err(_) => return Err(CourierError::Timeout { duration: wait }),
            }
        }
    }

    pub async fn history(&self, limit: u64) -> Result<Vec<ArtifactRecord>, CourierError> {
        self.inner.history.list_artifacts(limit).await
    }

    pub async fn stats(&self) -> Result<ArtifactStats, CourierError> {
        self.inner.history.artifact_stats().await
    }

    /// Deletes history generated more than `older_than` ago.
    pub async fn cleanup(&self, older_than: Duration) -> Result<u64, CourierError> {
        let cutoff = self.inner.clock.now()
            - TimeDelta::from_std(older_than).unwrap_or(TimeDelta::zero());
        let removed = self.inner.history.delete_artifacts_before(cutoff).await?;
        if removed > 0 {
            info!(removed, "credential artifact history cleaned");
        }
        Ok(removed)
    }

    /// Applies the configured history retention.
    pub async fn cleanup_expired_history(&self) -> Result<u64, CourierError> {
        let days = u64::from(self.inner.config.qr_history_retention_days);
        self.cleanup(Duration::from_secs(days * 24 * 60 * 60)).await
    }
}

impl Inner {
    async fn finish(&self, record_id: Option<i64>, status: ArtifactStatus, at: DateTime<Utc>) {
        let Some(id) = record_id else {
            return;
        };
        if let Err(e) = self.history.set_artifact_status(id, status, at).await {
            warn!(error = %e, artifact_id = id, %status, "failed to update artifact history");
        }
    }

    async fn expire(&self, serial: u64) {
        let mut pending = self.pending.lock().await;
        if pending.as_ref().is_none_or(|p| p.serial != serial) {
            return;
        }
        if let Some(expired) = pending.take() {
            drop(pending);
            let now = self.clock.now();
            self.finish(expired.record_id, ArtifactStatus::Expired, now)
                .await;
            info!("credential artifact expired");
        }
    }
}

fn spawn_expiry(inner: Weak<Inner>, serial: u64, after: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        tokio::time::sleep(after).await;
        if let Some(inner) = inner.upgrade() {
            inner.expire(serial).await;
        }
    })
}
