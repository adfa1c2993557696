// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Composition root.
//!
//! [`Gateway`] builds every component from one configuration and one store,
//! wires them to a shared event bus and owns their background tasks.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use courier_broadcast::{BroadcastCoordinator, DeliveryTracker};
use courier_bus::{EventBus, EventKind};
use courier_config::model::CourierConfig;
use courier_core::address::resolve_recipient;
use courier_core::traits::{
    ArtifactHistoryStore, CampaignStore, CredentialStore, JobStore, NotificationTargetStore,
    SessionConnector,
};
use courier_core::types::{DirectMessageJob, Job, MessageContent, QueueKind, SentMessage};
use courier_core::{Clock, CourierError};
use courier_queue::{DirectMessageHandler, EnqueueOptions, JobEngine};
use courier_session::{ConnectionManager, QrController};
use courier_webhook::{NotificationHandler, TargetRegistry, WebhookFanout};

/// How often expired credential-artifact history is pruned.
const HISTORY_SWEEP_INTERVAL: Duration = Duration::from_secs(60 * 60);

/// Every store the gateway needs, implemented by one backend.
pub trait GatewayStore:
    JobStore + CampaignStore + NotificationTargetStore + ArtifactHistoryStore + 'static
{
}

impl<T> GatewayStore for T where
    T: JobStore + CampaignStore + NotificationTargetStore + ArtifactHistoryStore + 'static
{
}

/// The assembled messaging gateway.
pub struct Gateway {
    config: CourierConfig,
    clock: Clock,
    bus: EventBus,
    session: ConnectionManager,
    qr: QrController,
    engine: JobEngine,
    broadcasts: BroadcastCoordinator,
    targets: TargetRegistry,
    campaign_store: Arc<dyn CampaignStore>,
    target_store: Arc<dyn NotificationTargetStore>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    stop: CancellationToken,
}

impl std::fmt::Debug for Gateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Gateway")
            .field("name", &self.config.app.name)
            .field("session", &self.session)
            .finish_non_exhaustive()
    }
}

impl Gateway {
    pub fn new<S: GatewayStore>(
        config: CourierConfig,
        store: Arc<S>,
        connector: Arc<dyn SessionConnector>,
        credentials: Arc<dyn CredentialStore>,
    ) -> Self {
        let clock = Clock::new();
        let bus = EventBus::new();
        let session = ConnectionManager::new(
            config.session.clone(),
            connector,
            credentials,
            bus.clone(),
        );
        let qr = QrController::new(config.session.clone(), store.clone(), bus.clone(), clock);
        let engine = JobEngine::new(&config.queue, store.clone(), clock);
        let broadcasts = BroadcastCoordinator::new(
            config.broadcast.clone(),
            store.clone(),
            engine.clone(),
            bus.clone(),
        );
        let targets = TargetRegistry::new(config.webhook.clone(), store.clone(), engine.clone());

        Self {
            config,
            clock,
            bus,
            session,
            qr,
            engine,
            broadcasts,
            targets,
            campaign_store: store.clone(),
            target_store: store,
            tasks: Mutex::new(Vec::new()),
            stop: CancellationToken::new(),
        }
    }

    /// Starts subscribers, queue workers and the session, in that order.
    ///
    /// Subscribers come first so no event published during startup is lost.
    pub async fn start(&self) -> Result<(), CourierError> {
        let notifications = NotificationHandler::new(
            Arc::clone(&self.target_store),
            self.config.webhook.user_agent.clone(),
            self.clock,
        )?;

        {
            let mut tasks = self.tasks.lock().await;
            tasks.push(self.qr.listen(&self.bus));
            tasks.push(DeliveryTracker::new(Arc::clone(&self.campaign_store)).listen(&self.bus));
            tasks.push(
                WebhookFanout::new(Arc::clone(&self.target_store), self.engine.clone())
                    .listen(&self.bus),
            );
            tasks.push(self.spawn_history_sweep());
        }

        self.engine
            .start(
                QueueKind::Direct,
                Arc::new(DirectMessageHandler::new(
                    Arc::new(self.session.clone()),
                    self.bus.clone(),
                )),
            )
            .await?;
        self.engine
            .start(QueueKind::Campaign, Arc::new(self.broadcasts.handler()))
            .await?;
        self.engine
            .start(QueueKind::Notification, Arc::new(notifications))
            .await?;

        let outcome = self.session.initialize().await?;
        info!(name = %self.config.app.name, ?outcome, "gateway started");
        Ok(())
    }

    fn spawn_history_sweep(&self) -> JoinHandle<()> {
        let qr = self.qr.clone();
        let stop = self.stop.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(HISTORY_SWEEP_INTERVAL);
            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        match qr.cleanup_expired_history().await {
                            Ok(0) => {}
                            Ok(removed) => debug!(removed, "expired artifact history pruned"),
                            Err(e) => warn!(error = %e, "artifact history sweep failed"),
                        }
                    }
                    () = stop.cancelled() => break,
                }
            }
        })
    }

    pub fn config(&self) -> &CourierConfig {
        &self.config
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    pub fn session(&self) -> &ConnectionManager {
        &self.session
    }

    pub fn qr(&self) -> &QrController {
        &self.qr
    }

    pub fn engine(&self) -> &JobEngine {
        &self.engine
    }

    pub fn broadcasts(&self) -> &BroadcastCoordinator {
        &self.broadcasts
    }

    pub fn targets(&self) -> &TargetRegistry {
        &self.targets
    }

    /// Sends immediately through the session, bypassing the queue.
    ///
    /// Returns the session's error unchanged, including `NotConnected`.
    pub async fn send_direct(
        &self,
        to: &str,
        content: &MessageContent,
    ) -> Result<SentMessage, CourierError> {
        let jid = resolve_recipient(to)?;
        let sent = self.session.send(&jid, content).await?;
        self.bus.publish(EventKind::MessageSent {
            message_id: sent.message_id.0.clone(),
            to: jid,
            campaign_id: None,
        });
        Ok(sent)
    }

    /// Validates and enqueues a direct message.
    pub async fn enqueue_direct(
        &self,
        to: &str,
        content: MessageContent,
        options: EnqueueOptions,
    ) -> Result<Job, CourierError> {
        content.validate()?;
        let to = resolve_recipient(to)?;
        self.engine
            .enqueue(
                QueueKind::Direct,
                &DirectMessageJob {
                    to,
                    content,
                    campaign_id: None,
                },
                options,
            )
            .await
    }

    /// Drains the queues, then closes the session and stops subscribers.
    ///
    /// Credentials are kept, so the next start resumes the same session.
    pub async fn shutdown(&self) {
        info!("gateway shutting down");
        self.stop.cancel();
        self.engine.shutdown().await;
        self.session.shutdown().await;
        for task in self.tasks.lock().await.drain(..) {
            task.abort();
        }
        info!("gateway stopped");
    }
}
