// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Connection lifecycle manager.
//!
//! Owns the single live [`SessionClient`] and drives
//! `disconnected -> connecting -> open -> closed` with bounded, linearly
//! backing-off reconnects. All lifecycle mutations happen under one async
//! mutex; readers observe a [`SessionInfo`] snapshot through a `watch`
//! channel and the active client through an [`ArcSwapOption`], both lock-free.
//!
//! Each connect bumps a generation counter. Events from a client whose
//! generation is no longer current are dropped, so a superseded client can
//! never move the state machine.

use std::sync::{Arc, Weak};
use std::time::Duration;

use arc_swap::ArcSwapOption;
use async_trait::async_trait;
use tokio::sync::{Mutex, mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use courier_bus::{CloseCause, EventBus, EventKind};
use courier_config::model::SessionConfig;
use courier_core::address::resolve_recipient;
use courier_core::traits::{CredentialStore, MessageSender, SessionClient, SessionConnector};
use courier_core::types::{
    CloseReason, ConnectionState, DeliveryStatus, MediaKind, MediaUpload, MessageContent,
    SentMessage, SessionEvent, SessionInfo,
};
use courier_core::CourierError;

/// Result of [`ConnectionManager::initialize`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitializeOutcome {
    /// A connect attempt was started.
    Started,
    /// The session is already open; nothing was done.
    AlreadyOpen,
    /// A connect or a scheduled reconnect is in flight; nothing was done.
    Busy,
}

/// The client of the current generation.
struct ActiveClient {
    generation: u64,
    client: Arc<dyn SessionClient>,
}

#[derive(Default)]
struct Control {
    generation: u64,
    state: ConnectionState,
    attempts: u32,
    user: Option<String>,
    event_pump: Option<JoinHandle<()>>,
    reconnect_timer: Option<JoinHandle<()>>,
}

impl Control {
    fn cancel_timer(&mut self) {
        if let Some(timer) = self.reconnect_timer.take() {
            timer.abort();
        }
    }

    fn detach_pump(&mut self) {
        if let Some(pump) = self.event_pump.take() {
            pump.abort();
        }
    }
}

struct Inner {
    config: SessionConfig,
    connector: Arc<dyn SessionConnector>,
    credentials: Arc<dyn CredentialStore>,
    bus: EventBus,
    info: watch::Sender<SessionInfo>,
    active: ArcSwapOption<ActiveClient>,
    control: Mutex<Control>,
}

/// Manager of the single chat-network session.
///
/// Cheap to clone; all clones drive the same session.
#[derive(Clone)]
pub struct ConnectionManager {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("info", &*self.inner.info.borrow())
            .finish_non_exhaustive()
    }
}

impl ConnectionManager {
    pub fn new(
        config: SessionConfig,
        connector: Arc<dyn SessionConnector>,
        credentials: Arc<dyn CredentialStore>,
        bus: EventBus,
    ) -> Self {
        let (info, _) = watch::channel(SessionInfo::default());
        Self {
            inner: Arc::new(Inner {
                config,
                connector,
                credentials,
                bus,
                info,
                active: ArcSwapOption::empty(),
                control: Mutex::new(Control::default()),
            }),
        }
    }

    /// Snapshot of the session state.
    pub fn info(&self) -> SessionInfo {
        self.inner.info.borrow().clone()
    }

    pub fn state(&self) -> ConnectionState {
        self.inner.info.borrow().state
    }

    pub fn is_connected(&self) -> bool {
        self.inner.info.borrow().is_connected()
    }

    /// Receiver that observes every session state change.
    pub fn watch(&self) -> watch::Receiver<SessionInfo> {
        self.inner.info.subscribe()
    }

    /// Connects using persisted credentials unless already open or busy.
    pub async fn initialize(&self) -> Result<InitializeOutcome, CourierError> {
        let mut ctl = self.inner.control.lock().await;
        match ctl.state {
            ConnectionState::Open => return Ok(InitializeOutcome::AlreadyOpen),
            ConnectionState::Connecting => {
                debug!("initialize ignored: connect in flight");
                return Ok(InitializeOutcome::Busy);
            }
            _ if ctl.reconnect_timer.is_some() => {
                debug!("initialize ignored: reconnect scheduled");
                return Ok(InitializeOutcome::Busy);
            }
            _ => {}
        }
        self.inner.connect(&mut ctl).await;
        Ok(InitializeOutcome::Started)
    }

    /// Drops the current client and reconnects from scratch.
    pub async fn restart(&self) -> Result<(), CourierError> {
        let mut ctl = self.inner.control.lock().await;
        info!("restarting session");
        self.inner.teardown(&mut ctl, false).await;
        ctl.attempts = 0;
        self.inner.connect(&mut ctl).await;
        Ok(())
    }

    /// Invalidates the credentials on the network and wipes them locally.
    pub async fn logout(&self) -> Result<(), CourierError> {
        let mut ctl = self.inner.control.lock().await;
        self.inner.teardown(&mut ctl, true).await;
        ctl.attempts = 0;
        self.inner.credentials.clear().await?;
        ctl.state = ConnectionState::Disconnected;
        ctl.user = None;
        self.inner.publish_info(&ctl);
        self.inner.bus.publish(EventKind::ConnectionClose {
            reason: CloseCause::LoggedOut,
        });
        info!("session logged out");
        Ok(())
    }

    /// Stops timers and closes the client without touching credentials.
    pub async fn shutdown(&self) {
        let mut ctl = self.inner.control.lock().await;
        self.inner.teardown(&mut ctl, false).await;
        ctl.state = ConnectionState::Disconnected;
        self.inner.publish_info(&ctl);
        debug!("session manager shut down");
    }

    /// Sends `content` to `to` through the open session.
    pub async fn send(
        &self,
        to: &str,
        content: &MessageContent,
    ) -> Result<SentMessage, CourierError> {
        if !self.is_connected() {
            return Err(CourierError::NotConnected);
        }
        let active = self.inner.active.load_full().ok_or(CourierError::NotConnected)?;
        content.validate()?;
        let jid = resolve_recipient(to)?;

        let sent = match content {
            MessageContent::Text { text } => active.client.send_text(&jid, text).await?,
            MessageContent::Image { path, caption } => {
                let upload = media_upload(MediaKind::Image, path, caption.clone(), None, None)
                    .await?;
                active.client.send_media(&jid, upload).await?
            }
            MessageContent::Video { path, caption } => {
                let upload = media_upload(MediaKind::Video, path, caption.clone(), None, None)
                    .await?;
                active.client.send_media(&jid, upload).await?
            }
            MessageContent::Document {
                path,
                filename,
                mimetype,
            } => {
                let upload = media_upload(
                    MediaKind::Document,
                    path,
                    None,
                    Some(filename.clone()),
                    Some(mimetype.clone()),
                )
                .await?;
                active.client.send_media(&jid, upload).await?
            }
        };
        debug!(
            to = %jid,
            kind = content.kind(),
            message_id = %sent.message_id,
            "message sent"
        );
        Ok(sent)
    }
}

#[async_trait]
impl MessageSender for ConnectionManager {
    async fn send(
        &self,
        to: &str,
        content: &MessageContent,
    ) -> Result<SentMessage, CourierError> {
        ConnectionManager::send(self, to, content).await
    }
}

async fn media_upload(
    kind: MediaKind,
    path: &str,
    caption: Option<String>,
    filename: Option<String>,
    mimetype: Option<String>,
) -> Result<MediaUpload, CourierError> {
    let data = tokio::fs::read(path)
        .await
        .map_err(|e| CourierError::Session {
            message: format!("cannot read media file {path}: {e}"),
            source: Some(Box::new(e)),
        })?;
    Ok(MediaUpload {
        kind,
        data,
        caption,
        filename,
        mimetype,
    })
}

impl Inner {
    fn publish_info(&self, ctl: &Control) {
        self.info.send_replace(SessionInfo {
            state: ctl.state,
            reconnect_attempts: ctl.attempts,
            reconnect_pending: ctl.reconnect_timer.is_some(),
            user: ctl.user.clone(),
        });
    }

    /// Invalidates the current generation and releases its client.
    async fn teardown(&self, ctl: &mut Control, logout: bool) {
        ctl.cancel_timer();
        ctl.detach_pump();
        ctl.generation += 1;
        if let Some(active) = self.active.swap(None) {
            let result = if logout {
                active.client.logout().await
            } else {
                active.client.close().await
            };
            if let Err(e) = result {
                warn!(error = %e, logout, "session client did not close cleanly");
            }
        }
    }

    async fn connect(self: &Arc<Self>, ctl: &mut Control) {
        ctl.generation += 1;
        let generation = ctl.generation;
        ctl.state = ConnectionState::Connecting;
        self.publish_info(ctl);

        let credentials = match self.credentials.load().await {
            Ok(creds) => creds,
            Err(e) => {
                warn!(error = %e, "failed to load credentials, pairing from scratch");
                None
            }
        };
        debug!(
            generation,
            resumed = credentials.is_some(),
            "connecting session"
        );

        match self.connector.connect(credentials).await {
            Ok(handle) => {
                self.active.store(Some(Arc::new(ActiveClient {
                    generation,
                    client: handle.client,
                })));
                ctl.event_pump = Some(spawn_event_pump(
                    Arc::downgrade(self),
                    generation,
                    handle.events,
                ));
            }
            Err(e) => {
                warn!(error = %e, "session connect failed");
                ctl.generation += 1;
                self.on_closed(ctl, CloseReason::transient(e.to_string()))
                    .await;
            }
        }
    }

    /// Applies one event from the client of `generation`.
    ///
    /// Returns `false` once the generation is stale and the pump should stop.
    async fn handle_event(self: &Arc<Self>, generation: u64, event: SessionEvent) -> bool {
        let mut ctl = self.control.lock().await;
        if ctl.generation != generation {
            debug!(generation, current = ctl.generation, "dropping event from superseded client");
            return false;
        }

        match event {
            SessionEvent::CredentialChallenge(raw) => {
                debug!("credential challenge received");
                self.bus.publish(EventKind::CredentialChallenge { raw });
            }
            SessionEvent::Opened { user } => {
                ctl.attempts = 0;
                ctl.cancel_timer();
                ctl.state = ConnectionState::Open;
                ctl.user = user.clone();
                self.publish_info(&ctl);
                info!(user = ?user, "session open");
                self.bus.publish(EventKind::ConnectionOpen { user });
            }
            SessionEvent::Closed(reason) => {
                ctl.generation += 1;
                ctl.event_pump = None;
                let current = self.active.load_full();
                if current.is_some_and(|active| active.generation == generation) {
                    self.active.store(None);
                }
                self.on_closed(&mut ctl, reason).await;
                return false;
            }
            SessionEvent::CredentialsUpdated(blob) => {
                if let Err(e) = self.credentials.save(&blob).await {
                    error!(error = %e, "failed to persist session credentials");
                }
            }
            SessionEvent::MessageReceived(message) => {
                self.bus.publish(EventKind::MessageReceived { message });
            }
            SessionEvent::DeliveryUpdate(update) => {
                let message_id = update.message_id.0;
                let to = update.to;
                self.bus.publish(match update.status {
                    DeliveryStatus::Delivered => EventKind::MessageDelivered { message_id, to },
                    DeliveryStatus::Read => EventKind::MessageRead { message_id, to },
                });
            }
        }
        true
    }

    async fn on_closed(self: &Arc<Self>, ctl: &mut Control, reason: CloseReason) {
        ctl.user = None;

        if reason.is_logout() {
            ctl.cancel_timer();
            ctl.attempts = 0;
            ctl.state = ConnectionState::Disconnected;
            if let Err(e) = self.credentials.clear().await {
                error!(error = %e, "failed to clear credentials after logout");
            }
            self.publish_info(ctl);
            warn!(error = %CourierError::LoggedOut, "session closed by the network");
            self.bus.publish(EventKind::ConnectionClose {
                reason: CloseCause::LoggedOut,
            });
            return;
        }

        let max = self.config.max_reconnect_attempts;
        if self.config.auto_reconnect && ctl.attempts < max {
            ctl.attempts += 1;
            let delay = self.config.reconnect_interval() * ctl.attempts;
            ctl.state = ConnectionState::Disconnected;
            self.arm_reconnect(ctl, delay);
            self.publish_info(ctl);
            info!(
                %reason,
                attempt = ctl.attempts,
                max,
                delay_ms = delay.as_millis() as u64,
                "session closed, reconnect scheduled"
            );
        } else {
            ctl.cancel_timer();
            ctl.state = ConnectionState::Disconnected;
            self.publish_info(ctl);
            let exhausted = CourierError::ReconnectExhausted {
                attempts: ctl.attempts,
            };
            error!(%reason, error = %exhausted, "session closed, giving up");
            self.bus.publish(EventKind::ConnectionClose {
                reason: CloseCause::MaxRetriesReached,
            });
        }
    }

    /// Replaces any outstanding reconnect timer with one firing after `delay`.
    fn arm_reconnect(self: &Arc<Self>, ctl: &mut Control, delay: Duration) {
        ctl.cancel_timer();
        let weak = Arc::downgrade(self);
        let generation = ctl.generation;
        ctl.reconnect_timer = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let Some(inner) = weak.upgrade() else {
                return;
            };
            let mut ctl = inner.control.lock().await;
            if ctl.generation != generation {
                return;
            }
            ctl.reconnect_timer = None;
            debug!(attempt = ctl.attempts, "reconnect timer fired");
            inner.connect(&mut ctl).await;
        }));
    }
}

fn spawn_event_pump(
    inner: Weak<Inner>,
    generation: u64,
    mut events: mpsc::Receiver<SessionEvent>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            let Some(inner) = inner.upgrade() else {
                return;
            };
            if !inner.handle_event(generation, event).await {
                return;
            }
        }
        debug!(generation, "session event stream ended");
    })
}
