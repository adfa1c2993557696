// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Fake session connector for deterministic testing.
//!
//! Every `connect()` produces a [`FakeSession`]: the test keeps the control
//! half and pushes lifecycle events through it, while the connection manager
//! receives the client and event stream as it would from a real network.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::{Mutex, mpsc};

use courier_core::traits::{SessionClient, SessionConnector, SessionHandle};
use courier_core::types::{
    CloseReason, DeliveryStatus, DeliveryUpdate, InboundMessage, MediaKind, MediaUpload,
    MessageId, SentMessage, SessionEvent,
};
use courier_core::CourierError;

/// Account reported by auto-opened fake sessions.
pub const FAKE_USER: &str = "628000000000@s.whatsapp.net";

/// One message captured by a [`FakeSessionClient`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentRecord {
    pub message_id: String,
    pub jid: String,
    /// Text body, or caption for media.
    pub body: Option<String>,
    pub media: Option<MediaKind>,
}

/// Client half of a fake session. Captures outbound messages.
#[derive(Debug, Default)]
pub struct FakeSessionClient {
    sent: Mutex<Vec<SentRecord>>,
    fail_sends: AtomicBool,
    logged_out: AtomicBool,
    closed: AtomicBool,
}

impl FakeSessionClient {
    /// All messages sent through this client, in order.
    pub async fn sent_messages(&self) -> Vec<SentRecord> {
        self.sent.lock().await.clone()
    }

    pub async fn sent_count(&self) -> usize {
        self.sent.lock().await.len()
    }

    /// Make every following send fail with a session error.
    pub fn set_fail_sends(&self, fail: bool) {
        self.fail_sends.store(fail, Ordering::SeqCst);
    }

    pub fn was_logged_out(&self) -> bool {
        self.logged_out.load(Ordering::SeqCst)
    }

    pub fn was_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    async fn record(
        &self,
        jid: &str,
        body: Option<String>,
        media: Option<MediaKind>,
    ) -> Result<SentMessage, CourierError> {
        if self.fail_sends.load(Ordering::SeqCst) {
            return Err(CourierError::session("fake send failure"));
        }
        let message_id = format!("FAKE-{}", uuid::Uuid::new_v4().simple());
        self.sent.lock().await.push(SentRecord {
            message_id: message_id.clone(),
            jid: jid.to_string(),
            body,
            media,
        });
        Ok(SentMessage {
            message_id: MessageId(message_id),
            timestamp: Utc::now(),
        })
    }
}

#[async_trait]
impl SessionClient for FakeSessionClient {
    async fn send_text(&self, jid: &str, text: &str) -> Result<SentMessage, CourierError> {
        self.record(jid, Some(text.to_string()), None).await
    }

    async fn send_media(
        &self,
        jid: &str,
        media: MediaUpload,
    ) -> Result<SentMessage, CourierError> {
        self.record(jid, media.caption, Some(media.kind)).await
    }

    async fn logout(&self) -> Result<(), CourierError> {
        self.logged_out.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn close(&self) -> Result<(), CourierError> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

/// Control half of a fake session: push events into the manager.
#[derive(Debug, Clone)]
pub struct FakeSession {
    events: mpsc::Sender<SessionEvent>,
    client: Arc<FakeSessionClient>,
}

impl FakeSession {
    pub fn client(&self) -> Arc<FakeSessionClient> {
        Arc::clone(&self.client)
    }

    /// Push a raw event. Silently dropped if the manager let go of the stream.
    pub async fn emit(&self, event: SessionEvent) {
        let _ = self.events.send(event).await;
    }

    pub async fn open(&self) {
        self.emit(SessionEvent::Opened {
            user: Some(FAKE_USER.to_string()),
        })
        .await;
    }

    pub async fn drop_connection(&self) {
        self.emit(SessionEvent::Closed(CloseReason::Transient {
            code: Some(428),
            message: "connection closed".into(),
        }))
        .await;
    }

    pub async fn log_out(&self) {
        self.emit(SessionEvent::Closed(CloseReason::LoggedOut)).await;
    }

    pub async fn challenge(&self, raw: &str) {
        self.emit(SessionEvent::CredentialChallenge(raw.to_string()))
            .await;
    }

    pub async fn update_credentials(&self, blob: &[u8]) {
        self.emit(SessionEvent::CredentialsUpdated(blob.to_vec()))
            .await;
    }

    pub async fn receipt(&self, message_id: &str, to: &str, status: DeliveryStatus) {
        self.emit(SessionEvent::DeliveryUpdate(DeliveryUpdate {
            message_id: MessageId(message_id.to_string()),
            to: to.to_string(),
            status,
        }))
        .await;
    }

    pub async fn receive(&self, from: &str, body: &str) {
        self.emit(SessionEvent::MessageReceived(InboundMessage {
            message_id: MessageId(format!("IN-{}", uuid::Uuid::new_v4().simple())),
            from: from.to_string(),
            message_type: "text".into(),
            body: body.to_string(),
            timestamp: Utc::now(),
        }))
        .await;
    }

    /// Whether the manager still holds the event stream of this session.
    pub fn is_attached(&self) -> bool {
        !self.events.is_closed()
    }
}

#[derive(Debug, Default)]
struct ConnectorState {
    sessions: Vec<FakeSession>,
    credentials_seen: Vec<Option<Vec<u8>>>,
}

/// Fake [`SessionConnector`].
#[derive(Debug, Default)]
pub struct FakeConnector {
    state: Mutex<ConnectorState>,
    fail_connects: AtomicU32,
    auto_open: bool,
}

impl FakeConnector {
    /// Sessions stay in `connecting` until the test calls [`FakeSession::open`].
    pub fn new() -> Self {
        Self::default()
    }

    /// Every new session opens immediately.
    pub fn auto_open() -> Self {
        Self {
            auto_open: true,
            ..Self::default()
        }
    }

    /// The next `n` connects fail before producing a session.
    pub fn fail_next_connects(&self, n: u32) {
        self.fail_connects.store(n, Ordering::SeqCst);
    }

    pub async fn connect_count(&self) -> usize {
        self.state.lock().await.credentials_seen.len()
    }

    /// Credentials passed to each connect call, in order.
    pub async fn credentials_seen(&self) -> Vec<Option<Vec<u8>>> {
        self.state.lock().await.credentials_seen.clone()
    }

    pub async fn latest(&self) -> Option<FakeSession> {
        self.state.lock().await.sessions.last().cloned()
    }

    pub async fn sessions(&self) -> Vec<FakeSession> {
        self.state.lock().await.sessions.clone()
    }
}

#[async_trait]
impl SessionConnector for FakeConnector {
    async fn connect(&self, credentials: Option<Vec<u8>>) -> Result<SessionHandle, CourierError> {
        let mut state = self.state.lock().await;
        state.credentials_seen.push(credentials);

        let refused = self
            .fail_connects
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if refused {
            return Err(CourierError::session("fake connect refused"));
        }

        let (tx, rx) = mpsc::channel(64);
        let client = Arc::new(FakeSessionClient::default());
        if self.auto_open {
            let _ = tx.try_send(SessionEvent::Opened {
                user: Some(FAKE_USER.to_string()),
            });
        }
        state.sessions.push(FakeSession {
            events: tx,
            client: Arc::clone(&client),
        });
        Ok(SessionHandle {
            client,
            events: rx,
        })
    }
}
