// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Fake [`MessageSender`] for queue and broadcast tests.

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex;

use courier_core::address::resolve_recipient;
use courier_core::traits::MessageSender;
use courier_core::types::{MessageContent, MessageId, SentMessage};
use courier_core::CourierError;

/// Sender that succeeds while "connected" and fails with
/// [`CourierError::NotConnected`] otherwise.
#[derive(Debug)]
pub struct FakeSender {
    connected: AtomicBool,
    sent: Mutex<Vec<(String, MessageContent)>>,
    attempts: Mutex<u32>,
}

impl FakeSender {
    pub fn connected() -> Self {
        Self::with_state(true)
    }

    pub fn disconnected() -> Self {
        Self::with_state(false)
    }

    fn with_state(connected: bool) -> Self {
        Self {
            connected: AtomicBool::new(connected),
            sent: Mutex::new(Vec::new()),
            attempts: Mutex::new(0),
        }
    }

    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }

    /// Successful sends as `(jid, content)`.
    pub async fn sent(&self) -> Vec<(String, MessageContent)> {
        self.sent.lock().await.clone()
    }

    /// Every call to `send`, successful or not.
    pub async fn attempts(&self) -> u32 {
        *self.attempts.lock().await
    }
}

#[async_trait]
impl MessageSender for FakeSender {
    async fn send(&self, to: &str, content: &MessageContent) -> Result<SentMessage, CourierError> {
        *self.attempts.lock().await += 1;
        if !self.connected.load(Ordering::SeqCst) {
            return Err(CourierError::NotConnected);
        }
        let jid = resolve_recipient(to)?;
        self.sent.lock().await.push((jid, content.clone()));
        Ok(SentMessage {
            message_id: MessageId(format!("FAKE-{}", uuid::Uuid::new_v4().simple())),
            timestamp: Utc::now(),
        })
    }
}
