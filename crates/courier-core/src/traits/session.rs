// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Session client traits for the chat-network connection.
//!
//! The wire protocol is a black box: a [`SessionConnector`] produces one
//! authenticated [`SessionClient`] plus the stream of [`SessionEvent`]s it
//! emits. The connection manager owns both for the lifetime of the client.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::CourierError;
use crate::types::{MediaUpload, MessageContent, SentMessage, SessionEvent};

/// One live connection to the chat network.
#[async_trait]
pub trait SessionClient: Send + Sync {
    /// Sends a text message to a normalized address.
    async fn send_text(&self, jid: &str, text: &str) -> Result<SentMessage, CourierError>;

    /// Uploads and sends a media message to a normalized address.
    async fn send_media(&self, jid: &str, media: MediaUpload)
    -> Result<SentMessage, CourierError>;

    /// Invalidates the credentials on the network side.
    async fn logout(&self) -> Result<(), CourierError>;

    /// Closes the connection without invalidating credentials.
    async fn close(&self) -> Result<(), CourierError>;
}

/// A freshly connected client and its event stream.
pub struct SessionHandle {
    pub client: Arc<dyn SessionClient>,
    pub events: mpsc::Receiver<SessionEvent>,
}

impl std::fmt::Debug for SessionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionHandle").finish_non_exhaustive()
    }
}

/// Factory for session clients.
#[async_trait]
pub trait SessionConnector: Send + Sync {
    /// Starts a new connection, resuming from `credentials` when present.
    ///
    /// Without credentials the client is expected to emit
    /// [`SessionEvent::CredentialChallenge`] until the user pairs it.
    async fn connect(&self, credentials: Option<Vec<u8>>) -> Result<SessionHandle, CourierError>;
}

/// Anything that can deliver an outbound message.
///
/// Implemented by the connection manager; job handlers depend on this trait
/// instead of the manager itself.
#[async_trait]
pub trait MessageSender: Send + Sync {
    /// Sends `content` to `to` (phone number or address).
    ///
    /// Fails with [`CourierError::NotConnected`] unless the session is open.
    async fn send(&self, to: &str, content: &MessageContent)
    -> Result<SentMessage, CourierError>;
}
