// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Typed publish/subscribe event bus.
//!
//! Components publish [`EventKind`]s; subscribers (the credential challenge
//! controller, the campaign delivery tracker, the notification fan-out) each
//! hold a [`Subscription`]. The bus is bounded and never blocks publishers:
//! a subscriber that falls behind loses the oldest events and is told how
//! many it missed.

use chrono::{DateTime, Utc};
use courier_core::types::InboundMessage;
use serde::Serialize;
use strum::Display;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tracing::warn;

/// Default broadcast channel capacity.
pub const DEFAULT_CAPACITY: usize = 1024;

/// Outward event names, as seen by notification subscribers.
pub mod names {
    pub const CONNECTION_OPEN: &str = "connection.open";
    pub const CONNECTION_CLOSE: &str = "connection.close";
    pub const QR_GENERATED: &str = "qr.generated";
    pub const MESSAGE_RECEIVED: &str = "message.received";
    pub const MESSAGE_SENT: &str = "message.sent";
    pub const MESSAGE_DELIVERED: &str = "message.delivered";
    pub const MESSAGE_READ: &str = "message.read";
    pub const BROADCAST_COMPLETED: &str = "broadcast.completed";

    /// Every outward event name.
    pub const ALL: &[&str] = &[
        CONNECTION_OPEN,
        CONNECTION_CLOSE,
        QR_GENERATED,
        MESSAGE_RECEIVED,
        MESSAGE_SENT,
        MESSAGE_DELIVERED,
        MESSAGE_READ,
        BROADCAST_COMPLETED,
    ];
}

/// Terminal reason carried by `connection.close`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum CloseCause {
    LoggedOut,
    MaxRetriesReached,
}

/// Payload of a bus event.
///
/// Serializes (untagged) to the `data` object of an outbound notification.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum EventKind {
    ConnectionOpen {
        user: Option<String>,
    },
    ConnectionClose {
        reason: CloseCause,
    },
    /// Raw pairing challenge from the session client. Internal only.
    CredentialChallenge {
        raw: String,
    },
    QrGenerated {
        /// SVG data URL of the artifact.
        artifact: String,
        generated_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    },
    MessageReceived {
        #[serde(flatten)]
        message: InboundMessage,
    },
    MessageSent {
        message_id: String,
        to: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        campaign_id: Option<i64>,
    },
    MessageDelivered {
        message_id: String,
        to: String,
    },
    MessageRead {
        message_id: String,
        to: String,
    },
    BroadcastCompleted {
        campaign_id: i64,
        name: String,
        total_recipients: u32,
        sent_count: u32,
        failed_count: u32,
    },
}

impl EventKind {
    /// Outward event name, or `None` for internal-only events.
    pub fn name(&self) -> Option<&'static str> {
        Some(match self {
            Self::ConnectionOpen { .. } => names::CONNECTION_OPEN,
            Self::ConnectionClose { .. } => names::CONNECTION_CLOSE,
            Self::CredentialChallenge { .. } => return None,
            Self::QrGenerated { .. } => names::QR_GENERATED,
            Self::MessageReceived { .. } => names::MESSAGE_RECEIVED,
            Self::MessageSent { .. } => names::MESSAGE_SENT,
            Self::MessageDelivered { .. } => names::MESSAGE_DELIVERED,
            Self::MessageRead { .. } => names::MESSAGE_READ,
            Self::BroadcastCompleted { .. } => names::BROADCAST_COMPLETED,
        })
    }

    /// The `data` object of the outward notification.
    pub fn data(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}

/// One published event.
#[derive(Debug, Clone, PartialEq)]
pub struct BusEvent {
    pub id: uuid::Uuid,
    pub timestamp: DateTime<Utc>,
    pub kind: EventKind,
}

/// Broadcast-based event bus. Cloning yields another handle to the same bus.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<BusEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Publish an event to all current subscribers. Never blocks.
    ///
    /// Publishing with no subscribers is not an error; the event is dropped.
    pub fn publish(&self, kind: EventKind) -> BusEvent {
        let event = BusEvent {
            id: uuid::Uuid::new_v4(),
            timestamp: Utc::now(),
            kind,
        };
        let _ = self.tx.send(event.clone());
        event
    }

    /// Subscribe to all events published after this call.
    ///
    /// `name` identifies the subscriber in lag warnings.
    pub fn subscribe(&self, name: &'static str) -> Subscription {
        Subscription {
            rx: self.tx.subscribe(),
            name,
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

/// A subscriber's ordered view of the bus.
#[derive(Debug)]
pub struct Subscription {
    rx: broadcast::Receiver<BusEvent>,
    name: &'static str,
}

impl Subscription {
    /// Next event, or `None` once every bus handle is dropped.
    ///
    /// Lag is logged and skipped over rather than surfaced as an error.
    pub async fn recv(&mut self) -> Option<BusEvent> {
        loop {
            match self.rx.recv().await {
                Ok(event) => return Some(event),
                Err(RecvError::Lagged(missed)) => {
                    warn!(subscriber = self.name, missed, "event subscriber lagged");
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }

    /// Next event if one is already queued.
    pub fn try_recv(&mut self) -> Option<BusEvent> {
        loop {
            match self.rx.try_recv() {
                Ok(event) => return Some(event),
                Err(broadcast::error::TryRecvError::Lagged(missed)) => {
                    warn!(subscriber = self.name, missed, "event subscriber lagged");
                }
                Err(_) => return None,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sent(id: &str) -> EventKind {
        EventKind::MessageSent {
            message_id: id.into(),
            to: "628111222333@s.whatsapp.net".into(),
            campaign_id: None,
        }
    }

    fn message_id(event: BusEvent) -> String {
        match event.kind {
            EventKind::MessageSent { message_id, .. } => message_id,
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn publish_without_subscribers_is_fine() {
        let bus = EventBus::new();
        let event = bus.publish(sent("m1"));
        assert_eq!(event.kind.name(), Some(names::MESSAGE_SENT));
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn subscribers_receive_in_publish_order() {
        let bus = EventBus::new();
        let mut a = bus.subscribe("a");
        let mut b = bus.subscribe("b");

        bus.publish(sent("m1"));
        bus.publish(sent("m2"));

        for sub in [&mut a, &mut b] {
            let first = sub.recv().await.unwrap();
            let second = sub.recv().await.unwrap();
            assert_eq!(message_id(first), "m1");
            assert_eq!(message_id(second), "m2");
        }
    }

    #[tokio::test]
    async fn lagging_subscriber_skips_to_retained_events() {
        let bus = EventBus::with_capacity(2);
        let mut sub = bus.subscribe("slow");

        bus.publish(sent("m1"));
        bus.publish(sent("m2"));
        bus.publish(sent("m3"));

        let next = sub.recv().await.unwrap();
        assert_eq!(message_id(next), "m2");
    }

    #[tokio::test]
    async fn recv_returns_none_when_bus_dropped() {
        let bus = EventBus::new();
        let mut sub = bus.subscribe("orphan");
        drop(bus);
        assert!(sub.recv().await.is_none());
    }

    #[test]
    fn credential_challenge_is_internal() {
        let kind = EventKind::CredentialChallenge { raw: "2@abc".into() };
        assert_eq!(kind.name(), None);
    }

    #[test]
    fn close_event_data_carries_reason() {
        let kind = EventKind::ConnectionClose {
            reason: CloseCause::MaxRetriesReached,
        };
        assert_eq!(kind.name(), Some("connection.close"));
        assert_eq!(
            kind.data(),
            serde_json::json!({"reason": "max_retries_reached"})
        );
    }

    #[test]
    fn sent_event_data_omits_missing_campaign() {
        let data = sent("m9").data();
        assert_eq!(
            data,
            serde_json::json!({"message_id": "m9", "to": "628111222333@s.whatsapp.net"})
        );
    }
}
