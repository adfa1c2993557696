// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Common types shared across the Courier components.

use std::collections::BTreeSet;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::error::CourierError;

/// Maximum length of a text message body.
pub const MAX_TEXT_LENGTH: usize = 4096;

/// Maximum length of a media caption.
pub const MAX_CAPTION_LENGTH: usize = 1024;

/// Unique identifier for a message, assigned by the chat network.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageId(pub String);

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

// --- Session types ---

/// Lifecycle state of the single chat-network session.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Hash,
    Display,
    EnumString,
    Serialize,
    Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Open,
    Closed,
}

/// Why a session client reported `closed`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloseReason {
    /// The network revoked the credentials. Authoritative and never retried.
    LoggedOut,
    /// Anything else: socket drop, server restart, stream error.
    Transient { code: Option<u16>, message: String },
}

impl CloseReason {
    pub fn transient(message: impl Into<String>) -> Self {
        Self::Transient {
            code: None,
            message: message.into(),
        }
    }

    pub fn is_logout(&self) -> bool {
        matches!(self, Self::LoggedOut)
    }
}

impl std::fmt::Display for CloseReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::LoggedOut => f.write_str("logged_out"),
            Self::Transient {
                code: Some(code),
                message,
            } => write!(f, "{message} (status {code})"),
            Self::Transient { code: None, message } => f.write_str(message),
        }
    }
}

/// Point-in-time view of the session, published by the connection manager.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionInfo {
    pub state: ConnectionState,
    pub reconnect_attempts: u32,
    /// A reconnect timer is armed and has not fired yet.
    pub reconnect_pending: bool,
    /// Account identifier reported by the network once the session opens.
    pub user: Option<String>,
}

impl SessionInfo {
    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Open
    }
}

/// A message received from the chat network.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InboundMessage {
    pub message_id: MessageId,
    /// Sender address (JID).
    pub from: String,
    pub message_type: String,
    pub body: String,
    pub timestamp: DateTime<Utc>,
}

/// Receipt level reported for an outbound message.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum DeliveryStatus {
    Delivered,
    Read,
}

/// A delivery or read receipt for a previously sent message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryUpdate {
    pub message_id: MessageId,
    pub to: String,
    pub status: DeliveryStatus,
}

/// Events emitted by a session client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// Raw pairing challenge to be rendered as a scannable code.
    CredentialChallenge(String),
    Opened { user: Option<String> },
    Closed(CloseReason),
    /// Opaque credential blob that must be persisted to survive restarts.
    CredentialsUpdated(Vec<u8>),
    MessageReceived(InboundMessage),
    DeliveryUpdate(DeliveryUpdate),
}

// --- Message content ---

/// Content of an outbound message as it travels through the queues.
///
/// Media variants reference a file on disk; the bytes are read only at send
/// time so job payloads stay small.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MessageContent {
    Text {
        text: String,
    },
    Image {
        path: String,
        #[serde(default)]
        caption: Option<String>,
    },
    Video {
        path: String,
        #[serde(default)]
        caption: Option<String>,
    },
    Document {
        path: String,
        filename: String,
        mimetype: String,
    },
}

impl MessageContent {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }

    /// Short type label (`text`, `image`, `video`, `document`).
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Text { .. } => "text",
            Self::Image { .. } => "image",
            Self::Video { .. } => "video",
            Self::Document { .. } => "document",
        }
    }

    /// Checks length limits and required fields.
    pub fn validate(&self) -> Result<(), CourierError> {
        match self {
            Self::Text { text } => {
                if text.trim().is_empty() {
                    return Err(CourierError::Validation("message text is required".into()));
                }
                if text.chars().count() > MAX_TEXT_LENGTH {
                    return Err(CourierError::Validation(format!(
                        "message must not exceed {MAX_TEXT_LENGTH} characters"
                    )));
                }
            }
            Self::Image { path, caption } | Self::Video { path, caption } => {
                if path.trim().is_empty() {
                    return Err(CourierError::Validation("media path is required".into()));
                }
                if caption
                    .as_deref()
                    .is_some_and(|c| c.chars().count() > MAX_CAPTION_LENGTH)
                {
                    return Err(CourierError::Validation(format!(
                        "caption must not exceed {MAX_CAPTION_LENGTH} characters"
                    )));
                }
            }
            Self::Document {
                path,
                filename,
                mimetype,
            } => {
                if [path, filename, mimetype].iter().any(|f| f.trim().is_empty()) {
                    return Err(CourierError::Validation(
                        "document path, filename and mimetype are required".into(),
                    ));
                }
            }
        }
        Ok(())
    }
}

/// Kind of media handed to the session client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "snake_case")]
pub enum MediaKind {
    Image,
    Video,
    Document,
}

/// Media bytes ready for upload through the session client.
#[derive(Debug, Clone)]
pub struct MediaUpload {
    pub kind: MediaKind,
    pub data: Vec<u8>,
    pub caption: Option<String>,
    pub filename: Option<String>,
    pub mimetype: Option<String>,
}

/// Acknowledgement returned by the session client for a sent message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SentMessage {
    pub message_id: MessageId,
    pub timestamp: DateTime<Utc>,
}

// --- Job types ---

/// The three independent queues of the dispatch engine.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum QueueKind {
    Direct,
    Campaign,
    Notification,
}

impl QueueKind {
    pub const ALL: [QueueKind; 3] = [Self::Direct, Self::Campaign, Self::Notification];
}

/// Persisted state of a job.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Waiting,
    Active,
    Completed,
    Failed,
    Delayed,
}

/// Standard job priorities. Higher values are claimed first.
pub struct QueuePriority;

impl QueuePriority {
    pub const LOW: i32 = 1;
    pub const NORMAL: i32 = 5;
    pub const HIGH: i32 = 10;
    pub const CRITICAL: i32 = 15;
}

/// A unit of queued, retryable work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: i64,
    pub queue: QueueKind,
    pub payload: serde_json::Value,
    pub priority: i32,
    pub attempts_made: u32,
    pub max_attempts: u32,
    pub state: JobState,
    /// Fractional progress reported by the handler, 0..=100.
    pub progress: u8,
    pub created_at: DateTime<Utc>,
    /// Earliest instant at which the job may be claimed.
    pub available_at: DateTime<Utc>,
    /// When a worker last claimed the job.
    pub processed_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub failure_reason: Option<String>,
    pub result: Option<serde_json::Value>,
}

impl Job {
    /// Deserializes the payload into a typed job body.
    pub fn payload_as<T: DeserializeOwned>(&self) -> Result<T, CourierError> {
        serde_json::from_value(self.payload.clone()).map_err(|e| {
            CourierError::Validation(format!("malformed payload for job {}: {e}", self.id))
        })
    }
}

/// A job about to be persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct NewJob {
    pub queue: QueueKind,
    pub payload: serde_json::Value,
    pub priority: i32,
    pub max_attempts: u32,
    pub created_at: DateTime<Utc>,
    pub available_at: DateTime<Utc>,
}

impl NewJob {
    /// `delayed` when the job is not yet claimable, else `waiting`.
    pub fn initial_state(&self) -> JobState {
        if self.available_at > self.created_at {
            JobState::Delayed
        } else {
            JobState::Waiting
        }
    }
}

/// Per-queue job counts by state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueStats {
    pub waiting: u64,
    pub active: u64,
    pub completed: u64,
    pub failed: u64,
    pub delayed: u64,
    pub total: u64,
}

impl QueueStats {
    /// Adds `count` jobs in `state`, keeping `total` consistent.
    pub fn add(&mut self, state: JobState, count: u64) {
        match state {
            JobState::Waiting => self.waiting += count,
            JobState::Active => self.active += count,
            JobState::Completed => self.completed += count,
            JobState::Failed => self.failed += count,
            JobState::Delayed => self.delayed += count,
        }
        self.total += count;
    }
}

/// Outcome of a job removal request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoveOutcome {
    Removed,
    NotFound,
    Active,
}

/// Payload of a direct-message job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectMessageJob {
    /// Recipient phone number or JID.
    pub to: String,
    pub content: MessageContent,
    /// Set when the job was fanned out from a campaign.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub campaign_id: Option<i64>,
}

/// Payload of a campaign job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CampaignJob {
    pub campaign_id: i64,
}

/// Wire body of an outbound notification: `{event, timestamp, data}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationPayload {
    pub event: String,
    /// RFC 3339 timestamp.
    pub timestamp: String,
    pub data: serde_json::Value,
}

/// Payload of a notification job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationJob {
    pub target_id: i64,
    pub payload: NotificationPayload,
}

// --- Campaign types ---

/// Lifecycle status of a broadcast campaign.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum CampaignStatus {
    Draft,
    Scheduled,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl CampaignStatus {
    /// Status transitions only move forward, except `running -> cancelled`.
    pub fn can_transition_to(self, next: CampaignStatus) -> bool {
        use CampaignStatus::*;
        matches!(
            (self, next),
            (Draft, Scheduled | Running)
                | (Scheduled, Running | Cancelled)
                | (Running, Completed | Failed | Cancelled)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}

/// A batch request to send one message to many recipients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Campaign {
    pub id: i64,
    pub name: String,
    pub message: MessageContent,
    pub recipients: Vec<String>,
    pub total_recipients: u32,
    pub sent_count: u32,
    pub delivered_count: u32,
    pub failed_count: u32,
    pub status: CampaignStatus,
    pub scheduled_at: Option<DateTime<Utc>>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Campaign {
    /// Recipients handled so far, successfully or not.
    pub fn processed(&self) -> u32 {
        self.sent_count + self.failed_count
    }

    /// `floor(100 * processed / total)`.
    pub fn progress_percent(&self) -> u8 {
        progress_percent(self.processed(), self.total_recipients)
    }
}

/// `floor(100 * processed / total)`, clamped to 100. Zero when `total` is zero.
pub fn progress_percent(processed: u32, total: u32) -> u8 {
    if total == 0 {
        return 0;
    }
    let pct = (u64::from(processed) * 100) / u64::from(total);
    pct.min(100) as u8
}

/// Input for creating a campaign.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewCampaign {
    pub name: String,
    pub message: MessageContent,
    pub recipients: Vec<String>,
    #[serde(default)]
    pub scheduled_at: Option<DateTime<Utc>>,
}

/// Partial update of a campaign that has not started yet.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CampaignUpdate {
    pub name: Option<String>,
    pub message: Option<MessageContent>,
    pub recipients: Option<Vec<String>>,
    pub scheduled_at: Option<DateTime<Utc>>,
}

// --- Notification target types ---

/// Result of the most recent delivery to a notification target.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum DeliveryOutcome {
    Success,
    Failed,
    Pending,
}

/// Event name that subscribes a target to every event.
pub const WILDCARD_EVENT: &str = "*";

/// A subscriber endpoint for outbound notifications.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationTarget {
    pub id: i64,
    pub name: String,
    pub endpoint_url: String,
    #[serde(skip_serializing)]
    pub secret: Option<String>,
    pub subscribed_events: BTreeSet<String>,
    pub active: bool,
    pub retry_attempts: u32,
    pub timeout_ms: u64,
    pub success_count: u64,
    pub failure_count: u64,
    pub last_status: Option<DeliveryOutcome>,
    pub last_error: Option<String>,
    pub last_triggered_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl NotificationTarget {
    pub fn subscribes_to(&self, event: &str) -> bool {
        self.subscribed_events.contains(WILDCARD_EVENT) || self.subscribed_events.contains(event)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Input for registering a notification target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewNotificationTarget {
    pub name: String,
    pub endpoint_url: String,
    #[serde(default)]
    pub secret: Option<String>,
    pub subscribed_events: BTreeSet<String>,
    #[serde(default)]
    pub retry_attempts: Option<u32>,
    #[serde(default)]
    pub timeout_ms: Option<u64>,
}

// --- Credential artifact types ---

/// Lifecycle of a scannable credential artifact.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ArtifactStatus {
    Pending,
    Scanned,
    Expired,
}

/// A persisted credential artifact history row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactRecord {
    pub id: i64,
    pub status: ArtifactStatus,
    pub generated_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub scanned_at: Option<DateTime<Utc>>,
}

/// Aggregate counts over the artifact history.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ArtifactStats {
    pub total: u64,
    pub pending: u64,
    pub scanned: u64,
    pub expired: u64,
    /// Percentage of artifacts that were scanned, 0.0 when there are none.
    pub scan_rate: f64,
}

impl ArtifactStats {
    pub fn new(pending: u64, scanned: u64, expired: u64) -> Self {
        let total = pending + scanned + expired;
        let scan_rate = if total > 0 {
            (scanned as f64 / total as f64) * 100.0
        } else {
            0.0
        };
        Self {
            total,
            pending,
            scanned,
            expired,
            scan_rate,
        }
    }
}
