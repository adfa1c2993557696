// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core library for the Courier messaging gateway.
//!
//! This crate provides the error type, the domain types shared by every
//! component, and the adapter traits that the session client and the stores
//! implement.

pub mod address;
pub mod clock;
pub mod error;
pub mod traits;
pub mod types;

// Re-export key items at crate root for ergonomic imports.
pub use clock::Clock;
pub use error::CourierError;
pub use types::{
    ConnectionState, JobState, MessageContent, MessageId, QueueKind, QueuePriority, SessionEvent,
};

pub use traits::{
    ArtifactHistoryStore, CampaignStore, CredentialStore, JobStore, MessageSender,
    NotificationTargetStore, SessionClient, SessionConnector, SessionHandle,
};

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use super::*;
    use crate::types::{CampaignStatus, Job, NewJob, QueueStats, progress_percent};

    #[test]
    fn queue_kind_round_trips_through_strings() {
        for kind in QueueKind::ALL {
            let parsed = QueueKind::from_str(&kind.to_string()).expect("should parse back");
            assert_eq!(kind, parsed);
        }
        assert_eq!(QueueKind::Notification.to_string(), "notification");
    }

    #[test]
    fn job_state_serializes_snake_case() {
        let json = serde_json::to_string(&JobState::Delayed).expect("should serialize");
        assert_eq!(json, "\"delayed\"");
    }

    #[test]
    fn campaign_transitions_only_move_forward() {
        use CampaignStatus::*;
        assert!(Draft.can_transition_to(Running));
        assert!(Scheduled.can_transition_to(Running));
        assert!(Running.can_transition_to(Cancelled));
        assert!(Running.can_transition_to(Completed));
        assert!(!Completed.can_transition_to(Running));
        assert!(!Running.can_transition_to(Draft));
        assert!(!Draft.can_transition_to(Cancelled));
        assert!(!Cancelled.can_transition_to(Running));
    }

    #[test]
    fn progress_percent_floors() {
        assert_eq!(progress_percent(0, 3), 0);
        assert_eq!(progress_percent(1, 3), 33);
        assert_eq!(progress_percent(2, 3), 66);
        assert_eq!(progress_percent(3, 3), 100);
        assert_eq!(progress_percent(0, 0), 0);
    }

    #[test]
    fn message_content_validation() {
        assert!(MessageContent::text("hi").validate().is_ok());
        assert!(MessageContent::text("   ").validate().is_err());
        assert!(MessageContent::text("x".repeat(4097)).validate().is_err());
        let image = MessageContent::Image {
            path: "/tmp/a.png".into(),
            caption: Some("c".repeat(1025)),
        };
        assert!(image.validate().is_err());
    }

    #[test]
    fn message_content_tagged_json() {
        let json = serde_json::to_value(MessageContent::text("hi")).expect("should serialize");
        assert_eq!(json, serde_json::json!({"type": "text", "text": "hi"}));
    }

    #[test]
    fn new_job_initial_state_depends_on_delay() {
        let now = chrono::Utc::now();
        let mut job = NewJob {
            queue: QueueKind::Direct,
            payload: serde_json::json!({}),
            priority: QueuePriority::NORMAL,
            max_attempts: 3,
            created_at: now,
            available_at: now,
        };
        assert_eq!(job.initial_state(), JobState::Waiting);
        job.available_at = now + chrono::TimeDelta::seconds(5);
        assert_eq!(job.initial_state(), JobState::Delayed);
    }

    #[test]
    fn queue_stats_total_tracks_states() {
        let mut stats = QueueStats::default();
        stats.add(JobState::Completed, 2);
        stats.add(JobState::Waiting, 1);
        assert_eq!(stats.completed, 2);
        assert_eq!(stats.total, 3);
    }

    #[test]
    fn job_payload_as_reports_malformed() {
        let now = chrono::Utc::now();
        let job = Job {
            id: 7,
            queue: QueueKind::Campaign,
            payload: serde_json::json!({"nope": true}),
            priority: QueuePriority::LOW,
            attempts_made: 0,
            max_attempts: 3,
            state: JobState::Waiting,
            progress: 0,
            created_at: now,
            available_at: now,
            processed_at: None,
            finished_at: None,
            failure_reason: None,
            result: None,
        };
        let err = job
            .payload_as::<crate::types::CampaignJob>()
            .expect_err("payload lacks campaign_id");
        assert!(err.to_string().contains("job 7"));
    }

    #[test]
    fn all_traits_are_exported() {
        fn _assert_job_store<T: JobStore>() {}
        fn _assert_campaign_store<T: CampaignStore>() {}
        fn _assert_target_store<T: NotificationTargetStore>() {}
        fn _assert_artifact_store<T: ArtifactHistoryStore>() {}
        fn _assert_credential_store<T: CredentialStore>() {}
        fn _assert_session_client<T: SessionClient>() {}
        fn _assert_session_connector<T: SessionConnector>() {}
        fn _assert_message_sender<T: MessageSender>() {}
    }
}
