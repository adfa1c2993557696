// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Adapter trait definitions.
//!
//! All traits use `#[async_trait]` so they can be held as `Arc<dyn Trait>`.

pub mod credentials;
pub mod session;
pub mod storage;

pub use credentials::CredentialStore;
pub use session::{MessageSender, SessionClient, SessionConnector, SessionHandle};
pub use storage::{ArtifactHistoryStore, CampaignStore, JobStore, NotificationTargetStore};
