// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Broadcast campaigns for Courier.
//!
//! - [`BroadcastCoordinator`] owns the campaign lifecycle and enqueues one
//!   fan-out job per started campaign.
//! - [`CampaignHandler`] runs that job, pacing one direct-message job per
//!   recipient.
//! - [`DeliveryTracker`] turns delivery receipts into `delivered_count`.

pub mod coordinator;
pub mod handler;
pub mod tracker;

pub use coordinator::{BroadcastCoordinator, CampaignStats};
pub use handler::CampaignHandler;
pub use tracker::DeliveryTracker;
