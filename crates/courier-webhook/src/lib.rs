// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Outbound notifications for Courier.
//!
//! Bus events become `notification` jobs through [`WebhookFanout`];
//! [`NotificationHandler`] POSTs each one, signed with the target's secret.

pub mod fanout;
pub mod handler;
pub mod registry;
pub mod signature;

pub use fanout::WebhookFanout;
pub use handler::NotificationHandler;
pub use registry::{TargetRegistry, TargetStats, TargetUpdate, TEST_EVENT};
pub use signature::{canonical_json, sign, signature_header, verify_signature, SIGNATURE_HEADER};
