// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Session lifecycle for the Courier messaging gateway.
//!
//! - [`ConnectionManager`] owns the single chat-network session and its
//!   reconnect policy.
//! - [`QrController`] renders pairing challenges into time-boxed artifacts.
//! - [`FileCredentialStore`] persists the opaque credential blob on disk.

pub mod credentials;
pub mod manager;
pub mod qr;
pub mod render;

pub use credentials::FileCredentialStore;
pub use manager::{ConnectionManager, InitializeOutcome};
pub use qr::{ArtifactView, CredentialArtifact, QrController};
