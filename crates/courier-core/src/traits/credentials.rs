// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Persistence for the opaque session credential blob.

use async_trait::async_trait;

use crate::error::CourierError;

/// Stores the credential blob emitted by the session client.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Returns the persisted credentials, or `None` if the session was never paired.
    async fn load(&self) -> Result<Option<Vec<u8>>, CourierError>;

    /// Replaces the persisted credentials.
    async fn save(&self, blob: &[u8]) -> Result<(), CourierError>;

    /// Wipes the persisted credentials. Clearing an empty store is not an error.
    async fn clear(&self) -> Result<(), CourierError>;
}
