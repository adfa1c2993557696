// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! In-memory credential store.

use async_trait::async_trait;
use tokio::sync::Mutex;

use courier_core::traits::CredentialStore;
use courier_core::CourierError;

#[derive(Debug, Default)]
pub struct MemoryCredentialStore {
    blob: Mutex<Option<Vec<u8>>>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store that already holds paired credentials.
    pub fn with_credentials(blob: &[u8]) -> Self {
        Self {
            blob: Mutex::new(Some(blob.to_vec())),
        }
    }

    pub async fn current(&self) -> Option<Vec<u8>> {
        self.blob.lock().await.clone()
    }
}

#[async_trait]
impl CredentialStore for MemoryCredentialStore {
    async fn load(&self) -> Result<Option<Vec<u8>>, CourierError> {
        Ok(self.blob.lock().await.clone())
    }

    async fn save(&self, blob: &[u8]) -> Result<(), CourierError> {
        *self.blob.lock().await = Some(blob.to_vec());
        Ok(())
    }

    async fn clear(&self) -> Result<(), CourierError> {
        *self.blob.lock().await = None;
        Ok(())
    }
}
