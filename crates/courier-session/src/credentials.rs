// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! File-backed credential store.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::debug;

use courier_core::traits::CredentialStore;
use courier_core::CourierError;

const CREDENTIALS_FILE: &str = "session.bin";

/// Keeps the credential blob in `<auth_dir>/session.bin`.
///
/// Writes go to a sibling temp file first and are renamed into place, so a
/// crash mid-write never leaves a truncated blob behind.
#[derive(Debug, Clone)]
pub struct FileCredentialStore {
    dir: PathBuf,
}

impl FileCredentialStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path(&self) -> PathBuf {
        self.dir.join(CREDENTIALS_FILE)
    }
}

fn io_err(path: &Path, e: std::io::Error) -> CourierError {
    CourierError::Storage {
        source: format!("{}: {e}", path.display()).into(),
    }
}

#[async_trait]
impl CredentialStore for FileCredentialStore {
    async fn load(&self) -> Result<Option<Vec<u8>>, CourierError> {
        let path = self.path();
        match tokio::fs::read(&path).await {
            Ok(blob) => Ok(Some(blob)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(io_err(&path, e)),
        }
    }

    async fn save(&self, blob: &[u8]) -> Result<(), CourierError> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| io_err(&self.dir, e))?;
        let path = self.path();
        let tmp = path.with_extension("tmp");
        tokio::fs::write(&tmp, blob)
            .await
            .map_err(|e| io_err(&tmp, e))?;
        tokio::fs::rename(&tmp, &path)
            .await
            .map_err(|e| io_err(&path, e))?;
        debug!(path = %path.display(), bytes = blob.len(), "credentials saved");
        Ok(())
    }

    async fn clear(&self) -> Result<(), CourierError> {
        let path = self.path();
        match tokio::fs::remove_file(&path).await {
            Ok(()) => {
                debug!(path = %path.display(), "credentials cleared");
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(io_err(&path, e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn save_load_clear() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileCredentialStore::new(dir.path().join("auth_info"));

        assert_eq!(store.load().await.unwrap(), None);
        store.save(b"first").await.unwrap();
        store.save(b"second").await.unwrap();
        assert_eq!(store.load().await.unwrap(), Some(b"second".to_vec()));

        store.clear().await.unwrap();
        assert_eq!(store.load().await.unwrap(), None);
        // clearing twice is fine
        store.clear().await.unwrap();
    }
}
