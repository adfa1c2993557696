// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SQLite storage in a throwaway directory.

use std::ops::Deref;

use courier_config::model::StorageConfig;
use courier_core::CourierError;
use courier_storage::SqliteStorage;

/// File-backed [`SqliteStorage`] whose directory is removed on drop.
pub struct TestStorage {
    storage: SqliteStorage,
    config: StorageConfig,
    _dir: tempfile::TempDir,
}

impl TestStorage {
    pub async fn new() -> Result<Self, CourierError> {
        let dir = tempfile::TempDir::new().map_err(|e| CourierError::Storage { source: e.into() })?;
        let config = StorageConfig {
            database_path: dir.path().join("test.db").to_string_lossy().to_string(),
            wal_mode: true,
        };
        let storage = SqliteStorage::open(&config).await?;
        Ok(Self {
            storage,
            config,
            _dir: dir,
        })
    }

    pub fn storage(&self) -> SqliteStorage {
        self.storage.clone()
    }

    /// Configuration pointing at the temporary database file.
    pub fn config(&self) -> &StorageConfig {
        &self.config
    }
}

impl Deref for TestStorage {
    type Target = SqliteStorage;

    fn deref(&self) -> &Self::Target {
        &self.storage
    }
}
