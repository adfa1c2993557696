// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `courier serve` command implementation.
//!
//! Opens SQLite storage, assembles the [`Gateway`] and runs it until SIGINT
//! or SIGTERM, then drains the queues and checkpoints the database.

use std::sync::Arc;

use tracing::{error, info};

use courier_config::model::CourierConfig;
use courier_core::CourierError;
use courier_session::FileCredentialStore;
use courier_storage::SqliteStorage;

use crate::connector::OfflineConnector;
use crate::gateway::Gateway;
use crate::shutdown;

pub async fn run_serve(config: CourierConfig) -> Result<(), CourierError> {
    init_tracing(&config.app.log_level);
    info!(name = %config.app.name, database = %config.storage.database_path, "starting courier serve");

    let storage = Arc::new(SqliteStorage::open(&config.storage).await?);
    storage.health_check().await?;
    let credentials = Arc::new(FileCredentialStore::new(config.session.auth_dir.clone()));

    let gateway = Gateway::new(config, storage.clone(), Arc::new(OfflineConnector), credentials);
    if let Err(e) = gateway.start().await {
        error!(error = %e, "gateway failed to start");
        gateway.shutdown().await;
        return Err(e);
    }

    let cancel = shutdown::install_signal_handler();
    cancel.cancelled().await;

    gateway.shutdown().await;
    storage.close().await?;
    info!("courier serve stopped");
    Ok(())
}

fn init_tracing(log_level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("courier={log_level},warn")));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_names(false)
        .try_init();
}
