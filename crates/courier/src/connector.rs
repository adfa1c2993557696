// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Session connector used when no chat-network client is linked in.

use async_trait::async_trait;

use courier_core::traits::{SessionConnector, SessionHandle};
use courier_core::CourierError;

/// Refuses every connect.
///
/// The connection manager treats each refusal as a transient failure, so
/// `serve` still runs its reconnect policy and keeps jobs queued until
/// attempts are exhausted.
#[derive(Debug, Default, Clone, Copy)]
pub struct OfflineConnector;

#[async_trait]
impl SessionConnector for OfflineConnector {
    async fn connect(&self, _credentials: Option<Vec<u8>>) -> Result<SessionHandle, CourierError> {
        Err(CourierError::session(
            "no chat-network connector is linked into this build",
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn connect_is_refused() {
        let err = OfflineConnector.connect(None).await.unwrap_err();
        assert!(matches!(err, CourierError::Session { .. }));
    }
}
