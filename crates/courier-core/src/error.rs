// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types for the Courier messaging gateway.

use thiserror::Error;

/// The primary error type used across all Courier components.
///
/// Variants fall into four classes: transient failures that the job engine
/// retries (`Session`, `Delivery`, `Timeout`, `NotConnected`), authoritative
/// terminal failures (`LoggedOut`), synchronous validation failures that never
/// enter a queue (`Validation`), and resource exhaustion (`ReconnectExhausted`).
#[derive(Debug, Error)]
pub enum CourierError {
    /// Configuration errors (invalid TOML, missing required fields, type mismatches).
    #[error("configuration error: {0}")]
    Config(String),

    /// Storage backend errors (database connection, query failure, serialization).
    #[error("storage error: {source}")]
    Storage {
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Session client errors (send failure, socket error, connector failure).
    #[error("session error: {message}")]
    Session {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// A send was attempted while the session is not open.
    #[error("session is not connected")]
    NotConnected,

    /// The chat network revoked the session credentials.
    #[error("session was logged out")]
    LoggedOut,

    /// Automatic reconnection gave up; a manual restart is required.
    #[error("reconnect attempts exhausted after {attempts} attempts")]
    ReconnectExhausted { attempts: u32 },

    /// Input rejected before it reached a queue (bad address, empty campaign, bad URL).
    #[error("validation error: {0}")]
    Validation(String),

    /// A referenced entity does not exist.
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    /// The entity exists but the requested transition is not allowed from its state.
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// A job cannot be removed while a worker holds it.
    #[error("job {id} is currently active")]
    JobActive { id: i64 },

    /// Outbound notification delivery failed (transport error or non-2xx response).
    #[error("delivery failed: {message}")]
    Delivery {
        message: String,
        status: Option<u16>,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Operation timed out.
    #[error("operation timed out after {duration:?}")]
    Timeout { duration: std::time::Duration },

    /// Internal or unexpected errors.
    #[error("internal error: {0}")]
    Internal(String),
}

impl CourierError {
    /// Shorthand for a session error without an underlying source.
    pub fn session(message: impl Into<String>) -> Self {
        Self::Session {
            message: message.into(),
            source: None,
        }
    }

    /// Shorthand for a `NotFound` error.
    pub fn not_found(kind: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            kind,
            id: id.to_string(),
        }
    }

    /// Wraps a serde_json failure as a storage error.
    pub fn serialization(err: serde_json::Error) -> Self {
        Self::Storage {
            source: Box::new(err),
        }
    }
}
