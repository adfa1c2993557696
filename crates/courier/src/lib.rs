// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Courier messaging gateway: composition root and CLI commands.

pub mod connector;
pub mod gateway;
pub mod serve;
pub mod shutdown;
pub mod status;

pub use connector::OfflineConnector;
pub use gateway::{Gateway, GatewayStore};
