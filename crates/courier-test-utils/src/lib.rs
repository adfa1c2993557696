// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test utilities for Courier integration tests.
//!
//! Provides fake adapters and storage helpers for fast, deterministic,
//! CI-runnable tests without a real chat-network session.
//!
//! # Components
//!
//! - [`FakeConnector`] - Session connector whose clients are driven by the test
//! - [`FakeSender`] - `MessageSender` with a switchable connection state
//! - [`MemoryCredentialStore`] - Credential store kept in memory
//! - [`MemoryStore`] - In-memory implementation of every store trait
//! - [`TestStorage`] - SQLite storage in a temporary directory

pub mod credentials;
pub mod fake_sender;
pub mod fake_session;
pub mod harness;
pub mod memory_store;

pub use credentials::MemoryCredentialStore;
pub use fake_sender::FakeSender;
pub use fake_session::{FakeConnector, FakeSession, FakeSessionClient, SentRecord};
pub use harness::TestStorage;
pub use memory_store::MemoryStore;
