// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Durable job dispatch for the Courier messaging gateway.
//!
//! The [`JobEngine`] runs the `direct`, `campaign` and `notification` queues
//! over a shared [`JobStore`](courier_core::traits::JobStore). Each queue gets
//! its own [`JobHandler`] when started.

pub mod direct;
pub mod engine;
pub mod handler;
pub mod policy;

pub use direct::DirectMessageHandler;
pub use engine::{AllQueueStats, EnqueueOptions, JobEngine};
pub use handler::{JobContext, JobHandler};
pub use policy::{QueuePolicies, QueuePolicy, backoff_delay};
