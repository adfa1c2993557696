// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Typed query modules, one per table family.

pub mod campaigns;
pub mod jobs;
pub mod qr_history;
pub mod targets;
