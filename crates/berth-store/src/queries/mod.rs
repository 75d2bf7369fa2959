// SPDX-FileCopyrightText: 2026 Berth Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Typed query functions, one module per table.
//!
//! Every function accepts `&Database` and runs on the single writer thread.
//! Multi-row invariants are wrapped in transactions inside the modules.

pub mod activity;
pub mod agents;
pub mod changelog;
pub mod claims;
pub mod locks;
pub mod messages;
pub mod notes;
pub mod salvage;
pub mod services;
pub mod sessions;
