// SPDX-FileCopyrightText: 2026 Berth Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP request handlers, one module per kernel component.
//!
//! Responses carry a stable `{"success": true, ...}` shape; failures go
//! through [`crate::error::ApiError`] and the `{error, code}` envelope.

pub mod activity;
pub mod agents;
pub mod changelog;
pub mod locks;
pub mod messages;
pub mod salvage;
pub mod services;
pub mod sessions;
pub mod system;
