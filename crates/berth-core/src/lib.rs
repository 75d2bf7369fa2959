// SPDX-FileCopyrightText: 2026 Berth Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core library for the berth coordination daemon.
//!
//! Provides the workspace-wide error type, the colon-delimited identity
//! scheme, shared entity enums, and the millisecond clock helper. Every
//! other berth crate depends on this one and nothing here depends on the
//! rest of the workspace.

pub mod error;
pub mod identity;
pub mod types;

pub use error::BerthError;
pub use identity::{Identity, IdentityPattern};
pub use types::{AgentState, ChangelogKind, SalvageState, SessionStatus, SERVICE_READY_CHANNEL};

/// Current wall-clock time as integer milliseconds since the Unix epoch.
///
/// All persisted timestamps use this representation.
pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
