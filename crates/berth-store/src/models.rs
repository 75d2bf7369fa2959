// SPDX-FileCopyrightText: 2026 Berth Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Row types for the berth database.
//!
//! These mirror the persisted tables one to one. State and kind columns are
//! plain strings here; the kernel converts to and from the typed enums in
//! `berth-core`. All `*_at` / `last_*` fields are integer milliseconds since
//! the Unix epoch.

use serde::{Deserialize, Serialize};

/// A port assignment: `identity -> port`, optionally tied to a live pid.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceRow {
    pub identity: String,
    pub port: u16,
    pub pid: Option<i64>,
    pub claimed_at: i64,
    pub last_seen: i64,
    pub expires_at: Option<i64>,
    pub health_path: Option<String>,
    /// Endpoint-URL map keyed by environment tag, stored as a JSON object.
    pub endpoints: serde_json::Map<String, serde_json::Value>,
}

/// A named, leased mutual-exclusion token.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LockRow {
    pub name: String,
    pub owner: String,
    pub acquired_at: i64,
    /// `None` means the lease never expires.
    pub expires_at: Option<i64>,
    pub pid: Option<i64>,
}

/// One message in a channel's append-only log.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageRow {
    pub id: i64,
    pub channel: String,
    /// Opaque payload, typically JSON. The kernel never parses it.
    pub payload: String,
    pub sender: Option<String>,
    pub created_at: i64,
}

/// A channel with aggregate history stats.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelInfo {
    pub channel: String,
    pub message_count: i64,
    pub last_message: i64,
}

/// A registered agent. `state` is the reaper's last derived state, not the
/// live truth; readers re-derive from `last_heartbeat`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentRow {
    pub id: String,
    pub agent_type: String,
    pub purpose: Option<String>,
    pub project: Option<String>,
    pub stack: Option<String>,
    pub context: Option<String>,
    pub worktree_id: Option<String>,
    pub registered_at: i64,
    pub last_heartbeat: i64,
    pub state: String,
}

/// A session envelope grouping notes and file claims around a purpose.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRow {
    pub id: String,
    pub purpose: String,
    pub created_by: String,
    pub identity: Option<String>,
    pub status: String,
    pub created_at: i64,
    pub updated_at: i64,
}

/// An immutable timeline entry within a session.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NoteRow {
    pub id: i64,
    pub session_id: String,
    pub note_type: String,
    pub content: String,
    pub created_by: String,
    pub created_at: i64,
}

/// An advisory record that a session is working on a path.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileClaimRow {
    pub session_id: String,
    pub path: String,
    pub claimed_at: i64,
}

/// A path already claimed by another active session, surfaced as a warning.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClaimConflict {
    pub path: String,
    pub session_id: String,
    pub held_by: String,
    pub identity: Option<String>,
}

/// Salvage queue entry created when a dead agent leaves active sessions.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResurrectionRow {
    pub id: i64,
    pub dead_agent_id: String,
    pub identity: Option<String>,
    pub project: Option<String>,
    pub stack: Option<String>,
    /// JSON array of session ids.
    pub sessions_snapshot: String,
    /// JSON object: session id -> array of note objects.
    pub notes_snapshot: String,
    pub state: String,
    pub claimed_by: Option<String>,
    pub created_at: i64,
}

/// An immutable changelog entry keyed by identity.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangelogRow {
    pub id: i64,
    pub identity: String,
    pub kind: String,
    pub summary: String,
    pub description: Option<String>,
    pub session_id: Option<String>,
    pub agent_id: Option<String>,
    pub created_at: i64,
}

/// One audit-log row; written by every mutating kernel operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityRow {
    pub id: i64,
    pub entry_type: String,
    pub action: String,
    pub target: Option<String>,
    pub details: Option<String>,
    pub agent_id: Option<String>,
    pub created_at: i64,
}
