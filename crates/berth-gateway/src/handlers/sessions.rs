// SPDX-FileCopyrightText: 2026 Berth Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Session, note, and file-claim handlers.

use std::str::FromStr;

use axum::extract::{Path, Query, State};
use axum::Json;
use berth_core::{BerthError, Identity, SessionStatus};
use berth_kernel::{AddNote, StartSession};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::error::ApiError;
use crate::server::GatewayState;
use crate::validate::{clamp_limit, ValidJson};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct StartRequest {
    pub purpose: String,
    #[serde(default)]
    pub files: Vec<String>,
    #[serde(default)]
    pub identity: Option<String>,
    #[serde(default)]
    pub agent_id: Option<String>,
    #[serde(default)]
    pub force: bool,
}

/// POST /sessions
pub async fn start(
    State(state): State<GatewayState>,
    ValidJson(body): ValidJson<StartRequest>,
) -> Result<Json<Value>, ApiError> {
    let identity = body
        .identity
        .as_deref()
        .map(Identity::parse)
        .transpose()?;
    let outcome = state
        .kernel
        .sessions
        .start(StartSession {
            purpose: body.purpose,
            files: body.files,
            identity,
            agent_id: body.agent_id,
            force: body.force,
        })
        .await?;

    let mut response = json!({
        "success": true,
        "session": outcome.session,
        "claimed": outcome.claimed,
        "conflicts": outcome.conflicts,
    });
    if !outcome.conflicts.is_empty() {
        response["warning"] = json!(format!(
            "{} path(s) already claimed by another active session",
            outcome.conflicts.len()
        ));
    }
    Ok(Json(response))
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ListQuery {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub limit: Option<i64>,
}

/// GET /sessions
pub async fn list(
    State(state): State<GatewayState>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Value>, ApiError> {
    let status = query
        .status
        .as_deref()
        .map(SessionStatus::from_str)
        .transpose()?;
    let sessions = state
        .kernel
        .sessions
        .list(status, clamp_limit(query.limit))
        .await?;
    Ok(Json(json!({ "success": true, "sessions": sessions })))
}

/// GET /sessions/:id
pub async fn detail(
    State(state): State<GatewayState>,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let detail = state.kernel.sessions.detail(&id).await?;
    Ok(Json(json!({
        "success": true,
        "session": detail.session,
        "notes": detail.notes,
        "files": detail.files,
    })))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct EndRequest {
    pub status: String,
    #[serde(default)]
    pub note: Option<String>,
}

/// PUT /sessions/:id
pub async fn end(
    State(state): State<GatewayState>,
    Path(id): Path<String>,
    ValidJson(body): ValidJson<EndRequest>,
) -> Result<Json<Value>, ApiError> {
    let status = SessionStatus::from_str(&body.status)?;
    if !status.is_terminal() {
        return Err(ApiError(BerthError::validation(
            "status must be completed or abandoned",
        )));
    }
    let session = state.kernel.sessions.end(&id, status, body.note).await?;
    Ok(Json(json!({ "success": true, "session": session })))
}

/// DELETE /sessions/:id
pub async fn delete(
    State(state): State<GatewayState>,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    state.kernel.sessions.delete(&id).await?;
    Ok(Json(json!({ "success": true })))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct NoteRequest {
    pub content: String,
    #[serde(rename = "type", default)]
    pub note_type: Option<String>,
    #[serde(default)]
    pub created_by: Option<String>,
}

/// POST /sessions/:id/notes
pub async fn add_note(
    State(state): State<GatewayState>,
    Path(id): Path<String>,
    ValidJson(body): ValidJson<NoteRequest>,
) -> Result<Json<Value>, ApiError> {
    let note = state
        .kernel
        .sessions
        .add_note(AddNote {
            session_id: Some(id),
            content: body.content,
            note_type: body.note_type,
            created_by: body.created_by,
        })
        .await?;
    Ok(Json(json!({ "success": true, "note": note })))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct FilesRequest {
    pub paths: Vec<String>,
    #[serde(default)]
    pub force: bool,
}

/// POST /sessions/:id/files
pub async fn add_files(
    State(state): State<GatewayState>,
    Path(id): Path<String>,
    ValidJson(body): ValidJson<FilesRequest>,
) -> Result<Json<Value>, ApiError> {
    if body.paths.is_empty() {
        return Err(ApiError(BerthError::validation("paths must not be empty")));
    }
    let outcome = state
        .kernel
        .sessions
        .add_files(&id, body.paths, body.force)
        .await?;
    Ok(Json(json!({
        "success": true,
        "claimed": outcome.claimed,
        "conflicts": outcome.conflicts,
    })))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct RemoveFilesRequest {
    pub paths: Vec<String>,
}

/// DELETE /sessions/:id/files
pub async fn remove_files(
    State(state): State<GatewayState>,
    Path(id): Path<String>,
    ValidJson(body): ValidJson<RemoveFilesRequest>,
) -> Result<Json<Value>, ApiError> {
    let removed = state.kernel.sessions.remove_files(&id, body.paths).await?;
    Ok(Json(json!({ "success": true, "removed": removed })))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct QuickNoteRequest {
    pub content: String,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(rename = "type", default)]
    pub note_type: Option<String>,
    #[serde(default)]
    pub created_by: Option<String>,
}

/// POST /notes: append to the caller's latest active session, creating an
/// implicit one when none exists.
pub async fn quick_note(
    State(state): State<GatewayState>,
    ValidJson(body): ValidJson<QuickNoteRequest>,
) -> Result<Json<Value>, ApiError> {
    let note = state
        .kernel
        .sessions
        .add_note(AddNote {
            session_id: body.session_id,
            content: body.content,
            note_type: body.note_type,
            created_by: body.created_by,
        })
        .await?;
    Ok(Json(json!({ "success": true, "note": note })))
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct NotesQuery {
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(rename = "type", default)]
    pub note_type: Option<String>,
    #[serde(default)]
    pub limit: Option<i64>,
}

/// GET /notes
pub async fn recent_notes(
    State(state): State<GatewayState>,
    Query(query): Query<NotesQuery>,
) -> Result<Json<Value>, ApiError> {
    let notes = state
        .kernel
        .sessions
        .list_notes(
            query.session_id.as_deref(),
            query.note_type.as_deref(),
            clamp_limit(query.limit),
        )
        .await?;
    Ok(Json(json!({ "success": true, "notes": notes })))
}
