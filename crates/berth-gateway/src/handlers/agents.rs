// SPDX-FileCopyrightText: 2026 Berth Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Agent registry handlers.

use std::str::FromStr;

use axum::extract::{Path, Query, State};
use axum::Json;
use berth_core::{AgentState, Identity};
use berth_kernel::RegisterOptions;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::error::ApiError;
use crate::server::GatewayState;
use crate::validate::ValidJson;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct RegisterRequest {
    #[serde(rename = "type", default)]
    pub agent_type: Option<String>,
    #[serde(default)]
    pub purpose: Option<String>,
    #[serde(default)]
    pub identity: Option<String>,
    #[serde(default)]
    pub worktree_id: Option<String>,
}

/// POST /agents/:id
pub async fn register(
    State(state): State<GatewayState>,
    Path(id): Path<String>,
    ValidJson(body): ValidJson<RegisterRequest>,
) -> Result<Json<Value>, ApiError> {
    let identity = body
        .identity
        .as_deref()
        .map(Identity::parse)
        .transpose()?;
    let outcome = state
        .kernel
        .agents
        .register(
            &id,
            RegisterOptions {
                agent_type: body.agent_type.unwrap_or_default(),
                purpose: body.purpose,
                identity,
                worktree_id: body.worktree_id,
            },
        )
        .await?;
    Ok(Json(json!({
        "success": true,
        "agent": outcome.agent,
        "salvageHint": outcome.salvage_hint,
    })))
}

/// PUT /agents/:id/heartbeat
pub async fn heartbeat(
    State(state): State<GatewayState>,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    state.kernel.agents.heartbeat(&id).await?;
    Ok(Json(json!({ "success": true })))
}

/// DELETE /agents/:id
pub async fn unregister(
    State(state): State<GatewayState>,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    state.kernel.agents.unregister(&id).await?;
    Ok(Json(json!({ "success": true })))
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ListQuery {
    #[serde(default)]
    pub project: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
}

/// GET /agents
pub async fn list(
    State(state): State<GatewayState>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Value>, ApiError> {
    let state_filter = query
        .state
        .as_deref()
        .map(AgentState::from_str)
        .transpose()?;
    let agents = state
        .kernel
        .agents
        .list(query.project.as_deref(), state_filter)
        .await?;
    Ok(Json(json!({ "success": true, "agents": agents })))
}
