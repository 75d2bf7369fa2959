// SPDX-FileCopyrightText: 2026 Berth Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Resurrection queue handlers and the debug reaper trigger.

use std::str::FromStr;

use axum::extract::{Query, State};
use axum::Json;
use berth_core::{BerthError, SalvageState};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::error::ApiError;
use crate::server::GatewayState;
use crate::validate::ValidJson;

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ListQuery {
    #[serde(default)]
    pub project: Option<String>,
    #[serde(default)]
    pub stack: Option<String>,
    /// Defaults to `pending`; pass another state to inspect the rest of
    /// the queue.
    #[serde(default)]
    pub state: Option<String>,
}

/// GET /salvage
pub async fn list(
    State(state): State<GatewayState>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Value>, ApiError> {
    let entry_state = match query.state.as_deref() {
        Some(s) => SalvageState::from_str(s)?,
        None => SalvageState::Pending,
    };
    let entries = state
        .kernel
        .salvage
        .list(
            Some(entry_state),
            query.project.as_deref(),
            query.stack.as_deref(),
        )
        .await?;
    Ok(Json(json!({ "success": true, "entries": entries })))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct TransitionRequest {
    pub entry_id: i64,
    /// One of `claim`, `complete`, `abandon`, `dismiss`.
    pub action: String,
    #[serde(default)]
    pub by_agent: Option<String>,
}

/// POST /salvage
pub async fn transition(
    State(state): State<GatewayState>,
    ValidJson(body): ValidJson<TransitionRequest>,
) -> Result<Json<Value>, ApiError> {
    let entry = match body.action.as_str() {
        "claim" => {
            let by_agent = body.by_agent.as_deref().ok_or_else(|| {
                BerthError::validation("claim requires byAgent")
            })?;
            state.kernel.salvage.claim(body.entry_id, by_agent).await?
        }
        "complete" => {
            state
                .kernel
                .salvage
                .transition(body.entry_id, SalvageState::Done, body.by_agent.as_deref())
                .await?
        }
        "abandon" => {
            state
                .kernel
                .salvage
                .transition(
                    body.entry_id,
                    SalvageState::Abandoned,
                    body.by_agent.as_deref(),
                )
                .await?
        }
        "dismiss" => {
            state
                .kernel
                .salvage
                .transition(
                    body.entry_id,
                    SalvageState::Dismissed,
                    body.by_agent.as_deref(),
                )
                .await?
        }
        other => {
            return Err(ApiError(BerthError::validation(format!(
                "unknown salvage action `{other}`"
            ))))
        }
    };
    Ok(Json(json!({ "success": true, "entry": entry })))
}

/// POST /resurrection/reap: force one sweep. Debug affordance.
pub async fn force_reap(State(state): State<GatewayState>) -> Result<Json<Value>, ApiError> {
    let report = state.kernel.reaper.sweep().await?;
    Ok(Json(json!({ "success": true, "report": report })))
}
