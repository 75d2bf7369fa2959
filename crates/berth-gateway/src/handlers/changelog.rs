// SPDX-FileCopyrightText: 2026 Berth Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Changelog handlers.

use std::str::FromStr;

use axum::extract::{Query, State};
use axum::Json;
use berth_core::{ChangelogKind, Identity};
use berth_kernel::AddChangelog;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::error::ApiError;
use crate::server::GatewayState;
use crate::validate::{clamp_limit, ValidJson};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct AddRequest {
    pub identity: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub summary: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub agent_id: Option<String>,
}

/// POST /changelog
pub async fn add(
    State(state): State<GatewayState>,
    ValidJson(body): ValidJson<AddRequest>,
) -> Result<Json<Value>, ApiError> {
    let entry = state
        .kernel
        .changelog
        .add(AddChangelog {
            identity: Identity::parse(&body.identity)?,
            kind: ChangelogKind::from_str(&body.kind)?,
            summary: body.summary,
            description: body.description,
            session_id: body.session_id,
            agent_id: body.agent_id,
        })
        .await?;
    Ok(Json(json!({ "success": true, "entry": entry })))
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RollupQuery {
    pub identity: String,
    #[serde(default)]
    pub limit: Option<i64>,
}

/// GET /changelog: entries for the identity and its refinements.
pub async fn query(
    State(state): State<GatewayState>,
    Query(query): Query<RollupQuery>,
) -> Result<Json<Value>, ApiError> {
    let identity = Identity::parse(&query.identity)?;
    let entries = state
        .kernel
        .changelog
        .query(&identity, clamp_limit(query.limit))
        .await?;
    Ok(Json(json!({ "success": true, "entries": entries })))
}
