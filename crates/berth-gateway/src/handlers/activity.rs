// SPDX-FileCopyrightText: 2026 Berth Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Audit log read handlers.

use axum::extract::{Query, State};
use axum::Json;
use berth_kernel::ActivityFilter;
use serde::Deserialize;
use serde_json::{json, Map, Value};

use crate::error::ApiError;
use crate::server::GatewayState;
use crate::validate::clamp_limit;

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ListQuery {
    #[serde(rename = "type", default)]
    pub entry_type: Option<String>,
    #[serde(default)]
    pub agent: Option<String>,
    #[serde(default)]
    pub from: Option<i64>,
    #[serde(default)]
    pub to: Option<i64>,
    #[serde(default)]
    pub limit: Option<i64>,
    #[serde(default)]
    pub offset: Option<i64>,
}

/// GET /activity
pub async fn list(
    State(state): State<GatewayState>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Value>, ApiError> {
    let entries = state
        .kernel
        .activity
        .list(ActivityFilter {
            entry_type: query.entry_type,
            agent_id: query.agent,
            from: query.from,
            to: query.to,
            limit: clamp_limit(query.limit),
            offset: query.offset.unwrap_or(0).max(0),
        })
        .await?;
    Ok(Json(json!({ "success": true, "activity": entries })))
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SummaryQuery {
    #[serde(default)]
    pub from: Option<i64>,
    #[serde(default)]
    pub to: Option<i64>,
}

/// GET /activity/summary: counts per entry type over a window.
pub async fn summary(
    State(state): State<GatewayState>,
    Query(query): Query<SummaryQuery>,
) -> Result<Json<Value>, ApiError> {
    let counts = state.kernel.activity.summary(query.from, query.to).await?;
    let mut by_type = Map::new();
    for (entry_type, count) in counts {
        by_type.insert(entry_type, json!(count));
    }
    Ok(Json(json!({ "success": true, "summary": by_type })))
}
