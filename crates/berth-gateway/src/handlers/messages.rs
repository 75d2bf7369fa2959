// SPDX-FileCopyrightText: 2026 Berth Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Publish / history / clear / channel enumeration.
//!
//! The request body of a publish IS the payload: opaque JSON the kernel
//! never inspects. History supports a bounded long-poll via `?wait=`.

use std::time::Duration;

use axum::extract::{Path, Query, State};
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::error::ApiError;
use crate::server::GatewayState;
use crate::validate::{check_channel, clamp_limit, ValidJson};

/// Longest allowed history long-poll.
const MAX_WAIT_MS: u64 = 30_000;

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PublishQuery {
    #[serde(default)]
    pub sender: Option<String>,
}

/// POST /msg/:channel
pub async fn publish(
    State(state): State<GatewayState>,
    Path(channel): Path<String>,
    Query(query): Query<PublishQuery>,
    ValidJson(payload): ValidJson<Value>,
) -> Result<Json<Value>, ApiError> {
    check_channel(&channel)?;
    let payload = payload.to_string();
    let row = state
        .broker
        .publish(&channel, &payload, query.sender.as_deref())
        .await?;
    Ok(Json(json!({
        "success": true,
        "id": row.id,
        "createdAt": row.created_at,
        "subscribers": state.broker.subscriber_count(&channel),
    })))
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HistoryQuery {
    #[serde(default)]
    pub limit: Option<i64>,
    #[serde(default)]
    pub since: Option<i64>,
    /// Milliseconds to wait for a publication when nothing is newer than
    /// `since`. Capped server-side.
    #[serde(default)]
    pub wait: Option<u64>,
}

/// GET /msg/:channel
pub async fn history(
    State(state): State<GatewayState>,
    Path(channel): Path<String>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<Value>, ApiError> {
    check_channel(&channel)?;
    let since = query.since.unwrap_or(0);
    let limit = clamp_limit(query.limit);

    let mut messages = state.broker.history(&channel, since, limit).await?;
    if messages.is_empty() {
        if let Some(wait) = query.wait.filter(|w| *w > 0) {
            let wait = Duration::from_millis(wait.min(MAX_WAIT_MS));
            if state.broker.wait_for_publish(&channel, wait).await {
                messages = state.broker.history(&channel, since, limit).await?;
            }
        }
    }

    Ok(Json(json!({ "success": true, "messages": messages })))
}

/// DELETE /msg/:channel
pub async fn clear(
    State(state): State<GatewayState>,
    Path(channel): Path<String>,
) -> Result<Json<Value>, ApiError> {
    check_channel(&channel)?;
    let cleared = state.broker.clear(&channel).await?;
    Ok(Json(json!({ "success": true, "cleared": cleared })))
}

/// GET /channels
pub async fn channels(State(state): State<GatewayState>) -> Result<Json<Value>, ApiError> {
    let channels = state.broker.channels().await?;
    Ok(Json(json!({ "success": true, "channels": channels })))
}
