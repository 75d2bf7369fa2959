// SPDX-FileCopyrightText: 2026 Berth Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Lock handlers. Contention surfaces as 409 with the holder flattened
//! into the envelope.

use axum::extract::{Path, Query, State};
use axum::Json;
use berth_core::BerthError;
use berth_kernel::AcquireOutcome;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::error::ApiError;
use crate::server::GatewayState;
use crate::validate::{check_lock_name, check_pid, ValidJson};

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct AcquireRequest {
    #[serde(default)]
    pub owner: Option<String>,
    /// Lease in milliseconds; absent means the configured default (or infinite).
    #[serde(default)]
    pub ttl: Option<i64>,
    #[serde(default)]
    pub pid: Option<i64>,
}

/// POST /locks/:name
pub async fn acquire(
    State(state): State<GatewayState>,
    Path(name): Path<String>,
    ValidJson(body): ValidJson<AcquireRequest>,
) -> Result<Json<Value>, ApiError> {
    check_lock_name(&name)?;
    if let Some(pid) = body.pid {
        check_pid(pid)?;
    }
    let outcome = state
        .kernel
        .locks
        .acquire(&name, body.owner, body.ttl, body.pid)
        .await?;
    match outcome {
        AcquireOutcome::Acquired { lock } => {
            Ok(Json(json!({ "success": true, "lock": lock })))
        }
        AcquireOutcome::Held { holder } => Err(ApiError(BerthError::Conflict {
            message: format!("lock {name} is held by {}", holder.owner),
            detail: Some(json!({
                "holder": holder.owner,
                "heldSince": holder.acquired_at,
                "expiresAt": holder.expires_at,
            })),
        })),
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ExtendRequest {
    #[serde(default)]
    pub owner: Option<String>,
    pub ttl: i64,
    #[serde(default)]
    pub force: bool,
}

/// PUT /locks/:name
pub async fn extend(
    State(state): State<GatewayState>,
    Path(name): Path<String>,
    ValidJson(body): ValidJson<ExtendRequest>,
) -> Result<Json<Value>, ApiError> {
    check_lock_name(&name)?;
    let lock = state
        .kernel
        .locks
        .extend(&name, body.owner, body.ttl, body.force)
        .await?;
    Ok(Json(json!({ "success": true, "lock": lock })))
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ReleaseRequest {
    #[serde(default)]
    pub owner: Option<String>,
    #[serde(default)]
    pub force: bool,
}

/// DELETE /locks/:name
pub async fn release(
    State(state): State<GatewayState>,
    Path(name): Path<String>,
    ValidJson(body): ValidJson<ReleaseRequest>,
) -> Result<Json<Value>, ApiError> {
    check_lock_name(&name)?;
    let released = state
        .kernel
        .locks
        .release(&name, body.owner, body.force)
        .await?;
    Ok(Json(json!({ "success": true, "released": released })))
}

/// GET /locks/:name
pub async fn check(
    State(state): State<GatewayState>,
    Path(name): Path<String>,
) -> Result<Json<Value>, ApiError> {
    check_lock_name(&name)?;
    let lock = state.kernel.locks.check(&name).await?;
    Ok(Json(json!({
        "success": true,
        "held": lock.is_some(),
        "lock": lock,
    })))
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ListQuery {
    #[serde(default)]
    pub owner: Option<String>,
}

/// GET /locks
pub async fn list(
    State(state): State<GatewayState>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Value>, ApiError> {
    let locks = state.kernel.locks.list(query.owner.as_deref()).await?;
    Ok(Json(json!({ "success": true, "locks": locks })))
}
