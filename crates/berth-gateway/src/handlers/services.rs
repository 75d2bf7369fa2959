// SPDX-FileCopyrightText: 2026 Berth Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Port claim / release / query handlers.

use axum::extract::{Path, Query, State};
use axum::Json;
use berth_core::{BerthError, Identity, IdentityPattern};
use berth_kernel::ClaimOptions;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::error::ApiError;
use crate::server::GatewayState;
use crate::validate::{check_pid, check_port, ValidJson};

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ClaimRequest {
    #[serde(default)]
    pub identity: Option<String>,
    #[serde(default)]
    pub preferred_port: Option<u16>,
    /// `[start, end]`, overriding the configured scan range.
    #[serde(default)]
    pub range: Option<(u16, u16)>,
    /// Milliseconds from now until the assignment expires.
    #[serde(default)]
    pub expires: Option<i64>,
    #[serde(default)]
    pub pid: Option<i64>,
    #[serde(default)]
    pub health_path: Option<String>,
}

async fn do_claim(
    state: GatewayState,
    identity: String,
    body: ClaimRequest,
) -> Result<Json<Value>, ApiError> {
    let identity = Identity::parse(&identity)?;
    if let Some(port) = body.preferred_port {
        check_port(port)?;
    }
    if let Some((start, end)) = body.range {
        check_port(start)?;
        check_port(end)?;
    }
    if let Some(pid) = body.pid {
        check_pid(pid)?;
    }
    if let Some(expires) = body.expires {
        if expires < 1 {
            return Err(ApiError(BerthError::validation(
                "expires must be a positive millisecond duration",
            )));
        }
    }

    let outcome = state
        .kernel
        .ports
        .claim(
            &identity,
            ClaimOptions {
                preferred_port: body.preferred_port,
                range: body.range,
                expires_ms: body.expires,
                pid: body.pid,
                health_path: body.health_path,
            },
        )
        .await?;

    Ok(Json(json!({
        "success": true,
        "identity": identity.as_str(),
        "port": outcome.port,
        "existing": outcome.existing,
    })))
}

/// POST /claim
pub async fn claim_body(
    State(state): State<GatewayState>,
    ValidJson(body): ValidJson<ClaimRequest>,
) -> Result<Json<Value>, ApiError> {
    let identity = body
        .identity
        .clone()
        .ok_or_else(|| BerthError::validation("identity is required"))?;
    do_claim(state, identity, body).await
}

/// POST /claim/:identity
pub async fn claim_path(
    State(state): State<GatewayState>,
    Path(identity): Path<String>,
    ValidJson(body): ValidJson<ClaimRequest>,
) -> Result<Json<Value>, ApiError> {
    do_claim(state, identity, body).await
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ReleaseRequest {
    #[serde(default)]
    pub pattern: Option<String>,
    /// `true` sweeps assignments whose expiry has passed instead.
    #[serde(default)]
    pub expired: bool,
}

/// DELETE /release
pub async fn release_body(
    State(state): State<GatewayState>,
    ValidJson(body): ValidJson<ReleaseRequest>,
) -> Result<Json<Value>, ApiError> {
    if body.expired {
        let released = state.kernel.ports.release_expired().await?;
        return Ok(Json(json!({ "success": true, "released": released, "expired": true })));
    }
    let pattern = body
        .pattern
        .ok_or_else(|| BerthError::validation("pattern or expired flag is required"))?;
    let pattern = IdentityPattern::parse(&pattern)?;
    let released = state.kernel.ports.release(&pattern).await?;
    Ok(Json(json!({ "success": true, "released": released })))
}

/// DELETE /release/:identity
pub async fn release_path(
    State(state): State<GatewayState>,
    Path(identity): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let pattern = IdentityPattern::parse(&identity)?;
    let released = state.kernel.ports.release(&pattern).await?;
    Ok(Json(json!({ "success": true, "released": released })))
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServicesQuery {
    #[serde(default)]
    pub pattern: Option<String>,
}

/// GET /services
pub async fn list(
    State(state): State<GatewayState>,
    Query(query): Query<ServicesQuery>,
) -> Result<Json<Value>, ApiError> {
    let pattern = query
        .pattern
        .as_deref()
        .map(IdentityPattern::parse)
        .transpose()?;
    let services = state.kernel.ports.list(pattern.as_ref()).await?;
    Ok(Json(json!({ "success": true, "services": services })))
}

/// GET /services/:identity
pub async fn get_one(
    State(state): State<GatewayState>,
    Path(identity): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let identity = Identity::parse(&identity)?;
    let service = state.kernel.ports.get(&identity).await?;
    Ok(Json(json!({ "success": true, "service": service })))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct EndpointRequest {
    pub env: String,
    pub url: String,
}

/// PUT /services/:identity/endpoint
pub async fn set_endpoint(
    State(state): State<GatewayState>,
    Path(identity): Path<String>,
    ValidJson(body): ValidJson<EndpointRequest>,
) -> Result<Json<Value>, ApiError> {
    let identity = Identity::parse(&identity)?;
    if body.env.trim().is_empty() || body.url.trim().is_empty() {
        return Err(ApiError(BerthError::validation(
            "env and url must not be empty",
        )));
    }
    state
        .kernel
        .ports
        .set_endpoint(&identity, &body.env, &body.url)
        .await?;
    Ok(Json(json!({ "success": true })))
}
