// SPDX-FileCopyrightText: 2026 Berth Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Observability endpoints: health, version, metrics, config.
//!
//! These bypass the rate limiter so probes and scrapers never contend with
//! API traffic.

use axum::extract::State;
use axum::http::header;
use axum::response::IntoResponse;
use axum::Json;
use serde_json::{json, Value};

use crate::server::GatewayState;

/// GET /health
pub async fn get_health(State(state): State<GatewayState>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "uptimeSecs": state.health.start_time.elapsed().as_secs(),
    }))
}

/// GET /version
pub async fn get_version() -> Json<Value> {
    Json(json!({ "version": env!("CARGO_PKG_VERSION") }))
}

/// GET /metrics in Prometheus text format.
pub async fn get_metrics(State(state): State<GatewayState>) -> impl IntoResponse {
    let body = match &state.health.prometheus_render {
        Some(render) => render(),
        None => "# metrics recorder not installed\n".to_string(),
    };
    ([(header::CONTENT_TYPE, "text/plain; version=0.0.4")], body)
}

/// GET /config: the effective configuration. Nothing in it is secret on a
/// loopback-trust daemon.
pub async fn get_config(State(state): State<GatewayState>) -> Json<Value> {
    Json(json!({ "success": true, "config": &*state.config }))
}
