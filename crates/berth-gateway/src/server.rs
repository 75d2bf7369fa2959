// SPDX-FileCopyrightText: 2026 Berth Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Gateway HTTP server built on axum.
//!
//! Sets up routes, middleware, and shared state. Public observability
//! endpoints (health, version, metrics, config) bypass the rate limiter;
//! everything else is rate limited, body capped, and error tracked.

use std::sync::Arc;
use std::time::Instant;

use axum::extract::{DefaultBodyLimit, Request, State};
use axum::middleware::{self as axum_middleware, Next};
use axum::response::Response;
use axum::routing::{delete, get, post, put};
use axum::Router;
use berth_bus::Broker;
use berth_config::BerthConfig;
use berth_core::BerthError;
use berth_kernel::Kernel;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tracing::info;

use crate::error::ErrorCode;
use crate::handlers;
use crate::ratelimit::{rate_limit_middleware, RateLimiter};
use crate::sse;

/// Health state for the unauthenticated observability endpoints.
#[derive(Clone)]
pub struct HealthState {
    /// Process start time for uptime calculation.
    pub start_time: Instant,
    /// Optional Prometheus metrics render function.
    pub prometheus_render: Option<Arc<dyn Fn() -> String + Send + Sync>>,
}

/// Shared state for axum request handlers.
#[derive(Clone)]
pub struct GatewayState {
    pub kernel: Arc<Kernel>,
    pub broker: Arc<Broker>,
    pub config: Arc<BerthConfig>,
    pub limiter: Arc<RateLimiter>,
    pub health: HealthState,
}

/// Build the full router over the given state.
pub fn build_router(state: GatewayState) -> Router {
    let public_routes = Router::new()
        .route("/health", get(handlers::system::get_health))
        .route("/version", get(handlers::system::get_version))
        .route("/metrics", get(handlers::system::get_metrics))
        .route("/config", get(handlers::system::get_config))
        .with_state(state.clone());

    let api_routes = Router::new()
        .route("/claim", post(handlers::services::claim_body))
        .route("/claim/:identity", post(handlers::services::claim_path))
        .route("/release", delete(handlers::services::release_body))
        .route("/release/:identity", delete(handlers::services::release_path))
        .route("/services", get(handlers::services::list))
        .route("/services/:identity", get(handlers::services::get_one))
        .route(
            "/services/:identity/endpoint",
            put(handlers::services::set_endpoint),
        )
        .route(
            "/locks/:name",
            post(handlers::locks::acquire)
                .put(handlers::locks::extend)
                .delete(handlers::locks::release)
                .get(handlers::locks::check),
        )
        .route("/locks", get(handlers::locks::list))
        .route(
            "/msg/:channel",
            post(handlers::messages::publish)
                .get(handlers::messages::history)
                .delete(handlers::messages::clear),
        )
        .route("/channels", get(handlers::messages::channels))
        .route("/subscribe/:channel", get(sse::subscribe))
        .route("/agents/:id", post(handlers::agents::register).delete(handlers::agents::unregister))
        .route("/agents/:id/heartbeat", put(handlers::agents::heartbeat))
        .route("/agents", get(handlers::agents::list))
        .route(
            "/sessions",
            post(handlers::sessions::start).get(handlers::sessions::list),
        )
        .route(
            "/sessions/:id",
            get(handlers::sessions::detail)
                .put(handlers::sessions::end)
                .delete(handlers::sessions::delete),
        )
        .route("/sessions/:id/notes", post(handlers::sessions::add_note))
        .route(
            "/sessions/:id/files",
            post(handlers::sessions::add_files).delete(handlers::sessions::remove_files),
        )
        .route(
            "/notes",
            post(handlers::sessions::quick_note).get(handlers::sessions::recent_notes),
        )
        .route(
            "/salvage",
            get(handlers::salvage::list).post(handlers::salvage::transition),
        )
        .route("/resurrection/reap", post(handlers::salvage::force_reap))
        .route(
            "/changelog",
            post(handlers::changelog::add).get(handlers::changelog::query),
        )
        .route("/activity", get(handlers::activity::list))
        .route("/activity/summary", get(handlers::activity::summary))
        .route_layer(axum_middleware::from_fn_with_state(
            state.clone(),
            rate_limit_middleware,
        ))
        .route_layer(axum_middleware::from_fn_with_state(
            state.clone(),
            track_errors,
        ))
        .layer(DefaultBodyLimit::max(state.config.gateway.max_body_bytes))
        .with_state(state);

    Router::new()
        .merge(public_routes)
        .merge(api_routes)
        .layer(CorsLayer::permissive())
}

/// After-the-fact error accounting: every surfaced error increments its
/// per-kind metric and writes one activity row with action `error`.
async fn track_errors(
    State(state): State<GatewayState>,
    request: Request,
    next: Next,
) -> Response {
    let path = request.uri().path().to_string();
    let method = request.method().to_string();
    let response = next.run(request).await;

    berth_metrics::record_http_request(&method, &path, response.status().as_u16());
    let code = response.extensions().get::<ErrorCode>().map(|c| c.0);
    if let Some(code) = code {
        metrics::counter!("berth_errors_total", "code" => code).increment(1);
        state
            .kernel
            .activity
            .record(
                "error",
                "error",
                Some(&path),
                Some(serde_json::json!({ "code": code, "method": method })),
                None,
            )
            .await;
    }
    response
}

/// Bind and serve until the token is cancelled.
pub async fn serve(state: GatewayState, cancel: CancellationToken) -> Result<(), BerthError> {
    let addr = format!(
        "{}:{}",
        state.config.daemon.bind, state.config.daemon.port
    );
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| BerthError::Config(format!("failed to bind gateway to {addr}: {e}")))?;

    info!("gateway listening on {addr}");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<std::net::SocketAddr>(),
    )
    .with_graceful_shutdown(async move { cancel.cancelled().await })
    .await
    .map_err(|e| BerthError::Internal(format!("gateway server error: {e}")))?;

    Ok(())
}
