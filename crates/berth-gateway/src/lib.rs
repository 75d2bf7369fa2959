// SPDX-FileCopyrightText: 2026 Berth Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP surface for the berth coordination daemon.
//!
//! A REST-shaped mapping from kernel operations to verbs and paths, plus
//! one SSE stream per subscription. Every request is rate limited by
//! source, validated against per-endpoint schemas, and answered with a
//! stable `{success, ...}` or `{error, code}` JSON shape.

pub mod error;
pub mod handlers;
pub mod ratelimit;
pub mod server;
pub mod sse;
pub mod validate;

pub use error::ApiError;
pub use ratelimit::RateLimiter;
pub use server::{build_router, serve, GatewayState, HealthState};
