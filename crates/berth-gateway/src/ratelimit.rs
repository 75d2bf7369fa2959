// SPDX-FileCopyrightText: 2026 Berth Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Fixed-window per-source rate limiting.
//!
//! Keyed by source IP only: the daemon trusts loopback, so the address is
//! the caller. Refusals carry the standard envelope with status 429.

use std::net::IpAddr;

use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::Response;
use berth_core::{now_ms, BerthError};
use dashmap::DashMap;

use crate::error::ApiError;
use crate::validate::Source;

/// Fixed one-minute windows per source address.
pub struct RateLimiter {
    per_minute: u32,
    windows: DashMap<IpAddr, (i64, u32)>,
}

impl RateLimiter {
    pub fn new(per_minute: u32) -> Self {
        Self {
            per_minute,
            windows: DashMap::new(),
        }
    }

    /// Count one request against the source; `false` means refuse.
    pub fn allow(&self, source: IpAddr, now: i64) -> bool {
        let window = now / 60_000;
        let mut entry = self.windows.entry(source).or_insert((window, 0));
        if entry.0 != window {
            *entry = (window, 0);
        }
        if entry.1 >= self.per_minute {
            return false;
        }
        entry.1 += 1;
        true
    }
}

/// Middleware applying the limiter to every API route.
pub async fn rate_limit_middleware(
    State(state): State<crate::server::GatewayState>,
    source: Source,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    if !state.limiter.allow(source.0, now_ms()) {
        metrics::counter!("berth_rate_limited_total").increment(1);
        return Err(ApiError(BerthError::Capacity(format!(
            "rate limit exceeded for {}",
            source.0
        ))));
    }
    Ok(next.run(request).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    #[test]
    fn allows_up_to_the_cap_per_window() {
        let limiter = RateLimiter::new(3);
        let source = IpAddr::V4(Ipv4Addr::LOCALHOST);
        let now = 1_700_000_000_000;

        assert!(limiter.allow(source, now));
        assert!(limiter.allow(source, now + 1));
        assert!(limiter.allow(source, now + 2));
        assert!(!limiter.allow(source, now + 3), "fourth refused");
    }

    #[test]
    fn window_rollover_resets_the_count() {
        let limiter = RateLimiter::new(1);
        let source = IpAddr::V4(Ipv4Addr::LOCALHOST);
        let now = 1_700_000_000_000;

        assert!(limiter.allow(source, now));
        assert!(!limiter.allow(source, now + 1));
        assert!(limiter.allow(source, now + 60_000), "next minute");
    }

    #[test]
    fn sources_are_independent() {
        let limiter = RateLimiter::new(1);
        let now = 1_700_000_000_000;
        assert!(limiter.allow(IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1)), now));
        assert!(limiter.allow(IpAddr::V4(Ipv4Addr::new(10, 0, 0, 2)), now));
        assert!(!limiter.allow(IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1)), now + 1));
    }
}
