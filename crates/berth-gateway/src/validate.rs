// SPDX-FileCopyrightText: 2026 Berth Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Request validation: the JSON extractor and parameter checks.
//!
//! Request DTOs carry `#[serde(deny_unknown_fields)]`, so an unrecognized
//! body field is a 400, never silently accepted.

use axum::async_trait;
use axum::body::Bytes;
use axum::extract::{FromRequest, FromRequestParts, Request};
use axum::http::request::Parts;
use axum::http::StatusCode;
use berth_core::BerthError;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::de::DeserializeOwned;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};

use crate::error::ApiError;

static CHANNEL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9._:-]{1,128}$").expect("channel regex compiles"));

static LOCK_NAME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9._:-]{1,128}$").expect("lock name regex compiles"));

/// JSON body extractor producing enveloped 400s.
///
/// An absent or empty body deserializes as `{}` so endpoints with all-
/// optional fields accept bare requests.
pub struct ValidJson<T>(pub T);

#[async_trait]
impl<S, T> FromRequest<S> for ValidJson<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let bytes = match Bytes::from_request(req, state).await {
            Ok(bytes) => bytes,
            Err(rejection) => {
                if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
                    return Err(ApiError(BerthError::PayloadTooLarge { size: 0, max: 0 }));
                }
                return Err(ApiError(BerthError::validation(format!(
                    "unreadable request body: {rejection}"
                ))));
            }
        };
        let slice: &[u8] = if bytes.is_empty() { b"{}" } else { &bytes };
        let value = serde_json::from_slice(slice)
            .map_err(|e| BerthError::validation(format!("invalid request body: {e}")))?;
        Ok(ValidJson(value))
    }
}

/// Source address of the request, defaulting to loopback when the service
/// was built without connect info (router unit tests).
#[derive(Debug, Clone, Copy)]
pub struct Source(pub IpAddr);

#[async_trait]
impl<S> FromRequestParts<S> for Source
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let addr = parts
            .extensions
            .get::<axum::extract::ConnectInfo<SocketAddr>>()
            .map(|info| info.0.ip())
            .unwrap_or(IpAddr::V4(Ipv4Addr::LOCALHOST));
        Ok(Source(addr))
    }
}

/// Channel names: like identities but with `:` unrestricted.
pub fn check_channel(channel: &str) -> Result<(), BerthError> {
    if !CHANNEL_RE.is_match(channel) {
        return Err(BerthError::validation(format!(
            "invalid channel name `{channel}`"
        )));
    }
    Ok(())
}

pub fn check_lock_name(name: &str) -> Result<(), BerthError> {
    if !LOCK_NAME_RE.is_match(name) {
        return Err(BerthError::validation(format!("invalid lock name `{name}`")));
    }
    Ok(())
}

pub fn check_port(port: u16) -> Result<(), BerthError> {
    if port < 1024 {
        return Err(BerthError::validation(format!(
            "port must be in [1024, 65535], got {port}"
        )));
    }
    Ok(())
}

pub fn check_pid(pid: i64) -> Result<(), BerthError> {
    if !(1..=99_999).contains(&pid) {
        return Err(BerthError::validation(format!(
            "pid must be in [1, 99999], got {pid}"
        )));
    }
    Ok(())
}

/// Clamp caller-supplied limits into [1, 1000], defaulting to 100.
pub fn clamp_limit(limit: Option<i64>) -> i64 {
    limit.unwrap_or(100).clamp(1, 1000)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channel_names() {
        assert!(check_channel("builds").is_ok());
        assert!(check_channel("service.ready").is_ok());
        assert!(check_channel("myapp:api").is_ok());
        assert!(check_channel("").is_err());
        assert!(check_channel("has space").is_err());
        assert!(check_channel(&"x".repeat(200)).is_err());
    }

    #[test]
    fn pid_bounds() {
        assert!(check_pid(1).is_ok());
        assert!(check_pid(99_999).is_ok());
        assert!(check_pid(0).is_err());
        assert!(check_pid(100_000).is_err());
    }

    #[test]
    fn port_bounds() {
        assert!(check_port(1024).is_ok());
        assert!(check_port(65_535).is_ok());
        assert!(check_port(80).is_err());
    }

    #[test]
    fn limit_clamping() {
        assert_eq!(clamp_limit(None), 100);
        assert_eq!(clamp_limit(Some(5)), 5);
        assert_eq!(clamp_limit(Some(0)), 1);
        assert_eq!(clamp_limit(Some(10_000)), 1000);
    }
}
