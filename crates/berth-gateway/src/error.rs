// SPDX-FileCopyrightText: 2026 Berth Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The `{error, code}` envelope.
//!
//! Conflict details (current holder, expiry) are flattened into the
//! envelope root so callers can read `holder` without unwrapping. The
//! stable code is also stashed in response extensions for the error
//! tracking middleware.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use berth_core::BerthError;

/// Stable error code attached to error responses, readable by middleware.
#[derive(Debug, Clone)]
pub struct ErrorCode(pub &'static str);

/// Wrapper turning a [`BerthError`] into the wire envelope.
#[derive(Debug)]
pub struct ApiError(pub BerthError);

impl<E> From<E> for ApiError
where
    E: Into<BerthError>,
{
    fn from(err: E) -> Self {
        ApiError(err.into())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            BerthError::Validation(_) => StatusCode::BAD_REQUEST,
            BerthError::NotFound { .. } => StatusCode::NOT_FOUND,
            BerthError::Conflict { .. } => StatusCode::CONFLICT,
            BerthError::Capacity(_) => StatusCode::TOO_MANY_REQUESTS,
            BerthError::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            BerthError::Config(_)
            | BerthError::Storage { .. }
            | BerthError::Transient(_)
            | BerthError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let code = self.0.code();
        let mut body = serde_json::json!({
            "error": self.0.to_string(),
            "code": code,
        });
        if self.0.retryable() {
            body["retryable"] = serde_json::Value::Bool(true);
        }
        if let BerthError::Conflict {
            detail: Some(detail),
            ..
        } = &self.0
        {
            if let (Some(body_map), Some(detail_map)) = (body.as_object_mut(), detail.as_object())
            {
                for (key, value) in detail_map {
                    body_map.insert(key.clone(), value.clone());
                }
            }
        }

        let mut response = (status, Json(body)).into_response();
        response.extensions_mut().insert(ErrorCode(code));
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn body_of(response: Response) -> serde_json::Value {
        let body = futures::executor::block_on(axum::body::to_bytes(
            response.into_body(),
            64 * 1024,
        ))
        .unwrap();
        serde_json::from_slice(&body).unwrap()
    }

    #[test]
    fn validation_maps_to_400_with_code() {
        let response = ApiError(BerthError::validation("bad identity")).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_of(response);
        assert_eq!(body["code"], "VALIDATION");
        assert!(body["error"].as_str().unwrap().contains("bad identity"));
    }

    #[test]
    fn conflict_detail_is_flattened() {
        let err = BerthError::Conflict {
            message: "lock held".to_string(),
            detail: Some(serde_json::json!({ "holder": "A", "expiresAt": 123 })),
        };
        let response = ApiError(err).into_response();
        assert_eq!(response.status(), StatusCode::CONFLICT);
        let body = body_of(response);
        assert_eq!(body["holder"], "A");
        assert_eq!(body["expiresAt"], 123);
        assert_eq!(body["code"], "CONFLICT");
    }

    #[test]
    fn transient_carries_retryable_flag() {
        let response = ApiError(BerthError::Transient("busy".into())).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = body_of(response);
        assert_eq!(body["retryable"], true);
    }

    #[test]
    fn capacity_maps_to_429() {
        let response = ApiError(BerthError::Capacity("rate".into())).into_response();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    }
}
