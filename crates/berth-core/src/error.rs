// SPDX-FileCopyrightText: 2026 Berth Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types for the berth coordination daemon.

use thiserror::Error;

/// The primary error type used across all berth crates.
///
/// Every variant maps to a stable wire code (see [`BerthError::code`]) that
/// the HTTP surface includes in its `{error, code}` envelope.
#[derive(Debug, Error)]
pub enum BerthError {
    /// Configuration errors (invalid TOML, out-of-range values). Fatal at startup.
    #[error("configuration error: {0}")]
    Config(String),

    /// Malformed input from a caller (bad identity, out-of-range port, unknown enum).
    #[error("validation error: {0}")]
    Validation(String),

    /// A referenced entity does not exist (or has expired, for reads).
    #[error("{kind} not found: {key}")]
    NotFound { kind: &'static str, key: String },

    /// The operation lost to a concurrent holder (lock held, port in use,
    /// file claimed). `detail` carries structured holder/expiry context.
    #[error("conflict: {message}")]
    Conflict {
        message: String,
        detail: Option<serde_json::Value>,
    },

    /// A capacity bound was hit (rate limit, concurrent stream cap, full queue).
    #[error("capacity exceeded: {0}")]
    Capacity(String),

    /// Request body exceeded the configured byte cap.
    #[error("payload too large: {size} bytes (max {max})")]
    PayloadTooLarge { size: usize, max: usize },

    /// Storage backend errors (connection, query, serialization).
    #[error("storage error: {source}")]
    Storage {
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// A retryable failure: busy database after retries, free-port search exhausted.
    #[error("transient failure: {0}")]
    Transient(String),

    /// Internal or unexpected errors.
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<strum::ParseError> for BerthError {
    fn from(e: strum::ParseError) -> Self {
        BerthError::Validation(format!("unknown enum value: {e}"))
    }
}

impl BerthError {
    /// Stable wire code for the `{error, code}` envelope and per-kind metrics.
    pub fn code(&self) -> &'static str {
        match self {
            BerthError::Config(_) => "CONFIG",
            BerthError::Validation(_) => "VALIDATION",
            BerthError::NotFound { .. } => "NOT_FOUND",
            BerthError::Conflict { .. } => "CONFLICT",
            BerthError::Capacity(_) => "CAPACITY",
            BerthError::PayloadTooLarge { .. } => "PAYLOAD_TOO_LARGE",
            BerthError::Storage { .. } => "STORAGE",
            BerthError::Transient(_) => "TRANSIENT",
            BerthError::Internal(_) => "INTERNAL",
        }
    }

    /// Whether a caller may reasonably retry the identical request.
    pub fn retryable(&self) -> bool {
        matches!(self, BerthError::Transient(_) | BerthError::Storage { .. })
    }

    /// Shorthand for a validation error.
    pub fn validation(msg: impl Into<String>) -> Self {
        BerthError::Validation(msg.into())
    }

    /// Shorthand for a not-found error.
    pub fn not_found(kind: &'static str, key: impl Into<String>) -> Self {
        BerthError::NotFound {
            kind,
            key: key.into(),
        }
    }

    /// Conflict without structured detail.
    pub fn conflict(msg: impl Into<String>) -> Self {
        BerthError::Conflict {
            message: msg.into(),
            detail: None,
        }
    }
}
