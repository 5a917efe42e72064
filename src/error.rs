// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Error taxonomy for the custody core, plus the HTTP error envelope.
//!
//! `CoreError` is the single error type the services speak. The split that
//! matters operationally is `GatewayFailure` (the gateway explicitly rejected
//! an operation — terminal) versus `GatewayUnavailable` (network/timeout —
//! inconclusive, eligible for the watcher's retry). `IntegrityError` means a
//! stored invariant was violated; callers fail closed and no funds move.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::storage::ledger_db::LedgerDbError;
use crate::vault::VaultError;

/// Errors produced by the custody core services.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("invalid amount: {0}")]
    InvalidAmount(String),

    #[error("invalid address: {0}")]
    InvalidAddress(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("insufficient available balance")]
    InsufficientFunds,

    #[error("conflict: {0}")]
    Conflict(String),

    /// The gateway explicitly rejected the operation. Terminal.
    #[error("gateway rejected: {reason}")]
    GatewayFailure {
        code: Option<String>,
        reason: String,
    },

    /// The gateway could not be reached or timed out. Inconclusive.
    #[error("gateway unavailable: {0}")]
    GatewayUnavailable(String),

    /// A stored invariant is violated. No funds are moved.
    #[error("integrity violation: {0}")]
    IntegrityError(String),

    #[error("key vault error: {0}")]
    Vault(#[from] VaultError),

    #[error("ledger store error: {0}")]
    Store(#[from] LedgerDbError),
}

/// JSON error envelope returned by the HTTP layer.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(StatusCode::CONFLICT, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }

    pub fn bad_gateway(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_GATEWAY, message)
    }

    pub fn service_unavailable(message: impl Into<String>) -> Self {
        Self::new(StatusCode::SERVICE_UNAVAILABLE, message)
    }
}

impl From<CoreError> for ApiError {
    fn from(err: CoreError) -> Self {
        match &err {
            CoreError::InvalidAmount(_) | CoreError::InvalidAddress(_) => {
                ApiError::bad_request(err.to_string())
            }
            CoreError::NotFound(_) => ApiError::not_found(err.to_string()),
            CoreError::InsufficientFunds | CoreError::Conflict(_) => {
                ApiError::conflict(err.to_string())
            }
            CoreError::GatewayFailure { .. } => ApiError::bad_gateway(err.to_string()),
            CoreError::GatewayUnavailable(_) => ApiError::service_unavailable(err.to_string()),
            CoreError::IntegrityError(_) => {
                tracing::error!(error = %err, "integrity violation surfaced to API");
                ApiError::internal(err.to_string())
            }
            CoreError::Vault(_) | CoreError::Store(_) => {
                tracing::error!(error = %err, "internal error surfaced to API");
                ApiError::internal("internal error")
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(ErrorBody {
            error: self.message,
        });
        (self.status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;

    #[test]
    fn constructors_set_status_and_message() {
        let nf = ApiError::not_found("missing");
        assert_eq!(nf.status, StatusCode::NOT_FOUND);
        assert_eq!(nf.message, "missing");

        let bad = ApiError::bad_request("bad");
        assert_eq!(bad.status, StatusCode::BAD_REQUEST);
        assert_eq!(bad.message, "bad");

        let conflict = ApiError::conflict("busy");
        assert_eq!(conflict.status, StatusCode::CONFLICT);
        assert_eq!(conflict.message, "busy");
    }

    #[test]
    fn core_error_maps_to_expected_status() {
        let cases: Vec<(CoreError, StatusCode)> = vec![
            (
                CoreError::InvalidAmount("zero".into()),
                StatusCode::BAD_REQUEST,
            ),
            (
                CoreError::NotFound("account x".into()),
                StatusCode::NOT_FOUND,
            ),
            (CoreError::InsufficientFunds, StatusCode::CONFLICT),
            (
                CoreError::GatewayFailure {
                    code: None,
                    reason: "rejected".into(),
                },
                StatusCode::BAD_GATEWAY,
            ),
            (
                CoreError::GatewayUnavailable("timeout".into()),
                StatusCode::SERVICE_UNAVAILABLE,
            ),
            (
                CoreError::IntegrityError("bad accrued".into()),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];

        for (err, status) in cases {
            let api: ApiError = err.into();
            assert_eq!(api.status, status);
        }
    }

    #[tokio::test]
    async fn into_response_returns_json_body() {
        let response = ApiError::bad_request("bad data").into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let body_bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = String::from_utf8(body_bytes.to_vec()).unwrap();
        assert_eq!(body, r#"{"error":"bad data"}"#);
    }
}
