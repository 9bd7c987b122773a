// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use std::fmt;

use axum::{
    extract::{rejection::JsonRejection, FromRequest},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::auth::AuthError;
use crate::mail::MailError;
use crate::storage::DbError;

// =============================================================================
// Domain Errors
// =============================================================================

/// Step of a payment approval that failed.
///
/// Approval runs in one write transaction, so a failure at any step leaves
/// both the grant and the submission exactly as they were.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApprovalStep {
    Grant,
    Submission,
    Prune,
    Commit,
}

impl ApprovalStep {
    pub fn error_code(&self) -> &'static str {
        match self {
            ApprovalStep::Grant => "grant_update_failed",
            ApprovalStep::Submission => "submission_update_failed",
            ApprovalStep::Prune => "prune_failed",
            ApprovalStep::Commit => "commit_failed",
        }
    }
}

impl fmt::Display for ApprovalStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApprovalStep::Grant => write!(f, "subscription grant update"),
            ApprovalStep::Submission => write!(f, "payment submission update"),
            ApprovalStep::Prune => write!(f, "duplicate submission pruning"),
            ApprovalStep::Commit => write!(f, "approval commit"),
        }
    }
}

/// Marketplace workflow errors.
#[derive(Debug, thiserror::Error)]
pub enum MarketError {
    #[error("{0}")]
    Validation(String),

    /// Absent, mismatched and expired codes are deliberately indistinguishable.
    #[error("Invalid verification code")]
    InvalidCode,

    #[error("Failed to send email: {0}")]
    Delivery(#[from] MailError),

    #[error("{0} not found")]
    NotFound(String),

    #[error("No listings remaining. Purchase a subscription to publish more listings.")]
    QuotaExhausted,

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("{step} failed: {source}; no changes were committed")]
    Approval {
        step: ApprovalStep,
        #[source]
        source: Box<MarketError>,
    },

    #[error("internal error: {0}")]
    Internal(String),

    #[error(transparent)]
    Storage(#[from] DbError),
}

pub type MarketResult<T> = Result<T, MarketError>;

impl MarketError {
    pub fn validation(message: impl Into<String>) -> Self {
        MarketError::Validation(message.into())
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        MarketError::NotFound(what.into())
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        MarketError::Conflict(message.into())
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        MarketError::Forbidden(message.into())
    }

    /// Tag an error with the approval step it happened in.
    pub fn approval(step: ApprovalStep, error: impl Into<MarketError>) -> Self {
        match error.into() {
            already @ MarketError::Approval { .. } => already,
            other => MarketError::Approval {
                step,
                source: Box::new(other),
            },
        }
    }
}

macro_rules! storage_error_from {
    ($($ty:ty),* $(,)?) => {
        $(
            impl From<$ty> for MarketError {
                fn from(e: $ty) -> Self {
                    MarketError::Storage(DbError::from(e))
                }
            }
        )*
    };
}

storage_error_from!(
    redb::Error,
    redb::DatabaseError,
    redb::TransactionError,
    redb::TableError,
    redb::StorageError,
    redb::CommitError,
    serde_json::Error,
);

// =============================================================================
// HTTP Errors
// =============================================================================

#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
    pub code: Option<&'static str>,
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    error_code: Option<&'static str>,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            code: None,
        }
    }

    pub fn with_code(mut self, code: &'static str) -> Self {
        self.code = Some(code);
        self
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }
}

impl From<MarketError> for ApiError {
    fn from(error: MarketError) -> Self {
        match error {
            MarketError::Validation(message) => {
                ApiError::bad_request(message).with_code("validation_error")
            }
            MarketError::InvalidCode => {
                ApiError::bad_request("Invalid verification code").with_code("invalid_code")
            }
            MarketError::Delivery(e) => {
                tracing::warn!(error = %e, "Mail delivery failed");
                ApiError::internal("Failed to send email").with_code("delivery_error")
            }
            MarketError::NotFound(what) => {
                ApiError::not_found(format!("{what} not found")).with_code("not_found")
            }
            e @ MarketError::QuotaExhausted => {
                ApiError::new(StatusCode::PAYMENT_REQUIRED, e.to_string()).with_code("quota_exhausted")
            }
            MarketError::Conflict(message) => {
                ApiError::new(StatusCode::CONFLICT, message).with_code("conflict")
            }
            MarketError::Forbidden(message) => {
                ApiError::new(StatusCode::FORBIDDEN, message).with_code("forbidden")
            }
            MarketError::Approval { step, source } => {
                let status = match source.as_ref() {
                    MarketError::NotFound(_) => StatusCode::NOT_FOUND,
                    MarketError::Conflict(_) => StatusCode::CONFLICT,
                    _ => StatusCode::INTERNAL_SERVER_ERROR,
                };
                tracing::error!(step = %step, error = %source, "Payment approval failed");
                ApiError::new(status, format!("{step} failed: {source}; no changes were committed"))
                    .with_code(step.error_code())
            }
            MarketError::Internal(message) => {
                tracing::error!(error = %message, "Internal error");
                ApiError::internal("Internal server error").with_code("internal_error")
            }
            MarketError::Storage(e) => {
                tracing::error!(error = %e, "Storage failure");
                ApiError::internal("Internal storage error").with_code("storage_error")
            }
        }
    }
}

impl From<AuthError> for ApiError {
    fn from(error: AuthError) -> Self {
        let message = match &error {
            AuthError::Internal(detail) => {
                tracing::error!(error = %detail, "Authentication internal error");
                "Internal server error".to_string()
            }
            other => other.to_string(),
        };
        ApiError::new(error.status_code(), message).with_code(error.error_code())
    }
}

/// Unreadable or incomplete bodies are validation failures like any other.
impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        MarketError::validation(rejection.body_text()).into()
    }
}

/// JSON request body whose rejection uses the API error body.
#[derive(Debug, FromRequest)]
#[from_request(via(Json), rejection(ApiError))]
pub struct ApiJson<T>(pub T);

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(ErrorBody {
            error: self.message,
            error_code: self.code,
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
    }

    #[tokio::test]
    async fn into_response_returns_json_body() {
        let response = ApiError::bad_request("bad data").into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let body_bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = String::from_utf8(body_bytes.to_vec()).unwrap();
        assert_eq!(body, r#"{"error":"bad data"}"#);
    }

    #[test]
    fn market_errors_map_to_statuses() {
        let cases = [
            (MarketError::validation("email is required"), StatusCode::BAD_REQUEST),
            (MarketError::InvalidCode, StatusCode::BAD_REQUEST),
            (MarketError::not_found("Plan p1"), StatusCode::NOT_FOUND),
            (MarketError::QuotaExhausted, StatusCode::PAYMENT_REQUIRED),
            (MarketError::conflict("taken"), StatusCode::CONFLICT),
            (MarketError::forbidden("not yours"), StatusCode::FORBIDDEN),
        ];
        for (error, status) in cases {
            assert_eq!(ApiError::from(error).status, status);
        }
    }

    #[test]
    fn invalid_code_message_is_uniform() {
        let api = ApiError::from(MarketError::InvalidCode);
        assert_eq!(api.message, "Invalid verification code");
    }

    #[test]
    fn delivery_error_hides_transport_detail() {
        let api = ApiError::from(MarketError::Delivery(MailError::Transport(
            "connection refused".into(),
        )));
        assert_eq!(api.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(api.message, "Failed to send email");
    }

    #[test]
    fn approval_errors_name_the_failing_step() {
        let grant = ApiError::from(MarketError::approval(
            ApprovalStep::Grant,
            MarketError::not_found("Subscription s1"),
        ));
        assert_eq!(grant.status, StatusCode::NOT_FOUND);
        assert_eq!(grant.code, Some("grant_update_failed"));
        assert!(grant.message.starts_with("subscription grant update failed"));

        let submission = ApiError::from(MarketError::approval(
            ApprovalStep::Submission,
            MarketError::Internal("disk full".into()),
        ));
        assert_eq!(submission.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(submission.code, Some("submission_update_failed"));
    }

    #[test]
    fn auth_errors_keep_status_and_code() {
        let api = ApiError::from(AuthError::InvalidCredentials);
        assert_eq!(api.status, StatusCode::UNAUTHORIZED);
        assert_eq!(api.message, "Invalid email or password");
        assert_eq!(api.code, Some("invalid_credentials"));

        let internal = ApiError::from(AuthError::Internal("rng failure".into()));
        assert_eq!(internal.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(!internal.message.contains("rng"));
    }

    #[test]
    fn approval_tag_is_not_nested() {
        let inner = MarketError::approval(ApprovalStep::Grant, MarketError::InvalidCode);
        let outer = MarketError::approval(ApprovalStep::Commit, inner);
        match outer {
            MarketError::Approval { step, .. } => assert_eq!(step, ApprovalStep::Grant),
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
