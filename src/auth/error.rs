// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Session and credential errors.
//!
//! Rendered through [`ApiError`] so auth failures share the JSON error body
//! of every other endpoint.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};

use crate::error::ApiError;

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("Authorization header is required")]
    MissingToken,

    #[error("Invalid authorization header format (expected 'Bearer <token>')")]
    BadScheme,

    #[error("Session token is malformed")]
    MalformedToken,

    #[error("Session token signature is invalid")]
    BadSignature,

    #[error("Session has expired")]
    SessionExpired,

    #[error("Session token was not issued by this server")]
    ForeignIssuer,

    /// Unknown email and wrong password are reported identically.
    #[error("Invalid email or password")]
    InvalidCredentials,

    #[error("Administrator access required")]
    NotAdmin,

    #[error("Internal authentication error: {0}")]
    Internal(String),
}

impl AuthError {
    pub fn error_code(&self) -> &'static str {
        match self {
            AuthError::MissingToken => "missing_token",
            AuthError::BadScheme => "bad_auth_scheme",
            AuthError::MalformedToken => "malformed_token",
            AuthError::BadSignature => "bad_signature",
            AuthError::SessionExpired => "session_expired",
            AuthError::ForeignIssuer => "foreign_issuer",
            AuthError::InvalidCredentials => "invalid_credentials",
            AuthError::NotAdmin => "admin_required",
            AuthError::Internal(_) => "internal_error",
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            AuthError::NotAdmin => StatusCode::FORBIDDEN,
            AuthError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            _ => StatusCode::UNAUTHORIZED,
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        ApiError::from(self).into_response()
    }
}
