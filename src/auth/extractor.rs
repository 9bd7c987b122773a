// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Axum extractors for authenticated users.
//!
//! Use the `Auth` extractor in handlers to require a session:
//!
//! ```rust,ignore
//! async fn my_handler(Auth(user): Auth) -> impl IntoResponse {
//!     // user is AuthenticatedUser
//! }
//! ```

use axum::{
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts},
};

use super::{AuthError, AuthenticatedUser, Role};
use crate::state::AppState;
use crate::storage::UserRepository;

/// Extractor for authenticated users.
///
/// Validates the server-issued session token from the Authorization header.
///
/// # Example
///
/// ```rust,ignore
/// async fn list_subscriptions(
///     Auth(user): Auth,
///     State(state): State<AppState>,
/// ) -> Result<Json<Vec<SubscriptionView>>, ApiError> {
///     // user.user_id contains the authenticated account ID
/// }
/// ```
pub struct Auth(pub AuthenticatedUser);

impl FromRequestParts<AppState> for Auth {
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        if let Some(user) = parts.extensions.get::<AuthenticatedUser>().cloned() {
            return Ok(Auth(user));
        }

        let auth_header = parts
            .headers
            .get(AUTHORIZATION)
            .ok_or(AuthError::MissingToken)?
            .to_str()
            .map_err(|_| AuthError::BadScheme)?;

        let token = auth_header
            .strip_prefix("Bearer ")
            .ok_or(AuthError::BadScheme)?;

        let user = state.tokens.verify(token)?;
        parts.extensions.insert(user.clone());
        Ok(Auth(user))
    }
}

/// Extractor that requires admin role.
///
/// The token's role is re-checked against the stored account, so a demoted
/// administrator loses access before their session expires.
pub struct AdminOnly(pub AuthenticatedUser);

impl FromRequestParts<AppState> for AdminOnly {
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let Auth(user) = Auth::from_request_parts(parts, state).await?;

        if !user.has_role(Role::Admin) {
            return Err(AuthError::NotAdmin);
        }

        let account = UserRepository::new(&state.db)
            .find(&user.user_id)
            .map_err(|e| AuthError::Internal(e.to_string()))?;
        match account {
            Some(account) if account.is_admin() => Ok(AdminOnly(user)),
            _ => {
                tracing::warn!(user_id = %user.user_id, "Admin token for non-admin account");
                Err(AuthError::NotAdmin)
            }
        }
    }
}
