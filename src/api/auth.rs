// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Session login.

use axum::{extract::State, Json};

use crate::{
    auth::{verify_password, AuthError},
    error::{ApiError, ApiJson, MarketError},
    models::{LoginRequest, LoginResponse, ProfileView},
    otp::normalize_email,
    state::AppState,
    storage::UserRepository,
};

/// Exchange email and password for a session token.
///
/// Unknown emails and wrong passwords produce the same 401.
#[utoipa::path(
    post,
    path = "/v1/auth/login",
    request_body = LoginRequest,
    tag = "Auth",
    responses(
        (status = 200, description = "Session issued", body = LoginResponse),
        (status = 401, description = "Invalid email or password")
    )
)]
pub async fn login(
    State(state): State<AppState>,
    ApiJson(request): ApiJson<LoginRequest>,
) -> Result<Json<LoginResponse>, ApiError> {
    let email = normalize_email(&request.email).map_err(|_| AuthError::InvalidCredentials)?;
    let account = UserRepository::new(&state.db)
        .find_by_email(&email)
        .map_err(MarketError::from)?
        .ok_or(AuthError::InvalidCredentials)?;

    let password = request.password;
    let encoded = account.password_hash.clone();
    let valid = tokio::task::spawn_blocking(move || verify_password(&password, &encoded))
        .await
        .map_err(|e| AuthError::Internal(format!("password check task failed: {e}")))?;
    if !valid {
        tracing::info!(user_id = %account.id, "Login rejected");
        return Err(AuthError::InvalidCredentials.into());
    }

    let issued = state.tokens.issue(&account.id, account.role, state.now())?;
    tracing::info!(user_id = %account.id, role = %account.role, "Session issued");

    Ok(Json(LoginResponse {
        token: issued.token,
        expires_at: issued.expires_at,
        user: ProfileView::from(&account),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::Role;
    use crate::state::test_support::{TestContext, TEST_PASSWORD};
    use axum::http::StatusCode;

    fn body(email: &str, password: &str) -> ApiJson<LoginRequest> {
        ApiJson(LoginRequest {
            email: email.into(),
            password: password.into(),
        })
    }

    #[tokio::test]
    async fn login_issues_verifiable_token() {
        let ctx = TestContext::new();
        let account = ctx.member("asha@uni.edu");

        let Json(response) = login(State(ctx.state.clone()), body("ASHA@uni.edu", TEST_PASSWORD))
            .await
            .unwrap();
        assert_eq!(response.user.id, account.id);

        let user = ctx.state.tokens.verify(&response.token).unwrap();
        assert_eq!(user.user_id, account.id);
        assert_eq!(user.role, Role::Member);
    }

    #[tokio::test]
    async fn wrong_password_and_unknown_email_look_the_same() {
        let ctx = TestContext::new();
        ctx.member("asha@uni.edu");

        let wrong = login(State(ctx.state.clone()), body("asha@uni.edu", "nope-nope"))
            .await
            .unwrap_err();
        let unknown = login(State(ctx.state.clone()), body("ghost@uni.edu", TEST_PASSWORD))
            .await
            .unwrap_err();

        assert_eq!(wrong.status, StatusCode::UNAUTHORIZED);
        assert_eq!(wrong.status, unknown.status);
        assert_eq!(wrong.message, unknown.message);
    }
}
