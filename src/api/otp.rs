// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Email passcode signup endpoints.

use axum::{extract::State, Json};

use crate::{
    error::{ApiError, ApiJson},
    models::{SendOtpRequest, SuccessResponse, VerifyOtpRequest},
    otp::SignupRequest,
    state::AppState,
};

/// Send a six-digit verification code to an email address.
///
/// Any earlier code for the address stops working. If the mail cannot be
/// delivered the request fails, but the stored code is kept.
#[utoipa::path(
    post,
    path = "/send-otp",
    request_body = SendOtpRequest,
    tag = "Signup",
    responses(
        (status = 200, description = "Code stored and sent", body = SuccessResponse),
        (status = 400, description = "Malformed email"),
        (status = 500, description = "Failed to send email")
    )
)]
pub async fn send_otp(
    State(state): State<AppState>,
    ApiJson(request): ApiJson<SendOtpRequest>,
) -> Result<Json<SuccessResponse>, ApiError> {
    state.otp.issue(&request.email).await?;
    Ok(Json(SuccessResponse::ok()))
}

/// Verify a code and create the account.
#[utoipa::path(
    post,
    path = "/verify-otp",
    request_body = VerifyOtpRequest,
    tag = "Signup",
    responses(
        (status = 200, description = "Account created", body = SuccessResponse),
        (status = 400, description = "Invalid verification code or profile"),
        (status = 409, description = "An account already exists for this email")
    )
)]
pub async fn verify_otp(
    State(state): State<AppState>,
    ApiJson(request): ApiJson<VerifyOtpRequest>,
) -> Result<Json<SuccessResponse>, ApiError> {
    state
        .otp
        .verify(SignupRequest {
            email: request.email,
            code: request.otp,
            name: request.name,
            password: request.password,
            phone: request.phone,
            college_name: request.college_name,
        })
        .await?;
    Ok(Json(SuccessResponse::ok()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::test_support::TestContext;
    use crate::storage::{OtpRepository, UserRepository};
    use axum::http::StatusCode;
    use chrono::TimeDelta;

    fn sent_code(ctx: &TestContext) -> String {
        let mail = ctx.mailer.sent().pop().unwrap();
        mail.body.rsplit(' ').next().unwrap().to_string()
    }

    fn verify_body(email: &str, otp: &str) -> VerifyOtpRequest {
        VerifyOtpRequest {
            email: email.into(),
            otp: otp.into(),
            name: "Asha Rao".into(),
            password: "secret12".into(),
            phone: None,
            college_name: Some("IIT Test".into()),
        }
    }

    #[tokio::test]
    async fn signup_round_trip() {
        let ctx = TestContext::new();

        let Json(sent) = send_otp(
            State(ctx.state.clone()),
            ApiJson(SendOtpRequest {
                email: "asha@uni.edu".into(),
            }),
        )
        .await
        .unwrap();
        assert!(sent.success);

        let mail = ctx.mailer.sent().pop().unwrap();
        assert_eq!(mail.to, "asha@uni.edu");
        assert_eq!(mail.subject, "Your Verification Code");
        let code = sent_code(&ctx);
        assert_eq!(code.len(), 6);

        let Json(verified) = verify_otp(State(ctx.state.clone()), ApiJson(verify_body("asha@uni.edu", &code)))
            .await
            .unwrap();
        assert!(verified.success);

        let account = UserRepository::new(&ctx.state.db)
            .find_by_email("asha@uni.edu")
            .unwrap()
            .unwrap();
        assert_eq!(account.full_name, "Asha Rao");
        assert!(OtpRepository::new(&ctx.state.db).get("asha@uni.edu").unwrap().is_none());

        // Single use
        let err = verify_otp(State(ctx.state.clone()), ApiJson(verify_body("asha@uni.edu", &code)))
            .await
            .unwrap_err();
        assert_eq!(err.status, StatusCode::BAD_REQUEST);
        assert_eq!(err.message, "Invalid verification code");
    }

    #[tokio::test]
    async fn expired_code_is_invalid() {
        let ctx = TestContext::new();
        send_otp(
            State(ctx.state.clone()),
            ApiJson(SendOtpRequest {
                email: "asha@uni.edu".into(),
            }),
        )
        .await
        .unwrap();
        let code = sent_code(&ctx);

        ctx.clock.advance(TimeDelta::minutes(11));
        let err = verify_otp(State(ctx.state.clone()), ApiJson(verify_body("asha@uni.edu", &code)))
            .await
            .unwrap_err();
        assert_eq!(err.status, StatusCode::BAD_REQUEST);
        assert_eq!(err.message, "Invalid verification code");
    }

    #[tokio::test]
    async fn delivery_failure_is_500_and_keeps_code() {
        let ctx = TestContext::new();
        ctx.mailer.set_failing(true);

        let err = send_otp(
            State(ctx.state.clone()),
            ApiJson(SendOtpRequest {
                email: "asha@uni.edu".into(),
            }),
        )
        .await
        .unwrap_err();
        assert_eq!(err.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.message, "Failed to send email");
        assert!(OtpRepository::new(&ctx.state.db).get("asha@uni.edu").unwrap().is_some());
    }

    #[tokio::test]
    async fn empty_email_is_rejected() {
        let ctx = TestContext::new();
        let err = send_otp(State(ctx.state.clone()), ApiJson(SendOtpRequest { email: "  ".into() }))
            .await
            .unwrap_err();
        assert_eq!(err.status, StatusCode::BAD_REQUEST);
        assert!(ctx.mailer.sent().is_empty());
    }
}
