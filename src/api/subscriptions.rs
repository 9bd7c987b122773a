// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Subscription purchase and listing quota endpoints.
//!
//! A purchase creates an unverified grant plus a pending payment submission.
//! The grant's listings become usable once an administrator approves the
//! payment (see [`super::admin`]).

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};

use crate::{
    auth::Auth,
    error::{ApiError, ApiJson, MarketError},
    events::{Audience, ChangeEvent, ChangeKind},
    models::{
        validate_http_url, QuotaResponse, ResubmitPaymentRequest, SubmitPaymentRequest,
        SubmitPaymentResponse, SubscriptionView,
    },
    state::AppState,
    storage::{CatalogRepository, PaymentSubmission, SubscriptionRepository},
};

/// Buy a plan by submitting a payment screenshot.
#[utoipa::path(
    post,
    path = "/v1/subscriptions",
    request_body = SubmitPaymentRequest,
    tag = "Subscriptions",
    security(("bearer_auth" = [])),
    responses(
        (status = 201, description = "Subscription awaiting payment review", body = SubmitPaymentResponse),
        (status = 400, description = "Plan not purchasable or bad screenshot URL"),
        (status = 404, description = "Plan not found")
    )
)]
pub async fn submit_payment(
    Auth(user): Auth,
    State(state): State<AppState>,
    ApiJson(request): ApiJson<SubmitPaymentRequest>,
) -> Result<(StatusCode, Json<SubmitPaymentResponse>), ApiError> {
    let screenshot_url = validate_http_url("Screenshot URL", &request.screenshot_url)?;
    let (grant, submission) = SubscriptionRepository::new(&state.db).submit(
        &user.user_id,
        &request.plan_id,
        &screenshot_url,
        state.now(),
    )?;

    tracing::info!(
        user_id = %user.user_id,
        grant_id = %grant.id,
        submission_id = %submission.id,
        plan_id = %grant.plan_id,
        "Subscription payment submitted"
    );
    state.events.publish(ChangeEvent::new(
        ChangeKind::SubscriptionCreated,
        &grant.id,
        Audience::users([&user.user_id]),
    ));
    state.events.publish(ChangeEvent::new(
        ChangeKind::PaymentSubmitted,
        &submission.id,
        Audience::users([&user.user_id]).with_admins(),
    ));

    Ok((
        StatusCode::CREATED,
        Json(SubmitPaymentResponse {
            subscription: grant,
            payment: submission,
        }),
    ))
}

/// Submit another screenshot for one of the caller's unverified subscriptions.
#[utoipa::path(
    post,
    path = "/v1/subscriptions/{grant_id}/payments",
    params(
        ("grant_id" = String, Path, description = "Subscription to pay for")
    ),
    request_body = ResubmitPaymentRequest,
    tag = "Subscriptions",
    security(("bearer_auth" = [])),
    responses(
        (status = 201, body = PaymentSubmission),
        (status = 403, description = "Subscription belongs to another user"),
        (status = 409, description = "Subscription already verified")
    )
)]
pub async fn resubmit_payment(
    Auth(user): Auth,
    Path(grant_id): Path<String>,
    State(state): State<AppState>,
    ApiJson(request): ApiJson<ResubmitPaymentRequest>,
) -> Result<(StatusCode, Json<PaymentSubmission>), ApiError> {
    let screenshot_url = validate_http_url("Screenshot URL", &request.screenshot_url)?;
    let submission = SubscriptionRepository::new(&state.db).resubmit(
        &user.user_id,
        &grant_id,
        &screenshot_url,
        state.now(),
    )?;

    tracing::info!(
        user_id = %user.user_id,
        grant_id = %grant_id,
        submission_id = %submission.id,
        "Payment resubmitted"
    );
    state.events.publish(ChangeEvent::new(
        ChangeKind::PaymentSubmitted,
        &submission.id,
        Audience::users([&user.user_id]).with_admins(),
    ));

    Ok((StatusCode::CREATED, Json(submission)))
}

/// The caller's subscriptions, newest first.
#[utoipa::path(
    get,
    path = "/v1/subscriptions",
    tag = "Subscriptions",
    security(("bearer_auth" = [])),
    responses((status = 200, body = [SubscriptionView]))
)]
pub async fn list_subscriptions(
    Auth(user): Auth,
    State(state): State<AppState>,
) -> Result<Json<Vec<SubscriptionView>>, ApiError> {
    let grants = SubscriptionRepository::new(&state.db)
        .list_for_user(&user.user_id)
        .map_err(MarketError::from)?;
    let catalog = CatalogRepository::new(&state.db);

    let views = grants
        .into_iter()
        .map(|grant| -> Result<SubscriptionView, MarketError> {
            let plan = catalog.get_plan(&grant.plan_id)?;
            Ok(SubscriptionView { grant, plan })
        })
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Json(views))
}

/// Listings the caller can still publish.
#[utoipa::path(
    get,
    path = "/v1/subscriptions/quota",
    tag = "Subscriptions",
    security(("bearer_auth" = [])),
    responses((status = 200, body = QuotaResponse))
)]
pub async fn get_quota(
    Auth(user): Auth,
    State(state): State<AppState>,
) -> Result<Json<QuotaResponse>, ApiError> {
    let usable_listings = SubscriptionRepository::new(&state.db)
        .usable_listings(&user.user_id)
        .map_err(MarketError::from)?;
    Ok(Json(QuotaResponse { usable_listings }))
}
