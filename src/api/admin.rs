// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Admin-only API endpoints for payment review.
//!
//! These endpoints require the Admin role and provide:
//! - The pending payment queue
//! - Approve / reject actions
//! - Dashboard counters

use axum::{
    extract::{Path, State},
    Json,
};

use crate::{
    auth::{AdminOnly, AuthenticatedUser},
    error::{ApiError, ApiJson, MarketError},
    events::{Audience, ChangeEvent, ChangeKind},
    mail::{templates, OutgoingEmail},
    models::{AdminStats, ApproveResponse, PendingPaymentView, ProfileView, RejectRequest},
    state::AppState,
    storage::{
        ApprovalOutcome, CatalogRepository, PaymentSubmission, ProductRepository,
        SubscriptionRepository, UserRepository,
    },
};

const MAX_REASON_CHARS: usize = 500;

// ============================================================================
// Handlers
// ============================================================================

/// List payments awaiting review, newest first.
///
/// Each entry carries its subscription, plan and the submitter's profile.
#[utoipa::path(
    get,
    path = "/v1/admin/payments/pending",
    tag = "Admin",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Pending payments", body = [PendingPaymentView]),
        (status = 401, description = "Not authenticated"),
        (status = 403, description = "Not authorized (admin required)")
    )
)]
pub async fn list_pending_payments(
    AdminOnly(_admin): AdminOnly,
    State(state): State<AppState>,
) -> Result<Json<Vec<PendingPaymentView>>, ApiError> {
    let subscriptions = SubscriptionRepository::new(&state.db);
    let catalog = CatalogRepository::new(&state.db);
    let users = UserRepository::new(&state.db);

    let pending = subscriptions.list_pending().map_err(MarketError::from)?;
    let mut views = Vec::with_capacity(pending.len());
    for payment in pending {
        let enriched = subscriptions.get_grant(&payment.subscription_id).and_then(|grant| {
            let plan = catalog.get_plan(&grant.plan_id)?;
            let user = users.get(&payment.user_id)?;
            Ok((grant, plan, user))
        });
        match enriched {
            Ok((subscription, plan, user)) => views.push(PendingPaymentView {
                payment,
                subscription,
                plan,
                user: ProfileView::from(&user),
            }),
            Err(MarketError::NotFound(what)) => {
                tracing::warn!(submission_id = %payment.id, missing = %what, "Skipping orphaned payment");
            }
            Err(e) => return Err(e.into()),
        }
    }
    Ok(Json(views))
}

/// Approve a payment.
///
/// Verifies the subscription (granting the plan's listings once), marks the
/// payment verified and removes the subscription's other pending payments,
/// all in one transaction. Re-approving is harmless and sends no mail.
#[utoipa::path(
    post,
    path = "/v1/admin/payments/{submission_id}/approve",
    params(
        ("submission_id" = String, Path, description = "Payment submission to approve")
    ),
    tag = "Admin",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Payment approved", body = ApproveResponse),
        (status = 404, description = "Submission, subscription or plan missing"),
        (status = 409, description = "Submission was rejected"),
        (status = 500, description = "Approval failed; error_code names the step")
    )
)]
pub async fn approve_payment(
    AdminOnly(admin): AdminOnly,
    Path(submission_id): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<ApproveResponse>, ApiError> {
    let outcome =
        SubscriptionRepository::new(&state.db).approve(&submission_id, &admin.user_id, state.now())?;

    tracing::info!(
        admin_id = %admin.user_id,
        submission_id = %outcome.submission.id,
        grant_id = %outcome.grant.id,
        newly_verified = outcome.newly_verified,
        pruned = outcome.pruned.len(),
        "Payment approved"
    );
    state.events.publish(ChangeEvent::new(
        ChangeKind::PaymentApproved,
        &outcome.submission.id,
        Audience::users([&outcome.submission.user_id]).with_admins(),
    ));

    if outcome.newly_verified {
        notify_approval(&state, &admin, &outcome).await;
    }

    Ok(Json(ApproveResponse {
        submission: outcome.submission,
        subscription: outcome.grant,
        newly_verified: outcome.newly_verified,
        pruned: outcome.pruned,
    }))
}

/// Reject a payment. The subscription stays unverified and can be paid again.
#[utoipa::path(
    post,
    path = "/v1/admin/payments/{submission_id}/reject",
    params(
        ("submission_id" = String, Path, description = "Payment submission to reject")
    ),
    request_body = RejectRequest,
    tag = "Admin",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Payment rejected", body = PaymentSubmission),
        (status = 404, description = "Submission not found"),
        (status = 409, description = "Submission already verified")
    )
)]
pub async fn reject_payment(
    AdminOnly(admin): AdminOnly,
    Path(submission_id): Path<String>,
    State(state): State<AppState>,
    ApiJson(request): ApiJson<RejectRequest>,
) -> Result<Json<PaymentSubmission>, ApiError> {
    let reason = request.reason.map(|r| r.trim().to_string());
    if reason.as_ref().is_some_and(|r| r.chars().count() > MAX_REASON_CHARS) {
        return Err(MarketError::validation(format!(
            "Reason must be at most {MAX_REASON_CHARS} characters"
        ))
        .into());
    }

    let submission = SubscriptionRepository::new(&state.db).reject(
        &submission_id,
        &admin.user_id,
        reason,
        state.now(),
    )?;

    tracing::info!(admin_id = %admin.user_id, submission_id = %submission.id, "Payment rejected");
    state.events.publish(ChangeEvent::new(
        ChangeKind::PaymentRejected,
        &submission.id,
        Audience::users([&submission.user_id]).with_admins(),
    ));
    Ok(Json(submission))
}

/// Review dashboard counters.
#[utoipa::path(
    get,
    path = "/v1/admin/stats",
    tag = "Admin",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Dashboard counters", body = AdminStats),
        (status = 401, description = "Not authenticated"),
        (status = 403, description = "Not authorized (admin required)")
    )
)]
pub async fn get_stats(
    AdminOnly(_admin): AdminOnly,
    State(state): State<AppState>,
) -> Result<Json<AdminStats>, ApiError> {
    let payments = SubscriptionRepository::new(&state.db)
        .payment_stats(state.now())
        .map_err(MarketError::from)?;
    let (total_products, active_sellers) = ProductRepository::new(&state.db)
        .counts()
        .map_err(MarketError::from)?;

    Ok(Json(AdminStats {
        pending_payments: payments.pending_payments,
        pending_today: payments.pending_today,
        verified_subscriptions: payments.verified_subscriptions,
        total_revenue_inr: payments.total_revenue_inr,
        active_sellers,
        total_products,
        verified_last_7_days: payments.verified_last_7_days,
    }))
}

// ============================================================================
// Notifications
// ============================================================================

/// Mail the member and the operations mailbox. Failures are logged only;
/// the approval itself has already committed.
async fn notify_approval(state: &AppState, admin: &AuthenticatedUser, outcome: &ApprovalOutcome) {
    let user = match UserRepository::new(&state.db).get(&outcome.submission.user_id) {
        Ok(user) => user,
        Err(e) => {
            tracing::warn!(error = %e, submission_id = %outcome.submission.id, "Approval mail skipped");
            return;
        }
    };

    let mut mails = vec![templates::payment_approved_user(&user, &outcome.plan, &outcome.grant)];
    if let Some(ops) = &state.admin_notify_email {
        mails.push(templates::payment_approved_ops(
            ops,
            &user,
            &outcome.plan,
            &outcome.submission,
            &admin.user_id,
        ));
    }
    for mail in mails {
        send_logged(state, mail).await;
    }
}

async fn send_logged(state: &AppState, mail: OutgoingEmail) {
    let to = mail.to.clone();
    if let Err(e) = state.mailer.send(mail).await {
        tracing::warn!(error = %e, to = %to, "Approval notification not delivered");
    }
}
