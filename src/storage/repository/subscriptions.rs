// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Subscription grants and payment submissions.
//!
//! ## Grant lifecycle
//!
//! A grant is created unverified together with its first payment submission.
//! An administrator approval moves it to verified exactly once, setting
//! `listings_remaining` to the plan allotment. Listing creation then consumes
//! the allotment one unit at a time, never below zero.
//!
//! ```text
//! PendingPayment ──approve──▶ Verified ──list──▶ Verified(remaining - 1)
//! ```
//!
//! Submissions move from pending to either verified or rejected. Approving a
//! grant deletes its other pending submissions.

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::error::{ApprovalStep, MarketError, MarketResult};
use crate::storage::database::{
    get_json, put_json, scan_json, DbResult, JsonTable, MarketDb, GRANTS, PLANS, SUBMISSIONS,
};

use super::catalog::{PlanType, SubscriptionPlan};

/// Listing quota bought by one user under one plan.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
pub struct SubscriptionGrant {
    pub id: String,
    pub user_id: String,
    pub plan_id: String,
    pub listings_remaining: u32,
    pub payment_verified: bool,
    /// Screenshot of the most recent payment submission
    pub payment_screenshot_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verified_by: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verified_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Proof of payment awaiting (or past) administrator review.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
pub struct PaymentSubmission {
    pub id: String,
    pub user_id: String,
    /// Grant this payment is for
    pub subscription_id: String,
    pub amount_inr: u64,
    pub payment_screenshot_url: String,
    pub is_verified: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verified_by: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verified_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rejected_by: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rejected_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rejection_reason: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl PaymentSubmission {
    /// Neither verified nor rejected.
    pub fn is_pending(&self) -> bool {
        !self.is_verified && self.rejected_at.is_none()
    }
}

/// Result of an approval.
#[derive(Debug, Clone)]
pub struct ApprovalOutcome {
    pub submission: PaymentSubmission,
    pub grant: SubscriptionGrant,
    pub plan: SubscriptionPlan,
    /// False when the grant had already been verified before this call
    pub newly_verified: bool,
    /// IDs of duplicate pending submissions that were deleted
    pub pruned: Vec<String>,
}

/// Review-queue aggregates.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PaymentStats {
    pub pending_payments: u64,
    pub pending_today: u64,
    pub verified_subscriptions: u64,
    pub total_revenue_inr: u64,
    pub verified_last_7_days: u64,
}

/// Repository for grants and payment submissions.
pub struct SubscriptionRepository<'a> {
    db: &'a MarketDb,
}

impl<'a> SubscriptionRepository<'a> {
    pub fn new(db: &'a MarketDb) -> Self {
        Self { db }
    }

    /// Create an unverified grant and its first payment submission.
    pub fn submit(
        &self,
        user_id: &str,
        plan_id: &str,
        screenshot_url: &str,
        now: DateTime<Utc>,
    ) -> MarketResult<(SubscriptionGrant, PaymentSubmission)> {
        let write_txn = self.db.begin_write()?;
        let created = {
            let plans = write_txn.open_table(PLANS)?;
            let plan: SubscriptionPlan = get_json(&plans, plan_id)?
                .ok_or_else(|| MarketError::not_found(format!("Plan {plan_id}")))?;
            if !plan.is_active || plan.plan_type == PlanType::Free {
                return Err(MarketError::validation(format!(
                    "Plan {} is not available for purchase",
                    plan.name
                )));
            }

            let grant = SubscriptionGrant {
                id: Uuid::new_v4().to_string(),
                user_id: user_id.to_string(),
                plan_id: plan.id.clone(),
                listings_remaining: plan.listing_count,
                payment_verified: false,
                payment_screenshot_url: screenshot_url.to_string(),
                verified_by: None,
                verified_at: None,
                created_at: now,
                updated_at: now,
            };
            let submission = new_submission(&grant, plan.price_inr, screenshot_url, now);

            let mut grants = write_txn.open_table(GRANTS)?;
            put_json(&mut grants, &grant.id, &grant)?;
            let mut submissions = write_txn.open_table(SUBMISSIONS)?;
            put_json(&mut submissions, &submission.id, &submission)?;
            (grant, submission)
        };
        write_txn.commit()?;
        Ok(created)
    }

    /// Add another payment screenshot to the caller's unverified grant.
    pub fn resubmit(
        &self,
        user_id: &str,
        grant_id: &str,
        screenshot_url: &str,
        now: DateTime<Utc>,
    ) -> MarketResult<PaymentSubmission> {
        let write_txn = self.db.begin_write()?;
        let submission = {
            let mut grants = write_txn.open_table(GRANTS)?;
            let mut grant: SubscriptionGrant = get_json(&grants, grant_id)?
                .ok_or_else(|| MarketError::not_found(format!("Subscription {grant_id}")))?;
            if grant.user_id != user_id {
                return Err(MarketError::forbidden("Subscription belongs to another user"));
            }
            if grant.payment_verified {
                return Err(MarketError::conflict("Subscription payment is already verified"));
            }

            let plans = write_txn.open_table(PLANS)?;
            let plan: SubscriptionPlan = get_json(&plans, &grant.plan_id)?
                .ok_or_else(|| MarketError::not_found(format!("Plan {}", grant.plan_id)))?;

            grant.payment_screenshot_url = screenshot_url.to_string();
            grant.updated_at = now;
            put_json(&mut grants, &grant.id, &grant)?;

            let submission = new_submission(&grant, plan.price_inr, screenshot_url, now);
            let mut submissions = write_txn.open_table(SUBMISSIONS)?;
            put_json(&mut submissions, &submission.id, &submission)?;
            submission
        };
        write_txn.commit()?;
        Ok(submission)
    }

    pub fn get_grant(&self, grant_id: &str) -> MarketResult<SubscriptionGrant> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(GRANTS)?;
        get_json(&table, grant_id)?
            .ok_or_else(|| MarketError::not_found(format!("Subscription {grant_id}")))
    }

    /// A user's grants, newest first.
    pub fn list_for_user(&self, user_id: &str) -> DbResult<Vec<SubscriptionGrant>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(GRANTS)?;
        let mut grants: Vec<SubscriptionGrant> = scan_json(&table)?;
        grants.retain(|g| g.user_id == user_id);
        grants.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(grants)
    }

    /// Sum of `listings_remaining` across the user's verified grants.
    pub fn usable_listings(&self, user_id: &str) -> DbResult<u64> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(GRANTS)?;
        let grants: Vec<SubscriptionGrant> = scan_json(&table)?;
        Ok(grants
            .iter()
            .filter(|g| g.user_id == user_id && g.payment_verified)
            .map(|g| u64::from(g.listings_remaining))
            .sum())
    }

    /// Pending submissions, newest first.
    pub fn list_pending(&self) -> DbResult<Vec<PaymentSubmission>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(SUBMISSIONS)?;
        let mut pending: Vec<PaymentSubmission> = scan_json(&table)?;
        pending.retain(PaymentSubmission::is_pending);
        pending.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(pending)
    }

    /// Approve a submission: verify its grant, verify the submission, prune
    /// the grant's other pending submissions. All three writes commit
    /// together; a failure reports the step it happened in.
    ///
    /// Approving an already verified grant does not re-apply the allotment
    /// and reports `newly_verified = false`.
    pub fn approve(
        &self,
        submission_id: &str,
        admin_id: &str,
        now: DateTime<Utc>,
    ) -> MarketResult<ApprovalOutcome> {
        let write_txn = self.db.begin_write()?;
        let outcome = {
            let mut submissions = write_txn.open_table(SUBMISSIONS)?;
            let mut submission: PaymentSubmission = get_json(&submissions, submission_id)?
                .ok_or_else(|| {
                    MarketError::not_found(format!("Payment submission {submission_id}"))
                })?;
            if submission.rejected_at.is_some() {
                return Err(MarketError::conflict(format!(
                    "Payment submission {submission_id} was rejected"
                )));
            }

            let mut grants = write_txn.open_table(GRANTS)?;
            let plans = write_txn.open_table(PLANS)?;
            let (grant, plan, newly_verified) =
                verify_grant(&mut grants, &plans, &submission.subscription_id, admin_id, now)
                    .map_err(|e| MarketError::approval(ApprovalStep::Grant, e))?;

            verify_submission(&mut submissions, &mut submission, admin_id, now)
                .map_err(|e| MarketError::approval(ApprovalStep::Submission, e))?;

            let pruned = prune_pending(&mut submissions, &grant.id, &submission.id)
                .map_err(|e| MarketError::approval(ApprovalStep::Prune, e))?;

            ApprovalOutcome {
                submission,
                grant,
                plan,
                newly_verified,
                pruned,
            }
        };
        write_txn
            .commit()
            .map_err(|e| MarketError::approval(ApprovalStep::Commit, e))?;
        Ok(outcome)
    }

    /// Record a rejection on a pending submission. The grant is untouched.
    ///
    /// Rejecting an already rejected submission returns it unchanged.
    pub fn reject(
        &self,
        submission_id: &str,
        admin_id: &str,
        reason: Option<String>,
        now: DateTime<Utc>,
    ) -> MarketResult<PaymentSubmission> {
        let write_txn = self.db.begin_write()?;
        let submission = {
            let mut submissions = write_txn.open_table(SUBMISSIONS)?;
            let mut submission: PaymentSubmission = get_json(&submissions, submission_id)?
                .ok_or_else(|| {
                    MarketError::not_found(format!("Payment submission {submission_id}"))
                })?;
            if submission.is_verified {
                return Err(MarketError::conflict(format!(
                    "Payment submission {submission_id} is already verified"
                )));
            }
            if submission.rejected_at.is_some() {
                return Ok(submission);
            }
            submission.rejected_at = Some(now);
            submission.rejected_by = Some(admin_id.to_string());
            submission.rejection_reason = reason.filter(|r| !r.trim().is_empty());
            put_json(&mut submissions, &submission.id, &submission)?;
            submission
        };
        write_txn.commit()?;
        Ok(submission)
    }

    /// Aggregates for the admin dashboard.
    pub fn payment_stats(&self, now: DateTime<Utc>) -> DbResult<PaymentStats> {
        let read_txn = self.db.begin_read()?;
        let submissions: Vec<PaymentSubmission> =
            scan_json(&read_txn.open_table(SUBMISSIONS)?)?;
        let grants: Vec<SubscriptionGrant> = scan_json(&read_txn.open_table(GRANTS)?)?;

        let today = now.date_naive();
        let week_ago = now - TimeDelta::days(7);
        let mut stats = PaymentStats::default();

        for submission in &submissions {
            if submission.is_pending() {
                stats.pending_payments += 1;
                if submission.created_at.date_naive() == today {
                    stats.pending_today += 1;
                }
            }
            if submission.is_verified {
                stats.total_revenue_inr += submission.amount_inr;
            }
        }
        for grant in grants.iter().filter(|g| g.payment_verified) {
            stats.verified_subscriptions += 1;
            if grant.verified_at.is_some_and(|at| at >= week_ago) {
                stats.verified_last_7_days += 1;
            }
        }
        Ok(stats)
    }
}

fn new_submission(
    grant: &SubscriptionGrant,
    amount_inr: u64,
    screenshot_url: &str,
    now: DateTime<Utc>,
) -> PaymentSubmission {
    PaymentSubmission {
        id: Uuid::new_v4().to_string(),
        user_id: grant.user_id.clone(),
        subscription_id: grant.id.clone(),
        amount_inr,
        payment_screenshot_url: screenshot_url.to_string(),
        is_verified: false,
        verified_by: None,
        verified_at: None,
        rejected_by: None,
        rejected_at: None,
        rejection_reason: None,
        created_at: now,
    }
}

fn verify_grant(
    grants: &mut JsonTable<'_>,
    plans: &JsonTable<'_>,
    grant_id: &str,
    admin_id: &str,
    now: DateTime<Utc>,
) -> MarketResult<(SubscriptionGrant, SubscriptionPlan, bool)> {
    let mut grant: SubscriptionGrant = get_json(&*grants, grant_id)?
        .ok_or_else(|| MarketError::not_found(format!("Subscription {grant_id}")))?;
    let plan: SubscriptionPlan = get_json(plans, &grant.plan_id)?
        .ok_or_else(|| MarketError::not_found(format!("Plan {}", grant.plan_id)))?;

    if grant.payment_verified {
        return Ok((grant, plan, false));
    }

    grant.payment_verified = true;
    grant.listings_remaining = plan.listing_count;
    grant.verified_by = Some(admin_id.to_string());
    grant.verified_at = Some(now);
    grant.updated_at = now;
    put_json(grants, &grant.id, &grant)?;
    Ok((grant, plan, true))
}

fn verify_submission(
    submissions: &mut JsonTable<'_>,
    submission: &mut PaymentSubmission,
    admin_id: &str,
    now: DateTime<Utc>,
) -> MarketResult<()> {
    if submission.is_verified {
        return Ok(());
    }
    submission.is_verified = true;
    submission.verified_by = Some(admin_id.to_string());
    submission.verified_at = Some(now);
    put_json(submissions, &submission.id, submission)?;
    Ok(())
}

/// Delete pending submissions for `grant_id` other than `keep_id`.
fn prune_pending(
    submissions: &mut JsonTable<'_>,
    grant_id: &str,
    keep_id: &str,
) -> MarketResult<Vec<String>> {
    let all: Vec<PaymentSubmission> = scan_json(&*submissions)?;
    let stale: Vec<String> = all
        .into_iter()
        .filter(|s| s.subscription_id == grant_id && s.id != keep_id && s.is_pending())
        .map(|s| s.id)
        .collect();
    for id in &stale {
        submissions.remove(id.as_str())?;
    }
    Ok(stale)
}

/// Take one listing from the user's most recent verified grant that still
/// has quota. Runs inside the caller's write transaction so the decrement
/// commits together with the listing insert.
pub(crate) fn consume_listing_quota(
    grants: &mut JsonTable<'_>,
    user_id: &str,
    now: DateTime<Utc>,
) -> MarketResult<SubscriptionGrant> {
    let all: Vec<SubscriptionGrant> = scan_json(&*grants)?;
    let mut grant = all
        .into_iter()
        .filter(|g| g.user_id == user_id && g.payment_verified && g.listings_remaining > 0)
        .max_by(|a, b| {
            a.verified_at
                .cmp(&b.verified_at)
                .then_with(|| a.created_at.cmp(&b.created_at))
        })
        .ok_or(MarketError::QuotaExhausted)?;

    grant.listings_remaining = grant
        .listings_remaining
        .checked_sub(1)
        .ok_or_else(|| MarketError::conflict("Listing quota would go negative"))?;
    grant.updated_at = now;
    put_json(grants, &grant.id, &grant)?;
    Ok(grant)
}
