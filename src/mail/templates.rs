// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Plain-text email templates.

use super::OutgoingEmail;
use crate::storage::{PaymentSubmission, SubscriptionGrant, SubscriptionPlan, UserAccount};

pub fn verification_code(to: &str, code: &str) -> OutgoingEmail {
    OutgoingEmail {
        to: to.to_string(),
        subject: "Your Verification Code".to_string(),
        body: format!("Your verification code is: {code}"),
    }
}

/// Tells the member their listings are available.
pub fn payment_approved_user(
    user: &UserAccount,
    plan: &SubscriptionPlan,
    grant: &SubscriptionGrant,
) -> OutgoingEmail {
    OutgoingEmail {
        to: user.email.clone(),
        subject: format!("Your {} plan is active", plan.name),
        body: format!(
            "Hi {},\n\n\
             Your payment of Rs. {} for the {} plan has been verified.\n\
             You can now publish up to {} listings.\n\n\
             Happy selling!\n",
            user.full_name, plan.price_inr, plan.name, grant.listings_remaining
        ),
    }
}

/// Operational record of an approval for the admin mailbox.
pub fn payment_approved_ops(
    to: &str,
    user: &UserAccount,
    plan: &SubscriptionPlan,
    submission: &PaymentSubmission,
    approved_by: &str,
) -> OutgoingEmail {
    OutgoingEmail {
        to: to.to_string(),
        subject: format!("Payment approved: {} ({})", user.email, plan.name),
        body: format!(
            "Submission: {}\n\
             Subscription: {}\n\
             User: {} <{}>\n\
             Plan: {} ({} listings)\n\
             Amount: Rs. {}\n\
             Approved by: {}\n",
            submission.id,
            submission.subscription_id,
            user.full_name,
            user.email,
            plan.name,
            plan.listing_count,
            submission.amount_inr,
            approved_by
        ),
    }
}
