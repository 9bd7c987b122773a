// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Repository layer providing typed access to the marketplace database.
//!
//! Each repository borrows the [`MarketDb`](super::MarketDb) and exposes the
//! operations for one entity family.

pub mod catalog;
pub mod conversations;
pub mod otps;
pub mod products;
pub mod subscriptions;
pub mod users;

pub use catalog::{CatalogRepository, Category, PlanType, SubscriptionPlan};
pub use conversations::{Conversation, ConversationRepository, Message};
pub use otps::{OtpRepository, StoredOtp};
pub use products::{
    BrowseFilter, Product, ProductCondition, ProductPatch, ProductRepository, ProductStatus,
};
pub use subscriptions::{
    ApprovalOutcome, PaymentStats, PaymentSubmission, SubscriptionGrant, SubscriptionRepository,
};
pub use users::{UserAccount, UserRepository};
