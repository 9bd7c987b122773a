// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Marketplace Storage Module
//!
//! Persistent state lives in a single embedded redb file under the configured
//! data directory.
//!
//! ## Storage Layout
//!
//! ```text
//! {DATA_DIR}/
//!   marketplace.redb   # all tables, see `database` for the layout
//! ```
//!
//! ## Important Notes
//!
//! - Repositories borrow the shared [`MarketDb`] and open their own
//!   transactions; nothing holds a transaction across an `.await`
//! - Multi-record workflows commit in one write transaction or not at all
//! - Passcodes are stored as keyed digests, never in the clear

pub mod database;
pub mod repository;

pub use database::{DbError, DbResult, MarketDb};
pub use repository::{
    ApprovalOutcome, BrowseFilter, Category, Conversation, ConversationRepository, Message,
    OtpRepository, PaymentStats, PaymentSubmission, PlanType, Product, ProductCondition,
    ProductPatch, ProductRepository, ProductStatus, StoredOtp, SubscriptionGrant,
    SubscriptionPlan, SubscriptionRepository, CatalogRepository, UserAccount, UserRepository,
};
