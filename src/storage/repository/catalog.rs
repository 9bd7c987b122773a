// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Subscription plans and product categories.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::error::{MarketError, MarketResult};
use crate::storage::database::{get_json, put_json, scan_json, DbResult, MarketDb, CATEGORIES, PLANS};

/// Plan tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum PlanType {
    Free,
    Basic,
    Premium,
}

/// A purchasable listing allotment.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
pub struct SubscriptionPlan {
    pub id: String,
    pub name: String,
    pub plan_type: PlanType,
    /// Listings granted once a payment for this plan is verified
    pub listing_count: u32,
    /// Price in whole rupees
    pub price_inr: u64,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
pub struct Category {
    pub id: String,
    pub name: String,
    pub slug: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    pub created_at: DateTime<Utc>,
}

const DEFAULT_PLANS: &[(&str, PlanType, u32, u64)] = &[
    ("Starter", PlanType::Basic, 3, 100),
    ("Basic", PlanType::Basic, 10, 300),
    ("Premium", PlanType::Premium, 25, 600),
];

const DEFAULT_CATEGORIES: &[(&str, &str, &str)] = &[
    ("Books", "books", "book"),
    ("Electronics", "electronics", "laptop"),
    ("Furniture", "furniture", "sofa"),
    ("Clothing", "clothing", "shirt"),
    ("Sports", "sports", "ball"),
    ("Other", "other", "box"),
];

/// Repository for the plan and category catalog.
pub struct CatalogRepository<'a> {
    db: &'a MarketDb,
}

impl<'a> CatalogRepository<'a> {
    pub fn new(db: &'a MarketDb) -> Self {
        Self { db }
    }

    /// Seed default plans and categories into empty tables.
    ///
    /// Returns `(plans_added, categories_added)`.
    pub fn seed_defaults(&self, now: DateTime<Utc>) -> DbResult<(usize, usize)> {
        let write_txn = self.db.begin_write()?;
        let added = {
            let mut plans = write_txn.open_table(PLANS)?;
            let mut plans_added = 0;
            if scan_json::<SubscriptionPlan, _>(&plans)?.is_empty() {
                for (name, plan_type, listing_count, price_inr) in DEFAULT_PLANS {
                    let plan = SubscriptionPlan {
                        id: Uuid::new_v4().to_string(),
                        name: (*name).to_string(),
                        plan_type: *plan_type,
                        listing_count: *listing_count,
                        price_inr: *price_inr,
                        is_active: true,
                        created_at: now,
                    };
                    put_json(&mut plans, &plan.id, &plan)?;
                    plans_added += 1;
                }
            }

            let mut categories = write_txn.open_table(CATEGORIES)?;
            let mut categories_added = 0;
            if scan_json::<Category, _>(&categories)?.is_empty() {
                for (name, slug, icon) in DEFAULT_CATEGORIES {
                    let category = Category {
                        id: Uuid::new_v4().to_string(),
                        name: (*name).to_string(),
                        slug: (*slug).to_string(),
                        icon: Some((*icon).to_string()),
                        created_at: now,
                    };
                    put_json(&mut categories, &category.id, &category)?;
                    categories_added += 1;
                }
            }
            (plans_added, categories_added)
        };
        write_txn.commit()?;
        Ok(added)
    }

    /// Active paid plans, cheapest first.
    pub fn list_active_plans(&self) -> DbResult<Vec<SubscriptionPlan>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(PLANS)?;
        let mut plans: Vec<SubscriptionPlan> = scan_json(&table)?;
        plans.retain(|p| p.is_active && p.plan_type != PlanType::Free);
        plans.sort_by(|a, b| a.price_inr.cmp(&b.price_inr).then_with(|| a.name.cmp(&b.name)));
        Ok(plans)
    }

    pub fn get_plan(&self, plan_id: &str) -> MarketResult<SubscriptionPlan> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(PLANS)?;
        get_json(&table, plan_id)?.ok_or_else(|| MarketError::not_found(format!("Plan {plan_id}")))
    }

    pub fn insert_plan(&self, plan: &SubscriptionPlan) -> DbResult<()> {
        let write_txn = self.db.begin_write()?;
        {
            let mut table = write_txn.open_table(PLANS)?;
            put_json(&mut table, &plan.id, plan)?;
        }
        write_txn.commit()?;
        Ok(())
    }

    /// All categories, ordered by name.
    pub fn list_categories(&self) -> DbResult<Vec<Category>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(CATEGORIES)?;
        let mut categories: Vec<Category> = scan_json(&table)?;
        categories.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(categories)
    }

    pub fn get_category(&self, category_id: &str) -> DbResult<Option<Category>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(CATEGORIES)?;
        get_json(&table, category_id)
    }

    pub fn find_category_by_slug(&self, slug: &str) -> DbResult<Option<Category>> {
        Ok(self
            .list_categories()?
            .into_iter()
            .find(|c| c.slug == slug))
    }
}
