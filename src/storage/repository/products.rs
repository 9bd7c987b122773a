// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Product listings.
//!
//! New listings are quota-gated: the grant decrement and the listing insert
//! share one write transaction, so a listing is never persisted without a
//! matching decrement and vice versa.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::error::{MarketError, MarketResult};
use crate::storage::database::{
    get_json, put_json, scan_json, DbResult, MarketDb, GRANTS, PRODUCTS,
};

use super::subscriptions::{consume_listing_quota, SubscriptionGrant};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ProductCondition {
    New,
    LikeNew,
    Good,
    Fair,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema, Default)]
#[serde(rename_all = "lowercase")]
pub enum ProductStatus {
    Pending,
    #[default]
    Active,
    Sold,
    Expired,
}

/// Listing record.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
pub struct Product {
    pub id: String,
    pub seller_id: String,
    pub category_id: String,
    pub title: String,
    pub description: String,
    pub price_inr: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_price_inr: Option<u64>,
    pub condition: ProductCondition,
    pub images: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    pub is_negotiable: bool,
    pub status: ProductStatus,
    pub views: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Partial listing update. `None` leaves a field unchanged.
#[derive(Debug, Clone, Default)]
pub struct ProductPatch {
    pub category_id: Option<String>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub price_inr: Option<u64>,
    pub original_price_inr: Option<u64>,
    pub condition: Option<ProductCondition>,
    pub images: Option<Vec<String>>,
    pub location: Option<String>,
    pub is_negotiable: Option<bool>,
    pub status: Option<ProductStatus>,
}

impl ProductPatch {
    fn apply(self, product: &mut Product) {
        if let Some(category_id) = self.category_id {
            product.category_id = category_id;
        }
        if let Some(title) = self.title {
            product.title = title;
        }
        if let Some(description) = self.description {
            product.description = description;
        }
        if let Some(price) = self.price_inr {
            product.price_inr = price;
        }
        if self.original_price_inr.is_some() {
            product.original_price_inr = self.original_price_inr;
        }
        if let Some(condition) = self.condition {
            product.condition = condition;
        }
        if let Some(images) = self.images {
            product.images = images;
        }
        if self.location.is_some() {
            product.location = self.location;
        }
        if let Some(negotiable) = self.is_negotiable {
            product.is_negotiable = negotiable;
        }
        if let Some(status) = self.status {
            product.status = status;
        }
    }
}

/// Browse filter for active listings.
#[derive(Debug, Clone, Default)]
pub struct BrowseFilter {
    pub category_id: Option<String>,
    /// Case-insensitive title substring
    pub query: Option<String>,
    pub limit: usize,
    pub offset: usize,
}

/// Repository for listing operations.
pub struct ProductRepository<'a> {
    db: &'a MarketDb,
}

impl<'a> ProductRepository<'a> {
    pub fn new(db: &'a MarketDb) -> Self {
        Self { db }
    }

    /// Consume one listing from the seller's quota and insert the listing.
    ///
    /// Fails with `QuotaExhausted` (and writes nothing) when the seller has
    /// no verified grant with listings remaining.
    pub fn create_listing(
        &self,
        product: &Product,
        now: DateTime<Utc>,
    ) -> MarketResult<SubscriptionGrant> {
        let write_txn = self.db.begin_write()?;
        let grant = {
            let mut grants = write_txn.open_table(GRANTS)?;
            let grant = consume_listing_quota(&mut grants, &product.seller_id, now)?;

            let mut products = write_txn.open_table(PRODUCTS)?;
            if get_json::<Product, _>(&products, &product.id)?.is_some() {
                return Err(MarketError::conflict(format!("Product {} already exists", product.id)));
            }
            put_json(&mut products, &product.id, product)?;
            grant
        };
        write_txn.commit()?;
        Ok(grant)
    }

    pub fn get(&self, product_id: &str) -> MarketResult<Product> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(PRODUCTS)?;
        get_json(&table, product_id)?
            .ok_or_else(|| MarketError::not_found(format!("Product {product_id}")))
    }

    /// Active listings matching the filter, newest first.
    pub fn browse(&self, filter: &BrowseFilter) -> DbResult<Vec<Product>> {
        let query = filter
            .query
            .as_deref()
            .map(str::trim)
            .filter(|q| !q.is_empty())
            .map(str::to_lowercase);

        let mut products = self.scan()?;
        products.retain(|p| {
            p.status == ProductStatus::Active
                && filter
                    .category_id
                    .as_deref()
                    .map_or(true, |c| p.category_id == c)
                && query
                    .as_deref()
                    .map_or(true, |q| p.title.to_lowercase().contains(q))
        });
        products.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(products
            .into_iter()
            .skip(filter.offset)
            .take(filter.limit)
            .collect())
    }

    /// A seller's listings in every status, newest first.
    pub fn list_by_seller(&self, seller_id: &str) -> DbResult<Vec<Product>> {
        let mut products = self.scan()?;
        products.retain(|p| p.seller_id == seller_id);
        products.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(products)
    }

    /// Apply a patch to the caller's own listing.
    pub fn update(
        &self,
        product_id: &str,
        seller_id: &str,
        patch: ProductPatch,
        now: DateTime<Utc>,
    ) -> MarketResult<Product> {
        let write_txn = self.db.begin_write()?;
        let product = {
            let mut table = write_txn.open_table(PRODUCTS)?;
            let mut product: Product = get_json(&table, product_id)?
                .ok_or_else(|| MarketError::not_found(format!("Product {product_id}")))?;
            if product.seller_id != seller_id {
                return Err(MarketError::forbidden("Only the seller can edit this listing"));
            }
            patch.apply(&mut product);
            product.updated_at = now;
            put_json(&mut table, &product.id, &product)?;
            product
        };
        write_txn.commit()?;
        Ok(product)
    }

    /// Delete the caller's own listing. Quota is not refunded.
    pub fn delete(&self, product_id: &str, seller_id: &str) -> MarketResult<()> {
        let write_txn = self.db.begin_write()?;
        {
            let mut table = write_txn.open_table(PRODUCTS)?;
            let product: Product = get_json(&table, product_id)?
                .ok_or_else(|| MarketError::not_found(format!("Product {product_id}")))?;
            if product.seller_id != seller_id {
                return Err(MarketError::forbidden("Only the seller can delete this listing"));
            }
            table.remove(product_id)?;
        }
        write_txn.commit()?;
        Ok(())
    }

    /// Increment the view counter and return the updated listing.
    pub fn record_view(&self, product_id: &str) -> MarketResult<Product> {
        let write_txn = self.db.begin_write()?;
        let product = {
            let mut table = write_txn.open_table(PRODUCTS)?;
            let mut product: Product = get_json(&table, product_id)?
                .ok_or_else(|| MarketError::not_found(format!("Product {product_id}")))?;
            product.views = product.views.saturating_add(1);
            put_json(&mut table, &product.id, &product)?;
            product
        };
        write_txn.commit()?;
        Ok(product)
    }

    /// `(total listings, distinct sellers with an active listing)`.
    pub fn counts(&self) -> DbResult<(u64, u64)> {
        let products = self.scan()?;
        let mut sellers: Vec<&str> = products
            .iter()
            .filter(|p| p.status == ProductStatus::Active)
            .map(|p| p.seller_id.as_str())
            .collect();
        sellers.sort_unstable();
        sellers.dedup();
        Ok((products.len() as u64, sellers.len() as u64))
    }

    fn scan(&self) -> DbResult<Vec<Product>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(PRODUCTS)?;
        scan_json(&table)
    }
}
