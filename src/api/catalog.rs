// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use axum::{extract::State, Json};

use crate::{
    error::{ApiError, MarketError},
    state::AppState,
    storage::{CatalogRepository, Category, SubscriptionPlan},
};

/// Plans available for purchase, cheapest first.
#[utoipa::path(
    get,
    path = "/v1/plans",
    tag = "Catalog",
    responses((status = 200, body = [SubscriptionPlan]))
)]
pub async fn list_plans(State(state): State<AppState>) -> Result<Json<Vec<SubscriptionPlan>>, ApiError> {
    let plans = CatalogRepository::new(&state.db)
        .list_active_plans()
        .map_err(MarketError::from)?;
    Ok(Json(plans))
}

#[utoipa::path(
    get,
    path = "/v1/categories",
    tag = "Catalog",
    responses((status = 200, body = [Category]))
)]
pub async fn list_categories(State(state): State<AppState>) -> Result<Json<Vec<Category>>, ApiError> {
    let categories = CatalogRepository::new(&state.db)
        .list_categories()
        .map_err(MarketError::from)?;
    Ok(Json(categories))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::test_support::TestContext;

    #[tokio::test]
    async fn seeded_plans_are_sorted_by_price() {
        let ctx = TestContext::new();
        let Json(plans) = list_plans(State(ctx.state.clone())).await.unwrap();

        let prices: Vec<u64> = plans.iter().map(|p| p.price_inr).collect();
        assert_eq!(prices, vec![100, 300, 600]);
        assert_eq!(plans[1].listing_count, 10);
    }

    #[tokio::test]
    async fn categories_are_sorted_by_name() {
        let ctx = TestContext::new();
        let Json(categories) = list_categories(State(ctx.state.clone())).await.unwrap();

        assert_eq!(categories.len(), 6);
        let names: Vec<&str> = categories.iter().map(|c| c.name.as_str()).collect();
        let mut sorted = names.clone();
        sorted.sort();
        assert_eq!(names, sorted);
    }
}
