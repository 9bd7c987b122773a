// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Endpoints about the signed-in account.

use axum::{extract::State, Json};

use crate::{
    auth::Auth,
    error::{ApiError, MarketError},
    models::{MeResponse, ProfileView},
    state::AppState,
    storage::{Product, ProductRepository, SubscriptionRepository, UserRepository},
};

/// Get the current account's profile and listing quota.
#[utoipa::path(
    get,
    path = "/v1/me",
    tag = "Users",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Profile", body = MeResponse),
        (status = 401, description = "Unauthorized - invalid or missing token"),
    )
)]
pub async fn get_me(
    Auth(user): Auth,
    State(state): State<AppState>,
) -> Result<Json<MeResponse>, ApiError> {
    let account = UserRepository::new(&state.db).get(&user.user_id)?;
    let usable_listings = SubscriptionRepository::new(&state.db)
        .usable_listings(&user.user_id)
        .map_err(MarketError::from)?;

    Ok(Json(MeResponse {
        profile: ProfileView::from(&account),
        usable_listings,
    }))
}

/// List the current account's listings in every status, newest first.
#[utoipa::path(
    get,
    path = "/v1/me/products",
    tag = "Users",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Own listings", body = [Product]),
        (status = 401, description = "Unauthorized - invalid or missing token"),
    )
)]
pub async fn list_my_products(
    Auth(user): Auth,
    State(state): State<AppState>,
) -> Result<Json<Vec<Product>>, ApiError> {
    let products = ProductRepository::new(&state.db)
        .list_by_seller(&user.user_id)
        .map_err(MarketError::from)?;
    Ok(Json(products))
}
