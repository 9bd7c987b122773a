// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Listing endpoints.
//!
//! Publishing consumes one listing from the seller's verified quota in the
//! same transaction that stores the listing.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use uuid::Uuid;

use crate::{
    auth::Auth,
    error::{ApiError, ApiJson, MarketError},
    events::{Audience, ChangeEvent, ChangeKind},
    models::{
        CreateProductRequest, ProductDetail, ProductListQuery, ProfileView, UpdateProductRequest,
        DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE,
    },
    state::AppState,
    storage::{
        BrowseFilter, CatalogRepository, Product, ProductRepository, ProductStatus, UserRepository,
    },
};

fn ensure_category(state: &AppState, category_id: &str) -> Result<(), ApiError> {
    let exists = CatalogRepository::new(&state.db)
        .get_category(category_id)
        .map_err(MarketError::from)?
        .is_some();
    if !exists {
        return Err(MarketError::validation(format!("Unknown category {category_id}")).into());
    }
    Ok(())
}

/// Publish a listing. Requires a verified subscription with listings left.
#[utoipa::path(
    post,
    path = "/v1/products",
    request_body = CreateProductRequest,
    tag = "Products",
    security(("bearer_auth" = [])),
    responses(
        (status = 201, body = Product),
        (status = 400, description = "Invalid listing"),
        (status = 402, description = "No listings remaining")
    )
)]
pub async fn create_product(
    Auth(user): Auth,
    State(state): State<AppState>,
    ApiJson(request): ApiJson<CreateProductRequest>,
) -> Result<(StatusCode, Json<Product>), ApiError> {
    request.validate()?;
    ensure_category(&state, &request.category_id)?;

    let now = state.now();
    let product = Product {
        id: Uuid::new_v4().to_string(),
        seller_id: user.user_id.clone(),
        category_id: request.category_id,
        title: request.title.trim().to_string(),
        description: request.description.trim().to_string(),
        price_inr: request.price_inr,
        original_price_inr: request.original_price_inr,
        condition: request.condition,
        images: request.images.iter().map(|i| i.trim().to_string()).collect(),
        location: request.location,
        is_negotiable: request.is_negotiable,
        status: ProductStatus::Active,
        views: 0,
        created_at: now,
        updated_at: now,
    };

    let grant = ProductRepository::new(&state.db).create_listing(&product, now)?;
    tracing::info!(
        user_id = %user.user_id,
        product_id = %product.id,
        grant_id = %grant.id,
        listings_remaining = grant.listings_remaining,
        "Listing published"
    );
    state.events.publish(ChangeEvent::new(
        ChangeKind::ProductCreated,
        &product.id,
        Audience::everyone(),
    ));

    Ok((StatusCode::CREATED, Json(product)))
}

/// Browse active listings, newest first.
#[utoipa::path(
    get,
    path = "/v1/products",
    params(ProductListQuery),
    tag = "Products",
    responses((status = 200, body = [Product]))
)]
pub async fn list_products(
    State(state): State<AppState>,
    Query(query): Query<ProductListQuery>,
) -> Result<Json<Vec<Product>>, ApiError> {
    let category_id = match query.category.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        Some(slug) => match CatalogRepository::new(&state.db)
            .find_category_by_slug(slug)
            .map_err(MarketError::from)?
        {
            Some(category) => Some(category.id),
            None => return Ok(Json(Vec::new())),
        },
        None => None,
    };

    let filter = BrowseFilter {
        category_id,
        query: query.q,
        limit: query.limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE),
        offset: query.offset.unwrap_or(0),
    };
    let products = ProductRepository::new(&state.db)
        .browse(&filter)
        .map_err(MarketError::from)?;
    Ok(Json(products))
}

/// Get a listing with its seller and category. Counts a view.
#[utoipa::path(
    get,
    path = "/v1/products/{product_id}",
    params(
        ("product_id" = String, Path, description = "Listing identifier")
    ),
    tag = "Products",
    responses(
        (status = 200, body = ProductDetail),
        (status = 404, description = "Listing not found")
    )
)]
pub async fn get_product(
    Path(product_id): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<ProductDetail>, ApiError> {
    let products = ProductRepository::new(&state.db);
    let product = match products.record_view(&product_id) {
        Ok(product) => product,
        Err(e @ MarketError::NotFound(_)) => return Err(e.into()),
        Err(e) => {
            tracing::warn!(error = %e, product_id = %product_id, "View not counted");
            products.get(&product_id)?
        }
    };

    let seller = UserRepository::new(&state.db)
        .find(&product.seller_id)
        .map_err(MarketError::from)?
        .as_ref()
        .map(ProfileView::from);
    let category = CatalogRepository::new(&state.db)
        .get_category(&product.category_id)
        .map_err(MarketError::from)?;

    Ok(Json(ProductDetail {
        product,
        seller,
        category,
    }))
}

/// Update the caller's own listing.
#[utoipa::path(
    put,
    path = "/v1/products/{product_id}",
    params(
        ("product_id" = String, Path, description = "Listing identifier")
    ),
    request_body = UpdateProductRequest,
    tag = "Products",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, body = Product),
        (status = 403, description = "Not the seller"),
        (status = 404, description = "Listing not found")
    )
)]
pub async fn update_product(
    Auth(user): Auth,
    Path(product_id): Path<String>,
    State(state): State<AppState>,
    ApiJson(request): ApiJson<UpdateProductRequest>,
) -> Result<Json<Product>, ApiError> {
    let patch = request.into_patch()?;
    if let Some(category_id) = &patch.category_id {
        ensure_category(&state, category_id)?;
    }

    let product =
        ProductRepository::new(&state.db).update(&product_id, &user.user_id, patch, state.now())?;
    tracing::info!(user_id = %user.user_id, product_id = %product.id, "Listing updated");
    state.events.publish(ChangeEvent::new(
        ChangeKind::ProductUpdated,
        &product.id,
        Audience::everyone(),
    ));
    Ok(Json(product))
}

/// Delete the caller's own listing. The used listing is not refunded.
#[utoipa::path(
    delete,
    path = "/v1/products/{product_id}",
    params(
        ("product_id" = String, Path, description = "Listing identifier")
    ),
    tag = "Products",
    security(("bearer_auth" = [])),
    responses(
        (status = 204),
        (status = 403, description = "Not the seller"),
        (status = 404, description = "Listing not found")
    )
)]
pub async fn delete_product(
    Auth(user): Auth,
    Path(product_id): Path<String>,
    State(state): State<AppState>,
) -> Result<StatusCode, ApiError> {
    ProductRepository::new(&state.db).delete(&product_id, &user.user_id)?;
    tracing::info!(user_id = %user.user_id, product_id = %product_id, "Listing deleted");
    state.events.publish(ChangeEvent::new(
        ChangeKind::ProductDeleted,
        &product_id,
        Audience::everyone(),
    ));
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::AuthenticatedUser;
    use crate::state::test_support::TestContext;
    use crate::storage::{ProductCondition, SubscriptionRepository, UserAccount};

    fn auth(account: &UserAccount) -> Auth {
        Auth(AuthenticatedUser {
            user_id: account.id.clone(),
            role: account.role,
            session_id: "sess".into(),
            expires_at: 0,
        })
    }

    fn listing(ctx: &TestContext, title: &str) -> ApiJson<CreateProductRequest> {
        ApiJson(CreateProductRequest {
            category_id: ctx.category_id(),
            title: title.into(),
            description: "Barely used".into(),
            price_inr: 400,
            original_price_inr: None,
            condition: ProductCondition::LikeNew,
            images: vec!["https://img.example/item.jpg".into()],
            location: Some("Hostel 4".into()),
            is_negotiable: true,
        })
    }

    #[tokio::test]
    async fn publishing_consumes_quota_until_exhausted() {
        let ctx = TestContext::new();
        let seller = ctx.member("asha@uni.edu");
        let grant = ctx.verified_grant(&seller, 1);

        let (status, Json(product)) =
            create_product(auth(&seller), State(ctx.state.clone()), listing(&ctx, "Study table"))
                .await
                .unwrap();
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(product.status, ProductStatus::Active);
        assert_eq!(
            SubscriptionRepository::new(&ctx.state.db)
                .get_grant(&grant.id)
                .unwrap()
                .listings_remaining,
            0
        );

        let err = create_product(auth(&seller), State(ctx.state.clone()), listing(&ctx, "Chair"))
            .await
            .unwrap_err();
        assert_eq!(err.status, StatusCode::PAYMENT_REQUIRED);
        assert_eq!(
            ProductRepository::new(&ctx.state.db)
                .list_by_seller(&seller.id)
                .unwrap()
                .len(),
            1
        );
    }

    #[tokio::test]
    async fn invalid_listing_does_not_touch_quota() {
        let ctx = TestContext::new();
        let seller = ctx.member("asha@uni.edu");
        let grant = ctx.verified_grant(&seller, 1);

        let ApiJson(mut bad) = listing(&ctx, "Lamp");
        bad.category_id = "no-such-category".into();
        let err = create_product(auth(&seller), State(ctx.state.clone()), ApiJson(bad))
            .await
            .unwrap_err();
        assert_eq!(err.status, StatusCode::BAD_REQUEST);
        assert_eq!(
            SubscriptionRepository::new(&ctx.state.db)
                .get_grant(&grant.id)
                .unwrap()
                .listings_remaining,
            1
        );
    }

    #[tokio::test]
    async fn browse_filters_by_slug_and_title() {
        let ctx = TestContext::new();
        let seller = ctx.member("asha@uni.edu");
        ctx.verified_grant(&seller, 3);
        let category = CatalogRepository::new(&ctx.state.db)
            .get_category(&ctx.category_id())
            .unwrap()
            .unwrap();

        create_product(auth(&seller), State(ctx.state.clone()), listing(&ctx, "Calculus textbook"))
            .await
            .unwrap();
        ctx.clock.advance(chrono::TimeDelta::seconds(5));
        create_product(auth(&seller), State(ctx.state.clone()), listing(&ctx, "Physics TEXTBOOK"))
            .await
            .unwrap();

        let Json(found) = list_products(
            State(ctx.state.clone()),
            Query(ProductListQuery {
                category: Some(category.slug.clone()),
                q: Some("textbook".into()),
                ..Default::default()
            }),
        )
        .await
        .unwrap();
        let titles: Vec<&str> = found.iter().map(|p| p.title.as_str()).collect();
        assert_eq!(titles, vec!["Physics TEXTBOOK", "Calculus textbook"]);

        let Json(none) = list_products(
            State(ctx.state.clone()),
            Query(ProductListQuery {
                category: Some("no-such-slug".into()),
                ..Default::default()
            }),
        )
        .await
        .unwrap();
        assert!(none.is_empty());
    }

    #[tokio::test]
    async fn detail_counts_views_and_includes_seller() {
        let ctx = TestContext::new();
        let seller = ctx.member("asha@uni.edu");
        ctx.verified_grant(&seller, 1);
        let (_, Json(product)) =
            create_product(auth(&seller), State(ctx.state.clone()), listing(&ctx, "Guitar"))
                .await
                .unwrap();

        get_product(Path(product.id.clone()), State(ctx.state.clone()))
            .await
            .unwrap();
        let Json(detail) = get_product(Path(product.id.clone()), State(ctx.state.clone()))
            .await
            .unwrap();
        assert_eq!(detail.product.views, 2);
        assert_eq!(detail.seller.unwrap().id, seller.id);
        assert!(detail.category.is_some());

        let err = get_product(Path("missing".into()), State(ctx.state.clone()))
            .await
            .unwrap_err();
        assert_eq!(err.status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn only_the_seller_can_edit_or_delete() {
        let ctx = TestContext::new();
        let seller = ctx.member("asha@uni.edu");
        let other = ctx.member("ravi@uni.edu");
        ctx.verified_grant(&seller, 1);
        let (_, Json(product)) =
            create_product(auth(&seller), State(ctx.state.clone()), listing(&ctx, "Bicycle"))
                .await
                .unwrap();

        let sold = || {
            ApiJson(UpdateProductRequest {
                status: Some(ProductStatus::Sold),
                ..Default::default()
            })
        };
        let err = update_product(auth(&other), Path(product.id.clone()), State(ctx.state.clone()), sold())
            .await
            .unwrap_err();
        assert_eq!(err.status, StatusCode::FORBIDDEN);

        let Json(updated) =
            update_product(auth(&seller), Path(product.id.clone()), State(ctx.state.clone()), sold())
                .await
                .unwrap();
        assert_eq!(updated.status, ProductStatus::Sold);

        let err = delete_product(auth(&other), Path(product.id.clone()), State(ctx.state.clone()))
            .await
            .unwrap_err();
        assert_eq!(err.status, StatusCode::FORBIDDEN);

        let status = delete_product(auth(&seller), Path(product.id.clone()), State(ctx.state.clone()))
            .await
            .unwrap();
        assert_eq!(status, StatusCode::NO_CONTENT);
        // No refund on delete
        assert_eq!(
            SubscriptionRepository::new(&ctx.state.db)
                .usable_listings(&seller.id)
                .unwrap(),
            0
        );
    }
}
