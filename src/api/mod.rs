// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use axum::{
    routing::{get, post},
    Router,
};
use tower::ServiceBuilder;
use tower_http::{
    cors::CorsLayer,
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};
use utoipa::{
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    Modify, OpenApi,
};
use utoipa_swagger_ui::SwaggerUi;

use crate::{
    auth::Role,
    events::{ChangeEvent, ChangeKind},
    models::{
        AdminStats, ApproveResponse, ConversationView, CreateProductRequest, LoginRequest,
        LoginResponse, MeResponse, OpenConversationRequest, PendingPaymentView, PostMessageRequest,
        ProductDetail, ProfileView, QuotaResponse, RejectRequest, ResubmitPaymentRequest,
        SendOtpRequest, SubmitPaymentRequest, SubmitPaymentResponse, SubscriptionView,
        SuccessResponse, UpdateProductRequest, VerifyOtpRequest,
    },
    state::AppState,
    storage::{
        Category, Conversation, Message, PaymentSubmission, PlanType, Product, ProductCondition,
        ProductStatus, SubscriptionGrant, SubscriptionPlan,
    },
};

pub mod admin;
pub mod auth;
pub mod catalog;
pub mod conversations;
pub mod health;
pub mod otp;
pub mod products;
pub mod stream;
pub mod subscriptions;
pub mod users;

pub fn router(state: AppState) -> Router {
    let v1_routes = Router::new()
        .route("/auth/login", post(auth::login))
        .route("/me", get(users::get_me))
        .route("/me/products", get(users::list_my_products))
        .route("/plans", get(catalog::list_plans))
        .route("/categories", get(catalog::list_categories))
        .route(
            "/subscriptions",
            get(subscriptions::list_subscriptions).post(subscriptions::submit_payment),
        )
        .route("/subscriptions/quota", get(subscriptions::get_quota))
        .route(
            "/subscriptions/{grant_id}/payments",
            post(subscriptions::resubmit_payment),
        )
        .route("/admin/payments/pending", get(admin::list_pending_payments))
        .route(
            "/admin/payments/{submission_id}/approve",
            post(admin::approve_payment),
        )
        .route(
            "/admin/payments/{submission_id}/reject",
            post(admin::reject_payment),
        )
        .route("/admin/stats", get(admin::get_stats))
        .route(
            "/products",
            get(products::list_products).post(products::create_product),
        )
        .route(
            "/products/{product_id}",
            get(products::get_product)
                .put(products::update_product)
                .delete(products::delete_product),
        )
        .route(
            "/conversations",
            get(conversations::list_conversations).post(conversations::open_conversation),
        )
        .route(
            "/conversations/{conversation_id}/messages",
            get(conversations::list_messages).post(conversations::post_message),
        )
        .route("/events", get(stream::event_stream));

    Router::new()
        .route("/send-otp", post(otp::send_otp))
        .route("/verify-otp", post(otp::verify_otp))
        .route("/health", get(health::health))
        .route("/health/live", get(health::liveness))
        .route("/health/ready", get(health::readiness))
        .nest("/v1", v1_routes)
        .merge(SwaggerUi::new("/docs").url("/api-doc/openapi.json", ApiDoc::openapi()))
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
                .layer(TraceLayer::new_for_http())
                .layer(PropagateRequestIdLayer::x_request_id()),
        )
        .layer(CorsLayer::permissive())
        .with_state(state)
}

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearer_auth",
            SecurityScheme::Http(
                HttpBuilder::new()
                    .scheme(HttpAuthScheme::Bearer)
                    .bearer_format("JWT")
                    .build(),
            ),
        );
    }
}

#[derive(OpenApi)]
#[openapi(
    info(title = "SwapNest API", description = "Campus marketplace server"),
    modifiers(&SecurityAddon),
    paths(
        otp::send_otp,
        otp::verify_otp,
        health::health,
        health::liveness,
        health::readiness,
        auth::login,
        users::get_me,
        users::list_my_products,
        catalog::list_plans,
        catalog::list_categories,
        subscriptions::submit_payment,
        subscriptions::resubmit_payment,
        subscriptions::list_subscriptions,
        subscriptions::get_quota,
        admin::list_pending_payments,
        admin::approve_payment,
        admin::reject_payment,
        admin::get_stats,
        products::create_product,
        products::list_products,
        products::get_product,
        products::update_product,
        products::delete_product,
        conversations::open_conversation,
        conversations::list_conversations,
        conversations::list_messages,
        conversations::post_message,
        stream::event_stream
    ),
    components(
        schemas(
            SendOtpRequest,
            VerifyOtpRequest,
            SuccessResponse,
            LoginRequest,
            LoginResponse,
            ProfileView,
            MeResponse,
            Role,
            PlanType,
            SubscriptionPlan,
            Category,
            SubscriptionGrant,
            PaymentSubmission,
            SubmitPaymentRequest,
            ResubmitPaymentRequest,
            SubmitPaymentResponse,
            SubscriptionView,
            QuotaResponse,
            PendingPaymentView,
            ApproveResponse,
            RejectRequest,
            AdminStats,
            Product,
            ProductCondition,
            ProductStatus,
            CreateProductRequest,
            UpdateProductRequest,
            ProductDetail,
            Conversation,
            Message,
            OpenConversationRequest,
            ConversationView,
            PostMessageRequest,
            ChangeEvent,
            ChangeKind
        )
    ),
    tags(
        (name = "Signup", description = "Email passcode signup"),
        (name = "Auth", description = "Password login"),
        (name = "Users", description = "Caller profile and listings"),
        (name = "Catalog", description = "Plans and categories"),
        (name = "Subscriptions", description = "Listing quota purchases"),
        (name = "Admin", description = "Payment review"),
        (name = "Products", description = "Listings"),
        (name = "Messaging", description = "Buyer and seller conversations"),
        (name = "Events", description = "Change notifications"),
        (name = "Health", description = "Liveness and readiness")
    )
)]
struct ApiDoc;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::test_support::TestContext;
    use axum::{
        body::{to_bytes, Body},
        http::{header, Request, StatusCode},
    };
    use tower::ServiceExt;

    #[tokio::test]
    async fn public_routes_answer_and_private_routes_need_a_token() {
        let ctx = TestContext::new();
        let app = router(ctx.state.clone());

        let response = app
            .clone()
            .oneshot(Request::get("/health/live").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().contains_key("x-request-id"));

        let response = app
            .clone()
            .oneshot(Request::get("/v1/categories").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = app
            .oneshot(Request::get("/v1/me").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn malformed_bodies_use_the_error_body() {
        let ctx = TestContext::new();
        let app = router(ctx.state.clone());

        let cases = [
            ("application/json", "{}"),
            ("application/json", "{"),
            ("text/plain", "{}"),
        ];
        for (content_type, body) in cases {
            let request = Request::post("/send-otp")
                .header(header::CONTENT_TYPE, content_type)
                .body(Body::from(body))
                .unwrap();
            let response = app.clone().oneshot(request).await.unwrap();
            assert_eq!(response.status(), StatusCode::BAD_REQUEST, "{content_type} {body}");
            let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
            let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
            assert_eq!(json["error_code"], "validation_error");
            assert!(json["error"].is_string());
        }
        assert!(ctx.mailer.sent().is_empty());
    }

    #[test]
    fn openapi_lists_bearer_scheme_and_paths() {
        let doc = ApiDoc::openapi();
        let components = doc.components.expect("components");
        assert!(components.security_schemes.contains_key("bearer_auth"));
        assert!(doc.paths.paths.contains_key("/v1/admin/payments/{submission_id}/approve"));
        assert!(doc.paths.paths.contains_key("/send-otp"));
    }
}
