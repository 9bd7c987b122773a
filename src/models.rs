// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # API Data Models
//!
//! Request and response bodies for the REST API. Stored records that are
//! safe to expose (plans, categories, grants, submissions, listings,
//! conversations, messages) are returned as-is; accounts are always returned
//! through [`ProfileView`] so the password hash never leaves the server.
//!
//! ## Model Categories
//!
//! - **Signup**: passcode issue and verification (`/send-otp`, `/verify-otp`)
//! - **Accounts**: login and the caller's profile
//! - **Subscriptions**: payment submission and listing quota
//! - **Review**: administrator payment queue and dashboard
//! - **Listings**: product create, update and browse
//! - **Messaging**: conversations and messages

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use url::Url;
use utoipa::{IntoParams, ToSchema};

use crate::auth::Role;
use crate::error::{MarketError, MarketResult};
use crate::storage::{
    Category, Conversation, PaymentSubmission, Product, ProductCondition, ProductPatch,
    ProductStatus, SubscriptionGrant, SubscriptionPlan, UserAccount,
};

// =============================================================================
// Signup
// =============================================================================

/// Request a verification code for an email address.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct SendOtpRequest {
    pub email: String,
}

/// Verify a code and create the account.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct VerifyOtpRequest {
    pub email: String,
    /// Six-digit code from the verification mail
    pub otp: String,
    /// Display name
    pub name: String,
    pub password: String,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub college_name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
pub struct SuccessResponse {
    pub success: bool,
}

impl SuccessResponse {
    pub fn ok() -> Self {
        Self { success: true }
    }
}

// =============================================================================
// Accounts
// =============================================================================

/// Public view of an account.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
pub struct ProfileView {
    pub id: String,
    pub email: String,
    pub full_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub college_name: Option<String>,
    pub role: Role,
    pub created_at: DateTime<Utc>,
}

impl From<&UserAccount> for ProfileView {
    fn from(account: &UserAccount) -> Self {
        Self {
            id: account.id.clone(),
            email: account.email.clone(),
            full_name: account.full_name.clone(),
            phone: account.phone.clone(),
            college_name: account.college_name.clone(),
            role: account.role,
            created_at: account.created_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct LoginResponse {
    /// Bearer token for the `Authorization` header
    pub token: String,
    pub expires_at: DateTime<Utc>,
    pub user: ProfileView,
}

/// Response for GET /v1/me
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct MeResponse {
    #[serde(flatten)]
    pub profile: ProfileView,
    /// Sum of remaining listings over verified subscriptions
    pub usable_listings: u64,
}

// =============================================================================
// Subscriptions
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct SubmitPaymentRequest {
    pub plan_id: String,
    /// Link to the payment screenshot (http or https)
    pub screenshot_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ResubmitPaymentRequest {
    pub screenshot_url: String,
}

/// A subscription grant together with its plan.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct SubscriptionView {
    #[serde(flatten)]
    pub grant: SubscriptionGrant,
    pub plan: SubscriptionPlan,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct SubmitPaymentResponse {
    pub subscription: SubscriptionGrant,
    pub payment: PaymentSubmission,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
pub struct QuotaResponse {
    pub usable_listings: u64,
}

// =============================================================================
// Review
// =============================================================================

/// Pending submission enriched for the review queue.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct PendingPaymentView {
    pub payment: PaymentSubmission,
    pub subscription: SubscriptionGrant,
    pub plan: SubscriptionPlan,
    pub user: ProfileView,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ApproveResponse {
    pub submission: PaymentSubmission,
    pub subscription: SubscriptionGrant,
    /// False when the subscription had already been verified
    pub newly_verified: bool,
    /// Identifiers of duplicate pending submissions that were removed
    pub pruned: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct RejectRequest {
    #[serde(default)]
    pub reason: Option<String>,
}

/// Review dashboard counters.
#[derive(Debug, Clone, Serialize, ToSchema, PartialEq, Eq)]
pub struct AdminStats {
    pub pending_payments: u64,
    /// Pending submissions created since midnight UTC
    pub pending_today: u64,
    pub verified_subscriptions: u64,
    pub total_revenue_inr: u64,
    pub active_sellers: u64,
    pub total_products: u64,
    pub verified_last_7_days: u64,
}

// =============================================================================
// Listings
// =============================================================================

pub const MIN_TITLE_CHARS: usize = 3;
pub const MAX_TITLE_CHARS: usize = 120;
pub const DEFAULT_PAGE_SIZE: usize = 50;
pub const MAX_PAGE_SIZE: usize = 100;

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CreateProductRequest {
    pub category_id: String,
    pub title: String,
    pub description: String,
    pub price_inr: u64,
    #[serde(default)]
    pub original_price_inr: Option<u64>,
    pub condition: ProductCondition,
    pub images: Vec<String>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub is_negotiable: bool,
}

impl CreateProductRequest {
    pub fn validate(&self) -> MarketResult<()> {
        validate_title(&self.title)?;
        if self.description.trim().is_empty() {
            return Err(MarketError::validation("Description is required"));
        }
        validate_price(self.price_inr)?;
        validate_images(&self.images)
    }
}

/// Partial listing update; omitted fields are left unchanged.
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct UpdateProductRequest {
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

impl UpdateProductRequest {
    /// Validate the supplied fields and convert into a storage patch.
    pub fn into_patch(self) -> MarketResult<ProductPatch> {
        if let Some(title) = &self.title {
            validate_title(title)?;
        }
        if self.description.as_deref().is_some_and(|d| d.trim().is_empty()) {
            return Err(MarketError::validation("Description is required"));
        }
        if let Some(price) = self.price_inr {
            validate_price(price)?;
        }
        if let Some(images) = &self.images {
            validate_images(images)?;
        }
        Ok(ProductPatch {
            category_id: self.category_id,
            title: self.title.map(|t| t.trim().to_string()),
            description: self.description.map(|d| d.trim().to_string()),
            price_inr: self.price_inr,
            original_price_inr: self.original_price_inr,
            condition: self.condition,
            images: self.images,
            location: self.location,
            is_negotiable: self.is_negotiable,
            status: self.status,
        })
    }
}

/// Query parameters for browsing listings.
#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
pub struct ProductListQuery {
    /// Category slug
    pub category: Option<String>,
    /// Case-insensitive title search
    pub q: Option<String>,
    /// Page size (default 50, max 100)
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

/// A listing with its seller and category.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ProductDetail {
    #[serde(flatten)]
    pub product: Product,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seller: Option<ProfileView>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<Category>,
}

// =============================================================================
// Messaging
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct OpenConversationRequest {
    pub product_id: String,
}

/// Conversation summary for the inbox.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ConversationView {
    #[serde(flatten)]
    pub conversation: Conversation,
    pub unread_count: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct PostMessageRequest {
    pub content: String,
}

// =============================================================================
// Validation helpers
// =============================================================================

/// Accept only absolute `http`/`https` URLs.
pub fn validate_http_url(field: &str, value: &str) -> MarketResult<String> {
    let trimmed = value.trim();
    let parsed = Url::parse(trimmed)
        .map_err(|_| MarketError::validation(format!("{field} must be a valid URL")))?;
    match parsed.scheme() {
        "http" | "https" if parsed.host_str().is_some() => Ok(trimmed.to_string()),
        _ => Err(MarketError::validation(format!(
            "{field} must be an http or https URL"
        ))),
    }
}

fn validate_title(title: &str) -> MarketResult<()> {
    let chars = title.trim().chars().count();
    if !(MIN_TITLE_CHARS..=MAX_TITLE_CHARS).contains(&chars) {
        return Err(MarketError::validation(format!(
            "Title must be between {MIN_TITLE_CHARS} and {MAX_TITLE_CHARS} characters"
        )));
    }
    Ok(())
}

fn validate_price(price_inr: u64) -> MarketResult<()> {
    if price_inr == 0 {
        return Err(MarketError::validation("Price must be greater than zero"));
    }
    Ok(())
}

fn validate_images(images: &[String]) -> MarketResult<()> {
    if images.is_empty() {
        return Err(MarketError::validation("At least one image is required"));
    }
    for image in images {
        validate_http_url("Image URL", image)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn listing() -> CreateProductRequest {
        CreateProductRequest {
            category_id: "cat".into(),
            title: "Engineering Maths".into(),
            description: "Second edition, lightly used".into(),
            price_inr: 250,
            original_price_inr: Some(600),
            condition: ProductCondition::Good,
            images: vec!["https://img.example/book.jpg".into()],
            location: None,
            is_negotiable: true,
        }
    }

    #[test]
    fn verify_request_accepts_minimal_body() {
        let request: VerifyOtpRequest = serde_json::from_str(
            r#"{"email":"a@uni.edu","otp":"123456","name":"Asha","password":"secret1"}"#,
        )
        .unwrap();
        assert_eq!(request.otp, "123456");
        assert!(request.phone.is_none());
    }

    #[test]
    fn success_response_shape() {
        assert_eq!(
            serde_json::to_value(SuccessResponse::ok()).unwrap(),
            serde_json::json!({"success": true})
        );
    }

    #[test]
    fn listing_validation() {
        assert!(listing().validate().is_ok());

        let mut short = listing();
        short.title = "ab".into();
        assert!(matches!(short.validate(), Err(MarketError::Validation(_))));

        let mut free = listing();
        free.price_inr = 0;
        assert!(free.validate().is_err());

        let mut no_images = listing();
        no_images.images.clear();
        assert!(no_images.validate().is_err());

        let mut bad_image = listing();
        bad_image.images = vec!["ftp://img.example/book.jpg".into()];
        assert!(bad_image.validate().is_err());
    }

    #[test]
    fn update_request_validates_only_supplied_fields() {
        let patch = UpdateProductRequest {
            price_inr: Some(199),
            status: Some(ProductStatus::Sold),
            ..Default::default()
        }
        .into_patch()
        .unwrap();
        assert_eq!(patch.price_inr, Some(199));
        assert_eq!(patch.status, Some(ProductStatus::Sold));
        assert!(patch.title.is_none());

        let bad = UpdateProductRequest {
            title: Some("x".into()),
            ..Default::default()
        };
        assert!(bad.into_patch().is_err());
    }

    #[test]
    fn http_urls_only() {
        assert!(validate_http_url("Screenshot", "https://pay.example/s.png").is_ok());
        assert!(validate_http_url("Screenshot", "http://pay.example/s.png").is_ok());
        assert!(validate_http_url("Screenshot", "javascript:alert(1)").is_err());
        assert!(validate_http_url("Screenshot", "not a url").is_err());
    }

    #[test]
    fn profile_view_omits_password_hash() {
        let now = Utc::now();
        let account = UserAccount {
            id: "u1".into(),
            email: "a@uni.edu".into(),
            full_name: "Asha".into(),
            password_hash: "pbkdf2-sha256$1000$salt$hash".into(),
            phone: None,
            college_name: None,
            role: Role::Member,
            is_email_verified: true,
            created_at: now,
            updated_at: now,
        };
        let json = serde_json::to_string(&ProfileView::from(&account)).unwrap();
        assert!(!json.contains("pbkdf2"));
        assert!(json.contains("\"email\":\"a@uni.edu\""));
    }
}
