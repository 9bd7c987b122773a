// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Startup seeding: default catalog and the configured administrator.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::auth::{hash_password, Role};
use crate::config::AdminBootstrap;
use crate::error::{MarketError, MarketResult};
use crate::otp::normalize_email;
use crate::storage::{CatalogRepository, DbResult, MarketDb, UserAccount, UserRepository};

/// What [`ensure_admin`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdminProvisioning {
    Created,
    Promoted,
    Unchanged,
}

/// Seed plans and categories into empty tables.
pub fn seed_catalog(db: &MarketDb, now: DateTime<Utc>) -> DbResult<()> {
    let (plans, categories) = CatalogRepository::new(db).seed_defaults(now)?;
    if plans + categories > 0 {
        tracing::info!(plans, categories, "Seeded default catalog");
    }
    Ok(())
}

/// Make sure the configured administrator exists and holds the admin role.
///
/// An existing account keeps its password; only the role is raised.
pub fn ensure_admin(
    db: &MarketDb,
    admin: &AdminBootstrap,
    now: DateTime<Utc>,
) -> MarketResult<AdminProvisioning> {
    let email = normalize_email(&admin.email)?;
    let users = UserRepository::new(db);

    if let Some(account) = users.find_by_email(&email)? {
        if account.is_admin() {
            return Ok(AdminProvisioning::Unchanged);
        }
        users.set_role(&account.id, Role::Admin, now)?;
        tracing::warn!(user_id = %account.id, email = %email, "Existing account promoted to admin");
        return Ok(AdminProvisioning::Promoted);
    }

    let password_hash =
        hash_password(admin.password.expose()).map_err(|e| MarketError::Internal(e.to_string()))?;
    let account = UserAccount {
        id: Uuid::new_v4().to_string(),
        email: email.clone(),
        full_name: "Administrator".to_string(),
        password_hash,
        phone: None,
        college_name: None,
        role: Role::Admin,
        is_email_verified: true,
        created_at: now,
        updated_at: now,
    };
    users.create(&account)?;
    tracing::info!(user_id = %account.id, email = %email, "Administrator account created");
    Ok(AdminProvisioning::Created)
}
