// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Authentication Module
//!
//! Session authentication for the SwapNest API.
//!
//! ## Auth Flow
//!
//! 1. A member proves email ownership with a one-time passcode and sets a
//!    password (`/verify-otp`)
//! 2. `POST /v1/auth/login` checks the password and returns a session token
//! 3. Clients send `Authorization: Bearer <token>`
//! 4. The server verifies the HS256 signature, expiry and issuer, then
//!    extracts:
//!    - `sub` → canonical `user_id`
//!    - `role` → copied from the account record when the token was issued
//!
//! ## Security
//!
//! - All non-health, non-signup endpoints require authentication
//! - Admin endpoints re-check the stored account role
//! - Passwords are stored as salted PBKDF2 hashes
//! - Clock skew tolerance is 60 seconds

pub mod claims;
pub mod error;
pub mod extractor;
pub mod password;
pub mod roles;
pub mod tokens;

pub use claims::{AuthenticatedUser, SessionClaims};
pub use error::AuthError;
pub use extractor::{AdminOnly, Auth};
pub use password::{hash_password, verify_password, MIN_PASSWORD_CHARS};
pub use roles::Role;
pub use tokens::{IssuedToken, TokenIssuer, TOKEN_ISSUER};
