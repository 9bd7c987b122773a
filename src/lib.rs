// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! SwapNest - Campus Marketplace Server
//!
//! Members sign up with an emailed passcode, buy listing quota as
//! subscription grants paid by screenshot, and publish listings once an
//! administrator approves the payment.
//!
//! ## Modules
//!
//! - `api` - HTTP API handlers (Axum)
//! - `auth` - Session tokens, passwords and role extractors
//! - `bootstrap` - Catalog seeding and administrator provisioning
//! - `mail` - Outgoing mail (SMTP or log)
//! - `otp` - Signup passcodes and their expiry sweeper
//! - `storage` - Embedded redb database and repositories

pub mod api;
pub mod auth;
pub mod bootstrap;
pub mod clock;
pub mod config;
pub mod error;
pub mod events;
pub mod mail;
pub mod models;
pub mod otp;
pub mod state;
pub mod storage;
