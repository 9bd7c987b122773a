// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;

use crate::auth::TokenIssuer;
use crate::clock::Clock;
use crate::config::AppConfig;
use crate::events::EventHub;
use crate::mail::Mailer;
use crate::otp::OtpService;
use crate::storage::MarketDb;

/// Shared handler state. Cloning is cheap; everything is reference counted.
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<MarketDb>,
    pub mailer: Arc<dyn Mailer>,
    pub clock: Arc<dyn Clock>,
    pub tokens: Arc<TokenIssuer>,
    pub otp: Arc<OtpService>,
    pub events: EventHub,
    /// Operations mailbox notified on payment approval
    pub admin_notify_email: Option<String>,
    /// Cancelled when the server begins shutting down
    pub shutdown: CancellationToken,
    pub started_at: DateTime<Utc>,
}

impl AppState {
    pub fn new(
        config: &AppConfig,
        db: Arc<MarketDb>,
        mailer: Arc<dyn Mailer>,
        clock: Arc<dyn Clock>,
        shutdown: CancellationToken,
    ) -> Self {
        let otp = OtpService::new(
            db.clone(),
            mailer.clone(),
            clock.clone(),
            config.otp_secret.clone(),
            config.otp_ttl,
        );
        let started_at = clock.now();

        Self {
            tokens: Arc::new(TokenIssuer::new(
                config.jwt_secret.expose().as_bytes(),
                config.token_ttl,
            )),
            otp: Arc::new(otp),
            events: EventHub::default(),
            admin_notify_email: config.admin_notify_email.clone(),
            db,
            mailer,
            clock,
            shutdown,
            started_at,
        }
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }
}
