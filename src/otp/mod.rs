// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Email Passcode Signup
//!
//! Issues six-digit passcodes by email and turns a correct passcode into a
//! new account.
//!
//! ## Flow
//!
//! 1. `issue`: normalise the email, generate a code, store its keyed digest
//!    with an expiry (replacing any earlier code), then send the mail. A
//!    delivery failure is reported but the stored code is kept.
//! 2. `verify`: validate the profile, hash the password, then consume the
//!    code and create the account in one write transaction.
//!
//! Absent, mismatched and expired codes are reported identically.

pub mod sweeper;

use std::sync::Arc;

use base64ct::{Base64, Encoding};
use chrono::TimeDelta;
use hmac::{Hmac, Mac};
use ring::rand::{SecureRandom, SystemRandom};
use sha2::Sha256;
use unicode_normalization::UnicodeNormalization;
use uuid::Uuid;

use crate::auth::{hash_password, Role, MIN_PASSWORD_CHARS};
use crate::clock::Clock;
use crate::config::Secret;
use crate::error::{MarketError, MarketResult};
use crate::mail::{templates, Mailer};
use crate::storage::{MarketDb, OtpRepository, StoredOtp, UserAccount, UserRepository};

pub use sweeper::OtpSweeper;

type HmacSha256 = Hmac<Sha256>;

const CODE_MIN: u32 = 100_000;
const CODE_RANGE: u32 = 900_000;
const MAX_EMAIL_CHARS: usize = 254;
const MAX_NAME_CHARS: usize = 100;

/// Profile submitted together with the passcode.
#[derive(Debug, Clone)]
pub struct SignupRequest {
    pub email: String,
    pub code: String,
    pub name: String,
    pub password: String,
    pub phone: Option<String>,
    pub college_name: Option<String>,
}

/// Passcode issuance and verification.
pub struct OtpService {
    db: Arc<MarketDb>,
    mailer: Arc<dyn Mailer>,
    clock: Arc<dyn Clock>,
    secret: Secret,
    ttl: TimeDelta,
}

impl OtpService {
    pub fn new(
        db: Arc<MarketDb>,
        mailer: Arc<dyn Mailer>,
        clock: Arc<dyn Clock>,
        secret: Secret,
        ttl: TimeDelta,
    ) -> Self {
        Self {
            db,
            mailer,
            clock,
            secret,
            ttl,
        }
    }

    /// Store a fresh code for `raw_email` and mail it.
    pub async fn issue(&self, raw_email: &str) -> MarketResult<()> {
        let email = normalize_email(raw_email)?;
        let code = generate_code()?;
        let now = self.clock.now();

        let otp = StoredOtp {
            code_digest: self.digest(&email, &code)?,
            email: email.clone(),
            expires_at: now + self.ttl,
            created_at: now,
        };
        OtpRepository::new(&self.db).upsert(&otp)?;
        tracing::info!(email = %email, expires_at = %otp.expires_at, "Verification code stored");

        self.mailer
            .send(templates::verification_code(&email, &code))
            .await?;
        tracing::info!(email = %email, "Verification code sent");
        Ok(())
    }

    /// Consume a code and create the account it proves.
    pub async fn verify(&self, request: SignupRequest) -> MarketResult<UserAccount> {
        let email = normalize_email(&request.email)?;
        let name = request.name.trim().to_string();
        if name.is_empty() || name.chars().count() > MAX_NAME_CHARS {
            return Err(MarketError::validation(format!(
                "Name must be between 1 and {MAX_NAME_CHARS} characters"
            )));
        }
        if request.password.chars().count() < MIN_PASSWORD_CHARS {
            return Err(MarketError::validation(format!(
                "Password must be at least {MIN_PASSWORD_CHARS} characters"
            )));
        }
        let code = request.code;

        // Skip the password hashing work for codes that cannot succeed
        let now = self.clock.now();
        let pending = OtpRepository::new(&self.db).get(&email)?;
        let plausible = pending
            .as_ref()
            .is_some_and(|otp| !otp.is_expired(now) && self.code_matches(otp, &code));
        if !plausible {
            tracing::info!(email = %email, "Verification code rejected");
            return Err(MarketError::InvalidCode);
        }

        let password = request.password;
        let password_hash = tokio::task::spawn_blocking(move || hash_password(&password))
            .await
            .map_err(|e| MarketError::Internal(format!("password hashing task failed: {e}")))?
            .map_err(|e| MarketError::Internal(e.to_string()))?;

        let account = UserAccount {
            id: Uuid::new_v4().to_string(),
            email: email.clone(),
            full_name: name,
            password_hash,
            phone: optional_field(request.phone),
            college_name: optional_field(request.college_name),
            role: Role::Member,
            is_email_verified: true,
            created_at: now,
            updated_at: now,
        };

        let now = self.clock.now();
        UserRepository::new(&self.db).create_from_passcode(&account, now, |otp| {
            self.code_matches(otp, &code)
        })?;
        tracing::info!(user_id = %account.id, email = %email, "Account created from verified email");
        Ok(account)
    }

    fn mac(&self, email: &str, code: &str) -> MarketResult<HmacSha256> {
        let mut mac = HmacSha256::new_from_slice(self.secret.expose().as_bytes())
            .map_err(|e| MarketError::Internal(format!("HMAC key init failed: {e}")))?;
        mac.update(email.as_bytes());
        mac.update(b":");
        mac.update(code.as_bytes());
        Ok(mac)
    }

    fn digest(&self, email: &str, code: &str) -> MarketResult<String> {
        let tag = self.mac(email, code)?.finalize().into_bytes();
        Ok(Base64::encode_string(&tag))
    }

    /// Constant-time comparison of `code` against the stored digest.
    fn code_matches(&self, otp: &StoredOtp, code: &str) -> bool {
        let Ok(expected) = Base64::decode_vec(&otp.code_digest) else {
            return false;
        };
        match self.mac(&otp.email, code) {
            Ok(mac) => mac.verify_slice(&expected).is_ok(),
            Err(_) => false,
        }
    }
}

/// NFKC-normalise, trim and lowercase an email, then check its shape.
pub fn normalize_email(raw: &str) -> MarketResult<String> {
    let email: String = raw.nfkc().collect::<String>().trim().to_lowercase();
    if email.is_empty() {
        return Err(MarketError::validation("Email is required"));
    }
    if email.chars().count() > MAX_EMAIL_CHARS || email.chars().any(char::is_whitespace) {
        return Err(MarketError::validation("Email address is invalid"));
    }

    let mut parts = email.split('@');
    let (Some(local), Some(domain), None) = (parts.next(), parts.next(), parts.next()) else {
        return Err(MarketError::validation("Email address is invalid"));
    };
    let domain_ok = domain.contains('.')
        && !domain.starts_with('.')
        && !domain.ends_with('.')
        && !domain.contains("..");
    if local.is_empty() || !domain_ok {
        return Err(MarketError::validation("Email address is invalid"));
    }
    Ok(email)
}

/// Uniform six-digit code in `[100000, 999999]` from the OS CSPRNG.
pub fn generate_code() -> MarketResult<String> {
    let rng = SystemRandom::new();
    // Largest multiple of CODE_RANGE that fits in u32; draws above it are
    // rejected so every code is equally likely.
    let limit = (u32::MAX / CODE_RANGE) * CODE_RANGE;
    loop {
        let mut bytes = [0u8; 4];
        rng.fill(&mut bytes)
            .map_err(|_| MarketError::Internal("system randomness unavailable".into()))?;
        let draw = u32::from_le_bytes(bytes);
        if draw < limit {
            return Ok((CODE_MIN + draw % CODE_RANGE).to_string());
        }
    }
}

fn optional_field(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}
