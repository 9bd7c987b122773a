// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Runtime Configuration
//!
//! Configuration is loaded from the environment once at startup.
//!
//! ## Environment Variables
//!
//! | Variable | Description | Default |
//! |----------|-------------|---------|
//! | `HOST` | Server bind address | `0.0.0.0` |
//! | `PORT` | Server bind port | `4000` |
//! | `DATA_DIR` | Directory holding the database file | `./data` |
//! | `JWT_SECRET` | HS256 key for session tokens | Random per process |
//! | `TOKEN_TTL_SECS` | Session lifetime | `86400` |
//! | `OTP_SECRET` | HMAC key for stored passcode digests | `JWT_SECRET` |
//! | `OTP_TTL_SECS` | Passcode lifetime | `600` |
//! | `OTP_SWEEP_INTERVAL_SECS` | Expired passcode purge interval | `300` |
//! | `SMTP_HOST` | SMTP relay host; unset logs mail instead | Unset |
//! | `SMTP_PORT` | SMTP port (465 = implicit TLS, else STARTTLS) | `465` |
//! | `SMTP_USER` / `SMTP_PASS` | SMTP credentials | Unset |
//! | `MAIL_FROM` | Sender address | `SMTP_USER` or `no-reply@swapnest.local` |
//! | `ADMIN_EMAIL` / `ADMIN_PASSWORD` | Bootstrap administrator account | Unset |
//! | `ADMIN_NOTIFY_EMAIL` | Operations mailbox for approval notices | `ADMIN_EMAIL` |
//! | `LOG_FORMAT` | `json` for JSON lines, anything else is human-readable | `pretty` |
//! | `RUST_LOG` | Log level filter | `info,tower_http=debug` |

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use base64ct::{Base64, Encoding};
use chrono::TimeDelta;
use ring::rand::{SecureRandom, SystemRandom};

pub const HOST_ENV: &str = "HOST";
pub const PORT_ENV: &str = "PORT";
pub const DATA_DIR_ENV: &str = "DATA_DIR";
pub const JWT_SECRET_ENV: &str = "JWT_SECRET";
pub const TOKEN_TTL_ENV: &str = "TOKEN_TTL_SECS";
pub const OTP_SECRET_ENV: &str = "OTP_SECRET";
pub const OTP_TTL_ENV: &str = "OTP_TTL_SECS";
pub const OTP_SWEEP_INTERVAL_ENV: &str = "OTP_SWEEP_INTERVAL_SECS";
pub const SMTP_HOST_ENV: &str = "SMTP_HOST";
pub const SMTP_PORT_ENV: &str = "SMTP_PORT";
pub const SMTP_USER_ENV: &str = "SMTP_USER";
pub const SMTP_PASS_ENV: &str = "SMTP_PASS";
pub const MAIL_FROM_ENV: &str = "MAIL_FROM";
pub const ADMIN_EMAIL_ENV: &str = "ADMIN_EMAIL";
pub const ADMIN_PASSWORD_ENV: &str = "ADMIN_PASSWORD";
pub const ADMIN_NOTIFY_EMAIL_ENV: &str = "ADMIN_NOTIFY_EMAIL";
pub const LOG_FORMAT_ENV: &str = "LOG_FORMAT";

/// Default `RUST_LOG` filter.
pub const DEFAULT_LOG_FILTER: &str = "info,tower_http=debug";

const DEFAULT_HOST: &str = "0.0.0.0";
const DEFAULT_PORT: u16 = 4000;
const DEFAULT_DATA_DIR: &str = "./data";
const DEFAULT_TOKEN_TTL_SECS: i64 = 86_400;
const DEFAULT_OTP_TTL_SECS: i64 = 600;
const DEFAULT_OTP_SWEEP_SECS: u64 = 300;
const DEFAULT_SMTP_PORT: u16 = 465;
const DEFAULT_MAIL_FROM: &str = "no-reply@swapnest.local";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{var}={value:?} is invalid: {reason}")]
    Invalid {
        var: &'static str,
        value: String,
        reason: String,
    },

    #[error("{0}")]
    Incomplete(String),

    #[error("failed to generate a random secret")]
    Random,
}

/// String that is never printed.
#[derive(Clone, PartialEq, Eq)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret(***)")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    Json,
    #[default]
    Pretty,
}

#[derive(Debug, Clone)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub user: Option<String>,
    pub pass: Option<Secret>,
}

/// Administrator account ensured at startup.
#[derive(Debug, Clone)]
pub struct AdminBootstrap {
    pub email: String,
    pub password: Secret,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub data_dir: PathBuf,
    pub jwt_secret: Secret,
    /// True when `JWT_SECRET` was unset and a per-process key was generated
    pub jwt_secret_generated: bool,
    pub token_ttl: TimeDelta,
    pub otp_secret: Secret,
    pub otp_ttl: TimeDelta,
    pub otp_sweep_interval: Duration,
    pub smtp: Option<SmtpConfig>,
    pub mail_from: String,
    pub admin: Option<AdminBootstrap>,
    pub admin_notify_email: Option<String>,
    pub log_format: LogFormat,
}

impl AppConfig {
    /// Load from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load through an arbitrary variable lookup. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let (jwt_secret, jwt_secret_generated) = match get(JWT_SECRET_ENV) {
            Some(secret) => (Secret::new(secret), false),
            None => (random_secret()?, true),
        };
        let otp_secret = get(OTP_SECRET_ENV)
            .map(Secret::new)
            .unwrap_or_else(|| jwt_secret.clone());

        let token_ttl = positive_secs(TOKEN_TTL_ENV, get(TOKEN_TTL_ENV), DEFAULT_TOKEN_TTL_SECS)?;
        let otp_ttl = positive_secs(OTP_TTL_ENV, get(OTP_TTL_ENV), DEFAULT_OTP_TTL_SECS)?;
        let sweep_secs = parse_or(OTP_SWEEP_INTERVAL_ENV, get(OTP_SWEEP_INTERVAL_ENV), DEFAULT_OTP_SWEEP_SECS)?;
        if sweep_secs == 0 {
            return Err(ConfigError::Invalid {
                var: OTP_SWEEP_INTERVAL_ENV,
                value: "0".into(),
                reason: "must be positive".into(),
            });
        }

        let smtp_user = get(SMTP_USER_ENV);
        let smtp = match get(SMTP_HOST_ENV) {
            Some(host) => Some(SmtpConfig {
                host,
                port: parse_or(SMTP_PORT_ENV, get(SMTP_PORT_ENV), DEFAULT_SMTP_PORT)?,
                user: smtp_user.clone(),
                pass: get(SMTP_PASS_ENV).map(Secret::new),
            }),
            None => None,
        };
        let mail_from = get(MAIL_FROM_ENV)
            .or(smtp_user)
            .unwrap_or_else(|| DEFAULT_MAIL_FROM.to_string());

        let admin = match (get(ADMIN_EMAIL_ENV), get(ADMIN_PASSWORD_ENV)) {
            (Some(email), Some(password)) => Some(AdminBootstrap {
                email,
                password: Secret::new(password),
            }),
            (None, None) => None,
            _ => {
                return Err(ConfigError::Incomplete(format!(
                    "{ADMIN_EMAIL_ENV} and {ADMIN_PASSWORD_ENV} must be set together"
                )))
            }
        };

        let admin_notify_email = get(ADMIN_NOTIFY_EMAIL_ENV)
            .or_else(|| admin.as_ref().map(|admin| admin.email.clone()));

        let log_format = match get(LOG_FORMAT_ENV).as_deref() {
            Some("json") => LogFormat::Json,
            _ => LogFormat::Pretty,
        };

        Ok(Self {
            host: get(HOST_ENV).unwrap_or_else(|| DEFAULT_HOST.to_string()),
            port: parse_or(PORT_ENV, get(PORT_ENV), DEFAULT_PORT)?,
            data_dir: PathBuf::from(get(DATA_DIR_ENV).unwrap_or_else(|| DEFAULT_DATA_DIR.to_string())),
            jwt_secret,
            jwt_secret_generated,
            token_ttl,
            otp_secret,
            otp_ttl,
            otp_sweep_interval: Duration::from_secs(sweep_secs),
            smtp,
            mail_from,
            admin,
            admin_notify_email,
            log_format,
        })
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn parse_or<T>(var: &'static str, value: Option<String>, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    match value {
        None => Ok(default),
        Some(raw) => raw.parse().map_err(|e: T::Err| ConfigError::Invalid {
            var,
            value: raw.clone(),
            reason: e.to_string(),
        }),
    }
}

fn positive_secs(var: &'static str, value: Option<String>, default: i64) -> Result<TimeDelta, ConfigError> {
    let secs: i64 = parse_or(var, value, default)?;
    if secs <= 0 {
        return Err(ConfigError::Invalid {
            var,
            value: secs.to_string(),
            reason: "must be positive".into(),
        });
    }
    TimeDelta::try_seconds(secs).ok_or_else(|| ConfigError::Invalid {
        var,
        value: secs.to_string(),
        reason: "out of range".into(),
    })
}

fn random_secret() -> Result<Secret, ConfigError> {
    let mut bytes = [0u8; 32];
    SystemRandom::new()
        .fill(&mut bytes)
        .map_err(|_| ConfigError::Random)?;
    Ok(Secret::new(Base64::encode_string(&bytes)))
}
