// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Outbound Mail
//!
//! Transactional email (passcodes, payment approvals) goes through the
//! [`Mailer`] trait so that the transport can be swapped:
//!
//! - [`SmtpMailer`]: lettre SMTP relay, used when `SMTP_HOST` is set
//! - [`LogMailer`]: writes the message to the log, for local development

pub mod smtp;
pub mod templates;

use async_trait::async_trait;

pub use smtp::SmtpMailer;

/// A rendered plain-text email.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingEmail {
    pub to: String,
    pub subject: String,
    pub body: String,
}

#[derive(Debug, thiserror::Error)]
pub enum MailError {
    #[error("invalid address {address}: {reason}")]
    InvalidAddress { address: String, reason: String },

    #[error("failed to build message: {0}")]
    Build(String),

    #[error("mail transport failed: {0}")]
    Transport(String),
}

/// Mail transport.
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, email: OutgoingEmail) -> Result<(), MailError>;
}

/// Development mailer that logs instead of sending.
///
/// The body (passcodes included) is only logged at debug level.
#[derive(Debug, Default)]
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, email: OutgoingEmail) -> Result<(), MailError> {
        tracing::info!(
            to = %email.to,
            subject = %email.subject,
            "SMTP not configured; email logged instead of sent"
        );
        tracing::debug!(to = %email.to, body = %email.body, "Unsent email body");
        Ok(())
    }
}

/// Mailer that records messages, optionally failing every send.
#[cfg(test)]
#[derive(Debug, Default)]
pub struct RecordingMailer {
    sent: std::sync::Mutex<Vec<OutgoingEmail>>,
    fail: std::sync::atomic::AtomicBool,
}

#[cfg(test)]
impl RecordingMailer {
    pub fn sent(&self) -> Vec<OutgoingEmail> {
        self.sent.lock().unwrap().clone()
    }

    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, std::sync::atomic::Ordering::SeqCst);
    }
}

#[cfg(test)]
#[async_trait]
impl Mailer for RecordingMailer {
    async fn send(&self, email: OutgoingEmail) -> Result<(), MailError> {
        if self.fail.load(std::sync::atomic::Ordering::SeqCst) {
            return Err(MailError::Transport("connection refused".into()));
        }
        self.sent.lock().unwrap().push(email);
        Ok(())
    }
}
