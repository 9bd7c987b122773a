// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! SMTP transport backed by lettre.

use async_trait::async_trait;
use lettre::{
    message::{header::ContentType, Mailbox},
    transport::smtp::authentication::Credentials,
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};

use super::{MailError, Mailer, OutgoingEmail};
use crate::config::SmtpConfig;

/// Port that speaks TLS from the first byte; every other port upgrades with
/// STARTTLS.
const IMPLICIT_TLS_PORT: u16 = 465;

/// Pooled async SMTP relay.
pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl SmtpMailer {
    pub fn new(config: &SmtpConfig, from: &str) -> Result<Self, MailError> {
        let from = parse_mailbox(from)?;

        let builder = if config.port == IMPLICIT_TLS_PORT {
            AsyncSmtpTransport::<Tokio1Executor>::relay(&config.host)
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.host)
        }
        .map_err(|e| MailError::Transport(e.to_string()))?;

        let mut builder = builder.port(config.port);
        if let Some(user) = &config.user {
            let pass = config
                .pass
                .as_ref()
                .map(|p| p.expose().to_string())
                .unwrap_or_default();
            builder = builder.credentials(Credentials::new(user.clone(), pass));
        }

        tracing::info!(host = %config.host, port = config.port, "SMTP mailer configured");
        Ok(Self {
            transport: builder.build(),
            from,
        })
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send(&self, email: OutgoingEmail) -> Result<(), MailError> {
        let message = build_message(&self.from, &email)?;
        self.transport
            .send(message)
            .await
            .map_err(|e| MailError::Transport(e.to_string()))?;
        tracing::debug!(to = %email.to, subject = %email.subject, "Email sent");
        Ok(())
    }
}

fn parse_mailbox(address: &str) -> Result<Mailbox, MailError> {
    address.parse().map_err(|e: lettre::address::AddressError| MailError::InvalidAddress {
        address: address.to_string(),
        reason: e.to_string(),
    })
}

fn build_message(from: &Mailbox, email: &OutgoingEmail) -> Result<Message, MailError> {
    Message::builder()
        .from(from.clone())
        .to(parse_mailbox(&email.to)?)
        .subject(email.subject.as_str())
        .header(ContentType::TEXT_PLAIN)
        .body(email.body.clone())
        .map_err(|e| MailError::Build(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn email(to: &str) -> OutgoingEmail {
        OutgoingEmail {
            to: to.to_string(),
            subject: "Your Verification Code".to_string(),
            body: "Your verification code is: 123456".to_string(),
        }
    }

    #[test]
    fn builds_plain_text_message() {
        let from = parse_mailbox("SwapNest <no-reply@swapnest.test>").unwrap();
        let message = build_message(&from, &email("asha@uni.edu")).unwrap();
        let raw = String::from_utf8(message.formatted()).unwrap();
        assert!(raw.contains("Subject: Your Verification Code"));
        assert!(raw.contains("To: asha@uni.edu"));
        assert!(raw.contains("Your verification code is: 123456"));
    }

    #[test]
    fn invalid_recipient_is_reported() {
        let from = parse_mailbox("no-reply@swapnest.test").unwrap();
        let err = build_message(&from, &email("not an address")).unwrap_err();
        assert!(matches!(err, MailError::InvalidAddress { .. }));
    }

    #[tokio::test]
    async fn constructs_for_both_tls_modes() {
        for port in [465, 587] {
            let config = SmtpConfig {
                host: "smtp.example.com".to_string(),
                port,
                user: Some("mailer".to_string()),
                pass: None,
            };
            assert!(SmtpMailer::new(&config, "no-reply@swapnest.test").is_ok());
        }
    }
}
