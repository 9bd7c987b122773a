// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Change Notifications
//!
//! In-process broadcast of "something changed" events. Handlers publish after
//! a write commits; `/v1/events` subscribers re-fetch the named record.
//!
//! Delivery is best effort: events carry identifiers only and are never the
//! source of truth. A subscriber that falls behind is told to resync instead
//! of receiving the dropped events.

use serde::Serialize;
use tokio::sync::broadcast;
use utoipa::ToSchema;

use crate::auth::AuthenticatedUser;

/// Buffered events per subscriber before it is considered lagging.
pub const DEFAULT_CAPACITY: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    ProductCreated,
    ProductUpdated,
    ProductDeleted,
    SubscriptionCreated,
    PaymentSubmitted,
    PaymentApproved,
    PaymentRejected,
    ConversationStarted,
    MessagePosted,
}

/// Who may see an event.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Audience {
    pub everyone: bool,
    pub admins: bool,
    pub users: Vec<String>,
}

impl Audience {
    pub fn everyone() -> Self {
        Self {
            everyone: true,
            ..Self::default()
        }
    }

    pub fn users<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            users: ids.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    pub fn with_admins(mut self) -> Self {
        self.admins = true;
        self
    }
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ChangeEvent {
    pub kind: ChangeKind,
    /// Identifier of the changed record
    pub record_id: String,
    #[serde(skip)]
    pub audience: Audience,
}

impl ChangeEvent {
    pub fn new(kind: ChangeKind, record_id: impl Into<String>, audience: Audience) -> Self {
        Self {
            kind,
            record_id: record_id.into(),
            audience,
        }
    }

    pub fn is_visible_to(&self, user: &AuthenticatedUser) -> bool {
        self.audience.everyone
            || (self.audience.admins && user.is_admin())
            || self.audience.users.iter().any(|id| id == &user.user_id)
    }
}

/// Broadcast hub shared through application state.
#[derive(Debug, Clone)]
pub struct EventHub {
    tx: broadcast::Sender<ChangeEvent>,
}

impl EventHub {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Publish an event. Having no subscribers is not an error.
    pub fn publish(&self, event: ChangeEvent) {
        tracing::debug!(kind = ?event.kind, record_id = %event.record_id, "Change event");
        let _ = self.tx.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ChangeEvent> {
        self.tx.subscribe()
    }
}

impl Default for EventHub {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}
