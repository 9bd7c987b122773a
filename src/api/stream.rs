// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Server-sent change notifications.
//!
//! Each connection gets its own broadcast receiver and sees only the events
//! whose audience includes the caller. Events are named `change`; a
//! subscriber that lagged behind gets one `resync` event carrying the number
//! of dropped events and should re-fetch whatever it displays.
//!
//! Admin audiences follow the stored account role at connect time, and the
//! stream ends when the session token expires.

use std::time::Duration;

use axum::{
    extract::State,
    response::sse::{Event, KeepAlive, Sse},
};
use futures::{stream, Stream, StreamExt};
use tokio::{
    sync::broadcast::{self, error::RecvError},
    time::Instant,
};
use tokio_util::sync::CancellationToken;

use crate::{
    auth::{Auth, AuthError, AuthenticatedUser, Role},
    events::ChangeEvent,
    state::AppState,
    storage::UserRepository,
};

#[derive(Debug)]
enum Delivery {
    Change(ChangeEvent),
    Resync(u64),
}

struct Subscription {
    rx: broadcast::Receiver<ChangeEvent>,
    user: AuthenticatedUser,
    shutdown: CancellationToken,
    deadline: Instant,
}

fn deliveries(
    rx: broadcast::Receiver<ChangeEvent>,
    user: AuthenticatedUser,
    shutdown: CancellationToken,
    deadline: Instant,
) -> impl Stream<Item = Delivery> {
    let sub = Subscription {
        rx,
        user,
        shutdown,
        deadline,
    };
    stream::unfold(sub, |mut sub| async move {
        loop {
            let received = tokio::select! {
                biased;
                _ = sub.shutdown.cancelled() => return None,
                _ = tokio::time::sleep_until(sub.deadline) => {
                    tracing::debug!(user_id = %sub.user.user_id, "Event stream session expired");
                    return None;
                }
                received = sub.rx.recv() => received,
            };
            match received {
                Ok(event) if event.is_visible_to(&sub.user) => {
                    return Some((Delivery::Change(event), sub));
                }
                Ok(_) => continue,
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(user_id = %sub.user.user_id, skipped, "Event subscriber lagged");
                    return Some((Delivery::Resync(skipped), sub));
                }
                Err(RecvError::Closed) => return None,
            }
        }
    })
}

/// The caller as the stream sees them: an admin token only counts while the
/// stored account is still an administrator.
fn viewer(state: &AppState, mut user: AuthenticatedUser) -> Result<AuthenticatedUser, AuthError> {
    if user.is_admin() {
        let account = UserRepository::new(&state.db)
            .find(&user.user_id)
            .map_err(|e| AuthError::Internal(e.to_string()))?;
        if !account.is_some_and(|account| account.is_admin()) {
            tracing::warn!(user_id = %user.user_id, "Admin token for non-admin account");
            user.role = Role::Member;
        }
    }
    Ok(user)
}

/// Instant at which the session behind `user` expires.
fn session_deadline(state: &AppState, user: &AuthenticatedUser) -> Instant {
    let remaining = user.expires_at.saturating_sub(state.now().timestamp()).max(0);
    Instant::now() + Duration::from_secs(remaining as u64)
}

fn to_sse(delivery: Delivery) -> Result<Event, axum::Error> {
    match delivery {
        Delivery::Change(event) => Event::default().event("change").json_data(&event),
        Delivery::Resync(skipped) => Ok(Event::default().event("resync").data(skipped.to_string())),
    }
}

/// Subscribe to change notifications visible to the caller.
#[utoipa::path(
    get,
    path = "/v1/events",
    tag = "Events",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Server-sent event stream", content_type = "text/event-stream", body = ChangeEvent),
        (status = 401, description = "Missing or invalid token")
    )
)]
pub async fn event_stream(
    Auth(user): Auth,
    State(state): State<AppState>,
) -> Result<Sse<impl Stream<Item = Result<Event, axum::Error>>>, AuthError> {
    let user = viewer(&state, user)?;
    let deadline = session_deadline(&state, &user);
    tracing::debug!(user_id = %user.user_id, role = ?user.role, "Event stream opened");
    let rx = state.events.subscribe();
    let events = deliveries(rx, user, state.shutdown.clone(), deadline).map(to_sse);
    Ok(Sse::new(events).keep_alive(KeepAlive::default()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{Audience, ChangeKind, EventHub};
    use crate::state::test_support::TestContext;

    fn user(id: &str) -> AuthenticatedUser {
        AuthenticatedUser {
            user_id: id.to_string(),
            role: Role::Member,
            session_id: "s".to_string(),
            expires_at: 0,
        }
    }

    fn later() -> Instant {
        Instant::now() + Duration::from_secs(3600)
    }

    #[tokio::test]
    async fn only_visible_events_are_delivered() {
        let hub = EventHub::new(8);
        let mut stream = Box::pin(deliveries(hub.subscribe(), user("u1"), CancellationToken::new(), later()));

        hub.publish(ChangeEvent::new(ChangeKind::MessagePosted, "c9", Audience::users(["u2"])));
        hub.publish(ChangeEvent::new(ChangeKind::MessagePosted, "c1", Audience::users(["u1"])));

        match stream.next().await {
            Some(Delivery::Change(event)) => assert_eq!(event.record_id, "c1"),
            other => panic!("unexpected delivery: {other:?}"),
        }
    }

    #[tokio::test]
    async fn lagging_subscriber_gets_resync() {
        let hub = EventHub::new(1);
        let mut stream = Box::pin(deliveries(hub.subscribe(), user("u1"), CancellationToken::new(), later()));

        hub.publish(ChangeEvent::new(ChangeKind::ProductCreated, "p1", Audience::everyone()));
        hub.publish(ChangeEvent::new(ChangeKind::ProductCreated, "p2", Audience::everyone()));

        assert!(matches!(stream.next().await, Some(Delivery::Resync(1))));
        match stream.next().await {
            Some(Delivery::Change(event)) => assert_eq!(event.record_id, "p2"),
            other => panic!("unexpected delivery: {other:?}"),
        }
    }

    #[tokio::test]
    async fn stream_ends_on_shutdown() {
        let hub = EventHub::new(8);
        let shutdown = CancellationToken::new();
        let mut stream = Box::pin(deliveries(hub.subscribe(), user("u1"), shutdown.clone(), later()));

        shutdown.cancel();
        assert!(stream.next().await.is_none());
    }

    #[tokio::test]
    async fn stream_ends_when_session_expires() {
        let hub = EventHub::new(8);
        let mut stream = Box::pin(deliveries(
            hub.subscribe(),
            user("u1"),
            CancellationToken::new(),
            Instant::now(),
        ));

        hub.publish(ChangeEvent::new(ChangeKind::ProductCreated, "p1", Audience::everyone()));
        assert!(stream.next().await.is_none());
    }

    #[tokio::test]
    async fn session_deadline_follows_token_expiry() {
        let ctx = TestContext::new();
        let mut expired = user("u1");
        expired.expires_at = ctx.state.now().timestamp() - 5;
        assert!(session_deadline(&ctx.state, &expired) <= Instant::now());

        let mut live = user("u1");
        live.expires_at = ctx.state.now().timestamp() + 600;
        assert!(session_deadline(&ctx.state, &live) > Instant::now() + Duration::from_secs(500));
    }

    #[tokio::test]
    async fn demoted_admin_streams_as_member() {
        let ctx = TestContext::new();
        let member = ctx.member("asha@uni.edu");
        let admin = ctx.admin("ops@uni.edu");

        let mut stale = user(&member.id);
        stale.role = Role::Admin;
        let stale = viewer(&ctx.state, stale).unwrap();
        assert_eq!(stale.role, Role::Member);

        let mut current = user(&admin.id);
        current.role = Role::Admin;
        assert_eq!(viewer(&ctx.state, current).unwrap().role, Role::Admin);

        let hub = EventHub::new(8);
        let mut stream = Box::pin(deliveries(hub.subscribe(), stale, CancellationToken::new(), later()));
        let review = Audience::users(["u9"]).with_admins();
        hub.publish(ChangeEvent::new(ChangeKind::PaymentSubmitted, "s1", review));
        hub.publish(ChangeEvent::new(ChangeKind::ProductCreated, "p1", Audience::everyone()));
        match stream.next().await {
            Some(Delivery::Change(event)) => assert_eq!(event.record_id, "p1"),
            other => panic!("unexpected delivery: {other:?}"),
        }
    }
}
