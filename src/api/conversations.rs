// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Buyer/seller messaging endpoints.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};

use crate::{
    auth::Auth,
    error::{ApiError, ApiJson, MarketError},
    events::{Audience, ChangeEvent, ChangeKind},
    models::{ConversationView, OpenConversationRequest, PostMessageRequest},
    state::AppState,
    storage::{Conversation, ConversationRepository, DbError, Message},
};

fn participants(conversation: &Conversation) -> Audience {
    Audience::users([&conversation.buyer_id, &conversation.seller_id])
}

/// Start (or resume) a conversation with a listing's seller.
#[utoipa::path(
    post,
    path = "/v1/conversations",
    request_body = OpenConversationRequest,
    tag = "Messaging",
    security(("bearer_auth" = [])),
    responses(
        (status = 201, description = "Conversation created", body = Conversation),
        (status = 200, description = "Existing conversation", body = Conversation),
        (status = 400, description = "Own listing"),
        (status = 404, description = "Listing not found")
    )
)]
pub async fn open_conversation(
    Auth(user): Auth,
    State(state): State<AppState>,
    ApiJson(request): ApiJson<OpenConversationRequest>,
) -> Result<(StatusCode, Json<Conversation>), ApiError> {
    let (conversation, created) =
        ConversationRepository::new(&state.db).open(&request.product_id, &user.user_id, state.now())?;

    if !created {
        return Ok((StatusCode::OK, Json(conversation)));
    }
    tracing::info!(
        conversation_id = %conversation.id,
        product_id = %conversation.product_id,
        user_id = %user.user_id,
        "Conversation started"
    );
    state.events.publish(ChangeEvent::new(
        ChangeKind::ConversationStarted,
        &conversation.id,
        participants(&conversation),
    ));
    Ok((StatusCode::CREATED, Json(conversation)))
}

/// The caller's conversations, most recent activity first.
#[utoipa::path(
    get,
    path = "/v1/conversations",
    tag = "Messaging",
    security(("bearer_auth" = [])),
    responses((status = 200, body = [ConversationView]))
)]
pub async fn list_conversations(
    Auth(user): Auth,
    State(state): State<AppState>,
) -> Result<Json<Vec<ConversationView>>, ApiError> {
    let repo = ConversationRepository::new(&state.db);
    let conversations = repo.list_for_user(&user.user_id).map_err(MarketError::from)?;

    let views = conversations
        .into_iter()
        .map(|conversation| {
            let unread_count = repo.unread_count(&conversation.id, &user.user_id)?;
            Ok(ConversationView {
                conversation,
                unread_count,
            })
        })
        .collect::<Result<Vec<_>, DbError>>()
        .map_err(MarketError::from)?;
    Ok(Json(views))
}

/// Messages in a conversation, oldest first. Marks the other party's messages read.
#[utoipa::path(
    get,
    path = "/v1/conversations/{conversation_id}/messages",
    params(
        ("conversation_id" = String, Path, description = "Conversation identifier")
    ),
    tag = "Messaging",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, body = [Message]),
        (status = 403, description = "Not a participant"),
        (status = 404, description = "Conversation not found")
    )
)]
pub async fn list_messages(
    Auth(user): Auth,
    Path(conversation_id): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<Vec<Message>>, ApiError> {
    let messages =
        ConversationRepository::new(&state.db).read_messages(&conversation_id, &user.user_id)?;
    Ok(Json(messages))
}

/// Send a message.
#[utoipa::path(
    post,
    path = "/v1/conversations/{conversation_id}/messages",
    params(
        ("conversation_id" = String, Path, description = "Conversation identifier")
    ),
    request_body = PostMessageRequest,
    tag = "Messaging",
    security(("bearer_auth" = [])),
    responses(
        (status = 201, body = Message),
        (status = 400, description = "Empty or overlong message"),
        (status = 403, description = "Not a participant")
    )
)]
pub async fn post_message(
    Auth(user): Auth,
    Path(conversation_id): Path<String>,
    State(state): State<AppState>,
    ApiJson(request): ApiJson<PostMessageRequest>,
) -> Result<(StatusCode, Json<Message>), ApiError> {
    let (conversation, message) = ConversationRepository::new(&state.db).post_message(
        &conversation_id,
        &user.user_id,
        &request.content,
        state.now(),
    )?;

    tracing::debug!(conversation_id = %conversation.id, message_id = %message.id, "Message posted");
    state.events.publish(ChangeEvent::new(
        ChangeKind::MessagePosted,
        &conversation.id,
        participants(&conversation),
    ));
    Ok((StatusCode::CREATED, Json(message)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::AuthenticatedUser;
    use crate::clock::Clock;
    use crate::state::test_support::TestContext;
    use crate::storage::{Product, ProductCondition, ProductRepository, ProductStatus, UserAccount};

    fn auth(account: &UserAccount) -> Auth {
        Auth(AuthenticatedUser {
            user_id: account.id.clone(),
            role: account.role,
            session_id: "sess".into(),
            expires_at: 0,
        })
    }

    fn publish(ctx: &TestContext, seller: &UserAccount) -> Product {
        ctx.verified_grant(seller, 1);
        let now = ctx.clock.now();
        let product = Product {
            id: "p1".into(),
            seller_id: seller.id.clone(),
            category_id: ctx.category_id(),
            title: "Mini fridge".into(),
            description: "Cold".into(),
            price_inr: 2500,
            original_price_inr: None,
            condition: ProductCondition::Fair,
            images: vec!["https://img.example/fridge.jpg".into()],
            location: None,
            is_negotiable: true,
            status: ProductStatus::Active,
            views: 0,
            created_at: now,
            updated_at: now,
        };
        ProductRepository::new(&ctx.state.db)
            .create_listing(&product, now)
            .unwrap();
        product
    }

    fn open_body(product_id: &str) -> ApiJson<OpenConversationRequest> {
        ApiJson(OpenConversationRequest {
            product_id: product_id.into(),
        })
    }

    fn say(content: &str) -> ApiJson<PostMessageRequest> {
        ApiJson(PostMessageRequest {
            content: content.into(),
        })
    }

    #[tokio::test]
    async fn open_is_get_or_create() {
        let ctx = TestContext::new();
        let seller = ctx.member("asha@uni.edu");
        let buyer = ctx.member("ravi@uni.edu");
        let product = publish(&ctx, &seller);

        let (status, Json(first)) = open_conversation(auth(&buyer), State(ctx.state.clone()), open_body(&product.id))
            .await
            .unwrap();
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(first.seller_id, seller.id);

        let (status, Json(second)) = open_conversation(auth(&buyer), State(ctx.state.clone()), open_body(&product.id))
            .await
            .unwrap();
        assert_eq!(status, StatusCode::OK);
        assert_eq!(second.id, first.id);

        let err = open_conversation(auth(&seller), State(ctx.state.clone()), open_body(&product.id))
            .await
            .unwrap_err();
        assert_eq!(err.status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn messages_flow_between_participants() {
        let ctx = TestContext::new();
        let seller = ctx.member("asha@uni.edu");
        let buyer = ctx.member("ravi@uni.edu");
        let outsider = ctx.member("zoe@uni.edu");
        let product = publish(&ctx, &seller);
        let (_, Json(conversation)) =
            open_conversation(auth(&buyer), State(ctx.state.clone()), open_body(&product.id))
                .await
                .unwrap();
        let mut events = ctx.state.events.subscribe();

        let (status, Json(message)) = post_message(
            auth(&buyer),
            Path(conversation.id.clone()),
            State(ctx.state.clone()),
            say("  Is it still available?  "),
        )
        .await
        .unwrap();
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(message.content, "Is it still available?");

        let event = events.recv().await.unwrap();
        assert_eq!(event.kind, ChangeKind::MessagePosted);
        assert_eq!(event.record_id, conversation.id);

        let Json(inbox) = list_conversations(auth(&seller), State(ctx.state.clone()))
            .await
            .unwrap();
        assert_eq!(inbox.len(), 1);
        assert_eq!(inbox[0].unread_count, 1);

        let Json(messages) = list_messages(auth(&seller), Path(conversation.id.clone()), State(ctx.state.clone()))
            .await
            .unwrap();
        assert_eq!(messages.len(), 1);
        assert!(messages[0].is_read);

        let Json(inbox) = list_conversations(auth(&seller), State(ctx.state.clone()))
            .await
            .unwrap();
        assert_eq!(inbox[0].unread_count, 0);

        let err = list_messages(auth(&outsider), Path(conversation.id.clone()), State(ctx.state.clone()))
            .await
            .unwrap_err();
        assert_eq!(err.status, StatusCode::FORBIDDEN);

        let err = post_message(auth(&buyer), Path(conversation.id), State(ctx.state.clone()), say("   "))
            .await
            .unwrap_err();
        assert_eq!(err.status, StatusCode::BAD_REQUEST);
    }
}
