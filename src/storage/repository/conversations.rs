// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Buyer/seller conversations about a listing, and their messages.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::error::{MarketError, MarketResult};
use crate::storage::database::{
    get_json, put_json, scan_json, DbResult, MarketDb, CONVERSATIONS, MESSAGES, PRODUCTS,
};

use super::products::Product;

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
pub struct Conversation {
    pub id: String,
    pub product_id: String,
    pub buyer_id: String,
    pub seller_id: String,
    pub last_message_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl Conversation {
    pub fn has_participant(&self, user_id: &str) -> bool {
        self.buyer_id == user_id || self.seller_id == user_id
    }

    /// The participant that is not `user_id`.
    pub fn counterpart(&self, user_id: &str) -> &str {
        if self.buyer_id == user_id {
            &self.seller_id
        } else {
            &self.buyer_id
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
pub struct Message {
    pub id: String,
    pub conversation_id: String,
    pub sender_id: String,
    pub content: String,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}

/// Maximum message length in characters.
pub const MAX_MESSAGE_CHARS: usize = 2000;

/// Repository for conversations and messages.
pub struct ConversationRepository<'a> {
    db: &'a MarketDb,
}

impl<'a> ConversationRepository<'a> {
    pub fn new(db: &'a MarketDb) -> Self {
        Self { db }
    }

    /// Get or create the conversation between `buyer_id` and the listing's
    /// seller. Returns the conversation and whether it was created.
    pub fn open(
        &self,
        product_id: &str,
        buyer_id: &str,
        now: DateTime<Utc>,
    ) -> MarketResult<(Conversation, bool)> {
        let write_txn = self.db.begin_write()?;
        let opened = {
            let products = write_txn.open_table(PRODUCTS)?;
            let product: Product = get_json(&products, product_id)?
                .ok_or_else(|| MarketError::not_found(format!("Product {product_id}")))?;
            if product.seller_id == buyer_id {
                return Err(MarketError::validation(
                    "You cannot start a conversation about your own listing",
                ));
            }

            let mut conversations = write_txn.open_table(CONVERSATIONS)?;
            let existing: Vec<Conversation> = scan_json(&conversations)?;
            match existing
                .into_iter()
                .find(|c| c.product_id == product_id && c.buyer_id == buyer_id)
            {
                Some(conversation) => (conversation, false),
                None => {
                    let conversation = Conversation {
                        id: Uuid::new_v4().to_string(),
                        product_id: product.id.clone(),
                        buyer_id: buyer_id.to_string(),
                        seller_id: product.seller_id.clone(),
                        last_message_at: now,
                        created_at: now,
                    };
                    put_json(&mut conversations, &conversation.id, &conversation)?;
                    (conversation, true)
                }
            }
        };
        write_txn.commit()?;
        Ok(opened)
    }

    /// Get a conversation the caller takes part in.
    pub fn get_for(&self, conversation_id: &str, user_id: &str) -> MarketResult<Conversation> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(CONVERSATIONS)?;
        let conversation: Conversation = get_json(&table, conversation_id)?
            .ok_or_else(|| MarketError::not_found(format!("Conversation {conversation_id}")))?;
        if !conversation.has_participant(user_id) {
            return Err(not_a_participant());
        }
        Ok(conversation)
    }

    /// Conversations the user takes part in, most recent activity first.
    pub fn list_for_user(&self, user_id: &str) -> DbResult<Vec<Conversation>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(CONVERSATIONS)?;
        let mut conversations: Vec<Conversation> = scan_json(&table)?;
        conversations.retain(|c| c.has_participant(user_id));
        conversations.sort_by(|a, b| b.last_message_at.cmp(&a.last_message_at));
        Ok(conversations)
    }

    /// Messages in ascending time order. Messages sent by the other party are
    /// marked read.
    pub fn read_messages(&self, conversation_id: &str, reader_id: &str) -> MarketResult<Vec<Message>> {
        let write_txn = self.db.begin_write()?;
        let messages = {
            let conversations = write_txn.open_table(CONVERSATIONS)?;
            let conversation: Conversation = get_json(&conversations, conversation_id)?
                .ok_or_else(|| MarketError::not_found(format!("Conversation {conversation_id}")))?;
            if !conversation.has_participant(reader_id) {
                return Err(not_a_participant());
            }

            let mut table = write_txn.open_table(MESSAGES)?;
            let all: Vec<Message> = scan_json(&table)?;
            let mut messages: Vec<Message> = all
                .into_iter()
                .filter(|m| m.conversation_id == conversation_id)
                .collect();
            for message in messages.iter_mut() {
                if !message.is_read && message.sender_id != reader_id {
                    message.is_read = true;
                    put_json(&mut table, &message.id, &*message)?;
                }
            }
            messages.sort_by(|a, b| a.created_at.cmp(&b.created_at));
            messages
        };
        write_txn.commit()?;
        Ok(messages)
    }

    /// Append a message and bump the conversation's activity time.
    pub fn post_message(
        &self,
        conversation_id: &str,
        sender_id: &str,
        content: &str,
        now: DateTime<Utc>,
    ) -> MarketResult<(Conversation, Message)> {
        let content = content.trim();
        let length = content.chars().count();
        if length == 0 || length > MAX_MESSAGE_CHARS {
            return Err(MarketError::validation(format!(
                "Message must be between 1 and {MAX_MESSAGE_CHARS} characters"
            )));
        }

        let write_txn = self.db.begin_write()?;
        let posted = {
            let mut conversations = write_txn.open_table(CONVERSATIONS)?;
            let mut conversation: Conversation = get_json(&conversations, conversation_id)?
                .ok_or_else(|| MarketError::not_found(format!("Conversation {conversation_id}")))?;
            if !conversation.has_participant(sender_id) {
                return Err(not_a_participant());
            }

            let message = Message {
                id: Uuid::new_v4().to_string(),
                conversation_id: conversation.id.clone(),
                sender_id: sender_id.to_string(),
                content: content.to_string(),
                is_read: false,
                created_at: now,
            };
            let mut messages = write_txn.open_table(MESSAGES)?;
            put_json(&mut messages, &message.id, &message)?;

            conversation.last_message_at = now;
            put_json(&mut conversations, &conversation.id, &conversation)?;
            (conversation, message)
        };
        write_txn.commit()?;
        Ok(posted)
    }

    /// Unread messages addressed to the user in one conversation.
    pub fn unread_count(&self, conversation_id: &str, user_id: &str) -> DbResult<u64> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(MESSAGES)?;
        let messages: Vec<Message> = scan_json(&table)?;
        Ok(messages
            .iter()
            .filter(|m| m.conversation_id == conversation_id && m.sender_id != user_id && !m.is_read)
            .count() as u64)
    }
}

fn not_a_participant() -> MarketError {
    MarketError::forbidden("You are not a participant in this conversation")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::repository::{ProductCondition, ProductStatus};
    use chrono::TimeDelta;

    fn seed_product(db: &MarketDb, id: &str, seller_id: &str) {
        let now = Utc::now();
        let product = Product {
            id: id.to_string(),
            seller_id: seller_id.to_string(),
            category_id: "books".to_string(),
            title: "Linear algebra".to_string(),
            description: "Annotated".to_string(),
            price_inr: 300,
            original_price_inr: None,
            condition: ProductCondition::LikeNew,
            images: vec!["https://img.example.com/la.jpg".to_string()],
            location: None,
            is_negotiable: false,
            status: ProductStatus::Active,
            views: 0,
            created_at: now,
            updated_at: now,
        };
        let write_txn = db.begin_write().unwrap();
        {
            let mut table = write_txn.open_table(PRODUCTS).unwrap();
            put_json(&mut table, id, &product).unwrap();
        }
        write_txn.commit().unwrap();
    }

    #[test]
    fn open_is_get_or_create() {
        let dir = tempfile::tempdir().unwrap();
        let db = MarketDb::open_in(dir.path()).unwrap();
        seed_product(&db, "p1", "seller");
        let repo = ConversationRepository::new(&db);

        let (first, created) = repo.open("p1", "buyer", Utc::now()).unwrap();
        assert!(created);
        assert_eq!(first.seller_id, "seller");
        let (second, created) = repo.open("p1", "buyer", Utc::now()).unwrap();
        assert!(!created);
        assert_eq!(first.id, second.id);

        let err = repo.open("p1", "seller", Utc::now()).unwrap_err();
        assert!(matches!(err, MarketError::Validation(_)));
        let err = repo.open("missing", "buyer", Utc::now()).unwrap_err();
        assert!(matches!(err, MarketError::NotFound(_)));
    }

    #[test]
    fn reading_marks_counterpart_messages_read() {
        let dir = tempfile::tempdir().unwrap();
        let db = MarketDb::open_in(dir.path()).unwrap();
        seed_product(&db, "p1", "seller");
        let repo = ConversationRepository::new(&db);
        let t0 = Utc::now();
        let (conversation, _) = repo.open("p1", "buyer", t0).unwrap();

        repo.post_message(&conversation.id, "buyer", "Is it available?", t0).unwrap();
        repo.post_message(&conversation.id, "seller", "Yes", t0 + TimeDelta::seconds(5))
            .unwrap();
        assert_eq!(repo.unread_count(&conversation.id, "seller").unwrap(), 1);
        assert_eq!(repo.unread_count(&conversation.id, "buyer").unwrap(), 1);

        let messages = repo.read_messages(&conversation.id, "seller").unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].content, "Is it available?");
        assert!(messages[0].is_read);
        assert!(!messages[1].is_read);
        assert_eq!(repo.unread_count(&conversation.id, "seller").unwrap(), 0);
        assert_eq!(repo.unread_count(&conversation.id, "buyer").unwrap(), 1);
    }

    #[test]
    fn outsiders_are_forbidden() {
        let dir = tempfile::tempdir().unwrap();
        let db = MarketDb::open_in(dir.path()).unwrap();
        seed_product(&db, "p1", "seller");
        let repo = ConversationRepository::new(&db);
        let (conversation, _) = repo.open("p1", "buyer", Utc::now()).unwrap();

        assert!(matches!(
            repo.read_messages(&conversation.id, "stranger").unwrap_err(),
            MarketError::Forbidden(_)
        ));
        assert!(matches!(
            repo.post_message(&conversation.id, "stranger", "hi", Utc::now()).unwrap_err(),
            MarketError::Forbidden(_)
        ));
        assert!(matches!(
            repo.get_for(&conversation.id, "stranger").unwrap_err(),
            MarketError::Forbidden(_)
        ));
    }

    #[test]
    fn posting_bumps_activity_and_validates_length() {
        let dir = tempfile::tempdir().unwrap();
        let db = MarketDb::open_in(dir.path()).unwrap();
        seed_product(&db, "p1", "seller");
        seed_product(&db, "p2", "seller");
        let repo = ConversationRepository::new(&db);
        let t0 = Utc::now();
        let (older, _) = repo.open("p1", "buyer", t0).unwrap();
        let (newer, _) = repo.open("p2", "buyer", t0 + TimeDelta::seconds(1)).unwrap();

        let listed = repo.list_for_user("buyer").unwrap();
        assert_eq!(listed[0].id, newer.id);

        let (bumped, _) = repo
            .post_message(&older.id, "buyer", "Still there?", t0 + TimeDelta::minutes(1))
            .unwrap();
        assert_eq!(bumped.last_message_at, t0 + TimeDelta::minutes(1));
        let listed = repo.list_for_user("seller").unwrap();
        assert_eq!(listed[0].id, older.id);

        assert!(matches!(
            repo.post_message(&older.id, "buyer", "   ", t0).unwrap_err(),
            MarketError::Validation(_)
        ));
        let long = "x".repeat(MAX_MESSAGE_CHARS + 1);
        assert!(matches!(
            repo.post_message(&older.id, "buyer", &long, t0).unwrap_err(),
            MarketError::Validation(_)
        ));
    }
}
