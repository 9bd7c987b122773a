// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Embedded marketplace database backed by redb (pure Rust, ACID).
//!
//! Every record is stored as JSON bytes under its identifier. Workflows that
//! must be atomic (passcode consumption, quota decrement with listing insert,
//! payment approval) run inside a single redb write transaction; redb admits
//! one writer at a time, so a guarded read-then-write inside that
//! transaction cannot interleave with another writer.
//!
//! ## Table Layout
//!
//! - `email_otps`: normalised email → StoredOtp
//! - `profiles`: user_id → UserAccount
//! - `profile_emails`: normalised email → user_id
//! - `subscription_plans`: plan_id → SubscriptionPlan
//! - `categories`: category_id → Category
//! - `user_subscriptions`: grant_id → SubscriptionGrant
//! - `subscription_payments`: submission_id → PaymentSubmission
//! - `products`: product_id → Product
//! - `conversations`: conversation_id → Conversation
//! - `messages`: message_id → Message

use std::path::Path;

use redb::{
    Database, ReadTransaction, ReadableDatabase, ReadableTable, Table, TableDefinition,
    WriteTransaction,
};
use serde::{de::DeserializeOwned, Serialize};

// =============================================================================
// Table Definitions
// =============================================================================

pub(crate) const OTPS: TableDefinition<&str, &[u8]> = TableDefinition::new("email_otps");
pub(crate) const USERS: TableDefinition<&str, &[u8]> = TableDefinition::new("profiles");
pub(crate) const USER_EMAILS: TableDefinition<&str, &str> = TableDefinition::new("profile_emails");
pub(crate) const PLANS: TableDefinition<&str, &[u8]> = TableDefinition::new("subscription_plans");
pub(crate) const CATEGORIES: TableDefinition<&str, &[u8]> = TableDefinition::new("categories");
pub(crate) const GRANTS: TableDefinition<&str, &[u8]> = TableDefinition::new("user_subscriptions");
pub(crate) const SUBMISSIONS: TableDefinition<&str, &[u8]> =
    TableDefinition::new("subscription_payments");
pub(crate) const PRODUCTS: TableDefinition<&str, &[u8]> = TableDefinition::new("products");
pub(crate) const CONVERSATIONS: TableDefinition<&str, &[u8]> =
    TableDefinition::new("conversations");
pub(crate) const MESSAGES: TableDefinition<&str, &[u8]> = TableDefinition::new("messages");

/// Writable JSON record table (string key → serialized record).
pub(crate) type JsonTable<'txn> = Table<'txn, &'static str, &'static [u8]>;

// =============================================================================
// Error Type
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum DbError {
    #[error("redb error: {0}")]
    Redb(#[from] redb::Error),

    #[error("redb database error: {0}")]
    RedbDatabase(#[from] redb::DatabaseError),

    #[error("redb transaction error: {0}")]
    RedbTransaction(#[from] redb::TransactionError),

    #[error("redb table error: {0}")]
    RedbTable(#[from] redb::TableError),

    #[error("redb storage error: {0}")]
    RedbStorage(#[from] redb::StorageError),

    #[error("redb commit error: {0}")]
    RedbCommit(#[from] redb::CommitError),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("failed to prepare data directory: {0}")]
    Io(#[from] std::io::Error),
}

pub type DbResult<T> = Result<T, DbError>;

// =============================================================================
// MarketDb
// =============================================================================

/// Embedded ACID marketplace database.
pub struct MarketDb {
    db: Database,
}

impl MarketDb {
    /// File name used inside the configured data directory.
    pub const FILE_NAME: &'static str = "marketplace.redb";

    /// Open (or create) the database at the given path.
    pub fn open(path: &Path) -> DbResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let db = Database::create(path)?;

        // Pre-create all tables so later read transactions don't fail
        let write_txn = db.begin_write()?;
        {
            let _ = write_txn.open_table(OTPS)?;
            let _ = write_txn.open_table(USERS)?;
            let _ = write_txn.open_table(USER_EMAILS)?;
            let _ = write_txn.open_table(PLANS)?;
            let _ = write_txn.open_table(CATEGORIES)?;
            let _ = write_txn.open_table(GRANTS)?;
            let _ = write_txn.open_table(SUBMISSIONS)?;
            let _ = write_txn.open_table(PRODUCTS)?;
            let _ = write_txn.open_table(CONVERSATIONS)?;
            let _ = write_txn.open_table(MESSAGES)?;
        }
        write_txn.commit()?;

        Ok(Self { db })
    }

    /// Open the database file inside `data_dir`.
    pub fn open_in(data_dir: &Path) -> DbResult<Self> {
        Self::open(&data_dir.join(Self::FILE_NAME))
    }

    pub(crate) fn begin_write(&self) -> DbResult<WriteTransaction> {
        Ok(self.db.begin_write()?)
    }

    pub(crate) fn begin_read(&self) -> DbResult<ReadTransaction> {
        Ok(self.db.begin_read()?)
    }

    /// Readiness probe: open a read transaction and a table.
    pub fn ping(&self) -> DbResult<()> {
        let read_txn = self.db.begin_read()?;
        let _ = read_txn.open_table(USERS)?;
        Ok(())
    }
}

// =============================================================================
// JSON Record Helpers
// =============================================================================

/// Read and deserialize one record.
pub(crate) fn get_json<T, Tbl>(table: &Tbl, key: &str) -> DbResult<Option<T>>
where
    T: DeserializeOwned,
    Tbl: ReadableTable<&'static str, &'static [u8]>,
{
    match table.get(key)? {
        Some(value) => Ok(Some(serde_json::from_slice(value.value())?)),
        None => Ok(None),
    }
}

/// Serialize and insert (or overwrite) one record.
pub(crate) fn put_json<T: Serialize>(table: &mut JsonTable<'_>, key: &str, value: &T) -> DbResult<()> {
    let json = serde_json::to_vec(value)?;
    table.insert(key, json.as_slice())?;
    Ok(())
}

/// Deserialize every record of a table, in key order.
pub(crate) fn scan_json<T, Tbl>(table: &Tbl) -> DbResult<Vec<T>>
where
    T: DeserializeOwned,
    Tbl: ReadableTable<&'static str, &'static [u8]>,
{
    let mut records = Vec::new();
    for entry in table.iter()? {
        let (_, value) = entry?;
        records.push(serde_json::from_slice(value.value())?);
    }
    Ok(records)
}

// =============================================================================
// Tests
// =============================================================================
