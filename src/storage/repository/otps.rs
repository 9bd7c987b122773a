// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Pending email passcodes.
//!
//! At most one passcode exists per normalised email; issuing a new one
//! replaces the previous record. Codes are kept only as keyed digests.

use chrono::{DateTime, Utc};
use redb::ReadableTable;
use serde::{Deserialize, Serialize};

use crate::storage::database::{get_json, put_json, DbResult, MarketDb, OTPS};

/// Passcode record keyed by normalised email.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StoredOtp {
    /// Normalised email the code was sent to
    pub email: String,
    /// Base64 HMAC-SHA256 digest of `email:code`
    pub code_digest: String,
    /// Instant after which the code is refused
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl StoredOtp {
    /// A code is still valid at exactly `expires_at`.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }
}

/// Repository for passcode records.
pub struct OtpRepository<'a> {
    db: &'a MarketDb,
}

impl<'a> OtpRepository<'a> {
    pub fn new(db: &'a MarketDb) -> Self {
        Self { db }
    }

    /// Insert or replace the passcode for `otp.email`.
    pub fn upsert(&self, otp: &StoredOtp) -> DbResult<()> {
        let write_txn = self.db.begin_write()?;
        {
            let mut table = write_txn.open_table(OTPS)?;
            put_json(&mut table, &otp.email, otp)?;
        }
        write_txn.commit()?;
        Ok(())
    }

    pub fn get(&self, email: &str) -> DbResult<Option<StoredOtp>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(OTPS)?;
        get_json(&table, email)
    }

    /// Delete every passcode that has expired at `now`.
    pub fn purge_expired(&self, now: DateTime<Utc>) -> DbResult<usize> {
        let write_txn = self.db.begin_write()?;
        let purged = {
            let mut table = write_txn.open_table(OTPS)?;
            let mut expired = Vec::new();
            for entry in table.iter()? {
                let (key, value) = entry?;
                let otp: StoredOtp = serde_json::from_slice(value.value())?;
                if otp.is_expired(now) {
                    expired.push(key.value().to_string());
                }
            }
            for email in &expired {
                table.remove(email.as_str())?;
            }
            expired.len()
        };
        write_txn.commit()?;
        Ok(purged)
    }
}
