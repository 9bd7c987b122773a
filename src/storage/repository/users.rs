// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! User accounts and the unique email index.

use chrono::{DateTime, Utc};
use redb::ReadableTable;
use serde::{Deserialize, Serialize};

use crate::auth::Role;
use crate::error::{MarketError, MarketResult};
use crate::storage::database::{
    get_json, put_json, DbResult, MarketDb, OTPS, USERS, USER_EMAILS,
};

use super::otps::StoredOtp;

/// Account record. The password hash never leaves the storage layer through
/// the API; handlers respond with [`crate::models::ProfileView`] instead.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UserAccount {
    pub id: String,
    /// Normalised, unique email
    pub email: String,
    pub full_name: String,
    pub password_hash: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub college_name: Option<String>,
    #[serde(default)]
    pub role: Role,
    pub is_email_verified: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl UserAccount {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

/// Repository for account operations.
pub struct UserRepository<'a> {
    db: &'a MarketDb,
}

impl<'a> UserRepository<'a> {
    pub fn new(db: &'a MarketDb) -> Self {
        Self { db }
    }

    /// Get an account by ID.
    pub fn get(&self, user_id: &str) -> MarketResult<UserAccount> {
        self.find(user_id)?
            .ok_or_else(|| MarketError::not_found(format!("User {user_id}")))
    }

    pub fn find(&self, user_id: &str) -> DbResult<Option<UserAccount>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(USERS)?;
        get_json(&table, user_id)
    }

    /// Look up an account by normalised email.
    pub fn find_by_email(&self, email: &str) -> DbResult<Option<UserAccount>> {
        let read_txn = self.db.begin_read()?;
        let index = read_txn.open_table(USER_EMAILS)?;
        let Some(user_id) = index.get(email)?.map(|id| id.value().to_string()) else {
            return Ok(None);
        };
        let users = read_txn.open_table(USERS)?;
        get_json(&users, &user_id)
    }

    /// Insert a new account. Fails with `Conflict` if the email is taken.
    pub fn create(&self, account: &UserAccount) -> MarketResult<()> {
        let write_txn = self.db.begin_write()?;
        {
            let mut index = write_txn.open_table(USER_EMAILS)?;
            if index.get(account.email.as_str())?.is_some() {
                return Err(email_taken());
            }
            index.insert(account.email.as_str(), account.id.as_str())?;

            let mut users = write_txn.open_table(USERS)?;
            put_json(&mut users, &account.id, account)?;
        }
        write_txn.commit()?;
        Ok(())
    }

    /// Consume the passcode for `account.email` and create the account, in
    /// one write transaction.
    ///
    /// `code_matches` decides whether the stored digest belongs to the
    /// submitted code. Absent, mismatched and expired codes all fail with
    /// `InvalidCode`. If the email already has an account the code is kept
    /// and `Conflict` is returned.
    pub fn create_from_passcode<F>(
        &self,
        account: &UserAccount,
        now: DateTime<Utc>,
        code_matches: F,
    ) -> MarketResult<()>
    where
        F: Fn(&StoredOtp) -> bool,
    {
        let write_txn = self.db.begin_write()?;
        {
            let mut otps = write_txn.open_table(OTPS)?;
            let stored: Option<StoredOtp> = get_json(&otps, &account.email)?;
            match stored {
                Some(otp) if !otp.is_expired(now) && code_matches(&otp) => {}
                _ => return Err(MarketError::InvalidCode),
            }

            let mut index = write_txn.open_table(USER_EMAILS)?;
            if index.get(account.email.as_str())?.is_some() {
                return Err(email_taken());
            }
            index.insert(account.email.as_str(), account.id.as_str())?;

            let mut users = write_txn.open_table(USERS)?;
            put_json(&mut users, &account.id, account)?;

            otps.remove(account.email.as_str())?;
        }
        write_txn.commit()?;
        Ok(())
    }

    /// Change an account's role.
    pub fn set_role(&self, user_id: &str, role: Role, now: DateTime<Utc>) -> MarketResult<UserAccount> {
        let write_txn = self.db.begin_write()?;
        let account = {
            let mut users = write_txn.open_table(USERS)?;
            let mut account: UserAccount = get_json(&users, user_id)?
                .ok_or_else(|| MarketError::not_found(format!("User {user_id}")))?;
            account.role = role;
            account.updated_at = now;
            put_json(&mut users, user_id, &account)?;
            account
        };
        write_txn.commit()?;
        Ok(account)
    }
}

fn email_taken() -> MarketError {
    MarketError::conflict("An account with this email already exists")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::repository::OtpRepository;
    use chrono::TimeDelta;

    fn account(id: &str, email: &str) -> UserAccount {
        let now = Utc::now();
        UserAccount {
            id: id.to_string(),
            email: email.to_string(),
            full_name: "Asha Rao".to_string(),
            password_hash: "hash".to_string(),
            phone: None,
            college_name: None,
            role: Role::Member,
            is_email_verified: true,
            created_at: now,
            updated_at: now,
        }
    }

    fn pending(db: &MarketDb, email: &str, digest: &str, expires_at: DateTime<Utc>) {
        OtpRepository::new(db)
            .upsert(&StoredOtp {
                email: email.to_string(),
                code_digest: digest.to_string(),
                expires_at,
                created_at: expires_at - TimeDelta::minutes(10),
            })
            .unwrap();
    }

    #[test]
    fn create_indexes_email() {
        let dir = tempfile::tempdir().unwrap();
        let db = MarketDb::open_in(dir.path()).unwrap();
        let repo = UserRepository::new(&db);

        repo.create(&account("u1", "a@uni.edu")).unwrap();
        let found = repo.find_by_email("a@uni.edu").unwrap().unwrap();
        assert_eq!(found.id, "u1");
        assert!(repo.find_by_email("b@uni.edu").unwrap().is_none());

        let err = repo.create(&account("u2", "a@uni.edu")).unwrap_err();
        assert!(matches!(err, MarketError::Conflict(_)));
    }

    #[test]
    fn get_missing_user_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let db = MarketDb::open_in(dir.path()).unwrap();
        let err = UserRepository::new(&db).get("nobody").unwrap_err();
        assert!(matches!(err, MarketError::NotFound(_)));
    }

    #[test]
    fn passcode_is_consumed_with_account_creation() {
        let dir = tempfile::tempdir().unwrap();
        let db = MarketDb::open_in(dir.path()).unwrap();
        let now = Utc::now();
        pending(&db, "a@uni.edu", "good", now + TimeDelta::minutes(10));

        let repo = UserRepository::new(&db);
        repo.create_from_passcode(&account("u1", "a@uni.edu"), now, |otp| {
            otp.code_digest == "good"
        })
        .unwrap();

        assert!(OtpRepository::new(&db).get("a@uni.edu").unwrap().is_none());
        assert_eq!(repo.get("u1").unwrap().email, "a@uni.edu");

        // Single use
        let err = repo
            .create_from_passcode(&account("u2", "a@uni.edu"), now, |_| true)
            .unwrap_err();
        assert!(matches!(err, MarketError::InvalidCode));
    }

    #[test]
    fn mismatched_or_expired_code_leaves_no_account() {
        let dir = tempfile::tempdir().unwrap();
        let db = MarketDb::open_in(dir.path()).unwrap();
        let now = Utc::now();
        pending(&db, "a@uni.edu", "good", now + TimeDelta::minutes(10));
        let repo = UserRepository::new(&db);

        let err = repo
            .create_from_passcode(&account("u1", "a@uni.edu"), now, |otp| {
                otp.code_digest == "bad"
            })
            .unwrap_err();
        assert!(matches!(err, MarketError::InvalidCode));

        let later = now + TimeDelta::minutes(11);
        let err = repo
            .create_from_passcode(&account("u1", "a@uni.edu"), later, |_| true)
            .unwrap_err();
        assert!(matches!(err, MarketError::InvalidCode));

        assert!(repo.find("u1").unwrap().is_none());
        assert!(OtpRepository::new(&db).get("a@uni.edu").unwrap().is_some());
    }

    #[test]
    fn existing_account_keeps_the_code() {
        let dir = tempfile::tempdir().unwrap();
        let db = MarketDb::open_in(dir.path()).unwrap();
        let now = Utc::now();
        let repo = UserRepository::new(&db);
        repo.create(&account("u1", "a@uni.edu")).unwrap();
        pending(&db, "a@uni.edu", "good", now + TimeDelta::minutes(10));

        let err = repo
            .create_from_passcode(&account("u2", "a@uni.edu"), now, |_| true)
            .unwrap_err();
        assert!(matches!(err, MarketError::Conflict(_)));
        assert!(OtpRepository::new(&db).get("a@uni.edu").unwrap().is_some());
    }

    #[test]
    fn set_role_promotes_account() {
        let dir = tempfile::tempdir().unwrap();
        let db = MarketDb::open_in(dir.path()).unwrap();
        let repo = UserRepository::new(&db);
        repo.create(&account("u1", "a@uni.edu")).unwrap();

        let updated = repo.set_role("u1", Role::Admin, Utc::now()).unwrap();
        assert!(updated.is_admin());
        assert!(repo.get("u1").unwrap().is_admin());
    }
}
