// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Expired Passcode Sweeper
//!
//! Background task that deletes expired passcodes. Verification already
//! refuses expired codes; the sweep only keeps the table from growing with
//! codes that were never used.
//!
//! ## Shutdown
//!
//! Uses `tokio_util::sync::CancellationToken` for graceful shutdown.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::clock::Clock;
use crate::storage::{MarketDb, OtpRepository};

/// Periodic purge of expired passcodes.
pub struct OtpSweeper {
    db: Arc<MarketDb>,
    clock: Arc<dyn Clock>,
    interval: Duration,
}

impl OtpSweeper {
    pub fn new(db: Arc<MarketDb>, clock: Arc<dyn Clock>, interval: Duration) -> Self {
        Self { db, clock, interval }
    }

    /// Run the sweep loop until the cancellation token is triggered.
    ///
    /// Should be spawned as a background task:
    /// ```rust,ignore
    /// tokio::spawn(sweeper.run(shutdown.clone()));
    /// ```
    pub async fn run(self, shutdown: CancellationToken) {
        info!(interval_secs = self.interval.as_secs(), "Passcode sweeper starting");

        loop {
            if shutdown.is_cancelled() {
                info!("Passcode sweeper shutting down");
                return;
            }

            self.sweep_once();

            tokio::select! {
                _ = tokio::time::sleep(self.interval) => {},
                _ = shutdown.cancelled() => {
                    info!("Passcode sweeper shutting down");
                    return;
                }
            }
        }
    }

    /// Delete expired passcodes once. Returns how many were removed.
    pub fn sweep_once(&self) -> usize {
        match OtpRepository::new(&self.db).purge_expired(self.clock.now()) {
            Ok(0) => {
                debug!("Passcode sweep: nothing expired");
                0
            }
            Ok(purged) => {
                info!(purged, "Passcode sweep: removed expired codes");
                purged
            }
            Err(e) => {
                warn!(error = %e, "Passcode sweep failed");
                0
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::storage::StoredOtp;
    use chrono::{TimeDelta, Utc};

    #[tokio::test]
    async fn sweep_removes_expired_and_run_stops_on_cancel() {
        let dir = tempfile::tempdir().unwrap();
        let db = Arc::new(MarketDb::open_in(dir.path()).unwrap());
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let now = clock.now();

        let repo = OtpRepository::new(&db);
        for (email, offset) in [("old@uni.edu", -60), ("new@uni.edu", 600)] {
            repo.upsert(&StoredOtp {
                email: email.to_string(),
                code_digest: "digest".to_string(),
                expires_at: now + TimeDelta::seconds(offset),
                created_at: now,
            })
            .unwrap();
        }

        let sweeper = OtpSweeper::new(Arc::clone(&db), clock.clone(), Duration::from_secs(3600));
        assert_eq!(sweeper.sweep_once(), 1);
        assert!(repo.get("old@uni.edu").unwrap().is_none());
        assert!(repo.get("new@uni.edu").unwrap().is_some());

        let shutdown = CancellationToken::new();
        let handle = tokio::spawn(sweeper.run(shutdown.clone()));
        shutdown.cancel();
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("sweeper did not stop")
            .unwrap();
    }
}
