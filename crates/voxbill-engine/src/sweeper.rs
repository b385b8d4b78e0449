//! The periodic expiry sweep.
//!
//! One pass walks every account holding credits, reclaims overdue
//! balances, and nudges holders who have not generated anything lately.
//! A failure on one account is logged and counted, never aborting the
//! pass.

use chrono::Utc;

use voxbill_core::{LedgerError, Result, UserId};
use voxbill_store::Store;

use crate::engine::Engine;
use crate::notify::Messenger;

/// What one sweep pass did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Accounts holding credits that were examined.
    pub scanned: usize,

    /// Accounts whose expired balance was reclaimed.
    pub expired: usize,

    /// Idle holders that were nudged.
    pub reminded: usize,

    /// Accounts where enforcement or notification failed.
    pub failures: usize,
}

impl<S: Store, M: Messenger> Engine<S, M> {
    /// Run one expiry-sweep pass over all credit-holding accounts.
    ///
    /// # Errors
    ///
    /// Returns an error only if listing the accounts fails; per-account
    /// failures are counted in the report instead.
    pub async fn run_expiry_sweep(&self) -> Result<SweepReport> {
        let holders = self.store.list_users_with_credits()?;
        let mut report = SweepReport {
            scanned: holders.len(),
            ..SweepReport::default()
        };

        for account in holders {
            match self.sweep_one(&account.user_id).await {
                Ok(SweepAction::Expired) => report.expired += 1,
                Ok(SweepAction::Reminded) => report.reminded += 1,
                Ok(SweepAction::None) => {}
                Err(err) => {
                    report.failures += 1;
                    tracing::warn!(
                        user_id = %account.user_id,
                        error = %err,
                        "sweep failed for account"
                    );
                }
            }
        }

        tracing::info!(
            scanned = report.scanned,
            expired = report.expired,
            reminded = report.reminded,
            failures = report.failures,
            "expiry sweep finished"
        );
        Ok(report)
    }

    /// Run the sweep on the configured interval until cancelled.
    ///
    /// The first pass runs one full interval after startup, not
    /// immediately.
    pub async fn run_sweeper(&self) {
        let mut ticker = tokio::time::interval(self.settings.sweep.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // interval fires immediately on the first tick.
        ticker.tick().await;
        loop {
            ticker.tick().await;
            if let Err(err) = self.run_expiry_sweep().await {
                tracing::error!(error = %err, "expiry sweep pass aborted");
            }
        }
    }

    async fn sweep_one(&self, user_id: &UserId) -> Result<SweepAction> {
        let now = Utc::now();
        let (expired, credits, last_generation_at) = self
            .store
            .with_user::<_, LedgerError, _>(user_id, |account| {
                let expired = account.enforce_expiry(now);
                Ok((expired, account.credits, account.last_generation_at))
            })?;

        if expired {
            if !self
                .notify_best_effort(user_id, "Your plan has expired. Credits reset to 0.")
                .await
            {
                return Err(LedgerError::ExternalUnavailable {
                    service: "messenger",
                    message: "expiry notice undelivered".into(),
                });
            }
            return Ok(SweepAction::Expired);
        }

        let idle_after = chrono::Duration::from_std(self.settings.sweep.idle_after)
            .unwrap_or_else(|_| chrono::Duration::days(5));
        let idle = credits > 0
            && last_generation_at.map_or(true, |at| now.signed_duration_since(at) > idle_after);
        if idle {
            if !self
                .notify_best_effort(user_id, "You have unused voice credits. Generate now!")
                .await
            {
                return Err(LedgerError::ExternalUnavailable {
                    service: "messenger",
                    message: "idle nudge undelivered".into(),
                });
            }
            return Ok(SweepAction::Reminded);
        }

        Ok(SweepAction::None)
    }
}

enum SweepAction {
    Expired,
    Reminded,
    None,
}
