//! Aggregate counters for the admin dashboard.

use std::collections::HashSet;

use chrono::Utc;

use voxbill_core::{PaymentStatus, Result};
use voxbill_store::Store;

use crate::engine::Engine;
use crate::notify::Messenger;

/// A point-in-time summary of the ledger.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LedgerStats {
    /// Total registered accounts.
    pub users: usize,

    /// Payment requests awaiting a decision.
    pub pending: usize,

    /// Approved payments, all time.
    pub sales: usize,

    /// Distinct users with at least one approved payment.
    pub buyers: usize,

    /// Accounts currently holding credits.
    pub holding_credits: usize,

    /// Credit holders past the idle threshold.
    pub idle_holders: usize,

    /// Accounts whose validity window has lapsed but whose balance has
    /// not been reclaimed yet.
    pub expired: usize,
}

impl<S: Store, M: Messenger> Engine<S, M> {
    /// Compute ledger-wide counters.
    ///
    /// The counters are a scan-time snapshot, not a transaction: numbers
    /// may be mutually stale under concurrent writes.
    ///
    /// # Errors
    ///
    /// Returns an error if a storage scan fails.
    pub fn stats(&self) -> Result<LedgerStats> {
        let now = Utc::now();
        let idle_after = chrono::Duration::from_std(self.settings.sweep.idle_after)
            .unwrap_or_else(|_| chrono::Duration::days(5));

        let users = self.store.list_users()?;
        let approved = self.store.list_payments_by_status(PaymentStatus::Approved)?;
        let pending = self.store.list_payments_by_status(PaymentStatus::Pending)?;

        let buyers: HashSet<_> = approved.iter().map(|p| p.user_id.clone()).collect();

        let mut stats = LedgerStats {
            users: users.len(),
            pending: pending.len(),
            sales: approved.len(),
            buyers: buyers.len(),
            ..LedgerStats::default()
        };
        for account in &users {
            if account.credits > 0 {
                stats.holding_credits += 1;
                if account
                    .last_generation_at
                    .map_or(true, |at| now.signed_duration_since(at) > idle_after)
                {
                    stats.idle_holders += 1;
                }
            }
            if account.is_expired(now) {
                stats.expired += 1;
            }
        }
        Ok(stats)
    }
}
