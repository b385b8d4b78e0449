//! Credit ledger operations: grant, consume, revoke, expiry enforcement.
//!
//! Every operation here runs inside the store's per-account lock, so a
//! read-modify-write on one account is never interleaved with another
//! mutator of the same account.

use chrono::{DateTime, Utc};

use voxbill_core::{LedgerError, Result, UserId};
use voxbill_store::Store;

use crate::engine::Engine;
use crate::notify::Messenger;

/// The balance state after a grant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GrantOutcome {
    /// Credits after the grant.
    pub credits: i64,

    /// The validity window after the grant, if any.
    pub expires_at: Option<DateTime<Utc>>,
}

impl<S: Store, M: Messenger> Engine<S, M> {
    /// Add credits to an account.
    ///
    /// `valid_days: None` applies the configured default window. A
    /// positive window overwrites any earlier one (the most recent
    /// grant's validity always wins); a zero window leaves the expiry
    /// untouched.
    ///
    /// # Errors
    ///
    /// - `Validation` if `amount` is not positive.
    /// - `NotFound` for an unknown account.
    pub fn grant_credits(
        &self,
        user_id: &UserId,
        amount: i64,
        valid_days: Option<i64>,
    ) -> Result<GrantOutcome> {
        let valid_days = valid_days.unwrap_or(self.settings.default_valid_days);
        let outcome = self
            .store
            .with_user::<_, LedgerError, _>(user_id, |account| {
                account.grant(amount, valid_days, Utc::now())?;
                Ok(GrantOutcome {
                    credits: account.credits,
                    expires_at: account.credit_expires_at,
                })
            })?;
        tracing::info!(
            user_id = %user_id,
            amount,
            valid_days,
            credits = outcome.credits,
            "credits granted"
        );
        Ok(outcome)
    }

    /// Consume one credit for a generation.
    ///
    /// # Errors
    ///
    /// See [`Engine::consume_credits`].
    pub fn consume_credit(&self, user_id: &UserId) -> Result<i64> {
        self.consume_credits(user_id, 1)
    }

    /// Consume `n` credits, returning the remaining balance.
    ///
    /// An overdue validity window is enforced first, in the same locked
    /// scope, so expired credit can never be spent.
    ///
    /// # Errors
    ///
    /// - `InsufficientCredit` if fewer than `n` credits remain (or all
    ///   just expired).
    /// - `Blocked` if the account is blocked.
    /// - `NotFound` for an unknown account.
    pub fn consume_credits(&self, user_id: &UserId, n: i64) -> Result<i64> {
        // The consume error is carried inside Ok so an expiry reclaim
        // commits even when the consume itself then fails.
        let consumed = self
            .store
            .with_user::<_, LedgerError, _>(user_id, |account| {
                let now = Utc::now();
                account.enforce_expiry(now);
                Ok(account.consume(n, now).map(|()| account.credits))
            })?;
        let remaining = consumed?;
        tracing::info!(user_id = %user_id, n, remaining, "credits consumed");
        Ok(remaining)
    }

    /// Remove up to `amount` credits, clamping at zero. Returns the
    /// remaining balance.
    ///
    /// # Errors
    ///
    /// - `Validation` if `amount` is not positive.
    /// - `NotFound` for an unknown account.
    pub fn revoke_credits(&self, user_id: &UserId, amount: i64) -> Result<i64> {
        let remaining = self
            .store
            .with_user::<_, LedgerError, _>(user_id, |account| {
                account.revoke(amount, Utc::now())?;
                Ok(account.credits)
            })?;
        tracing::info!(user_id = %user_id, amount, remaining, "credits revoked");
        Ok(remaining)
    }

    /// Zero out an account's expired balance.
    ///
    /// Idempotent: returns `true` only when expiry was actually
    /// enforced by this call.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for an unknown account.
    pub fn enforce_expiry(&self, user_id: &UserId) -> Result<bool> {
        let expired = self
            .store
            .with_user::<_, LedgerError, _>(user_id, |account| {
                Ok(account.enforce_expiry(Utc::now()))
            })?;
        if expired {
            tracing::info!(user_id = %user_id, "expired credits reclaimed");
        }
        Ok(expired)
    }
}
