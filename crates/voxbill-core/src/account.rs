//! User accounts and the credit-balance rules that govern them.
//!
//! All balance arithmetic lives here so the zero-stamp invariant is
//! enforced in exactly one place: whenever a mutation leaves `credits`
//! at 0, `credit_expires_at` is stamped to the mutation time. A zero
//! balance never keeps a future expiry, so a later grant always starts
//! from a well-defined window.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{LedgerError, Result};
use crate::ids::UserId;
use crate::intent::{state_of, IntentState, PurchaseIntent};
use crate::payment::PaymentMethod;
use crate::PlanId;

/// Profile fields mirrored from the chat platform on every contact.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    /// Platform username, if any.
    pub username: String,

    /// First name as reported by the platform.
    pub first_name: String,

    /// Last name as reported by the platform.
    pub last_name: String,
}

/// A per-user account: credit balance, validity window, and the
/// purchase-intent slot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserAccount {
    /// Stable external identity.
    pub user_id: UserId,

    /// Profile fields, refreshed on every upsert.
    pub profile: UserProfile,

    /// Current credit balance. Never negative.
    pub credits: i64,

    /// When the current credits expire, if a validity window is active.
    pub credit_expires_at: Option<DateTime<Utc>>,

    /// Whether the account is blocked from consuming credits.
    pub is_blocked: bool,

    /// The in-flight purchase intent, if any.
    pub intent: Option<PurchaseIntent>,

    /// Whether the one-time free credit has been claimed.
    pub free_credit_claimed: bool,

    /// When the user last consumed a credit for a generation.
    pub last_generation_at: Option<DateTime<Utc>>,

    /// When the account was created.
    pub created_at: DateTime<Utc>,

    /// When the account was last updated.
    pub updated_at: DateTime<Utc>,
}

impl UserAccount {
    /// Create a new account with zero credits.
    #[must_use]
    pub fn new(user_id: UserId, profile: UserProfile) -> Self {
        let now = Utc::now();
        Self {
            user_id,
            profile,
            credits: 0,
            credit_expires_at: None,
            is_blocked: false,
            intent: None,
            free_credit_claimed: false,
            last_generation_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// The current awaiting-purchase state.
    #[must_use]
    pub fn intent_state(&self) -> IntentState {
        state_of(self.intent.as_ref())
    }

    /// Whether the validity window has passed while credits remain.
    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.credits > 0 && self.credit_expires_at.is_some_and(|at| at < now)
    }

    /// Add credits, optionally (re)starting the validity window.
    ///
    /// A positive `valid_days` overwrites `credit_expires_at` with
    /// `now + valid_days`; the most recent grant's window always wins,
    /// even over unconsumed credit from an earlier grant. A zero
    /// `valid_days` leaves the expiry untouched.
    ///
    /// # Errors
    ///
    /// Returns `Validation` if `amount` is not positive or `valid_days`
    /// is negative.
    pub fn grant(&mut self, amount: i64, valid_days: i64, now: DateTime<Utc>) -> Result<()> {
        if amount <= 0 {
            return Err(LedgerError::Validation(format!(
                "grant amount must be positive, got {amount}"
            )));
        }
        if valid_days < 0 {
            return Err(LedgerError::Validation(format!(
                "valid_days must not be negative, got {valid_days}"
            )));
        }
        self.credits += amount;
        if valid_days > 0 {
            self.credit_expires_at = Some(now + chrono::Duration::days(valid_days));
        }
        Ok(())
    }

    /// Consume `n` credits for a generation.
    ///
    /// Stamps `last_generation_at` and applies the zero-stamp rule.
    ///
    /// # Errors
    ///
    /// - `Validation` if `n` is not positive.
    /// - `Blocked` if the account is blocked.
    /// - `InsufficientCredit` if fewer than `n` credits remain.
    pub fn consume(&mut self, n: i64, now: DateTime<Utc>) -> Result<()> {
        if n <= 0 {
            return Err(LedgerError::Validation(format!(
                "consume amount must be positive, got {n}"
            )));
        }
        if self.is_blocked {
            return Err(LedgerError::Blocked);
        }
        if self.credits < n {
            return Err(LedgerError::InsufficientCredit {
                credits: self.credits,
                required: n,
            });
        }
        self.credits -= n;
        self.last_generation_at = Some(now);
        self.stamp_if_zero(now);
        Ok(())
    }

    /// Remove up to `amount` credits, clamping at zero.
    ///
    /// # Errors
    ///
    /// Returns `Validation` if `amount` is not positive.
    pub fn revoke(&mut self, amount: i64, now: DateTime<Utc>) -> Result<()> {
        if amount <= 0 {
            return Err(LedgerError::Validation(format!(
                "revoke amount must be positive, got {amount}"
            )));
        }
        self.credits = (self.credits - amount).max(0);
        self.stamp_if_zero(now);
        Ok(())
    }

    /// Zero out an expired balance.
    ///
    /// Returns `true` if expiry was enforced. Idempotent: with credits
    /// already at 0, or no window, or a window still in the future, this
    /// is a no-op.
    pub fn enforce_expiry(&mut self, now: DateTime<Utc>) -> bool {
        if !self.is_expired(now) {
            return false;
        }
        self.credits = 0;
        self.stamp_if_zero(now);
        true
    }

    /// Move to `AwaitingMethod` with the given plan, overwriting any
    /// in-flight intent.
    pub fn select_plan(&mut self, plan_id: PlanId) {
        self.intent = Some(PurchaseIntent::new(plan_id));
    }

    /// Set the payment method on the in-flight intent.
    ///
    /// # Errors
    ///
    /// Returns `InvalidState` if no plan has been selected.
    pub fn select_method(&mut self, method: PaymentMethod) -> Result<()> {
        match self.intent.as_mut() {
            Some(intent) => {
                intent.method = Some(method);
                Ok(())
            }
            None => Err(LedgerError::InvalidState {
                expected: IntentState::AwaitingMethod,
                found: IntentState::Idle,
            }),
        }
    }

    /// Drain the intent slot for proof submission.
    ///
    /// Only valid from `AwaitingProof`; the slot is cleared regardless of
    /// the later approval outcome.
    ///
    /// # Errors
    ///
    /// Returns `InvalidState` unless both plan and method are selected.
    pub fn take_intent(&mut self) -> Result<(PlanId, PaymentMethod)> {
        let state = self.intent_state();
        if state != IntentState::AwaitingProof {
            return Err(LedgerError::InvalidState {
                expected: IntentState::AwaitingProof,
                found: state,
            });
        }
        let intent = self.intent.take().expect("checked above");
        let method = intent.method.expect("AwaitingProof implies method");
        Ok((intent.plan_id, method))
    }

    fn stamp_if_zero(&mut self, now: DateTime<Utc>) {
        if self.credits == 0 {
            self.credit_expires_at = Some(now);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn account() -> UserAccount {
        UserAccount::new(UserId::new("100").unwrap(), UserProfile::default())
    }

    #[test]
    fn new_account_is_idle_and_empty() {
        let a = account();
        assert_eq!(a.credits, 0);
        assert_eq!(a.intent_state(), IntentState::Idle);
        assert!(!a.free_credit_claimed);
    }

    #[test]
    fn grant_with_window_overwrites_expiry() {
        let mut a = account();
        let now = Utc::now();
        a.grant(5, 7, now).unwrap();
        assert_eq!(a.credits, 5);
        assert_eq!(a.credit_expires_at, Some(now + chrono::Duration::days(7)));

        // Most recent grant wins, even with unconsumed credit left.
        a.grant(3, 2, now).unwrap();
        assert_eq!(a.credits, 8);
        assert_eq!(a.credit_expires_at, Some(now + chrono::Duration::days(2)));
    }

    #[test]
    fn grant_without_window_leaves_expiry() {
        let mut a = account();
        let now = Utc::now();
        a.grant(5, 7, now).unwrap();
        let expiry = a.credit_expires_at;
        a.grant(1, 0, now).unwrap();
        assert_eq!(a.credit_expires_at, expiry);
    }

    #[test]
    fn grant_rejects_non_positive_amount() {
        let mut a = account();
        assert!(matches!(
            a.grant(0, 0, Utc::now()),
            Err(LedgerError::Validation(_))
        ));
        assert!(matches!(
            a.grant(-5, 0, Utc::now()),
            Err(LedgerError::Validation(_))
        ));
    }

    #[test]
    fn consume_to_zero_stamps_expiry_to_now() {
        let mut a = account();
        let granted = Utc::now();
        a.grant(2, 7, granted).unwrap();

        let later = granted + chrono::Duration::hours(1);
        a.consume(1, later).unwrap();
        assert_eq!(a.credit_expires_at, Some(granted + chrono::Duration::days(7)));

        a.consume(1, later).unwrap();
        assert_eq!(a.credits, 0);
        // Window closed early, not left at the 7-day mark.
        assert_eq!(a.credit_expires_at, Some(later));
        assert_eq!(a.last_generation_at, Some(later));
    }

    #[test]
    fn consume_insufficient() {
        let mut a = account();
        let err = a.consume(1, Utc::now()).unwrap_err();
        assert!(matches!(
            err,
            LedgerError::InsufficientCredit {
                credits: 0,
                required: 1
            }
        ));
    }

    #[test]
    fn consume_blocked() {
        let mut a = account();
        a.grant(1, 0, Utc::now()).unwrap();
        a.is_blocked = true;
        assert!(matches!(a.consume(1, Utc::now()), Err(LedgerError::Blocked)));
        assert_eq!(a.credits, 1);
    }

    #[test]
    fn revoke_clamps_at_zero_and_stamps() {
        let mut a = account();
        let now = Utc::now();
        a.grant(3, 7, now).unwrap();
        a.revoke(10, now).unwrap();
        assert_eq!(a.credits, 0);
        assert_eq!(a.credit_expires_at, Some(now));
    }

    #[test]
    fn enforce_expiry_is_idempotent() {
        let mut a = account();
        let now = Utc::now();
        a.grant(3, 1, now).unwrap();

        let past_window = now + chrono::Duration::days(2);
        assert!(a.enforce_expiry(past_window));
        assert_eq!(a.credits, 0);
        assert_eq!(a.credit_expires_at, Some(past_window));

        assert!(!a.enforce_expiry(past_window + chrono::Duration::days(1)));
        assert_eq!(a.credit_expires_at, Some(past_window));
    }

    #[test]
    fn enforce_expiry_noop_before_window() {
        let mut a = account();
        let now = Utc::now();
        a.grant(3, 7, now).unwrap();
        assert!(!a.enforce_expiry(now + chrono::Duration::days(1)));
        assert_eq!(a.credits, 3);
    }

    #[test]
    fn intent_last_write_wins() {
        let mut a = account();
        let plan_a = PlanId::generate();
        let plan_b = PlanId::generate();

        a.select_plan(plan_a);
        a.select_method(PaymentMethod::new("bkash").unwrap()).unwrap();
        assert_eq!(a.intent_state(), IntentState::AwaitingProof);

        // Re-selecting a plan replaces the slot entirely.
        a.select_plan(plan_b);
        assert_eq!(a.intent_state(), IntentState::AwaitingMethod);

        a.select_method(PaymentMethod::new("nagad").unwrap()).unwrap();
        let (plan, method) = a.take_intent().unwrap();
        assert_eq!(plan, plan_b);
        assert_eq!(method.as_str(), "nagad");
        assert_eq!(a.intent_state(), IntentState::Idle);
    }

    #[test]
    fn select_method_requires_plan() {
        let mut a = account();
        let err = a
            .select_method(PaymentMethod::new("bkash").unwrap())
            .unwrap_err();
        assert!(matches!(err, LedgerError::InvalidState { .. }));
    }

    #[test]
    fn take_intent_requires_awaiting_proof() {
        let mut a = account();
        assert!(matches!(
            a.take_intent(),
            Err(LedgerError::InvalidState { .. })
        ));

        a.select_plan(PlanId::generate());
        assert!(matches!(
            a.take_intent(),
            Err(LedgerError::InvalidState {
                found: IntentState::AwaitingMethod,
                ..
            })
        ));
    }
}
