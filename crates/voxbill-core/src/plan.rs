//! Purchasable credit bundles.

use serde::{Deserialize, Serialize};

use crate::error::{LedgerError, Result};
use crate::ids::PlanId;

/// A purchasable bundle of credits with an optional validity window.
///
/// Plan content is immutable once a payment request referencing it has
/// been approved; only `active` may toggle. Plans are never hard-deleted
/// while payment history references them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Plan {
    /// Plan identifier.
    pub id: PlanId,

    /// Display name shown to buyers.
    pub name: String,

    /// Credits granted on approval. Always positive.
    pub credits: i64,

    /// Display price, free-form (e.g. "$5"). No arithmetic is ever
    /// performed on it.
    pub price: String,

    /// Validity window in days; 0 means the credits never expire.
    pub valid_days: i64,

    /// Whether the plan is offered to buyers.
    pub active: bool,
}

impl Plan {
    /// Create a new active plan.
    ///
    /// # Errors
    ///
    /// Returns `Validation` if `credits` is not positive, `valid_days`
    /// is negative, or `name`/`price` is empty.
    pub fn new(
        name: impl Into<String>,
        credits: i64,
        price: impl Into<String>,
        valid_days: i64,
    ) -> Result<Self> {
        let name = name.into();
        let price = price.into();
        if credits <= 0 {
            return Err(LedgerError::Validation(format!(
                "plan credits must be positive, got {credits}"
            )));
        }
        if valid_days < 0 {
            return Err(LedgerError::Validation(format!(
                "plan valid_days must not be negative, got {valid_days}"
            )));
        }
        if name.is_empty() {
            return Err(LedgerError::Validation("plan name must not be empty".into()));
        }
        if price.is_empty() {
            return Err(LedgerError::Validation(
                "plan price must not be empty".into(),
            ));
        }
        Ok(Self {
            id: PlanId::generate(),
            name,
            credits,
            price,
            valid_days,
            active: true,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_plan_is_active() {
        let plan = Plan::new("Starter", 5, "$5", 7).unwrap();
        assert!(plan.active);
        assert_eq!(plan.credits, 5);
        assert_eq!(plan.valid_days, 7);
    }

    #[test]
    fn zero_valid_days_is_allowed() {
        let plan = Plan::new("Forever", 10, "$9", 0).unwrap();
        assert_eq!(plan.valid_days, 0);
    }

    #[test]
    fn rejects_bad_content() {
        assert!(Plan::new("Starter", 0, "$5", 7).is_err());
        assert!(Plan::new("Starter", 5, "$5", -1).is_err());
        assert!(Plan::new("", 5, "$5", 7).is_err());
        assert!(Plan::new("Starter", 5, "", 7).is_err());
    }
}
