//! Payment requests: a user's claim of having paid for a plan, awaiting
//! human approval.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{LedgerError, Result};
use crate::ids::{ActorId, PaymentId, PlanId, UserId};

/// A payment method name.
///
/// Methods are admin-configured (e.g. "bkash", "nagad"), so this is a
/// validated open set rather than a closed enum: non-empty, lowercased
/// on construction.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PaymentMethod(String);

impl PaymentMethod {
    /// Create a payment method name.
    ///
    /// # Errors
    ///
    /// Returns `Validation` if the name is empty.
    pub fn new(name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(LedgerError::Validation(
                "payment method must not be empty".into(),
            ));
        }
        Ok(Self(name.trim().to_lowercase()))
    }

    /// The normalized method name.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// An opaque reference to the submitted payment proof (a stored
/// screenshot path, object key, or platform file id). File storage
/// mechanics are a collaborator's concern.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProofRef(String);

impl ProofRef {
    /// Create a proof reference.
    ///
    /// # Errors
    ///
    /// Returns `Validation` if the reference is empty.
    pub fn new(reference: impl Into<String>) -> Result<Self> {
        let reference = reference.into();
        if reference.is_empty() {
            return Err(LedgerError::Validation(
                "proof reference must not be empty".into(),
            ));
        }
        Ok(Self(reference))
    }

    /// The underlying reference.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Status of a payment request.
///
/// Transitions only pending→approved or pending→rejected, exactly once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    /// Awaiting an administrative decision.
    Pending,

    /// Approved; credits were granted.
    Approved,

    /// Rejected; no credits granted.
    Rejected,
}

impl PaymentStatus {
    /// Whether this is a terminal status.
    #[must_use]
    pub const fn is_decided(self) -> bool {
        !matches!(self, Self::Pending)
    }
}

/// The outcome an administrator picks for a pending request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    /// Approve the claim and grant the plan's credits.
    Approve,

    /// Reject the claim.
    Reject,
}

impl Decision {
    /// The terminal status this decision produces.
    #[must_use]
    pub const fn status(self) -> PaymentStatus {
        match self {
            Self::Approve => PaymentStatus::Approved,
            Self::Reject => PaymentStatus::Rejected,
        }
    }
}

/// A payment-approval claim tied to a plan/method selection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentRequest {
    /// Request identifier (ULID, time-ordered).
    pub id: PaymentId,

    /// The claiming user.
    pub user_id: UserId,

    /// The plan being purchased.
    pub plan_id: PlanId,

    /// The payment method the user selected.
    pub method: PaymentMethod,

    /// Current status.
    pub status: PaymentStatus,

    /// Reference to the submitted proof.
    pub proof: ProofRef,

    /// When the request was created.
    pub created_at: DateTime<Utc>,

    /// When the request was decided, if it has been.
    pub decided_at: Option<DateTime<Utc>>,

    /// The administrator who decided, if decided.
    pub decided_by: Option<ActorId>,
}

impl PaymentRequest {
    /// Create a new pending request.
    #[must_use]
    pub fn new(user_id: UserId, plan_id: PlanId, method: PaymentMethod, proof: ProofRef) -> Self {
        Self {
            id: PaymentId::generate(),
            user_id,
            plan_id,
            method,
            status: PaymentStatus::Pending,
            proof,
            created_at: Utc::now(),
            decided_at: None,
            decided_by: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn method_is_normalized() {
        let m = PaymentMethod::new("  BKash ").unwrap();
        assert_eq!(m.as_str(), "bkash");
        assert!(PaymentMethod::new("   ").is_err());
    }

    #[test]
    fn new_request_is_pending() {
        let req = PaymentRequest::new(
            UserId::new("7").unwrap(),
            PlanId::generate(),
            PaymentMethod::new("nagad").unwrap(),
            ProofRef::new("uploads/payments/p1.jpg").unwrap(),
        );
        assert_eq!(req.status, PaymentStatus::Pending);
        assert!(req.decided_at.is_none());
        assert!(req.decided_by.is_none());
    }

    #[test]
    fn decision_maps_to_status() {
        assert_eq!(Decision::Approve.status(), PaymentStatus::Approved);
        assert_eq!(Decision::Reject.status(), PaymentStatus::Rejected);
        assert!(PaymentStatus::Approved.is_decided());
        assert!(!PaymentStatus::Pending.is_decided());
    }
}
