//! The awaiting-purchase state machine.
//!
//! A user has at most one purchase intent in flight: a single slot holding
//! the plan they picked and, once chosen, the payment method. Re-selecting
//! a plan or method while mid-flow overwrites the slot (last write wins).
//! Submitting proof drains the slot back to `Idle` regardless of how the
//! admin later decides the claim.

use serde::{Deserialize, Serialize};

use crate::ids::PlanId;
use crate::payment::PaymentMethod;

/// An in-progress plan/method selection, prior to proof submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchaseIntent {
    /// The plan the user picked.
    pub plan_id: PlanId,

    /// The payment method, once the user has picked one.
    pub method: Option<PaymentMethod>,
}

impl PurchaseIntent {
    /// Start a new intent at the method-selection step.
    #[must_use]
    pub const fn new(plan_id: PlanId) -> Self {
        Self {
            plan_id,
            method: None,
        }
    }

    /// The state this intent represents.
    #[must_use]
    pub const fn state(&self) -> IntentState {
        if self.method.is_some() {
            IntentState::AwaitingProof
        } else {
            IntentState::AwaitingMethod
        }
    }
}

/// The observable states of the purchase-intent slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntentState {
    /// No purchase in flight.
    Idle,

    /// Plan selected, waiting for a payment method.
    AwaitingMethod,

    /// Plan and method selected, waiting for payment proof.
    AwaitingProof,
}

/// The state of an optional intent slot.
#[must_use]
pub fn state_of(slot: Option<&PurchaseIntent>) -> IntentState {
    slot.map_or(IntentState::Idle, PurchaseIntent::state)
}
