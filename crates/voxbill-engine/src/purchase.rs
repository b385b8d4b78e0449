//! The purchase workflow: plan catalog, awaiting-purchase state machine,
//! and the payment-approval lifecycle.
//!
//! A user walks `Idle → AwaitingMethod → AwaitingProof → Idle`: picking
//! a plan, picking a payment method, then submitting proof, which turns
//! the in-flight intent into a pending [`PaymentRequest`]. An admin
//! decision terminates the request exactly once; approval drives the
//! ledger grant.

use voxbill_core::{
    ActorId, Decision, LedgerError, PaymentId, PaymentMethod, PaymentRequest, PaymentStatus,
    Plan, PlanId, ProofRef, Result, UserId,
};
use voxbill_store::Store;

use crate::engine::Engine;
use crate::notify::Messenger;

impl<S: Store, M: Messenger> Engine<S, M> {
    // =========================================================================
    // Plan catalog
    // =========================================================================

    /// Create a new active plan.
    ///
    /// # Errors
    ///
    /// Returns `Validation` for malformed plan content.
    pub fn create_plan(
        &self,
        name: impl Into<String>,
        credits: i64,
        price: impl Into<String>,
        valid_days: i64,
    ) -> Result<Plan> {
        let plan = Plan::new(name, credits, price, valid_days)?;
        self.store.put_plan(&plan)?;
        tracing::info!(plan_id = %plan.id, name = %plan.name, credits = plan.credits, "plan created");
        Ok(plan)
    }

    /// Toggle a plan's `active` flag. Plan content stays immutable;
    /// deactivation only removes it from the catalog shown to buyers.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for an unknown plan.
    pub fn set_plan_active(&self, plan_id: &PlanId, active: bool) -> Result<()> {
        self.store.set_plan_active(plan_id, active)?;
        tracing::info!(plan_id = %plan_id, active, "plan availability changed");
        Ok(())
    }

    /// List the plans currently offered to buyers.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    pub fn list_active_plans(&self) -> Result<Vec<Plan>> {
        Ok(self.store.list_plans(true)?)
    }

    // =========================================================================
    // Awaiting-purchase state machine
    // =========================================================================

    /// Record a plan selection, moving the user to `AwaitingMethod`.
    ///
    /// Overwrites any in-flight intent: a user has one purchase intent
    /// at a time, and the last selection wins.
    ///
    /// # Errors
    ///
    /// - `NotFound` for an unknown user or plan.
    /// - `Validation` if the plan is not active.
    pub fn select_plan(&self, user_id: &UserId, plan_id: &PlanId) -> Result<()> {
        let plan = self
            .store
            .get_plan(plan_id)?
            .ok_or_else(|| LedgerError::NotFound {
                entity: "plan",
                id: plan_id.to_string(),
            })?;
        if !plan.active {
            return Err(LedgerError::Validation(format!(
                "plan is not active: {plan_id}"
            )));
        }
        self.store
            .with_user::<_, LedgerError, _>(user_id, |account| {
                account.select_plan(plan.id);
                Ok(())
            })?;
        tracing::debug!(user_id = %user_id, plan_id = %plan_id, "plan selected");
        Ok(())
    }

    /// Record a payment-method selection, moving the user to
    /// `AwaitingProof`. Re-selection while already awaiting proof
    /// overwrites the method.
    ///
    /// # Errors
    ///
    /// - `InvalidState` if no plan is selected.
    /// - `NotFound` for an unknown user.
    pub fn select_method(&self, user_id: &UserId, method: PaymentMethod) -> Result<()> {
        self.store
            .with_user::<_, LedgerError, _>(user_id, |account| {
                account.select_method(method.clone())
            })?;
        tracing::debug!(user_id = %user_id, method = %method, "payment method selected");
        Ok(())
    }

    // =========================================================================
    // Payment requests
    // =========================================================================

    /// Submit payment proof, creating a pending [`PaymentRequest`] from
    /// the in-flight intent and clearing the intent in the same atomic
    /// scope. The slot is drained whatever the admin later decides.
    ///
    /// # Errors
    ///
    /// - `InvalidState` unless the user is `AwaitingProof`.
    /// - `NotFound` for an unknown user.
    pub fn submit_payment(&self, user_id: &UserId, proof: ProofRef) -> Result<PaymentRequest> {
        let request = self.store.submit_payment(user_id, proof)?;
        tracing::info!(
            user_id = %user_id,
            payment_id = %request.id,
            plan_id = %request.plan_id,
            method = %request.method,
            "payment submitted"
        );
        Ok(request)
    }

    /// Decide a pending payment request.
    ///
    /// The pending→terminal transition is a compare-and-set in the
    /// store: of two concurrent decisions, exactly one wins and the
    /// other fails with `NotPending`, so a duplicated admin action can
    /// never grant twice. On approval, the winning decision grants the
    /// plan's credits with its validity window. The user notification is
    /// best-effort either way.
    ///
    /// # Errors
    ///
    /// - `NotPending` if the request was already decided.
    /// - `NotFound` for an unknown request or (on approval) a missing
    ///   plan or user.
    pub async fn decide_payment(
        &self,
        payment_id: &PaymentId,
        decision: Decision,
        actor: &ActorId,
    ) -> Result<PaymentRequest> {
        let request = self.store.decide_payment(payment_id, decision, actor)?;
        tracing::info!(
            payment_id = %payment_id,
            user_id = %request.user_id,
            status = ?request.status,
            actor = %actor,
            "payment decided"
        );

        match decision {
            Decision::Approve => {
                let plan = self.store.get_plan(&request.plan_id)?.ok_or_else(|| {
                    LedgerError::NotFound {
                        entity: "plan",
                        id: request.plan_id.to_string(),
                    }
                })?;
                let outcome = self
                    .grant_credits(&request.user_id, plan.credits, Some(plan.valid_days))
                    .map_err(|err| {
                        // The request is already terminal; an operator must
                        // reconcile the missing grant by hand.
                        tracing::error!(
                            payment_id = %payment_id,
                            user_id = %request.user_id,
                            error = %err,
                            "request approved but credit grant failed"
                        );
                        err
                    })?;
                let text = format!(
                    "Payment approved! Plan {}: +{} credits, total {}.{}",
                    plan.name,
                    plan.credits,
                    outcome.credits,
                    if plan.valid_days > 0 {
                        format!(" Valid for {} days.", plan.valid_days)
                    } else {
                        String::new()
                    }
                );
                self.notify_best_effort(&request.user_id, &text).await;
            }
            Decision::Reject => {
                self.notify_best_effort(
                    &request.user_id,
                    "Your payment could not be verified and was rejected.",
                )
                .await;
            }
        }
        Ok(request)
    }

    /// List pending payment requests, newest first (the admin queue).
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    pub fn pending_payments(&self) -> Result<Vec<PaymentRequest>> {
        Ok(self.store.list_payments_by_status(PaymentStatus::Pending)?)
    }

    /// A user's payment history, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    pub fn payment_history(&self, user_id: &UserId) -> Result<Vec<PaymentRequest>> {
        Ok(self.store.list_payments_by_user(user_id)?)
    }
}
