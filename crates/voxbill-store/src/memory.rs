//! In-memory storage implementation.
//!
//! Implements the same contract as [`crate::RocksStore`], including the
//! per-account and per-payment serializability guarantees, backed by
//! concurrent maps. Used by tests and by embedders that do not need
//! durability.

use std::sync::{Arc, Mutex, PoisonError};

use chrono::Utc;
use dashmap::DashMap;

use voxbill_core::{
    ActorId, Decision, LedgerError, PaymentId, PaymentRequest, PaymentStatus, Plan, PlanId,
    ProofRef, UserAccount, UserId, UserProfile,
};

use crate::error::{Result, StoreError};
use crate::Store;

/// Concurrent-map storage implementation.
#[derive(Default)]
pub struct MemoryStore {
    users: DashMap<UserId, UserAccount>,
    plans: DashMap<PlanId, Plan>,
    payments: DashMap<PaymentId, PaymentRequest>,
    user_locks: DashMap<UserId, Arc<Mutex<()>>>,
    payment_locks: DashMap<PaymentId, Arc<Mutex<()>>>,
}

impl MemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn user_lock(&self, user_id: &UserId) -> Arc<Mutex<()>> {
        self.user_locks
            .entry(user_id.clone())
            .or_default()
            .clone()
    }

    fn payment_lock(&self, payment_id: &PaymentId) -> Arc<Mutex<()>> {
        self.payment_locks.entry(*payment_id).or_default().clone()
    }
}

impl Store for MemoryStore {
    fn upsert_user(&self, user_id: &UserId, profile: &UserProfile) -> Result<UserAccount> {
        let lock = self.user_lock(user_id);
        let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);

        let account = match self.users.get(user_id).map(|a| a.value().clone()) {
            Some(mut existing) => {
                existing.profile = profile.clone();
                existing.updated_at = Utc::now();
                existing
            }
            None => UserAccount::new(user_id.clone(), profile.clone()),
        };
        self.users.insert(user_id.clone(), account.clone());
        Ok(account)
    }

    fn get_user(&self, user_id: &UserId) -> Result<Option<UserAccount>> {
        Ok(self.users.get(user_id).map(|a| a.value().clone()))
    }

    fn with_user<T, E, F>(&self, user_id: &UserId, f: F) -> std::result::Result<T, E>
    where
        F: FnOnce(&mut UserAccount) -> std::result::Result<T, E>,
        E: From<StoreError>,
    {
        let lock = self.user_lock(user_id);
        let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);

        let mut account = self
            .users
            .get(user_id)
            .map(|a| a.value().clone())
            .ok_or_else(|| StoreError::NotFound {
                entity: "user",
                id: user_id.to_string(),
            })?;

        let value = f(&mut account)?;

        account.updated_at = Utc::now();
        self.users.insert(user_id.clone(), account);
        Ok(value)
    }

    fn list_users(&self) -> Result<Vec<UserAccount>> {
        let mut users: Vec<_> = self.users.iter().map(|e| e.value().clone()).collect();
        users.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(users)
    }

    fn list_users_with_credits(&self) -> Result<Vec<UserAccount>> {
        let mut users: Vec<_> = self
            .users
            .iter()
            .map(|e| e.value().clone())
            .filter(|u| u.credits > 0)
            .collect();
        users.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(users)
    }

    fn put_plan(&self, plan: &Plan) -> Result<()> {
        self.plans.insert(plan.id, plan.clone());
        Ok(())
    }

    fn get_plan(&self, plan_id: &PlanId) -> Result<Option<Plan>> {
        Ok(self.plans.get(plan_id).map(|p| p.value().clone()))
    }

    fn list_plans(&self, active_only: bool) -> Result<Vec<Plan>> {
        let mut plans: Vec<_> = self
            .plans
            .iter()
            .map(|e| e.value().clone())
            .filter(|p| !active_only || p.active)
            .collect();
        plans.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(plans)
    }

    fn set_plan_active(&self, plan_id: &PlanId, active: bool) -> Result<()> {
        match self.plans.get_mut(plan_id) {
            Some(mut plan) => {
                plan.active = active;
                Ok(())
            }
            None => Err(StoreError::NotFound {
                entity: "plan",
                id: plan_id.to_string(),
            }),
        }
    }

    fn create_payment(&self, request: &PaymentRequest) -> Result<()> {
        self.payments.insert(request.id, request.clone());
        Ok(())
    }

    fn submit_payment(&self, user_id: &UserId, proof: ProofRef) -> Result<PaymentRequest> {
        let lock = self.user_lock(user_id);
        let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);

        let mut account = self
            .users
            .get(user_id)
            .map(|a| a.value().clone())
            .ok_or_else(|| StoreError::NotFound {
                entity: "user",
                id: user_id.to_string(),
            })?;

        let (plan_id, method) = account.take_intent().map_err(|e| match e {
            LedgerError::InvalidState { expected, found } => {
                StoreError::InvalidState { expected, found }
            }
            other => StoreError::Database(other.to_string()),
        })?;
        account.updated_at = Utc::now();

        let request = PaymentRequest::new(user_id.clone(), plan_id, method, proof);
        self.users.insert(user_id.clone(), account);
        self.payments.insert(request.id, request.clone());
        Ok(request)
    }

    fn get_payment(&self, payment_id: &PaymentId) -> Result<Option<PaymentRequest>> {
        Ok(self.payments.get(payment_id).map(|p| p.value().clone()))
    }

    fn decide_payment(
        &self,
        payment_id: &PaymentId,
        decision: Decision,
        actor: &ActorId,
    ) -> Result<PaymentRequest> {
        let lock = self.payment_lock(payment_id);
        let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);

        let mut request = self
            .payments
            .get(payment_id)
            .map(|p| p.value().clone())
            .ok_or_else(|| StoreError::NotFound {
                entity: "payment",
                id: payment_id.to_string(),
            })?;

        if request.status.is_decided() {
            return Err(StoreError::NotPending {
                payment_id: *payment_id,
            });
        }

        request.status = decision.status();
        request.decided_at = Some(Utc::now());
        request.decided_by = Some(actor.clone());
        self.payments.insert(*payment_id, request.clone());
        Ok(request)
    }

    fn list_payments_by_user(&self, user_id: &UserId) -> Result<Vec<PaymentRequest>> {
        let mut payments: Vec<_> = self
            .payments
            .iter()
            .map(|e| e.value().clone())
            .filter(|p| &p.user_id == user_id)
            .collect();
        payments.sort_by(|a, b| b.id.to_bytes().cmp(&a.id.to_bytes()));
        Ok(payments)
    }

    fn list_payments_by_status(&self, status: PaymentStatus) -> Result<Vec<PaymentRequest>> {
        let mut payments: Vec<_> = self
            .payments
            .iter()
            .map(|e| e.value().clone())
            .filter(|p| p.status == status)
            .collect();
        payments.sort_by(|a, b| b.id.to_bytes().cmp(&a.id.to_bytes()));
        Ok(payments)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use voxbill_core::{PaymentMethod, ProofRef};

    fn user(n: &str) -> UserId {
        UserId::new(n).unwrap()
    }

    #[test]
    fn with_user_aborts_cleanly_on_error() {
        let store = MemoryStore::new();
        let id = user("1");
        store.upsert_user(&id, &UserProfile::default()).unwrap();

        let result: std::result::Result<(), StoreError> = store.with_user(&id, |a| {
            a.credits = 10;
            Err(StoreError::Database("boom".into()))
        });
        assert!(result.is_err());
        assert_eq!(store.get_user(&id).unwrap().unwrap().credits, 0);
    }

    #[test]
    fn concurrent_consume_of_last_credit() {
        let store = Arc::new(MemoryStore::new());
        let id = user("1");
        store.upsert_user(&id, &UserProfile::default()).unwrap();
        store
            .with_user::<_, StoreError, _>(&id, |a| {
                a.credits = 1;
                Ok(())
            })
            .unwrap();

        let handles: Vec<_> = (0..2)
            .map(|_| {
                let store = Arc::clone(&store);
                let id = id.clone();
                std::thread::spawn(move || {
                    store.with_user::<_, StoreError, _>(&id, |a| {
                        if a.credits < 1 {
                            return Err(StoreError::Database("insufficient".into()));
                        }
                        a.credits -= 1;
                        Ok(())
                    })
                })
            })
            .collect();

        let successes = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(std::result::Result::is_ok)
            .count();
        assert_eq!(successes, 1);
        assert_eq!(store.get_user(&id).unwrap().unwrap().credits, 0);
    }

    #[test]
    fn decide_payment_cas() {
        let store = MemoryStore::new();
        let request = PaymentRequest::new(
            user("1"),
            PlanId::generate(),
            PaymentMethod::new("bkash").unwrap(),
            ProofRef::new("p.jpg").unwrap(),
        );
        store.create_payment(&request).unwrap();

        let actor = ActorId::new("admin").unwrap();
        store
            .decide_payment(&request.id, Decision::Reject, &actor)
            .unwrap();
        assert!(matches!(
            store.decide_payment(&request.id, Decision::Approve, &actor),
            Err(StoreError::NotPending { .. })
        ));
    }
}
