//! `RocksDB` storage implementation.

use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};

use chrono::Utc;
use dashmap::DashMap;
use rocksdb::{
    BoundColumnFamily, ColumnFamilyDescriptor, DBWithThreadMode, IteratorMode, MultiThreaded,
    Options, WriteBatch,
};

use voxbill_core::{
    ActorId, Decision, LedgerError, PaymentId, PaymentRequest, PaymentStatus, Plan, PlanId,
    ProofRef, UserAccount, UserId, UserProfile,
};

use crate::error::{Result, StoreError};
use crate::keys;
use crate::schema::{all_column_families, cf};
use crate::Store;

/// RocksDB-backed storage implementation.
///
/// `RocksDB` write batches give multi-key atomicity; per-account and
/// per-payment serializability comes from keyed lock registries, so
/// read-modify-write scopes on one key never interleave while different
/// keys proceed in parallel.
pub struct RocksStore {
    db: Arc<DBWithThreadMode<MultiThreaded>>,
    user_locks: DashMap<UserId, Arc<Mutex<()>>>,
    payment_locks: DashMap<PaymentId, Arc<Mutex<()>>>,
}

impl RocksStore {
    /// Open or create a `RocksDB` database at the given path.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or created.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let cf_descriptors: Vec<_> = all_column_families()
            .into_iter()
            .map(|name| ColumnFamilyDescriptor::new(name, Options::default()))
            .collect();

        let db = DBWithThreadMode::open_cf_descriptors(&opts, path, cf_descriptors)
            .map_err(|e| StoreError::Database(e.to_string()))?;

        Ok(Self {
            db: Arc::new(db),
            user_locks: DashMap::new(),
            payment_locks: DashMap::new(),
        })
    }

    /// Get a column family handle.
    fn cf(&self, name: &str) -> Result<Arc<BoundColumnFamily<'_>>> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| StoreError::Database(format!("column family not found: {name}")))
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

    /// Serialize a value using CBOR.
    fn serialize<T: serde::Serialize>(value: &T) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        ciborium::into_writer(value, &mut buf)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        Ok(buf)
    }

    /// Deserialize a value from CBOR.
    fn deserialize<T: serde::de::DeserializeOwned>(data: &[u8]) -> Result<T> {
        ciborium::from_reader(data).map_err(|e| StoreError::Serialization(e.to_string()))
    }

    fn read_user(&self, user_id: &UserId) -> Result<Option<UserAccount>> {
        let cf = self.cf(cf::USERS)?;
        self.db
            .get_cf(&cf, keys::user_key(user_id))
            .map_err(|e| StoreError::Database(e.to_string()))?
            .map(|data| Self::deserialize(&data))
            .transpose()
    }

    fn write_user(&self, account: &UserAccount) -> Result<()> {
        let cf = self.cf(cf::USERS)?;
        let value = Self::serialize(account)?;
        self.db
            .put_cf(&cf, keys::user_key(&account.user_id), value)
            .map_err(|e| StoreError::Database(e.to_string()))
    }

    fn write_payment(&self, request: &PaymentRequest) -> Result<()> {
        let cf = self.cf(cf::PAYMENTS)?;
        let value = Self::serialize(request)?;
        self.db
            .put_cf(&cf, keys::payment_key(&request.id), value)
            .map_err(|e| StoreError::Database(e.to_string()))
    }

    fn scan_users(&self) -> Result<Vec<UserAccount>> {
        let cf = self.cf(cf::USERS)?;
        let mut users = Vec::new();
        for item in self.db.iterator_cf(&cf, IteratorMode::Start) {
            let (_, value) = item.map_err(|e| StoreError::Database(e.to_string()))?;
            users.push(Self::deserialize(&value)?);
        }
        Ok(users)
    }
}

impl Store for RocksStore {
    // =========================================================================
    // User Operations
    // =========================================================================

    fn upsert_user(&self, user_id: &UserId, profile: &UserProfile) -> Result<UserAccount> {
        let lock = self.user_lock(user_id);
        let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);

        let account = match self.read_user(user_id)? {
            Some(mut existing) => {
                existing.profile = profile.clone();
                existing.updated_at = Utc::now();
                existing
            }
            None => UserAccount::new(user_id.clone(), profile.clone()),
        };
        self.write_user(&account)?;
        Ok(account)
    }

    fn get_user(&self, user_id: &UserId) -> Result<Option<UserAccount>> {
        self.read_user(user_id)
    }

    fn with_user<T, E, F>(&self, user_id: &UserId, f: F) -> std::result::Result<T, E>
    where
        F: FnOnce(&mut UserAccount) -> std::result::Result<T, E>,
        E: From<StoreError>,
    {
        let lock = self.user_lock(user_id);
        let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);

        let mut account = self
            .read_user(user_id)?
            .ok_or_else(|| StoreError::NotFound {
                entity: "user",
                id: user_id.to_string(),
            })?;

        let value = f(&mut account)?;

        account.updated_at = Utc::now();
        self.write_user(&account)?;
        Ok(value)
    }

    fn list_users(&self) -> Result<Vec<UserAccount>> {
        let mut users = self.scan_users()?;
        users.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(users)
    }

    fn list_users_with_credits(&self) -> Result<Vec<UserAccount>> {
        let mut users = self.scan_users()?;
        users.retain(|u| u.credits > 0);
        users.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(users)
    }

    // =========================================================================
    // Plan Operations
    // =========================================================================

    fn put_plan(&self, plan: &Plan) -> Result<()> {
        let cf = self.cf(cf::PLANS)?;
        let value = Self::serialize(plan)?;
        self.db
            .put_cf(&cf, keys::plan_key(&plan.id), value)
            .map_err(|e| StoreError::Database(e.to_string()))
    }

    fn get_plan(&self, plan_id: &PlanId) -> Result<Option<Plan>> {
        let cf = self.cf(cf::PLANS)?;
        self.db
            .get_cf(&cf, keys::plan_key(plan_id))
            .map_err(|e| StoreError::Database(e.to_string()))?
            .map(|data| Self::deserialize(&data))
            .transpose()
    }

    fn list_plans(&self, active_only: bool) -> Result<Vec<Plan>> {
        let cf = self.cf(cf::PLANS)?;
        let mut plans = Vec::new();
        for item in self.db.iterator_cf(&cf, IteratorMode::Start) {
            let (_, value) = item.map_err(|e| StoreError::Database(e.to_string()))?;
            let plan: Plan = Self::deserialize(&value)?;
            if !active_only || plan.active {
                plans.push(plan);
            }
        }
        plans.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(plans)
    }

    fn set_plan_active(&self, plan_id: &PlanId, active: bool) -> Result<()> {
        let mut plan = self.get_plan(plan_id)?.ok_or_else(|| StoreError::NotFound {
            entity: "plan",
            id: plan_id.to_string(),
        })?;
        plan.active = active;
        self.put_plan(&plan)
    }

    // =========================================================================
    // Payment Operations
    // =========================================================================

    fn create_payment(&self, request: &PaymentRequest) -> Result<()> {
        let cf_payments = self.cf(cf::PAYMENTS)?;
        let cf_by_user = self.cf(cf::PAYMENTS_BY_USER)?;

        let value = Self::serialize(request)?;
        let mut batch = WriteBatch::default();
        batch.put_cf(&cf_payments, keys::payment_key(&request.id), &value);
        batch.put_cf(
            &cf_by_user,
            keys::user_payment_key(&request.user_id, &request.id),
            [],
        );

        self.db
            .write(batch)
            .map_err(|e| StoreError::Database(e.to_string()))
    }

    fn submit_payment(&self, user_id: &UserId, proof: ProofRef) -> Result<PaymentRequest> {
        let lock = self.user_lock(user_id);
        let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);

        let mut account = self
            .read_user(user_id)?
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

        let cf_users = self.cf(cf::USERS)?;
        let cf_payments = self.cf(cf::PAYMENTS)?;
        let cf_by_user = self.cf(cf::PAYMENTS_BY_USER)?;

        let account_value = Self::serialize(&account)?;
        let request_value = Self::serialize(&request)?;

        // One batch: the intent clear and the request creation commit
        // together or not at all.
        let mut batch = WriteBatch::default();
        batch.put_cf(&cf_users, keys::user_key(user_id), &account_value);
        batch.put_cf(&cf_payments, keys::payment_key(&request.id), &request_value);
        batch.put_cf(
            &cf_by_user,
            keys::user_payment_key(user_id, &request.id),
            [],
        );

        self.db
            .write(batch)
            .map_err(|e| StoreError::Database(e.to_string()))?;
        Ok(request)
    }

    fn get_payment(&self, payment_id: &PaymentId) -> Result<Option<PaymentRequest>> {
        let cf = self.cf(cf::PAYMENTS)?;
        self.db
            .get_cf(&cf, keys::payment_key(payment_id))
            .map_err(|e| StoreError::Database(e.to_string()))?
            .map(|data| Self::deserialize(&data))
            .transpose()
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
            .get_payment(payment_id)?
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
        self.write_payment(&request)?;

        tracing::debug!(
            payment_id = %payment_id,
            status = ?request.status,
            actor = %actor,
            "payment request decided"
        );
        Ok(request)
    }

    fn list_payments_by_user(&self, user_id: &UserId) -> Result<Vec<PaymentRequest>> {
        let cf_by_user = self.cf(cf::PAYMENTS_BY_USER)?;
        let prefix = keys::user_payments_prefix(user_id);

        let iter = self.db.iterator_cf(
            &cf_by_user,
            IteratorMode::From(&prefix, rocksdb::Direction::Forward),
        );

        // ULID keys are time-ordered, so the prefix range is already
        // chronological; collect then reverse for newest-first.
        let mut ids = Vec::new();
        for item in iter {
            let (key, _) = item.map_err(|e| StoreError::Database(e.to_string()))?;
            if !key.starts_with(&prefix) {
                break;
            }
            if let Some(id) = keys::payment_id_from_user_key(&key) {
                ids.push(id);
            }
        }
        ids.reverse();

        let mut payments = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(request) = self.get_payment(&id)? {
                payments.push(request);
            }
        }
        Ok(payments)
    }

    fn list_payments_by_status(&self, status: PaymentStatus) -> Result<Vec<PaymentRequest>> {
        let cf = self.cf(cf::PAYMENTS)?;
        let mut payments = Vec::new();
        for item in self.db.iterator_cf(&cf, IteratorMode::Start) {
            let (_, value) = item.map_err(|e| StoreError::Database(e.to_string()))?;
            let request: PaymentRequest = Self::deserialize(&value)?;
            if request.status == status {
                payments.push(request);
            }
        }
        payments.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(payments)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use voxbill_core::PaymentMethod;
    use voxbill_core::ProofRef;

    fn create_test_store() -> (RocksStore, TempDir) {
        let dir = TempDir::new().unwrap();
        let store = RocksStore::open(dir.path()).unwrap();
        (store, dir)
    }

    fn user(n: &str) -> UserId {
        UserId::new(n).unwrap()
    }

    #[test]
    fn upsert_creates_then_refreshes_profile() {
        let (store, _dir) = create_test_store();
        let id = user("100");

        let created = store
            .upsert_user(
                &id,
                &UserProfile {
                    username: "alice".into(),
                    ..UserProfile::default()
                },
            )
            .unwrap();
        assert_eq!(created.credits, 0);
        assert_eq!(created.profile.username, "alice");

        // Repeat contact keeps balance, refreshes profile.
        store
            .with_user::<_, StoreError, _>(&id, |a| {
                a.credits = 5;
                Ok(())
            })
            .unwrap();
        let refreshed = store
            .upsert_user(
                &id,
                &UserProfile {
                    username: "alice_renamed".into(),
                    ..UserProfile::default()
                },
            )
            .unwrap();
        assert_eq!(refreshed.credits, 5);
        assert_eq!(refreshed.profile.username, "alice_renamed");
    }

    #[test]
    fn with_user_commits_only_on_ok() {
        let (store, _dir) = create_test_store();
        let id = user("100");
        store.upsert_user(&id, &UserProfile::default()).unwrap();

        let result: std::result::Result<(), StoreError> = store.with_user(&id, |a| {
            a.credits = 99;
            Err(StoreError::Database("boom".into()))
        });
        assert!(result.is_err());
        assert_eq!(store.get_user(&id).unwrap().unwrap().credits, 0);

        store
            .with_user::<_, StoreError, _>(&id, |a| {
                a.credits = 3;
                Ok(())
            })
            .unwrap();
        assert_eq!(store.get_user(&id).unwrap().unwrap().credits, 3);
    }

    #[test]
    fn with_user_unknown_account() {
        let (store, _dir) = create_test_store();
        let result: std::result::Result<(), StoreError> =
            store.with_user(&user("missing"), |_| Ok(()));
        assert!(matches!(result, Err(StoreError::NotFound { .. })));
    }

    #[test]
    fn with_user_serializes_concurrent_mutations() {
        let (store, _dir) = create_test_store();
        let store = Arc::new(store);
        let id = user("100");
        store.upsert_user(&id, &UserProfile::default()).unwrap();

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = Arc::clone(&store);
                let id = id.clone();
                std::thread::spawn(move || {
                    for _ in 0..50 {
                        store
                            .with_user::<_, StoreError, _>(&id, |a| {
                                a.credits += 1;
                                Ok(())
                            })
                            .unwrap();
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        assert_eq!(store.get_user(&id).unwrap().unwrap().credits, 400);
    }

    #[test]
    fn plan_crud_and_activation() {
        let (store, _dir) = create_test_store();
        let plan = Plan::new("Starter", 5, "$5", 7).unwrap();
        store.put_plan(&plan).unwrap();

        let fetched = store.get_plan(&plan.id).unwrap().unwrap();
        assert_eq!(fetched, plan);
        assert_eq!(store.list_plans(true).unwrap().len(), 1);

        store.set_plan_active(&plan.id, false).unwrap();
        assert!(store.list_plans(true).unwrap().is_empty());
        assert_eq!(store.list_plans(false).unwrap().len(), 1);

        assert!(matches!(
            store.set_plan_active(&PlanId::generate(), true),
            Err(StoreError::NotFound { .. })
        ));
    }

    #[test]
    fn decide_payment_is_a_cas() {
        let (store, _dir) = create_test_store();
        let request = PaymentRequest::new(
            user("100"),
            PlanId::generate(),
            PaymentMethod::new("bkash").unwrap(),
            ProofRef::new("p.jpg").unwrap(),
        );
        store.create_payment(&request).unwrap();

        let actor = ActorId::new("admin").unwrap();
        let decided = store
            .decide_payment(&request.id, Decision::Approve, &actor)
            .unwrap();
        assert_eq!(decided.status, PaymentStatus::Approved);
        assert!(decided.decided_at.is_some());

        // Second decision loses, whatever the outcome.
        let again = store.decide_payment(&request.id, Decision::Reject, &actor);
        assert!(matches!(again, Err(StoreError::NotPending { .. })));
        let stored = store.get_payment(&request.id).unwrap().unwrap();
        assert_eq!(stored.status, PaymentStatus::Approved);
    }

    #[test]
    fn concurrent_decides_have_one_winner() {
        let (store, _dir) = create_test_store();
        let store = Arc::new(store);
        let request = PaymentRequest::new(
            user("100"),
            PlanId::generate(),
            PaymentMethod::new("bkash").unwrap(),
            ProofRef::new("p.jpg").unwrap(),
        );
        store.create_payment(&request).unwrap();

        let handles: Vec<_> = (0..4)
            .map(|i| {
                let store = Arc::clone(&store);
                let id = request.id;
                std::thread::spawn(move || {
                    let actor = ActorId::new(format!("admin-{i}")).unwrap();
                    store.decide_payment(&id, Decision::Approve, &actor).is_ok()
                })
            })
            .collect();
        let wins = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|&won| won)
            .count();
        assert_eq!(wins, 1);
        assert_eq!(
            store.get_payment(&request.id).unwrap().unwrap().status,
            PaymentStatus::Approved
        );
    }

    #[test]
    fn submit_payment_drains_intent() {
        let (store, _dir) = create_test_store();
        let id = user("100");
        store.upsert_user(&id, &UserProfile::default()).unwrap();

        let plan = Plan::new("Starter", 5, "$5", 7).unwrap();
        store.put_plan(&plan).unwrap();
        store
            .with_user::<_, StoreError, _>(&id, |a| {
                a.select_plan(plan.id);
                a.select_method(PaymentMethod::new("bkash").unwrap())
                    .map_err(|e| StoreError::Database(e.to_string()))?;
                Ok(())
            })
            .unwrap();

        let request = store
            .submit_payment(&id, ProofRef::new("p.jpg").unwrap())
            .unwrap();
        assert_eq!(request.plan_id, plan.id);
        assert_eq!(request.status, PaymentStatus::Pending);
        assert!(store.get_user(&id).unwrap().unwrap().intent.is_none());

        // Slot is drained; a second submission has nothing to claim.
        let again = store.submit_payment(&id, ProofRef::new("q.jpg").unwrap());
        assert!(matches!(again, Err(StoreError::InvalidState { .. })));
    }

    #[test]
    fn payments_listed_newest_first() {
        let (store, _dir) = create_test_store();
        let id = user("100");
        let plan = PlanId::generate();
        let method = PaymentMethod::new("bkash").unwrap();

        let first = PaymentRequest::new(
            id.clone(),
            plan,
            method.clone(),
            ProofRef::new("a.jpg").unwrap(),
        );
        store.create_payment(&first).unwrap();
        std::thread::sleep(std::time::Duration::from_millis(2)); // distinct ULID timestamps

        let second = PaymentRequest::new(id.clone(), plan, method, ProofRef::new("b.jpg").unwrap());
        store.create_payment(&second).unwrap();

        let listed = store.list_payments_by_user(&id).unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].id, second.id);
        assert_eq!(listed[1].id, first.id);

        let pending = store
            .list_payments_by_status(PaymentStatus::Pending)
            .unwrap();
        assert_eq!(pending.len(), 2);
        assert!(store
            .list_payments_by_status(PaymentStatus::Approved)
            .unwrap()
            .is_empty());
    }

    #[test]
    fn index_does_not_bleed_across_similar_identities() {
        let (store, _dir) = create_test_store();
        let short = user("12");
        let long = user("123");
        let plan = PlanId::generate();
        let method = PaymentMethod::new("bkash").unwrap();

        store
            .create_payment(&PaymentRequest::new(
                long.clone(),
                plan,
                method,
                ProofRef::new("p.jpg").unwrap(),
            ))
            .unwrap();

        assert!(store.list_payments_by_user(&short).unwrap().is_empty());
        assert_eq!(store.list_payments_by_user(&long).unwrap().len(), 1);
    }
}
