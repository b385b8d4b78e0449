//! Storage layer for the voxbill credit ledger.
//!
//! This crate provides persistent storage for user accounts, plans, and
//! payment requests, with the two atomicity primitives the ledger engine
//! depends on:
//!
//! - [`Store::with_user`], an atomic per-account read-modify-write scope.
//!   Every credit or awaiting-state mutation for one account runs under
//!   that account's keyed lock; mutations of different accounts never
//!   contend.
//! - [`Store::decide_payment`], an atomic pending-to-terminal compare-and-set
//!   on a payment request, so duplicate admin decisions cannot both win.
//!
//! Two implementations are provided: [`RocksStore`] (`RocksDB` with column
//! families and CBOR values) and [`MemoryStore`] (for tests and embedding).
//!
//! # Example
//!
//! ```no_run
//! use voxbill_store::{RocksStore, Store, StoreError};
//! use voxbill_core::{UserId, UserProfile};
//!
//! let store = RocksStore::open("/tmp/voxbill-db").unwrap();
//! let user_id = UserId::new("123456").unwrap();
//! store.upsert_user(&user_id, &UserProfile::default()).unwrap();
//!
//! // Atomic read-modify-write under the account's lock.
//! let credits = store
//!     .with_user::<_, StoreError, _>(&user_id, |account| {
//!         account.credits += 1;
//!         Ok(account.credits)
//!     })
//!     .unwrap();
//! assert_eq!(credits, 1);
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod error;
pub mod keys;
pub mod memory;
pub mod rocks;
pub mod schema;

pub use error::{Result, StoreError};
pub use memory::MemoryStore;
pub use rocks::RocksStore;

use voxbill_core::{
    ActorId, Decision, PaymentId, PaymentRequest, PaymentStatus, Plan, PlanId, ProofRef,
    UserAccount, UserId, UserProfile,
};

/// The storage trait defining all database operations.
///
/// Implementations must make [`Store::with_user`] serializable per
/// account and [`Store::decide_payment`] a true compare-and-set.
pub trait Store: Send + Sync {
    // =========================================================================
    // User Operations
    // =========================================================================

    /// Create an account on first contact, or refresh its profile fields.
    ///
    /// Returns the stored account.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn upsert_user(&self, user_id: &UserId, profile: &UserProfile) -> Result<UserAccount>;

    /// Get an account by external identity.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn get_user(&self, user_id: &UserId) -> Result<Option<UserAccount>>;

    /// Run an atomic read-modify-write against one account.
    ///
    /// The account's keyed lock is held for the duration of `f`. The
    /// mutated record is committed only when `f` returns `Ok`; an `Err`
    /// from `f` or a storage failure commits nothing. `updated_at` is
    /// stamped on commit.
    ///
    /// # Errors
    ///
    /// - `StoreError::NotFound` (converted through `E`) if the account
    ///   doesn't exist.
    /// - Whatever `f` returns.
    /// - Storage failures, converted through `E`.
    fn with_user<T, E, F>(&self, user_id: &UserId, f: F) -> std::result::Result<T, E>
    where
        F: FnOnce(&mut UserAccount) -> std::result::Result<T, E>,
        E: From<StoreError>;

    /// List all accounts, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn list_users(&self) -> Result<Vec<UserAccount>>;

    /// List accounts currently holding credits (the sweeper's working set).
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn list_users_with_credits(&self) -> Result<Vec<UserAccount>>;

    // =========================================================================
    // Plan Operations
    // =========================================================================

    /// Insert or update a plan record.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn put_plan(&self, plan: &Plan) -> Result<()>;

    /// Get a plan by ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn get_plan(&self, plan_id: &PlanId) -> Result<Option<Plan>>;

    /// List plans, optionally only the active ones.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn list_plans(&self, active_only: bool) -> Result<Vec<Plan>>;

    /// Toggle a plan's `active` flag. Plans are never hard-deleted while
    /// payment history references them.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::NotFound` if the plan doesn't exist.
    fn set_plan_active(&self, plan_id: &PlanId, active: bool) -> Result<()>;

    // =========================================================================
    // Payment Operations
    // =========================================================================

    /// Insert a new pending payment request and its user index entry.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn create_payment(&self, request: &PaymentRequest) -> Result<()>;

    /// Turn a user's `AwaitingProof` intent into a pending payment
    /// request: drain the intent slot and create the request atomically,
    /// under the account's lock.
    ///
    /// Returns the created request.
    ///
    /// # Errors
    ///
    /// - `StoreError::NotFound` if the account doesn't exist.
    /// - `StoreError::InvalidState` unless the account is `AwaitingProof`;
    ///   nothing is written in that case.
    fn submit_payment(&self, user_id: &UserId, proof: ProofRef) -> Result<PaymentRequest>;

    /// Get a payment request by ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn get_payment(&self, payment_id: &PaymentId) -> Result<Option<PaymentRequest>>;

    /// Atomically move a pending request to its terminal status.
    ///
    /// This is a compare-and-set: of any number of concurrent decisions
    /// on the same request, exactly one observes `Pending` and wins.
    /// Returns the decided request.
    ///
    /// # Errors
    ///
    /// - `StoreError::NotFound` if the request doesn't exist.
    /// - `StoreError::NotPending` if it was already decided.
    fn decide_payment(
        &self,
        payment_id: &PaymentId,
        decision: Decision,
        actor: &ActorId,
    ) -> Result<PaymentRequest>;

    /// List a user's payment requests, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn list_payments_by_user(&self, user_id: &UserId) -> Result<Vec<PaymentRequest>>;

    /// List payment requests with the given status, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn list_payments_by_status(&self, status: PaymentStatus) -> Result<Vec<PaymentRequest>>;
}
