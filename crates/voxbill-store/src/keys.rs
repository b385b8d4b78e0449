//! Key encoding utilities for `RocksDB`.
//!
//! User identities are variable-length strings, so composite keys insert
//! a NUL separator after the identity (`UserId` construction forbids NUL
//! bytes). This keeps the prefix for user "12" from matching keys of
//! user "123".

use voxbill_core::{PaymentId, PlanId, UserId};

/// Create a user key from a user ID.
#[must_use]
pub fn user_key(user_id: &UserId) -> Vec<u8> {
    user_id.as_bytes().to_vec()
}

/// Create a plan key from a plan ID.
#[must_use]
pub fn plan_key(plan_id: &PlanId) -> Vec<u8> {
    plan_id.as_bytes().to_vec()
}

/// Create a payment key from a payment ID.
#[must_use]
pub fn payment_key(payment_id: &PaymentId) -> Vec<u8> {
    payment_id.to_bytes().to_vec()
}

/// Create a user-payment index key.
///
/// Format: `user_id || 0x00 || payment_id (16 bytes)`
///
/// Since ULIDs are time-ordered, a user's payments sort chronologically
/// in key order.
#[must_use]
pub fn user_payment_key(user_id: &UserId, payment_id: &PaymentId) -> Vec<u8> {
    let mut key = Vec::with_capacity(user_id.as_bytes().len() + 17);
    key.extend_from_slice(user_id.as_bytes());
    key.push(0);
    key.extend_from_slice(&payment_id.to_bytes());
    key
}

/// Create a prefix for iterating all payments of a user.
#[must_use]
pub fn user_payments_prefix(user_id: &UserId) -> Vec<u8> {
    let mut prefix = Vec::with_capacity(user_id.as_bytes().len() + 1);
    prefix.extend_from_slice(user_id.as_bytes());
    prefix.push(0);
    prefix
}

/// Extract the payment ID from a user-payment index key.
///
/// Returns `None` if the key does not end in 16 valid ULID bytes.
#[must_use]
pub fn payment_id_from_user_key(key: &[u8]) -> Option<PaymentId> {
    if key.len() < 17 {
        return None;
    }
    let mut bytes = [0u8; 16];
    bytes.copy_from_slice(&key[key.len() - 16..]);
    PaymentId::from_bytes(bytes).ok()
}
