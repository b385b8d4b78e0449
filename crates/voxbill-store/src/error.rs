//! Error types for voxbill storage.

use voxbill_core::{IntentState, LedgerError, PaymentId};

/// Result type for storage operations.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Errors that can occur in storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Database operation failed.
    #[error("database error: {0}")]
    Database(String),

    /// Serialization/deserialization failed.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Record not found.
    #[error("{entity} not found: {id}")]
    NotFound {
        /// What kind of record was looked up.
        entity: &'static str,
        /// The identifier that missed.
        id: String,
    },

    /// Compare-and-set on a payment request found it already decided.
    #[error("payment request is not pending: {payment_id}")]
    NotPending {
        /// The request that was already decided.
        payment_id: PaymentId,
    },

    /// A compound operation found the account in the wrong awaiting-state.
    #[error("invalid purchase state: expected {expected:?}, found {found:?}")]
    InvalidState {
        /// The state the operation requires.
        expected: IntentState,
        /// The state the account is actually in.
        found: IntentState,
    },
}

impl From<StoreError> for LedgerError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Database(msg) | StoreError::Serialization(msg) => Self::Storage(msg),
            StoreError::NotFound { entity, id } => Self::NotFound { entity, id },
            StoreError::NotPending { payment_id } => Self::NotPending { payment_id },
            StoreError::InvalidState { expected, found } => Self::InvalidState { expected, found },
        }
    }
}
