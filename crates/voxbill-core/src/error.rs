//! Error types for voxbill.

use crate::ids::{IdError, PaymentId};
use crate::intent::IntentState;

/// Result type for voxbill operations.
pub type Result<T> = std::result::Result<T, LedgerError>;

/// Errors that can occur in ledger and workflow operations.
///
/// Ledger-integrity errors (`InsufficientCredit`, `NotPending`,
/// `AlreadyClaimed`, `InvalidState`) are never auto-retried; the caller
/// must re-derive correct state before resubmitting.
#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    /// Malformed amount, plan content, or other input.
    #[error("validation error: {0}")]
    Validation(String),

    /// The user is not in the awaiting-state the transition requires.
    #[error("invalid purchase state: expected {expected:?}, found {found:?}")]
    InvalidState {
        /// The state the operation requires.
        expected: IntentState,
        /// The state the account is actually in.
        found: IntentState,
    },

    /// Decision attempted on an already-decided payment request.
    #[error("payment request is not pending: {payment_id}")]
    NotPending {
        /// The request that was already decided.
        payment_id: PaymentId,
    },

    /// Not enough credits for the requested consumption.
    #[error("insufficient credit: credits={credits}, required={required}")]
    InsufficientCredit {
        /// Current credit balance.
        credits: i64,
        /// Credits required by the operation.
        required: i64,
    },

    /// The free credit was already claimed by this account.
    #[error("free credit already claimed")]
    AlreadyClaimed,

    /// Membership check did not confirm channel membership.
    #[error("not a channel member")]
    NotMember,

    /// Unknown user, plan, or payment request.
    #[error("{entity} not found: {id}")]
    NotFound {
        /// What kind of record was looked up.
        entity: &'static str,
        /// The identifier that missed.
        id: String,
    },

    /// The account is blocked from consuming credits.
    #[error("account is blocked")]
    Blocked,

    /// A messaging or membership-check collaborator failed.
    #[error("external service unavailable: {service} - {message}")]
    ExternalUnavailable {
        /// The collaborator that failed.
        service: &'static str,
        /// Error message from the collaborator.
        message: String,
    },

    /// Storage-layer failure; the whole operation was aborted.
    #[error("storage error: {0}")]
    Storage(String),

    /// Invalid identifier.
    #[error("invalid identifier: {0}")]
    InvalidId(#[from] IdError),
}
