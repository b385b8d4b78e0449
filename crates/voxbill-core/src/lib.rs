//! Core types for the voxbill credit ledger.
//!
//! This crate provides the foundational types used throughout voxbill:
//!
//! - **Identifiers**: `UserId`, `PlanId`, `PaymentId`, `ActorId`
//! - **Accounts**: `UserAccount` with its balance rules and intent slot
//! - **Plans**: `Plan`, a purchasable credit bundle
//! - **Payments**: `PaymentRequest` and its status machine
//! - **Errors**: the `LedgerError` taxonomy
//!
//! # Credits
//!
//! One credit buys one voice generation. Credits are prepaid value: the
//! balance rules here guarantee they are never silently duplicated or
//! lost, and that a zero balance never carries a future expiry date.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod account;
pub mod error;
pub mod ids;
pub mod intent;
pub mod payment;
pub mod plan;

pub use account::{UserAccount, UserProfile};
pub use error::{LedgerError, Result};
pub use ids::{ActorId, IdError, PaymentId, PlanId, UserId};
pub use intent::{IntentState, PurchaseIntent};
pub use payment::{Decision, PaymentMethod, PaymentRequest, PaymentStatus, ProofRef};
pub use plan::Plan;
