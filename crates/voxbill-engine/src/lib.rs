//! Credit ledger and payment-approval engine.
//!
//! [`Engine`] is the single entry point the bot-facing and admin-facing
//! layers call: it grants, consumes, and revokes prepaid generation
//! credits, walks users through the plan/method/proof purchase flow,
//! settles payment requests exactly once, sweeps expired balances on a
//! schedule, and hands out the one-time free credit to community-channel
//! members. Storage is abstracted behind [`voxbill_store::Store`] and
//! outbound messaging behind [`Messenger`].
//!
//! ```no_run
//! use std::sync::Arc;
//! # use async_trait::async_trait;
//! # use voxbill_core::UserId;
//! # use voxbill_engine::{Engine, MembershipStatus, Messenger, NotifyError, Settings};
//! # use voxbill_store::MemoryStore;
//! # struct Bot;
//! # #[async_trait]
//! # impl Messenger for Bot {
//! #     async fn notify(&self, _: &UserId, _: &str) -> Result<(), NotifyError> { Ok(()) }
//! #     async fn check_membership(&self, _: &str, _: &UserId) -> Result<MembershipStatus, NotifyError> {
//! #         Ok(MembershipStatus::Member)
//! #     }
//! # }
//!
//! let engine = Engine::new(
//!     Arc::new(MemoryStore::new()),
//!     Arc::new(Bot),
//!     Settings::from_env(),
//! );
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs, clippy::all, clippy::pedantic)]

mod claim;
mod engine;
mod ledger;
mod notify;
mod purchase;
mod settings;
mod stats;
mod sweeper;

pub use engine::Engine;
pub use ledger::GrantOutcome;
pub use notify::{MembershipStatus, Messenger, NotifyError};
pub use settings::{Settings, SweepPolicy};
pub use stats::LedgerStats;
pub use sweeper::SweepReport;
