//! The engine facade.

use std::sync::Arc;

use voxbill_core::{Result, UserAccount, UserId, UserProfile};
use voxbill_store::Store;

use crate::notify::Messenger;
use crate::settings::Settings;

/// The credit ledger and payment-approval engine.
///
/// `Engine` bundles the storage backend, the messaging collaborator, and
/// the settings, and exposes every operation the bot-facing and
/// admin-facing layers call. It has no network protocol of its own; it
/// is invoked in-process.
///
/// All mutating operations are serializable per account through the
/// store's keyed lock; operations on different accounts proceed fully in
/// parallel.
pub struct Engine<S, M> {
    pub(crate) store: Arc<S>,
    pub(crate) messenger: Arc<M>,
    pub(crate) settings: Settings,
}

impl<S: Store, M: Messenger> Engine<S, M> {
    /// Create an engine over a store and a messenger.
    pub fn new(store: Arc<S>, messenger: Arc<M>, settings: Settings) -> Self {
        Self {
            store,
            messenger,
            settings,
        }
    }

    /// The storage backend.
    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// The engine settings.
    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Create an account on first contact, or refresh its profile.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    pub fn register_user(&self, user_id: &UserId, profile: &UserProfile) -> Result<UserAccount> {
        Ok(self.store.upsert_user(user_id, profile)?)
    }

    /// Get an account.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for an unknown identity.
    pub fn get_user(&self, user_id: &UserId) -> Result<UserAccount> {
        self.store
            .get_user(user_id)?
            .ok_or_else(|| voxbill_core::LedgerError::NotFound {
                entity: "user",
                id: user_id.to_string(),
            })
    }

    /// Block or unblock an account. Blocked accounts cannot consume
    /// credits; grants, revokes, and the sweeper still apply.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for an unknown identity.
    pub fn set_blocked(&self, user_id: &UserId, blocked: bool) -> Result<()> {
        self.store
            .with_user::<_, voxbill_core::LedgerError, _>(user_id, |account| {
                account.is_blocked = blocked;
                Ok(())
            })?;
        tracing::info!(user_id = %user_id, blocked, "account block flag changed");
        Ok(())
    }

    /// Send a notification, logging and discarding any failure.
    ///
    /// Never lets a messaging failure surface as a ledger failure.
    pub(crate) async fn notify_best_effort(&self, user_id: &UserId, text: &str) -> bool {
        match self.messenger.notify(user_id, text).await {
            Ok(()) => true,
            Err(err) => {
                tracing::warn!(user_id = %user_id, error = %err, "notification failed");
                false
            }
        }
    }
}
