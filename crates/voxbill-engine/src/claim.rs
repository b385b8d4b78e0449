//! The one-time free credit for community-channel members.

use voxbill_core::{LedgerError, Result, UserId};
use voxbill_store::Store;

use crate::engine::Engine;
use crate::notify::Messenger;

impl<S: Store, M: Messenger> Engine<S, M> {
    /// Claim the one-time free credit, returning the balance after the
    /// grant.
    ///
    /// The membership check happens outside the account lock (it is a
    /// network call), so the claimed flag is re-checked inside the lock.
    /// Two racing claims both pass the membership check at most; only
    /// one flips the flag and grants.
    ///
    /// # Errors
    ///
    /// - `AlreadyClaimed` if the free credit was claimed before.
    /// - `NotMember` if the user is not in the community channel.
    /// - `ExternalUnavailable` if the membership check itself fails.
    /// - `NotFound` for an unknown account.
    pub async fn claim_free_credit(&self, user_id: &UserId) -> Result<i64> {
        // Fast path before the network round trip.
        if self.get_user(user_id)?.free_credit_claimed {
            return Err(LedgerError::AlreadyClaimed);
        }

        let status = self
            .messenger
            .check_membership(&self.settings.free_credit_channel, user_id)
            .await
            .map_err(|err| LedgerError::ExternalUnavailable {
                service: "membership-check",
                message: err.to_string(),
            })?;
        if !status.is_member() {
            return Err(LedgerError::NotMember);
        }

        let amount = self.settings.free_credit_amount;
        let credits = self
            .store
            .with_user::<_, LedgerError, _>(user_id, |account| {
                if account.free_credit_claimed {
                    return Err(LedgerError::AlreadyClaimed);
                }
                account.grant(amount, 0, chrono::Utc::now())?;
                account.free_credit_claimed = true;
                Ok(account.credits)
            })?;
        tracing::info!(user_id = %user_id, amount, credits, "free credit claimed");
        Ok(credits)
    }
}
