//! The messaging collaborator.
//!
//! The engine never talks to the chat platform directly; it goes through
//! this trait for outbound notifications and channel-membership checks.
//! Notification sends are best-effort: a failure is logged and discarded,
//! never allowed to unwind or delay a committed ledger mutation.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use voxbill_core::UserId;

/// A messaging-collaborator failure.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{0}")]
pub struct NotifyError(pub String);

impl NotifyError {
    /// Create a failure from any displayable cause.
    pub fn new(cause: impl std::fmt::Display) -> Self {
        Self(cause.to_string())
    }
}

/// A user's standing in the community channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MembershipStatus {
    /// Regular channel member.
    Member,

    /// Channel administrator.
    Admin,

    /// Channel owner.
    Owner,

    /// Not (or no longer) in the channel.
    Left,
}

impl MembershipStatus {
    /// Whether this standing qualifies for the free-credit claim.
    #[must_use]
    pub const fn is_member(self) -> bool {
        !matches!(self, Self::Left)
    }
}

/// Outbound messaging and membership checks, implemented by the
/// bot-facing layer.
#[async_trait]
pub trait Messenger: Send + Sync {
    /// Send a text notification to a user.
    ///
    /// # Errors
    ///
    /// Returns an error if the platform rejects or times out the send.
    async fn notify(&self, user_id: &UserId, text: &str) -> Result<(), NotifyError>;

    /// Check a user's membership in a channel.
    ///
    /// # Errors
    ///
    /// Returns an error if the platform cannot answer (the caller maps
    /// this to `ExternalUnavailable`, distinct from a clean `Left`).
    async fn check_membership(
        &self,
        channel: &str,
        user_id: &UserId,
    ) -> Result<MembershipStatus, NotifyError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn membership_qualification() {
        assert!(MembershipStatus::Member.is_member());
        assert!(MembershipStatus::Admin.is_member());
        assert!(MembershipStatus::Owner.is_member());
        assert!(!MembershipStatus::Left.is_member());
    }
}
