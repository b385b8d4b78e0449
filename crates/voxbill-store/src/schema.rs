//! Database schema definitions and column families.

/// Column family names for the `RocksDB` database.
pub mod cf {
    /// Primary user-account records, keyed by external identity.
    pub const USERS: &str = "users";

    /// Plan records, keyed by plan UUID.
    pub const PLANS: &str = "plans";

    /// Payment requests, keyed by `payment_id` (ULID).
    pub const PAYMENTS: &str = "payments";

    /// Index: payments by user, keyed by `user_id || 0x00 || payment_id`.
    /// Value is empty (index only).
    pub const PAYMENTS_BY_USER: &str = "payments_by_user";
}

/// Returns all column family names for database initialization.
#[must_use]
pub fn all_column_families() -> Vec<&'static str> {
    vec![cf::USERS, cf::PLANS, cf::PAYMENTS, cf::PAYMENTS_BY_USER]
}
