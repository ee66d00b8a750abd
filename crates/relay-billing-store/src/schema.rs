//! Database schema definitions and column families.
//!
//! This module defines the column families used in `RocksDB` storage.

/// Column family names for the `RocksDB` database.
pub mod cf {
    /// Primary account records, keyed by `account_id`.
    pub const ACCOUNTS: &str = "accounts";

    /// Index: account id by email. Value is the 16-byte account id.
    pub const ACCOUNTS_BY_EMAIL: &str = "accounts_by_email";

    /// Index: account id by the provider's customer id.
    pub const ACCOUNTS_BY_CUSTOMER: &str = "accounts_by_customer";

    /// Inbound billing events, keyed by `external_event_id`.
    pub const BILLING_EVENTS: &str = "billing_events";

    /// Usage records, keyed by record id (ULID).
    pub const USAGE_RECORDS: &str = "usage_records";

    /// Index: usage records by account, keyed by `account_id || record_id`.
    /// Value is empty (index only).
    pub const USAGE_BY_ACCOUNT: &str = "usage_by_account";
}

/// Returns all column family names for database initialization.
#[must_use]
pub fn all_column_families() -> Vec<&'static str> {
    vec![
        cf::ACCOUNTS,
        cf::ACCOUNTS_BY_EMAIL,
        cf::ACCOUNTS_BY_CUSTOMER,
        cf::BILLING_EVENTS,
        cf::USAGE_RECORDS,
        cf::USAGE_BY_ACCOUNT,
    ]
}
