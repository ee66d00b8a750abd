//! `RocksDB` storage layer for relay-billing.
//!
//! This crate is the Account Ledger Store: the single shared mutable
//! resource all request handlers coordinate through. It persists accounts,
//! billing events, and usage records using `RocksDB` column families, and
//! exposes the compound atomic operations the billing engine is built on:
//!
//! - `admit_event`: the idempotency guard (insert-if-absent on the
//!   provider event id)
//! - `apply_event`: ledger mutation + processed flag in one write batch
//! - `check_and_reserve`: admission check and counter increment in one
//!   critical section
//! - `record_usage`: append-only usage audit trail
//!
//! # Column families
//!
//! - `accounts`: account rows, keyed by `account_id`
//! - `accounts_by_email` / `accounts_by_customer`: resolution indexes
//! - `billing_events`: inbound events, keyed by `external_event_id`
//! - `usage_records`: usage audit rows, keyed by record ULID
//! - `usage_by_account`: index, keyed by `account_id || ulid` (empty value)

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod error;
pub mod keys;
pub mod rocks;
pub mod schema;

pub use error::{Result, StoreError};
pub use rocks::RocksStore;

use relay_billing_core::{Account, AccountId, BillingEvent, Decision, UsageRecord};

/// Per-action usage totals for one billing period.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UsageBreakdown {
    /// Action type name.
    pub action_type: String,
    /// Number of actions of this type.
    pub count: i64,
    /// Total tokens consumed by this type.
    pub tokens: i64,
}

/// The storage trait defining all ledger operations.
///
/// This trait abstracts the storage layer, allowing for different
/// implementations (e.g. `RocksDB`, in-memory for testing). All compound
/// operations are atomic: two concurrent operations on the same account
/// serialize rather than interleave.
pub trait Store: Send + Sync {
    // =========================================================================
    // Account Operations
    // =========================================================================

    /// Insert or update an account record, maintaining the email and
    /// external-customer indexes.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn put_account(&self, account: &Account) -> Result<()>;

    /// Get an account by id.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn get_account(&self, account_id: &AccountId) -> Result<Option<Account>>;

    /// Delete an account by id. Historical events and usage records are
    /// kept; they back-reference the account without owning it.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::NotFound` if the account doesn't exist.
    fn delete_account(&self, account_id: &AccountId) -> Result<()>;

    /// Look up an account by email (webhook resolution fallback).
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn find_account_by_email(&self, email: &str) -> Result<Option<Account>>;

    /// Look up an account by the payment provider's customer id.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn find_account_by_customer_id(&self, customer_id: &str) -> Result<Option<Account>>;

    // =========================================================================
    // Billing Event Operations
    // =========================================================================

    /// The idempotency guard: durably record an inbound event, keyed by its
    /// provider-assigned id, unless one with the same id already exists.
    ///
    /// Returns `true` when this call was the first to store the event.
    /// Exactly one of any set of concurrent calls with the same id observes
    /// `true`; the rest observe `false` and must not reprocess.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn admit_event(&self, event: &BillingEvent) -> Result<bool>;

    /// Get a stored billing event by its provider-assigned id.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn get_event(&self, external_event_id: &str) -> Result<Option<BillingEvent>>;

    /// List events that were received but never applied (resolution
    /// failures, unknown event names). Operator replay surface.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn list_unprocessed_events(&self, limit: usize) -> Result<Vec<BillingEvent>>;

    /// Flip a stored event's `processed` flag without touching any account.
    ///
    /// Used for event names outside the state machine's vocabulary, which
    /// are acknowledged but apply no mutation.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::NotFound` if the event was never admitted.
    fn mark_event_processed(&self, external_event_id: &str) -> Result<()>;

    // =========================================================================
    // Compound Operations
    // =========================================================================

    /// Commit a state-machine mutation: run `apply` against the account
    /// row, write the result (and its indexes), and flip the event's
    /// `processed` flag, in one atomic batch.
    ///
    /// The row is re-read inside the critical section and `apply` runs
    /// against that current value, never against a snapshot the caller
    /// read earlier, so a reservation committed in between survives the
    /// write. When no row exists yet, `apply` runs against a copy of
    /// `seed`. Returns the committed row.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::NotFound` if the event was never admitted.
    fn apply_event(
        &self,
        seed: &Account,
        external_event_id: &str,
        apply: &mut dyn FnMut(&mut Account),
    ) -> Result<Account>;

    /// Atomically evaluate the admission policy and, when admission is
    /// granted, increment `requests_used` in the same critical section.
    ///
    /// The returned decision carries the pre-increment counter value. Two
    /// concurrent reservations against the same account serialize, so the
    /// quota can never be overshot by racing requests.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::NotFound` if the account doesn't exist.
    fn check_and_reserve(&self, account_id: &AccountId) -> Result<Decision>;

    /// Append a usage record and its account index entry. The usage
    /// counter was already advanced by the reservation; this is the audit
    /// trail only, and never mutates the account row.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn record_usage(&self, record: &UsageRecord) -> Result<()>;

    /// Per-action usage totals for the account's current billing period.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::NotFound` if the account doesn't exist.
    fn usage_breakdown(&self, account_id: &AccountId) -> Result<Vec<UsageBreakdown>>;
}
