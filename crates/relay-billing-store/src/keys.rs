//! Key encoding utilities for `RocksDB`.
//!
//! This module provides functions for encoding and decoding keys used in
//! column families.

use relay_billing_core::{AccountId, UsageRecordId};

/// Create an account key from an account ID.
#[must_use]
pub fn account_key(account_id: &AccountId) -> Vec<u8> {
    account_id.as_bytes().to_vec()
}

/// Create an email index key. Emails are matched case-insensitively, so the
/// key is lowercased on write and lookup.
#[must_use]
pub fn email_key(email: &str) -> Vec<u8> {
    email.trim().to_lowercase().into_bytes()
}

/// Create a provider-customer index key.
#[must_use]
pub fn customer_key(customer_id: &str) -> Vec<u8> {
    customer_id.as_bytes().to_vec()
}

/// Create a billing event key from the provider event id.
#[must_use]
pub fn event_key(external_event_id: &str) -> Vec<u8> {
    external_event_id.as_bytes().to_vec()
}

/// Create a usage record key from a record ID.
#[must_use]
pub fn usage_record_key(record_id: &UsageRecordId) -> Vec<u8> {
    record_id.to_bytes().to_vec()
}

/// Create an account-usage index key.
///
/// Format: `account_id (16 bytes) || record_id (16 bytes)`
///
/// Since ULIDs are time-ordered, usage records for an account will be
/// sorted by time.
#[must_use]
pub fn account_usage_key(account_id: &AccountId, record_id: &UsageRecordId) -> Vec<u8> {
    let mut key = Vec::with_capacity(32);
    key.extend_from_slice(account_id.as_bytes());
    key.extend_from_slice(&record_id.to_bytes());
    key
}

/// Create a prefix for iterating all usage records for an account.
#[must_use]
pub fn account_usage_prefix(account_id: &AccountId) -> Vec<u8> {
    account_id.as_bytes().to_vec()
}

/// Extract the usage record ID from an account-usage index key.
///
/// # Panics
///
/// Panics if the key is not at least 32 bytes.
#[must_use]
pub fn extract_record_id_from_account_key(key: &[u8]) -> UsageRecordId {
    let mut bytes = [0u8; 16];
    bytes.copy_from_slice(&key[16..32]);
    UsageRecordId::from_bytes(bytes).expect("valid ULID bytes")
}
