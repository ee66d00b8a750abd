//! `RocksDB` storage implementation.
//!
//! This module provides the `RocksStore` implementation of the `Store`
//! trait.
//!
//! # Concurrency
//!
//! `RocksDB` write batches are atomic but a read-modify-write sequence is
//! not, so every compound operation (idempotency admit, event application,
//! check-and-reserve, index maintenance) runs under the store's write
//! mutex. Within a single process that mutex is the equivalent of row-level
//! locking: concurrent operations on the same account serialize instead of
//! interleaving. Plain reads never take the lock.

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::Utc;
use rocksdb::{
    BoundColumnFamily, ColumnFamilyDescriptor, DBWithThreadMode, IteratorMode, MultiThreaded,
    Options, WriteBatch,
};

use relay_billing_core::{evaluate, Account, AccountId, BillingEvent, Decision, UsageRecord};

use crate::error::{Result, StoreError};
use crate::keys;
use crate::schema::{all_column_families, cf};
use crate::{Store, UsageBreakdown};

/// RocksDB-backed ledger store.
pub struct RocksStore {
    db: Arc<DBWithThreadMode<MultiThreaded>>,
    // Serializes compound read-modify-write operations. See module docs.
    write_lock: Mutex<()>,
}

impl RocksStore {
    /// Open or create a `RocksDB` database at the given path.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or created.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let cf_descriptors: Vec<_> = all_column_families()
            .into_iter()
            .map(|name| ColumnFamilyDescriptor::new(name, Options::default()))
            .collect();

        let db = DBWithThreadMode::open_cf_descriptors(&opts, path.as_ref(), cf_descriptors)
            .map_err(|e| StoreError::Database(e.to_string()))?;
        tracing::debug!(path = %path.as_ref().display(), "opened ledger store");

        Ok(Self {
            db: Arc::new(db),
            write_lock: Mutex::new(()),
        })
    }

    /// Get a column family handle.
    fn cf(&self, name: &str) -> Result<Arc<BoundColumnFamily<'_>>> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| StoreError::Database(format!("column family not found: {name}")))
    }

    /// Acquire the compound-operation lock.
    fn write_guard(&self) -> Result<MutexGuard<'_, ()>> {
        self.write_lock
            .lock()
            .map_err(|_| StoreError::Database("write lock poisoned".into()))
    }

    /// Serialize a value using CBOR.
    fn serialize<T: serde::Serialize>(value: &T) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        ciborium::into_writer(value, &mut buf)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        Ok(buf)
    }

    /// Deserialize a value from CBOR.
    fn deserialize<T: serde::de::DeserializeOwned>(data: &[u8]) -> Result<T> {
        ciborium::from_reader(data).map_err(|e| StoreError::Serialization(e.to_string()))
    }

    /// Read an account without taking the write lock.
    fn read_account(&self, account_id: &AccountId) -> Result<Option<Account>> {
        let cf = self.cf(cf::ACCOUNTS)?;
        let key = keys::account_key(account_id);

        self.db
            .get_cf(&cf, key)
            .map_err(|e| StoreError::Database(e.to_string()))?
            .map(|data| Self::deserialize(&data))
            .transpose()
    }

    /// Stage an account write plus its index maintenance into `batch`.
    ///
    /// Index entries for a changed email or customer id are removed so a
    /// stale key can never resolve to this account.
    fn stage_account(
        &self,
        batch: &mut WriteBatch,
        old: Option<&Account>,
        account: &Account,
    ) -> Result<()> {
        let cf_accounts = self.cf(cf::ACCOUNTS)?;
        let cf_email = self.cf(cf::ACCOUNTS_BY_EMAIL)?;
        let cf_customer = self.cf(cf::ACCOUNTS_BY_CUSTOMER)?;

        if let Some(old) = old {
            if let Some(old_email) = &old.email {
                if old.email != account.email {
                    batch.delete_cf(&cf_email, keys::email_key(old_email));
                }
            }
            if let Some(old_customer) = &old.external_customer_id {
                if old.external_customer_id != account.external_customer_id {
                    batch.delete_cf(&cf_customer, keys::customer_key(old_customer));
                }
            }
        }

        let key = keys::account_key(&account.account_id);
        let value = Self::serialize(account)?;
        batch.put_cf(&cf_accounts, &key, &value);

        if let Some(email) = &account.email {
            batch.put_cf(&cf_email, keys::email_key(email), &key);
        }
        if let Some(customer_id) = &account.external_customer_id {
            batch.put_cf(&cf_customer, keys::customer_key(customer_id), &key);
        }

        Ok(())
    }

    /// Resolve an account id stored as an index value.
    fn account_from_index(&self, cf_name: &str, key: Vec<u8>) -> Result<Option<Account>> {
        let cf = self.cf(cf_name)?;

        let Some(id_bytes) = self
            .db
            .get_cf(&cf, key)
            .map_err(|e| StoreError::Database(e.to_string()))?
        else {
            return Ok(None);
        };

        let mut bytes = [0u8; 16];
        if id_bytes.len() != 16 {
            return Err(StoreError::Database("corrupt index entry".into()));
        }
        bytes.copy_from_slice(&id_bytes);
        let account_id = AccountId::from_uuid(uuid_from_bytes(bytes));

        self.read_account(&account_id)
    }
}

fn uuid_from_bytes(bytes: [u8; 16]) -> uuid::Uuid {
    uuid::Uuid::from_bytes(bytes)
}

impl Store for RocksStore {
    // =========================================================================
    // Account Operations
    // =========================================================================

    fn put_account(&self, account: &Account) -> Result<()> {
        let _guard = self.write_guard()?;

        let old = self.read_account(&account.account_id)?;
        let mut batch = WriteBatch::default();
        self.stage_account(&mut batch, old.as_ref(), account)?;

        self.db
            .write(batch)
            .map_err(|e| StoreError::Database(e.to_string()))
    }

    fn get_account(&self, account_id: &AccountId) -> Result<Option<Account>> {
        self.read_account(account_id)
    }

    fn delete_account(&self, account_id: &AccountId) -> Result<()> {
        let _guard = self.write_guard()?;

        let account = self.read_account(account_id)?.ok_or(StoreError::NotFound)?;

        let cf_accounts = self.cf(cf::ACCOUNTS)?;
        let cf_email = self.cf(cf::ACCOUNTS_BY_EMAIL)?;
        let cf_customer = self.cf(cf::ACCOUNTS_BY_CUSTOMER)?;

        let mut batch = WriteBatch::default();
        batch.delete_cf(&cf_accounts, keys::account_key(account_id));
        if let Some(email) = &account.email {
            batch.delete_cf(&cf_email, keys::email_key(email));
        }
        if let Some(customer_id) = &account.external_customer_id {
            batch.delete_cf(&cf_customer, keys::customer_key(customer_id));
        }

        self.db
            .write(batch)
            .map_err(|e| StoreError::Database(e.to_string()))
    }

    fn find_account_by_email(&self, email: &str) -> Result<Option<Account>> {
        self.account_from_index(cf::ACCOUNTS_BY_EMAIL, keys::email_key(email))
    }

    fn find_account_by_customer_id(&self, customer_id: &str) -> Result<Option<Account>> {
        self.account_from_index(cf::ACCOUNTS_BY_CUSTOMER, keys::customer_key(customer_id))
    }

    // =========================================================================
    // Billing Event Operations
    // =========================================================================

    fn admit_event(&self, event: &BillingEvent) -> Result<bool> {
        let _guard = self.write_guard()?;

        let cf = self.cf(cf::BILLING_EVENTS)?;
        let key = keys::event_key(&event.external_event_id);

        let exists = self
            .db
            .get_cf(&cf, &key)
            .map_err(|e| StoreError::Database(e.to_string()))?
            .is_some();
        if exists {
            return Ok(false);
        }

        let value = Self::serialize(event)?;
        self.db
            .put_cf(&cf, key, value)
            .map_err(|e| StoreError::Database(e.to_string()))?;

        Ok(true)
    }

    fn get_event(&self, external_event_id: &str) -> Result<Option<BillingEvent>> {
        let cf = self.cf(cf::BILLING_EVENTS)?;
        let key = keys::event_key(external_event_id);

        self.db
            .get_cf(&cf, key)
            .map_err(|e| StoreError::Database(e.to_string()))?
            .map(|data| Self::deserialize(&data))
            .transpose()
    }

    fn list_unprocessed_events(&self, limit: usize) -> Result<Vec<BillingEvent>> {
        let cf = self.cf(cf::BILLING_EVENTS)?;
        let mut events = Vec::new();

        for item in self.db.iterator_cf(&cf, IteratorMode::Start) {
            let (_, value) = item.map_err(|e| StoreError::Database(e.to_string()))?;
            let event: BillingEvent = Self::deserialize(&value)?;
            if !event.processed {
                events.push(event);
                if events.len() >= limit {
                    break;
                }
            }
        }

        Ok(events)
    }

    fn mark_event_processed(&self, external_event_id: &str) -> Result<()> {
        let _guard = self.write_guard()?;

        let mut event = self
            .get_event(external_event_id)?
            .ok_or(StoreError::NotFound)?;
        event.processed = true;

        let cf = self.cf(cf::BILLING_EVENTS)?;
        self.db
            .put_cf(&cf, keys::event_key(external_event_id), Self::serialize(&event)?)
            .map_err(|e| StoreError::Database(e.to_string()))
    }

    // =========================================================================
    // Compound Operations
    // =========================================================================

    fn apply_event(
        &self,
        seed: &Account,
        external_event_id: &str,
        apply: &mut dyn FnMut(&mut Account),
    ) -> Result<Account> {
        let _guard = self.write_guard()?;

        let mut event = self
            .get_event(external_event_id)?
            .ok_or(StoreError::NotFound)?;

        // The mutation runs against the row as it is now, not against
        // whatever the caller read before entering: a reservation that
        // committed in between must survive this write.
        let old = self.read_account(&seed.account_id)?;
        let mut account = old.clone().unwrap_or_else(|| seed.clone());
        apply(&mut account);

        event.account_id = Some(account.account_id);
        event.processed = true;

        let cf_events = self.cf(cf::BILLING_EVENTS)?;
        let mut batch = WriteBatch::default();
        self.stage_account(&mut batch, old.as_ref(), &account)?;
        batch.put_cf(
            &cf_events,
            keys::event_key(external_event_id),
            Self::serialize(&event)?,
        );

        self.db
            .write(batch)
            .map_err(|e| StoreError::Database(e.to_string()))?;

        Ok(account)
    }

    fn check_and_reserve(&self, account_id: &AccountId) -> Result<Decision> {
        let _guard = self.write_guard()?;

        let mut account = self.read_account(account_id)?.ok_or(StoreError::NotFound)?;
        let decision = evaluate(&account);

        if decision.allowed {
            // The decision reports the pre-increment counter; the slot is
            // consumed here, inside the same critical section as the check.
            account.requests_used += 1;
            account.updated_at = Utc::now();

            let mut batch = WriteBatch::default();
            self.stage_account(&mut batch, None, &account)?;
            self.db
                .write(batch)
                .map_err(|e| StoreError::Database(e.to_string()))?;
        }

        Ok(decision)
    }

    fn record_usage(&self, record: &UsageRecord) -> Result<()> {
        let cf_records = self.cf(cf::USAGE_RECORDS)?;
        let cf_index = self.cf(cf::USAGE_BY_ACCOUNT)?;

        let record_key = keys::usage_record_key(&record.id);
        let index_key = keys::account_usage_key(&record.account_id, &record.id);
        let value = Self::serialize(record)?;

        let mut batch = WriteBatch::default();
        batch.put_cf(&cf_records, &record_key, &value);
        batch.put_cf(&cf_index, &index_key, []); // Index entry (empty value)

        self.db
            .write(batch)
            .map_err(|e| StoreError::Database(e.to_string()))
    }

    fn usage_breakdown(&self, account_id: &AccountId) -> Result<Vec<UsageBreakdown>> {
        let account = self.read_account(account_id)?.ok_or(StoreError::NotFound)?;

        let cf_index = self.cf(cf::USAGE_BY_ACCOUNT)?;
        let cf_records = self.cf(cf::USAGE_RECORDS)?;
        let prefix = keys::account_usage_prefix(account_id);

        // (action, count, tokens), small fixed set of action types so a
        // vec scan beats a map here.
        let mut totals: Vec<UsageBreakdown> = Vec::new();

        let iter = self.db.iterator_cf(
            &cf_index,
            IteratorMode::From(&prefix, rocksdb::Direction::Forward),
        );

        for item in iter {
            let (key, _) = item.map_err(|e| StoreError::Database(e.to_string()))?;
            if !key.starts_with(&prefix) {
                break;
            }

            let record_id = keys::extract_record_id_from_account_key(&key);
            let Some(data) = self
                .db
                .get_cf(&cf_records, keys::usage_record_key(&record_id))
                .map_err(|e| StoreError::Database(e.to_string()))?
            else {
                continue;
            };
            let record: UsageRecord = Self::deserialize(&data)?;

            // Records are anchored to the period they were consumed in;
            // only the account's current window counts toward the stats.
            if let Some(period_start) = account.current_period_start {
                if record.billing_period_start != period_start {
                    continue;
                }
            }

            let action = record.action_type.as_str().to_string();
            match totals.iter_mut().find(|t| t.action_type == action) {
                Some(entry) => {
                    entry.count += 1;
                    entry.tokens += record.tokens_used;
                }
                None => totals.push(UsageBreakdown {
                    action_type: action,
                    count: 1,
                    tokens: record.tokens_used,
                }),
            }
        }

        Ok(totals)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use relay_billing_core::{ActionType, DenyReason, PlanConfig, SubscriptionStatus};
    use tempfile::TempDir;

    fn create_test_store() -> (RocksStore, TempDir) {
        let dir = TempDir::new().unwrap();
        let store = RocksStore::open(dir.path()).unwrap();
        (store, dir)
    }

    fn test_account() -> Account {
        Account::new(AccountId::generate(), &PlanConfig::default())
    }

    fn test_event(event_id: &str) -> BillingEvent {
        BillingEvent::from_payload(serde_json::json!({
            "meta": { "event_name": "subscription_created", "event_id": event_id },
            "data": { "id": "sub_1", "attributes": { "status": "active" } }
        }))
        .unwrap()
    }

    #[test]
    fn account_crud_and_index_lookups() {
        let (store, _dir) = create_test_store();
        let mut account = test_account();
        account.email = Some("alice@example.com".into());
        account.external_customer_id = Some("cust_42".into());

        store.put_account(&account).unwrap();

        let by_id = store.get_account(&account.account_id).unwrap().unwrap();
        assert_eq!(by_id.requests_used, 0);

        let by_email = store
            .find_account_by_email("ALICE@example.com")
            .unwrap()
            .unwrap();
        assert_eq!(by_email.account_id, account.account_id);

        let by_customer = store
            .find_account_by_customer_id("cust_42")
            .unwrap()
            .unwrap();
        assert_eq!(by_customer.account_id, account.account_id);

        store.delete_account(&account.account_id).unwrap();
        assert!(store.get_account(&account.account_id).unwrap().is_none());
        assert!(store
            .find_account_by_email("alice@example.com")
            .unwrap()
            .is_none());
        assert!(store.find_account_by_customer_id("cust_42").unwrap().is_none());
    }

    #[test]
    fn changing_email_removes_stale_index_entry() {
        let (store, _dir) = create_test_store();
        let mut account = test_account();
        account.email = Some("old@example.com".into());
        store.put_account(&account).unwrap();

        account.email = Some("new@example.com".into());
        store.put_account(&account).unwrap();

        assert!(store
            .find_account_by_email("old@example.com")
            .unwrap()
            .is_none());
        assert!(store
            .find_account_by_email("new@example.com")
            .unwrap()
            .is_some());
    }

    #[test]
    fn admit_event_first_time_then_duplicate() {
        let (store, _dir) = create_test_store();
        let event = test_event("evt_dup");

        assert!(store.admit_event(&event).unwrap());
        assert!(!store.admit_event(&event).unwrap());

        let stored = store.get_event("evt_dup").unwrap().unwrap();
        assert!(!stored.processed);
    }

    #[test]
    fn concurrent_admits_admit_exactly_one() {
        let (store, _dir) = create_test_store();
        let store = Arc::new(store);

        let handles: Vec<_> = (0..10)
            .map(|_| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || store.admit_event(&test_event("evt_race")).unwrap())
            })
            .collect();

        let first_times = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|first| *first)
            .count();

        assert_eq!(first_times, 1);
    }

    #[test]
    fn apply_event_writes_account_and_flips_processed() {
        let (store, _dir) = create_test_store();
        let account = test_account();
        store.put_account(&account).unwrap();

        let event = test_event("evt_apply");
        assert!(store.admit_event(&event).unwrap());

        store
            .apply_event(&account, "evt_apply", &mut |a| {
                a.monthly_quota = 2000;
            })
            .unwrap();

        let stored_event = store.get_event("evt_apply").unwrap().unwrap();
        assert!(stored_event.processed);
        assert_eq!(stored_event.account_id, Some(account.account_id));

        let stored_account = store.get_account(&account.account_id).unwrap().unwrap();
        assert_eq!(stored_account.monthly_quota, 2000);
    }

    #[test]
    fn apply_event_requires_admitted_event() {
        let (store, _dir) = create_test_store();
        let account = test_account();
        let result = store.apply_event(&account, "evt_never_admitted", &mut |_| {});
        assert!(matches!(result, Err(StoreError::NotFound)));
    }

    #[test]
    fn apply_event_keeps_reservations_committed_after_the_callers_read() {
        let (store, _dir) = create_test_store();
        let mut account = test_account();
        account.requests_used = 10;
        store.put_account(&account).unwrap();
        store.admit_event(&test_event("evt_status")).unwrap();

        // The caller reads its snapshot, then a reservation lands.
        let snapshot = store.get_account(&account.account_id).unwrap().unwrap();
        store.check_and_reserve(&account.account_id).unwrap();

        // A status-only mutation passed through the stale snapshot must
        // not roll the counter back.
        store
            .apply_event(&snapshot, "evt_status", &mut |a| {
                a.subscription_status = SubscriptionStatus::PastDue;
            })
            .unwrap();

        let stored = store.get_account(&account.account_id).unwrap().unwrap();
        assert_eq!(stored.subscription_status, SubscriptionStatus::PastDue);
        assert_eq!(stored.requests_used, 11);
    }

    #[test]
    fn apply_event_seeds_a_missing_row() {
        let (store, _dir) = create_test_store();
        let account = test_account();
        store.admit_event(&test_event("evt_seed")).unwrap();

        let committed = store
            .apply_event(&account, "evt_seed", &mut |a| {
                a.monthly_quota = 2000;
            })
            .unwrap();
        assert_eq!(committed.monthly_quota, 2000);

        let stored = store.get_account(&account.account_id).unwrap().unwrap();
        assert_eq!(stored.monthly_quota, 2000);
    }

    #[test]
    fn unprocessed_events_listing() {
        let (store, _dir) = create_test_store();
        let account = test_account();
        store.put_account(&account).unwrap();

        store.admit_event(&test_event("evt_a")).unwrap();
        store.admit_event(&test_event("evt_b")).unwrap();
        store.apply_event(&account, "evt_a", &mut |_| {}).unwrap();

        let unprocessed = store.list_unprocessed_events(10).unwrap();
        assert_eq!(unprocessed.len(), 1);
        assert_eq!(unprocessed[0].external_event_id, "evt_b");

        store.mark_event_processed("evt_b").unwrap();
        assert!(store.list_unprocessed_events(10).unwrap().is_empty());
    }

    #[test]
    fn reserve_consumes_slots_up_to_quota() {
        let (store, _dir) = create_test_store();
        let mut account = test_account();
        account.monthly_quota = 50;
        account.requests_used = 49;
        account.overage_enabled = false;
        store.put_account(&account).unwrap();

        // The 50th request is still inside quota.
        let decision = store.check_and_reserve(&account.account_id).unwrap();
        assert!(decision.allowed);
        assert!(!decision.is_overage);
        assert_eq!(decision.used, 49);

        // The 51st is not, and overage is off.
        let decision = store.check_and_reserve(&account.account_id).unwrap();
        assert!(!decision.allowed);
        assert_eq!(decision.reason, Some(DenyReason::QuotaExhaustedOverageOff));

        // Denied reservations must not advance the counter.
        let stored = store.get_account(&account.account_id).unwrap().unwrap();
        assert_eq!(stored.requests_used, 50);
    }

    #[test]
    fn reserve_beyond_quota_with_overage_enabled() {
        let (store, _dir) = create_test_store();
        let mut account = test_account();
        account.monthly_quota = 50;
        account.requests_used = 50;
        account.overage_enabled = true;
        account.auto_stop_at_limit = false;
        store.put_account(&account).unwrap();

        let decision = store.check_and_reserve(&account.account_id).unwrap();
        assert!(decision.allowed);
        assert!(decision.is_overage);

        let stored = store.get_account(&account.account_id).unwrap().unwrap();
        assert_eq!(stored.requests_used, 51);
    }

    #[test]
    fn concurrent_reservations_never_overshoot_quota() {
        let (store, _dir) = create_test_store();
        let mut account = test_account();
        account.monthly_quota = 5;
        account.overage_enabled = false;
        account.auto_stop_at_limit = true;
        store.put_account(&account).unwrap();

        let store = Arc::new(store);
        let account_id = account.account_id;

        let handles: Vec<_> = (0..10)
            .map(|_| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || store.check_and_reserve(&account_id).unwrap())
            })
            .collect();

        let decisions: Vec<Decision> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        let allowed = decisions.iter().filter(|d| d.allowed).count();
        let denied = decisions.iter().filter(|d| !d.allowed).count();

        assert_eq!(allowed, 5);
        assert_eq!(denied, 5);

        let stored = store.get_account(&account_id).unwrap().unwrap();
        assert_eq!(stored.requests_used, 5);
    }

    #[test]
    fn usage_breakdown_aggregates_by_action() {
        let (store, _dir) = create_test_store();
        let account = test_account();
        store.put_account(&account).unwrap();

        for (action, tokens) in [
            (ActionType::Chat, 100),
            (ActionType::Chat, 250),
            (ActionType::Summarize, 40),
        ] {
            let record = UsageRecord::new(&account, action, tokens, false);
            store.record_usage(&record).unwrap();
        }

        let breakdown = store.usage_breakdown(&account.account_id).unwrap();
        let chat = breakdown.iter().find(|b| b.action_type == "chat").unwrap();
        assert_eq!(chat.count, 2);
        assert_eq!(chat.tokens, 350);
        let summarize = breakdown
            .iter()
            .find(|b| b.action_type == "summarize")
            .unwrap();
        assert_eq!(summarize.count, 1);
    }

    #[test]
    fn usage_breakdown_skips_other_periods() {
        let (store, _dir) = create_test_store();
        let mut account = test_account();
        let period_start = Utc::now();
        account.current_period_start = Some(period_start);
        account.current_period_end = Some(period_start + chrono::Duration::days(30));
        store.put_account(&account).unwrap();

        // A record from the current window and one from an older window.
        let current = UsageRecord::new(&account, ActionType::Ask, 10, false);
        store.record_usage(&current).unwrap();

        let mut stale = UsageRecord::new(&account, ActionType::Ask, 10, false);
        stale.billing_period_start = period_start - chrono::Duration::days(60);
        stale.billing_period_end = period_start - chrono::Duration::days(30);
        store.record_usage(&stale).unwrap();

        let breakdown = store.usage_breakdown(&account.account_id).unwrap();
        let ask = breakdown.iter().find(|b| b.action_type == "ask").unwrap();
        assert_eq!(ask.count, 1);
    }
}
