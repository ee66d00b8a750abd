//! Account resolution for inbound billing events.
//!
//! Webhook payloads do not carry our account id directly; at checkout time
//! it is planted in the provider's `custom_data`, and older subscriptions
//! may only be correlatable by email or by the provider's customer id.
//! Resolution is an ordered list of pure extraction strategies, tried in
//! sequence against the raw payload:
//!
//! 1. `data.attributes.custom_data.user_id`
//! 2. `meta.custom_data.user_id`
//! 3. lookup by customer email
//! 4. lookup by provider customer id

use std::str::FromStr;

use relay_billing_core::{Account, AccountId, EventAttributes};
use relay_billing_store::{Result, Store};

/// A resolution candidate extracted from the payload by one strategy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Candidate {
    /// An explicit account id planted in the payload's custom data.
    /// Authoritative: no further strategies run once one is found.
    DirectId(AccountId),
    /// Customer email, resolved through the store's email index.
    Email(String),
    /// Provider customer id, resolved through the customer index.
    CustomerId(String),
}

/// The outcome of running the strategy list against a payload.
#[derive(Debug, Clone)]
pub enum Resolution {
    /// A stored account matched.
    Existing(Account),
    /// The payload named an account id we have no row for yet. The caller
    /// decides whether that warrants creating one (subscription creation
    /// can legitimately arrive before the account row).
    KnownId(AccountId),
    /// Every strategy came up empty.
    Unresolved,
}

type Strategy = fn(&serde_json::Value) -> Option<Candidate>;

/// The strategy list, in priority order.
const STRATEGIES: &[Strategy] = &[
    attributes_custom_user_id,
    meta_custom_user_id,
    customer_email,
    provider_customer_id,
];

/// Extract resolution candidates from a payload, in priority order.
///
/// Strategies that find nothing in this payload are skipped; an invalid
/// account id in custom data is treated as absent rather than fatal.
#[must_use]
pub fn candidates(payload: &serde_json::Value) -> Vec<Candidate> {
    STRATEGIES.iter().filter_map(|s| s(payload)).collect()
}

/// Run the strategy list against the store.
///
/// A `DirectId` candidate is terminal whether or not the account row
/// exists; email and customer-id candidates only match existing rows.
///
/// # Errors
///
/// Returns an error if a store lookup fails.
pub fn resolve(store: &dyn Store, payload: &serde_json::Value) -> Result<Resolution> {
    for candidate in candidates(payload) {
        match candidate {
            Candidate::DirectId(account_id) => {
                return Ok(match store.get_account(&account_id)? {
                    Some(account) => Resolution::Existing(account),
                    None => Resolution::KnownId(account_id),
                });
            }
            Candidate::Email(email) => {
                if let Some(account) = store.find_account_by_email(&email)? {
                    return Ok(Resolution::Existing(account));
                }
            }
            Candidate::CustomerId(customer_id) => {
                if let Some(account) = store.find_account_by_customer_id(&customer_id)? {
                    return Ok(Resolution::Existing(account));
                }
            }
        }
    }

    Ok(Resolution::Unresolved)
}

fn attributes_custom_user_id(payload: &serde_json::Value) -> Option<Candidate> {
    let user_id = payload
        .get("data")?
        .get("attributes")?
        .get("custom_data")?
        .get("user_id")?
        .as_str()?;

    parse_direct_id(user_id)
}

fn meta_custom_user_id(payload: &serde_json::Value) -> Option<Candidate> {
    let user_id = payload
        .get("meta")?
        .get("custom_data")?
        .get("user_id")?
        .as_str()?;

    parse_direct_id(user_id)
}

fn customer_email(payload: &serde_json::Value) -> Option<Candidate> {
    EventAttributes::from_payload(payload).email.map(Candidate::Email)
}

fn provider_customer_id(payload: &serde_json::Value) -> Option<Candidate> {
    EventAttributes::from_payload(payload)
        .customer_id
        .map(Candidate::CustomerId)
}

fn parse_direct_id(user_id: &str) -> Option<Candidate> {
    match AccountId::from_str(user_id) {
        Ok(id) => Some(Candidate::DirectId(id)),
        Err(_) => {
            tracing::debug!(user_id = %user_id, "custom_data user_id is not a valid account id");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use relay_billing_core::PlanConfig;
    use relay_billing_store::RocksStore;
    use serde_json::json;
    use tempfile::TempDir;

    fn open_store() -> (RocksStore, TempDir) {
        let dir = TempDir::new().unwrap();
        let store = RocksStore::open(dir.path()).unwrap();
        (store, dir)
    }

    #[test]
    fn custom_data_beats_email_and_customer_id() {
        let id = AccountId::generate();
        let payload = json!({
            "meta": { "custom_data": { "user_id": id.to_string() } },
            "data": { "attributes": {
                "user_email": "alice@example.com",
                "customer_id": "cust_1"
            }}
        });

        let found = candidates(&payload);
        assert_eq!(found[0], Candidate::DirectId(id));
        assert_eq!(found[1], Candidate::Email("alice@example.com".into()));
        assert_eq!(found[2], Candidate::CustomerId("cust_1".into()));
    }

    #[test]
    fn attributes_custom_data_beats_meta_custom_data() {
        let attrs_id = AccountId::generate();
        let meta_id = AccountId::generate();
        let payload = json!({
            "meta": { "custom_data": { "user_id": meta_id.to_string() } },
            "data": { "attributes": {
                "custom_data": { "user_id": attrs_id.to_string() }
            }}
        });

        let found = candidates(&payload);
        assert_eq!(found[0], Candidate::DirectId(attrs_id));
    }

    #[test]
    fn garbage_user_id_is_skipped_not_fatal() {
        let payload = json!({
            "meta": { "custom_data": { "user_id": "not-a-uuid" } },
            "data": { "attributes": { "user_email": "bob@example.com" } }
        });

        let found = candidates(&payload);
        assert_eq!(found, vec![Candidate::Email("bob@example.com".into())]);
    }

    #[test]
    fn resolves_existing_account_by_email() {
        let (store, _dir) = open_store();
        let mut account = Account::new(AccountId::generate(), &PlanConfig::default());
        account.email = Some("carol@example.com".into());
        store.put_account(&account).unwrap();

        let payload = json!({
            "data": { "attributes": { "user_email": "carol@example.com" } }
        });

        match resolve(&store, &payload).unwrap() {
            Resolution::Existing(found) => assert_eq!(found.account_id, account.account_id),
            other => panic!("expected Existing, got {other:?}"),
        }
    }

    #[test]
    fn direct_id_without_row_is_known_id() {
        let (store, _dir) = open_store();
        let id = AccountId::generate();
        let payload = json!({
            "meta": { "custom_data": { "user_id": id.to_string() } }
        });

        match resolve(&store, &payload).unwrap() {
            Resolution::KnownId(found) => assert_eq!(found, id),
            other => panic!("expected KnownId, got {other:?}"),
        }
    }

    #[test]
    fn empty_payload_is_unresolved() {
        let (store, _dir) = open_store();
        let payload = json!({ "meta": {}, "data": {} });
        assert!(matches!(
            resolve(&store, &payload).unwrap(),
            Resolution::Unresolved
        ));
    }
}
