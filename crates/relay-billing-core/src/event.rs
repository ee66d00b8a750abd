//! Inbound billing events from the payment provider.
//!
//! The provider delivers webhook payloads shaped as
//! `{ "meta": { "event_name", "event_id" | "webhook_id", "custom_data" },
//!    "data": { "id", "attributes": { ... } } }`.
//! The raw body is retained verbatim on the stored event for audit and
//! replay; the typed views here are extracted at ingestion time.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{AccountId, BillingError};

/// The closed set of billing event types the state machine understands.
///
/// Normalized from the provider vocabulary (`subscription_created`,
/// `subscription_payment_success`, ...). Names outside the set are recorded
/// and acknowledged but apply no ledger mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    /// A new subscription was created.
    Created,
    /// Subscription attributes changed (status, period boundaries).
    Updated,
    /// Subscription was cancelled.
    Cancelled,
    /// Subscription expired.
    Expired,
    /// A cancelled subscription was resumed.
    Resumed,
    /// A renewal payment succeeded. The sole automatic quota-reset trigger.
    PaymentSuccess,
    /// A renewal payment failed.
    PaymentFailed,
}

impl EventType {
    /// Parse a provider event name into the normalized set.
    ///
    /// Returns `None` for names the state machine does not act on
    /// (e.g. `subscription_paused`, `order_created`).
    #[must_use]
    pub fn parse(event_name: &str) -> Option<Self> {
        match event_name {
            "subscription_created" => Some(Self::Created),
            "subscription_updated" => Some(Self::Updated),
            "subscription_cancelled" => Some(Self::Cancelled),
            "subscription_expired" => Some(Self::Expired),
            "subscription_resumed" => Some(Self::Resumed),
            "subscription_payment_success" => Some(Self::PaymentSuccess),
            "subscription_payment_failed" => Some(Self::PaymentFailed),
            _ => None,
        }
    }

    /// String form used in logs and stored events.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Updated => "updated",
            Self::Cancelled => "cancelled",
            Self::Expired => "expired",
            Self::Resumed => "resumed",
            Self::PaymentSuccess => "payment_success",
            Self::PaymentFailed => "payment_failed",
        }
    }
}

/// A durably stored billing event.
///
/// Created on receipt, always, even when downstream processing fails, so
/// a processing bug is recoverable by replay. `processed` flips to true
/// exactly once, in the same atomic write as the ledger mutation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BillingEvent {
    /// Provider-assigned unique event identifier; the deduplication key.
    pub external_event_id: String,

    /// Raw provider event name (retained even when outside the closed set).
    pub event_name: String,

    /// Normalized event type, if the name is one the state machine acts on.
    pub event_type: Option<EventType>,

    /// Resolved internal account, once resolution has succeeded.
    pub account_id: Option<AccountId>,

    /// Subscription id in the provider's namespace.
    pub external_subscription_id: Option<String>,

    /// Full original event body, verbatim, for audit and replay.
    pub payload: serde_json::Value,

    /// True only after the state machine's mutation and the ledger write
    /// both committed.
    pub processed: bool,

    /// When the event was received.
    pub received_at: DateTime<Utc>,
}

impl BillingEvent {
    /// Build a stored event from a verified webhook payload.
    ///
    /// # Errors
    ///
    /// Returns `BillingError::MalformedEvent` when the payload carries no
    /// event identifier (neither `meta.event_id` nor `meta.webhook_id`) or
    /// no `meta.event_name`.
    pub fn from_payload(payload: serde_json::Value) -> Result<Self, BillingError> {
        let meta = payload.get("meta");

        // The provider sends `webhook_id` on some event families instead of
        // `event_id`; either works as the dedup key.
        let external_event_id = meta
            .and_then(|m| m.get("event_id").or_else(|| m.get("webhook_id")))
            .and_then(|v| v.as_str())
            .map(str::to_owned)
            .ok_or_else(|| {
                BillingError::MalformedEvent("missing meta.event_id / meta.webhook_id".into())
            })?;

        let event_name = meta
            .and_then(|m| m.get("event_name"))
            .and_then(|v| v.as_str())
            .map(str::to_owned)
            .ok_or_else(|| BillingError::MalformedEvent("missing meta.event_name".into()))?;

        let external_subscription_id = payload
            .get("data")
            .and_then(|d| d.get("id"))
            .and_then(|v| v.as_str())
            .map(str::to_owned);

        Ok(Self {
            external_event_id,
            event_type: EventType::parse(&event_name),
            event_name,
            account_id: None,
            external_subscription_id,
            payload,
            processed: false,
            received_at: Utc::now(),
        })
    }

    /// Typed view of `data.attributes` on the stored payload.
    #[must_use]
    pub fn attributes(&self) -> EventAttributes {
        EventAttributes::from_payload(&self.payload)
    }
}

/// The provider-specific billing fields carried in `data.attributes`.
///
/// All fields are optional: event families differ in which attributes they
/// carry, and the state machine treats missing timestamps as "leave the
/// stored value alone".
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EventAttributes {
    /// Subscription id (payment events reference their parent subscription).
    pub subscription_id: Option<String>,

    /// Customer id in the provider's namespace.
    pub customer_id: Option<String>,

    /// Provider status string (`active`, `cancelled`, `expired`,
    /// `past_due`, `paused`).
    pub status: Option<String>,

    /// Customer email (`user_email` or `customer_email`).
    pub email: Option<String>,

    /// When the subscription was created.
    pub created_at: Option<DateTime<Utc>>,

    /// Next renewal timestamp; anchors the current billing period.
    pub renews_at: Option<DateTime<Utc>>,

    /// When the subscription ends.
    pub ends_at: Option<DateTime<Utc>>,
}

impl EventAttributes {
    /// Extract attributes from a full webhook payload.
    #[must_use]
    pub fn from_payload(payload: &serde_json::Value) -> Self {
        let attrs = payload.get("data").and_then(|d| d.get("attributes"));
        let Some(attrs) = attrs else {
            return Self::default();
        };

        // Customer/subscription ids arrive as either strings or numbers
        // depending on the event family.
        let id_string = |v: &serde_json::Value| -> Option<String> {
            v.as_str()
                .map(str::to_owned)
                .or_else(|| v.as_i64().map(|n| n.to_string()))
        };

        Self {
            subscription_id: attrs.get("subscription_id").and_then(id_string),
            customer_id: attrs.get("customer_id").and_then(id_string),
            status: attrs
                .get("status")
                .and_then(|v| v.as_str())
                .map(str::to_owned),
            email: attrs
                .get("user_email")
                .or_else(|| attrs.get("customer_email"))
                .and_then(|v| v.as_str())
                .map(str::to_owned),
            created_at: attrs.get("created_at").and_then(parse_timestamp),
            renews_at: attrs.get("renews_at").and_then(parse_timestamp),
            ends_at: attrs.get("ends_at").and_then(parse_timestamp),
        }
    }
}

/// Parse a provider timestamp (`YYYY-MM-DDTHH:MM:SS.ffffffZ`).
///
/// Unparseable or null values become `None`; the original silently skipped
/// bad timestamps and the state machine does the same.
fn parse_timestamp(value: &serde_json::Value) -> Option<DateTime<Utc>> {
    let s = value.as_str()?;
    DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_payload() -> serde_json::Value {
        json!({
            "meta": {
                "event_name": "subscription_created",
                "event_id": "evt_001",
                "custom_data": { "user_id": "8c7f7a6e-1111-2222-3333-444455556666" }
            },
            "data": {
                "id": "sub_42",
                "attributes": {
                    "subscription_id": "sub_42",
                    "customer_id": 9876,
                    "status": "active",
                    "user_email": "alice@example.com",
                    "created_at": "2024-01-01T00:00:00.000000Z",
                    "renews_at": "2024-02-01T00:00:00.000000Z",
                    "ends_at": null
                }
            }
        })
    }

    #[test]
    fn parses_known_event_names() {
        assert_eq!(
            EventType::parse("subscription_created"),
            Some(EventType::Created)
        );
        assert_eq!(
            EventType::parse("subscription_payment_success"),
            Some(EventType::PaymentSuccess)
        );
        assert_eq!(EventType::parse("subscription_paused"), None);
        assert_eq!(EventType::parse("order_created"), None);
    }

    #[test]
    fn builds_event_from_payload() {
        let event = BillingEvent::from_payload(sample_payload()).unwrap();
        assert_eq!(event.external_event_id, "evt_001");
        assert_eq!(event.event_type, Some(EventType::Created));
        assert_eq!(event.external_subscription_id.as_deref(), Some("sub_42"));
        assert!(!event.processed);
    }

    #[test]
    fn falls_back_to_webhook_id() {
        let payload = json!({
            "meta": { "event_name": "subscription_updated", "webhook_id": "wh_77" },
            "data": { "id": "sub_1", "attributes": {} }
        });
        let event = BillingEvent::from_payload(payload).unwrap();
        assert_eq!(event.external_event_id, "wh_77");
    }

    #[test]
    fn rejects_payload_without_event_id() {
        let payload = json!({
            "meta": { "event_name": "subscription_updated" },
            "data": {}
        });
        let err = BillingEvent::from_payload(payload).unwrap_err();
        assert!(matches!(err, BillingError::MalformedEvent(_)));
    }

    #[test]
    fn extracts_attributes() {
        let event = BillingEvent::from_payload(sample_payload()).unwrap();
        let attrs = event.attributes();
        assert_eq!(attrs.customer_id.as_deref(), Some("9876"));
        assert_eq!(attrs.email.as_deref(), Some("alice@example.com"));
        assert_eq!(attrs.status.as_deref(), Some("active"));
        assert!(attrs.renews_at.is_some());
        assert!(attrs.ends_at.is_none());
    }

    #[test]
    fn bad_timestamps_become_none() {
        let payload = json!({
            "meta": { "event_name": "subscription_updated", "event_id": "evt_ts" },
            "data": { "id": "sub_1", "attributes": { "renews_at": "not-a-date" } }
        });
        let event = BillingEvent::from_payload(payload).unwrap();
        assert!(event.attributes().renews_at.is_none());
    }
}
