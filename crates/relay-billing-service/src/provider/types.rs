//! Payment provider API types.
//!
//! The provider speaks JSON:API: every resource arrives as
//! `{ "data": { "id", "type", "attributes": { ... } } }`. Only the fields
//! the service actually consumes are modeled.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// JSON:API response envelope.
#[derive(Debug, Deserialize)]
pub(super) struct Envelope<T> {
    pub data: Resource<T>,
}

/// A single JSON:API resource.
#[derive(Debug, Deserialize)]
pub(super) struct Resource<T> {
    pub id: String,
    pub attributes: T,
}

/// Error body returned by the provider.
#[derive(Debug, Deserialize)]
pub(super) struct ProviderErrorResponse {
    #[serde(default)]
    pub errors: Vec<ProviderErrorDetail>,
}

#[derive(Debug, Deserialize)]
pub(super) struct ProviderErrorDetail {
    #[serde(default)]
    pub detail: String,
}

// ----------------------------------------------------------------------------
// Checkout
// ----------------------------------------------------------------------------

/// A checkout session created for the Pro plan upgrade.
#[derive(Debug, Clone, Serialize)]
pub struct CheckoutSession {
    /// Provider-assigned checkout id.
    pub id: String,
    /// Hosted checkout URL the user is redirected to.
    pub url: String,
}

#[derive(Debug, Deserialize)]
pub(super) struct CheckoutAttributes {
    pub url: String,
}

#[derive(Debug, Serialize)]
pub(super) struct CreateCheckoutRequest {
    pub data: CreateCheckoutData,
}

#[derive(Debug, Serialize)]
pub(super) struct CreateCheckoutData {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub attributes: CheckoutRequestAttributes,
    pub relationships: CheckoutRelationships,
}

#[derive(Debug, Serialize)]
pub(super) struct CheckoutRequestAttributes {
    pub checkout_data: CheckoutData,
    pub product_options: ProductOptions,
}

/// Data planted on the checkout so webhooks can be correlated back to the
/// originating account (`custom.user_id` resurfaces as
/// `meta.custom_data.user_id`).
#[derive(Debug, Serialize)]
pub(super) struct CheckoutData {
    pub email: String,
    pub custom: CustomData,
}

#[derive(Debug, Serialize)]
pub(super) struct CustomData {
    pub user_id: String,
}

#[derive(Debug, Serialize)]
pub(super) struct ProductOptions {
    pub redirect_url: String,
}

#[derive(Debug, Serialize)]
pub(super) struct CheckoutRelationships {
    pub store: Relationship,
    pub variant: Relationship,
}

#[derive(Debug, Serialize)]
pub(super) struct Relationship {
    pub data: RelationshipData,
}

#[derive(Debug, Serialize)]
pub(super) struct RelationshipData {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub id: String,
}

// ----------------------------------------------------------------------------
// Subscriptions
// ----------------------------------------------------------------------------

/// A subscription as the provider reports it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderSubscription {
    /// Provider-assigned subscription id.
    pub id: String,
    /// Provider status string (`active`, `cancelled`, ...).
    pub status: String,
    /// Next renewal timestamp.
    pub renews_at: Option<DateTime<Utc>>,
    /// End-of-service timestamp, set once cancelled.
    pub ends_at: Option<DateTime<Utc>>,
    /// Provider customer id.
    pub customer_id: Option<String>,
    /// Self-service URLs.
    pub urls: Option<SubscriptionUrls>,
}

/// Self-service URLs attached to a subscription.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubscriptionUrls {
    /// Customer portal for managing the subscription.
    pub customer_portal: Option<String>,
    /// Direct payment-method update URL.
    pub update_payment_method: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(super) struct SubscriptionAttributes {
    pub status: String,
    #[serde(default)]
    pub renews_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub ends_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub customer_id: Option<serde_json::Value>,
    #[serde(default)]
    pub urls: Option<SubscriptionUrls>,
}

impl SubscriptionAttributes {
    pub(super) fn into_subscription(self, id: String) -> ProviderSubscription {
        // Customer ids arrive as numbers on some event families.
        let customer_id = self.customer_id.and_then(|v| {
            v.as_str()
                .map(str::to_owned)
                .or_else(|| v.as_i64().map(|n| n.to_string()))
        });

        ProviderSubscription {
            id,
            status: self.status,
            renews_at: self.renews_at,
            ends_at: self.ends_at,
            customer_id,
            urls: self.urls,
        }
    }
}
