//! Payment provider API client.
//!
//! Outbound calls to the payment provider: checkout session creation,
//! subscription fetch/cancel. Webhook ingestion lives in
//! `handlers::webhooks`; this module is only the client side.

mod client;
mod types;

pub use client::{ProviderClient, ProviderError};
pub use types::{CheckoutSession, ProviderSubscription, SubscriptionUrls};
