//! The subscription state machine.
//!
//! `transition` interprets one billing event and computes the ledger
//! mutation: status transition, quota reset, period boundaries. Mutations
//! are absolute assignments derived from the event's content, never deltas,
//! so re-applying the same event reaches the same target state. The
//! idempotency guard handles duplicate delivery; this property handles a
//! crash between the ledger commit and the processed-flag commit.
//!
//! Events for one account are not guaranteed to arrive in emission order.
//! The `renews_at` timestamp carried in the payload is the total order key
//! for period boundaries: an `updated` event older than the stored period
//! start still applies its status, but never rolls the billing window
//! backwards.

use chrono::Utc;

use crate::{Account, EventAttributes, EventType, PlanConfig, SubscriptionStatus};

/// Apply one billing event to an account.
///
/// Returns `true` when the event mutated the account (always, currently,
/// but callers should not rely on unconditional mutation for future event
/// types).
pub fn transition(
    account: &mut Account,
    event_type: EventType,
    attrs: &EventAttributes,
    plans: &PlanConfig,
) -> bool {
    let now = Utc::now();

    match event_type {
        EventType::Created => {
            account.subscription_status = SubscriptionStatus::Pro;
            account.monthly_quota = plans.pro_included_requests;
            account.requests_used = 0;
            account.subscription_start_date = attrs.created_at;
            account.current_period_start = attrs.renews_at;
            account.current_period_end = attrs.ends_at;
            account.subscription_end_date = None;
            if attrs.subscription_id.is_some() {
                account.external_subscription_id = attrs.subscription_id.clone();
            }
            if attrs.customer_id.is_some() {
                account.external_customer_id = attrs.customer_id.clone();
            }
            account.last_quota_reset = Some(now);
        }

        EventType::Updated => {
            account.subscription_status = map_provider_status(attrs.status.as_deref());
            // Quota and usage stay untouched on updates; only the window
            // moves, and only forwards.
            if period_is_newer(account, attrs) {
                account.current_period_start = attrs.renews_at;
                account.current_period_end = attrs.ends_at;
            }
        }

        EventType::Cancelled | EventType::Expired => {
            account.subscription_status = SubscriptionStatus::Cancelled;
            account.subscription_end_date = attrs.ends_at;
        }

        EventType::Resumed => {
            account.subscription_status = SubscriptionStatus::Pro;
            account.subscription_end_date = None;
        }

        EventType::PaymentSuccess => {
            account.requests_used = 0;
            account.last_quota_reset = Some(now);
            if period_is_newer(account, attrs) {
                account.current_period_start = attrs.renews_at;
                account.current_period_end = attrs.ends_at;
            }
        }

        EventType::PaymentFailed => {
            account.subscription_status = SubscriptionStatus::PastDue;
        }
    }

    account.updated_at = now;
    true
}

/// Map the provider's subscription status string to a ledger status.
fn map_provider_status(status: Option<&str>) -> SubscriptionStatus {
    match status {
        Some("active") => SubscriptionStatus::Pro,
        Some("cancelled" | "paused") => SubscriptionStatus::Cancelled,
        Some("past_due") => SubscriptionStatus::PastDue,
        // "expired", unknown strings, and missing status all fall back to
        // free, matching the original mapping.
        _ => SubscriptionStatus::Free,
    }
}

/// Whether the event carries a period boundary at least as new as the
/// stored one. Events without a `renews_at` never move the window.
fn period_is_newer(account: &Account, attrs: &EventAttributes) -> bool {
    match (attrs.renews_at, account.current_period_start) {
        (Some(incoming), Some(stored)) => incoming >= stored,
        (Some(_), None) => true,
        (None, _) => false,
    }
}
