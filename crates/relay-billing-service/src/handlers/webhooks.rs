//! Webhook ingestion for the payment provider.
//!
//! The ordering here is deliberate: verify the signature over the raw
//! bytes, durably store the event (the idempotency admit), and only then
//! interpret it. Redelivery of an id that was admitted but never applied
//! (a failure between the admit and the ledger commit) reprocesses the
//! stored event. An event that cannot be resolved to an account stays in
//! the store with `processed = false` and is still acknowledged with 2xx;
//! it is visible to operators (`GET /v1/events/unprocessed`) and picked up
//! again on the next delivery of the same id.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::Json;
use serde::Serialize;

use relay_billing_core::{transition, Account, BillingEvent, EventAttributes, EventType};
use relay_billing_store::Store;

use crate::crypto::verify_signature;
use crate::error::ApiError;
use crate::resolve::{resolve, Resolution};
use crate::state::AppState;

/// Webhook acknowledgement.
#[derive(Debug, Serialize)]
pub struct WebhookResponse {
    /// Whether the delivery was received.
    pub received: bool,
    /// Set when this delivery duplicated an already-applied event.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duplicate: Option<bool>,
}

impl WebhookResponse {
    fn received() -> Json<Self> {
        Json(Self {
            received: true,
            duplicate: None,
        })
    }

    fn duplicate() -> Json<Self> {
        Json(Self {
            received: true,
            duplicate: Some(true),
        })
    }
}

/// Handle a webhook delivery from the payment provider.
pub async fn provider_webhook(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<WebhookResponse>, ApiError> {
    // Signature first, over the raw bytes, before anything is stored.
    // No configured secret means no delivery can be authenticated.
    let Some(secret) = &state.config.webhook_secret else {
        tracing::error!("WEBHOOK_SECRET not configured; rejecting delivery");
        return Err(ApiError::Unauthorized);
    };

    let signature = headers
        .get("x-signature")
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| {
            tracing::warn!("Webhook delivery without signature");
            ApiError::Unauthorized
        })?;

    if !verify_signature(secret, &body, signature) {
        tracing::warn!("Webhook signature mismatch");
        return Err(ApiError::Unauthorized);
    }

    let payload: serde_json::Value =
        serde_json::from_slice(&body).map_err(|e| ApiError::BadRequest(e.to_string()))?;

    let mut event = BillingEvent::from_payload(payload)?;

    tracing::info!(
        event_id = %event.external_event_id,
        event_name = %event.event_name,
        "Received billing webhook"
    );

    // Durably store before interpreting. A redelivery of an already
    // applied event is acknowledged without touching the ledger; a
    // redelivery of an event whose apply step failed after the admit
    // committed is the recovery path, and falls through to be
    // reprocessed (the state machine tolerates re-application).
    if !state.store.admit_event(&event)? {
        match state.store.get_event(&event.external_event_id)? {
            Some(stored) if !stored.processed => {
                tracing::info!(
                    event_id = %stored.external_event_id,
                    "Redelivery of an unprocessed event; reprocessing"
                );
                event = stored;
            }
            _ => {
                tracing::info!(event_id = %event.external_event_id, "Duplicate delivery ignored");
                return Ok(WebhookResponse::duplicate());
            }
        }
    }

    let Some(event_type) = event.event_type else {
        // Outside the state machine's vocabulary: keep the stored payload,
        // acknowledge, apply nothing.
        tracing::debug!(
            event_id = %event.external_event_id,
            event_name = %event.event_name,
            "Unhandled event name"
        );
        state.store.mark_event_processed(&event.external_event_id)?;
        return Ok(WebhookResponse::received());
    };

    let attrs = event.attributes();

    let account = match resolve(state.store.as_ref(), &event.payload)? {
        Resolution::Existing(account) => account,
        Resolution::KnownId(account_id) => {
            // The payload names an account we have no row for; the id is
            // authoritative (we planted it at checkout), so create the row.
            tracing::info!(
                account_id = %account_id,
                event_id = %event.external_event_id,
                "Creating account row for direct-id event"
            );
            Account::new(account_id, &state.config.plans)
        }
        Resolution::Unresolved => {
            tracing::error!(
                event_id = %event.external_event_id,
                event_name = %event.event_name,
                email = ?attrs.email,
                customer_id = ?attrs.customer_id,
                "Billing event could not be resolved to an account; kept unprocessed"
            );
            return Ok(WebhookResponse::received());
        }
    };

    apply_to_account(&state, &account, event_type, &attrs, &event)?;

    Ok(WebhookResponse::received())
}

/// Run the state machine against the current ledger row and commit the
/// result atomically with the event's processed flag. The resolved account
/// only seeds the row when none is stored yet; the transition itself runs
/// inside the store's critical section, so a reservation committed since
/// resolution is never overwritten.
fn apply_to_account(
    state: &AppState,
    account: &Account,
    event_type: EventType,
    attrs: &EventAttributes,
    event: &BillingEvent,
) -> Result<(), ApiError> {
    let committed = state
        .store
        .apply_event(account, &event.external_event_id, &mut |row| {
            transition(row, event_type, attrs, &state.config.plans);
        })?;

    tracing::info!(
        event_id = %event.external_event_id,
        event_type = %event_type.as_str(),
        account_id = %committed.account_id,
        status = %committed.subscription_status.as_str(),
        requests_used = %committed.requests_used,
        "Billing event applied"
    );

    Ok(())
}
