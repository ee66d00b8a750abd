//! Operator surface for stored billing events.

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};

use relay_billing_core::BillingEvent;
use relay_billing_store::Store;

use crate::auth::ServiceAuth;
use crate::error::ApiError;
use crate::state::AppState;

/// Default page size for the unprocessed-events listing.
const DEFAULT_LIMIT: usize = 100;

/// Listing query parameters.
#[derive(Debug, Deserialize)]
pub struct ListQuery {
    /// Maximum number of events to return.
    pub limit: Option<usize>,
}

/// One unprocessed event, summarized.
#[derive(Debug, Serialize)]
pub struct EventSummary {
    /// Provider-assigned event id.
    pub external_event_id: String,
    /// Raw provider event name.
    pub event_name: String,
    /// Subscription id in the provider's namespace, if any.
    pub external_subscription_id: Option<String>,
    /// When the event was received.
    pub received_at: String,
}

impl From<BillingEvent> for EventSummary {
    fn from(event: BillingEvent) -> Self {
        Self {
            external_event_id: event.external_event_id,
            event_name: event.event_name,
            external_subscription_id: event.external_subscription_id,
            received_at: event.received_at.to_rfc3339(),
        }
    }
}

/// Listing response.
#[derive(Debug, Serialize)]
pub struct ListEventsResponse {
    /// The unprocessed events.
    pub events: Vec<EventSummary>,
}

/// List events that were received but never applied.
///
/// These are resolution failures waiting for an operator: once the missing
/// account exists (or the payload is understood), the event can be
/// re-delivered by the provider or replayed by hand.
pub async fn list_unprocessed(
    State(state): State<Arc<AppState>>,
    _auth: ServiceAuth,
    Query(query): Query<ListQuery>,
) -> Result<Json<ListEventsResponse>, ApiError> {
    let limit = query.limit.unwrap_or(DEFAULT_LIMIT);
    let events = state.store.list_unprocessed_events(limit)?;

    Ok(Json(ListEventsResponse {
        events: events.into_iter().map(EventSummary::from).collect(),
    }))
}
