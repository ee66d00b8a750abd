//! Router configuration.
//!
//! This module sets up the Axum router with all routes and middleware.

use std::sync::Arc;
use std::time::Duration;

use axum::routing::{get, post};
use axum::Router;
use tower::limit::ConcurrencyLimitLayer;
use tower_http::cors::{Any, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::handlers::{accounts, checkout, events, health, usage, webhooks};
use crate::state::AppState;

/// Maximum concurrent requests for admission/usage endpoints.
/// Every relayed chat action passes through these, so the limit is higher
/// than for the management API but still bounded.
const METERING_MAX_CONCURRENT_REQUESTS: usize = 100;

/// Maximum concurrent requests for general API endpoints.
const API_MAX_CONCURRENT_REQUESTS: usize = 50;

/// Create the service router with all routes and middleware.
///
/// # Routes
///
/// ## Public
/// - `GET /health` - Health check
///
/// ## Metering (service API key auth, own concurrency limit)
/// - `POST /v1/admission` - Check quota and reserve a slot
/// - `POST /v1/usage` - Append a usage record
///
/// ## Management (service API key auth)
/// - `POST /v1/accounts` - Register an account
/// - `GET /v1/accounts/{id}` - Fetch an account
/// - `POST /v1/accounts/{id}/limits` - Update spending limits
/// - `GET /v1/accounts/{id}/usage` - Usage statistics
/// - `POST /v1/checkout` - Create a Pro-plan checkout session
/// - `GET /v1/events/unprocessed` - Operator replay surface
///
/// ## Webhooks (signature verification, no concurrency limit)
/// - `POST /webhooks/provider` - Payment provider events
pub fn create_router(state: AppState) -> Router {
    // Extract config values before moving state
    let cors_origins = state.config.cors_origins.clone();
    let max_body_bytes = state.config.max_body_bytes;
    let request_timeout_seconds = state.config.request_timeout_seconds;

    let cors = build_cors_layer(&cors_origins);

    let state = Arc::new(state);

    // The reserve/record pair sits on the hot path of every relayed action.
    let metering_routes = Router::new()
        .route("/admission", post(usage::check_admission))
        .route("/usage", post(usage::record_usage))
        .layer(ConcurrencyLimitLayer::new(METERING_MAX_CONCURRENT_REQUESTS));

    let api_routes = Router::new()
        // Accounts
        .route("/accounts", post(accounts::create_account))
        .route("/accounts/:id", get(accounts::get_account))
        .route("/accounts/:id/limits", post(accounts::set_limits))
        .route("/accounts/:id/usage", get(usage::usage_stats))
        // Checkout
        .route("/checkout", post(checkout::create_checkout))
        // Operator
        .route("/events/unprocessed", get(events::list_unprocessed))
        .layer(ConcurrencyLimitLayer::new(API_MAX_CONCURRENT_REQUESTS))
        // Metering routes keep their own, higher limit.
        .merge(metering_routes);

    Router::new()
        // Health (public, no rate limit)
        .route("/health", get(health::health))
        // API v1 routes (rate limited)
        .nest("/v1", api_routes)
        // Webhooks (no rate limit - delivery volume is the provider's)
        .route("/webhooks/provider", post(webhooks::provider_webhook))
        // Global middleware
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(RequestBodyLimitLayer::new(max_body_bytes))
        .layer(TimeoutLayer::new(Duration::from_secs(
            request_timeout_seconds,
        )))
        .with_state(state)
}

/// Build the CORS layer from configured origins.
fn build_cors_layer(origins: &[String]) -> CorsLayer {
    if origins.iter().any(|o| o == "*") {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
    } else {
        let origins: Vec<_> = origins.iter().filter_map(|o| o.parse().ok()).collect();

        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods(Any)
            .allow_headers(Any)
    }
}
