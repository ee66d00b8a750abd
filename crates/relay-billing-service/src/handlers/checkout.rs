//! Checkout session creation for the Pro plan upgrade.

use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};

use relay_billing_core::AccountId;
use relay_billing_store::Store;

use crate::auth::ServiceAuth;
use crate::error::ApiError;
use crate::state::AppState;

/// Checkout creation request.
#[derive(Debug, Deserialize)]
pub struct CreateCheckoutRequest {
    /// The account upgrading to Pro.
    pub account_id: AccountId,
    /// Email for the checkout form; falls back to the account's stored
    /// email when absent.
    pub email: Option<String>,
}

/// Checkout creation response.
#[derive(Debug, Serialize)]
pub struct CheckoutResponse {
    /// Provider-assigned checkout id.
    pub checkout_id: String,
    /// Hosted checkout URL to redirect the user to.
    pub checkout_url: String,
}

/// Create a provider checkout session for the Pro plan.
///
/// The account id is planted in the checkout's custom data, so the
/// subscription webhooks that follow resolve directly to this account.
pub async fn create_checkout(
    State(state): State<Arc<AppState>>,
    _auth: ServiceAuth,
    Json(body): Json<CreateCheckoutRequest>,
) -> Result<Json<CheckoutResponse>, ApiError> {
    let provider = state
        .provider
        .as_ref()
        .ok_or_else(|| ApiError::ExternalService("payment provider not configured".into()))?;

    let store_id = state
        .config
        .provider_store_id
        .as_ref()
        .ok_or_else(|| ApiError::ExternalService("provider store id not configured".into()))?;
    let variant_id = state.config.provider_pro_variant_id.as_ref().ok_or_else(|| {
        ApiError::ExternalService("provider Pro variant id not configured".into())
    })?;

    let account = state
        .store
        .get_account(&body.account_id)?
        .ok_or_else(|| ApiError::NotFound("Account not found".into()))?;

    let email = body
        .email
        .or(account.email)
        .ok_or_else(|| ApiError::BadRequest("No email on file for checkout".into()))?;

    let redirect_url = format!("{}/billing/success", state.config.frontend_url);

    let session = provider
        .create_checkout(
            store_id,
            variant_id,
            &email,
            &body.account_id.to_string(),
            &redirect_url,
        )
        .await
        .map_err(|e| {
            tracing::error!(account_id = %body.account_id, error = %e, "Checkout creation failed");
            ApiError::ExternalService(e.to_string())
        })?;

    tracing::info!(
        account_id = %body.account_id,
        checkout_id = %session.id,
        "Checkout session created"
    );

    Ok(Json(CheckoutResponse {
        checkout_id: session.id,
        checkout_url: session.url,
    }))
}
