//! Account management handlers.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::Json;
use chrono::Utc;
use serde::{Deserialize, Serialize};

use relay_billing_core::{Account, AccountId};
use relay_billing_store::Store;

use crate::auth::ServiceAuth;
use crate::error::ApiError;
use crate::state::AppState;

/// Account response.
#[derive(Debug, Serialize)]
pub struct AccountResponse {
    /// Account ID.
    pub account_id: String,
    /// Customer email, if known.
    pub email: Option<String>,
    /// Subscription status.
    pub status: String,
    /// Display plan name.
    pub plan: String,
    /// Monthly request quota.
    pub monthly_quota: i64,
    /// Requests consumed this period.
    pub requests_used: i64,
    /// Requests remaining before quota exhaustion.
    pub remaining: i64,
    /// Whether overage billing is enabled.
    pub overage_enabled: bool,
    /// Whether the account hard-stops at the quota.
    pub auto_stop_at_limit: bool,
    /// Current billing period start.
    pub current_period_start: Option<String>,
    /// Current billing period end.
    pub current_period_end: Option<String>,
    /// Created timestamp.
    pub created_at: String,
}

impl From<&Account> for AccountResponse {
    fn from(account: &Account) -> Self {
        Self {
            account_id: account.account_id.to_string(),
            email: account.email.clone(),
            status: account.subscription_status.as_str().to_string(),
            plan: account.plan_name().to_string(),
            monthly_quota: account.monthly_quota,
            requests_used: account.requests_used,
            remaining: account.remaining(),
            overage_enabled: account.overage_enabled,
            auto_stop_at_limit: account.auto_stop_at_limit,
            current_period_start: account.current_period_start.map(|t| t.to_rfc3339()),
            current_period_end: account.current_period_end.map(|t| t.to_rfc3339()),
            created_at: account.created_at.to_rfc3339(),
        }
    }
}

/// Create account request.
#[derive(Debug, Deserialize)]
pub struct CreateAccountRequest {
    /// The account id assigned by the identity layer.
    pub account_id: AccountId,
    /// Optional email, used as a webhook resolution fallback.
    pub email: Option<String>,
}

/// Register a new account on the free tier.
pub async fn create_account(
    State(state): State<Arc<AppState>>,
    _auth: ServiceAuth,
    Json(body): Json<CreateAccountRequest>,
) -> Result<Json<AccountResponse>, ApiError> {
    if state.store.get_account(&body.account_id)?.is_some() {
        return Err(ApiError::Conflict("Account already exists".into()));
    }

    let mut account = Account::new(body.account_id, &state.config.plans);
    account.email = body.email;

    state.store.put_account(&account)?;

    tracing::info!(account_id = %account.account_id, "Account created");

    Ok(Json(AccountResponse::from(&account)))
}

/// Get an account by id.
pub async fn get_account(
    State(state): State<Arc<AppState>>,
    _auth: ServiceAuth,
    Path(account_id): Path<AccountId>,
) -> Result<Json<AccountResponse>, ApiError> {
    let account = state
        .store
        .get_account(&account_id)?
        .ok_or_else(|| ApiError::NotFound("Account not found".into()))?;

    Ok(Json(AccountResponse::from(&account)))
}

/// Spending-limit update request. Absent fields are left unchanged.
#[derive(Debug, Deserialize)]
pub struct SetLimitsRequest {
    /// Allow metered actions beyond quota, billed per request.
    pub overage_enabled: Option<bool>,
    /// Deny all actions at quota exhaustion, overriding overage.
    pub auto_stop_at_limit: Option<bool>,
}

/// Update an account's spending-limit controls.
pub async fn set_limits(
    State(state): State<Arc<AppState>>,
    _auth: ServiceAuth,
    Path(account_id): Path<AccountId>,
    Json(body): Json<SetLimitsRequest>,
) -> Result<Json<AccountResponse>, ApiError> {
    let mut account = state
        .store
        .get_account(&account_id)?
        .ok_or_else(|| ApiError::NotFound("Account not found".into()))?;

    if let Some(overage_enabled) = body.overage_enabled {
        account.overage_enabled = overage_enabled;
    }
    if let Some(auto_stop_at_limit) = body.auto_stop_at_limit {
        account.auto_stop_at_limit = auto_stop_at_limit;
    }
    account.updated_at = Utc::now();

    state.store.put_account(&account)?;

    tracing::info!(
        account_id = %account_id,
        overage_enabled = %account.overage_enabled,
        auto_stop_at_limit = %account.auto_stop_at_limit,
        "Spending limits updated"
    );

    Ok(Json(AccountResponse::from(&account)))
}
