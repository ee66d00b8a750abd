//! Admission, usage recording, and usage statistics handlers.
//!
//! The chat relay wraps each metered action in a reserve/act/record cycle:
//! `POST /v1/admission` reserves a quota slot before the action runs, and
//! `POST /v1/usage` appends the audit record afterwards. The quota counter
//! is advanced by the reservation, so an action that fails mid-flight is
//! still billed on attempt.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::Json;
use serde::{Deserialize, Serialize};

use relay_billing_core::{AccountId, ActionType, SubscriptionStatus, UsageRecord};
use relay_billing_store::{Store, StoreError, UsageBreakdown};

use crate::auth::ServiceAuth;
use crate::error::ApiError;
use crate::state::AppState;

/// Admission request.
#[derive(Debug, Deserialize)]
pub struct AdmissionRequest {
    /// The account performing the action.
    pub account_id: AccountId,
    /// The action about to be performed (logged, not policy-relevant).
    pub action_type: ActionType,
}

/// Admission response (the reservation succeeded).
#[derive(Debug, Serialize)]
pub struct AdmissionResponse {
    /// Always true on this path; denials are 429 errors.
    pub allowed: bool,
    /// Whether the reserved slot is beyond quota (overage billing).
    pub is_overage: bool,
    /// Requests consumed before this reservation.
    pub used: i64,
    /// The account's monthly quota.
    pub quota: i64,
    /// Requests remaining after this reservation.
    pub remaining: i64,
}

/// Check quota and reserve a slot for one metered action.
///
/// The check and the counter increment are one atomic store operation;
/// concurrent reservations against the same account serialize.
pub async fn check_admission(
    State(state): State<Arc<AppState>>,
    auth: ServiceAuth,
    Json(body): Json<AdmissionRequest>,
) -> Result<Json<AdmissionResponse>, ApiError> {
    let decision = state
        .store
        .check_and_reserve(&body.account_id)
        .map_err(|e| match e {
            StoreError::NotFound => ApiError::NotFound("Account not found".into()),
            other => other.into(),
        })?;

    if !decision.allowed {
        tracing::info!(
            account_id = %body.account_id,
            action_type = %body.action_type.as_str(),
            used = %decision.used,
            quota = %decision.quota,
            service = %auth.service_name,
            "Admission denied"
        );
        return Err(ApiError::QuotaExceeded {
            used: decision.used,
            quota: decision.quota,
            reason: decision
                .reason
                .map_or("quota exceeded", |r| r.message())
                .to_string(),
        });
    }

    Ok(Json(AdmissionResponse {
        allowed: true,
        is_overage: decision.is_overage,
        used: decision.used,
        quota: decision.quota,
        remaining: decision.remaining.saturating_sub(1),
    }))
}

/// Usage recording request.
#[derive(Debug, Deserialize)]
pub struct RecordUsageRequest {
    /// The account that performed the action.
    pub account_id: AccountId,
    /// The action performed.
    pub action_type: ActionType,
    /// Provider tokens consumed.
    #[serde(default)]
    pub tokens_used: i64,
    /// Overage flag carried over from the admission decision.
    #[serde(default)]
    pub is_overage: bool,
}

/// Usage recording response.
#[derive(Debug, Serialize)]
pub struct RecordUsageResponse {
    /// Whether the record was written.
    pub recorded: bool,
    /// The assigned record id.
    pub record_id: String,
}

/// Append a usage record for an already-admitted action.
///
/// Never touches the quota counter; that was advanced at reservation time.
pub async fn record_usage(
    State(state): State<Arc<AppState>>,
    _auth: ServiceAuth,
    Json(body): Json<RecordUsageRequest>,
) -> Result<Json<RecordUsageResponse>, ApiError> {
    let account = state
        .store
        .get_account(&body.account_id)?
        .ok_or_else(|| ApiError::NotFound("Account not found".into()))?;

    let record = UsageRecord::new(&account, body.action_type, body.tokens_used, body.is_overage);
    state.store.record_usage(&record)?;

    tracing::debug!(
        account_id = %body.account_id,
        record_id = %record.id,
        action_type = %body.action_type.as_str(),
        tokens_used = %body.tokens_used,
        is_overage = %body.is_overage,
        "Usage recorded"
    );

    Ok(Json(RecordUsageResponse {
        recorded: true,
        record_id: record.id.to_string(),
    }))
}

/// Usage statistics response.
#[derive(Debug, Serialize)]
pub struct UsageStatsResponse {
    /// Account ID.
    pub account_id: String,
    /// Display plan name.
    pub plan: String,
    /// Subscription status.
    pub status: String,
    /// Monthly request quota.
    pub monthly_quota: i64,
    /// Requests consumed this period.
    pub requests_used: i64,
    /// Requests remaining before quota exhaustion.
    pub remaining: i64,
    /// Quota consumed, as a percentage.
    pub percentage_used: f64,
    /// Requests consumed beyond quota this period.
    pub overage_requests: i64,
    /// Accrued overage cost in cents.
    pub overage_cost_cents: i64,
    /// Estimated bill for this period in cents (plan price plus overage).
    pub estimated_bill_cents: i64,
    /// Whether the warning threshold has been crossed.
    pub show_overage_warning: bool,
    /// Current billing period start.
    pub current_period_start: Option<String>,
    /// Current billing period end.
    pub current_period_end: Option<String>,
    /// Per-action totals for the current period.
    pub breakdown: Vec<ActionBreakdown>,
}

/// Per-action usage totals.
#[derive(Debug, Serialize)]
pub struct ActionBreakdown {
    /// Action type name.
    pub action_type: String,
    /// Number of actions.
    pub count: i64,
    /// Total tokens consumed.
    pub tokens: i64,
}

impl From<UsageBreakdown> for ActionBreakdown {
    fn from(b: UsageBreakdown) -> Self {
        Self {
            action_type: b.action_type,
            count: b.count,
            tokens: b.tokens,
        }
    }
}

/// Usage statistics for the account's current billing period.
pub async fn usage_stats(
    State(state): State<Arc<AppState>>,
    _auth: ServiceAuth,
    Path(account_id): Path<AccountId>,
) -> Result<Json<UsageStatsResponse>, ApiError> {
    let account = state
        .store
        .get_account(&account_id)?
        .ok_or_else(|| ApiError::NotFound("Account not found".into()))?;

    let breakdown = state.store.usage_breakdown(&account_id)?;
    let plans = &state.config.plans;

    let overage_requests = account.overage_requests();
    let overage_cost_cents = if account.overage_enabled {
        overage_requests * plans.overage_rate_cents_per_request
    } else {
        0
    };
    let base_cents = match account.subscription_status {
        SubscriptionStatus::Pro => plans.pro_price_cents,
        _ => 0,
    };

    Ok(Json(UsageStatsResponse {
        account_id: account.account_id.to_string(),
        plan: account.plan_name().to_string(),
        status: account.subscription_status.as_str().to_string(),
        monthly_quota: account.monthly_quota,
        requests_used: account.requests_used,
        remaining: account.remaining(),
        percentage_used: account.usage_fraction() * 100.0,
        overage_requests,
        overage_cost_cents,
        estimated_bill_cents: base_cents + overage_cost_cents,
        show_overage_warning: account.usage_fraction() >= plans.overage_warning_threshold,
        current_period_start: account.current_period_start.map(|t| t.to_rfc3339()),
        current_period_end: account.current_period_end.map(|t| t.to_rfc3339()),
        breakdown: breakdown.into_iter().map(ActionBreakdown::from).collect(),
    }))
}
