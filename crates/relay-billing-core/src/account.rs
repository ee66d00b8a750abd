//! Account ledger rows and plan configuration.
//!
//! One `Account` per end user: subscription state plus the usage counter for
//! the current billing period. The counter has exactly two writers: the
//! admission reservation (increment by one) and the state machine (reset to
//! zero on `created` / `payment_success`).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::AccountId;

// ============================================================================
// Constants
// ============================================================================

/// Free plan monthly request limit.
pub const DEFAULT_FREE_MONTHLY_LIMIT: i64 = 50;

/// Pro plan included requests per billing period.
pub const DEFAULT_PRO_INCLUDED_REQUESTS: i64 = 2000;

/// Pro plan monthly price in cents ($9.99).
pub const DEFAULT_PRO_PRICE_CENTS: i64 = 999;

/// Overage rate in cents per request beyond quota ($0.01).
pub const DEFAULT_OVERAGE_RATE_CENTS: i64 = 1;

/// Fraction of quota at which the overage warning starts showing.
pub const DEFAULT_OVERAGE_WARNING_THRESHOLD: f64 = 0.8;

/// A billing account for a user.
///
/// Tracks subscription status, quota, the per-period usage counter, and the
/// correlation ids into the payment provider's namespace.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    /// The account ID (primary key).
    pub account_id: AccountId,

    /// Email address, used by webhook account resolution when the event
    /// payload lacks an account reference.
    pub email: Option<String>,

    /// Current subscription status. Governs quota size and admission policy.
    pub subscription_status: SubscriptionStatus,

    /// Ceiling of metered actions allowed in the current period.
    pub monthly_quota: i64,

    /// Actions consumed in the current period. Monotonically non-decreasing
    /// within a period; reset to 0 only on period rollover.
    pub requests_used: i64,

    /// Start of the current billing window (half-open `[start, end)`).
    pub current_period_start: Option<DateTime<Utc>>,

    /// End of the current billing window.
    pub current_period_end: Option<DateTime<Utc>>,

    /// Whether actions beyond quota are still permitted (billed as overage).
    pub overage_enabled: bool,

    /// If true, overrides `overage_enabled` and hard-stops admission at
    /// quota exhaustion.
    pub auto_stop_at_limit: bool,

    /// Subscription id in the payment provider's namespace.
    pub external_subscription_id: Option<String>,

    /// Customer id in the payment provider's namespace.
    pub external_customer_id: Option<String>,

    /// When the subscription was first created.
    pub subscription_start_date: Option<DateTime<Utc>>,

    /// When the subscription ends (stamped on cancellation, cleared on
    /// resume).
    pub subscription_end_date: Option<DateTime<Utc>>,

    /// When the usage counter was last reset.
    pub last_quota_reset: Option<DateTime<Utc>>,

    /// When the account was created.
    pub created_at: DateTime<Utc>,

    /// When the account was last updated.
    pub updated_at: DateTime<Utc>,
}

impl Account {
    /// Create a new free-tier account.
    #[must_use]
    pub fn new(account_id: AccountId, plans: &PlanConfig) -> Self {
        let now = Utc::now();
        Self {
            account_id,
            email: None,
            subscription_status: SubscriptionStatus::Free,
            monthly_quota: plans.free_monthly_limit,
            requests_used: 0,
            current_period_start: None,
            current_period_end: None,
            overage_enabled: true,
            auto_stop_at_limit: false,
            external_subscription_id: None,
            external_customer_id: None,
            subscription_start_date: None,
            subscription_end_date: None,
            last_quota_reset: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Display label for the account's plan, derived from status.
    #[must_use]
    pub fn plan_name(&self) -> &'static str {
        self.subscription_status.plan_label()
    }

    /// Requests remaining before quota exhaustion.
    #[must_use]
    pub fn remaining(&self) -> i64 {
        (self.monthly_quota - self.requests_used).max(0)
    }

    /// Requests consumed beyond quota in the current period.
    #[must_use]
    pub fn overage_requests(&self) -> i64 {
        (self.requests_used - self.monthly_quota).max(0)
    }

    /// Fraction of quota consumed, clamped to `[0, 1]`.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn usage_fraction(&self) -> f64 {
        if self.monthly_quota <= 0 {
            return 1.0;
        }
        (self.requests_used as f64 / self.monthly_quota as f64).min(1.0)
    }
}

/// Status of a subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    /// No paid subscription; free-tier quota applies.
    Free,

    /// Active paid subscription.
    Pro,

    /// Subscription was cancelled (access continues until period end).
    Cancelled,

    /// Payment failed; access continues until explicitly cancelled.
    PastDue,
}

impl SubscriptionStatus {
    /// Display label for this status.
    #[must_use]
    pub const fn plan_label(self) -> &'static str {
        match self {
            Self::Free => "Free",
            Self::Pro => "Pro",
            Self::Cancelled => "Cancelled",
            Self::PastDue => "Past Due",
        }
    }

    /// String form used in API responses.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Free => "free",
            Self::Pro => "pro",
            Self::Cancelled => "cancelled",
            Self::PastDue => "past_due",
        }
    }
}

/// Plan policy knobs.
///
/// Constructed once at startup from the environment and passed to the
/// components that need it; nothing reads these values globally.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanConfig {
    /// Requests included in the Pro plan per billing period.
    pub pro_included_requests: i64,

    /// Free plan monthly request limit.
    pub free_monthly_limit: i64,

    /// Pro plan monthly price in cents.
    pub pro_price_cents: i64,

    /// Overage rate in cents per request beyond quota.
    pub overage_rate_cents_per_request: i64,

    /// Fraction of quota at which to start warning about overage.
    pub overage_warning_threshold: f64,
}

impl Default for PlanConfig {
    fn default() -> Self {
        Self {
            pro_included_requests: DEFAULT_PRO_INCLUDED_REQUESTS,
            free_monthly_limit: DEFAULT_FREE_MONTHLY_LIMIT,
            pro_price_cents: DEFAULT_PRO_PRICE_CENTS,
            overage_rate_cents_per_request: DEFAULT_OVERAGE_RATE_CENTS,
            overage_warning_threshold: DEFAULT_OVERAGE_WARNING_THRESHOLD,
        }
    }
}
