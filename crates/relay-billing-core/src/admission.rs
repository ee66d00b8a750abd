//! Quota admission policy.
//!
//! `evaluate` is a pure function over a fresh read of the account row; the
//! store runs it inside the same critical section as the counter increment
//! so that check and reserve are one atomic step.

use serde::{Deserialize, Serialize};

use crate::Account;

/// The outcome of an admission check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Decision {
    /// Whether the metered action may proceed.
    pub allowed: bool,

    /// Requests remaining before quota exhaustion (post-decision view).
    pub remaining: i64,

    /// Requests consumed before this decision.
    pub used: i64,

    /// The account's quota.
    pub quota: i64,

    /// Whether this action falls beyond quota (billed as overage).
    pub is_overage: bool,

    /// Why admission was denied, when it was.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<DenyReason>,
}

/// Why an admission check denied the action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DenyReason {
    /// Quota exhausted and the account hard-stops at the limit.
    QuotaExhaustedHardStop,

    /// Quota exhausted and overage is disabled.
    QuotaExhaustedOverageOff,
}

impl DenyReason {
    /// User-facing message for this denial.
    #[must_use]
    pub const fn message(self) -> &'static str {
        match self {
            Self::QuotaExhaustedHardStop => {
                "Monthly quota exceeded. Please upgrade or enable overage."
            }
            Self::QuotaExhaustedOverageOff => "Monthly quota exceeded. Please upgrade your plan.",
        }
    }
}

/// Evaluate the admission policy against an account row.
///
/// `auto_stop_at_limit` takes precedence over `overage_enabled`: a
/// hard-stopped account is denied at exhaustion even if overage billing is
/// switched on.
#[must_use]
pub fn evaluate(account: &Account) -> Decision {
    let quota = account.monthly_quota;
    let used = account.requests_used;
    let exhausted = used >= quota;

    if !exhausted {
        return Decision {
            allowed: true,
            remaining: quota - used,
            used,
            quota,
            is_overage: false,
            reason: None,
        };
    }

    let denied = |reason: DenyReason| Decision {
        allowed: false,
        remaining: 0,
        used,
        quota,
        is_overage: true,
        reason: Some(reason),
    };

    if account.auto_stop_at_limit {
        return denied(DenyReason::QuotaExhaustedHardStop);
    }
    if !account.overage_enabled {
        return denied(DenyReason::QuotaExhaustedOverageOff);
    }

    Decision {
        allowed: true,
        remaining: 0,
        used,
        quota,
        is_overage: true,
        reason: None,
    }
}
