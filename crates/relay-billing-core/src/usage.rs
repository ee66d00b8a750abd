//! Usage records for metered actions.
//!
//! One record per admitted action, append-only. The record is anchored to
//! the billing period it was consumed in by copying the period boundaries
//! from the account at write time; a later period rollover does not
//! reclassify historical usage.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::{Account, AccountId, UsageRecordId};

/// The metered actions the chat relay can perform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    /// Summarize a document or page.
    Summarize,
    /// Answer a question about selected content.
    Ask,
    /// Explain selected content.
    Explain,
    /// Autofill a form or template.
    Autofill,
    /// Free-form chat turn.
    Chat,
}

impl ActionType {
    /// String form used in API responses and breakdowns.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Summarize => "summarize",
            Self::Ask => "ask",
            Self::Explain => "explain",
            Self::Autofill => "autofill",
            Self::Chat => "chat",
        }
    }
}

/// A durable record of one admitted metered action.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsageRecord {
    /// Time-ordered record id.
    pub id: UsageRecordId,

    /// The account that consumed the action.
    pub account_id: AccountId,

    /// What kind of action was performed.
    pub action_type: ActionType,

    /// Provider tokens consumed by the action.
    pub tokens_used: i64,

    /// Whether the action fell beyond quota, computed from the counter
    /// value before the reservation incremented it.
    pub is_overage: bool,

    /// Start of the billing period the action was consumed in.
    pub billing_period_start: DateTime<Utc>,

    /// End of that billing period.
    pub billing_period_end: DateTime<Utc>,

    /// When the record was written.
    pub recorded_at: DateTime<Utc>,
}

impl UsageRecord {
    /// Build a record for an action admitted against `account`.
    ///
    /// Period boundaries are copied from the account; accounts that have
    /// never seen a billing event (free tier) get a 30-day window anchored
    /// at now, matching the original behavior.
    #[must_use]
    pub fn new(account: &Account, action_type: ActionType, tokens_used: i64, is_overage: bool) -> Self {
        let now = Utc::now();
        Self {
            id: UsageRecordId::generate(),
            account_id: account.account_id,
            action_type,
            tokens_used,
            is_overage,
            billing_period_start: account.current_period_start.unwrap_or(now),
            billing_period_end: account
                .current_period_end
                .unwrap_or_else(|| now + Duration::days(30)),
            recorded_at: now,
        }
    }
}
