//! Core types and logic for the relay-billing metering engine.
//!
//! This crate holds everything that is pure domain logic, with no I/O:
//!
//! - **Identifiers**: `AccountId`, `UsageRecordId`
//! - **Ledger rows**: `Account`, `SubscriptionStatus`
//! - **Billing events**: `BillingEvent`, `EventType`, `EventAttributes`
//! - **State machine**: `transition`, the event-to-ledger mutation table
//! - **Admission**: `evaluate`, the quota admission policy
//! - **Usage**: `UsageRecord`, `ActionType`
//!
//! # Quota model
//!
//! Every account carries a `monthly_quota` of metered actions and a
//! `requests_used` counter scoped to the current billing period. The counter
//! only moves two ways: forward by one when an action is reserved, and back
//! to zero when the state machine processes a `created` or `payment_success`
//! event. Period rollover is event-driven, anchored to the payment
//! provider's renewal schedule, never to the wall clock.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod account;
pub mod admission;
pub mod error;
pub mod event;
pub mod ids;
pub mod state_machine;
pub mod usage;

pub use account::{
    Account, PlanConfig, SubscriptionStatus, DEFAULT_FREE_MONTHLY_LIMIT,
    DEFAULT_OVERAGE_RATE_CENTS, DEFAULT_OVERAGE_WARNING_THRESHOLD,
    DEFAULT_PRO_INCLUDED_REQUESTS, DEFAULT_PRO_PRICE_CENTS,
};
pub use admission::{evaluate, Decision, DenyReason};
pub use error::{BillingError, Result};
pub use event::{BillingEvent, EventAttributes, EventType};
pub use ids::{AccountId, IdError, UsageRecordId};
pub use state_machine::transition;
pub use usage::{ActionType, UsageRecord};
