//! API handlers.

// Allow precision loss in handlers - displayed amounts are well within f64 precision
#![allow(clippy::cast_precision_loss)]

pub mod accounts;
pub mod checkout;
pub mod events;
pub mod health;
pub mod usage;
pub mod webhooks;
