//! Relay-Billing HTTP API Service.
//!
//! This crate provides the HTTP API for the relay-billing engine, including:
//!
//! - Webhook ingestion from the payment provider
//! - Quota admission (check-and-reserve) for metered actions
//! - Usage recording and per-account usage statistics
//! - Account management and spending-limit controls
//!
//! # Authentication
//!
//! Internal endpoints authenticate with a **service API key**
//! (`x-api-key` header); the webhook endpoint authenticates with an
//! HMAC-SHA256 signature over the raw request body.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
// Allow some pedantic lints that are noisy for Axum handler functions
#![allow(clippy::missing_errors_doc)] // Axum handlers all return Result
#![allow(clippy::unused_async)] // Some handlers need async for consistency

pub mod auth;
pub mod config;
pub mod crypto;
pub mod error;
pub mod handlers;
pub mod provider;
pub mod resolve;
pub mod routes;
pub mod state;

pub use config::ServiceConfig;
pub use error::ApiError;
pub use provider::{ProviderClient, ProviderError};
pub use routes::create_router;
pub use state::AppState;
