//! Error types for relay-billing.

use crate::ids::IdError;

/// Result type for relay-billing operations.
pub type Result<T> = std::result::Result<T, BillingError>;

/// Errors raised by the pure billing logic.
///
/// Storage and transport failures carry their own error types in the store
/// and service crates; this enum only covers what the domain itself can
/// reject.
#[derive(Debug, thiserror::Error)]
pub enum BillingError {
    /// The event payload is missing a required field or is malformed.
    #[error("malformed event: {0}")]
    MalformedEvent(String),

    /// Invalid identifier.
    #[error("invalid identifier: {0}")]
    InvalidId(#[from] IdError),
}
