//! Application state.

use std::sync::Arc;

use relay_billing_store::RocksStore;

use crate::config::ServiceConfig;
use crate::provider::ProviderClient;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    /// The storage backend.
    pub store: Arc<RocksStore>,

    /// Service configuration.
    pub config: ServiceConfig,

    /// Payment provider client for checkout/subscription calls (optional).
    pub provider: Option<Arc<ProviderClient>>,
}

impl AppState {
    /// Create a new application state.
    #[must_use]
    pub fn new(store: Arc<RocksStore>, config: ServiceConfig) -> Self {
        let provider = config
            .provider_api_url
            .as_ref()
            .zip(config.provider_api_key.as_ref())
            .map(|(url, key)| {
                tracing::info!(provider_url = %url, "payment provider integration enabled");
                Arc::new(ProviderClient::new(url, key))
            });

        if provider.is_none() {
            tracing::warn!("payment provider not configured - checkout endpoints unavailable");
        }

        Self {
            store,
            config,
            provider,
        }
    }

    /// Check if the payment provider is configured.
    #[must_use]
    pub fn has_provider(&self) -> bool {
        self.provider.is_some()
    }
}
