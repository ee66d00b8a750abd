//! Service configuration.

use relay_billing_core::PlanConfig;

/// Service configuration loaded from environment variables.
///
/// Built once at startup and passed by value into `AppState`; nothing in
/// the service reads the environment after this point.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Address to listen on (default: "0.0.0.0:8080").
    pub listen_addr: String,

    /// Path to `RocksDB` data directory (default: "/data/relay-billing").
    pub data_dir: String,

    /// Service API key for service-to-service auth.
    pub service_api_key: Option<String>,

    /// Shared secret for webhook HMAC verification.
    pub webhook_secret: Option<String>,

    /// Payment provider API URL (optional; checkout endpoints return 502
    /// when unset).
    pub provider_api_url: Option<String>,

    /// Payment provider API key (optional).
    pub provider_api_key: Option<String>,

    /// Provider store id, required for checkout creation.
    pub provider_store_id: Option<String>,

    /// Provider variant id of the Pro plan.
    pub provider_pro_variant_id: Option<String>,

    /// Frontend URL for checkout redirects.
    pub frontend_url: String,

    /// CORS allowed origins.
    pub cors_origins: Vec<String>,

    /// Maximum request body size in bytes.
    pub max_body_bytes: usize,

    /// Request timeout in seconds.
    pub request_timeout_seconds: u64,

    /// Plan and quota policy knobs.
    pub plans: PlanConfig,
}

impl ServiceConfig {
    /// Load configuration from environment variables.
    #[must_use]
    pub fn from_env() -> Self {
        Self {
            listen_addr: std::env::var("LISTEN_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".into()),
            data_dir: std::env::var("DATA_DIR").unwrap_or_else(|_| "/data/relay-billing".into()),
            service_api_key: std::env::var("SERVICE_API_KEY").ok(),
            webhook_secret: std::env::var("WEBHOOK_SECRET").ok(),
            provider_api_url: std::env::var("PROVIDER_API_URL").ok(),
            provider_api_key: std::env::var("PROVIDER_API_KEY").ok(),
            provider_store_id: std::env::var("PROVIDER_STORE_ID").ok(),
            provider_pro_variant_id: std::env::var("PROVIDER_PRO_VARIANT_ID").ok(),
            frontend_url: std::env::var("FRONTEND_URL")
                .unwrap_or_else(|_| "http://localhost:3000".into()),
            cors_origins: std::env::var("CORS_ORIGINS")
                .unwrap_or_else(|_| "*".into())
                .split(',')
                .map(|s| s.trim().to_string())
                .collect(),
            max_body_bytes: std::env::var("MAX_BODY_BYTES")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(1024 * 1024), // 1MB
            request_timeout_seconds: std::env::var("REQUEST_TIMEOUT_SECONDS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(30),
            plans: plans_from_env(),
        }
    }
}

/// Load plan policy knobs from the environment, falling back to defaults.
fn plans_from_env() -> PlanConfig {
    let defaults = PlanConfig::default();

    PlanConfig {
        pro_included_requests: env_parse("PRO_PLAN_INCLUDED_REQUESTS")
            .unwrap_or(defaults.pro_included_requests),
        free_monthly_limit: env_parse("FREE_PLAN_MONTHLY_LIMIT")
            .unwrap_or(defaults.free_monthly_limit),
        pro_price_cents: env_parse("PRO_PLAN_PRICE_CENTS").unwrap_or(defaults.pro_price_cents),
        overage_rate_cents_per_request: env_parse("OVERAGE_RATE_CENTS")
            .unwrap_or(defaults.overage_rate_cents_per_request),
        overage_warning_threshold: env_parse("OVERAGE_WARNING_THRESHOLD")
            .unwrap_or(defaults.overage_warning_threshold),
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|s| s.parse().ok())
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:8080".into(),
            data_dir: "/data/relay-billing".into(),
            service_api_key: None,
            webhook_secret: None,
            provider_api_url: None,
            provider_api_key: None,
            provider_store_id: None,
            provider_pro_variant_id: None,
            frontend_url: "http://localhost:3000".into(),
            cors_origins: vec!["*".into()],
            max_body_bytes: 1024 * 1024,
            request_timeout_seconds: 30,
            plans: PlanConfig::default(),
        }
    }
}
