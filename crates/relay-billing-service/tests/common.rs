//! Common test utilities for relay-billing integration tests.

#![allow(dead_code)] // Some utilities are used by different test files

use std::sync::Arc;

use axum::Router;
use axum_test::{TestResponse, TestServer};
use tempfile::TempDir;

use relay_billing_core::{AccountId, PlanConfig};
use relay_billing_service::crypto::hmac_sha256_hex;
use relay_billing_service::{create_router, AppState, ServiceConfig};
use relay_billing_store::RocksStore;

/// Test harness containing everything needed for integration tests.
pub struct TestHarness {
    /// The test server for making HTTP requests.
    pub server: TestServer,
    /// Direct store handle for seeding and inspecting the ledger.
    pub store: Arc<RocksStore>,
    /// Temporary directory for the database (kept alive for test duration).
    pub _temp_dir: TempDir,
    /// The service API key for service-to-service requests.
    pub service_api_key: String,
    /// The shared secret webhook deliveries are signed with.
    pub webhook_secret: String,
}

impl TestHarness {
    /// Create a new test harness with a fresh database.
    pub fn new() -> Self {
        Self::build(Some("test-webhook-secret".to_string()))
    }

    /// A harness with no webhook secret configured, for exercising the
    /// fail-closed path.
    pub fn without_webhook_secret() -> Self {
        Self::build(None)
    }

    fn build(configured_secret: Option<String>) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let store = Arc::new(RocksStore::open(temp_dir.path()).expect("Failed to open store"));

        let service_api_key = "test-service-key".to_string();
        let webhook_secret = "test-webhook-secret".to_string();

        let config = ServiceConfig {
            listen_addr: "127.0.0.1:0".into(),
            data_dir: temp_dir.path().to_string_lossy().to_string(),
            service_api_key: Some(service_api_key.clone()),
            webhook_secret: configured_secret,
            provider_api_url: None,
            provider_api_key: None,
            provider_store_id: None,
            provider_pro_variant_id: None,
            frontend_url: "http://localhost:3000".into(),
            cors_origins: vec!["*".into()],
            max_body_bytes: 1024 * 1024,
            request_timeout_seconds: 30,
            plans: PlanConfig::default(),
        };

        let state = AppState::new(Arc::clone(&store), config);
        let router: Router = create_router(state);

        let server = TestServer::new(router).expect("Failed to create test server");

        Self {
            server,
            store,
            _temp_dir: temp_dir,
            service_api_key,
            webhook_secret,
        }
    }

    /// Sign a webhook body the way the provider does.
    pub fn sign(&self, body: &str) -> String {
        hmac_sha256_hex(&self.webhook_secret, body.as_bytes())
    }

    /// Deliver a signed webhook payload.
    pub async fn deliver_webhook(&self, payload: &serde_json::Value) -> TestResponse {
        let body = payload.to_string();
        let signature = self.sign(&body);

        self.server
            .post("/webhooks/provider")
            .add_header("x-signature", signature)
            .bytes(body.into())
            .await
    }

    /// Register an account through the API.
    pub async fn create_account(&self, account_id: AccountId, email: Option<&str>) {
        self.server
            .post("/v1/accounts")
            .add_header("x-api-key", &self.service_api_key)
            .json(&serde_json::json!({
                "account_id": account_id.to_string(),
                "email": email,
            }))
            .await
            .assert_status_ok();
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}

/// A `subscription_created` payload carrying a direct account id.
pub fn created_payload(
    event_id: &str,
    account_id: AccountId,
    renews_at: &str,
    ends_at: Option<&str>,
) -> serde_json::Value {
    serde_json::json!({
        "meta": {
            "event_name": "subscription_created",
            "event_id": event_id,
            "custom_data": { "user_id": account_id.to_string() }
        },
        "data": {
            "id": "sub_42",
            "attributes": {
                "subscription_id": "sub_42",
                "customer_id": 9000,
                "status": "active",
                "user_email": "subscriber@example.com",
                "created_at": "2024-01-01T00:00:00Z",
                "renews_at": renews_at,
                "ends_at": ends_at
            }
        }
    })
}

/// A provider event payload with an arbitrary name and attributes.
pub fn event_payload(
    event_id: &str,
    event_name: &str,
    account_id: AccountId,
    attributes: serde_json::Value,
) -> serde_json::Value {
    serde_json::json!({
        "meta": {
            "event_name": event_name,
            "event_id": event_id,
            "custom_data": { "user_id": account_id.to_string() }
        },
        "data": {
            "id": "sub_42",
            "attributes": attributes
        }
    })
}
