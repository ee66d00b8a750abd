//! Account management integration tests.

mod common;

use common::TestHarness;
use relay_billing_core::AccountId;
use serde_json::json;

#[tokio::test]
async fn health_is_public() {
    let harness = TestHarness::new();

    let response = harness.server.get("/health").await;
    response.assert_status_ok();
    let body: serde_json::Value = response.json();
    assert_eq!(body["status"], "ok");
    assert_eq!(body["service"], "relay-billing");
}

#[tokio::test]
async fn create_and_fetch_account() {
    let harness = TestHarness::new();
    let account_id = AccountId::generate();

    let response = harness
        .server
        .post("/v1/accounts")
        .add_header("x-api-key", &harness.service_api_key)
        .json(&json!({
            "account_id": account_id.to_string(),
            "email": "new@example.com"
        }))
        .await;
    response.assert_status_ok();
    let body: serde_json::Value = response.json();
    assert_eq!(body["plan"], "Free");
    assert_eq!(body["monthly_quota"], 50);
    assert_eq!(body["requests_used"], 0);
    assert_eq!(body["overage_enabled"], true);
    assert_eq!(body["auto_stop_at_limit"], false);

    let response = harness
        .server
        .get(&format!("/v1/accounts/{account_id}"))
        .add_header("x-api-key", &harness.service_api_key)
        .await;
    response.assert_status_ok();
    let body: serde_json::Value = response.json();
    assert_eq!(body["account_id"], account_id.to_string());
    assert_eq!(body["email"], "new@example.com");
}

#[tokio::test]
async fn duplicate_registration_conflicts() {
    let harness = TestHarness::new();
    let account_id = AccountId::generate();
    harness.create_account(account_id, None).await;

    let response = harness
        .server
        .post("/v1/accounts")
        .add_header("x-api-key", &harness.service_api_key)
        .json(&json!({ "account_id": account_id.to_string() }))
        .await;

    response.assert_status(axum::http::StatusCode::CONFLICT);
}

#[tokio::test]
async fn account_endpoints_require_service_key() {
    let harness = TestHarness::new();
    let account_id = AccountId::generate();

    harness
        .server
        .post("/v1/accounts")
        .json(&json!({ "account_id": account_id.to_string() }))
        .await
        .assert_status_unauthorized();

    harness
        .server
        .post("/v1/accounts")
        .add_header("x-api-key", "wrong-key")
        .json(&json!({ "account_id": account_id.to_string() }))
        .await
        .assert_status_unauthorized();
}

#[tokio::test]
async fn set_limits_updates_only_provided_fields() {
    let harness = TestHarness::new();
    let account_id = AccountId::generate();
    harness.create_account(account_id, None).await;

    let response = harness
        .server
        .post(&format!("/v1/accounts/{account_id}/limits"))
        .add_header("x-api-key", &harness.service_api_key)
        .json(&json!({ "auto_stop_at_limit": true }))
        .await;
    response.assert_status_ok();
    let body: serde_json::Value = response.json();
    assert_eq!(body["auto_stop_at_limit"], true);
    // Untouched by this request.
    assert_eq!(body["overage_enabled"], true);

    let response = harness
        .server
        .post(&format!("/v1/accounts/{account_id}/limits"))
        .add_header("x-api-key", &harness.service_api_key)
        .json(&json!({ "overage_enabled": false }))
        .await;
    response.assert_status_ok();
    let body: serde_json::Value = response.json();
    assert_eq!(body["auto_stop_at_limit"], true);
    assert_eq!(body["overage_enabled"], false);
}

#[tokio::test]
async fn fetching_missing_account_is_not_found() {
    let harness = TestHarness::new();

    let response = harness
        .server
        .get(&format!("/v1/accounts/{}", AccountId::generate()))
        .add_header("x-api-key", &harness.service_api_key)
        .await;

    response.assert_status_not_found();
}

#[tokio::test]
async fn checkout_without_provider_is_bad_gateway() {
    let harness = TestHarness::new();
    let account_id = AccountId::generate();
    harness.create_account(account_id, Some("buyer@example.com")).await;

    let response = harness
        .server
        .post("/v1/checkout")
        .add_header("x-api-key", &harness.service_api_key)
        .json(&json!({ "account_id": account_id.to_string() }))
        .await;

    response.assert_status(axum::http::StatusCode::BAD_GATEWAY);
}
