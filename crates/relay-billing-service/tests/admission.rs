//! Admission and usage metering integration tests.

mod common;

use common::TestHarness;
use relay_billing_core::{Account, AccountId, PlanConfig, SubscriptionStatus};
use relay_billing_store::Store;
use serde_json::json;

/// Seed an account row directly with explicit quota knobs.
fn seed_account(
    harness: &TestHarness,
    quota: i64,
    used: i64,
    overage_enabled: bool,
    auto_stop: bool,
) -> AccountId {
    let mut account = Account::new(AccountId::generate(), &PlanConfig::default());
    account.monthly_quota = quota;
    account.requests_used = used;
    account.overage_enabled = overage_enabled;
    account.auto_stop_at_limit = auto_stop;
    harness.store.put_account(&account).unwrap();
    account.account_id
}

async fn admit(harness: &TestHarness, account_id: AccountId) -> axum_test::TestResponse {
    harness
        .server
        .post("/v1/admission")
        .add_header("x-api-key", &harness.service_api_key)
        .json(&json!({
            "account_id": account_id.to_string(),
            "action_type": "chat"
        }))
        .await
}

// ============================================================================
// Admission
// ============================================================================

#[tokio::test]
async fn requires_service_key() {
    let harness = TestHarness::new();

    let response = harness
        .server
        .post("/v1/admission")
        .json(&json!({
            "account_id": AccountId::generate().to_string(),
            "action_type": "chat"
        }))
        .await;

    response.assert_status_unauthorized();
}

#[tokio::test]
async fn unknown_account_is_not_found() {
    let harness = TestHarness::new();
    let response = admit(&harness, AccountId::generate()).await;
    response.assert_status_not_found();
}

#[tokio::test]
async fn last_slot_is_allowed_then_denied_without_overage() {
    let harness = TestHarness::new();
    let account_id = seed_account(&harness, 50, 49, false, false);

    // Request 50 of 50 is inside quota.
    let response = admit(&harness, account_id).await;
    response.assert_status_ok();
    let body: serde_json::Value = response.json();
    assert_eq!(body["allowed"], true);
    assert_eq!(body["is_overage"], false);
    assert_eq!(body["used"], 49);
    assert_eq!(body["remaining"], 0);

    // Request 51 is not, and overage is off.
    let response = admit(&harness, account_id).await;
    response.assert_status(axum::http::StatusCode::TOO_MANY_REQUESTS);
    let body: serde_json::Value = response.json();
    assert_eq!(body["error"]["code"], "quota_exceeded");
    assert_eq!(body["error"]["details"]["used"], 50);
    assert_eq!(body["error"]["details"]["quota"], 50);

    // The denied attempt did not consume anything.
    let account = harness.store.get_account(&account_id).unwrap().unwrap();
    assert_eq!(account.requests_used, 50);
}

#[tokio::test]
async fn exhausted_quota_with_overage_admits_as_overage() {
    let harness = TestHarness::new();
    let account_id = seed_account(&harness, 50, 50, true, false);

    let response = admit(&harness, account_id).await;
    response.assert_status_ok();
    let body: serde_json::Value = response.json();
    assert_eq!(body["allowed"], true);
    assert_eq!(body["is_overage"], true);
}

#[tokio::test]
async fn hard_stop_overrides_overage() {
    let harness = TestHarness::new();
    let account_id = seed_account(&harness, 50, 50, true, true);

    let response = admit(&harness, account_id).await;
    response.assert_status(axum::http::StatusCode::TOO_MANY_REQUESTS);

    let account = harness.store.get_account(&account_id).unwrap().unwrap();
    assert_eq!(account.requests_used, 50);
}

#[tokio::test]
async fn quota_is_never_overshot_under_repeated_requests() {
    let harness = TestHarness::new();
    let account_id = seed_account(&harness, 5, 0, false, true);

    let mut allowed = 0;
    let mut denied = 0;
    for _ in 0..10 {
        let response = admit(&harness, account_id).await;
        if response.status_code() == axum::http::StatusCode::OK {
            allowed += 1;
        } else {
            denied += 1;
        }
    }

    assert_eq!(allowed, 5);
    assert_eq!(denied, 5);

    let account = harness.store.get_account(&account_id).unwrap().unwrap();
    assert_eq!(account.requests_used, 5);
}

// ============================================================================
// Usage recording and statistics
// ============================================================================

#[tokio::test]
async fn reserve_then_record_shows_up_in_stats() {
    let harness = TestHarness::new();
    let account_id = seed_account(&harness, 50, 0, true, false);

    let response = admit(&harness, account_id).await;
    response.assert_status_ok();
    let decision: serde_json::Value = response.json();

    let response = harness
        .server
        .post("/v1/usage")
        .add_header("x-api-key", &harness.service_api_key)
        .json(&json!({
            "account_id": account_id.to_string(),
            "action_type": "chat",
            "tokens_used": 120,
            "is_overage": decision["is_overage"]
        }))
        .await;
    response.assert_status_ok();
    let body: serde_json::Value = response.json();
    assert_eq!(body["recorded"], true);

    let response = harness
        .server
        .get(&format!("/v1/accounts/{account_id}/usage"))
        .add_header("x-api-key", &harness.service_api_key)
        .await;
    response.assert_status_ok();
    let stats: serde_json::Value = response.json();
    assert_eq!(stats["requests_used"], 1);
    assert_eq!(stats["remaining"], 49);
    assert_eq!(stats["breakdown"][0]["action_type"], "chat");
    assert_eq!(stats["breakdown"][0]["count"], 1);
    assert_eq!(stats["breakdown"][0]["tokens"], 120);
}

#[tokio::test]
async fn stats_report_overage_cost_and_warning() {
    let harness = TestHarness::new();
    let mut account = Account::new(AccountId::generate(), &PlanConfig::default());
    account.subscription_status = SubscriptionStatus::Pro;
    account.monthly_quota = 100;
    account.requests_used = 110;
    account.overage_enabled = true;
    harness.store.put_account(&account).unwrap();

    let response = harness
        .server
        .get(&format!("/v1/accounts/{}/usage", account.account_id))
        .add_header("x-api-key", &harness.service_api_key)
        .await;
    response.assert_status_ok();
    let stats: serde_json::Value = response.json();

    assert_eq!(stats["plan"], "Pro");
    assert_eq!(stats["overage_requests"], 10);
    // 10 overage requests at 1 cent each, on top of the 9.99 plan price.
    assert_eq!(stats["overage_cost_cents"], 10);
    assert_eq!(stats["estimated_bill_cents"], 999 + 10);
    assert_eq!(stats["show_overage_warning"], true);
    assert_eq!(stats["remaining"], 0);
}

#[tokio::test]
async fn recording_usage_does_not_touch_the_counter() {
    let harness = TestHarness::new();
    let account_id = seed_account(&harness, 50, 7, true, false);

    harness
        .server
        .post("/v1/usage")
        .add_header("x-api-key", &harness.service_api_key)
        .json(&json!({
            "account_id": account_id.to_string(),
            "action_type": "summarize",
            "tokens_used": 10,
            "is_overage": false
        }))
        .await
        .assert_status_ok();

    let account = harness.store.get_account(&account_id).unwrap().unwrap();
    assert_eq!(account.requests_used, 7);
}
