//! Integration tests for the batch entry point and its HTTP surface.
//!
//! HTTP tests spin up an Axum server on a random port and talk to it with
//! reqwest.

mod common;

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde_json::{Value, json};
use tokio::net::TcpListener;
use tokio::time::timeout;

use outreach_engine::api::automation_routes;
use outreach_engine::automation::{AutomationAction, AutomationRequest};

use common::{Harness, OPERATOR, TRACKING_LABEL, inbound, minutes_ago};

/// Maximum time any test is allowed to run before we consider it hung.
const TEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Start the API on a random port.
async fn start_server(harness: &Harness) -> u16 {
    let app = automation_routes(Arc::new(harness.automation()));

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    // Give the server a moment to start accepting connections.
    tokio::time::sleep(Duration::from_millis(50)).await;

    port
}

async fn post(port: u16, body: Value) -> (u16, Value) {
    let resp = reqwest::Client::new()
        .post(format!("http://127.0.0.1:{port}/api/automation"))
        .json(&body)
        .send()
        .await
        .unwrap();
    let status = resp.status().as_u16();
    (status, resp.json().await.unwrap())
}

fn process_request(operator: &str) -> AutomationRequest {
    AutomationRequest {
        operator: operator.to_string(),
        skip_delay: false,
        action: AutomationAction::Process,
        recipient: None,
    }
}

// ── Entry point ──────────────────────────────────────────────────────

#[tokio::test]
async fn process_envelope_carries_counters() {
    let harness = Harness::new().await;
    harness.transport.add_thread(
        "t-1",
        vec![inbound("t-1", "m1", "jane@x.com", "My rate is $250.", minutes_ago(Utc::now(), 30))],
    );

    let response = harness.automation().run(&process_request(OPERATOR)).await;

    let json = serde_json::to_value(&response).unwrap();
    assert_eq!(
        json,
        json!({
            "success": true,
            "threadsChecked": 1,
            "processed": 1,
            "replied": 1,
            "pending": 0
        })
    );
    assert_eq!(
        harness.transport.queries(),
        vec![format!("label:{TRACKING_LABEL} is:unread")]
    );
}

#[tokio::test]
async fn operator_match_ignores_case() {
    let harness = Harness::new().await;

    let response = harness
        .automation()
        .run(&process_request("SAM@Brand.com"))
        .await;

    assert!(response.success);
}

#[tokio::test]
async fn unknown_operator_touches_nothing() {
    let harness = Harness::new().await;
    harness.transport.add_thread(
        "t-1",
        vec![inbound("t-1", "m1", "jane@x.com", "Hello", minutes_ago(Utc::now(), 30))],
    );

    let response = harness
        .automation()
        .run(&process_request("mallory@elsewhere.com"))
        .await;

    assert!(!response.success);
    assert!(response.request_error);
    assert!(response.error.unwrap().contains("mallory@elsewhere.com"));
    assert!(harness.transport.queries().is_empty());
    assert_eq!(harness.llm.total_calls(), 0);
}

#[tokio::test]
async fn discovery_failure_is_reported_not_raised() {
    let harness = Harness::new().await;
    harness.transport.fail_discovery();

    let response = harness.automation().run(&process_request(OPERATOR)).await;

    assert!(!response.success);
    assert!(!response.request_error);
    let json = serde_json::to_value(&response).unwrap();
    assert!(json.get("replied").is_none());
    assert!(json["error"].as_str().unwrap().contains("discovery"));
}

// ── HTTP ─────────────────────────────────────────────────────────────

#[tokio::test]
async fn health_endpoint() {
    timeout(TEST_TIMEOUT, async {
        let harness = Harness::new().await;
        let port = start_server(&harness).await;

        let resp = reqwest::get(format!("http://127.0.0.1:{port}/health"))
            .await
            .unwrap();
        assert_eq!(resp.status(), 200);
        assert_eq!(resp.text().await.unwrap(), "ok");
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn http_process_returns_envelope() {
    timeout(TEST_TIMEOUT, async {
        let harness = Harness::new().await;
        let port = start_server(&harness).await;

        let (status, body) = post(port, json!({"operator": OPERATOR, "skipDelay": true})).await;

        assert_eq!(status, 200);
        assert_eq!(body["success"], true);
        assert_eq!(body["threadsChecked"], 0);
        assert_eq!(body["replied"], 0);
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn http_unknown_operator_is_bad_request() {
    timeout(TEST_TIMEOUT, async {
        let harness = Harness::new().await;
        let port = start_server(&harness).await;

        let (status, body) = post(port, json!({"operator": "nobody@nowhere.com"})).await;

        assert_eq!(status, 400);
        assert_eq!(body["success"], false);
        assert!(body["error"].as_str().unwrap().contains("nobody@nowhere.com"));
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn http_malformed_request_is_bad_request() {
    timeout(TEST_TIMEOUT, async {
        let harness = Harness::new().await;
        let port = start_server(&harness).await;

        let (status, body) = post(port, json!({"operator": OPERATOR, "action": "explode"})).await;

        assert_eq!(status, 400);
        assert_eq!(body["success"], false);
        assert!(body["error"].is_string());
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn http_discovery_failure_is_server_error() {
    timeout(TEST_TIMEOUT, async {
        let harness = Harness::new().await;
        harness.transport.fail_discovery();
        let port = start_server(&harness).await;

        let (status, body) = post(port, json!({"operator": OPERATOR})).await;

        assert_eq!(status, 500);
        assert_eq!(body["success"], false);
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn http_reset_without_label() {
    timeout(TEST_TIMEOUT, async {
        let harness = Harness::new().await;
        let port = start_server(&harness).await;

        let (status, body) =
            post(port, json!({"operator": OPERATOR, "action": "reset-tracking-labels"})).await;

        assert_eq!(status, 200);
        assert_eq!(
            body,
            json!({"success": true, "threadsReset": 0, "messagesUpdated": 0})
        );
    })
    .await
    .expect("test timed out");
}
