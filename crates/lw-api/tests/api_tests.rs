//! Control-plane API tests against the in-memory store.

use std::sync::Arc;

use axum::body::{to_bytes, Body};
use axum::http::{header, Request, StatusCode};
use axum::Router;
use tower::ServiceExt;

use lw_api::{api_router, ApiState};
use lw_common::{Alert, AlertState, LogRecord};
use lw_consumer::ConsumerTelemetry;
use lw_engine::AlertEngine;
use lw_notifier::{NoOpNotifier, Notifier};
use lw_store::{InMemoryStateStore, StateStore};

struct TestApp {
    router: Router,
    store: Arc<InMemoryStateStore>,
}

fn test_app() -> TestApp {
    let store = Arc::new(InMemoryStateStore::new());
    let notifier: Arc<dyn Notifier> = Arc::new(NoOpNotifier);
    let engine = Arc::new(AlertEngine::new(
        store.clone() as Arc<dyn StateStore>,
        notifier,
        "",
    ));
    let state = ApiState {
        engine,
        store: store.clone() as Arc<dyn StateStore>,
        telemetry: Arc::new(ConsumerTelemetry::new()),
        default_log_level: "INFO".to_string(),
    };
    TestApp {
        router: api_router(state),
        store,
    }
}

async fn request(
    router: &Router,
    method: &str,
    uri: &str,
    body: Option<serde_json::Value>,
) -> (StatusCode, serde_json::Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    let body = match body {
        Some(json) => {
            builder = builder.header(header::CONTENT_TYPE, "application/json");
            Body::from(serde_json::to_vec(&json).unwrap())
        }
        None => Body::empty(),
    };
    let response = router
        .clone()
        .oneshot(builder.body(body).unwrap())
        .await
        .unwrap();

    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let json = if bytes.is_empty() {
        serde_json::Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, json)
}

fn sample_rule(name: &str) -> serde_json::Value {
    serde_json::json!({
        "name": name,
        "conditions": {
            "log_level": "ERROR",
            "threshold": 3,
            "time_window": 60
        },
        "actions": {"channel": "#alerts", "severity": "high"}
    })
}

#[tokio::test]
async fn health_reports_ok() {
    let app = test_app();
    let (status, body) = request(&app.router, "GET", "/api/v1/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["status"], "ok");
}

#[tokio::test]
async fn create_rule_generates_slug_id() {
    let app = test_app();
    let (status, body) = request(
        &app.router,
        "POST",
        "/api/v1/rules",
        Some(sample_rule("High Error Rate")),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["id"], "high-error-rate");
    assert!(body["data"]["created_at"].is_string());
}

#[tokio::test]
async fn invalid_rule_is_400_with_envelope() {
    let app = test_app();
    let mut rule = sample_rule("bad");
    rule["conditions"]["threshold"] = serde_json::json!(0);

    let (status, body) = request(&app.router, "POST", "/api/v1/rules", Some(rule)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);
    assert!(body["error"].as_str().unwrap().contains("threshold"));
}

#[tokio::test]
async fn get_list_update_delete_roundtrip() {
    let app = test_app();
    request(
        &app.router,
        "POST",
        "/api/v1/rules",
        Some(sample_rule("Roundtrip")),
    )
    .await;

    let (status, body) = request(&app.router, "GET", "/api/v1/rules", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"].as_array().unwrap().len(), 1);

    let (status, body) = request(&app.router, "GET", "/api/v1/rules/roundtrip", None).await;
    assert_eq!(status, StatusCode::OK);
    let created_at = body["data"]["created_at"].clone();

    let mut updated = sample_rule("Roundtrip");
    updated["description"] = serde_json::json!("now with a description");
    let (status, body) = request(
        &app.router,
        "PUT",
        "/api/v1/rules/roundtrip",
        Some(updated),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["description"], "now with a description");
    assert_eq!(body["data"]["created_at"], created_at);

    let (status, _) = request(&app.router, "DELETE", "/api/v1/rules/roundtrip", None).await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = request(&app.router, "GET", "/api/v1/rules/roundtrip", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["success"], false);
}

#[tokio::test]
async fn unknown_rule_is_404() {
    let app = test_app();
    let (status, _) = request(&app.router, "GET", "/api/v1/rules/ghost", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = request(&app.router, "DELETE", "/api/v1/rules/ghost", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn list_rules_applies_filters() {
    let app = test_app();
    request(
        &app.router,
        "POST",
        "/api/v1/rules",
        Some(sample_rule("Errors")),
    )
    .await;
    let mut low = sample_rule("Warnings");
    low["actions"]["severity"] = serde_json::json!("low");
    request(&app.router, "POST", "/api/v1/rules", Some(low)).await;

    let (status, body) =
        request(&app.router, "GET", "/api/v1/rules?severity=high", None).await;
    assert_eq!(status, StatusCode::OK);
    let rules = body["data"].as_array().unwrap();
    assert_eq!(rules.len(), 1);
    assert_eq!(rules[0]["name"], "Errors");
}

#[tokio::test]
async fn bulk_install_reports_rejections() {
    let app = test_app();
    let mut bad = sample_rule("Bad");
    bad["conditions"]["time_window"] = serde_json::json!(0);

    let (status, body) = request(
        &app.router,
        "POST",
        "/api/v1/rules/bulk",
        Some(serde_json::json!([sample_rule("One"), sample_rule("Two"), bad])),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["installed"], 2);
    assert_eq!(body["data"]["rejected"].as_array().unwrap().len(), 1);
    assert_eq!(body["data"]["rejected"][0]["name"], "Bad");
}

#[tokio::test]
async fn reload_returns_rule_count() {
    let app = test_app();
    request(
        &app.router,
        "POST",
        "/api/v1/rules",
        Some(sample_rule("Reloaded")),
    )
    .await;

    let (status, body) = request(&app.router, "POST", "/api/v1/rules/reload", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["rules_loaded"], 1);
}

#[tokio::test]
async fn test_endpoint_dry_runs_without_persisting() {
    let app = test_app();
    let body = serde_json::json!({
        "rule": {
            "name": "Candidate",
            "conditions": {
                "log_level": "ERROR",
                "threshold": 2,
                "time_window": 60,
                "operator": "gte"
            }
        },
        "sample_logs": [
            {"level": "ERROR", "message": "one", "kubernetes": {"namespace": "prod"}},
            {"level": "INFO", "message": "skip", "kubernetes": {"namespace": "prod"}},
            {"level": "ERROR", "message": "two", "kubernetes": {"namespace": "prod"}}
        ]
    });

    let (status, body) = request(&app.router, "POST", "/api/v1/rules/test", Some(body)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["matches"], serde_json::json!([true, false, true]));
    assert_eq!(body["data"]["matched_count"], 2);
    assert_eq!(body["data"]["would_fire"], 1);

    // Nothing was installed or persisted.
    let (_, body) = request(&app.router, "GET", "/api/v1/rules", None).await;
    assert_eq!(body["data"].as_array().unwrap().len(), 0);
}

#[tokio::test]
async fn recent_alerts_respects_limit() {
    let app = test_app();
    for i in 0..5 {
        let alert = Alert {
            id: format!("r-{i}"),
            rule_id: "r".into(),
            rule_name: "r".into(),
            severity: Default::default(),
            count: i,
            timestamp: chrono::Utc::now(),
            message: "m".into(),
            channel: String::new(),
            log: LogRecord::default(),
            status: AlertState::Sent,
        };
        app.store.save_alert(&alert).await.unwrap();
    }

    let (status, body) =
        request(&app.router, "GET", "/api/v1/alerts/recent?limit=2", None).await;
    assert_eq!(status, StatusCode::OK);
    let alerts = body["data"].as_array().unwrap();
    assert_eq!(alerts.len(), 2);
    assert_eq!(alerts[0]["id"], "r-4");
}

#[tokio::test]
async fn system_metrics_and_log_stats() {
    let app = test_app();
    request(
        &app.router,
        "POST",
        "/api/v1/rules",
        Some(sample_rule("Counted")),
    )
    .await;

    let (status, body) = request(&app.router, "GET", "/api/v1/system/metrics", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["rules"]["total"], 1);
    assert_eq!(body["data"]["consumer"]["processed"], 0);

    let mut stats = lw_common::LogStats::default();
    stats.total_logs = 7;
    app.store.save_log_stats(&stats).await.unwrap();

    let (status, body) = request(&app.router, "GET", "/api/v1/system/logs/stats", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["total_logs"], 7);
}
