//! SlackNotifier tests.
//!
//! Tests for:
//! - Payload shape and severity decoration
//! - HTTP status handling
//! - Channel override from the rule's actions
//! - Connection test

use chrono::Utc;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use lw_common::{Alert, AlertState, KubernetesMeta, LogRecord, Severity};
use lw_config::NotifierConfig;
use lw_notifier::{Notifier, NotifierError, SlackNotifier};

fn test_config(webhook_url: String) -> NotifierConfig {
    NotifierConfig {
        webhook_url,
        channel: "#alerts".to_string(),
        username: "LogWarden".to_string(),
        icon_emoji: ":rotating_light:".to_string(),
        timeout_secs: 5,
    }
}

fn test_alert(severity: Severity) -> Alert {
    Alert {
        id: "high-errors-1717243200".to_string(),
        rule_id: "high-errors".to_string(),
        rule_name: "High errors".to_string(),
        severity,
        count: 4,
        timestamp: Utc::now(),
        message: "High errors triggered: 4 ERROR record(s)".to_string(),
        channel: String::new(),
        log: LogRecord {
            level: "ERROR".to_string(),
            message: "boom".to_string(),
            service: "payments".to_string(),
            kubernetes: KubernetesMeta {
                namespace: "prod".to_string(),
                pod: "payments-0".to_string(),
                ..Default::default()
            },
            ..Default::default()
        },
        status: AlertState::Pending,
    }
}

#[tokio::test]
async fn successful_delivery_posts_json_payload() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/services/T/B/x"))
        .and(header("content-type", "application/json"))
        .and(body_partial_json(serde_json::json!({
            "channel": "#alerts",
            "username": "LogWarden",
            "attachments": [{"color": "danger", "title": "High errors"}],
        })))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&mock_server)
        .await;

    let notifier =
        SlackNotifier::new(test_config(format!("{}/services/T/B/x", mock_server.uri()))).unwrap();

    notifier.send(&test_alert(Severity::Critical)).await.unwrap();
}

#[tokio::test]
async fn severity_maps_to_attachment_color() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(body_partial_json(serde_json::json!({
            "attachments": [{"color": "#439FE0"}],
        })))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&mock_server)
        .await;

    let notifier = SlackNotifier::new(test_config(mock_server.uri())).unwrap();
    notifier.send(&test_alert(Severity::Low)).await.unwrap();
}

#[tokio::test]
async fn rule_channel_overrides_configured_channel() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(body_partial_json(serde_json::json!({
            "channel": "#payments-oncall",
        })))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&mock_server)
        .await;

    let notifier = SlackNotifier::new(test_config(mock_server.uri())).unwrap();
    let mut alert = test_alert(Severity::High);
    alert.channel = "#payments-oncall".to_string();
    notifier.send(&alert).await.unwrap();
}

#[tokio::test]
async fn non_2xx_is_an_error() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500))
        .expect(1)
        .mount(&mock_server)
        .await;

    let notifier = SlackNotifier::new(test_config(mock_server.uri())).unwrap();
    let err = notifier.send(&test_alert(Severity::Medium)).await.unwrap_err();
    assert!(matches!(err, NotifierError::Status(500)));
}

#[tokio::test]
async fn missing_webhook_is_not_configured() {
    let notifier = SlackNotifier::new(test_config(String::new())).unwrap();
    let err = notifier.send(&test_alert(Severity::Medium)).await.unwrap_err();
    assert!(matches!(err, NotifierError::NotConfigured));
}

#[tokio::test]
async fn test_connection_posts_probe() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(body_partial_json(serde_json::json!({
            "text": "LogWarden connection test",
        })))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&mock_server)
        .await;

    let notifier = SlackNotifier::new(test_config(mock_server.uri())).unwrap();
    notifier.test_connection().await.unwrap();
}
