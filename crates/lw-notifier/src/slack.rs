//! Slack-style webhook notifier.

use reqwest::Client;
use serde_json::json;
use tracing::{debug, warn};

use async_trait::async_trait;
use lw_common::{Alert, Severity};
use lw_config::NotifierConfig;

use crate::{Notifier, NotifierError};

/// Delivers alerts to a chat webhook as a colored attachment payload.
pub struct SlackNotifier {
    client: Client,
    config: NotifierConfig,
}

impl SlackNotifier {
    pub fn new(config: NotifierConfig) -> Result<Self, NotifierError> {
        let client = Client::builder().timeout(config.timeout()).build()?;
        Ok(Self { client, config })
    }

    fn severity_color(severity: Severity) -> &'static str {
        match severity {
            Severity::Critical => "danger",
            Severity::High => "warning",
            Severity::Medium => "good",
            Severity::Low => "#439FE0",
        }
    }

    fn severity_emoji(severity: Severity) -> &'static str {
        match severity {
            Severity::Critical => "\u{1F6A8}",
            Severity::High => "\u{1F534}",
            Severity::Medium => "\u{1F7E0}",
            Severity::Low => "\u{1F7E1}",
        }
    }

    fn build_payload(&self, alert: &Alert) -> serde_json::Value {
        // The rule's channel wins over the globally configured one.
        let channel = if alert.channel.is_empty() {
            &self.config.channel
        } else {
            &alert.channel
        };

        json!({
            "channel": channel,
            "username": self.config.username,
            "text": format!(
                "{} Alert: {}",
                Self::severity_emoji(alert.severity),
                alert.rule_name
            ),
            "icon_emoji": self.config.icon_emoji,
            "attachments": [{
                "color": Self::severity_color(alert.severity),
                "title": alert.rule_name,
                "text": alert.message,
                "ts": alert.timestamp.timestamp(),
                "fields": [
                    {"title": "Severity", "value": alert.severity.to_string(), "short": true},
                    {"title": "Count", "value": alert.count.to_string(), "short": true},
                    {"title": "Namespace", "value": alert.log.kubernetes.namespace, "short": true},
                    {"title": "Service", "value": alert.log.service, "short": true},
                    {"title": "Pod", "value": alert.log.kubernetes.pod, "short": true},
                    {"title": "Level", "value": alert.log.level, "short": true},
                ],
            }],
        })
    }

    async fn post(&self, payload: &serde_json::Value) -> Result<(), NotifierError> {
        if self.config.webhook_url.is_empty() {
            return Err(NotifierError::NotConfigured);
        }

        let response = self
            .client
            .post(&self.config.webhook_url)
            .json(payload)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            warn!(status = %status, "Webhook rejected notification");
            return Err(NotifierError::Status(status.as_u16()));
        }
        Ok(())
    }
}

#[async_trait]
impl Notifier for SlackNotifier {
    async fn send(&self, alert: &Alert) -> Result<(), NotifierError> {
        let payload = self.build_payload(alert);
        self.post(&payload).await?;
        debug!(alert = %alert.id, rule = %alert.rule_id, "Notification delivered");
        Ok(())
    }

    async fn test_connection(&self) -> Result<(), NotifierError> {
        let payload = json!({
            "channel": self.config.channel,
            "username": self.config.username,
            "text": "LogWarden connection test",
            "icon_emoji": self.config.icon_emoji,
        });
        self.post(&payload).await
    }
}
