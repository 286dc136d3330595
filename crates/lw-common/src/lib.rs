use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub mod logging;
pub mod record;
pub mod rules;

pub use record::{DecodeError, KubernetesMeta, LogRecord};
pub use rules::{RuleFilter, RuleStats, ValidationError};

// ============================================================================
// Alert Rules
// ============================================================================

/// Comparison applied to the windowed counter when deciding whether a rule
/// fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ThresholdOperator {
    #[default]
    Gt,
    Gte,
    Lt,
    Lte,
    Eq,
}

impl ThresholdOperator {
    /// Evaluate `count <op> threshold`.
    pub fn compare(self, count: i64, threshold: i64) -> bool {
        match self {
            ThresholdOperator::Gt => count > threshold,
            ThresholdOperator::Gte => count >= threshold,
            ThresholdOperator::Lt => count < threshold,
            ThresholdOperator::Lte => count <= threshold,
            ThresholdOperator::Eq => count == threshold,
        }
    }
}

/// Alert severity, carried through to the notification payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    #[default]
    Medium,
    High,
    Critical,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        };
        f.write_str(s)
    }
}

/// Conditions a log record must satisfy for a rule to count it.
///
/// `None` (or empty-string) fields are wildcards. `keywords` uses AND
/// semantics: every entry must appear as a case-insensitive substring of the
/// record's message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleConditions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_level: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    /// Matched against the record's `app` label, not its `service` field.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub keywords: Vec<String>,
    pub threshold: i64,
    /// Window length in seconds. Counters are bucketed by
    /// `floor(now / time_window)`.
    pub time_window: u64,
    #[serde(default)]
    pub operator: ThresholdOperator,
}

impl RuleConditions {
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.time_window)
    }
}

/// What to do when a rule fires.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct RuleActions {
    #[serde(default)]
    pub channel: String,
    #[serde(default)]
    pub severity: Severity,
}

/// A user-authored monitoring policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertRule {
    /// Stable identifier. Generated from the name when not supplied.
    #[serde(default)]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    pub conditions: RuleConditions,
    #[serde(default)]
    pub actions: RuleActions,
    /// Set by the engine on first save.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    /// Set by the engine on every save.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

fn default_enabled() -> bool {
    true
}

// ============================================================================
// Alerts
// ============================================================================

/// Delivery lifecycle of an alert: created as `Pending`, then `Sent` or
/// `Failed` depending on the notifier outcome. Persisted either way.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertState {
    Pending,
    Sent,
    Failed,
}

impl fmt::Display for AlertState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AlertState::Pending => "pending",
            AlertState::Sent => "sent",
            AlertState::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// The event emitted when a rule's threshold is crossed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Alert {
    /// `<rule_id>-<unix_timestamp>`.
    pub id: String,
    pub rule_id: String,
    pub rule_name: String,
    pub severity: Severity,
    /// Post-increment counter value that crossed the threshold.
    pub count: i64,
    pub timestamp: DateTime<Utc>,
    /// Rendered notification message.
    pub message: String,
    /// Channel requested by the rule's actions; empty means the notifier's
    /// configured channel.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub channel: String,
    /// The record that tipped the counter.
    pub log: LogRecord,
    pub status: AlertState,
}

impl Alert {
    pub fn new(rule: &AlertRule, count: i64, message: String, log: LogRecord) -> Self {
        let now = Utc::now();
        Self {
            id: format!("{}-{}", rule.id, now.timestamp()),
            rule_id: rule.id.clone(),
            rule_name: rule.name.clone(),
            severity: rule.actions.severity,
            count,
            timestamp: now,
            message,
            channel: rule.actions.channel.clone(),
            log,
            status: AlertState::Pending,
        }
    }
}

/// Per-rule recency record, updated on every send attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertStatus {
    pub rule_id: String,
    pub last_trigger: DateTime<Utc>,
    pub status: AlertState,
}

// ============================================================================
// Log Statistics
// ============================================================================

/// Rolling aggregate maintained by each consumer instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogStats {
    pub total_logs: u64,
    pub logs_by_level: HashMap<String, u64>,
    pub logs_by_service: HashMap<String, u64>,
    pub last_updated: DateTime<Utc>,
}

impl Default for LogStats {
    fn default() -> Self {
        Self {
            total_logs: 0,
            logs_by_level: HashMap::new(),
            logs_by_service: HashMap::new(),
            last_updated: Utc::now(),
        }
    }
}

impl LogStats {
    /// Fold one record into the aggregate.
    pub fn record(&mut self, record: &LogRecord) {
        self.total_logs += 1;
        *self.logs_by_level.entry(record.level.clone()).or_insert(0) += 1;
        *self
            .logs_by_service
            .entry(record.service.clone())
            .or_insert(0) += 1;
        self.last_updated = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(namespace: &str, message: &str) -> LogRecord {
        LogRecord {
            message: message.to_string(),
            kubernetes: KubernetesMeta {
                namespace: namespace.to_string(),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    #[test]
    fn operator_comparisons() {
        assert!(ThresholdOperator::Gt.compare(4, 3));
        assert!(!ThresholdOperator::Gt.compare(3, 3));
        assert!(ThresholdOperator::Gte.compare(3, 3));
        assert!(ThresholdOperator::Lt.compare(2, 3));
        assert!(!ThresholdOperator::Lt.compare(3, 3));
        assert!(ThresholdOperator::Lte.compare(3, 3));
        assert!(ThresholdOperator::Eq.compare(3, 3));
        assert!(!ThresholdOperator::Eq.compare(4, 3));
    }

    #[test]
    fn operator_serde_is_lowercase() {
        let op: ThresholdOperator = serde_json::from_str("\"gte\"").unwrap();
        assert_eq!(op, ThresholdOperator::Gte);
        assert_eq!(serde_json::to_string(&ThresholdOperator::Gt).unwrap(), "\"gt\"");
    }

    #[test]
    fn rule_defaults_apply() {
        let rule: AlertRule = serde_json::from_str(
            r#"{
                "name": "errors",
                "conditions": {"threshold": 5, "time_window": 300}
            }"#,
        )
        .unwrap();
        assert!(rule.enabled);
        assert_eq!(rule.conditions.operator, ThresholdOperator::Gt);
        assert_eq!(rule.actions.severity, Severity::Medium);
        assert!(rule.conditions.keywords.is_empty());
    }

    #[test]
    fn alert_id_embeds_rule_id() {
        let rule: AlertRule = serde_json::from_str(
            r#"{
                "id": "high-errors",
                "name": "High errors",
                "conditions": {"threshold": 1, "time_window": 60}
            }"#,
        )
        .unwrap();
        let alert = Alert::new(&rule, 2, "msg".into(), record("prod", "boom"));
        assert!(alert.id.starts_with("high-errors-"));
        assert_eq!(alert.status, AlertState::Pending);
        assert_eq!(alert.count, 2);
    }

    #[test]
    fn log_stats_aggregates() {
        let mut stats = LogStats::default();
        let mut rec = record("prod", "a");
        rec.level = "ERROR".into();
        rec.service = "api".into();
        stats.record(&rec);
        stats.record(&rec);
        assert_eq!(stats.total_logs, 2);
        assert_eq!(stats.logs_by_level["ERROR"], 2);
        assert_eq!(stats.logs_by_service["api"], 2);
    }
}
