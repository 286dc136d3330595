//! Rule validation, identifier generation, aggregate statistics and
//! filtering, plus the seed rules installed on first boot.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{AlertRule, RuleActions, RuleConditions, Severity, ThresholdOperator};

#[derive(Error, Debug)]
#[error("{0}")]
pub struct ValidationError(pub String);

/// Check the rule invariants, reporting the first failure.
pub fn validate(rule: &AlertRule) -> Result<(), ValidationError> {
    if rule.name.trim().is_empty() {
        return Err(ValidationError("rule name must not be empty".into()));
    }
    if rule.conditions.threshold <= 0 {
        return Err(ValidationError(format!(
            "threshold must be positive, got {}",
            rule.conditions.threshold
        )));
    }
    if rule.conditions.time_window == 0 {
        return Err(ValidationError("time_window must be positive".into()));
    }
    Ok(())
}

/// Derive a stable slug identifier from a rule name: lower-cased, with every
/// non-alphanumeric character mapped to a hyphen.
pub fn generate_rule_id(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_lowercase()
            } else {
                '-'
            }
        })
        .collect()
}

/// Aggregate view over an in-memory rule slice.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RuleStats {
    pub total: usize,
    pub enabled: usize,
    pub disabled: usize,
    pub by_severity: HashMap<String, usize>,
    pub by_namespace: HashMap<String, usize>,
    pub by_service: HashMap<String, usize>,
}

pub fn rule_stats(rules: &[AlertRule]) -> RuleStats {
    let mut stats = RuleStats {
        total: rules.len(),
        ..Default::default()
    };
    for rule in rules {
        if rule.enabled {
            stats.enabled += 1;
        } else {
            stats.disabled += 1;
        }
        *stats
            .by_severity
            .entry(rule.actions.severity.to_string())
            .or_insert(0) += 1;
        if let Some(namespace) = &rule.conditions.namespace {
            *stats.by_namespace.entry(namespace.clone()).or_insert(0) += 1;
        }
        if let Some(service) = &rule.conditions.service {
            *stats.by_service.entry(service.clone()).or_insert(0) += 1;
        }
    }
    stats
}

/// Criteria for narrowing a rule slice. All supplied fields must match.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RuleFilter {
    pub enabled: Option<bool>,
    pub namespace: Option<String>,
    pub service: Option<String>,
    pub severity: Option<Severity>,
    pub log_level: Option<String>,
}

pub fn filter_rules(rules: &[AlertRule], filter: &RuleFilter) -> Vec<AlertRule> {
    rules
        .iter()
        .filter(|rule| {
            if let Some(enabled) = filter.enabled {
                if rule.enabled != enabled {
                    return false;
                }
            }
            if let Some(namespace) = &filter.namespace {
                if rule.conditions.namespace.as_deref() != Some(namespace.as_str()) {
                    return false;
                }
            }
            if let Some(service) = &filter.service {
                if rule.conditions.service.as_deref() != Some(service.as_str()) {
                    return false;
                }
            }
            if let Some(severity) = filter.severity {
                if rule.actions.severity != severity {
                    return false;
                }
            }
            if let Some(log_level) = &filter.log_level {
                if rule.conditions.log_level.as_deref() != Some(log_level.as_str()) {
                    return false;
                }
            }
            true
        })
        .cloned()
        .collect()
}

/// Canned rules installed when the store holds none.
pub fn default_rules() -> Vec<AlertRule> {
    vec![
        AlertRule {
            id: "high-error-rate".into(),
            name: "High error rate".into(),
            description: "More than ten ERROR records from one namespace within five minutes".into(),
            enabled: true,
            conditions: RuleConditions {
                log_level: Some("ERROR".into()),
                namespace: None,
                service: None,
                keywords: vec![],
                threshold: 10,
                time_window: 300,
                operator: ThresholdOperator::Gt,
            },
            actions: RuleActions {
                channel: "#alerts".into(),
                severity: Severity::High,
            },
            created_at: None,
            updated_at: None,
        },
        AlertRule {
            id: "pod-oom-killed".into(),
            name: "Pod OOM killed".into(),
            description: "Any OOMKilled event".into(),
            enabled: true,
            conditions: RuleConditions {
                log_level: None,
                namespace: None,
                service: None,
                keywords: vec!["OOMKilled".into()],
                threshold: 1,
                time_window: 60,
                operator: ThresholdOperator::Gte,
            },
            actions: RuleActions {
                channel: "#alerts".into(),
                severity: Severity::Critical,
            },
            created_at: None,
            updated_at: None,
        },
        AlertRule {
            id: "fatal-errors".into(),
            name: "Fatal errors".into(),
            description: "Any FATAL record".into(),
            enabled: true,
            conditions: RuleConditions {
                log_level: Some("FATAL".into()),
                namespace: None,
                service: None,
                keywords: vec![],
                threshold: 1,
                time_window: 60,
                operator: ThresholdOperator::Gte,
            },
            actions: RuleActions {
                channel: "#alerts".into(),
                severity: Severity::Critical,
            },
            created_at: None,
            updated_at: None,
        },
    ]
}
