//! Stateless rule matching.

use lw_common::{LogRecord, RuleConditions};

fn condition<'a>(field: &'a Option<String>) -> Option<&'a str> {
    field.as_deref().filter(|v| !v.is_empty())
}

/// Does `record` satisfy `conditions`?
///
/// Short-circuit AND across level, namespace, `app`-label and keyword
/// checks. Unset (or empty) condition fields are wildcards. Keyword matching
/// is literal case-insensitive substring search with AND semantics: every
/// keyword must appear in the message.
///
/// The `service` condition is matched against the record's `app` label, not
/// its `service` field.
pub fn matches(record: &LogRecord, conditions: &RuleConditions) -> bool {
    if let Some(level) = condition(&conditions.log_level) {
        if record.level != level {
            return false;
        }
    }

    if let Some(namespace) = condition(&conditions.namespace) {
        if record.kubernetes.namespace != namespace {
            return false;
        }
    }

    if let Some(service) = condition(&conditions.service) {
        if record.kubernetes.labels.get("app").map(String::as_str) != Some(service) {
            return false;
        }
    }

    if conditions.keywords.is_empty() {
        return true;
    }
    let message = record.message.to_lowercase();
    conditions
        .keywords
        .iter()
        .all(|keyword| message.contains(&keyword.to_lowercase()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use lw_common::{KubernetesMeta, ThresholdOperator};
    use std::collections::HashMap;

    fn conditions() -> RuleConditions {
        RuleConditions {
            log_level: None,
            namespace: None,
            service: None,
            keywords: vec![],
            threshold: 1,
            time_window: 60,
            operator: ThresholdOperator::Gt,
        }
    }

    fn record() -> LogRecord {
        LogRecord {
            level: "ERROR".into(),
            message: "Database request Failed".into(),
            service: "payment-api".into(),
            kubernetes: KubernetesMeta {
                namespace: "prod".into(),
                labels: HashMap::from([("app".to_string(), "payment-api".to_string())]),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    #[test]
    fn empty_conditions_match_everything() {
        assert!(matches(&record(), &conditions()));
    }

    #[test]
    fn level_is_exact_match() {
        let mut c = conditions();
        c.log_level = Some("ERROR".into());
        assert!(matches(&record(), &c));

        c.log_level = Some("WARN".into());
        assert!(!matches(&record(), &c));
    }

    #[test]
    fn empty_string_condition_is_wildcard() {
        let mut c = conditions();
        c.log_level = Some(String::new());
        c.namespace = Some(String::new());
        assert!(matches(&record(), &c));
    }

    #[test]
    fn namespace_is_exact_match() {
        let mut c = conditions();
        c.namespace = Some("prod".into());
        assert!(matches(&record(), &c));

        c.namespace = Some("staging".into());
        assert!(!matches(&record(), &c));
    }

    #[test]
    fn service_condition_targets_app_label_not_service_field() {
        let mut c = conditions();
        c.service = Some("payment-api".into());

        // Top-level service matches but the app label differs: no match.
        let mut r = record();
        r.kubernetes.labels.insert("app".into(), "other".into());
        assert!(!matches(&r, &c));

        // App label matches: match, regardless of the service field.
        let mut r = record();
        r.service = "something-else".into();
        assert!(matches(&r, &c));

        // No labels at all: no match.
        let mut r = record();
        r.kubernetes.labels.clear();
        assert!(!matches(&r, &c));
    }

    #[test]
    fn keywords_use_and_semantics_case_insensitive() {
        let mut c = conditions();
        c.keywords = vec!["database".into(), "failed".into()];
        assert!(matches(&record(), &c));

        let mut r = record();
        r.message = "database connection refused".into();
        assert!(!matches(&r, &c));
    }

    #[test]
    fn empty_keyword_list_matches_any_message() {
        let mut r = record();
        r.message = "anything at all".into();
        assert!(matches(&r, &conditions()));
    }

    #[test]
    fn keywords_are_literal_substrings() {
        let mut c = conditions();
        c.keywords = vec![".*".into()];
        assert!(!matches(&record(), &c));
    }

    #[test]
    fn matching_ignores_counter_state() {
        // Purely a function of the record and conditions: repeated calls
        // agree.
        let c = conditions();
        let r = record();
        for _ in 0..3 {
            assert!(matches(&r, &c));
        }
    }
}
