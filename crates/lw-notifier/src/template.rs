//! Alert message rendering.
//!
//! Templates are compiled once per configuration change. A template that
//! fails to compile is replaced by the built-in default so a bad config push
//! never takes alerting down.

use minijinja::{context, Environment};
use tracing::warn;

use lw_common::{AlertRule, LogRecord};

/// Built-in template used when none is configured or compilation fails.
pub const DEFAULT_ALERT_TEMPLATE: &str = "*{{ rule_name }}* triggered: {{ count }} \
{{ level }} record(s) from `{{ service }}` in `{{ namespace }}` within {{ time_window }}s \
[severity: {{ severity }}]\n> {{ message }}";

const TEMPLATE_NAME: &str = "alert_message";

/// A compiled alert message template.
///
/// Exposes the variables `rule_name`, `service`, `namespace`, `level`,
/// `count`, `time_window`, `message`, `severity` and `pod`.
pub struct MessageTemplate {
    env: Environment<'static>,
}

impl MessageTemplate {
    /// Compile `source`, falling back to the default template on failure.
    /// An empty source selects the default directly.
    pub fn compile(source: &str) -> Self {
        if !source.is_empty() {
            let mut env = Environment::new();
            match env.add_template_owned(TEMPLATE_NAME.to_string(), source.to_string()) {
                Ok(()) => return Self { env },
                Err(e) => {
                    warn!(error = %e, "Alert template failed to compile, using default");
                }
            }
        }
        Self::default()
    }

    /// Render the message for a firing rule.
    pub fn render(&self, rule: &AlertRule, record: &LogRecord, count: i64) -> String {
        let ctx = context! {
            rule_name => rule.name,
            service => record.service,
            namespace => record.kubernetes.namespace,
            level => record.level,
            count => count,
            time_window => rule.conditions.time_window,
            message => record.message,
            severity => rule.actions.severity.to_string(),
            pod => record.kubernetes.pod,
        };

        let template = self
            .env
            .get_template(TEMPLATE_NAME)
            .expect("template registered at construction");
        template.render(&ctx).unwrap_or_else(|e| {
            warn!(error = %e, rule = %rule.id, "Alert template failed to render");
            format!(
                "{} triggered: {} {} record(s) in {}",
                rule.name, count, record.level, record.kubernetes.namespace
            )
        })
    }
}

impl Default for MessageTemplate {
    fn default() -> Self {
        let mut env = Environment::new();
        env.add_template(TEMPLATE_NAME, DEFAULT_ALERT_TEMPLATE)
            .expect("default template compiles");
        Self { env }
    }
}
