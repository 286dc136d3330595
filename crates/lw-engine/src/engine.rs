//! Alert engine: orchestrates matching, counting, triggering and delivery.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use dashmap::DashMap;
use parking_lot::RwLock;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use lw_common::{
    rules::{generate_rule_id, validate},
    Alert, AlertRule, AlertState, AlertStatus, LogRecord,
};
use lw_notifier::{MessageTemplate, Notifier};
use lw_store::StateStore;

use crate::{matches, Result};

/// How often the in-process window bookkeeping is swept.
const HOUSEKEEPING_INTERVAL: Duration = Duration::from_secs(5 * 60);

/// Entries idle longer than this are evicted by the sweep.
const WINDOW_IDLE_CUTOFF: Duration = Duration::from_secs(60 * 60);

/// Outcome of evaluating one record.
#[derive(Debug, Default, Clone, Copy)]
pub struct EvaluateSummary {
    /// Rules whose conditions the record satisfied.
    pub matched: usize,
    /// Alerts emitted (sent or failed).
    pub fired: usize,
    /// Rules skipped because of store failures.
    pub errors: usize,
}

/// Result of a dry-run evaluation, used by the control plane's rule test
/// endpoint. Nothing is persisted.
#[derive(Debug, Clone, serde::Serialize)]
pub struct DryRunResult {
    /// Per-sample match outcome, in input order.
    pub matches: Vec<bool>,
    /// Records that satisfied the conditions.
    pub matched_count: i64,
    /// Times the operator-threshold check would have tripped.
    pub would_fire: usize,
}

/// The alert evaluation engine.
///
/// Holds a copy-on-write snapshot of the rule set: evaluation clones the
/// `Arc` and never observes a partially updated rule list. The snapshot is
/// replaced on every CRUD operation and on explicit reload.
pub struct AlertEngine {
    store: Arc<dyn StateStore>,
    notifier: Arc<dyn Notifier>,
    rules: RwLock<Arc<Vec<AlertRule>>>,
    template: RwLock<Arc<MessageTemplate>>,
    /// Per-process recency bookkeeping, swept by the housekeeping task. The
    /// authoritative counters live in the store.
    window_store: DashMap<String, Instant>,
}

impl AlertEngine {
    pub fn new(
        store: Arc<dyn StateStore>,
        notifier: Arc<dyn Notifier>,
        template_source: &str,
    ) -> Self {
        Self {
            store,
            notifier,
            rules: RwLock::new(Arc::new(Vec::new())),
            template: RwLock::new(Arc::new(MessageTemplate::compile(template_source))),
            window_store: DashMap::new(),
        }
    }

    /// Swap in a new message template. Compile failures fall back to the
    /// default inside [`MessageTemplate::compile`].
    pub fn update_template(&self, source: &str) {
        *self.template.write() = Arc::new(MessageTemplate::compile(source));
    }

    /// Current rule snapshot.
    pub fn rules(&self) -> Arc<Vec<AlertRule>> {
        self.rules.read().clone()
    }

    // ------------------------------------------------------------------
    // Evaluation
    // ------------------------------------------------------------------

    /// Evaluate one record against every enabled rule.
    ///
    /// A single record may fire several rules. Store failures skip only the
    /// affected rule; the record never takes the engine down.
    pub async fn evaluate(&self, record: &LogRecord) -> EvaluateSummary {
        let rules = self.rules();
        let mut summary = EvaluateSummary::default();

        for rule in rules.iter().filter(|r| r.enabled) {
            if !matches(record, &rule.conditions) {
                continue;
            }
            summary.matched += 1;
            self.window_store.insert(rule.id.clone(), Instant::now());

            let count = match self
                .store
                .increment_counter(&rule.id, rule.conditions.window())
                .await
            {
                Ok(count) => count,
                Err(e) => {
                    warn!(rule = %rule.id, error = %e, "Counter increment failed, skipping rule");
                    summary.errors += 1;
                    continue;
                }
            };

            if rule.conditions.operator.compare(count, rule.conditions.threshold) {
                self.fire(rule, record, count).await;
                summary.fired += 1;
            }
        }

        summary
    }

    async fn fire(&self, rule: &AlertRule, record: &LogRecord, count: i64) {
        let message = self.template.read().clone().render(rule, record, count);
        let mut alert = Alert::new(rule, count, message, record.clone());

        match self.notifier.send(&alert).await {
            Ok(()) => {
                alert.status = AlertState::Sent;
                info!(rule = %rule.id, count, "Alert sent");
            }
            Err(e) => {
                alert.status = AlertState::Failed;
                warn!(rule = %rule.id, error = %e, "Alert delivery failed");
            }
        }

        // The audit record and status are persisted regardless of delivery
        // outcome.
        if let Err(e) = self.store.save_alert(&alert).await {
            warn!(alert = %alert.id, error = %e, "Failed to persist alert");
        }
        let status = AlertStatus {
            rule_id: rule.id.clone(),
            last_trigger: alert.timestamp,
            status: alert.status,
        };
        if let Err(e) = self.store.set_alert_status(&status).await {
            warn!(rule = %rule.id, error = %e, "Failed to update alert status");
        }
    }

    /// Evaluate a candidate rule against sample records without touching the
    /// store or the notifier.
    pub fn dry_run(&self, rule: &AlertRule, samples: &[LogRecord]) -> DryRunResult {
        let mut result = DryRunResult {
            matches: Vec::with_capacity(samples.len()),
            matched_count: 0,
            would_fire: 0,
        };
        for sample in samples {
            let matched = matches(sample, &rule.conditions);
            result.matches.push(matched);
            if matched {
                result.matched_count += 1;
                if rule
                    .conditions
                    .operator
                    .compare(result.matched_count, rule.conditions.threshold)
                {
                    result.would_fire += 1;
                }
            }
        }
        result
    }

    // ------------------------------------------------------------------
    // Rule management
    // ------------------------------------------------------------------

    /// Validate and persist a new rule, then refresh the snapshot.
    pub async fn add_rule(&self, mut rule: AlertRule) -> Result<AlertRule> {
        if rule.id.is_empty() {
            rule.id = generate_rule_id(&rule.name);
        }
        validate(&rule)?;

        let now = Utc::now();
        rule.created_at = Some(now);
        rule.updated_at = Some(now);

        self.store.save_rule(&rule).await?;
        self.reload_rules().await?;
        Ok(rule)
    }

    /// Update an existing rule, preserving its creation timestamp.
    pub async fn update_rule(&self, id: &str, mut rule: AlertRule) -> Result<AlertRule> {
        let existing = self.store.get_rule(id).await?;

        rule.id = id.to_string();
        validate(&rule)?;
        rule.created_at = existing.created_at;
        rule.updated_at = Some(Utc::now());

        self.store.save_rule(&rule).await?;
        self.reload_rules().await?;
        Ok(rule)
    }

    pub async fn delete_rule(&self, id: &str) -> Result<()> {
        self.store.delete_rule(id).await?;
        self.reload_rules().await?;
        Ok(())
    }

    /// Re-read the full rule set from the store and swap the snapshot.
    pub async fn reload_rules(&self) -> Result<usize> {
        let rules = self.store.get_rules().await?;
        let count = rules.len();
        *self.rules.write() = Arc::new(rules);
        debug!(count, "Rule snapshot reloaded");
        Ok(count)
    }

    // ------------------------------------------------------------------
    // Housekeeping
    // ------------------------------------------------------------------

    /// Spawn the periodic sweep of the in-process window bookkeeping.
    /// Exits on the next tick after `shutdown` fires.
    pub fn spawn_housekeeping(
        self: &Arc<Self>,
        mut shutdown: broadcast::Receiver<()>,
    ) -> JoinHandle<()> {
        let engine = self.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(HOUSEKEEPING_INTERVAL);
            // The first tick fires immediately; skip it.
            interval.tick().await;
            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        let evicted = engine.evict_idle_windows(WINDOW_IDLE_CUTOFF);
                        if evicted > 0 {
                            debug!(evicted, "Swept idle window bookkeeping");
                        }
                    }
                    _ = shutdown.recv() => {
                        debug!("Housekeeping task shutting down");
                        break;
                    }
                }
            }
        })
    }

    fn evict_idle_windows(&self, cutoff: Duration) -> usize {
        let before = self.window_store.len();
        self.window_store.retain(|_, last| last.elapsed() < cutoff);
        before - self.window_store.len()
    }

    /// Rules currently tracked by the window bookkeeping (test hook).
    pub fn tracked_windows(&self) -> usize {
        self.window_store.len()
    }
}
