//! In-memory state store used by tests and dev mode.
//!
//! Implements the same bucket arithmetic and TTL bookkeeping as the Redis
//! store, with an overridable clock so window behavior can be exercised
//! without waiting out real time.

use std::collections::HashMap;
use std::time::Duration;

use chrono::Utc;
use parking_lot::Mutex;

use async_trait::async_trait;
use lw_common::{Alert, AlertRule, AlertStatus, LogStats};

use crate::{bucket_index, counter_key, Result, StateStore, StoreError, MAX_RECENT_ALERTS};

#[derive(Default)]
struct Inner {
    rules: HashMap<String, AlertRule>,
    /// counter key -> (count, expires_at_unix)
    counters: HashMap<String, (i64, i64)>,
    statuses: HashMap<String, AlertStatus>,
    /// Most recent last.
    alerts: Vec<Alert>,
    stats: Option<LogStats>,
    /// Test clock override, unix seconds.
    now_override: Option<i64>,
}

#[derive(Default)]
pub struct InMemoryStateStore {
    inner: Mutex<Inner>,
}

impl InMemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pin the store clock to a fixed unix timestamp. Subsequent counter
    /// operations bucket and expire against this instant.
    pub fn set_now(&self, unix_now: i64) {
        self.inner.lock().now_override = Some(unix_now);
    }

    fn now(inner: &Inner) -> i64 {
        inner.now_override.unwrap_or_else(|| Utc::now().timestamp())
    }
}

#[async_trait]
impl StateStore for InMemoryStateStore {
    async fn save_rule(&self, rule: &AlertRule) -> Result<()> {
        let mut rule = rule.clone();
        let now = Utc::now();
        if rule.created_at.is_none() {
            rule.created_at = Some(now);
        }
        rule.updated_at = Some(now);
        self.inner.lock().rules.insert(rule.id.clone(), rule);
        Ok(())
    }

    async fn get_rules(&self) -> Result<Vec<AlertRule>> {
        Ok(self.inner.lock().rules.values().cloned().collect())
    }

    async fn get_rule(&self, id: &str) -> Result<AlertRule> {
        self.inner
            .lock()
            .rules
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("rule {id}")))
    }

    async fn delete_rule(&self, id: &str) -> Result<()> {
        match self.inner.lock().rules.remove(id) {
            Some(_) => Ok(()),
            None => Err(StoreError::NotFound(format!("rule {id}"))),
        }
    }

    async fn increment_counter(&self, rule_id: &str, window: Duration) -> Result<i64> {
        let mut inner = self.inner.lock();
        let now = Self::now(&inner);
        let key = counter_key(rule_id, bucket_index(now, window));
        let ttl = 2 * window.as_secs() as i64;

        let entry = inner.counters.entry(key).or_insert((0, now + ttl));
        if now >= entry.1 {
            *entry = (0, now + ttl);
        }
        entry.0 += 1;
        Ok(entry.0)
    }

    async fn get_counter(&self, rule_id: &str, window: Duration) -> Result<i64> {
        let inner = self.inner.lock();
        let now = Self::now(&inner);
        let key = counter_key(rule_id, bucket_index(now, window));
        Ok(inner
            .counters
            .get(&key)
            .filter(|(_, expires_at)| now < *expires_at)
            .map(|(count, _)| *count)
            .unwrap_or(0))
    }

    async fn set_alert_status(&self, status: &AlertStatus) -> Result<()> {
        self.inner
            .lock()
            .statuses
            .insert(status.rule_id.clone(), status.clone());
        Ok(())
    }

    async fn save_alert(&self, alert: &Alert) -> Result<()> {
        let mut inner = self.inner.lock();
        inner.alerts.push(alert.clone());
        let len = inner.alerts.len();
        if len > MAX_RECENT_ALERTS {
            inner.alerts.drain(0..len - MAX_RECENT_ALERTS);
        }
        Ok(())
    }

    async fn get_recent_alerts(&self, limit: usize) -> Result<Vec<Alert>> {
        Ok(self
            .inner
            .lock()
            .alerts
            .iter()
            .rev()
            .take(limit)
            .cloned()
            .collect())
    }

    async fn save_log_stats(&self, stats: &LogStats) -> Result<()> {
        self.inner.lock().stats = Some(stats.clone());
        Ok(())
    }

    async fn get_log_stats(&self) -> Result<LogStats> {
        Ok(self.inner.lock().stats.clone().unwrap_or_default())
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}

impl InMemoryStateStore {
    /// Status record for a rule, if any send was attempted.
    pub fn alert_status(&self, rule_id: &str) -> Option<AlertStatus> {
        self.inner.lock().statuses.get(rule_id).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lw_common::{AlertState, LogRecord, RuleActions, RuleConditions, ThresholdOperator};

    fn rule(id: &str, window: u64) -> AlertRule {
        AlertRule {
            id: id.into(),
            name: id.into(),
            description: String::new(),
            enabled: true,
            conditions: RuleConditions {
                log_level: None,
                namespace: None,
                service: None,
                keywords: vec![],
                threshold: 1,
                time_window: window,
                operator: ThresholdOperator::Gt,
            },
            actions: RuleActions::default(),
            created_at: None,
            updated_at: None,
        }
    }

    fn alert(id: &str, rule_id: &str) -> Alert {
        Alert {
            id: id.into(),
            rule_id: rule_id.into(),
            rule_name: rule_id.into(),
            severity: Default::default(),
            count: 1,
            timestamp: Utc::now(),
            message: "m".into(),
            channel: String::new(),
            log: LogRecord::default(),
            status: AlertState::Pending,
        }
    }

    #[tokio::test]
    async fn rule_upsert_and_not_found() {
        let store = InMemoryStateStore::new();
        store.save_rule(&rule("r1", 60)).await.unwrap();

        let loaded = store.get_rule("r1").await.unwrap();
        assert!(loaded.created_at.is_some());
        assert!(loaded.updated_at.is_some());

        assert!(matches!(
            store.get_rule("missing").await,
            Err(StoreError::NotFound(_))
        ));
        assert!(matches!(
            store.delete_rule("missing").await,
            Err(StoreError::NotFound(_))
        ));

        store.delete_rule("r1").await.unwrap();
        assert!(store.get_rules().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn counter_increments_within_bucket() {
        let store = InMemoryStateStore::new();
        store.set_now(0);
        let window = Duration::from_secs(60);

        assert_eq!(store.increment_counter("r1", window).await.unwrap(), 1);
        store.set_now(20);
        assert_eq!(store.increment_counter("r1", window).await.unwrap(), 2);
        store.set_now(59);
        assert_eq!(store.increment_counter("r1", window).await.unwrap(), 3);
        assert_eq!(store.get_counter("r1", window).await.unwrap(), 3);
    }

    #[tokio::test]
    async fn counter_rolls_to_new_bucket() {
        let store = InMemoryStateStore::new();
        store.set_now(0);
        let window = Duration::from_secs(60);

        store.increment_counter("r1", window).await.unwrap();
        store.increment_counter("r1", window).await.unwrap();

        // Next window starts a fresh count.
        store.set_now(90);
        assert_eq!(store.increment_counter("r1", window).await.unwrap(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_increments_are_linearized() {
        let store = std::sync::Arc::new(InMemoryStateStore::new());
        store.set_now(0);
        let window = Duration::from_secs(60);

        let mut handles = Vec::new();
        for _ in 0..16 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store.increment_counter("r1", window).await.unwrap()
            }));
        }
        let mut values = Vec::new();
        for handle in handles {
            values.push(handle.await.unwrap());
        }
        values.sort_unstable();

        // Every caller observed a distinct post-increment value.
        assert_eq!(values, (1..=16).collect::<Vec<i64>>());
    }

    #[tokio::test]
    async fn counter_is_per_rule() {
        let store = InMemoryStateStore::new();
        store.set_now(0);
        let window = Duration::from_secs(60);

        assert_eq!(store.increment_counter("a", window).await.unwrap(), 1);
        assert_eq!(store.increment_counter("b", window).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn counter_bucket_expires_after_twice_window() {
        let store = InMemoryStateStore::new();
        store.set_now(0);
        let window = Duration::from_secs(60);

        store.increment_counter("r1", window).await.unwrap();

        // Still observable within the window.
        store.set_now(59);
        assert_eq!(store.get_counter("r1", window).await.unwrap(), 1);

        // By 2x the window the bucket has been retired.
        store.set_now(120);
        assert_eq!(store.get_counter("r1", window).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn recent_alerts_newest_first_and_bounded() {
        let store = InMemoryStateStore::new();
        for i in 0..(MAX_RECENT_ALERTS + 5) {
            store
                .save_alert(&alert(&format!("a-{i}"), "r1"))
                .await
                .unwrap();
        }

        let recent = store.get_recent_alerts(3).await.unwrap();
        assert_eq!(recent.len(), 3);
        assert_eq!(recent[0].id, format!("a-{}", MAX_RECENT_ALERTS + 4));

        let all = store.get_recent_alerts(usize::MAX).await.unwrap();
        assert_eq!(all.len(), MAX_RECENT_ALERTS);
    }

    #[tokio::test]
    async fn log_stats_roundtrip_with_default() {
        let store = InMemoryStateStore::new();
        assert_eq!(store.get_log_stats().await.unwrap().total_logs, 0);

        let mut stats = LogStats::default();
        stats.total_logs = 42;
        store.save_log_stats(&stats).await.unwrap();
        assert_eq!(store.get_log_stats().await.unwrap().total_logs, 42);
    }
}
