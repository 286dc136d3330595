//! State store for rules, alerts, windowed counters and log statistics.
//!
//! The store is the single persistence authority. The production
//! implementation runs against Redis (standalone or cluster); an in-memory
//! implementation backs tests and dev mode.

use std::time::Duration;

use async_trait::async_trait;

use lw_common::{Alert, AlertRule, AlertStatus, LogStats};

mod error;
mod memory;
mod redis_store;

pub use error::StoreError;
pub use memory::InMemoryStateStore;
pub use redis_store::RedisStateStore;

pub type Result<T> = std::result::Result<T, StoreError>;

/// Recent alerts kept in the audit index.
pub const MAX_RECENT_ALERTS: usize = 100;

/// How long individual alert records are retained.
pub const ALERT_RETENTION: Duration = Duration::from_secs(24 * 60 * 60);

// ============================================================================
// Key layout
// ============================================================================

pub(crate) const RULE_INDEX_KEY: &str = "alert_rules";
pub(crate) const RECENT_ALERTS_KEY: &str = "alerts:recent";
pub(crate) const LOG_STATS_KEY: &str = "log_stats";

pub(crate) fn rule_key(id: &str) -> String {
    format!("alert_rule:{id}")
}

pub(crate) fn counter_key(rule_id: &str, bucket: i64) -> String {
    format!("counter:{rule_id}:{bucket}")
}

pub(crate) fn status_key(rule_id: &str) -> String {
    format!("alert_status:{rule_id}")
}

pub(crate) fn alert_key(id: &str) -> String {
    format!("alert:{id}")
}

/// Tumbling-window bucket index: `floor(now / window)`.
pub fn bucket_index(unix_now: i64, window: Duration) -> i64 {
    unix_now / window.as_secs().max(1) as i64
}

// ============================================================================
// Contract
// ============================================================================

/// Persistence contract shared by every engine instance.
///
/// Counter increments are atomic: concurrent callers for the same rule and
/// bucket each observe a distinct post-increment value.
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Upsert a rule by id. Missing timestamps are filled at write time.
    async fn save_rule(&self, rule: &AlertRule) -> Result<()>;

    /// All stored rules, in unspecified order.
    async fn get_rules(&self) -> Result<Vec<AlertRule>>;

    async fn get_rule(&self, id: &str) -> Result<AlertRule>;

    async fn delete_rule(&self, id: &str) -> Result<()>;

    /// Atomically increment the counter for the current bucket of
    /// `rule_id` and return the post-increment value. The bucket key
    /// expires `2 × window` after creation.
    async fn increment_counter(&self, rule_id: &str, window: Duration) -> Result<i64>;

    /// Read the current bucket's counter without incrementing.
    async fn get_counter(&self, rule_id: &str, window: Duration) -> Result<i64>;

    /// Upsert the per-rule recency record.
    async fn set_alert_status(&self, status: &AlertStatus) -> Result<()>;

    /// Append an alert to the bounded audit set.
    async fn save_alert(&self, alert: &Alert) -> Result<()>;

    /// Up to `limit` most recent alerts, newest first.
    async fn get_recent_alerts(&self, limit: usize) -> Result<Vec<Alert>>;

    /// Replace the stats snapshot.
    async fn save_log_stats(&self, stats: &LogStats) -> Result<()>;

    /// Current stats snapshot; a default snapshot when none was saved yet.
    async fn get_log_stats(&self) -> Result<LogStats>;

    /// Liveness check against the backing store.
    async fn ping(&self) -> Result<()>;
}
