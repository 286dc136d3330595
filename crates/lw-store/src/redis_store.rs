//! Redis-backed state store.
//!
//! Counters are pipelined atomic `INCR` + `EXPIRE` on a single composite
//! key, which linearizes increments across horizontally-scaled engine
//! instances without cross-slot transactions. Rules are tracked through an
//! index set so enumeration never depends on `KEYS`, which keeps the same
//! code path working against a hash-slot-sharded cluster.

use std::time::Duration;

use chrono::Utc;
use redis::aio::ConnectionManager;
use redis::cluster::ClusterClient;
use redis::cluster_async::ClusterConnection;
use redis::FromRedisValue;
use tracing::{debug, warn};

use async_trait::async_trait;
use lw_common::{Alert, AlertRule, AlertStatus, LogStats};
use lw_config::{StoreConfig, StoreMode};

use crate::{
    alert_key, bucket_index, counter_key, rule_key, status_key, Result, StateStore, StoreError,
    ALERT_RETENTION, LOG_STATS_KEY, MAX_RECENT_ALERTS, RECENT_ALERTS_KEY, RULE_INDEX_KEY,
};

#[derive(Clone)]
enum StoreConn {
    Standalone(ConnectionManager),
    Cluster(ClusterConnection),
}

/// State store backed by a standalone or clustered Redis deployment.
pub struct RedisStateStore {
    conn: StoreConn,
    timeout: Duration,
}

impl RedisStateStore {
    /// Connect per the store configuration, retrying up to
    /// `max_retries` times before giving up.
    pub async fn connect(config: &StoreConfig) -> Result<Self> {
        let mut attempt = 0u32;
        loop {
            match Self::try_connect(config).await {
                Ok(store) => return Ok(store),
                Err(e) if attempt < config.max_retries => {
                    attempt += 1;
                    warn!(error = %e, attempt, "Store connection failed, retrying");
                    tokio::time::sleep(Duration::from_secs(1)).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn try_connect(config: &StoreConfig) -> Result<Self> {
        let conn = match config.mode {
            StoreMode::Standalone => {
                let address = config
                    .addresses
                    .first()
                    .ok_or_else(|| StoreError::Unavailable("no store address configured".into()))?;
                let client = redis::Client::open(address.as_str())?;
                StoreConn::Standalone(ConnectionManager::new(client).await?)
            }
            StoreMode::Cluster => {
                let client = ClusterClient::new(config.addresses.clone())?;
                StoreConn::Cluster(client.get_async_connection().await?)
            }
        };

        let store = Self {
            conn,
            timeout: config.timeout(),
        };
        store.ping().await?;
        debug!(mode = ?config.mode, "Connected to state store");
        Ok(store)
    }

    async fn run_cmd<T: FromRedisValue>(&self, cmd: &redis::Cmd) -> Result<T> {
        let fut = async {
            match &self.conn {
                StoreConn::Standalone(c) => {
                    let mut c = c.clone();
                    cmd.query_async(&mut c).await
                }
                StoreConn::Cluster(c) => {
                    let mut c = c.clone();
                    cmd.query_async(&mut c).await
                }
            }
        };
        match tokio::time::timeout(self.timeout, fut).await {
            Ok(result) => result.map_err(StoreError::from),
            Err(_) => Err(StoreError::Timeout),
        }
    }

    async fn run_pipe<T: FromRedisValue>(&self, pipe: &redis::Pipeline) -> Result<T> {
        let fut = async {
            match &self.conn {
                StoreConn::Standalone(c) => {
                    let mut c = c.clone();
                    pipe.query_async(&mut c).await
                }
                StoreConn::Cluster(c) => {
                    let mut c = c.clone();
                    pipe.query_async(&mut c).await
                }
            }
        };
        match tokio::time::timeout(self.timeout, fut).await {
            Ok(result) => result.map_err(StoreError::from),
            Err(_) => Err(StoreError::Timeout),
        }
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        let raw: Option<String> = self.run_cmd(redis::cmd("GET").arg(key)).await?;
        match raw {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }
}

#[async_trait]
impl StateStore for RedisStateStore {
    async fn save_rule(&self, rule: &AlertRule) -> Result<()> {
        let mut rule = rule.clone();
        let now = Utc::now();
        if rule.created_at.is_none() {
            rule.created_at = Some(now);
        }
        rule.updated_at = Some(now);

        let encoded = serde_json::to_string(&rule)?;
        let _: () = self
            .run_cmd(redis::cmd("SET").arg(rule_key(&rule.id)).arg(encoded))
            .await?;
        let _: () = self
            .run_cmd(redis::cmd("SADD").arg(RULE_INDEX_KEY).arg(&rule.id))
            .await?;
        Ok(())
    }

    async fn get_rules(&self) -> Result<Vec<AlertRule>> {
        let ids: Vec<String> = self.run_cmd(redis::cmd("SMEMBERS").arg(RULE_INDEX_KEY)).await?;
        let mut rules = Vec::with_capacity(ids.len());
        for id in ids {
            // A rule deleted between the index read and the fetch is skipped.
            if let Some(rule) = self.get_json::<AlertRule>(&rule_key(&id)).await? {
                rules.push(rule);
            }
        }
        Ok(rules)
    }

    async fn get_rule(&self, id: &str) -> Result<AlertRule> {
        self.get_json::<AlertRule>(&rule_key(id))
            .await?
            .ok_or_else(|| StoreError::NotFound(format!("rule {id}")))
    }

    async fn delete_rule(&self, id: &str) -> Result<()> {
        let removed: i64 = self.run_cmd(redis::cmd("DEL").arg(rule_key(id))).await?;
        let _: () = self
            .run_cmd(redis::cmd("SREM").arg(RULE_INDEX_KEY).arg(id))
            .await?;
        if removed == 0 {
            return Err(StoreError::NotFound(format!("rule {id}")));
        }
        Ok(())
    }

    async fn increment_counter(&self, rule_id: &str, window: Duration) -> Result<i64> {
        let bucket = bucket_index(Utc::now().timestamp(), window);
        let key = counter_key(rule_id, bucket);

        let mut pipe = redis::pipe();
        pipe.atomic()
            .cmd("INCR")
            .arg(&key)
            .cmd("EXPIRE")
            .arg(&key)
            .arg(2 * window.as_secs())
            .ignore();
        let (count,): (i64,) = self.run_pipe(&pipe).await?;
        Ok(count)
    }

    async fn get_counter(&self, rule_id: &str, window: Duration) -> Result<i64> {
        let bucket = bucket_index(Utc::now().timestamp(), window);
        let count: Option<i64> = self
            .run_cmd(redis::cmd("GET").arg(counter_key(rule_id, bucket)))
            .await?;
        Ok(count.unwrap_or(0))
    }

    async fn set_alert_status(&self, status: &AlertStatus) -> Result<()> {
        let encoded = serde_json::to_string(status)?;
        let _: () = self
            .run_cmd(redis::cmd("SET").arg(status_key(&status.rule_id)).arg(encoded))
            .await?;
        Ok(())
    }

    async fn save_alert(&self, alert: &Alert) -> Result<()> {
        let encoded = serde_json::to_string(alert)?;
        let _: () = self
            .run_cmd(
                redis::cmd("SET")
                    .arg(alert_key(&alert.id))
                    .arg(encoded)
                    .arg("EX")
                    .arg(ALERT_RETENTION.as_secs()),
            )
            .await?;
        let _: () = self
            .run_cmd(
                redis::cmd("ZADD")
                    .arg(RECENT_ALERTS_KEY)
                    .arg(alert.timestamp.timestamp())
                    .arg(&alert.id),
            )
            .await?;
        // Cap the audit index.
        let _: () = self
            .run_cmd(
                redis::cmd("ZREMRANGEBYRANK")
                    .arg(RECENT_ALERTS_KEY)
                    .arg(0)
                    .arg(-(MAX_RECENT_ALERTS as i64) - 1),
            )
            .await?;
        Ok(())
    }

    async fn get_recent_alerts(&self, limit: usize) -> Result<Vec<Alert>> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        let ids: Vec<String> = self
            .run_cmd(
                redis::cmd("ZREVRANGE")
                    .arg(RECENT_ALERTS_KEY)
                    .arg(0)
                    .arg(limit.saturating_sub(1)),
            )
            .await?;
        let mut alerts = Vec::with_capacity(ids.len());
        for id in ids {
            // Index entries may outlive the retained alert record.
            if let Some(alert) = self.get_json::<Alert>(&alert_key(&id)).await? {
                alerts.push(alert);
            }
        }
        Ok(alerts)
    }

    async fn save_log_stats(&self, stats: &LogStats) -> Result<()> {
        let encoded = serde_json::to_string(stats)?;
        let _: () = self
            .run_cmd(redis::cmd("SET").arg(LOG_STATS_KEY).arg(encoded))
            .await?;
        Ok(())
    }

    async fn get_log_stats(&self) -> Result<LogStats> {
        Ok(self
            .get_json::<LogStats>(LOG_STATS_KEY)
            .await?
            .unwrap_or_default())
    }

    async fn ping(&self) -> Result<()> {
        let _: String = self.run_cmd(&redis::cmd("PING")).await?;
        Ok(())
    }
}
