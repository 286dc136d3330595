//! Consumer throughput and error telemetry.
//!
//! All-time counters live in atomics; the error rate is computed over a
//! rolling window of recent outcomes so a long-running consumer reacts to
//! current conditions rather than its lifetime average.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use parking_lot::Mutex;
use serde::Serialize;
use tracing::{info, warn};

/// Outcomes considered when computing the rolling error rate.
const ERROR_RATE_WINDOW: usize = 200;

/// Rolling error rate above which the periodic tick logs a warning.
const ERROR_RATE_WARN_THRESHOLD: f64 = 0.05;

/// Point-in-time metrics snapshot, served by the control plane.
#[derive(Debug, Clone, Serialize)]
pub struct ConsumerMetrics {
    pub processed: u64,
    pub failed: u64,
    pub error_rate: f64,
    pub uptime_seconds: u64,
}

/// Shared telemetry for one consumer instance.
pub struct ConsumerTelemetry {
    processed: AtomicU64,
    failed: AtomicU64,
    started_at: Instant,
    recent: Mutex<VecDeque<bool>>,
}

impl Default for ConsumerTelemetry {
    fn default() -> Self {
        Self {
            processed: AtomicU64::new(0),
            failed: AtomicU64::new(0),
            started_at: Instant::now(),
            recent: Mutex::new(VecDeque::with_capacity(ERROR_RATE_WINDOW)),
        }
    }
}

impl ConsumerTelemetry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_success(&self) {
        self.processed.fetch_add(1, Ordering::Relaxed);
        self.push_outcome(true);
    }

    pub fn record_failure(&self) {
        self.processed.fetch_add(1, Ordering::Relaxed);
        self.failed.fetch_add(1, Ordering::Relaxed);
        self.push_outcome(false);
    }

    fn push_outcome(&self, success: bool) {
        let mut recent = self.recent.lock();
        if recent.len() == ERROR_RATE_WINDOW {
            recent.pop_front();
        }
        recent.push_back(success);
    }

    pub fn processed(&self) -> u64 {
        self.processed.load(Ordering::Relaxed)
    }

    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }

    /// Fraction of failures over the rolling window. Zero when idle.
    pub fn error_rate(&self) -> f64 {
        let recent = self.recent.lock();
        if recent.is_empty() {
            return 0.0;
        }
        let failures = recent.iter().filter(|ok| !**ok).count();
        failures as f64 / recent.len() as f64
    }

    pub fn snapshot(&self) -> ConsumerMetrics {
        ConsumerMetrics {
            processed: self.processed(),
            failed: self.failed(),
            error_rate: self.error_rate(),
            uptime_seconds: self.started_at.elapsed().as_secs(),
        }
    }

    /// Periodic stats line; warns when the rolling error rate is elevated.
    pub fn log_summary(&self) {
        let rate = self.error_rate();
        info!(
            processed = self.processed(),
            failed = self.failed(),
            error_rate = rate,
            "Consumer throughput"
        );
        if rate > ERROR_RATE_WARN_THRESHOLD {
            warn!(error_rate = rate, "Rolling error rate above threshold");
        }
    }
}
