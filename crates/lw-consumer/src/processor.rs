//! Per-record processing shared by the streaming and batch drivers.

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, warn};

use lw_common::{LogRecord, LogStats};
use lw_engine::AlertEngine;
use lw_store::StateStore;

/// Decodes records, maintains this instance's log statistics and feeds the
/// alert engine.
///
/// Stats are owned by this processor alone; they are persisted as a snapshot
/// every `stats_every` records. Instances in a consumer group do not merge
/// stats.
pub struct RecordProcessor {
    engine: Arc<AlertEngine>,
    store: Arc<dyn StateStore>,
    telemetry: Arc<crate::ConsumerTelemetry>,
    stats: Mutex<LogStats>,
    default_level: String,
    stats_every: u64,
}

impl RecordProcessor {
    pub fn new(
        engine: Arc<AlertEngine>,
        store: Arc<dyn StateStore>,
        telemetry: Arc<crate::ConsumerTelemetry>,
        default_level: String,
        stats_every: u64,
    ) -> Self {
        Self {
            engine,
            store,
            telemetry,
            stats: Mutex::new(LogStats::default()),
            default_level,
            stats_every: stats_every.max(1),
        }
    }

    /// Process one record payload. Malformed records and engine-signalled
    /// store failures are counted; neither interrupts consumption.
    pub async fn process(&self, payload: &[u8]) {
        let record = match LogRecord::decode(payload, &self.default_level) {
            Ok(record) => record,
            Err(e) => {
                warn!(error = %e, "Dropping undecodable record");
                self.telemetry.record_failure();
                return;
            }
        };

        let total = {
            let mut stats = self.stats.lock();
            stats.record(&record);
            stats.total_logs
        };

        let summary = self.engine.evaluate(&record).await;
        if summary.errors > 0 {
            self.telemetry.record_failure();
        } else {
            self.telemetry.record_success();
        }

        if total % self.stats_every == 0 {
            let snapshot = self.stats.lock().clone();
            if let Err(e) = self.store.save_log_stats(&snapshot).await {
                warn!(error = %e, "Failed to persist log stats");
            } else {
                debug!(total = snapshot.total_logs, "Persisted log stats snapshot");
            }
        }
    }

    /// This instance's current stats.
    pub fn stats(&self) -> LogStats {
        self.stats.lock().clone()
    }
}
