//! Kafka stream driver.

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{CommitMode, Consumer, StreamConsumer};
use rdkafka::message::Message;
use rdkafka::Offset;
use tokio::sync::broadcast;
use tracing::{error, info};

use lw_config::BusConfig;

use crate::{ConsumerTelemetry, RecordProcessor, Result, MAX_HEALTHY_LAG};

/// Interval between periodic telemetry log lines.
const STATS_TICK: Duration = Duration::from_secs(60);

pub(crate) fn build_consumer(bus: &BusConfig) -> Result<StreamConsumer> {
    let consumer: StreamConsumer = ClientConfig::new()
        .set("bootstrap.servers", bus.brokers.join(","))
        .set("group.id", &bus.group_id)
        .set("enable.auto.commit", "false")
        .set("auto.offset.reset", &bus.start_offset)
        .set("fetch.min.bytes", bus.min_bytes.to_string())
        .set("fetch.max.bytes", bus.max_bytes.to_string())
        .set("fetch.wait.max.ms", bus.max_wait_ms.to_string())
        .create()?;
    consumer.subscribe(&[&bus.topic])?;
    Ok(consumer)
}

/// One consumer-group member: fetches records one at a time and evaluates
/// each before committing its offset.
///
/// Partition assignment across instances sharing a group id is handled by
/// the bus; within one partition records are processed in offset order.
pub struct KafkaLogConsumer {
    consumer: StreamConsumer,
    processor: Arc<RecordProcessor>,
    telemetry: Arc<ConsumerTelemetry>,
}

impl KafkaLogConsumer {
    pub fn new(
        bus: &BusConfig,
        processor: Arc<RecordProcessor>,
        telemetry: Arc<ConsumerTelemetry>,
    ) -> Result<Self> {
        Ok(Self {
            consumer: build_consumer(bus)?,
            processor,
            telemetry,
        })
    }

    /// Consume until `shutdown` fires. The in-flight record finishes before
    /// the loop exits. Bus errors are logged and the next iteration retries;
    /// backoff is the client library's concern.
    pub async fn run(&self, mut shutdown: broadcast::Receiver<()>) {
        info!("Consumer loop started");
        let mut stream = self.consumer.stream();
        let mut stats_tick = tokio::time::interval(STATS_TICK);
        stats_tick.tick().await;

        loop {
            tokio::select! {
                _ = shutdown.recv() => {
                    info!("Consumer stopping");
                    break;
                }
                _ = stats_tick.tick() => self.telemetry.log_summary(),
                message = stream.next() => match message {
                    Some(Ok(msg)) => {
                        self.processor.process(msg.payload().unwrap_or_default()).await;
                        // Commit after evaluation: at-least-once.
                        if let Err(e) = self.consumer.commit_message(&msg, CommitMode::Async) {
                            error!(error = %e, "Failed to commit offset");
                        }
                    }
                    Some(Err(e)) => error!(error = %e, "Bus error"),
                    None => break,
                }
            }
        }
    }

    /// Total records between our committed positions and the partition
    /// heads.
    pub fn lag(&self) -> Result<i64> {
        let position = self.consumer.position()?;
        let mut lag = 0i64;
        for elem in position.elements() {
            if let Offset::Offset(current) = elem.offset() {
                let (_low, high) = self.consumer.fetch_watermarks(
                    elem.topic(),
                    elem.partition(),
                    Duration::from_secs(1),
                )?;
                lag += (high - current).max(0);
            }
        }
        Ok(lag)
    }

    pub fn is_healthy(&self) -> bool {
        matches!(self.lag(), Ok(lag) if lag <= MAX_HEALTHY_LAG)
    }
}
