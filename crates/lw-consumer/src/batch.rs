//! Batch driver: buffers records and flushes on size or on a timer.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::StreamExt;
use rdkafka::consumer::{CommitMode, Consumer, StreamConsumer};
use rdkafka::message::Message;
use rdkafka::{Offset, TopicPartitionList};
use tokio::sync::broadcast;
use tracing::{debug, error, info};

use lw_config::BusConfig;

use crate::kafka::build_consumer;
use crate::{ConsumerTelemetry, RecordProcessor, Result};

/// An in-memory buffer of raw record payloads.
#[derive(Debug)]
pub struct RecordBatch {
    records: Vec<Vec<u8>>,
    last_flush: Instant,
}

impl Default for RecordBatch {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordBatch {
    pub fn new() -> Self {
        Self {
            records: Vec::new(),
            last_flush: Instant::now(),
        }
    }

    pub fn add(&mut self, payload: Vec<u8>) {
        self.records.push(payload);
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// A non-empty batch flushes when it reaches `max_size` or when
    /// `max_age` has passed since the previous flush.
    pub fn should_flush(&self, max_size: usize, max_age: Duration) -> bool {
        !self.records.is_empty()
            && (self.records.len() >= max_size || self.last_flush.elapsed() >= max_age)
    }

    /// Drain the buffer and restart the age clock.
    pub fn take(&mut self) -> Vec<Vec<u8>> {
        self.last_flush = Instant::now();
        std::mem::take(&mut self.records)
    }
}

/// Alternate consumer driver that evaluates records in buffered batches.
///
/// Records are still evaluated sequentially in offset order; batching only
/// amortizes offset commits. The flush timer resets after every flush, and
/// cancellation drains the buffer before exit.
pub struct BatchLogConsumer {
    consumer: StreamConsumer,
    processor: Arc<RecordProcessor>,
    telemetry: Arc<ConsumerTelemetry>,
    batch_size: usize,
    flush_interval: Duration,
}

impl BatchLogConsumer {
    pub fn new(
        bus: &BusConfig,
        processor: Arc<RecordProcessor>,
        telemetry: Arc<ConsumerTelemetry>,
        batch_size: usize,
        flush_interval: Duration,
    ) -> Result<Self> {
        Ok(Self {
            consumer: build_consumer(bus)?,
            processor,
            telemetry,
            batch_size: batch_size.max(1),
            flush_interval,
        })
    }

    pub async fn run(&self, mut shutdown: broadcast::Receiver<()>) {
        info!(batch_size = self.batch_size, "Batch consumer loop started");
        let mut stream = self.consumer.stream();
        let mut batch = RecordBatch::new();
        let mut offsets: HashMap<(String, i32), i64> = HashMap::new();

        // The age check runs finer than the flush interval; the batch itself
        // tracks time since the previous flush, so a size-triggered flush
        // restarts the timer.
        let check = (self.flush_interval / 4).max(Duration::from_millis(100));
        let mut flush_tick = tokio::time::interval(check);
        flush_tick.tick().await;

        loop {
            tokio::select! {
                _ = shutdown.recv() => {
                    info!(buffered = batch.len(), "Batch consumer draining before exit");
                    self.flush(&mut batch, &mut offsets).await;
                    break;
                }
                _ = flush_tick.tick() => {
                    if batch.should_flush(self.batch_size, self.flush_interval) {
                        self.flush(&mut batch, &mut offsets).await;
                    }
                }
                message = stream.next() => match message {
                    Some(Ok(msg)) => {
                        batch.add(msg.payload().unwrap_or_default().to_vec());
                        let slot = offsets
                            .entry((msg.topic().to_string(), msg.partition()))
                            .or_insert(msg.offset());
                        *slot = (*slot).max(msg.offset());

                        if batch.len() >= self.batch_size {
                            self.flush(&mut batch, &mut offsets).await;
                        }
                    }
                    Some(Err(e)) => error!(error = %e, "Bus error"),
                    None => {
                        self.flush(&mut batch, &mut offsets).await;
                        break;
                    }
                }
            }
        }
    }

    async fn flush(&self, batch: &mut RecordBatch, offsets: &mut HashMap<(String, i32), i64>) {
        if batch.is_empty() {
            return;
        }
        let records = batch.take();
        let count = records.len();
        for payload in &records {
            self.processor.process(payload).await;
        }

        let mut tpl = TopicPartitionList::new();
        for ((topic, partition), offset) in offsets.drain() {
            if let Err(e) = tpl.add_partition_offset(&topic, partition, Offset::Offset(offset + 1))
            {
                error!(error = %e, topic, partition, "Failed to stage offset for commit");
            }
        }
        if tpl.count() > 0 {
            if let Err(e) = self.consumer.commit(&tpl, CommitMode::Async) {
                error!(error = %e, "Failed to commit batch offsets");
            }
        }

        debug!(count, error_rate = self.telemetry.error_rate(), "Flushed record batch");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_batch_never_flushes() {
        let batch = RecordBatch::new();
        assert!(!batch.should_flush(1, Duration::ZERO));
    }

    #[test]
    fn flushes_at_size() {
        let mut batch = RecordBatch::new();
        batch.add(b"a".to_vec());
        assert!(!batch.should_flush(2, Duration::from_secs(3600)));

        batch.add(b"b".to_vec());
        assert!(batch.should_flush(2, Duration::from_secs(3600)));
    }

    #[test]
    fn flushes_on_age() {
        let mut batch = RecordBatch::new();
        batch.add(b"a".to_vec());
        assert!(batch.should_flush(100, Duration::ZERO));
    }

    #[test]
    fn take_drains_and_resets_clock() {
        let mut batch = RecordBatch::new();
        batch.add(b"a".to_vec());
        batch.add(b"b".to_vec());

        let taken = batch.take();
        assert_eq!(taken.len(), 2);
        assert!(batch.is_empty());
        assert!(!batch.should_flush(1, Duration::from_secs(3600)));
    }
}
