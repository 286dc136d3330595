//! Log stream consumption.
//!
//! Pulls records from the Kafka bus, decodes and normalizes them, feeds the
//! alert engine and maintains throughput/error telemetry. Horizontal scale
//! comes from running several instances under one consumer group; the only
//! cross-instance coordination is the store's atomic counters.
//!
//! Offsets are committed after evaluation, giving at-least-once processing:
//! a crash between notification and commit may re-evaluate a record and
//! produce a duplicate alert.

use thiserror::Error;

mod batch;
mod kafka;
mod processor;
mod telemetry;

pub use batch::{BatchLogConsumer, RecordBatch};
pub use kafka::KafkaLogConsumer;
pub use processor::RecordProcessor;
pub use telemetry::{ConsumerMetrics, ConsumerTelemetry};

/// A consumer whose lag exceeds this is reported unhealthy.
pub const MAX_HEALTHY_LAG: i64 = 1000;

#[derive(Error, Debug)]
pub enum ConsumerError {
    #[error("kafka error: {0}")]
    Kafka(#[from] rdkafka::error::KafkaError),

    #[error("configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, ConsumerError>;
