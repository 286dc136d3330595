//! Alert notification delivery.
//!
//! Provides:
//! - Chat webhook notifications with per-severity color and emoji decoration
//! - Message rendering from a configurable template
//! - A no-op implementation for when alerting is disabled
//!
//! The notifier sends once and reports the outcome; it never retries.
//! Delivery status is recorded by the engine against the state store.

use async_trait::async_trait;
use thiserror::Error;

use lw_common::Alert;

mod slack;
mod template;

pub use slack::SlackNotifier;
pub use template::{MessageTemplate, DEFAULT_ALERT_TEMPLATE};

#[derive(Error, Debug)]
pub enum NotifierError {
    #[error("webhook request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("webhook returned status {0}")]
    Status(u16),

    #[error("no webhook configured")]
    NotConfigured,
}

/// Notification delivery contract.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Deliver one alert. A non-2xx response or transport error is an error.
    async fn send(&self, alert: &Alert) -> Result<(), NotifierError>;

    /// Verify the webhook is reachable.
    async fn test_connection(&self) -> Result<(), NotifierError>;
}

/// No-op notifier for when notifications are disabled.
pub struct NoOpNotifier;

#[async_trait]
impl Notifier for NoOpNotifier {
    async fn send(&self, _alert: &Alert) -> Result<(), NotifierError> {
        Ok(())
    }

    async fn test_connection(&self) -> Result<(), NotifierError> {
        Ok(())
    }
}
