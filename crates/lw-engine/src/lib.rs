//! Alert evaluation engine.
//!
//! Pairs a stateless rule matcher with Redis-linearized windowed counters:
//! every consumer instance evaluates records against the same rule set, and
//! the shared counters make thresholds correct across the whole consumer
//! group.

use thiserror::Error;

mod engine;
mod matcher;

pub use engine::{AlertEngine, DryRunResult, EvaluateSummary};
pub use matcher::matches;

use lw_common::ValidationError;
use lw_store::StoreError;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Validation(#[from] ValidationError),
}

pub type Result<T> = std::result::Result<T, EngineError>;
