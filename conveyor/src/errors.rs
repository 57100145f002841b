//! Error types for the conveyor engine.
//!
//! The engine never wraps errors in a way that hides their cause: a
//! middleware failure (including the retry middleware re-raising a step's
//! error after exhausting its budget) reaches the caller of
//! [`crate::pipeline::Pipeline::run`] with its original message intact.

use thiserror::Error;

/// The error type surfaced to callers of a pipeline run.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// A middleware raised while the chain was running, aborting the whole
    /// invocation. Retry exhaustion surfaces here carrying the last step
    /// error unwrapped.
    #[error(transparent)]
    Middleware(#[from] anyhow::Error),
}

/// Error raised when a retry policy is configured with invalid values.
#[derive(Debug, Clone, Error)]
#[error("invalid retry policy: {message}")]
pub struct PolicyError {
    /// What was wrong with the configuration.
    pub message: String,
}

impl PolicyError {
    /// Creates a new policy error.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}
