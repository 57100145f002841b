//! Middleware: ordered observation, transformation, and recovery of step
//! outcomes.
//!
//! This module provides:
//! - The [`Middleware`] trait and its [`Outcome`] return type
//! - [`MiddlewareChain`]: strict in-order chained application
//! - [`RetryMiddleware`]: bounded retry with exponential backoff
//! - Recorder middleware: context snapshots and per-step result buckets

mod chain;
mod recorders;
mod retry;

pub use chain::{Middleware, MiddlewareChain, Outcome};
pub use recorders::{ContextSnapshot, ResultBucketMiddleware, SnapshotMiddleware};
pub use retry::{JitterStrategy, RetryMiddleware, RetryPolicy, Sleeper, TokioSleeper};
