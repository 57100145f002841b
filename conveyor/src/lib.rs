//! # Conveyor
//!
//! A sequential async-task execution engine.
//!
//! Conveyor runs an ordered list of asynchronous steps, threading a result
//! value and a mutable shared context through each one:
//!
//! - **Step-based execution**: Each step receives the current working value
//!   and the shared [`context::RunContext`], and returns the next value.
//! - **Middleware chain**: After every step, success or failure, an ordered
//!   middleware chain can observe, transform, or recover the outcome.
//! - **Retry with backoff**: A retry middleware re-invokes a failed step with
//!   bounded attempts and exponential backoff.
//! - **Context bookkeeping**: Committed results, positional lookups, and a
//!   caller-seeded data bag stay consistent across failure and recovery.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use conveyor::prelude::*;
//! use serde_json::json;
//!
//! let pipeline = Pipeline::builder()
//!     .step("add", FnStep::from_sync(|v, _| Ok(json!(v.as_i64().unwrap() + 2))))
//!     .step("triple", FnStep::from_sync(|v, _| Ok(json!(v.as_i64().unwrap() * 3))))
//!     .build();
//!
//! let output = pipeline.run(json!(5), RunOptions::default()).await?;
//! assert_eq!(output.result, json!(21));
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod context;
pub mod errors;
pub mod middleware;
pub mod observability;
pub mod pipeline;
pub mod steps;
pub mod testing;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::context::{ContextBag, RunContext};
    pub use crate::errors::{PipelineError, PolicyError};
    pub use crate::middleware::{
        ContextSnapshot, JitterStrategy, Middleware, MiddlewareChain, Outcome,
        ResultBucketMiddleware, RetryMiddleware, RetryPolicy, Sleeper,
        SnapshotMiddleware, TokioSleeper,
    };
    pub use crate::pipeline::{Pipeline, PipelineBuilder, RunOptions, RunOutput};
    pub use crate::steps::{FnStep, Step, StepEntry, StepId};
}
