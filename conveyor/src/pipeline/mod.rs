//! Pipeline construction and execution.
//!
//! This module provides:
//! - [`PipelineBuilder`] for assembling labeled steps
//! - [`Pipeline`] and its sequential execution loop
//! - [`RunOptions`] and [`RunOutput`] for the invocation surface

mod engine;

#[cfg(test)]
mod integration_tests;

pub use engine::{Pipeline, PipelineBuilder, RunOptions, RunOutput};
