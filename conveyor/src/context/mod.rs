//! Shared run state threaded through steps and middleware.
//!
//! This module provides:
//! - [`ContextBag`]: thread-safe auxiliary data seeded by the caller
//! - [`RunContext`]: the per-invocation context with committed results,
//!   positional lookups, and the per-step success flag

mod bag;
mod run;

pub use bag::ContextBag;
pub use run::RunContext;
