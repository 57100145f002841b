//! Step surface: the trait steps implement, stable step identities, and
//! closure adapters.

use crate::context::RunContext;
use async_trait::async_trait;
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Stable identifier for a step, assigned at pipeline construction.
///
/// Identifies a step by its position in the pipeline rather than by runtime
/// name introspection, so identically-named or anonymous steps never
/// collide.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StepId(usize);

impl StepId {
    /// Creates a step id for the given position.
    #[must_use]
    pub(crate) fn new(index: usize) -> Self {
        Self(index)
    }

    /// Returns the step's position in the pipeline.
    #[must_use]
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for StepId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "step#{}", self.0)
    }
}

/// Trait for one async step in a pipeline.
///
/// A step receives the current working value and the shared run context,
/// and returns the next value. Any error it raises is caught by the
/// engine's per-step wrapper and surfaced to the middleware chain.
#[async_trait]
pub trait Step: Send + Sync {
    /// Executes the step.
    async fn run(&self, value: serde_json::Value, ctx: &RunContext)
        -> anyhow::Result<serde_json::Value>;
}

/// A step registered in a pipeline: stable id, caller label, and the
/// re-invocable step itself.
///
/// Middleware reach the entry through [`RunContext::method`] to identify the
/// current step or to re-invoke it (the retry middleware does both).
pub struct StepEntry {
    id: StepId,
    label: String,
    step: Arc<dyn Step>,
}

impl StepEntry {
    /// Creates a new entry.
    pub(crate) fn new(id: StepId, label: impl Into<String>, step: Arc<dyn Step>) -> Self {
        Self {
            id,
            label: label.into(),
            step,
        }
    }

    /// Returns the stable step id.
    #[must_use]
    pub fn id(&self) -> StepId {
        self.id
    }

    /// Returns the caller-supplied label.
    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Returns the collision-free name used for logging and per-step
    /// bucketing, e.g. `"2:double"`.
    #[must_use]
    pub fn qualified_name(&self) -> String {
        format!("{}:{}", self.id.index(), self.label)
    }

    /// Invokes the underlying step.
    pub async fn invoke(
        &self,
        value: serde_json::Value,
        ctx: &RunContext,
    ) -> anyhow::Result<serde_json::Value> {
        self.step.run(value, ctx).await
    }
}

impl fmt::Debug for StepEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StepEntry")
            .field("id", &self.id)
            .field("label", &self.label)
            .finish_non_exhaustive()
    }
}

type BoxedSyncFn = Box<
    dyn Fn(serde_json::Value, &RunContext) -> anyhow::Result<serde_json::Value> + Send + Sync,
>;

type BoxedAsyncFn = Box<
    dyn for<'a> Fn(
            serde_json::Value,
            &'a RunContext,
        ) -> BoxFuture<'a, anyhow::Result<serde_json::Value>>
        + Send
        + Sync,
>;

enum StepFn {
    Sync(BoxedSyncFn),
    Async(BoxedAsyncFn),
}

/// Adapter turning a closure into a [`Step`].
pub struct FnStep {
    f: StepFn,
}

impl FnStep {
    /// Wraps an async closure returning a boxed future.
    #[must_use]
    pub fn new<F>(f: F) -> Self
    where
        F: for<'a> Fn(
                serde_json::Value,
                &'a RunContext,
            ) -> BoxFuture<'a, anyhow::Result<serde_json::Value>>
            + Send
            + Sync
            + 'static,
    {
        Self {
            f: StepFn::Async(Box::new(f)),
        }
    }

    /// Wraps a synchronous closure.
    #[must_use]
    pub fn from_sync<F>(f: F) -> Self
    where
        F: Fn(serde_json::Value, &RunContext) -> anyhow::Result<serde_json::Value>
            + Send
            + Sync
            + 'static,
    {
        Self {
            f: StepFn::Sync(Box::new(f)),
        }
    }
}

impl fmt::Debug for FnStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnStep").finish_non_exhaustive()
    }
}

#[async_trait]
impl Step for FnStep {
    async fn run(
        &self,
        value: serde_json::Value,
        ctx: &RunContext,
    ) -> anyhow::Result<serde_json::Value> {
        match &self.f {
            StepFn::Sync(f) => f(value, ctx),
            StepFn::Async(f) => f(value, ctx).await,
        }
    }
}
