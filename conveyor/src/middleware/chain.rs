//! Middleware contract and ordered chain execution.

use crate::context::RunContext;
use async_trait::async_trait;
use std::sync::Arc;

/// What a middleware wants changed after handling a `(result, context)`
/// pair.
///
/// Each slot is an explicit "unchanged" sentinel: `None` keeps the value the
/// chain was carrying, `Some` overrides it for every later middleware (and,
/// ultimately, the engine).
#[derive(Debug, Default)]
pub struct Outcome {
    /// Replacement result, or `None` to keep the incoming result.
    pub result: Option<serde_json::Value>,
    /// Replacement context handle, or `None` to keep the incoming context.
    pub context: Option<Arc<RunContext>>,
}

impl Outcome {
    /// Leaves both the result and the context untouched.
    #[must_use]
    pub fn unchanged() -> Self {
        Self::default()
    }

    /// Overrides the result, leaving the context untouched.
    #[must_use]
    pub fn replace(result: serde_json::Value) -> Self {
        Self {
            result: Some(result),
            context: None,
        }
    }

    /// Overrides the context the chain threads forward.
    #[must_use]
    pub fn with_context(mut self, context: Arc<RunContext>) -> Self {
        self.context = Some(context);
        self
    }
}

/// Trait for middleware applied after each step.
///
/// A middleware may mutate the shared context in place, override the result
/// or context via its [`Outcome`], or recover a failed step by setting the
/// context success flag and returning the recovered result. An error
/// returned here propagates uncaught and aborts the whole pipeline
/// invocation.
#[async_trait]
pub trait Middleware: Send + Sync {
    /// Returns the middleware's name, used for logging.
    fn name(&self) -> &str {
        "middleware"
    }

    /// Handles one `(result, context)` pair.
    async fn handle(
        &self,
        result: &serde_json::Value,
        ctx: &Arc<RunContext>,
    ) -> anyhow::Result<Outcome>;
}

/// An ordered chain of middleware.
///
/// The output of middleware *i* feeds middleware *i+1*; the chain provides
/// no isolation between stages, so any middleware error ends the run.
#[derive(Default)]
pub struct MiddlewareChain {
    stages: Vec<Arc<dyn Middleware>>,
}

impl MiddlewareChain {
    /// Creates a chain from an ordered middleware list.
    #[must_use]
    pub fn new(stages: Vec<Arc<dyn Middleware>>) -> Self {
        Self { stages }
    }

    /// Appends a middleware to the end of the chain.
    pub fn push(&mut self, middleware: Arc<dyn Middleware>) {
        self.stages.push(middleware);
    }

    /// Returns the number of middleware in the chain.
    #[must_use]
    pub fn len(&self) -> usize {
        self.stages.len()
    }

    /// Returns true if the chain is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// Runs every middleware in order over `(result, ctx)`.
    ///
    /// An empty chain returns the input unchanged.
    pub async fn run(
        &self,
        result: serde_json::Value,
        ctx: Arc<RunContext>,
    ) -> anyhow::Result<(serde_json::Value, Arc<RunContext>)> {
        let mut result = result;
        let mut ctx = ctx;

        for middleware in &self.stages {
            tracing::trace!(
                run_id = %ctx.run_id(),
                middleware = middleware.name(),
                "running middleware"
            );
            let outcome = middleware.handle(&result, &ctx).await?;
            if let Some(new_result) = outcome.result {
                result = new_result;
            }
            if let Some(new_ctx) = outcome.context {
                ctx = new_ctx;
            }
        }

        Ok((result, ctx))
    }
}

impl std::fmt::Debug for MiddlewareChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MiddlewareChain")
            .field("len", &self.stages.len())
            .finish()
    }
}
