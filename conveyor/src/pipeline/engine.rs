//! The sequential execution engine.

use crate::context::RunContext;
use crate::errors::PipelineError;
use crate::middleware::{Middleware, MiddlewareChain};
use crate::steps::{Step, StepEntry, StepId};
use std::collections::HashMap;
use std::sync::Arc;

/// Per-invocation configuration for [`Pipeline::run`].
#[derive(Default)]
pub struct RunOptions {
    /// Initial entries for the context data bag.
    pub seed_data: HashMap<String, serde_json::Value>,
    /// Ordered middleware applied after every step.
    pub middleware: Vec<Arc<dyn Middleware>>,
}

impl RunOptions {
    /// Creates empty options: no seed data, no middleware.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the seed data merged into the context bag at creation.
    #[must_use]
    pub fn with_seed_data(mut self, seed_data: HashMap<String, serde_json::Value>) -> Self {
        self.seed_data = seed_data;
        self
    }

    /// Appends a middleware to the chain.
    #[must_use]
    pub fn with_middleware(mut self, middleware: Arc<dyn Middleware>) -> Self {
        self.middleware.push(middleware);
        self
    }
}

impl std::fmt::Debug for RunOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunOptions")
            .field("seed_data", &self.seed_data)
            .field("middleware", &self.middleware.len())
            .finish()
    }
}

/// The final `(result, context)` pair of a pipeline run.
#[derive(Debug)]
pub struct RunOutput {
    /// The final working value.
    pub result: serde_json::Value,
    /// The context threaded through the run.
    pub context: Arc<RunContext>,
}

/// Builder assembling an ordered list of labeled steps.
#[derive(Default)]
pub struct PipelineBuilder {
    steps: Vec<(String, Arc<dyn Step>)>,
}

impl PipelineBuilder {
    /// Creates an empty builder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a step with a label.
    #[must_use]
    pub fn step(mut self, label: impl Into<String>, step: impl Step + 'static) -> Self {
        self.steps.push((label.into(), Arc::new(step)));
        self
    }

    /// Appends an already-shared step with a label.
    #[must_use]
    pub fn step_arc(mut self, label: impl Into<String>, step: Arc<dyn Step>) -> Self {
        self.steps.push((label.into(), step));
        self
    }

    /// Builds the pipeline, assigning each step a stable positional id.
    #[must_use]
    pub fn build(self) -> Pipeline {
        let steps = self
            .steps
            .into_iter()
            .enumerate()
            .map(|(index, (label, step))| {
                Arc::new(StepEntry::new(StepId::new(index), label, step))
            })
            .collect();
        Pipeline { steps }
    }
}

/// A fixed, ordered list of steps executed strictly sequentially.
///
/// Each invocation creates a fresh [`RunContext`], executes one step at a
/// time, and routes every outcome through the middleware chain before
/// deciding whether to commit it. Step `i+1` never begins until step `i`,
/// its full middleware chain, and any retries have resolved.
pub struct Pipeline {
    steps: Vec<Arc<StepEntry>>,
}

impl Pipeline {
    /// Creates a pipeline from unlabeled steps.
    #[must_use]
    pub fn new(steps: Vec<Arc<dyn Step>>) -> Self {
        let steps = steps
            .into_iter()
            .enumerate()
            .map(|(index, step)| Arc::new(StepEntry::new(StepId::new(index), "step", step)))
            .collect();
        Self { steps }
    }

    /// Returns a builder for labeled steps.
    #[must_use]
    pub fn builder() -> PipelineBuilder {
        PipelineBuilder::new()
    }

    /// Returns the number of steps.
    #[must_use]
    pub fn step_count(&self) -> usize {
        self.steps.len()
    }

    /// Runs the pipeline over `initial`.
    ///
    /// Per step: the step executes with a copy of the working value; on
    /// success the middleware chain runs over the step result and the chain
    /// output is committed; on failure the chain runs over the pre-step
    /// working value and the output is committed only if a middleware
    /// flipped the context success flag. An unrecovered failure leaves the
    /// working value untouched and the run continues with the next step.
    /// Only an error escaping the middleware chain aborts the invocation.
    pub async fn run(
        &self,
        initial: serde_json::Value,
        options: RunOptions,
    ) -> Result<RunOutput, PipelineError> {
        let RunOptions {
            seed_data,
            middleware,
        } = options;

        let mut ctx = Arc::new(RunContext::new(initial.clone(), seed_data));
        let chain = MiddlewareChain::new(middleware);
        let mut working = initial;

        tracing::debug!(
            run_id = %ctx.run_id(),
            steps = self.steps.len(),
            middleware = chain.len(),
            "pipeline run started"
        );

        for entry in &self.steps {
            ctx.begin_step(Arc::clone(entry));
            tracing::trace!(
                run_id = %ctx.run_id(),
                step = %entry.qualified_name(),
                "step started"
            );

            match entry.invoke(working.clone(), &ctx).await {
                Ok(result) => {
                    ctx.set_success(true);
                    let (result, next_ctx) = chain.run(result, Arc::clone(&ctx)).await?;
                    ctx = next_ctx;
                    ctx.commit(result.clone());
                    working = result;
                }
                Err(err) => {
                    tracing::warn!(
                        run_id = %ctx.run_id(),
                        step = %entry.qualified_name(),
                        error = %err,
                        "step failed; consulting middleware"
                    );
                    // Middleware see the pre-step working value; no new
                    // result exists for this step yet.
                    let (result, next_ctx) = chain.run(working.clone(), Arc::clone(&ctx)).await?;
                    ctx = next_ctx;
                    if ctx.succeeded() {
                        tracing::info!(
                            run_id = %ctx.run_id(),
                            step = %entry.qualified_name(),
                            "step recovered by middleware"
                        );
                        ctx.commit(result.clone());
                        working = result;
                    }
                    // Unrecovered: no commit, continue with the old value.
                }
            }
        }

        tracing::debug!(
            run_id = %ctx.run_id(),
            committed = ctx.result_count(),
            "pipeline run finished"
        );

        Ok(RunOutput {
            result: working,
            context: ctx,
        })
    }
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("steps", &self.steps)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::middleware::Outcome;
    use crate::steps::FnStep;
    use crate::testing::{CountingMiddleware, FailingStep};
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn add(n: i64) -> FnStep {
        FnStep::from_sync(move |v, _| Ok(json!(v.as_i64().unwrap_or(0) + n)))
    }

    fn mul(n: i64) -> FnStep {
        FnStep::from_sync(move |v, _| Ok(json!(v.as_i64().unwrap_or(0) * n)))
    }

    #[tokio::test]
    async fn test_two_step_arithmetic() {
        let pipeline = Pipeline::builder()
            .step("add_two", add(2))
            .step("triple", mul(3))
            .build();

        let output = pipeline.run(json!(5), RunOptions::default()).await.unwrap();

        assert_eq!(output.result, json!(21));
        assert_eq!(output.context.results(), vec![json!(7), json!(21)]);
        assert_eq!(output.context.current(), json!(21));
        assert!(output.context.succeeded());
    }

    #[tokio::test]
    async fn test_zero_steps_returns_initial_copy() {
        let pipeline = Pipeline::builder().build();

        let output = pipeline
            .run(json!({"a": 1}), RunOptions::default())
            .await
            .unwrap();

        assert_eq!(output.result, json!({"a": 1}));
        assert_eq!(output.context.result_count(), 0);
        assert_eq!(output.context.initial(), &json!({"a": 1}));
    }

    #[tokio::test]
    async fn test_unrecovered_failure_is_swallowed() {
        let pipeline = Pipeline::builder()
            .step("add_two", add(2))
            .step("explode", FailingStep::new("boom"))
            .step("triple", mul(3))
            .build();

        let output = pipeline.run(json!(5), RunOptions::default()).await.unwrap();

        // The failed step commits nothing; the next step sees the previous
        // working value.
        assert_eq!(output.result, json!(21));
        assert_eq!(output.context.results(), vec![json!(7), json!(21)]);
    }

    #[tokio::test]
    async fn test_success_flag_reflects_last_step() {
        let pipeline = Pipeline::builder()
            .step("add_two", add(2))
            .step("explode", FailingStep::new("boom"))
            .build();

        let output = pipeline.run(json!(1), RunOptions::default()).await.unwrap();

        assert!(!output.context.succeeded());
        assert_eq!(output.result, json!(3));
    }

    #[tokio::test]
    async fn test_middleware_runs_after_every_step() {
        let counting = CountingMiddleware::new();
        let pipeline = Pipeline::builder()
            .step("add_two", add(2))
            .step("explode", FailingStep::new("boom"))
            .step("triple", mul(3))
            .build();

        let options = RunOptions::new().with_middleware(Arc::new(counting.clone()));
        pipeline.run(json!(0), options).await.unwrap();

        assert_eq!(counting.calls(), 3);
    }

    #[tokio::test]
    async fn test_middleware_transform_is_committed() {
        struct Double;

        #[async_trait]
        impl Middleware for Double {
            async fn handle(
                &self,
                result: &serde_json::Value,
                _ctx: &Arc<RunContext>,
            ) -> anyhow::Result<Outcome> {
                Ok(Outcome::replace(json!(result.as_i64().unwrap_or(0) * 2)))
            }
        }

        let pipeline = Pipeline::builder().step("add_one", add(1)).build();
        let options = RunOptions::new().with_middleware(Arc::new(Double));

        let output = pipeline.run(json!(1), options).await.unwrap();

        assert_eq!(output.result, json!(4));
        assert_eq!(output.context.results(), vec![json!(4)]);
    }

    #[tokio::test]
    async fn test_middleware_error_aborts_run() {
        struct Explode;

        #[async_trait]
        impl Middleware for Explode {
            async fn handle(
                &self,
                _result: &serde_json::Value,
                _ctx: &Arc<RunContext>,
            ) -> anyhow::Result<Outcome> {
                Err(anyhow::anyhow!("chain failure"))
            }
        }

        let pipeline = Pipeline::builder()
            .step("add_one", add(1))
            .step("add_one", add(1))
            .build();
        let options = RunOptions::new().with_middleware(Arc::new(Explode));

        let err = pipeline.run(json!(1), options).await.unwrap_err();
        assert_eq!(err.to_string(), "chain failure");
    }

    #[tokio::test]
    async fn test_seed_data_reaches_steps() {
        let pipeline = Pipeline::builder()
            .step(
                "offset",
                FnStep::from_sync(|v, ctx| {
                    let offset = ctx.data.get("offset").and_then(|v| v.as_i64()).unwrap_or(0);
                    Ok(json!(v.as_i64().unwrap_or(0) + offset))
                }),
            )
            .build();

        let mut seed = HashMap::new();
        seed.insert("offset".to_string(), json!(40));
        let options = RunOptions::new().with_seed_data(seed);

        let output = pipeline.run(json!(2), options).await.unwrap();
        assert_eq!(output.result, json!(42));
    }

    #[tokio::test]
    async fn test_unlabeled_steps_get_default_labels() {
        let pipeline = Pipeline::new(vec![
            Arc::new(add(1)) as Arc<dyn Step>,
            Arc::new(mul(5)),
        ]);

        let output = pipeline.run(json!(1), RunOptions::default()).await.unwrap();

        assert_eq!(output.result, json!(10));
        assert_eq!(pipeline.steps[0].qualified_name(), "0:step");
        assert_eq!(pipeline.steps[1].qualified_name(), "1:step");
    }

    #[test]
    fn test_builder_assigns_positional_ids() {
        let pipeline = Pipeline::builder()
            .step("a", add(1))
            .step("b", add(1))
            .build();

        assert_eq!(pipeline.step_count(), 2);
        assert_eq!(pipeline.steps[0].qualified_name(), "0:a");
        assert_eq!(pipeline.steps[1].qualified_name(), "1:b");
    }
}
