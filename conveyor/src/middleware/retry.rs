//! Retry middleware with bounded attempts and exponential backoff.

use super::{Middleware, Outcome};
use crate::context::RunContext;
use crate::errors::PolicyError;
use async_trait::async_trait;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// Jitter strategy to spread out retry delays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum JitterStrategy {
    /// No jitter: delays follow the backoff sequence exactly.
    #[default]
    None,
    /// Full jitter: random from 0 to delay.
    Full,
    /// Equal jitter: half fixed, half random.
    Equal,
}

impl JitterStrategy {
    /// Applies jitter to a delay.
    #[must_use]
    pub fn apply(self, delay: Duration) -> Duration {
        let millis = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);

        match self {
            Self::None => delay,
            Self::Full => {
                if millis == 0 {
                    delay
                } else {
                    Duration::from_millis(rand::thread_rng().gen_range(0..=millis))
                }
            }
            Self::Equal => {
                let half = millis / 2;
                if half == 0 {
                    delay
                } else {
                    Duration::from_millis(half + rand::thread_rng().gen_range(0..=half))
                }
            }
        }
    }
}

/// Configuration for the retry middleware.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Attempt budget inside the middleware. The original failed call made
    /// by the engine does not count against it.
    pub max_retries: usize,
    /// Delay before the second in-middleware attempt.
    pub initial_delay: Duration,
    /// Multiplier applied to the delay after each failed attempt.
    pub backoff_factor: f64,
    /// Jitter applied to each delay.
    pub jitter: JitterStrategy,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_millis(100),
            backoff_factor: 2.0,
            jitter: JitterStrategy::None,
        }
    }
}

impl RetryPolicy {
    /// Creates a policy with the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the attempt budget.
    #[must_use]
    pub fn with_max_retries(mut self, max_retries: usize) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Sets the initial delay.
    #[must_use]
    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    /// Sets the backoff factor.
    #[must_use]
    pub fn with_backoff_factor(mut self, factor: f64) -> Self {
        self.backoff_factor = factor;
        self
    }

    /// Sets the jitter strategy.
    #[must_use]
    pub fn with_jitter(mut self, jitter: JitterStrategy) -> Self {
        self.jitter = jitter;
        self
    }

    /// Validates the configuration.
    pub fn validate(&self) -> Result<(), PolicyError> {
        if self.max_retries == 0 {
            return Err(PolicyError::new("max_retries must be at least 1"));
        }
        if self.initial_delay.is_zero() {
            return Err(PolicyError::new("initial_delay must be positive"));
        }
        if self.backoff_factor < 1.0 || !self.backoff_factor.is_finite() {
            return Err(PolicyError::new("backoff_factor must be at least 1.0"));
        }
        Ok(())
    }

    /// Returns the pre-jitter delay issued after the given failed attempt
    /// (1-indexed): `initial_delay * backoff_factor^(attempt - 1)`.
    #[must_use]
    pub fn delay_for(&self, attempt: usize) -> Duration {
        let exponent = i32::try_from(attempt.saturating_sub(1)).unwrap_or(i32::MAX);
        self.initial_delay
            .mul_f64(self.backoff_factor.powi(exponent))
    }
}

/// A suspend-with-duration primitive, injectable so tests can observe
/// delays without wall-clock waits.
#[async_trait]
pub trait Sleeper: Send + Sync {
    /// Suspends the current task for `duration`.
    async fn sleep(&self, duration: Duration);
}

/// The default sleeper, backed by the tokio timer.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Middleware that recovers a failed step by re-invoking it with bounded
/// attempts and exponential backoff.
///
/// On the failure path the engine hands the chain the pre-step working
/// value; this middleware re-invokes the current step with it. On the first
/// attempt that succeeds it marks the context successful and overrides the
/// result, so the engine commits it. If the budget is exhausted, the last
/// step error is re-raised unwrapped, aborting the whole run.
///
/// Ordering matters: middleware running earlier in the chain must not clear
/// the failure signal (`ctx.succeeded() == false`) set by the engine, or the
/// retry this middleware should perform is skipped.
pub struct RetryMiddleware {
    policy: RetryPolicy,
    sleeper: Arc<dyn Sleeper>,
}

impl RetryMiddleware {
    /// Creates a retry middleware, validating the policy.
    pub fn new(policy: RetryPolicy) -> Result<Self, PolicyError> {
        policy.validate()?;
        Ok(Self {
            policy,
            sleeper: Arc::new(TokioSleeper),
        })
    }

    /// Replaces the sleeper, e.g. with a recording one in tests.
    #[must_use]
    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    /// Returns the configured policy.
    #[must_use]
    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }
}

impl std::fmt::Debug for RetryMiddleware {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetryMiddleware")
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Middleware for RetryMiddleware {
    fn name(&self) -> &str {
        "retry"
    }

    async fn handle(
        &self,
        result: &serde_json::Value,
        ctx: &Arc<RunContext>,
    ) -> anyhow::Result<Outcome> {
        // Retries apply only to the failure path.
        if ctx.succeeded() {
            return Ok(Outcome::unchanged());
        }
        let Some(entry) = ctx.method() else {
            return Ok(Outcome::unchanged());
        };

        let mut last_error: Option<anyhow::Error> = None;

        for attempt in 1..=self.policy.max_retries {
            match entry.invoke(result.clone(), ctx).await {
                Ok(value) => {
                    ctx.set_success(true);
                    tracing::info!(
                        run_id = %ctx.run_id(),
                        step = %entry.qualified_name(),
                        attempt,
                        "step recovered on retry"
                    );
                    return Ok(Outcome::replace(value));
                }
                Err(err) => {
                    tracing::debug!(
                        run_id = %ctx.run_id(),
                        step = %entry.qualified_name(),
                        attempt,
                        error = %err,
                        "retry attempt failed"
                    );
                    last_error = Some(err);
                    // No wait after the final allowed failing attempt.
                    if attempt < self.policy.max_retries {
                        let delay = self.policy.jitter.apply(self.policy.delay_for(attempt));
                        self.sleeper.sleep(delay).await;
                    }
                }
            }
        }

        // validate() guarantees at least one attempt ran.
        Err(last_error
            .unwrap_or_else(|| anyhow::anyhow!("retry budget exhausted with no attempts")))
    }
}
