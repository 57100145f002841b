//! Test doubles for pipelines, steps, and the retry sleeper.

use crate::context::RunContext;
use crate::middleware::{Middleware, Outcome, Sleeper};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// A step that always fails with a fixed message.
pub struct FailingStep {
    message: String,
    calls: AtomicUsize,
}

impl FailingStep {
    /// Creates a step failing with `message`.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            calls: AtomicUsize::new(0),
        }
    }

    /// Returns how many times the step was invoked.
    #[must_use]
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl crate::steps::Step for FailingStep {
    async fn run(
        &self,
        _value: serde_json::Value,
        _ctx: &RunContext,
    ) -> anyhow::Result<serde_json::Value> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(anyhow::anyhow!("{}", self.message))
    }
}

/// A step that fails a fixed number of times, then applies a synchronous
/// transform to the incoming value.
pub struct FlakyStep {
    fail_times: usize,
    message: String,
    calls: AtomicUsize,
    op: Box<dyn Fn(serde_json::Value) -> serde_json::Value + Send + Sync>,
}

impl FlakyStep {
    /// Creates a step that fails its first `fail_times` invocations.
    #[must_use]
    pub fn new(
        fail_times: usize,
        message: impl Into<String>,
        op: impl Fn(serde_json::Value) -> serde_json::Value + Send + Sync + 'static,
    ) -> Self {
        Self {
            fail_times,
            message: message.into(),
            calls: AtomicUsize::new(0),
            op: Box::new(op),
        }
    }

    /// Returns how many times the step was invoked.
    #[must_use]
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl crate::steps::Step for FlakyStep {
    async fn run(
        &self,
        value: serde_json::Value,
        _ctx: &RunContext,
    ) -> anyhow::Result<serde_json::Value> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if call <= self.fail_times {
            return Err(anyhow::anyhow!("{}", self.message));
        }
        Ok((self.op)(value))
    }
}

/// A sleeper that records requested delays and returns immediately.
///
/// Clones share the same recording.
#[derive(Debug, Clone, Default)]
pub struct RecordingSleeper {
    delays: Arc<Mutex<Vec<Duration>>>,
}

impl RecordingSleeper {
    /// Creates a sleeper with an empty recording.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the recorded delays, in request order.
    #[must_use]
    pub fn delays(&self) -> Vec<Duration> {
        self.delays.lock().clone()
    }
}

#[async_trait]
impl Sleeper for RecordingSleeper {
    async fn sleep(&self, duration: Duration) {
        self.delays.lock().push(duration);
    }
}

/// A middleware that counts its invocations and passes everything through.
#[derive(Debug, Clone, Default)]
pub struct CountingMiddleware {
    calls: Arc<AtomicUsize>,
}

impl CountingMiddleware {
    /// Creates a middleware with a zeroed counter.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns how many times the middleware ran.
    #[must_use]
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Middleware for CountingMiddleware {
    fn name(&self) -> &str {
        "counting"
    }

    async fn handle(
        &self,
        _result: &serde_json::Value,
        _ctx: &Arc<RunContext>,
    ) -> anyhow::Result<Outcome> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(Outcome::unchanged())
    }
}
