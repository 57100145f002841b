//! The mutable context for one pipeline invocation.

use super::ContextBag;
use crate::steps::StepEntry;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use uuid::Uuid;

/// Mutable shared state for one pipeline run.
///
/// Created fresh by the engine for each invocation and handed to every step
/// and middleware as a shared handle (`Arc<RunContext>`). Mutation goes
/// through interior-mutable fields; execution is strictly sequential, so
/// there is never more than one writer at a time, but a single context must
/// not be shared across concurrent pipeline invocations.
#[derive(Debug)]
pub struct RunContext {
    /// Correlation id for this run.
    run_id: Uuid,
    /// The original input value, immutable after creation.
    initial: serde_json::Value,
    /// The most recently committed result.
    current: RwLock<serde_json::Value>,
    /// The step currently executing, set by the engine before each step.
    method: RwLock<Option<Arc<StepEntry>>>,
    /// Append-only committed results, one per successfully completed step.
    results: RwLock<Vec<serde_json::Value>>,
    /// Success flag for the current step attempt.
    success: AtomicBool,
    /// Caller-seeded auxiliary state; opaque to the engine.
    pub data: ContextBag,
}

impl RunContext {
    /// Creates a new context for a run with the given input and seed data.
    #[must_use]
    pub fn new(initial: serde_json::Value, seed_data: HashMap<String, serde_json::Value>) -> Self {
        let current = initial.clone();
        Self {
            run_id: Uuid::new_v4(),
            initial,
            current: RwLock::new(current),
            method: RwLock::new(None),
            results: RwLock::new(Vec::new()),
            success: AtomicBool::new(false),
            data: ContextBag::from_data(seed_data),
        }
    }

    /// Returns the run correlation id.
    #[must_use]
    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// Returns the original input value.
    #[must_use]
    pub fn initial(&self) -> &serde_json::Value {
        &self.initial
    }

    /// Returns the most recently committed result.
    ///
    /// Before any step commits, this is a copy of the initial argument.
    #[must_use]
    pub fn current(&self) -> serde_json::Value {
        self.current.read().clone()
    }

    /// Returns the step currently executing, if any.
    #[must_use]
    pub fn method(&self) -> Option<Arc<StepEntry>> {
        self.method.read().clone()
    }

    /// Returns whether the most recent step attempt ended in success.
    #[must_use]
    pub fn succeeded(&self) -> bool {
        self.success.load(Ordering::SeqCst)
    }

    /// Sets the success flag for the current step.
    ///
    /// A middleware that recovers a failed step must set this to `true` so
    /// the engine commits the recovered result.
    pub fn set_success(&self, value: bool) {
        self.success.store(value, Ordering::SeqCst);
    }

    /// Returns a copy of the committed results.
    #[must_use]
    pub fn results(&self) -> Vec<serde_json::Value> {
        self.results.read().clone()
    }

    /// Returns the number of committed results.
    #[must_use]
    pub fn result_count(&self) -> usize {
        self.results.read().len()
    }

    /// Returns the result committed `steps_back` steps ago.
    ///
    /// `previous(1)` is the most recent committed result. The lookup is
    /// evaluated against the committed results at call time, so it tracks
    /// the list as it grows. Out-of-range lookups (including `previous(0)`)
    /// return `None`.
    #[must_use]
    pub fn previous(&self, steps_back: usize) -> Option<serde_json::Value> {
        let results = self.results.read();
        if steps_back == 0 {
            return None;
        }
        results.len().checked_sub(steps_back).map(|i| results[i].clone())
    }

    /// Returns the result committed by the `steps_forward`-th committing
    /// step, counted from the start of the run.
    ///
    /// `first(0)` is the first committed result. Out-of-range lookups
    /// return `None`.
    #[must_use]
    pub fn first(&self, steps_forward: usize) -> Option<serde_json::Value> {
        self.results.read().get(steps_forward).cloned()
    }

    /// Marks `entry` as the step about to execute and resets the success
    /// flag for the new attempt.
    pub(crate) fn begin_step(&self, entry: Arc<StepEntry>) {
        *self.method.write() = Some(entry);
        self.success.store(false, Ordering::SeqCst);
    }

    /// Commits a step result: appends it to the results and makes it the
    /// current value.
    pub(crate) fn commit(&self, value: serde_json::Value) {
        let mut results = self.results.write();
        *self.current.write() = value.clone();
        results.push(value);
    }
}
