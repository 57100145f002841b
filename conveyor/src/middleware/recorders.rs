//! Recorder middleware: context snapshots and per-step result buckets.
//!
//! These are plain consumers of the middleware contract; they observe,
//! never transform or recover.

use super::{Middleware, Outcome};
use crate::context::RunContext;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

/// An immutable deep copy of a run context at one middleware invocation.
#[derive(Debug, Clone, Serialize)]
pub struct ContextSnapshot {
    /// The run correlation id.
    pub run_id: Uuid,
    /// Qualified name of the step that was executing, if any.
    pub step: Option<String>,
    /// The success flag at capture time.
    pub success: bool,
    /// The committed current value at capture time.
    pub current: serde_json::Value,
    /// The committed results at capture time.
    pub results: Vec<serde_json::Value>,
    /// The auxiliary data bag at capture time.
    pub data: HashMap<String, serde_json::Value>,
    /// When the snapshot was taken.
    pub captured_at: DateTime<Utc>,
}

impl ContextSnapshot {
    /// Captures a deep copy of the given context.
    #[must_use]
    pub fn capture(ctx: &RunContext) -> Self {
        Self {
            run_id: ctx.run_id(),
            step: ctx.method().map(|entry| entry.qualified_name()),
            success: ctx.succeeded(),
            current: ctx.current(),
            results: ctx.results(),
            data: ctx.data.to_dict(),
            captured_at: Utc::now(),
        }
    }
}

/// Middleware that appends a context snapshot to an append-only history
/// each time it runs.
///
/// Clones share the same history, so callers can keep one handle and read
/// the history after the run finishes.
#[derive(Debug, Clone, Default)]
pub struct SnapshotMiddleware {
    history: Arc<RwLock<Vec<ContextSnapshot>>>,
}

impl SnapshotMiddleware {
    /// Creates a snapshot middleware with an empty history.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of the captured history, oldest first.
    #[must_use]
    pub fn history(&self) -> Vec<ContextSnapshot> {
        self.history.read().clone()
    }
}

#[async_trait]
impl Middleware for SnapshotMiddleware {
    fn name(&self) -> &str {
        "snapshot"
    }

    async fn handle(
        &self,
        _result: &serde_json::Value,
        ctx: &Arc<RunContext>,
    ) -> anyhow::Result<Outcome> {
        self.history.write().push(ContextSnapshot::capture(ctx));
        Ok(Outcome::unchanged())
    }
}

/// Middleware that buckets committed results by step identity.
///
/// Keys are the step's qualified name (`"{index}:{label}"`), so
/// identically-labeled steps land in separate buckets. Failure-path
/// invocations that were not recovered are skipped.
#[derive(Debug, Clone, Default)]
pub struct ResultBucketMiddleware {
    buckets: Arc<RwLock<HashMap<String, Vec<serde_json::Value>>>>,
}

impl ResultBucketMiddleware {
    /// Creates a bucketing middleware with no buckets.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of the buckets.
    #[must_use]
    pub fn buckets(&self) -> HashMap<String, Vec<serde_json::Value>> {
        self.buckets.read().clone()
    }

    /// Returns the bucket for one step, if it has any entries.
    #[must_use]
    pub fn bucket(&self, qualified_name: &str) -> Option<Vec<serde_json::Value>> {
        self.buckets.read().get(qualified_name).cloned()
    }
}

#[async_trait]
impl Middleware for ResultBucketMiddleware {
    fn name(&self) -> &str {
        "result_bucket"
    }

    async fn handle(
        &self,
        result: &serde_json::Value,
        ctx: &Arc<RunContext>,
    ) -> anyhow::Result<Outcome> {
        if ctx.succeeded() {
            if let Some(entry) = ctx.method() {
                self.buckets
                    .write()
                    .entry(entry.qualified_name())
                    .or_default()
                    .push(result.clone());
            }
        }
        Ok(Outcome::unchanged())
    }
}
