//! Batch execution driver
//!
//! Runs a plan level by level. All subtasks of a level are dispatched
//! concurrently and the level settles before the next one starts. A failed
//! subtask becomes a failed result; it never stops its siblings or later
//! levels.

use super::{group_with_report, ExecutionLevel};
use crate::error::RelayError;
use crate::invoker::FallbackInvoker;
use crate::registry::PluginRegistry;
use crate::types::{ExecutionContext, InvocationResult, ServiceRequest, Subtask};
use futures::future::join_all;
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// How a subtask was dispatched
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DispatchRoute {
    /// Through a registered plugin
    Plugin,
    /// Through the generic role's service chain
    Generic,
}

/// Why a subtask produced no result of its own
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Every service in the chain failed; candidate for escalation
    ServicesExhausted,
    /// Input did not match the plugin's schema
    InvalidInput,
    /// The plugin runner failed
    PluginError,
}

impl FailureKind {
    fn of(err: &RelayError) -> Self {
        match err {
            RelayError::AllServicesFailed { .. } => Self::ServicesExhausted,
            RelayError::PluginValidation { .. } => Self::InvalidInput,
            _ => Self::PluginError,
        }
    }
}

/// Result of one subtask
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubtaskOutcome {
    /// Subtask id
    pub subtask_id: String,
    /// Plugin id the subtask named
    pub target_id: String,
    /// Level the subtask ran in
    pub level: usize,
    /// Dispatch path taken
    pub route: DispatchRoute,
    /// Result, failed when dispatch errored
    pub result: InvocationResult,
    /// Set when dispatch errored
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<FailureKind>,
    /// Rendered dispatch error
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SubtaskOutcome {
    /// Whether the subtask produced a successful result
    #[inline]
    #[must_use]
    pub fn succeeded(&self) -> bool {
        self.result.success
    }
}

/// Everything a batch run produced
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchReport {
    /// One outcome per subtask, ordered by level then input order
    pub outcomes: Vec<SubtaskOutcome>,
    /// Subtask ids per level
    pub levels: Vec<Vec<String>>,
    /// Ids forced into the final level by a dependency cycle
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub forced: Option<Vec<String>>,
    /// Successful outcomes
    pub succeeded: usize,
    /// Failed outcomes
    pub failed: usize,
    /// Wall-clock duration of the batch
    pub duration_ms: u64,
}

impl BatchReport {
    /// Outcome for a subtask id
    #[must_use]
    pub fn outcome(&self, subtask_id: &str) -> Option<&SubtaskOutcome> {
        self.outcomes.iter().find(|o| o.subtask_id == subtask_id)
    }

    /// Outcomes whose service chain was exhausted
    pub fn exhausted(&self) -> impl Iterator<Item = &SubtaskOutcome> {
        self.outcomes
            .iter()
            .filter(|o| o.failure == Some(FailureKind::ServicesExhausted))
    }

    /// Whether every subtask succeeded
    #[inline]
    #[must_use]
    pub fn all_succeeded(&self) -> bool {
        self.failed == 0
    }
}

/// Executes subtask plans against the registry and the generic chain
#[derive(Debug, Clone)]
pub struct BatchExecutor {
    registry: Arc<PluginRegistry>,
    invoker: FallbackInvoker,
    generic_role: String,
    max_parallel: Option<usize>,
}

impl BatchExecutor {
    /// Create new executor using the `agency` role for generic dispatch
    #[must_use]
    pub fn new(registry: Arc<PluginRegistry>, invoker: FallbackInvoker) -> Self {
        Self {
            registry,
            invoker,
            generic_role: "agency".to_string(),
            max_parallel: None,
        }
    }

    /// With role whose chain serves subtasks without a plugin
    #[inline]
    #[must_use]
    pub fn with_generic_role(mut self, role: impl Into<String>) -> Self {
        self.generic_role = role.into();
        self
    }

    /// With upper bound on concurrent dispatches within a level
    #[inline]
    #[must_use]
    pub fn with_max_parallel(mut self, max: Option<usize>) -> Self {
        self.max_parallel = max.filter(|m| *m > 0);
        self
    }

    /// Registry used for dispatch
    #[must_use]
    pub fn registry(&self) -> &Arc<PluginRegistry> {
        &self.registry
    }

    /// Group and run a batch of subtasks
    ///
    /// Never fails: per-subtask errors are folded into the report.
    pub async fn run(&self, subtasks: &[Subtask], ctx: &ExecutionContext) -> BatchReport {
        let started = Instant::now();
        let plan = group_with_report(subtasks);
        info!(
            run_id = %ctx.run_id,
            subtasks = subtasks.len(),
            levels = plan.levels.len(),
            forced = plan.has_cycle(),
            "Executing batch"
        );

        let mut outcomes = Vec::with_capacity(subtasks.len());
        for level in &plan.levels {
            outcomes.extend(self.run_level(level, ctx).await);
        }

        let succeeded = outcomes.iter().filter(|o| o.succeeded()).count();
        let report = BatchReport {
            failed: outcomes.len() - succeeded,
            succeeded,
            levels: plan
                .id_levels()
                .into_iter()
                .map(|ids| ids.into_iter().map(str::to_string).collect())
                .collect(),
            forced: plan.forced,
            outcomes,
            duration_ms: u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
        };
        info!(
            run_id = %ctx.run_id,
            succeeded = report.succeeded,
            failed = report.failed,
            duration_ms = report.duration_ms,
            "Batch complete"
        );
        report
    }

    async fn run_level(&self, level: &ExecutionLevel, ctx: &ExecutionContext) -> Vec<SubtaskOutcome> {
        debug!(level = level.index, subtasks = ?level.ids(), "Dispatching level");
        match self.max_parallel {
            None => join_all(level.subtasks.iter().map(|t| self.dispatch(t, level.index, ctx))).await,
            Some(limit) => {
                let mut indexed: Vec<(usize, SubtaskOutcome)> = stream::iter(
                    level.subtasks.iter().enumerate(),
                )
                .map(|(i, task)| async move { (i, self.dispatch(task, level.index, ctx).await) })
                .buffer_unordered(limit)
                .collect()
                .await;
                indexed.sort_by_key(|(i, _)| *i);
                indexed.into_iter().map(|(_, outcome)| outcome).collect()
            }
        }
    }

    async fn dispatch(&self, task: &Subtask, level: usize, ctx: &ExecutionContext) -> SubtaskOutcome {
        let input = Value::Object(task.input.clone());
        let (route, attempt) = match self.registry.execute(&task.target_id, input, ctx).await {
            Err(RelayError::PluginNotFound { .. }) => {
                debug!(subtask = %task.id, target = %task.target_id, "No plugin, using generic chain");
                let request = ServiceRequest::new(task.description.clone())
                    .with_payload(Value::Object(task.input.clone()));
                let attempt = self.invoker.invoke_for_role(&self.generic_role, &request).await;
                (DispatchRoute::Generic, attempt)
            }
            other => (DispatchRoute::Plugin, other),
        };

        match attempt {
            Ok(result) => SubtaskOutcome {
                subtask_id: task.id.clone(),
                target_id: task.target_id.clone(),
                level,
                route,
                result,
                failure: None,
                error: None,
            },
            Err(err) => {
                warn!(subtask = %task.id, target = %task.target_id, error = %err, "Subtask failed");
                SubtaskOutcome {
                    subtask_id: task.id.clone(),
                    target_id: task.target_id.clone(),
                    level,
                    route,
                    result: InvocationResult::from_error(&err),
                    failure: Some(FailureKind::of(&err)),
                    error: Some(err.to_string()),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::router::Router;

    #[tokio::test]
    async fn empty_batch_reports_nothing() {
        let executor = BatchExecutor::new(
            Arc::new(PluginRegistry::new()),
            FallbackInvoker::new(Arc::new(Router::default())),
        );
        let report = executor.run(&[], &ExecutionContext::new("s")).await;
        assert!(report.outcomes.is_empty());
        assert!(report.levels.is_empty());
        assert!(report.all_succeeded());
    }

    #[tokio::test]
    async fn unroutable_generic_subtask_is_exhausted() {
        let executor = BatchExecutor::new(
            Arc::new(PluginRegistry::new()),
            FallbackInvoker::new(Arc::new(Router::default())),
        );
        let report = executor
            .run(&[Subtask::new("t1", "summarize")], &ExecutionContext::new("s"))
            .await;
        let outcome = report.outcome("t1").unwrap();
        assert_eq!(outcome.route, DispatchRoute::Generic);
        assert_eq!(outcome.failure, Some(FailureKind::ServicesExhausted));
        assert!(!outcome.succeeded());
        assert_eq!(report.exhausted().count(), 1);
        assert_eq!(report.failed, 1);
    }
}
