//! Engine wiring
//!
//! Builds every component from a [`RelayConfig`] and shares them behind
//! `Arc`s. Nothing here is global; callers own the engine.

use crate::config::RelayConfig;
use crate::error::RelayError;
use crate::escalation::{Escalation, EscalationCoordinator, EscalationOutcome, WaitRegistry};
use crate::invoker::FallbackInvoker;
use crate::notify::Dispatcher;
use crate::registry::PluginRegistry;
use crate::router::Router;
use crate::scheduler::{BatchExecutor, BatchReport};
use crate::types::{ExecutionContext, Subtask};
use std::sync::Arc;
use std::time::Duration;

/// All engine components, wired together
#[derive(Debug, Clone)]
pub struct Engine {
    config: RelayConfig,
    router: Arc<Router>,
    invoker: FallbackInvoker,
    registry: Arc<PluginRegistry>,
    executor: BatchExecutor,
    coordinator: EscalationCoordinator,
}

impl Engine {
    /// Create engine from configuration
    ///
    /// # Arguments
    /// * `config` - Engine configuration
    /// * `router` - Router with provider clients registered
    /// * `dispatcher` - Dispatcher with channel adapters registered
    #[must_use]
    pub fn new(config: RelayConfig, router: Arc<Router>, dispatcher: Arc<Dispatcher>) -> Self {
        let invoker = FallbackInvoker::new(Arc::clone(&router))
            .with_attempt_timeout(config.services.attempt_timeout());
        let registry = Arc::new(PluginRegistry::new());
        let executor = BatchExecutor::new(Arc::clone(&registry), invoker.clone())
            .with_generic_role(config.scheduler.generic_role.clone())
            .with_max_parallel(config.scheduler.max_parallel);
        let coordinator = EscalationCoordinator::new(
            dispatcher,
            Arc::new(WaitRegistry::new()),
            config.escalation.clone(),
        );

        Self {
            config,
            router,
            invoker,
            registry,
            executor,
            coordinator,
        }
    }

    /// Validate `config`, then build the engine
    ///
    /// # Errors
    /// Returns [`RelayError::Config`] if the configuration is invalid.
    pub fn try_new(
        config: RelayConfig,
        router: Arc<Router>,
        dispatcher: Arc<Dispatcher>,
    ) -> Result<Self, RelayError> {
        config.validate()?;
        Ok(Self::new(config, router, dispatcher))
    }

    /// Configuration the engine was built from
    #[must_use]
    pub fn config(&self) -> &RelayConfig {
        &self.config
    }

    /// Service router
    #[must_use]
    pub fn router(&self) -> &Arc<Router> {
        &self.router
    }

    /// Fallback invoker
    #[must_use]
    pub fn invoker(&self) -> &FallbackInvoker {
        &self.invoker
    }

    /// Plugin registry
    #[must_use]
    pub fn registry(&self) -> &Arc<PluginRegistry> {
        &self.registry
    }

    /// Escalation coordinator
    #[must_use]
    pub fn coordinator(&self) -> &EscalationCoordinator {
        &self.coordinator
    }

    /// Group and run a subtask plan
    pub async fn run_plan(&self, subtasks: &[Subtask], ctx: &ExecutionContext) -> BatchReport {
        self.executor.run(subtasks, ctx).await
    }

    /// Escalate an engine error and wait for the decision
    pub async fn escalate_error(
        &self,
        ctx: &ExecutionContext,
        task_description: &str,
        error: &RelayError,
        timeout: Option<Duration>,
    ) -> EscalationOutcome {
        let escalation = Escalation::from_error(ctx.run_id.clone(), task_description, error);
        self.coordinator.escalate(&escalation, timeout).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ConfigError;

    #[test]
    fn engine_uses_configured_generic_role() {
        let config = RelayConfig::default().with_max_parallel(2);
        let engine = Engine::new(
            config,
            Arc::new(Router::default()),
            Arc::new(Dispatcher::new()),
        );
        assert_eq!(engine.config().scheduler.max_parallel, Some(2));
        assert!(engine.registry().is_empty());
        assert!(engine.coordinator().waits().is_empty());
    }

    #[test]
    fn try_new_rejects_invalid_config() {
        let config = RelayConfig::default().with_max_parallel(0);
        let err = Engine::try_new(
            config,
            Arc::new(Router::default()),
            Arc::new(Dispatcher::new()),
        )
        .unwrap_err();
        assert!(matches!(err, RelayError::Config(ConfigError::Invalid(_))));
        assert_eq!(err.kind(), "config");

        assert!(Engine::try_new(
            RelayConfig::default(),
            Arc::new(Router::default()),
            Arc::new(Dispatcher::new()),
        )
        .is_ok());
    }
}
