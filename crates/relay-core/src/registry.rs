//! Plugin registry
//!
//! Provides [`PluginRegistry`] for registering plugins by id, looking them up
//! by id or capability, and running them with input validation.

use crate::error::RelayError;
use crate::plugin::{PluginDescriptor, PluginSummary};
use crate::types::{ExecutionContext, InvocationResult};
use dashmap::DashMap;
use serde_json::Value;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

/// Registry of plugins keyed by id
///
/// Registration and lookup may race freely; the last registration under an
/// id wins and in-flight runs keep the descriptor they started with.
#[derive(Debug, Default)]
pub struct PluginRegistry {
    plugins: DashMap<String, Arc<PluginDescriptor>>,
}

impl PluginRegistry {
    /// Create new empty registry
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a plugin, replacing any previous one with the same id
    ///
    /// Returns the replaced descriptor.
    pub fn register(&self, descriptor: PluginDescriptor) -> Option<Arc<PluginDescriptor>> {
        let id = descriptor.id.clone();
        let version = descriptor.version.clone();
        let capabilities: Vec<_> = descriptor.capabilities.iter().cloned().collect();
        let previous = self.plugins.insert(id.clone(), Arc::new(descriptor));
        if previous.is_some() {
            warn!(plugin = %id, "Plugin already registered, replacing");
        }
        info!(plugin = %id, version = %version, capabilities = ?capabilities, "Plugin registered");
        previous
    }

    /// Remove a plugin
    pub fn unregister(&self, id: &str) -> bool {
        let removed = self.plugins.remove(id).is_some();
        if removed {
            info!(plugin = %id, "Plugin unregistered");
        }
        removed
    }

    /// Look up a plugin
    #[must_use]
    pub fn get(&self, id: &str) -> Option<Arc<PluginDescriptor>> {
        self.plugins.get(id).map(|entry| Arc::clone(entry.value()))
    }

    /// Check if a plugin is registered
    #[inline]
    #[must_use]
    pub fn has(&self, id: &str) -> bool {
        self.plugins.contains_key(id)
    }

    /// All plugins, sorted by id
    #[must_use]
    pub fn list(&self) -> Vec<Arc<PluginDescriptor>> {
        let mut plugins: Vec<_> = self.plugins.iter().map(|e| Arc::clone(e.value())).collect();
        plugins.sort_by(|a, b| a.id.cmp(&b.id));
        plugins
    }

    /// Plugins carrying a capability tag, sorted by id
    #[must_use]
    pub fn find_by_capability(&self, capability: &str) -> Vec<Arc<PluginDescriptor>> {
        self.list()
            .into_iter()
            .filter(|plugin| plugin.has_capability(capability))
            .collect()
    }

    /// Summaries of all plugins, sorted by id
    #[must_use]
    pub fn summary(&self) -> Vec<PluginSummary> {
        self.list().iter().map(|plugin| plugin.summary()).collect()
    }

    /// Number of registered plugins
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.plugins.len()
    }

    /// Check if registry is empty
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }

    /// Validate input and run a plugin
    ///
    /// # Arguments
    /// * `id` - Plugin id
    /// * `input` - Input record, checked against the plugin's input schema
    /// * `ctx` - Execution context passed to the runner
    ///
    /// # Errors
    /// - [`RelayError::PluginNotFound`] if no plugin has this id
    /// - [`RelayError::PluginValidation`] if the input does not conform; the
    ///   runner is not called
    /// - whatever the runner returns
    pub async fn execute(
        &self,
        id: &str,
        input: Value,
        ctx: &ExecutionContext,
    ) -> Result<InvocationResult, RelayError> {
        let plugin = self.get(id).ok_or_else(|| RelayError::PluginNotFound {
            agent_id: id.to_string(),
        })?;

        plugin
            .input_schema
            .validate(&input)
            .map_err(|violations| RelayError::PluginValidation {
                agent_id: id.to_string(),
                violations,
            })?;

        let input_keys: Vec<String> = input
            .as_object()
            .map(|map| map.keys().cloned().collect())
            .unwrap_or_default();
        info!(plugin = %id, run_id = %ctx.run_id, input_keys = ?input_keys, "Executing plugin");

        let started = Instant::now();
        let result = plugin.runner.run(input, ctx).await?;
        let elapsed = started.elapsed();

        if result.success {
            if let Err(violations) = plugin.output_schema.validate(&result.output) {
                warn!(
                    plugin = %id,
                    violations = violations.len(),
                    first = ?violations.first().map(ToString::to_string),
                    "Plugin output does not match its schema"
                );
            }
        }

        info!(
            plugin = %id,
            success = result.success,
            service = %result.service_used,
            duration_ms = elapsed.as_millis() as u64,
            "Plugin completed"
        );
        Ok(result.with_duration(elapsed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugin::PluginRunner;
    use crate::schema::Schema;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct Counting {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl PluginRunner for Counting {
        async fn run(
            &self,
            input: Value,
            _ctx: &ExecutionContext,
        ) -> Result<InvocationResult, RelayError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(InvocationResult::succeeded("stub", input))
        }
    }

    fn descriptor(id: &str, runner: Arc<Counting>) -> PluginDescriptor {
        PluginDescriptor::new(id, runner).with_input_schema(
            Schema::new(json!({
                "type": "object",
                "properties": { "metric": { "type": "string" } },
                "required": ["metric"]
            }))
            .unwrap(),
        )
    }

    #[test]
    fn registry_new_empty() {
        let registry = PluginRegistry::new();
        assert!(registry.is_empty());
        assert_eq!(registry.len(), 0);
    }

    #[test]
    fn register_replaces_existing() {
        let registry = PluginRegistry::new();
        let first = descriptor("p", Arc::default()).with_version("1.0.0");
        let second = descriptor("p", Arc::default()).with_version("2.0.0");
        assert!(registry.register(first).is_none());
        let replaced = registry.register(second).unwrap();
        assert_eq!(replaced.version, "1.0.0");
        assert_eq!(registry.get("p").unwrap().version, "2.0.0");
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn unregister_reports_presence() {
        let registry = PluginRegistry::new();
        registry.register(descriptor("p", Arc::default()));
        assert!(registry.unregister("p"));
        assert!(!registry.unregister("p"));
        assert!(!registry.has("p"));
    }

    #[test]
    fn find_by_capability_scans_all() {
        let registry = PluginRegistry::new();
        registry.register(descriptor("b", Arc::default()).with_capability("analytics"));
        registry.register(descriptor("a", Arc::default()).with_capability("analytics"));
        registry.register(descriptor("c", Arc::default()).with_capability("email"));
        let ids: Vec<_> = registry
            .find_by_capability("analytics")
            .iter()
            .map(|p| p.id.clone())
            .collect();
        assert_eq!(ids, vec!["a", "b"]);
        assert_eq!(registry.summary().len(), 3);
    }

    #[tokio::test]
    async fn execute_missing_plugin() {
        let registry = PluginRegistry::new();
        let err = registry
            .execute("missing-id", json!({}), &ExecutionContext::new("s"))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            RelayError::PluginNotFound { ref agent_id } if agent_id == "missing-id"
        ));
    }

    #[tokio::test]
    async fn invalid_input_never_reaches_runner() {
        let runner = Arc::new(Counting::default());
        let registry = PluginRegistry::new();
        registry.register(descriptor("p", runner.clone()));

        let err = registry
            .execute("p", json!({ "metric": 3 }), &ExecutionContext::new("s"))
            .await
            .unwrap_err();
        assert!(matches!(err, RelayError::PluginValidation { .. }));
        assert_eq!(runner.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn valid_input_runs_and_records_duration() {
        let runner = Arc::new(Counting::default());
        let registry = PluginRegistry::new();
        registry.register(descriptor("p", runner.clone()));

        let result = registry
            .execute("p", json!({ "metric": "churn" }), &ExecutionContext::new("s"))
            .await
            .unwrap();
        assert!(result.success);
        assert!(result.duration_ms.is_some());
        assert_eq!(result.output["metric"], "churn");
        assert_eq!(runner.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn output_schema_mismatch_is_kept() {
        let registry = PluginRegistry::new();
        registry.register(
            descriptor("p", Arc::default())
                .with_output_schema(Schema::new(json!({ "type": "array" })).unwrap()),
        );
        let result = registry
            .execute("p", json!({ "metric": "churn" }), &ExecutionContext::new("s"))
            .await
            .unwrap();
        assert!(result.success);
    }
}
