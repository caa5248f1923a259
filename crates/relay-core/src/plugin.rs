//! Plugin descriptors and runners
//!
//! A plugin is a fixed descriptor record: identity, capability tags, input
//! and output schemas, and the runner that does the work.

use crate::error::RelayError;
use crate::invoker::FallbackInvoker;
use crate::schema::Schema;
use crate::types::{ExecutionContext, InvocationResult, ServiceAssignment, ServiceRequest, NO_SERVICE};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;
use tracing::warn;

/// Entry point of a plugin
///
/// The input has already been validated against the descriptor's input
/// schema when `run` is called.
#[async_trait]
pub trait PluginRunner: Send + Sync {
    /// Run the plugin once
    async fn run(
        &self,
        input: Value,
        ctx: &ExecutionContext,
    ) -> Result<InvocationResult, RelayError>;
}

/// Registered plugin
#[derive(Clone)]
pub struct PluginDescriptor {
    /// Unique id
    pub id: String,
    /// Human-readable name
    pub name: String,
    /// What the plugin does
    pub description: String,
    /// Version string
    pub version: String,
    /// Capability tags
    pub capabilities: BTreeSet<String>,
    /// Input contract, enforced before `run`
    pub input_schema: Schema,
    /// Output contract, advisory
    pub output_schema: Schema,
    /// Entry point
    pub runner: Arc<dyn PluginRunner>,
}

impl PluginDescriptor {
    /// Create new descriptor accepting any input
    #[must_use]
    pub fn new(id: impl Into<String>, runner: Arc<dyn PluginRunner>) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            description: String::new(),
            version: "0.1.0".to_string(),
            capabilities: BTreeSet::new(),
            input_schema: Schema::any(),
            output_schema: Schema::any(),
            runner,
        }
    }

    /// With name
    #[inline]
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// With description
    #[inline]
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// With version
    #[inline]
    #[must_use]
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    /// With capability tag
    #[inline]
    #[must_use]
    pub fn with_capability(mut self, capability: impl Into<String>) -> Self {
        self.capabilities.insert(capability.into());
        self
    }

    /// With input schema
    #[inline]
    #[must_use]
    pub fn with_input_schema(mut self, schema: Schema) -> Self {
        self.input_schema = schema;
        self
    }

    /// With output schema
    #[inline]
    #[must_use]
    pub fn with_output_schema(mut self, schema: Schema) -> Self {
        self.output_schema = schema;
        self
    }

    /// Whether the plugin carries a capability tag
    #[must_use]
    pub fn has_capability(&self, capability: &str) -> bool {
        self.capabilities.contains(capability)
    }

    /// Descriptor without its runner
    #[must_use]
    pub fn summary(&self) -> PluginSummary {
        PluginSummary {
            id: self.id.clone(),
            name: self.name.clone(),
            description: self.description.clone(),
            version: self.version.clone(),
            capabilities: self.capabilities.clone(),
        }
    }
}

impl fmt::Debug for PluginDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginDescriptor")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("version", &self.version)
            .field("capabilities", &self.capabilities)
            .finish_non_exhaustive()
    }
}

/// Serializable view of a descriptor
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PluginSummary {
    /// Unique id
    pub id: String,
    /// Human-readable name
    pub name: String,
    /// What the plugin does
    pub description: String,
    /// Version string
    pub version: String,
    /// Capability tags
    pub capabilities: BTreeSet<String>,
}

/// Runner that hands its input to a reasoning service chain
///
/// The input is serialized as the prompt. When every service fails the run
/// still succeeds with a failed result; exhaustion does not escape a plugin.
#[derive(Debug, Clone)]
pub struct ServicePlugin {
    plugin_id: String,
    invoker: FallbackInvoker,
    assignment: ServiceAssignment,
    system: Option<String>,
    capabilities: Vec<String>,
    max_steps: u32,
    temperature: f32,
}

impl ServicePlugin {
    /// Create new service-backed runner
    #[must_use]
    pub fn new(plugin_id: impl Into<String>, invoker: FallbackInvoker) -> Self {
        Self {
            plugin_id: plugin_id.into(),
            invoker,
            assignment: ServiceAssignment::default(),
            system: None,
            capabilities: Vec::new(),
            max_steps: 10,
            temperature: 0.2,
        }
    }

    /// With service chain
    #[inline]
    #[must_use]
    pub fn with_assignment(mut self, assignment: ServiceAssignment) -> Self {
        self.assignment = assignment;
        self
    }

    /// With system instructions
    #[inline]
    #[must_use]
    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    /// With capabilities offered to the service
    #[inline]
    #[must_use]
    pub fn with_capabilities<I, S>(mut self, capabilities: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.capabilities = capabilities.into_iter().map(Into::into).collect();
        self
    }

    /// With step budget
    #[inline]
    #[must_use]
    pub fn with_max_steps(mut self, max_steps: u32) -> Self {
        self.max_steps = max_steps;
        self
    }

    fn request(&self, input: &Value) -> ServiceRequest {
        let mut request = ServiceRequest::new(input.to_string())
            .with_capabilities(self.capabilities.iter().cloned())
            .with_max_steps(self.max_steps)
            .with_temperature(self.temperature);
        if let Some(system) = &self.system {
            request = request.with_system(system.clone());
        }
        request
    }
}

#[async_trait]
impl PluginRunner for ServicePlugin {
    async fn run(
        &self,
        input: Value,
        _ctx: &ExecutionContext,
    ) -> Result<InvocationResult, RelayError> {
        let chain = self.assignment.chain();
        match self
            .invoker
            .invoke(&self.plugin_id, &chain, &self.request(&input))
            .await
        {
            Ok(result) => Ok(result),
            Err(err @ RelayError::AllServicesFailed { .. }) => {
                warn!(plugin = %self.plugin_id, error = %err, "Plugin exhausted its services");
                Ok(InvocationResult::failed(NO_SERVICE, Value::Null))
            }
            Err(err) => Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::router::Router;
    use serde_json::json;

    struct Noop;

    #[async_trait]
    impl PluginRunner for Noop {
        async fn run(
            &self,
            input: Value,
            _ctx: &ExecutionContext,
        ) -> Result<InvocationResult, RelayError> {
            Ok(InvocationResult::succeeded("noop", input))
        }
    }

    #[test]
    fn summary_omits_runner() {
        let descriptor = PluginDescriptor::new("cohort-monitor", Arc::new(Noop))
            .with_name("Cohort Monitor")
            .with_capability("analytics")
            .with_capability("retention");
        let summary = descriptor.summary();
        assert_eq!(summary.id, "cohort-monitor");
        assert_eq!(summary.name, "Cohort Monitor");
        assert_eq!(summary.capabilities.len(), 2);
        assert!(descriptor.has_capability("analytics"));
        assert!(!descriptor.has_capability("billing"));
    }

    #[tokio::test]
    async fn service_plugin_absorbs_exhaustion() {
        let invoker = FallbackInvoker::new(Arc::new(Router::default()));
        let plugin = ServicePlugin::new("writer", invoker)
            .with_assignment(ServiceAssignment::new("nowhere:a", ["nowhere:b"]));
        let result = plugin
            .run(json!({ "topic": "launch" }), &ExecutionContext::new("s1"))
            .await
            .unwrap();
        assert!(!result.success);
        assert_eq!(result.service_used, NO_SERVICE);
    }
}
