//! Core types for Relay
//!
//! Defines the fundamental types for the engine:
//! - Service assignments per agent role
//! - Invocation requests and results
//! - Subtasks produced by the planning stage
//! - Execution context handed to plugins

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeSet;
use std::time::Duration;
use ulid::Ulid;

/// Target id planners use when no plugin fits a subtask
pub const UNASSIGNED_TARGET: &str = "unassigned";

/// `service_used` value for results that no service produced
pub const NO_SERVICE: &str = "none";

/// Preferred service plus ordered fallbacks for one agent role
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceAssignment {
    /// Tried first
    pub preferred: String,
    /// Tried in order after `preferred`
    #[serde(default)]
    pub fallbacks: Vec<String>,
}

impl ServiceAssignment {
    /// Create new assignment
    #[inline]
    #[must_use]
    pub fn new<I, S>(preferred: impl Into<String>, fallbacks: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            preferred: preferred.into(),
            fallbacks: fallbacks.into_iter().map(Into::into).collect(),
        }
    }

    /// Full chain: preferred first, then fallbacks
    #[must_use]
    pub fn chain(&self) -> Vec<String> {
        std::iter::once(self.preferred.clone())
            .chain(self.fallbacks.iter().cloned())
            .collect()
    }
}

impl Default for ServiceAssignment {
    fn default() -> Self {
        Self::new(
            "anthropic:balanced",
            ["openai:balanced", "google:balanced"],
        )
    }
}

/// Request sent to a reasoning service
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ServiceRequest {
    /// System instructions
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,
    /// Prompt text
    pub prompt: String,
    /// Structured payload accompanying the prompt
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub payload: Value,
    /// Capability (tool) names the service may use; may be empty
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub capabilities: Vec<String>,
    /// Step budget when capabilities are present
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_steps: Option<u32>,
    /// Sampling temperature
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
}

impl ServiceRequest {
    /// Create new request
    #[inline]
    #[must_use]
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            ..Self::default()
        }
    }

    /// With system instructions
    #[inline]
    #[must_use]
    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    /// With structured payload
    #[inline]
    #[must_use]
    pub fn with_payload(mut self, payload: Value) -> Self {
        self.payload = payload;
        self
    }

    /// With capabilities
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
        self.max_steps = Some(max_steps);
        self
    }

    /// With temperature
    #[inline]
    #[must_use]
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }
}

/// Outcome of one invocation (service chain or plugin run)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvocationResult {
    /// Whether the call produced usable output
    pub success: bool,
    /// Opaque payload
    pub output: Value,
    /// Service id that produced the output, or [`NO_SERVICE`]
    pub service_used: String,
    /// Tokens consumed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tokens_used: Option<u64>,
    /// Tool steps taken
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step_count: Option<u32>,
    /// Wall-clock duration
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
}

impl InvocationResult {
    /// Successful result
    #[inline]
    #[must_use]
    pub fn succeeded(service_used: impl Into<String>, output: Value) -> Self {
        Self {
            success: true,
            output,
            service_used: service_used.into(),
            tokens_used: None,
            step_count: None,
            duration_ms: None,
        }
    }

    /// Failed result
    #[inline]
    #[must_use]
    pub fn failed(service_used: impl Into<String>, output: Value) -> Self {
        Self {
            success: false,
            ..Self::succeeded(service_used, output)
        }
    }

    /// Failed result carrying an error message as output
    #[must_use]
    pub fn from_error(error: &impl std::fmt::Display) -> Self {
        Self::failed(
            NO_SERVICE,
            serde_json::json!({ "error": error.to_string() }),
        )
    }

    /// With token count
    #[inline]
    #[must_use]
    pub fn with_tokens(mut self, tokens: Option<u64>) -> Self {
        self.tokens_used = tokens;
        self
    }

    /// With step count
    #[inline]
    #[must_use]
    pub fn with_steps(mut self, steps: Option<u32>) -> Self {
        self.step_count = steps;
        self
    }

    /// With measured duration
    #[inline]
    #[must_use]
    pub fn with_duration(mut self, elapsed: Duration) -> Self {
        self.duration_ms = Some(u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX));
        self
    }
}

/// Subtask priority
///
/// Recorded for observability; it does not influence scheduling order.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    /// Low
    Low,
    /// Medium
    #[default]
    Medium,
    /// High
    High,
    /// Critical
    Critical,
}

/// One unit of planned work
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subtask {
    /// Unique within a batch
    pub id: String,
    /// Plugin id, or [`UNASSIGNED_TARGET`]
    #[serde(
        default = "unassigned",
        alias = "targetId",
        alias = "agentId",
        alias = "agent_id"
    )]
    pub target_id: String,
    /// What the subtask should achieve
    #[serde(default)]
    pub description: String,
    /// Structured input record
    #[serde(default)]
    pub input: Map<String, Value>,
    /// Ids of subtasks this one waits for
    #[serde(default)]
    pub dependencies: BTreeSet<String>,
    /// Informational priority
    #[serde(default)]
    pub priority: Priority,
}

fn unassigned() -> String {
    UNASSIGNED_TARGET.to_string()
}

impl Subtask {
    /// Create new unassigned subtask
    #[inline]
    #[must_use]
    pub fn new(id: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            target_id: unassigned(),
            description: description.into(),
            input: Map::new(),
            dependencies: BTreeSet::new(),
            priority: Priority::default(),
        }
    }

    /// With target plugin
    #[inline]
    #[must_use]
    pub fn with_target(mut self, target_id: impl Into<String>) -> Self {
        self.target_id = target_id.into();
        self
    }

    /// Add dependency
    #[inline]
    #[must_use]
    pub fn depends_on(mut self, id: impl Into<String>) -> Self {
        self.dependencies.insert(id.into());
        self
    }

    /// With input field
    #[inline]
    #[must_use]
    pub fn with_input(mut self, key: impl Into<String>, value: Value) -> Self {
        self.input.insert(key.into(), value);
        self
    }

    /// With priority
    #[inline]
    #[must_use]
    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    /// Whether the planner left this subtask without a plugin
    #[inline]
    #[must_use]
    pub fn is_unassigned(&self) -> bool {
        self.target_id == UNASSIGNED_TARGET
    }
}

/// Context threaded through plugin runs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionContext {
    /// Conversation session
    pub session_id: String,
    /// Pipeline run
    pub run_id: String,
    /// Free-form attributes supplied by earlier stages
    #[serde(default)]
    pub attributes: Map<String, Value>,
}

impl ExecutionContext {
    /// Create new context with a fresh run id
    #[inline]
    #[must_use]
    pub fn new(session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            run_id: Ulid::new().to_string(),
            attributes: Map::new(),
        }
    }

    /// With explicit run id
    #[inline]
    #[must_use]
    pub fn with_run_id(mut self, run_id: impl Into<String>) -> Self {
        self.run_id = run_id.into();
        self
    }

    /// With attribute
    #[inline]
    #[must_use]
    pub fn with_attribute(mut self, key: impl Into<String>, value: Value) -> Self {
        self.attributes.insert(key.into(), value);
        self
    }
}
