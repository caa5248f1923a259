//! Error types for Relay Core
//!
//! Provides error handling for:
//! - Exhausted fallback chains (the escalation trigger)
//! - Plugin lookup and input validation failures
//! - Single service attempts
//! - Configuration loading

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// Main Relay error type
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    /// Every service in a fallback chain failed
    #[error(
        "all services failed for agent \"{agent_id}\"; attempted: {}",
        .attempted_services.join(", ")
    )]
    AllServicesFailed {
        /// Role or plugin that issued the invocation
        agent_id: String,
        /// The full chain, in the order it was tried
        attempted_services: Vec<String>,
        /// One entry per failed attempt
        failures: Vec<ServiceFailure>,
    },

    /// Unknown plugin id
    #[error("plugin \"{agent_id}\" not found in registry")]
    PluginNotFound {
        /// Requested plugin id
        agent_id: String,
    },

    /// Plugin input failed schema validation
    #[error(
        "input validation failed for plugin \"{agent_id}\": {}",
        SchemaViolation::join(.violations)
    )]
    PluginValidation {
        /// Plugin id
        agent_id: String,
        /// Field-level violations
        violations: Vec<SchemaViolation>,
    },

    /// A schema document could not be compiled
    #[error("invalid schema: {0}")]
    InvalidSchema(String),

    /// Plugin runner failed outside the fallback chain
    #[error("plugin \"{agent_id}\" failed: {message}")]
    PluginFailed {
        /// Plugin id
        agent_id: String,
        /// Failure description
        message: String,
    },

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
}

impl RelayError {
    /// Check if this failure should be handed to the escalation coordinator
    ///
    /// Only an exhausted fallback chain escalates; everything else is
    /// absorbed into a failed result at the dispatch boundary.
    #[inline]
    #[must_use]
    pub fn requires_escalation(&self) -> bool {
        matches!(self, Self::AllServicesFailed { .. })
    }

    /// Check if an outer stage may retry the whole call
    #[inline]
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::AllServicesFailed { .. } | Self::PluginFailed { .. }
        )
    }

    /// Agent or plugin id carried by the error, if any
    #[must_use]
    pub fn agent_id(&self) -> Option<&str> {
        match self {
            Self::AllServicesFailed { agent_id, .. }
            | Self::PluginNotFound { agent_id }
            | Self::PluginValidation { agent_id, .. }
            | Self::PluginFailed { agent_id, .. } => Some(agent_id),
            Self::InvalidSchema(_) | Self::Config(_) => None,
        }
    }

    /// Stable machine-readable kind
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::AllServicesFailed { .. } => "all_services_failed",
            Self::PluginNotFound { .. } => "plugin_not_found",
            Self::PluginValidation { .. } => "plugin_validation",
            Self::InvalidSchema(_) => "invalid_schema",
            Self::PluginFailed { .. } => "plugin_failed",
            Self::Config(_) => "config",
        }
    }
}

/// One failed attempt inside a fallback chain
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ServiceFailure {
    /// Service id as it appeared in the chain
    pub service_id: String,
    /// Rendered error
    pub error: String,
}

/// A single schema violation
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct SchemaViolation {
    /// JSON pointer to the offending value (`/` for the root)
    pub instance_path: String,
    /// What was wrong
    pub message: String,
}

impl SchemaViolation {
    /// Create new violation
    #[inline]
    #[must_use]
    pub fn new(instance_path: impl Into<String>, message: impl Into<String>) -> Self {
        let instance_path = instance_path.into();
        Self {
            instance_path: if instance_path.is_empty() {
                "/".to_string()
            } else {
                instance_path
            },
            message: message.into(),
        }
    }

    fn join(violations: &[SchemaViolation]) -> String {
        violations
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("; ")
    }
}

impl fmt::Display for SchemaViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.instance_path, self.message)
    }
}

/// Errors from a single call to a remote reasoning service
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ServiceError {
    /// No client is registered for the resolved provider
    #[error("no client registered for service \"{0}\"")]
    UnknownService(String),

    /// Network or connection failure
    #[error("transport error: {0}")]
    Transport(String),

    /// Non-success status from the service
    #[error("service returned status {status}: {body}")]
    Status {
        /// HTTP-like status code
        status: u16,
        /// Truncated response body
        body: String,
    },

    /// Rate limit or quota exhausted
    #[error("quota exceeded: {0}")]
    Quota(String),

    /// Response could not be decoded
    #[error("malformed response: {0}")]
    MalformedResponse(String),

    /// Attempt exceeded the per-attempt deadline
    #[error("attempt timed out after {0:?}")]
    Timeout(Duration),
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// File could not be read
    #[error("failed to read {path}: {source}")]
    Io {
        /// Config path
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// TOML could not be parsed
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    /// Values parsed but are unusable
    #[error("invalid config: {0}")]
    Invalid(String),
}
