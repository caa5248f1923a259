//! Engine configuration
//!
//! [`RelayConfig`] is loadable from TOML. Every section has defaults, so an
//! empty document is a valid configuration.

use crate::error::ConfigError;
use crate::notify::NotificationChannel;
use crate::types::ServiceAssignment;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

/// Env var overriding the marketer recipient
pub const ENV_MARKETER_RECIPIENT: &str = "RELAY_MARKETER_RECIPIENT";

/// Env var overriding the admin recipient
pub const ENV_ADMIN_EMAIL: &str = "RELAY_ADMIN_EMAIL";

/// Top-level configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    /// Default log filter when no env filter is set
    pub log_level: String,
    /// Service routing
    pub services: ServicesConfig,
    /// Batch scheduling
    pub scheduler: SchedulerConfig,
    /// Escalation routing
    pub escalation: EscalationConfig,
}

impl RelayConfig {
    /// Create default configuration
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse from a TOML document
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] on malformed TOML and
    /// [`ConfigError::Invalid`] when values fail validation.
    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a TOML file
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] when the file cannot be read, otherwise as
    /// [`RelayConfig::from_toml_str`].
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&raw)
    }

    /// Apply recipient overrides from the process environment
    #[must_use]
    pub fn with_env_overrides(self) -> Self {
        self.with_overrides(|key| std::env::var(key).ok())
    }

    fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(recipient) = lookup(ENV_MARKETER_RECIPIENT).filter(|v| !v.is_empty()) {
            self.escalation.marketer_recipient = recipient;
        }
        if let Some(recipient) = lookup(ENV_ADMIN_EMAIL).filter(|v| !v.is_empty()) {
            self.escalation.admin_recipient = recipient;
        }
        self
    }

    /// With log level
    #[inline]
    #[must_use]
    pub fn with_log_level(mut self, level: impl Into<String>) -> Self {
        self.log_level = level.into();
        self
    }

    /// With per-role assignment
    #[inline]
    #[must_use]
    pub fn with_assignment(mut self, role: impl Into<String>, assignment: ServiceAssignment) -> Self {
        self.services.assignments.insert(role.into(), assignment);
        self
    }

    /// With per-attempt timeout
    #[inline]
    #[must_use]
    pub fn with_attempt_timeout(mut self, timeout: Duration) -> Self {
        self.services.attempt_timeout_secs = Some(timeout.as_secs().max(1));
        self
    }

    /// With bounded level parallelism
    #[inline]
    #[must_use]
    pub fn with_max_parallel(mut self, max: usize) -> Self {
        self.scheduler.max_parallel = Some(max);
        self
    }

    /// Check cross-field constraints
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] describing the first bad value.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let check_assignment = |name: &str, assignment: &ServiceAssignment| {
            if assignment.preferred.trim().is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "assignment \"{name}\" has an empty preferred service"
                )));
            }
            Ok(())
        };

        check_assignment("default", &self.services.default_assignment)?;
        for (role, assignment) in &self.services.assignments {
            check_assignment(role, assignment)?;
        }
        if self.services.attempt_timeout_secs == Some(0) {
            return Err(ConfigError::Invalid(
                "services.attempt_timeout_secs must be positive".to_string(),
            ));
        }
        if self.scheduler.max_parallel == Some(0) {
            return Err(ConfigError::Invalid(
                "scheduler.max_parallel must be positive".to_string(),
            ));
        }
        if self.scheduler.generic_role.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "scheduler.generic_role must not be empty".to_string(),
            ));
        }
        if self.escalation.default_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "escalation.default_timeout_secs must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            services: ServicesConfig::default(),
            scheduler: SchedulerConfig::default(),
            escalation: EscalationConfig::default(),
        }
    }
}

/// Alias table and per-role fallback chains
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServicesConfig {
    /// `provider:tier` → `provider:model`
    pub aliases: BTreeMap<String, String>,
    /// Role → chain
    pub assignments: BTreeMap<String, ServiceAssignment>,
    /// Chain for roles without an assignment
    pub default_assignment: ServiceAssignment,
    /// Optional per-attempt deadline
    pub attempt_timeout_secs: Option<u64>,
}

impl ServicesConfig {
    /// Per-attempt deadline as a duration
    #[must_use]
    pub fn attempt_timeout(&self) -> Option<Duration> {
        self.attempt_timeout_secs.map(Duration::from_secs)
    }
}

impl Default for ServicesConfig {
    fn default() -> Self {
        let aliases = [
            ("anthropic:fast", "anthropic:claude-haiku-4-5-20251001"),
            ("anthropic:balanced", "anthropic:claude-sonnet-4-5-20250514"),
            ("anthropic:powerful", "anthropic:claude-opus-4-20250514"),
            ("openai:fast", "openai:gpt-4o-mini"),
            ("openai:balanced", "openai:gpt-4o"),
            ("openai:reasoning", "openai:o3"),
            ("google:fast", "google:gemini-2.0-flash"),
            ("google:balanced", "google:gemini-2.0-pro"),
        ]
        .into_iter()
        .map(|(alias, concrete)| (alias.to_string(), concrete.to_string()))
        .collect();

        let fast = || ServiceAssignment::new("anthropic:fast", ["openai:fast", "google:fast"]);
        let assignments = [
            (
                "orchestrator",
                ServiceAssignment::new("anthropic:powerful", ["openai:balanced", "google:balanced"]),
            ),
            ("grounding", fast()),
            (
                "cognition",
                ServiceAssignment::new("anthropic:balanced", ["openai:reasoning", "google:balanced"]),
            ),
            ("agency", ServiceAssignment::default()),
            ("interface", fast()),
            (
                "notification-manager",
                ServiceAssignment::new("anthropic:fast", ["openai:fast"]),
            ),
        ]
        .into_iter()
        .map(|(role, assignment)| (role.to_string(), assignment))
        .collect();

        Self {
            aliases,
            assignments,
            default_assignment: ServiceAssignment::default(),
            attempt_timeout_secs: None,
        }
    }
}

/// Batch scheduling settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Role whose chain serves subtasks with no registered plugin
    pub generic_role: String,
    /// Upper bound on concurrent dispatches inside one level
    pub max_parallel: Option<usize>,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            generic_role: "agency".to_string(),
            max_parallel: None,
        }
    }
}

/// Escalation routing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EscalationConfig {
    /// Wait used when the caller gives none
    pub default_timeout_secs: u64,
    /// Channel for the marketer audience
    pub marketer_channel: NotificationChannel,
    /// Marketer address or channel name
    pub marketer_recipient: String,
    /// Channel for the admin audience
    pub admin_channel: NotificationChannel,
    /// Admin address
    pub admin_recipient: String,
}

impl EscalationConfig {
    /// Default wait as a duration
    #[must_use]
    pub fn default_timeout(&self) -> Duration {
        Duration::from_secs(self.default_timeout_secs)
    }
}

impl Default for EscalationConfig {
    fn default() -> Self {
        Self {
            default_timeout_secs: 24 * 60 * 60,
            marketer_channel: NotificationChannel::Chat,
            marketer_recipient: "#marketing-alerts".to_string(),
            admin_channel: NotificationChannel::Email,
            admin_recipient: "admin@example.com".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::io::Write;

    #[test]
    fn empty_document_is_default() {
        let config = RelayConfig::from_toml_str("").unwrap();
        assert_eq!(config, RelayConfig::default());
        assert_eq!(config.escalation.default_timeout(), Duration::from_secs(86_400));
        assert_eq!(config.scheduler.generic_role, "agency");
    }

    #[test]
    fn partial_sections_keep_defaults() {
        let raw = r#"
            log_level = "debug"

            [services]
            attempt_timeout_secs = 30

            [services.assignments.cognition]
            preferred = "openai:reasoning"
            fallbacks = ["anthropic:balanced"]

            [escalation]
            marketer_channel = "slack"
            admin_recipient = "ops@example.com"
        "#;
        let config = RelayConfig::from_toml_str(raw).unwrap();
        assert_eq!(config.log_level, "debug");
        assert_eq!(config.services.attempt_timeout(), Some(Duration::from_secs(30)));
        assert_eq!(
            config.services.assignments["cognition"].chain(),
            vec!["openai:reasoning", "anthropic:balanced"]
        );
        assert!(config.services.aliases.contains_key("google:fast"));
        assert_eq!(config.escalation.marketer_channel, NotificationChannel::Chat);
        assert_eq!(config.escalation.admin_recipient, "ops@example.com");
    }

    #[test]
    fn zero_parallelism_is_rejected() {
        let err = RelayConfig::from_toml_str("[scheduler]\nmax_parallel = 0").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn malformed_toml_is_parse_error() {
        let err = RelayConfig::from_toml_str("log_level = ").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn load_reads_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[scheduler]\ngeneric_role = \"cognition\"").unwrap();
        let config = RelayConfig::load(file.path()).unwrap();
        assert_eq!(config.scheduler.generic_role, "cognition");
    }

    #[test]
    fn missing_file_is_io_error() {
        let err = RelayConfig::load("/definitely/not/here.toml").unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }

    #[test]
    fn overrides_replace_recipients() {
        let config = RelayConfig::default().with_overrides(|key| match key {
            ENV_MARKETER_RECIPIENT => Some("#growth".to_string()),
            ENV_ADMIN_EMAIL => Some(String::new()),
            _ => None,
        });
        assert_eq!(config.escalation.marketer_recipient, "#growth");
        assert_eq!(config.escalation.admin_recipient, "admin@example.com");
    }
}
