//! Service Router
//!
//! Resolves service ids to callable handles:
//! - `provider:tier` aliases resolve through a static alias table
//! - anything else passes through as a literal id
//! - the provider prefix of the resolved id selects a [`ServiceClient`]
//!
//! Resolution never fails. A literal id with no registered client produces a
//! handle whose call fails with [`ServiceError::UnknownService`].

use crate::config::ServicesConfig;
use crate::error::ServiceError;
use crate::types::{ServiceAssignment, ServiceRequest};
use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// Raw response from one service call
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ServiceResponse {
    /// Opaque payload
    pub output: Value,
    /// Tokens consumed
    #[serde(default)]
    pub tokens_used: Option<u64>,
    /// Tool steps taken
    #[serde(default)]
    pub step_count: Option<u32>,
}

impl ServiceResponse {
    /// Create new response
    #[inline]
    #[must_use]
    pub fn new(output: Value) -> Self {
        Self {
            output,
            ..Self::default()
        }
    }

    /// With token count
    #[inline]
    #[must_use]
    pub fn with_tokens(mut self, tokens: u64) -> Self {
        self.tokens_used = Some(tokens);
        self
    }

    /// With step count
    #[inline]
    #[must_use]
    pub fn with_steps(mut self, steps: u32) -> Self {
        self.step_count = Some(steps);
        self
    }
}

/// Client for one provider's reasoning services
///
/// Implement this trait to connect a provider. `model` is the part of the
/// resolved id after the provider prefix.
#[async_trait]
pub trait ServiceClient: Send + Sync {
    /// Perform one call
    async fn complete(
        &self,
        model: &str,
        request: &ServiceRequest,
    ) -> Result<ServiceResponse, ServiceError>;
}

/// A resolved service, ready to call
#[derive(Clone)]
pub struct ServiceHandle {
    requested: String,
    concrete: String,
    client: Option<Arc<dyn ServiceClient>>,
}

impl ServiceHandle {
    /// Id as requested (alias or literal)
    #[must_use]
    pub fn requested(&self) -> &str {
        &self.requested
    }

    /// Id after alias resolution
    #[must_use]
    pub fn concrete(&self) -> &str {
        &self.concrete
    }

    /// Provider prefix of the concrete id
    #[must_use]
    pub fn provider(&self) -> &str {
        split_service_id(&self.concrete).0
    }

    /// Model part of the concrete id
    #[must_use]
    pub fn model(&self) -> &str {
        split_service_id(&self.concrete).1
    }

    /// Whether a client backs this handle
    #[must_use]
    pub fn is_routable(&self) -> bool {
        self.client.is_some()
    }

    /// Call the service
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::UnknownService`] when no client is registered
    /// for the provider, otherwise whatever the client reports.
    pub async fn call(&self, request: &ServiceRequest) -> Result<ServiceResponse, ServiceError> {
        match &self.client {
            Some(client) => client.complete(self.model(), request).await,
            None => Err(ServiceError::UnknownService(self.concrete.clone())),
        }
    }
}

impl fmt::Debug for ServiceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceHandle")
            .field("requested", &self.requested)
            .field("concrete", &self.concrete)
            .field("routable", &self.is_routable())
            .finish()
    }
}

/// Split `provider:model`; an id without a colon is its own provider and model
fn split_service_id(id: &str) -> (&str, &str) {
    id.split_once(':').unwrap_or((id, id))
}

/// Task complexity used for tier selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Complexity {
    /// Fast tier
    Low,
    /// Balanced tier
    Medium,
    /// Powerful tier
    High,
}

impl Complexity {
    /// Tier name this complexity maps to
    #[must_use]
    pub fn tier(self) -> &'static str {
        match self {
            Self::Low => "fast",
            Self::Medium => "balanced",
            Self::High => "powerful",
        }
    }
}

impl FromStr for Complexity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "low" => Ok(Self::Low),
            "medium" => Ok(Self::Medium),
            "high" => Ok(Self::High),
            other => Err(format!("unknown complexity: {other}")),
        }
    }
}

/// Alias table, per-role chains and provider clients
pub struct Router {
    aliases: BTreeMap<String, String>,
    assignments: BTreeMap<String, ServiceAssignment>,
    default_assignment: ServiceAssignment,
    providers: DashMap<String, Arc<dyn ServiceClient>>,
}

impl Router {
    /// Create router with an explicit alias table and no role assignments
    #[must_use]
    pub fn new(aliases: BTreeMap<String, String>) -> Self {
        Self {
            aliases,
            assignments: BTreeMap::new(),
            default_assignment: ServiceAssignment::default(),
            providers: DashMap::new(),
        }
    }

    /// Create router from the services section of the config
    #[must_use]
    pub fn from_config(config: &ServicesConfig) -> Self {
        Self {
            aliases: config.aliases.clone(),
            assignments: config.assignments.clone(),
            default_assignment: config.default_assignment.clone(),
            providers: DashMap::new(),
        }
    }

    /// With provider client (builder form of [`Router::register_provider`])
    #[must_use]
    pub fn with_provider(self, provider: impl Into<String>, client: Arc<dyn ServiceClient>) -> Self {
        self.register_provider(provider, client);
        self
    }

    /// With role assignment
    #[must_use]
    pub fn with_assignment(mut self, role: impl Into<String>, assignment: ServiceAssignment) -> Self {
        self.assignments.insert(role.into(), assignment);
        self
    }

    /// Register or replace the client for a provider prefix
    pub fn register_provider(&self, provider: impl Into<String>, client: Arc<dyn ServiceClient>) {
        self.providers.insert(provider.into(), client);
    }

    /// Registered provider prefixes, sorted
    #[must_use]
    pub fn providers(&self) -> Vec<String> {
        let mut names: Vec<_> = self.providers.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    /// Resolve an alias or literal id
    #[must_use]
    pub fn resolve(&self, service_id: &str) -> ServiceHandle {
        let concrete = self
            .aliases
            .get(service_id)
            .cloned()
            .unwrap_or_else(|| service_id.to_string());
        let client = self
            .providers
            .get(split_service_id(&concrete).0)
            .map(|entry| Arc::clone(entry.value()));

        ServiceHandle {
            requested: service_id.to_string(),
            concrete,
            client,
        }
    }

    /// Assignment for a role, or the default
    #[must_use]
    pub fn assignment_for(&self, role: &str) -> &ServiceAssignment {
        self.assignments.get(role).unwrap_or(&self.default_assignment)
    }

    /// Preferred service followed by fallbacks for a role
    #[must_use]
    pub fn chain_for_role(&self, role: &str) -> Vec<String> {
        self.assignment_for(role).chain()
    }

    /// Pick a `provider:tier` alias by complexity
    ///
    /// Falls back to `provider:balanced` when the provider has no alias for
    /// the requested tier.
    #[must_use]
    pub fn select_by_complexity(&self, complexity: Complexity, provider: &str) -> String {
        let alias = format!("{provider}:{}", complexity.tier());
        if self.aliases.contains_key(&alias) {
            alias
        } else {
            format!("{provider}:balanced")
        }
    }
}

impl Default for Router {
    fn default() -> Self {
        Self::from_config(&ServicesConfig::default())
    }
}

impl fmt::Debug for Router {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Router")
            .field("aliases", &self.aliases.len())
            .field("assignments", &self.assignments.keys().collect::<Vec<_>>())
            .field("providers", &self.providers())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct EchoClient;

    #[async_trait]
    impl ServiceClient for EchoClient {
        async fn complete(
            &self,
            model: &str,
            request: &ServiceRequest,
        ) -> Result<ServiceResponse, ServiceError> {
            Ok(ServiceResponse::new(json!({ "model": model, "prompt": request.prompt })))
        }
    }

    #[test]
    fn alias_resolves_to_concrete_id() {
        let router = Router::default();
        let handle = router.resolve("anthropic:fast");
        assert_eq!(handle.requested(), "anthropic:fast");
        assert_eq!(handle.concrete(), "anthropic:claude-haiku-4-5-20251001");
        assert_eq!(handle.provider(), "anthropic");
        assert_eq!(handle.model(), "claude-haiku-4-5-20251001");
    }

    #[test]
    fn literal_id_passes_through() {
        let router = Router::default();
        let handle = router.resolve("openai:gpt-4.1");
        assert_eq!(handle.concrete(), "openai:gpt-4.1");
        assert!(!handle.is_routable());
    }

    #[tokio::test]
    async fn unknown_literal_fails_at_call_time() {
        let router = Router::default();
        let err = router
            .resolve("nowhere:model")
            .call(&ServiceRequest::new("hi"))
            .await
            .unwrap_err();
        assert_eq!(err, ServiceError::UnknownService("nowhere:model".to_string()));
    }

    #[tokio::test]
    async fn provider_client_receives_model() {
        let router = Router::default().with_provider("openai", Arc::new(EchoClient));
        let response = router
            .resolve("openai:balanced")
            .call(&ServiceRequest::new("hi"))
            .await
            .unwrap();
        assert_eq!(response.output["model"], "gpt-4o");
        assert_eq!(response.output["prompt"], "hi");
    }

    #[test]
    fn unknown_role_gets_default_chain() {
        let router = Router::default();
        assert_eq!(
            router.chain_for_role("no-such-role"),
            vec!["anthropic:balanced", "openai:balanced", "google:balanced"]
        );
        assert_eq!(
            router.chain_for_role("cognition"),
            vec!["anthropic:balanced", "openai:reasoning", "google:balanced"]
        );
    }

    #[test]
    fn complexity_falls_back_to_balanced() {
        let router = Router::default();
        assert_eq!(router.select_by_complexity(Complexity::High, "anthropic"), "anthropic:powerful");
        assert_eq!(router.select_by_complexity(Complexity::Low, "google"), "google:fast");
        assert_eq!(router.select_by_complexity(Complexity::High, "google"), "google:balanced");
    }
}
