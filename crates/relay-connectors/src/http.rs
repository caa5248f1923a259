//! HTTP reasoning-service client
//!
//! Posts each request to `{base_url}/v1/invoke` as JSON and decodes a
//! [`ServiceResponse`] from the reply.

use crate::error::ConnectorError;
use crate::{env_var, excerpt, http_client};
use async_trait::async_trait;
use relay_core::{ServiceClient, ServiceError, ServiceRequest, ServiceResponse};
use reqwest::StatusCode;
use serde::Serialize;
use serde_json::Value;
use std::time::Duration;
use tracing::debug;
use url::Url;

/// Env var holding the service base URL
pub const ENV_SERVICE_URL: &str = "RELAY_SERVICE_URL";

/// Env var holding the bearer token
pub const ENV_SERVICE_TOKEN: &str = "RELAY_SERVICE_TOKEN";

/// HTTP client configuration
#[derive(Debug, Clone)]
pub struct HttpServiceConfig {
    /// Base URL; `/v1/invoke` is appended
    pub base_url: Url,
    /// Bearer token
    pub token: Option<String>,
    /// Per-request timeout
    pub timeout: Duration,
}

impl HttpServiceConfig {
    /// Create new config for a base URL
    ///
    /// # Errors
    /// Returns [`ConnectorError::InvalidUrl`] if the URL does not parse.
    pub fn new(base_url: &str) -> Result<Self, ConnectorError> {
        let mut base_url = Url::parse(base_url).map_err(|e| ConnectorError::InvalidUrl {
            url: base_url.to_string(),
            reason: e.to_string(),
        })?;
        // `join` replaces the last segment unless the path ends in a slash
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }
        Ok(Self {
            base_url,
            token: None,
            timeout: Duration::from_secs(60),
        })
    }

    /// Read `RELAY_SERVICE_URL` and `RELAY_SERVICE_TOKEN`
    ///
    /// # Errors
    /// Returns [`ConnectorError::MissingEnv`] when no URL is set.
    pub fn from_env() -> Result<Self, ConnectorError> {
        let url = env_var(ENV_SERVICE_URL).ok_or(ConnectorError::MissingEnv(ENV_SERVICE_URL))?;
        Ok(Self::new(&url)?.with_token(env_var(ENV_SERVICE_TOKEN)))
    }

    /// With bearer token
    #[must_use]
    pub fn with_token(mut self, token: Option<String>) -> Self {
        self.token = token;
        self
    }

    /// With request timeout
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn endpoint(&self) -> Result<Url, ServiceError> {
        self.base_url
            .join("v1/invoke")
            .map_err(|e| ServiceError::Transport(e.to_string()))
    }
}

#[derive(Debug, Serialize)]
struct InvokeBody<'a> {
    model: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<&'a str>,
    prompt: &'a str,
    #[serde(skip_serializing_if = "is_null")]
    payload: &'a Value,
    #[serde(skip_serializing_if = "is_empty")]
    capabilities: &'a [String],
    #[serde(skip_serializing_if = "Option::is_none")]
    max_steps: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

fn is_null(value: &&Value) -> bool {
    value.is_null()
}

fn is_empty(items: &&[String]) -> bool {
    items.is_empty()
}

/// [`ServiceClient`] over HTTP
#[derive(Debug, Clone)]
pub struct HttpServiceClient {
    client: reqwest::Client,
    config: HttpServiceConfig,
}

impl HttpServiceClient {
    /// Create new client
    ///
    /// # Errors
    /// Returns [`ConnectorError::Client`] if the HTTP client cannot be built.
    pub fn new(config: HttpServiceConfig) -> Result<Self, ConnectorError> {
        Ok(Self {
            client: http_client(config.timeout)?,
            config,
        })
    }

    /// Client configured from the environment
    ///
    /// # Errors
    /// As [`HttpServiceConfig::from_env`] and [`HttpServiceClient::new`].
    pub fn from_env() -> Result<Self, ConnectorError> {
        Self::new(HttpServiceConfig::from_env()?)
    }
}

fn classify(status: StatusCode, body: &str) -> ServiceError {
    if status == StatusCode::TOO_MANY_REQUESTS {
        ServiceError::Quota(excerpt(body))
    } else {
        ServiceError::Status {
            status: status.as_u16(),
            body: excerpt(body),
        }
    }
}

#[async_trait]
impl ServiceClient for HttpServiceClient {
    async fn complete(
        &self,
        model: &str,
        request: &ServiceRequest,
    ) -> Result<ServiceResponse, ServiceError> {
        let body = InvokeBody {
            model,
            system: request.system.as_deref(),
            prompt: &request.prompt,
            payload: &request.payload,
            capabilities: &request.capabilities,
            max_steps: request.max_steps,
            temperature: request.temperature,
        };

        let mut call = self.client.post(self.config.endpoint()?).json(&body);
        if let Some(token) = &self.config.token {
            call = call.bearer_auth(token);
        }

        let response = call.send().await.map_err(|e| {
            if e.is_timeout() {
                ServiceError::Timeout(self.config.timeout)
            } else {
                ServiceError::Transport(e.to_string())
            }
        })?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| ServiceError::Transport(e.to_string()))?;
        if !status.is_success() {
            return Err(classify(status, &text));
        }

        debug!(model = %model, status = status.as_u16(), "Service responded");
        serde_json::from_str(&text).map_err(|e| ServiceError::MalformedResponse(e.to_string()))
    }
}
