//! Chat channel over the Slack Web API

use crate::error::ConnectorError;
use crate::{env_var, excerpt, http_client};
use async_trait::async_trait;
use relay_core::{
    ChannelAdapter, NotificationChannel, NotificationPriority, NotificationRequest,
    NotificationResult,
};
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, warn};

const DEFAULT_API_BASE: &str = "https://slack.com/api";
const DEFAULT_CHANNEL: &str = "#marketing-alerts";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const CRITICAL_COLOR: &str = "#d72b3f";

/// Chat adapter configuration
#[derive(Debug, Clone)]
pub struct ChatConfig {
    /// Bot token; the channel is unconfigured without one
    pub bot_token: Option<String>,
    /// Channel used when a request has no recipient
    pub default_channel: String,
    /// API base URL
    pub api_base: String,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            bot_token: None,
            default_channel: DEFAULT_CHANNEL.to_string(),
            api_base: DEFAULT_API_BASE.to_string(),
        }
    }
}

impl ChatConfig {
    /// Read `SLACK_BOT_TOKEN` and `SLACK_DEFAULT_CHANNEL`
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            bot_token: env_var("SLACK_BOT_TOKEN"),
            default_channel: env_var("SLACK_DEFAULT_CHANNEL").unwrap_or(defaults.default_channel),
            api_base: defaults.api_base,
        }
    }

    /// With bot token
    #[must_use]
    pub fn with_bot_token(mut self, token: impl Into<String>) -> Self {
        self.bot_token = Some(token.into());
        self
    }

    /// With API base URL
    #[must_use]
    pub fn with_api_base(mut self, base: impl Into<String>) -> Self {
        self.api_base = base.into();
        self
    }
}

#[derive(Debug, Deserialize)]
struct PostMessageResponse {
    ok: bool,
    #[serde(default)]
    ts: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

/// Posts notifications to a chat channel
#[derive(Debug, Clone)]
pub struct ChatChannel {
    client: reqwest::Client,
    config: ChatConfig,
}

impl ChatChannel {
    /// Create new chat channel
    ///
    /// # Errors
    /// Returns [`ConnectorError::Client`] if the HTTP client cannot be built.
    pub fn new(config: ChatConfig) -> Result<Self, ConnectorError> {
        Ok(Self {
            client: http_client(REQUEST_TIMEOUT)?,
            config,
        })
    }

    fn target<'a>(&'a self, request: &'a NotificationRequest) -> &'a str {
        let recipient = request.recipient.trim();
        if recipient.is_empty() {
            &self.config.default_channel
        } else {
            recipient
        }
    }

    fn message(&self, request: &NotificationRequest) -> Value {
        let mut message = json!({
            "channel": self.target(request),
            "text": format!("*{}*\n\n{}", request.subject, request.body),
            "mrkdwn": true,
        });
        if request.priority == NotificationPriority::Critical {
            message["attachments"] = json!([{
                "color": CRITICAL_COLOR,
                "text": "Critical priority: immediate action required",
            }]);
        }
        message
    }

    fn endpoint(&self) -> String {
        format!("{}/chat.postMessage", self.config.api_base.trim_end_matches('/'))
    }
}

#[async_trait]
impl ChannelAdapter for ChatChannel {
    fn channel(&self) -> NotificationChannel {
        NotificationChannel::Chat
    }

    fn is_configured(&self) -> bool {
        self.config.bot_token.is_some()
    }

    async fn send(&self, request: &NotificationRequest) -> NotificationResult {
        let Some(token) = &self.config.bot_token else {
            return NotificationResult::failed("chat channel is not configured");
        };

        let response = match self
            .client
            .post(self.endpoint())
            .bearer_auth(token)
            .json(&self.message(request))
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => {
                warn!(channel = %self.target(request), error = %e, "Chat post failed");
                return NotificationResult::failed(e.to_string());
            }
        };

        let status = response.status();
        let text = response.text().await.unwrap_or_default();
        if !status.is_success() {
            return NotificationResult::failed(format!(
                "chat api returned {}: {}",
                status.as_u16(),
                excerpt(&text)
            ));
        }

        match serde_json::from_str::<PostMessageResponse>(&text) {
            Ok(reply) if reply.ok => {
                debug!(channel = %self.target(request), ts = ?reply.ts, "Chat message posted");
                NotificationResult::sent(reply.ts)
            }
            Ok(reply) => NotificationResult::failed(
                reply.error.unwrap_or_else(|| "chat api rejected the message".to_string()),
            ),
            Err(e) => NotificationResult::failed(format!("malformed chat api response: {e}")),
        }
    }
}
