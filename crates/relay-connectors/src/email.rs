//! Email channel over the SendGrid v3 mail API

use crate::error::ConnectorError;
use crate::{env_var, excerpt, http_client};
use async_trait::async_trait;
use relay_core::{ChannelAdapter, NotificationChannel, NotificationRequest, NotificationResult};
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, warn};

const DEFAULT_API_BASE: &str = "https://api.sendgrid.com";
const DEFAULT_FROM_ADDRESS: &str = "noreply@example.com";
const DEFAULT_FROM_NAME: &str = "Relay";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Email adapter configuration
#[derive(Debug, Clone)]
pub struct EmailConfig {
    /// SendGrid API key; the channel is unconfigured without one
    pub api_key: Option<String>,
    /// Sender address
    pub from_address: String,
    /// Sender display name
    pub from_name: String,
    /// API base URL
    pub api_base: String,
}

impl Default for EmailConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            from_address: DEFAULT_FROM_ADDRESS.to_string(),
            from_name: DEFAULT_FROM_NAME.to_string(),
            api_base: DEFAULT_API_BASE.to_string(),
        }
    }
}

impl EmailConfig {
    /// Read `SENDGRID_API_KEY`, `EMAIL_FROM_ADDRESS` and `EMAIL_FROM_NAME`
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            api_key: env_var("SENDGRID_API_KEY"),
            from_address: env_var("EMAIL_FROM_ADDRESS").unwrap_or(defaults.from_address),
            from_name: env_var("EMAIL_FROM_NAME").unwrap_or(defaults.from_name),
            api_base: defaults.api_base,
        }
    }

    /// With API key
    #[must_use]
    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    /// With API base URL
    #[must_use]
    pub fn with_api_base(mut self, base: impl Into<String>) -> Self {
        self.api_base = base.into();
        self
    }
}

fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(c),
        }
    }
    out
}

/// Sends notifications as email
#[derive(Debug, Clone)]
pub struct EmailChannel {
    client: reqwest::Client,
    config: EmailConfig,
}

impl EmailChannel {
    /// Create new email channel
    ///
    /// # Errors
    /// Returns [`ConnectorError::Client`] if the HTTP client cannot be built.
    pub fn new(config: EmailConfig) -> Result<Self, ConnectorError> {
        Ok(Self {
            client: http_client(REQUEST_TIMEOUT)?,
            config,
        })
    }

    fn mail_body(&self, request: &NotificationRequest) -> Value {
        let html = format!(
            "<h2>{}</h2><pre>{}</pre>",
            escape_html(&request.subject),
            escape_html(&request.body)
        );
        json!({
            "personalizations": [{ "to": [{ "email": request.recipient }] }],
            "from": {
                "email": self.config.from_address,
                "name": self.config.from_name,
            },
            "subject": request.subject,
            "content": [
                { "type": "text/plain", "value": request.body },
                { "type": "text/html", "value": html },
            ],
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/v3/mail/send", self.config.api_base.trim_end_matches('/'))
    }
}

#[async_trait]
impl ChannelAdapter for EmailChannel {
    fn channel(&self) -> NotificationChannel {
        NotificationChannel::Email
    }

    fn is_configured(&self) -> bool {
        self.config.api_key.is_some()
    }

    async fn send(&self, request: &NotificationRequest) -> NotificationResult {
        let Some(key) = &self.config.api_key else {
            return NotificationResult::failed("email channel is not configured");
        };
        if request.recipient.trim().is_empty() {
            return NotificationResult::failed("email recipient is empty");
        }

        let response = match self
            .client
            .post(self.endpoint())
            .bearer_auth(key)
            .json(&self.mail_body(request))
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => {
                warn!(recipient = %request.recipient, error = %e, "Email send failed");
                return NotificationResult::failed(e.to_string());
            }
        };

        let status = response.status();
        let message_id = response
            .headers()
            .get("x-message-id")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return NotificationResult::failed(format!(
                "email api returned {}: {}",
                status.as_u16(),
                excerpt(&text)
            ));
        }

        let message_id = message_id.unwrap_or_else(|| format!("email-{}", ulid::Ulid::new()));
        debug!(recipient = %request.recipient, message_id = %message_id, "Email sent");
        NotificationResult::sent(Some(message_id))
    }
}
