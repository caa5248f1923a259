//! Webhook channel
//!
//! The request recipient is the target URL. When a secret is configured the
//! JSON body is signed with HMAC-SHA256 and the hex digest is sent in the
//! `X-Webhook-Signature` header.

use crate::error::ConnectorError;
use crate::{env_var, excerpt, http_client};
use async_trait::async_trait;
use hmac::{Hmac, Mac};
use relay_core::{ChannelAdapter, NotificationChannel, NotificationRequest, NotificationResult};
use serde_json::{json, Value};
use sha2::Sha256;
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

/// Header carrying the payload signature
pub const SIGNATURE_HEADER: &str = "X-Webhook-Signature";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Hex HMAC-SHA256 of `body` under `secret`
pub fn sign_payload(secret: &str, body: &[u8]) -> String {
    // HMAC accepts keys of any length
    let mut mac = match Hmac::<Sha256>::new_from_slice(secret.as_bytes()) {
        Ok(mac) => mac,
        Err(_) => return String::new(),
    };
    mac.update(body);
    hex::encode(mac.finalize().into_bytes())
}

/// Posts notifications to arbitrary URLs
#[derive(Debug, Clone)]
pub struct WebhookChannel {
    client: reqwest::Client,
    secret: Option<String>,
}

impl WebhookChannel {
    /// Create new webhook channel
    ///
    /// # Errors
    /// Returns [`ConnectorError::Client`] if the HTTP client cannot be built.
    pub fn new(secret: Option<String>) -> Result<Self, ConnectorError> {
        Ok(Self {
            client: http_client(REQUEST_TIMEOUT)?,
            secret,
        })
    }

    /// Channel signing with `WEBHOOK_SECRET` when set
    ///
    /// # Errors
    /// As [`WebhookChannel::new`].
    pub fn from_env() -> Result<Self, ConnectorError> {
        Self::new(env_var("WEBHOOK_SECRET"))
    }

    fn payload(request: &NotificationRequest) -> Value {
        json!({
            "subject": request.subject,
            "body": request.body,
            "priority": request.priority,
            "channel": request.channel,
            "metadata": request.metadata,
            "timestamp": chrono::Utc::now().to_rfc3339(),
        })
    }
}

#[async_trait]
impl ChannelAdapter for WebhookChannel {
    fn channel(&self) -> NotificationChannel {
        NotificationChannel::Webhook
    }

    fn is_configured(&self) -> bool {
        true
    }

    async fn send(&self, request: &NotificationRequest) -> NotificationResult {
        let url = match Url::parse(request.recipient.trim()) {
            Ok(url) => url,
            Err(e) => {
                return NotificationResult::failed(format!(
                    "invalid webhook url {:?}: {e}",
                    request.recipient
                ))
            }
        };

        let body = match serde_json::to_vec(&Self::payload(request)) {
            Ok(body) => body,
            Err(e) => return NotificationResult::failed(e.to_string()),
        };

        let mut call = self
            .client
            .post(url.clone())
            .header(reqwest::header::CONTENT_TYPE, "application/json");
        if let Some(secret) = &self.secret {
            call = call.header(SIGNATURE_HEADER, sign_payload(secret, &body));
        }

        let response = match call.body(body).send().await {
            Ok(response) => response,
            Err(e) => {
                warn!(url = %url, error = %e, "Webhook delivery failed");
                return NotificationResult::failed(e.to_string());
            }
        };

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return NotificationResult::failed(format!(
                "webhook returned {}: {}",
                status.as_u16(),
                excerpt(&text)
            ));
        }

        let message_id = format!("webhook-{}", ulid::Ulid::new());
        debug!(url = %url, message_id = %message_id, "Webhook delivered");
        NotificationResult::sent(Some(message_id))
    }
}
