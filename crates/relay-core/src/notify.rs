//! Notification dispatch contract
//!
//! The dispatcher maps a channel name to a [`ChannelAdapter`]. It never
//! fails: unknown channels and adapter errors both come back as a failed
//! [`NotificationResult`].

use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, warn};

/// Delivery channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationChannel {
    /// Email address
    Email,
    /// Chat channel name (Slack and friends)
    #[serde(alias = "slack")]
    Chat,
    /// HTTP endpoint
    Webhook,
}

impl NotificationChannel {
    /// All channels in a stable order
    pub const ALL: [NotificationChannel; 3] = [Self::Email, Self::Chat, Self::Webhook];

    /// Wire name
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Email => "email",
            Self::Chat => "chat",
            Self::Webhook => "webhook",
        }
    }
}

impl fmt::Display for NotificationChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NotificationChannel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "email" => Ok(Self::Email),
            "chat" | "slack" => Ok(Self::Chat),
            "webhook" => Ok(Self::Webhook),
            other => Err(format!("unknown notification channel: {other}")),
        }
    }
}

/// Notification priority
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationPriority {
    /// Informational
    #[default]
    Info,
    /// Needs attention
    Warning,
    /// Needs attention now
    Critical,
}

impl NotificationPriority {
    /// Wire name
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Warning => "warning",
            Self::Critical => "critical",
        }
    }
}

/// One outbound notification
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationRequest {
    /// Target channel
    pub channel: NotificationChannel,
    /// Address, channel name or URL; opaque to the dispatcher
    pub recipient: String,
    /// Subject line
    pub subject: String,
    /// Body text
    pub body: String,
    /// Priority
    #[serde(default)]
    pub priority: NotificationPriority,
    /// Extra key/values forwarded to the adapter
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub metadata: Map<String, Value>,
}

impl NotificationRequest {
    /// Create new request
    #[inline]
    #[must_use]
    pub fn new(
        channel: NotificationChannel,
        recipient: impl Into<String>,
        subject: impl Into<String>,
        body: impl Into<String>,
    ) -> Self {
        Self {
            channel,
            recipient: recipient.into(),
            subject: subject.into(),
            body: body.into(),
            priority: NotificationPriority::default(),
            metadata: Map::new(),
        }
    }

    /// With priority
    #[inline]
    #[must_use]
    pub fn with_priority(mut self, priority: NotificationPriority) -> Self {
        self.priority = priority;
        self
    }

    /// With metadata entry
    #[inline]
    #[must_use]
    pub fn with_metadata(mut self, key: impl Into<String>, value: Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }
}

/// Outcome of one delivery attempt
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationResult {
    /// Whether the adapter accepted the message
    pub success: bool,
    /// Adapter-assigned id
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
    /// Failure description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl NotificationResult {
    /// Accepted
    #[inline]
    #[must_use]
    pub fn sent(message_id: Option<String>) -> Self {
        Self {
            success: true,
            message_id,
            error: None,
        }
    }

    /// Rejected
    #[inline]
    #[must_use]
    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            message_id: None,
            error: Some(error.into()),
        }
    }
}

/// A concrete delivery mechanism for one channel
#[async_trait]
pub trait ChannelAdapter: Send + Sync {
    /// Channel this adapter serves
    fn channel(&self) -> NotificationChannel;

    /// Whether credentials are present
    fn is_configured(&self) -> bool;

    /// Deliver one notification
    ///
    /// Adapters report failures in the result rather than erroring.
    async fn send(&self, request: &NotificationRequest) -> NotificationResult;
}

/// Routes notifications to channel adapters
#[derive(Default)]
pub struct Dispatcher {
    adapters: DashMap<NotificationChannel, Arc<dyn ChannelAdapter>>,
}

impl Dispatcher {
    /// Create empty dispatcher
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// With adapter (builder form of [`Dispatcher::register`])
    #[must_use]
    pub fn with_adapter(self, adapter: Arc<dyn ChannelAdapter>) -> Self {
        self.register(adapter);
        self
    }

    /// Register adapter under its own channel, replacing any previous one
    pub fn register(&self, adapter: Arc<dyn ChannelAdapter>) {
        let channel = adapter.channel();
        if self.adapters.insert(channel, adapter).is_some() {
            warn!(channel = %channel, "Replaced notification adapter");
        }
    }

    /// Adapter for a channel
    #[must_use]
    pub fn get(&self, channel: NotificationChannel) -> Option<Arc<dyn ChannelAdapter>> {
        self.adapters.get(&channel).map(|entry| Arc::clone(entry.value()))
    }

    /// Channels whose adapter reports configured
    #[must_use]
    pub fn configured_channels(&self) -> Vec<NotificationChannel> {
        NotificationChannel::ALL
            .into_iter()
            .filter(|channel| {
                self.get(*channel)
                    .is_some_and(|adapter| adapter.is_configured())
            })
            .collect()
    }

    /// Send a notification through its channel's adapter
    ///
    /// Sends even when the adapter is not configured and surfaces whatever the
    /// adapter reports.
    pub async fn dispatch(&self, request: &NotificationRequest) -> NotificationResult {
        let Some(adapter) = self.get(request.channel) else {
            warn!(channel = %request.channel, "No adapter for notification channel");
            return NotificationResult::failed(format!(
                "unknown notification channel: {}",
                request.channel
            ));
        };

        let result = adapter.send(request).await;
        if result.success {
            debug!(
                channel = %request.channel,
                message_id = ?result.message_id,
                "Notification sent"
            );
        } else {
            warn!(
                channel = %request.channel,
                error = ?result.error,
                "Notification failed"
            );
        }
        result
    }
}

impl fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut channels: Vec<_> = self.adapters.iter().map(|e| *e.key()).collect();
        channels.sort();
        f.debug_struct("Dispatcher")
            .field("channels", &channels)
            .finish()
    }
}
