//! Relay Connectors - outbound adapters
//!
//! Concrete implementations of the engine's two outbound seams:
//! - [`HttpServiceClient`] implements `ServiceClient` over HTTP
//! - [`EmailChannel`], [`ChatChannel`] and [`WebhookChannel`] implement
//!   `ChannelAdapter`
//!
//! Every connector reads its credentials from the environment through a
//! `from_env` constructor.

#![warn(unreachable_pub)]

pub mod chat;
pub mod email;
pub mod error;
pub mod http;
pub mod webhook;

#[cfg(test)]
mod stub;

pub use chat::{ChatChannel, ChatConfig};
pub use email::{EmailChannel, EmailConfig};
pub use error::ConnectorError;
pub use http::{HttpServiceClient, HttpServiceConfig};
pub use webhook::{sign_payload, WebhookChannel};

use relay_core::Dispatcher;
use std::sync::Arc;

/// Longest response body excerpt carried in errors
pub const MAX_ERROR_BODY: usize = 200;

/// Dispatcher with every channel adapter configured from the environment
///
/// # Errors
/// Returns [`ConnectorError::Client`] if an HTTP client cannot be built.
pub fn default_dispatcher() -> Result<Dispatcher, ConnectorError> {
    Ok(Dispatcher::new()
        .with_adapter(Arc::new(EmailChannel::new(EmailConfig::from_env())?))
        .with_adapter(Arc::new(ChatChannel::new(ChatConfig::from_env())?))
        .with_adapter(Arc::new(WebhookChannel::from_env()?)))
}

/// First [`MAX_ERROR_BODY`] characters of a response body
pub(crate) fn excerpt(body: &str) -> String {
    body.chars().take(MAX_ERROR_BODY).collect()
}

/// Build an HTTP client with a request timeout
pub(crate) fn http_client(timeout: std::time::Duration) -> Result<reqwest::Client, ConnectorError> {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| ConnectorError::Client(e.to_string()))
}

/// Read a non-empty environment variable
pub(crate) fn env_var(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn excerpt_truncates_on_char_boundary() {
        let body = "é".repeat(300);
        let cut = excerpt(&body);
        assert_eq!(cut.chars().count(), MAX_ERROR_BODY);
        assert_eq!(excerpt("short"), "short");
    }
}
