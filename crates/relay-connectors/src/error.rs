//! Connector errors

/// Errors building a connector
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConnectorError {
    /// HTTP client could not be constructed
    #[error("failed to build http client: {0}")]
    Client(String),

    /// Required environment variable is unset
    #[error("environment variable {0} is not set")]
    MissingEnv(&'static str),

    /// A configured URL does not parse
    #[error("invalid url {url}: {reason}")]
    InvalidUrl {
        /// Offending value
        url: String,
        /// Parser message
        reason: String,
    },
}
