use std::time::Duration;
use thiserror::Error;

/// Failures raised by [`crate::HttpTransport`] before a response reaches the query layer.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum HttpTransportError {
    #[error("Failed to build request: {0}")]
    RequestBuild(#[from] http::Error),

    #[error("Invalid header value: {0}")]
    InvalidHeaderValue(#[from] http::header::InvalidHeaderValue),

    #[error("Invalid URL '{url}': {reason}")]
    InvalidUri { url: String, reason: String },

    /// Scheme rejected by the configured [`crate::TransportSecurity`]
    #[error("URL scheme '{scheme}' not allowed: {reason}")]
    InvalidScheme { scheme: String, reason: String },

    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    /// Network, connection or protocol failure
    #[error("Transport error: {0}")]
    Transport(#[source] Box<dyn std::error::Error + Send + Sync>),

    #[error("TLS error: {0}")]
    Tls(#[source] Box<dyn std::error::Error + Send + Sync>),

    #[error("Response body too large: limit {limit} bytes, got {actual} bytes")]
    BodyTooLarge { limit: usize, actual: usize },
}

impl From<hyper::Error> for HttpTransportError {
    fn from(err: hyper::Error) -> Self {
        HttpTransportError::Transport(Box::new(err))
    }
}

impl From<hyper_util::client::legacy::Error> for HttpTransportError {
    fn from(err: hyper_util::client::legacy::Error) -> Self {
        HttpTransportError::Transport(Box::new(err))
    }
}
