use std::time::Duration;

/// User-Agent sent when a request does not carry its own.
pub const DEFAULT_USER_AGENT: &str = concat!("odata-http/", env!("CARGO_PKG_VERSION"));

/// Which URL schemes the transport accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransportSecurity {
    /// HTTPS only.
    #[default]
    TlsOnly,
    /// Also accept plain `http://` URLs. Meant for local mock servers.
    AllowInsecureHttp,
}

/// Settings for [`crate::HttpTransport`].
#[derive(Debug, Clone)]
pub struct HttpTransportConfig {
    /// Deadline for a whole request, response body included (default: 30 seconds)
    pub request_timeout: Duration,

    /// Largest accepted response body in bytes (default: 10 MiB)
    pub max_body_size: usize,

    pub user_agent: String,

    pub transport: TransportSecurity,

    /// Idle pooled connections are closed after this long; `None` keeps them.
    pub pool_idle_timeout: Option<Duration>,

    pub pool_max_idle_per_host: usize,
}

impl Default for HttpTransportConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(30),
            max_body_size: 10 * 1024 * 1024,
            user_agent: DEFAULT_USER_AGENT.to_owned(),
            transport: TransportSecurity::TlsOnly,
            pool_idle_timeout: Some(Duration::from_secs(90)),
            pool_max_idle_per_host: 32,
        }
    }
}

impl HttpTransportConfig {
    /// Defaults with plain HTTP allowed, for tests against local servers.
    #[must_use]
    pub fn for_testing() -> Self {
        Self {
            transport: TransportSecurity::AllowInsecureHttp,
            ..Self::default()
        }
    }
}
