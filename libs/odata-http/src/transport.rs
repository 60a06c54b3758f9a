use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use http::header::USER_AGENT;
use http::{HeaderValue, Request, Uri};
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper_rustls::HttpsConnector;
use hyper_util::client::legacy::Client;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::rt::{TokioExecutor, TokioTimer};
use odata_query::{BoxError, RequestOptions, Transport, TransportResponse};

use crate::config::{HttpTransportConfig, TransportSecurity};
use crate::error::HttpTransportError;
use crate::tls;

type HyperClient = Client<HttpsConnector<HttpConnector>, Full<Bytes>>;

/// [`Transport`] backed by a pooled hyper client with rustls.
///
/// Every status code is returned as a response; only network, TLS, timeout and
/// size-limit failures become errors.
#[derive(Clone)]
pub struct HttpTransport {
    client: HyperClient,
    user_agent: HeaderValue,
    config: HttpTransportConfig,
}

impl std::fmt::Debug for HttpTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpTransport")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl HttpTransport {
    /// Build the connection pool.
    ///
    /// # Errors
    /// Returns an error if TLS initialization fails or the user agent is not a
    /// valid header value.
    pub fn new(config: HttpTransportConfig) -> Result<Self, HttpTransportError> {
        if config.transport == TransportSecurity::AllowInsecureHttp {
            tracing::warn!(
                "insecure HTTP enabled (TransportSecurity::AllowInsecureHttp); \
                 use only for testing with mock servers"
            );
        }

        let user_agent = HeaderValue::from_str(&config.user_agent)?;
        let https = build_https_connector(config.transport)?;

        let mut builder = Client::builder(TokioExecutor::new());
        builder
            .pool_timer(TokioTimer::new())
            .pool_max_idle_per_host(config.pool_max_idle_per_host);
        if let Some(idle_timeout) = config.pool_idle_timeout {
            builder.pool_idle_timeout(idle_timeout);
        }
        let client = builder.build::<_, Full<Bytes>>(https);

        Ok(Self {
            client,
            user_agent,
            config,
        })
    }

    #[must_use]
    pub fn config(&self) -> &HttpTransportConfig {
        &self.config
    }

    /// Send a request without a body and buffer the whole response.
    ///
    /// # Errors
    /// Returns [`HttpTransportError`] for malformed or disallowed URLs, network
    /// failures, timeouts and oversized bodies.
    pub async fn execute(
        &self,
        url: &str,
        options: RequestOptions,
    ) -> Result<TransportResponse, HttpTransportError> {
        let uri = self.parse_uri(url)?;

        let mut request = Request::builder()
            .method(options.method)
            .uri(uri)
            .body(Full::new(Bytes::new()))?;
        *request.headers_mut() = options.headers;
        request
            .headers_mut()
            .entry(USER_AGENT)
            .or_insert_with(|| self.user_agent.clone());

        let timeout = self.config.request_timeout;
        let limit = self.config.max_body_size;
        let exchange = async {
            let response = self.client.request(request).await?;
            let (parts, body) = response.into_parts();
            let body = read_body(body, limit).await?;
            Ok::<_, HttpTransportError>(TransportResponse::new(parts.status, parts.headers, body))
        };

        match tokio::time::timeout(timeout, exchange).await {
            Ok(result) => result,
            Err(_) => {
                tracing::debug!(url, ?timeout, "OData request timed out");
                Err(HttpTransportError::Timeout(timeout))
            }
        }
    }

    fn parse_uri(&self, url: &str) -> Result<Uri, HttpTransportError> {
        let uri: Uri = url.parse().map_err(|e: http::uri::InvalidUri| HttpTransportError::InvalidUri {
            url: url.to_owned(),
            reason: e.to_string(),
        })?;

        match uri.scheme_str() {
            Some("https") => {}
            Some("http") if self.config.transport == TransportSecurity::AllowInsecureHttp => {}
            Some("http") => {
                return Err(HttpTransportError::InvalidScheme {
                    scheme: "http".to_owned(),
                    reason: "plain HTTP requires TransportSecurity::AllowInsecureHttp".to_owned(),
                });
            }
            Some(other) => {
                return Err(HttpTransportError::InvalidScheme {
                    scheme: other.to_owned(),
                    reason: "only http and https are supported".to_owned(),
                });
            }
            None => {
                return Err(HttpTransportError::InvalidUri {
                    url: url.to_owned(),
                    reason: "absolute URL with scheme and host required".to_owned(),
                });
            }
        }

        if uri.authority().is_none() {
            return Err(HttpTransportError::InvalidUri {
                url: url.to_owned(),
                reason: "missing host".to_owned(),
            });
        }
        Ok(uri)
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, url: &str, options: RequestOptions) -> Result<TransportResponse, BoxError> {
        Ok(self.execute(url, options).await?)
    }
}

async fn read_body(mut body: Incoming, limit: usize) -> Result<Bytes, HttpTransportError> {
    let mut buffer = BytesMut::new();
    while let Some(frame) = body.frame().await {
        let Ok(data) = frame?.into_data() else {
            continue;
        };
        let actual = buffer.len() + data.len();
        if actual > limit {
            return Err(HttpTransportError::BodyTooLarge { limit, actual });
        }
        buffer.extend_from_slice(&data);
    }
    Ok(buffer.freeze())
}

fn build_https_connector(
    transport: TransportSecurity,
) -> Result<HttpsConnector<HttpConnector>, HttpTransportError> {
    let builder = hyper_rustls::HttpsConnectorBuilder::new()
        .with_provider_and_webpki_roots(tls::crypto_provider())
        .map_err(|e| HttpTransportError::Tls(Box::new(e)))?;
    let connector = match transport {
        TransportSecurity::AllowInsecureHttp => builder.https_or_http().enable_all_versions().build(),
        TransportSecurity::TlsOnly => builder.https_only().enable_all_versions().build(),
    };
    Ok(connector)
}
