//! Execution seam between the query façade and a protocol implementation.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode};
use serde::de::DeserializeOwned;

use crate::ast::Expression;
use crate::errors::{BoxError, Result};
use crate::proxy::{LambdaVariables, ProxyNode};

/// Boxed future used by request-option factories and page fetchers.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Options applied to a single outgoing request.
#[derive(Clone, Debug)]
pub struct RequestOptions {
    pub method: Method,
    pub headers: HeaderMap,
}

impl Default for RequestOptions {
    fn default() -> Self {
        Self {
            method: Method::GET,
            headers: HeaderMap::new(),
        }
    }
}

impl RequestOptions {
    #[must_use]
    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }
}

/// Produces fresh [`RequestOptions`] for every request, e.g. to attach a token.
#[derive(Clone)]
pub struct RequestOptionsFactory(Arc<dyn Fn() -> BoxFuture<'static, RequestOptions> + Send + Sync>);

impl RequestOptionsFactory {
    /// Factory computing options synchronously.
    pub fn from_fn<F>(f: F) -> Self
    where
        F: Fn() -> RequestOptions + Send + Sync + 'static,
    {
        Self(Arc::new(move || {
            let options: BoxFuture<'static, RequestOptions> = Box::pin(std::future::ready(f()));
            options
        }))
    }

    /// Factory computing options asynchronously.
    pub fn from_async<F, Fut>(f: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = RequestOptions> + Send + 'static,
    {
        Self(Arc::new(move || {
            let options: BoxFuture<'static, RequestOptions> = Box::pin(f());
            options
        }))
    }

    pub async fn create(&self) -> RequestOptions {
        (self.0)().await
    }
}

impl fmt::Debug for RequestOptionsFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("RequestOptionsFactory(..)")
    }
}

/// Buffered response returned by a [`Transport`].
#[derive(Clone, Debug)]
pub struct TransportResponse {
    status: StatusCode,
    headers: HeaderMap,
    body: Bytes,
}

impl TransportResponse {
    #[must_use]
    pub fn new(status: StatusCode, headers: HeaderMap, body: Bytes) -> Self {
        Self {
            status,
            headers,
            body,
        }
    }

    #[must_use]
    pub fn status(&self) -> StatusCode {
        self.status
    }

    #[must_use]
    pub fn status_text(&self) -> &'static str {
        self.status.canonical_reason().unwrap_or("")
    }

    #[must_use]
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// `true` for 2xx statuses.
    #[must_use]
    pub fn ok(&self) -> bool {
        self.status.is_success()
    }

    /// # Errors
    /// Returns [`crate::Error::Json`] if the body does not match `T`.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_slice(&self.body)?)
    }

    /// Body decoded as UTF-8, replacing invalid sequences.
    #[must_use]
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    #[must_use]
    pub fn bytes(&self) -> Bytes {
        self.body.clone()
    }
}

/// Sends a request and buffers the response.
///
/// Retries, timeouts and cancellation belong to the implementation.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(
        &self,
        url: &str,
        options: RequestOptions,
    ) -> std::result::Result<TransportResponse, BoxError>;
}

/// Protocol-specific translation and execution of an expression chain.
#[async_trait]
pub trait QueryProvider: Send + Sync {
    /// Range-variable allocator shared by every proxy this provider creates.
    fn lambda_variables(&self) -> Arc<LambdaVariables>;

    /// Root node for typed entity proxies.
    fn create_proxy_node(&self) -> ProxyNode {
        ProxyNode::root(self.lambda_variables())
    }

    /// Render the chain ending at `expression` into a request URL.
    ///
    /// # Errors
    /// Returns a translation error if the chain cannot be rendered.
    fn build_query(&self, expression: Option<&Expression>) -> Result<String>;

    /// Execute the chain and parse the JSON body.
    async fn execute_query(&self, expression: Option<&Expression>) -> Result<serde_json::Value>;

    /// Execute the chain and return the raw response, e.g. for `/$value`.
    async fn execute_request(&self, expression: Option<&Expression>) -> Result<TransportResponse>;

    /// Fetch an absolute URL such as `@odata.nextLink` and parse the JSON body.
    async fn execute_url(&self, url: &str) -> Result<serde_json::Value>;
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use http::header::AUTHORIZATION;

    #[tokio::test]
    async fn sync_and_async_factories_produce_options() {
        let sync = RequestOptionsFactory::from_fn(|| {
            RequestOptions::default()
                .with_header(AUTHORIZATION, HeaderValue::from_static("Bearer a"))
        });
        let asynchronous = RequestOptionsFactory::from_async(|| async {
            RequestOptions {
                method: Method::HEAD,
                headers: HeaderMap::new(),
            }
        });

        let options = sync.create().await;
        assert_eq!(options.method, Method::GET);
        assert_eq!(options.headers[AUTHORIZATION], "Bearer a");
        assert_eq!(asynchronous.create().await.method, Method::HEAD);
    }

    #[test]
    fn response_accessors() {
        let response = TransportResponse::new(
            StatusCode::NOT_FOUND,
            HeaderMap::new(),
            Bytes::from_static(br#"{"error":"missing"}"#),
        );

        assert!(!response.ok());
        assert_eq!(response.status_text(), "Not Found");
        assert_eq!(response.text(), r#"{"error":"missing"}"#);
        let body: serde_json::Value = response.json().unwrap();
        assert_eq!(body["error"], "missing");
    }
}
