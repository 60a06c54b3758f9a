use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};

use crate::ast::Expression;
use crate::errors::{Error, Result};
use crate::provider::{QueryProvider, RequestOptions, RequestOptionsFactory, Transport, TransportResponse};
use crate::proxy::LambdaVariables;
use crate::v4::segments::ODataV4QuerySegments;
use crate::v4::visitor::ODataV4ExpressionVisitor;

/// Bytes escaped in a query parameter value; unreserved URI marks stay literal.
const QUERY_COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'!')
    .remove(b'~')
    .remove(b'*')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')');

fn encode(value: &str) -> String {
    utf8_percent_encode(value, QUERY_COMPONENT).to_string()
}

/// Options for an `OData` v4 provider.
#[derive(Clone, Default)]
pub struct ODataV4Options {
    transport: Option<Arc<dyn Transport>>,
    request_options: Option<RequestOptionsFactory>,
}

impl ODataV4Options {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Options applied to every request, e.g. authentication headers.
    #[must_use]
    pub fn with_request_options(mut self, factory: RequestOptionsFactory) -> Self {
        self.request_options = Some(factory);
        self
    }
}

impl fmt::Debug for ODataV4Options {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ODataV4Options")
            .field("transport", &self.transport.is_some())
            .field("request_options", &self.request_options)
            .finish()
    }
}

/// Renders expression chains as `OData` v4 URLs and executes them.
#[derive(Debug)]
pub struct ODataV4QueryProvider {
    path: String,
    options: ODataV4Options,
    lambdas: Arc<LambdaVariables>,
}

impl ODataV4QueryProvider {
    pub fn new(path: impl Into<String>, options: ODataV4Options) -> Self {
        Self {
            path: path.into(),
            options,
            lambdas: Arc::new(LambdaVariables::new()),
        }
    }

    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Translate the chain into query segments.
    ///
    /// # Errors
    /// Returns a translation error if the chain cannot be rendered.
    pub fn build(&self, expression: Option<&Expression>) -> Result<ODataV4QuerySegments> {
        ODataV4ExpressionVisitor::new().visit(expression)
    }

    /// `<path>[(<key>)][/$value][?<query>]`
    #[must_use]
    pub fn generate_url(&self, segments: &ODataV4QuerySegments) -> String {
        let mut url = self.path.clone();
        if let Some(key) = &segments.key {
            url.push('(');
            url.push_str(key);
            url.push(')');
        }
        if segments.value {
            url.push_str("/$value");
        }
        let query = Self::build_query_string(segments);
        if !query.is_empty() {
            url.push('?');
            url.push_str(&query);
        }
        url
    }

    /// Query parameters in fixed order: filter, orderby, select, skip, top, count, expand.
    #[must_use]
    pub fn build_query_string(segments: &ODataV4QuerySegments) -> String {
        let mut params = Vec::new();

        if let Some(filter) = &segments.filter {
            params.push(format!("$filter={}", encode(filter)));
        }
        if let Some(order_by) = &segments.order_by {
            let keys: Vec<String> = order_by.iter().map(ToString::to_string).collect();
            params.push(format!("$orderby={}", encode(&keys.join(","))));
        }
        if let Some(select) = &segments.select {
            params.push(format!("$select={}", encode(&select.join(","))));
        }
        if let Some(skip) = segments.skip {
            params.push(format!("$skip={skip}"));
        }
        if let Some(top) = segments.top {
            params.push(format!("$top={top}"));
        }
        if segments.count {
            params.push("$count=true".to_owned());
        }
        if let Some(expand) = &segments.expand {
            params.push(format!("$expand={}", encode(&expand.join(","))));
        }

        params.join("&")
    }

    async fn send(&self, url: &str) -> Result<TransportResponse> {
        let transport = self
            .options
            .transport
            .as_ref()
            .ok_or(Error::TransportUnavailable)?;
        let options = match &self.options.request_options {
            Some(factory) => factory.create().await,
            None => RequestOptions::default(),
        };

        tracing::debug!(url, method = %options.method, "sending OData request");
        let response = transport.send(url, options).await.map_err(Error::Connection)?;
        tracing::debug!(url, status = response.status().as_u16(), "received OData response");
        Ok(response)
    }

    fn failure(url: &str, response: &TransportResponse, body: String) -> Error {
        let status = response.status().as_u16();
        tracing::warn!(url, status, reason = response.status_text(), "OData request failed");
        Error::Http { status, body }
    }
}

#[async_trait]
impl QueryProvider for ODataV4QueryProvider {
    fn lambda_variables(&self) -> Arc<LambdaVariables> {
        self.lambdas.clone()
    }

    fn build_query(&self, expression: Option<&Expression>) -> Result<String> {
        let segments = self.build(expression)?;
        Ok(self.generate_url(&segments))
    }

    async fn execute_query(&self, expression: Option<&Expression>) -> Result<serde_json::Value> {
        let url = self.build_query(expression)?;
        self.execute_url(&url).await
    }

    async fn execute_request(&self, expression: Option<&Expression>) -> Result<TransportResponse> {
        let url = self.build_query(expression)?;
        let response = self.send(&url).await?;
        if !response.ok() {
            return Err(Self::failure(&url, &response, response.text()));
        }
        Ok(response)
    }

    async fn execute_url(&self, url: &str) -> Result<serde_json::Value> {
        let response = self.send(url).await?;
        if !response.ok() {
            // JSON error payloads are reported compactly, anything else verbatim
            let body = response
                .json::<serde_json::Value>()
                .map_or_else(|_| response.text(), |payload| payload.to_string());
            return Err(Self::failure(url, &response, body));
        }
        response.json()
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use crate::errors::BoxError;
    use crate::v4::segments::{OrderKey, SortDir};
    use bytes::Bytes;
    use http::{HeaderMap, StatusCode};
    use tracing_test::traced_test;

    struct Gone;

    #[async_trait]
    impl Transport for Gone {
        async fn send(
            &self,
            _url: &str,
            _options: RequestOptions,
        ) -> std::result::Result<TransportResponse, BoxError> {
            Ok(TransportResponse::new(
                StatusCode::NOT_FOUND,
                HeaderMap::new(),
                Bytes::from_static(b"gone"),
            ))
        }
    }

    fn provider() -> ODataV4QueryProvider {
        ODataV4QueryProvider::new("/odata/users", ODataV4Options::default())
    }

    #[test]
    fn empty_segments_render_bare_path() {
        let url = provider().generate_url(&ODataV4QuerySegments::default());
        assert_eq!(url, "/odata/users");
    }

    #[test]
    fn parameters_follow_fixed_order() {
        let segments = ODataV4QuerySegments {
            select: Some(vec!["firstName".to_owned(), "lastName".to_owned()]),
            order_by: Some(vec![
                OrderKey { field: "age".to_owned(), dir: SortDir::Asc },
                OrderKey { field: "lastName".to_owned(), dir: SortDir::Desc },
            ]),
            skip: Some(0),
            top: Some(0),
            filter: Some("age ge 30".to_owned()),
            key: None,
            count: true,
            expand: Some(vec!["mother".to_owned()]),
            value: false,
        };

        assert_eq!(
            ODataV4QueryProvider::build_query_string(&segments),
            "$filter=age%20ge%2030&$orderby=age%2ClastName%20desc&$select=firstName%2ClastName\
             &$skip=0&$top=0&$count=true&$expand=mother"
        );
    }

    #[test]
    fn uri_marks_stay_unescaped() {
        let segments = ODataV4QuerySegments {
            filter: Some("name eq 'O''Neil' and (tag eq '!~')".to_owned()),
            expand: Some(vec!["*".to_owned()]),
            ..ODataV4QuerySegments::default()
        };
        assert_eq!(
            ODataV4QueryProvider::build_query_string(&segments),
            "$filter=name%20eq%20'O''Neil'%20and%20(tag%20eq%20'!~')&$expand=*"
        );
    }

    #[test]
    fn key_and_value_extend_path() {
        let segments = ODataV4QuerySegments {
            key: Some("'abc'".to_owned()),
            value: true,
            ..ODataV4QuerySegments::default()
        };
        assert_eq!(provider().generate_url(&segments), "/odata/users('abc')/$value");
    }

    #[tokio::test]
    async fn execution_without_transport_fails() {
        let err = provider().execute_query(None).await.unwrap_err();
        assert!(matches!(err, Error::TransportUnavailable));
    }

    #[tokio::test]
    #[traced_test]
    async fn failed_requests_are_traced() {
        let provider = ODataV4QueryProvider::new(
            "/odata/users",
            ODataV4Options::new().with_transport(Arc::new(Gone)),
        );
        let err = provider.execute_url("/odata/users(9)").await.unwrap_err();

        assert!(matches!(err, Error::Http { status: 404, ref body } if body == "gone"));
        assert!(logs_contain("sending OData request"));
        assert!(logs_contain("OData request failed"));
    }
}
