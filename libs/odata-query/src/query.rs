//! Fluent query façade.
//!
//! Every chain method leaves `self` untouched and returns a new query whose head
//! node links back to the current one, so queries can share prefixes freely:
//!
//! ```rust,ignore
//! let adults = users.filter(|u| u.age().greater_than_or_equal_to(18))?;
//! let first_page = adults.top(20);
//! let second_page = adults.skip(20).top(20);
//! ```

use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use bigdecimal::BigDecimal;
use bytes::Bytes;
use futures_core::Stream;
use serde::de::DeserializeOwned;

use crate::ast::{Expression, FieldReference, Operand, Operator, Projector, Value};
use crate::errors::{Error, Result};
use crate::pager::{ItemsPager, PagesPager, resolve_next_link};
use crate::predicate::{BooleanPredicateBuilder, IntoOperand, IntoPredicate, PredicateBuilder};
use crate::provider::{BoxFuture, QueryProvider};
use crate::proxy::{EntityProxy, IntoFieldList, ODataEntity, ProxyNode};
use crate::response::{
    ODataEntityResponse, ODataQueryResponse, ODataQueryResponseWithCount,
};
use crate::v4::{ODataV4Options, ODataV4QueryProvider};

/// Query over entities of type `T`, producing results of type `R`.
///
/// `R` differs from `T` after a projecting [`ODataQuery::select_with`].
pub struct ODataQuery<T, R = T> {
    provider: Arc<dyn QueryProvider>,
    expression: Option<Arc<Expression>>,
    _types: PhantomData<fn() -> (T, R)>,
}

impl<T, R> Clone for ODataQuery<T, R> {
    fn clone(&self) -> Self {
        Self {
            provider: self.provider.clone(),
            expression: self.expression.clone(),
            _types: PhantomData,
        }
    }
}

impl<T, R> fmt::Debug for ODataQuery<T, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ODataQuery")
            .field("expression", &self.expression)
            .finish_non_exhaustive()
    }
}

impl<T: ODataEntity> ODataQuery<T> {
    pub fn new(provider: Arc<dyn QueryProvider>) -> Self {
        Self {
            provider,
            expression: None,
            _types: PhantomData,
        }
    }

    /// `OData` v4 query without a transport; it can be rendered but not executed.
    pub fn for_v4(endpoint: impl Into<String>) -> Self {
        Self::for_v4_with(endpoint, ODataV4Options::default())
    }

    pub fn for_v4_with(endpoint: impl Into<String>, options: ODataV4Options) -> Self {
        Self::new(Arc::new(ODataV4QueryProvider::new(endpoint, options)))
    }
}

impl<T: ODataEntity, R> ODataQuery<T, R> {
    /// Head of the expression chain; `None` for a fresh query.
    #[must_use]
    pub fn expression(&self) -> Option<&Arc<Expression>> {
        self.expression.as_ref()
    }

    #[must_use]
    pub fn provider(&self) -> &Arc<dyn QueryProvider> {
        &self.provider
    }

    /// Typed entity view rooted at the query's entity.
    #[must_use]
    pub fn proxy(&self) -> T::Proxy {
        T::Proxy::from_node(self.provider.create_proxy_node())
    }

    fn push<R2>(&self, operator: Operator, operands: Vec<Operand>) -> ODataQuery<T, R2> {
        ODataQuery {
            provider: self.provider.clone(),
            expression: Some(Arc::new(Expression::new(
                operator,
                operands,
                self.expression.clone(),
            ))),
            _types: PhantomData,
        }
    }

    fn field_operands(operator: Operator, fields: Vec<FieldReference>) -> Result<Vec<Operand>> {
        if fields.is_empty() {
            return Err(Error::InvalidArgument {
                operator,
                reason: "at least one field is required".to_owned(),
            });
        }
        fields
            .into_iter()
            .map(|field| {
                field.validate()?;
                Ok(Operand::Field(field))
            })
            .collect()
    }

    fn push_fields<R2, F, L>(&self, operator: Operator, fields: F) -> Result<ODataQuery<T, R2>>
    where
        F: FnOnce(T::Proxy) -> L,
        L: IntoFieldList,
    {
        let fields = fields(self.proxy()).into_field_list();
        Ok(self.push(operator, Self::field_operands(operator, fields)?))
    }

    /// Request only the listed fields; a later `select` replaces an earlier one,
    /// including a projection, so results are entities again.
    ///
    /// # Errors
    /// Returns [`Error::InvalidArgument`] for an empty list and
    /// [`Error::InvalidFieldPath`] for an empty path segment.
    pub fn select<F, L>(&self, fields: F) -> Result<ODataQuery<T>>
    where
        F: FnOnce(T::Proxy) -> L,
        L: IntoFieldList,
    {
        self.push_fields(Operator::Select, fields)
    }

    /// Select through a projector and reshape every returned record with it.
    ///
    /// The projector runs once against a tracking proxy; each property it reads
    /// through `value()` becomes part of `$select`, in order of first use.
    pub fn select_with<R2, F>(&self, projector: F) -> ODataQuery<T, R2>
    where
        T: 'static,
        F: Fn(T::Proxy) -> serde_json::Value + Send + Sync + 'static,
    {
        let (node, tracked) = ProxyNode::tracking();
        let _ = projector(T::Proxy::from_node(node));
        let paths = std::mem::take(
            &mut *tracked
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner),
        );

        let mut operands: Vec<Operand> = paths.into_iter().map(Operand::Field).collect();
        operands.push(Operand::Projector(Projector::new(move |node| {
            projector(T::Proxy::from_node(node.clone()))
        })));
        self.push(Operator::Select, operands)
    }

    /// Append ascending sort keys.
    ///
    /// # Errors
    /// Returns [`Error::InvalidArgument`] for an empty list and
    /// [`Error::InvalidFieldPath`] for an empty path segment.
    pub fn order_by<F, L>(&self, fields: F) -> Result<Self>
    where
        F: FnOnce(T::Proxy) -> L,
        L: IntoFieldList,
    {
        self.push_fields(Operator::OrderBy, fields)
    }

    /// Append descending sort keys.
    ///
    /// # Errors
    /// Returns [`Error::InvalidArgument`] for an empty list and
    /// [`Error::InvalidFieldPath`] for an empty path segment.
    pub fn order_by_descending<F, L>(&self, fields: F) -> Result<Self>
    where
        F: FnOnce(T::Proxy) -> L,
        L: IntoFieldList,
    {
        self.push_fields(Operator::OrderByDescending, fields)
    }

    /// Add a condition built from the typed entity view. Successive filters are
    /// combined with `and`.
    ///
    /// # Errors
    /// Propagates a construction error returned by `predicate` and returns
    /// [`Error::InvalidFieldPath`] for a field path with an empty segment.
    pub fn filter<F, P>(&self, predicate: F) -> Result<Self>
    where
        F: FnOnce(T::Proxy) -> P,
        P: IntoPredicate,
    {
        self.filter_predicate(predicate(self.proxy()).into_predicate()?)
    }

    /// Add a condition built from field names.
    ///
    /// # Errors
    /// Propagates a construction error returned by `predicate` and returns
    /// [`Error::InvalidFieldPath`] for a field path with an empty segment.
    pub fn filter_by<F, P>(&self, predicate: F) -> Result<Self>
    where
        F: FnOnce(PredicateBuilder<T>) -> P,
        P: IntoPredicate,
    {
        self.filter_predicate(predicate(PredicateBuilder::new()).into_predicate()?)
    }

    /// Add an already built condition.
    ///
    /// # Errors
    /// Returns [`Error::InvalidFieldPath`] for a field path with an empty segment.
    pub fn filter_predicate(&self, predicate: BooleanPredicateBuilder) -> Result<Self> {
        let expression = predicate.into_expression();
        expression.validate_fields()?;
        Ok(self.push(Operator::Predicate, vec![Operand::Expression(expression)]))
    }

    /// Maximum number of results; the last call wins.
    #[must_use]
    pub fn top(&self, count: u64) -> Self {
        self.push(Operator::Top, vec![Operand::Value(Value::Number(BigDecimal::from(count)))])
    }

    /// Number of results to skip; the last call wins.
    #[must_use]
    pub fn skip(&self, count: u64) -> Self {
        self.push(Operator::Skip, vec![Operand::Value(Value::Number(BigDecimal::from(count)))])
    }

    /// Expand navigation properties. Has no effect after [`ODataQuery::expand_all`].
    ///
    /// # Errors
    /// Returns [`Error::InvalidArgument`] for an empty list and
    /// [`Error::InvalidFieldPath`] for an empty path segment.
    pub fn expand<F, L>(&self, fields: F) -> Result<Self>
    where
        F: FnOnce(T::Proxy) -> L,
        L: IntoFieldList,
    {
        self.push_fields(Operator::Expand, fields)
    }

    /// `$expand=*`
    #[must_use]
    pub fn expand_all(&self) -> Self {
        self.push(Operator::ExpandAll, Vec::new())
    }

    /// Address a single entity: `<path>(<key>)`.
    #[must_use]
    pub fn by_key(&self, key: impl IntoOperand) -> Self {
        self.push(Operator::GetByKey, vec![key.into_operand()])
    }

    /// Request `$count=true`.
    #[must_use]
    pub fn with_count(&self) -> Self {
        self.push(Operator::GetWithCount, Vec::new())
    }

    /// Request the raw value: `<path>/$value`.
    #[must_use]
    pub fn value(&self) -> Self {
        self.push(Operator::Value, Vec::new())
    }

    /// Rendered request URL.
    ///
    /// # Errors
    /// Returns a translation error if the chain cannot be rendered.
    pub fn to_url(&self) -> Result<String> {
        self.provider.build_query(self.expression.as_deref())
    }

    fn projector(&self) -> Option<&Projector> {
        self.expression.as_deref().and_then(Expression::projector)
    }
}

impl<T, R> ODataQuery<T, R>
where
    T: ODataEntity,
    R: DeserializeOwned,
{
    /// Execute the query and return one page of results.
    ///
    /// # Errors
    /// Returns a translation, transport, HTTP or JSON error.
    pub async fn get_many(&self) -> Result<ODataQueryResponse<R>> {
        let raw = self.provider.execute_query(self.expression.as_deref()).await?;
        decode_collection(raw, self.projector())
    }

    /// Execute the query with `$count=true`.
    ///
    /// # Errors
    /// Returns a translation, transport, HTTP or JSON error.
    pub async fn get_many_with_count(&self) -> Result<ODataQueryResponseWithCount<R>> {
        let query = self.with_count();
        let raw = query.provider.execute_query(query.expression.as_deref()).await?;
        let page: ODataQueryResponseWithCount<serde_json::Value> = serde_json::from_value(raw)?;
        page.try_map(|record| reshape(record, query.projector()))
    }

    /// Fetch a single entity by key.
    ///
    /// # Errors
    /// Returns a translation, transport, HTTP or JSON error.
    pub async fn get(&self, key: impl IntoOperand) -> Result<ODataEntityResponse<R>> {
        let query = self.by_key(key);
        let raw = query.provider.execute_query(query.expression.as_deref()).await?;
        let response: ODataEntityResponse<serde_json::Value> = serde_json::from_value(raw)?;
        Ok(ODataEntityResponse {
            context: response.context,
            entity: reshape(response.entity, query.projector())?,
        })
    }

    /// Fetch the raw `/$value` body.
    ///
    /// # Errors
    /// Returns a translation, transport or HTTP error.
    pub async fn get_value(&self) -> Result<Bytes> {
        let query = self.value();
        let response = query
            .provider
            .execute_request(query.expression.as_deref())
            .await?;
        Ok(response.bytes())
    }

    fn page_fetcher(
        &self,
    ) -> impl FnMut(Option<String>) -> BoxFuture<'static, Result<ODataQueryResponse<R>>> + Send + use<T, R>
    where
        T: 'static,
        R: Send + 'static,
    {
        let provider = self.provider.clone();
        let expression = self.expression.clone();
        let mut request_url: Option<String> = None;
        move |next_link| {
            let url = match (next_link, request_url.as_deref()) {
                (Some(link), Some(previous)) => resolve_next_link(previous, &link),
                (Some(link), None) => Ok(link),
                (None, _) => provider.build_query(expression.as_deref()),
            };
            request_url = url.as_ref().ok().cloned();

            let provider = provider.clone();
            let expression = expression.clone();
            let page: BoxFuture<'static, Result<ODataQueryResponse<R>>> = Box::pin(async move {
                let raw = provider.execute_url(&url?).await?;
                decode_collection(raw, expression.as_deref().and_then(Expression::projector))
            });
            page
        }
    }

    /// Stream of pages, following `@odata.nextLink` until a page has none.
    ///
    /// Relative next links are resolved against the URL of the previous request.
    pub fn pages(&self) -> impl Stream<Item = Result<ODataQueryResponse<R>>> + Send + use<T, R>
    where
        T: 'static,
        R: Send + 'static,
    {
        PagesPager::new(self.page_fetcher())
    }

    /// Stream of items across all pages.
    pub fn items(&self) -> impl Stream<Item = Result<R>> + Send + use<T, R>
    where
        T: 'static,
        R: Send + 'static,
    {
        ItemsPager::new(self.page_fetcher())
    }
}

fn decode_collection<R: DeserializeOwned>(
    raw: serde_json::Value,
    projector: Option<&Projector>,
) -> Result<ODataQueryResponse<R>> {
    let page: ODataQueryResponse<serde_json::Value> = serde_json::from_value(raw)?;
    page.try_map(|record| reshape(record, projector))
}

/// Deserialize a record, reshaping it first when the query was projected.
fn reshape<R: DeserializeOwned>(
    record: serde_json::Value,
    projector: Option<&Projector>,
) -> Result<R> {
    let record = match projector {
        Some(projector) => projector.apply(&ProxyNode::reading(Arc::new(record))),
        None => record,
    };
    Ok(serde_json::from_value(record)?)
}
