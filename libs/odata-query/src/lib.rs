#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

//! Fluent, typed `OData` v4 queries
//!
//! Queries are built as an immutable chain of [`Expression`] nodes, translated
//! by [`v4::ODataV4ExpressionVisitor`] into query segments and rendered as a URL
//! by [`v4::ODataV4QueryProvider`]. Execution goes through a pluggable
//! [`Transport`].
//!
//! # Example
//!
//! ```rust,ignore
//! use odata_query::{ODataV4Context, ODataV4Options};
//!
//! let context = ODataV4Context::new("https://host/odata", ODataV4Options::new().with_transport(transport));
//! let users = context
//!     .query::<User>("/users")
//!     .filter(|u| u.first_name().equals("john").and(u.age().greater_than_or_equal_to(30)))?
//!     .order_by(|u| u.last_name())?
//!     .top(10);
//!
//! let page = users.get_many().await?;
//! ```

pub mod ast;
mod context;
mod errors;
pub mod pager;
mod predicate;
pub mod provider;
pub mod proxy;
mod query;
pub mod response;
pub mod v4;

pub use ast::{Expression, FieldReference, IntoODataValue, Literal, LiteralType, Operand, Operator, Value};
pub use context::ODataV4Context;
pub use errors::{BoxError, Error, Result};
pub use predicate::{BooleanPredicateBuilder, IntoOperand, IntoPredicate, PredicateBuilder};
pub use provider::{
    QueryProvider, RequestOptions, RequestOptionsFactory, Transport, TransportResponse,
};
pub use proxy::{
    AsFieldReference, CollectionProxy, DynamicProxy, EntityProxy, IntoFieldList, LambdaVariables,
    ODataEntity, PropertyProxy, ProxyNode,
};
pub use query::ODataQuery;
pub use response::{
    ODataEntityResponse, ODataQueryResponse, ODataQueryResponseWithCount, ODataResponse,
};
pub use v4::{ODataV4Options, ODataV4QueryProvider};
