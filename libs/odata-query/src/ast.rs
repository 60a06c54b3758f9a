//! Expression model shared by the query chain and predicate trees.
//!
//! A query is a linked list of [`Expression`] nodes: every fluent call allocates a
//! new node whose `previous` link points at the chain built so far. Predicate trees
//! hang off `predicate` nodes as operands and never set `previous`.

use std::fmt;
use std::sync::Arc;

use bigdecimal::BigDecimal;
use bigdecimal::num_bigint::BigInt;
use chrono::{DateTime, FixedOffset, NaiveDate, NaiveTime, Utc};
use uuid::Uuid;

use crate::errors::{Error, Result};
use crate::proxy::ProxyNode;

/// Runtime value carried by a literal.
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Number(BigDecimal),
    Float(f64),
    String(String),
    Uuid(Uuid),
    DateTime(DateTime<Utc>),
    Date(NaiveDate),
    Time(NaiveTime),
}

impl Value {
    /// Semantic type a literal of this value gets when none is given explicitly.
    #[must_use]
    pub fn default_type(&self) -> LiteralType {
        match self {
            Self::Null => LiteralType::Null,
            Self::Bool(_) => LiteralType::Boolean,
            Self::Number(_) | Self::Float(_) => LiteralType::Number,
            Self::String(_) => LiteralType::String,
            Self::Uuid(_) => LiteralType::Guid,
            Self::DateTime(_) => LiteralType::DateTimeOffset,
            Self::Date(_) => LiteralType::Date,
            Self::Time(_) => LiteralType::TimeOfDay,
        }
    }
}

/// Trait for types that can be used as `OData` literal values.
pub trait IntoODataValue {
    fn into_odata_value(self) -> Value;
}

macro_rules! impl_into_number {
    ($($ty:ty),* $(,)?) => {
        $(
            impl IntoODataValue for $ty {
                fn into_odata_value(self) -> Value {
                    Value::Number(BigDecimal::from(self))
                }
            }
        )*
    };
}

impl_into_number!(i8, i16, i32, i64, i128, u8, u16, u32, u64, u128);

impl IntoODataValue for usize {
    fn into_odata_value(self) -> Value {
        Value::Number(BigDecimal::new(BigInt::from(self), 0))
    }
}

impl IntoODataValue for isize {
    fn into_odata_value(self) -> Value {
        Value::Number(BigDecimal::new(BigInt::from(self), 0))
    }
}

impl IntoODataValue for f64 {
    fn into_odata_value(self) -> Value {
        Value::Float(self)
    }
}

impl IntoODataValue for f32 {
    fn into_odata_value(self) -> Value {
        Value::Float(f64::from(self))
    }
}

impl IntoODataValue for bool {
    fn into_odata_value(self) -> Value {
        Value::Bool(self)
    }
}

impl IntoODataValue for String {
    fn into_odata_value(self) -> Value {
        Value::String(self)
    }
}

impl IntoODataValue for &String {
    fn into_odata_value(self) -> Value {
        Value::String(self.clone())
    }
}

impl IntoODataValue for &str {
    fn into_odata_value(self) -> Value {
        Value::String(self.to_owned())
    }
}

impl IntoODataValue for BigDecimal {
    fn into_odata_value(self) -> Value {
        Value::Number(self)
    }
}

impl IntoODataValue for Uuid {
    fn into_odata_value(self) -> Value {
        Value::Uuid(self)
    }
}

impl IntoODataValue for DateTime<Utc> {
    fn into_odata_value(self) -> Value {
        Value::DateTime(self)
    }
}

impl IntoODataValue for DateTime<FixedOffset> {
    fn into_odata_value(self) -> Value {
        Value::DateTime(self.to_utc())
    }
}

impl IntoODataValue for NaiveDate {
    fn into_odata_value(self) -> Value {
        Value::Date(self)
    }
}

impl IntoODataValue for NaiveTime {
    fn into_odata_value(self) -> Value {
        Value::Time(self)
    }
}

impl IntoODataValue for Value {
    fn into_odata_value(self) -> Value {
        self
    }
}

impl<V: IntoODataValue> IntoODataValue for Option<V> {
    fn into_odata_value(self) -> Value {
        self.map_or(Value::Null, IntoODataValue::into_odata_value)
    }
}

/// Semantic type tag controlling how a literal is rendered.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum LiteralType {
    Null,
    Boolean,
    Number,
    String,
    DateTimeOffset,
    /// Calendar date only; timestamps are truncated to `YYYY-MM-DD`.
    Date,
    TimeOfDay,
    /// Rendered unquoted.
    Guid,
}

/// A constant used inside a predicate or as an entity key.
#[derive(Clone, Debug, PartialEq)]
pub struct Literal {
    value: Value,
    literal_type: LiteralType,
}

impl Literal {
    /// Literal whose type tag is derived from the value.
    pub fn new(value: impl IntoODataValue) -> Self {
        let value = value.into_odata_value();
        let literal_type = value.default_type();
        Self {
            value,
            literal_type,
        }
    }

    /// Literal with an explicit type tag, e.g. a string tagged as a date.
    pub fn typed(value: impl IntoODataValue, literal_type: LiteralType) -> Self {
        Self {
            value: value.into_odata_value(),
            literal_type,
        }
    }

    #[must_use]
    pub fn value(&self) -> &Value {
        &self.value
    }

    #[must_use]
    pub fn literal_type(&self) -> LiteralType {
        self.literal_type
    }
}

/// Navigation path to a property, possibly through nested or navigation objects.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct FieldReference {
    path: Vec<String>,
}

impl FieldReference {
    /// Build a reference from explicit segments.
    ///
    /// # Errors
    /// Returns [`Error::InvalidFieldPath`] if there are no segments or a segment is empty.
    pub fn from_segments<I, S>(segments: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let reference = Self::from_parts(segments.into_iter().map(Into::into).collect());
        reference.validate()?;
        Ok(reference)
    }

    pub(crate) fn from_parts(path: Vec<String>) -> Self {
        Self { path }
    }

    #[must_use]
    pub fn path(&self) -> &[String] {
        &self.path
    }

    /// Reference to a property nested under this one.
    #[must_use]
    pub fn child(&self, segment: impl Into<String>) -> Self {
        let mut path = self.path.clone();
        path.push(segment.into());
        Self { path }
    }

    /// # Errors
    /// Returns [`Error::InvalidFieldPath`] if the path or any of its segments is empty.
    pub fn validate(&self) -> Result<()> {
        if self.path.is_empty() || self.path.iter().any(|s| s.trim().is_empty()) {
            return Err(Error::InvalidFieldPath(self.to_string()));
        }
        Ok(())
    }
}

impl fmt::Display for FieldReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.path.join("/"))
    }
}

/// Parses a `/`-separated path. Empty segments are reported when the
/// reference is added to a query.
impl From<&str> for FieldReference {
    fn from(path: &str) -> Self {
        Self::from_parts(path.split('/').map(str::to_owned).collect())
    }
}

impl From<String> for FieldReference {
    fn from(path: String) -> Self {
        Self::from(path.as_str())
    }
}

/// Closed set of operator tags.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Operator {
    // Query chain
    Select,
    Top,
    Skip,
    OrderBy,
    OrderByDescending,
    Predicate,
    Expand,
    ExpandAll,
    GetByKey,
    GetWithCount,
    Value,

    // Predicates
    And,
    Or,
    Not,
    Equals,
    NotEquals,
    GreaterThan,
    GreaterThanOrEqualTo,
    LessThan,
    LessThanOrEqualTo,
    Contains,
    StartsWith,
    EndsWith,
    In,
    Any,
    All,
    Literal,
    FieldReference,
}

impl Operator {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Select => "select",
            Self::Top => "top",
            Self::Skip => "skip",
            Self::OrderBy => "orderBy",
            Self::OrderByDescending => "orderByDescending",
            Self::Predicate => "predicate",
            Self::Expand => "expand",
            Self::ExpandAll => "expandAll",
            Self::GetByKey => "getByKey",
            Self::GetWithCount => "getWithCount",
            Self::Value => "value",
            Self::And => "and",
            Self::Or => "or",
            Self::Not => "not",
            Self::Equals => "equals",
            Self::NotEquals => "notEquals",
            Self::GreaterThan => "greaterThan",
            Self::GreaterThanOrEqualTo => "greaterThanOrEqualTo",
            Self::LessThan => "lessThan",
            Self::LessThanOrEqualTo => "lessThanOrEqualTo",
            Self::Contains => "contains",
            Self::StartsWith => "startsWith",
            Self::EndsWith => "endsWith",
            Self::In => "in",
            Self::Any => "any",
            Self::All => "all",
            Self::Literal => "literal",
            Self::FieldReference => "fieldReference",
        }
    }

    /// Whether this operator belongs to the outer query chain.
    #[must_use]
    pub fn is_query_operator(self) -> bool {
        matches!(
            self,
            Self::Select
                | Self::Top
                | Self::Skip
                | Self::OrderBy
                | Self::OrderByDescending
                | Self::Predicate
                | Self::Expand
                | Self::ExpandAll
                | Self::GetByKey
                | Self::GetWithCount
                | Self::Value
        )
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Client-side reshaping function recorded by a projecting `select`.
///
/// The function receives a proxy node; during path discovery the node records
/// every property read, and when results arrive it reads from the raw record.
#[derive(Clone)]
pub struct Projector(Arc<dyn Fn(&ProxyNode) -> serde_json::Value + Send + Sync>);

impl Projector {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&ProxyNode) -> serde_json::Value + Send + Sync + 'static,
    {
        Self(Arc::new(f))
    }

    #[must_use]
    pub fn apply(&self, node: &ProxyNode) -> serde_json::Value {
        (self.0)(node)
    }
}

impl fmt::Debug for Projector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Projector(..)")
    }
}

/// Operand of an [`Expression`].
#[derive(Clone, Debug)]
pub enum Operand {
    Literal(Literal),
    Field(FieldReference),
    Expression(Arc<Expression>),
    /// Bare value, rendered as an untyped literal.
    Value(Value),
    /// Value list, used by `in`.
    List(Vec<Operand>),
    /// Range variable of an `any`/`all` quantifier.
    LambdaVariable(String),
    Projector(Projector),
}

impl From<Literal> for Operand {
    fn from(literal: Literal) -> Self {
        Self::Literal(literal)
    }
}

impl From<FieldReference> for Operand {
    fn from(field: FieldReference) -> Self {
        Self::Field(field)
    }
}

impl From<Expression> for Operand {
    fn from(expression: Expression) -> Self {
        Self::Expression(Arc::new(expression))
    }
}

impl From<Arc<Expression>> for Operand {
    fn from(expression: Arc<Expression>) -> Self {
        Self::Expression(expression)
    }
}

impl From<Value> for Operand {
    fn from(value: Value) -> Self {
        Self::Value(value)
    }
}

impl Operand {
    fn validate_fields(&self) -> Result<()> {
        match self {
            Self::Field(field) => field.validate(),
            Self::Expression(expression) => expression.validate_fields(),
            Self::List(items) => items.iter().try_for_each(Self::validate_fields),
            _ => Ok(()),
        }
    }
}

/// A single node: operator tag, ordered operands and the preceding chain step.
#[derive(Clone, Debug)]
pub struct Expression {
    operator: Operator,
    operands: Vec<Operand>,
    previous: Option<Arc<Expression>>,
}

impl Expression {
    #[must_use]
    pub fn new(operator: Operator, operands: Vec<Operand>, previous: Option<Arc<Expression>>) -> Self {
        Self {
            operator,
            operands,
            previous,
        }
    }

    /// `literal` node wrapping one constant.
    pub fn literal(value: impl IntoODataValue) -> Self {
        Self::new(Operator::Literal, vec![Operand::Literal(Literal::new(value))], None)
    }

    pub fn typed_literal(value: impl IntoODataValue, literal_type: LiteralType) -> Self {
        Self::new(
            Operator::Literal,
            vec![Operand::Literal(Literal::typed(value, literal_type))],
            None,
        )
    }

    /// `fieldReference` node, usable as the right-hand side of a comparison.
    pub fn field(reference: impl Into<FieldReference>) -> Self {
        Self::new(
            Operator::FieldReference,
            vec![Operand::Field(reference.into())],
            None,
        )
    }

    #[must_use]
    pub fn operator(&self) -> Operator {
        self.operator
    }

    #[must_use]
    pub fn operands(&self) -> &[Operand] {
        &self.operands
    }

    #[must_use]
    pub fn previous(&self) -> Option<&Arc<Expression>> {
        self.previous.as_ref()
    }

    /// Checks every field reference among the operands, descending into nested nodes.
    ///
    /// # Errors
    /// Returns [`Error::InvalidFieldPath`] for the first reference with an empty segment.
    pub fn validate_fields(&self) -> Result<()> {
        self.operands.iter().try_for_each(Operand::validate_fields)
    }

    /// Walks from this node back to the root of the chain, newest first.
    pub fn chain(&self) -> impl Iterator<Item = &Expression> {
        std::iter::successors(Some(self), |e| e.previous.as_deref())
    }

    /// Projector of the most recent `select`, if that select was a projection.
    #[must_use]
    pub fn projector(&self) -> Option<&Projector> {
        let select = self.chain().find(|e| e.operator == Operator::Select)?;
        select.operands.iter().find_map(|operand| match operand {
            Operand::Projector(projector) => Some(projector),
            _ => None,
        })
    }
}
