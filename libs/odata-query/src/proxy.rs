//! Typed property access for building predicates and field lists.
//!
//! An entity proxy is a thin wrapper around a [`ProxyNode`] that hands out one
//! accessor per property. Accessors compose paths by chaining, and each
//! property handle exposes comparison methods that close over its path.
//!
//! ```rust,ignore
//! pub struct UserProxy(ProxyNode);
//!
//! impl EntityProxy for UserProxy {
//!     fn from_node(node: ProxyNode) -> Self { Self(node) }
//!     fn node(&self) -> &ProxyNode { &self.0 }
//! }
//!
//! impl UserProxy {
//!     pub fn first_name(&self) -> PropertyProxy<String> { self.0.property("firstName") }
//!     pub fn mother(&self) -> UserProxy { self.0.navigate("mother") }
//!     pub fn children(&self) -> CollectionProxy<UserProxy> { self.0.collection("children") }
//! }
//!
//! impl ODataEntity for User {
//!     type Proxy = UserProxy;
//! }
//! ```

use std::marker::PhantomData;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use crate::ast::{Expression, FieldReference, IntoODataValue, Operand, Operator};
use crate::predicate::{BooleanPredicateBuilder, IntoOperand};

/// Allocator of quantifier range variables (`p0`, `p1`, ...).
#[derive(Debug, Default)]
pub struct LambdaVariables {
    next: AtomicUsize,
}

impl LambdaVariables {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Next unused variable name.
    #[must_use]
    pub fn allocate(&self) -> String {
        let n = self.next.fetch_add(1, Ordering::Relaxed);
        format!("p{n}")
    }
}

#[derive(Clone, Debug)]
enum ProxyMode {
    Build,
    Track(Arc<Mutex<Vec<FieldReference>>>),
    Read(Arc<serde_json::Value>),
}

/// Position inside an entity shape: an optional lambda-variable root plus a path.
#[derive(Clone, Debug)]
pub struct ProxyNode {
    root: Option<String>,
    path: Vec<String>,
    lambdas: Arc<LambdaVariables>,
    mode: ProxyMode,
}

impl ProxyNode {
    /// Root of an entity for predicate building.
    #[must_use]
    pub fn root(lambdas: Arc<LambdaVariables>) -> Self {
        Self {
            root: None,
            path: Vec::new(),
            lambdas,
            mode: ProxyMode::Build,
        }
    }

    /// Root that records every path read through [`ProxyNode::value`].
    pub(crate) fn tracking() -> (Self, Arc<Mutex<Vec<FieldReference>>>) {
        let paths = Arc::new(Mutex::new(Vec::new()));
        let node = Self {
            root: None,
            path: Vec::new(),
            lambdas: Arc::new(LambdaVariables::new()),
            mode: ProxyMode::Track(paths.clone()),
        };
        (node, paths)
    }

    /// Root whose [`ProxyNode::value`] reads from a returned record.
    pub(crate) fn reading(record: Arc<serde_json::Value>) -> Self {
        Self {
            root: None,
            path: Vec::new(),
            lambdas: Arc::new(LambdaVariables::new()),
            mode: ProxyMode::Read(record),
        }
    }

    #[must_use]
    pub fn child(&self, name: &str) -> Self {
        let mut node = self.clone();
        node.path.push(name.to_owned());
        node
    }

    #[must_use]
    pub fn property<V>(&self, name: &str) -> PropertyProxy<V> {
        PropertyProxy::from_node(self.child(name))
    }

    #[must_use]
    pub fn navigate<P: EntityProxy>(&self, name: &str) -> P {
        P::from_node(self.child(name))
    }

    #[must_use]
    pub fn collection<P: EntityProxy>(&self, name: &str) -> CollectionProxy<P> {
        CollectionProxy::from_node(self.child(name))
    }

    /// Path relative to the entity root, excluding any lambda variable.
    #[must_use]
    pub fn path(&self) -> &[String] {
        &self.path
    }

    /// Range variable this node is rooted at, inside an `any`/`all` body.
    #[must_use]
    pub fn lambda_variable(&self) -> Option<&str> {
        self.root.as_deref()
    }

    #[must_use]
    pub fn field_reference(&self) -> FieldReference {
        let segments = self.root.iter().chain(self.path.iter()).cloned().collect();
        FieldReference::from_parts(segments)
    }

    /// Value of this property.
    ///
    /// Inside a projector this returns the property of the record being reshaped;
    /// during path discovery it records the path and returns `null`.
    #[must_use]
    pub fn value(&self) -> serde_json::Value {
        match &self.mode {
            ProxyMode::Build => serde_json::Value::Null,
            ProxyMode::Track(paths) => {
                if !self.path.is_empty() {
                    let field = self.field_reference();
                    let mut paths = paths.lock().unwrap_or_else(PoisonError::into_inner);
                    if !paths.contains(&field) {
                        paths.push(field);
                    }
                }
                serde_json::Value::Null
            }
            ProxyMode::Read(record) => self
                .path
                .iter()
                .try_fold(record.as_ref(), |current, segment| current.get(segment))
                .cloned()
                .unwrap_or(serde_json::Value::Null),
        }
    }

    fn lambda_scope(&self, variable: String) -> Self {
        Self {
            root: Some(variable),
            path: Vec::new(),
            lambdas: self.lambdas.clone(),
            mode: self.mode.clone(),
        }
    }

    fn compare(&self, operator: Operator, value: impl IntoOperand) -> BooleanPredicateBuilder {
        BooleanPredicateBuilder::compare(operator, self.field_reference(), value.into_operand())
    }

    fn quantify<P, F>(&self, operator: Operator, predicate: F) -> BooleanPredicateBuilder
    where
        P: EntityProxy,
        F: FnOnce(P) -> BooleanPredicateBuilder,
    {
        let variable = self.lambdas.allocate();
        let inner = predicate(P::from_node(self.lambda_scope(variable.clone())));
        BooleanPredicateBuilder::from_expression(Expression::new(
            operator,
            vec![
                Operand::Field(self.field_reference()),
                Operand::LambdaVariable(variable),
                Operand::Expression(inner.into_expression()),
            ],
            None,
        ))
    }
}

/// Typed view over an entity, built from a [`ProxyNode`].
pub trait EntityProxy: Sized {
    fn from_node(node: ProxyNode) -> Self;

    fn node(&self) -> &ProxyNode;

    /// Path of this entity, e.g. for expanding a navigation property.
    fn field_reference(&self) -> FieldReference {
        self.node().field_reference()
    }
}

/// Record type that can be queried with a typed proxy.
pub trait ODataEntity {
    type Proxy: EntityProxy;
}

impl ODataEntity for serde_json::Value {
    type Proxy = DynamicProxy;
}

/// Handle to a single property of type `V`.
pub struct PropertyProxy<V> {
    node: ProxyNode,
    _value: PhantomData<fn() -> V>,
}

impl<V> Clone for PropertyProxy<V> {
    fn clone(&self) -> Self {
        Self {
            node: self.node.clone(),
            _value: PhantomData,
        }
    }
}

impl<V> std::fmt::Debug for PropertyProxy<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PropertyProxy")
            .field("node", &self.node)
            .finish()
    }
}

impl<V> EntityProxy for PropertyProxy<V> {
    fn from_node(node: ProxyNode) -> Self {
        Self {
            node,
            _value: PhantomData,
        }
    }

    fn node(&self) -> &ProxyNode {
        &self.node
    }
}

impl<V> PropertyProxy<V> {
    #[must_use]
    pub fn field_reference(&self) -> FieldReference {
        self.node.field_reference()
    }

    /// See [`ProxyNode::value`].
    #[must_use]
    pub fn value(&self) -> serde_json::Value {
        self.node.value()
    }

    #[must_use]
    pub fn equals(&self, value: impl IntoOperand) -> BooleanPredicateBuilder {
        self.node.compare(Operator::Equals, value)
    }

    #[must_use]
    pub fn not_equals(&self, value: impl IntoOperand) -> BooleanPredicateBuilder {
        self.node.compare(Operator::NotEquals, value)
    }

    #[must_use]
    pub fn greater_than(&self, value: impl IntoOperand) -> BooleanPredicateBuilder {
        self.node.compare(Operator::GreaterThan, value)
    }

    #[must_use]
    pub fn greater_than_or_equal_to(&self, value: impl IntoOperand) -> BooleanPredicateBuilder {
        self.node.compare(Operator::GreaterThanOrEqualTo, value)
    }

    #[must_use]
    pub fn less_than(&self, value: impl IntoOperand) -> BooleanPredicateBuilder {
        self.node.compare(Operator::LessThan, value)
    }

    #[must_use]
    pub fn less_than_or_equal_to(&self, value: impl IntoOperand) -> BooleanPredicateBuilder {
        self.node.compare(Operator::LessThanOrEqualTo, value)
    }

    #[must_use]
    pub fn is_in<I, T>(&self, values: I) -> BooleanPredicateBuilder
    where
        I: IntoIterator<Item = T>,
        T: IntoODataValue,
    {
        BooleanPredicateBuilder::is_in(self.field_reference(), values)
    }
}

/// String functions, only available on string properties.
impl PropertyProxy<String> {
    #[must_use]
    pub fn contains(&self, value: impl IntoOperand) -> BooleanPredicateBuilder {
        self.node.compare(Operator::Contains, value)
    }

    #[must_use]
    pub fn starts_with(&self, value: impl IntoOperand) -> BooleanPredicateBuilder {
        self.node.compare(Operator::StartsWith, value)
    }

    #[must_use]
    pub fn ends_with(&self, value: impl IntoOperand) -> BooleanPredicateBuilder {
        self.node.compare(Operator::EndsWith, value)
    }
}

/// Comparing one property against another renders a field-to-field condition.
impl<V> IntoOperand for PropertyProxy<V> {
    fn into_operand(self) -> Operand {
        Operand::Field(self.field_reference())
    }
}

impl<V> IntoOperand for &PropertyProxy<V> {
    fn into_operand(self) -> Operand {
        Operand::Field(self.field_reference())
    }
}

/// Handle to a collection-valued property whose elements are viewed through `P`.
pub struct CollectionProxy<P> {
    node: ProxyNode,
    _element: PhantomData<fn() -> P>,
}

impl<P> Clone for CollectionProxy<P> {
    fn clone(&self) -> Self {
        Self {
            node: self.node.clone(),
            _element: PhantomData,
        }
    }
}

impl<P> std::fmt::Debug for CollectionProxy<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CollectionProxy")
            .field("node", &self.node)
            .finish()
    }
}

impl<P> EntityProxy for CollectionProxy<P> {
    fn from_node(node: ProxyNode) -> Self {
        Self {
            node,
            _element: PhantomData,
        }
    }

    fn node(&self) -> &ProxyNode {
        &self.node
    }
}

impl<P: EntityProxy> CollectionProxy<P> {
    #[must_use]
    pub fn field_reference(&self) -> FieldReference {
        self.node.field_reference()
    }

    /// See [`ProxyNode::value`].
    #[must_use]
    pub fn value(&self) -> serde_json::Value {
        self.node.value()
    }

    /// `field/any(pN: ...)` with a freshly allocated range variable.
    #[must_use]
    pub fn any<F>(&self, predicate: F) -> BooleanPredicateBuilder
    where
        F: FnOnce(P) -> BooleanPredicateBuilder,
    {
        self.node.quantify(Operator::Any, predicate)
    }

    /// `field/all(pN: ...)` with a freshly allocated range variable.
    #[must_use]
    pub fn all<F>(&self, predicate: F) -> BooleanPredicateBuilder
    where
        F: FnOnce(P) -> BooleanPredicateBuilder,
    {
        self.node.quantify(Operator::All, predicate)
    }
}

/// Untyped proxy addressing properties by name.
#[derive(Clone, Debug)]
pub struct DynamicProxy {
    node: ProxyNode,
}

impl EntityProxy for DynamicProxy {
    fn from_node(node: ProxyNode) -> Self {
        Self { node }
    }

    fn node(&self) -> &ProxyNode {
        &self.node
    }
}

impl DynamicProxy {
    /// Nested property.
    #[must_use]
    pub fn prop(&self, name: &str) -> Self {
        Self {
            node: self.node.child(name),
        }
    }

    /// Property reached through several segments.
    #[must_use]
    pub fn path<'a, I>(&self, segments: I) -> Self
    where
        I: IntoIterator<Item = &'a str>,
    {
        let node = segments
            .into_iter()
            .fold(self.node.clone(), |node, segment| node.child(segment));
        Self { node }
    }

    #[must_use]
    pub fn field_reference(&self) -> FieldReference {
        self.node.field_reference()
    }

    /// See [`ProxyNode::value`].
    #[must_use]
    pub fn value(&self) -> serde_json::Value {
        self.node.value()
    }

    #[must_use]
    pub fn equals(&self, value: impl IntoOperand) -> BooleanPredicateBuilder {
        self.node.compare(Operator::Equals, value)
    }

    #[must_use]
    pub fn not_equals(&self, value: impl IntoOperand) -> BooleanPredicateBuilder {
        self.node.compare(Operator::NotEquals, value)
    }

    #[must_use]
    pub fn greater_than(&self, value: impl IntoOperand) -> BooleanPredicateBuilder {
        self.node.compare(Operator::GreaterThan, value)
    }

    #[must_use]
    pub fn greater_than_or_equal_to(&self, value: impl IntoOperand) -> BooleanPredicateBuilder {
        self.node.compare(Operator::GreaterThanOrEqualTo, value)
    }

    #[must_use]
    pub fn less_than(&self, value: impl IntoOperand) -> BooleanPredicateBuilder {
        self.node.compare(Operator::LessThan, value)
    }

    #[must_use]
    pub fn less_than_or_equal_to(&self, value: impl IntoOperand) -> BooleanPredicateBuilder {
        self.node.compare(Operator::LessThanOrEqualTo, value)
    }

    #[must_use]
    pub fn contains(&self, value: impl IntoOperand) -> BooleanPredicateBuilder {
        self.node.compare(Operator::Contains, value)
    }

    #[must_use]
    pub fn starts_with(&self, value: impl IntoOperand) -> BooleanPredicateBuilder {
        self.node.compare(Operator::StartsWith, value)
    }

    #[must_use]
    pub fn ends_with(&self, value: impl IntoOperand) -> BooleanPredicateBuilder {
        self.node.compare(Operator::EndsWith, value)
    }

    #[must_use]
    pub fn is_in<I, T>(&self, values: I) -> BooleanPredicateBuilder
    where
        I: IntoIterator<Item = T>,
        T: IntoODataValue,
    {
        BooleanPredicateBuilder::is_in(self.field_reference(), values)
    }

    #[must_use]
    pub fn any<F>(&self, predicate: F) -> BooleanPredicateBuilder
    where
        F: FnOnce(DynamicProxy) -> BooleanPredicateBuilder,
    {
        self.node.quantify(Operator::Any, predicate)
    }

    #[must_use]
    pub fn all<F>(&self, predicate: F) -> BooleanPredicateBuilder
    where
        F: FnOnce(DynamicProxy) -> BooleanPredicateBuilder,
    {
        self.node.quantify(Operator::All, predicate)
    }
}

impl IntoOperand for DynamicProxy {
    fn into_operand(self) -> Operand {
        Operand::Field(self.field_reference())
    }
}

/// Something naming a single field.
pub trait AsFieldReference {
    fn as_field_reference(&self) -> FieldReference;
}

impl AsFieldReference for FieldReference {
    fn as_field_reference(&self) -> FieldReference {
        self.clone()
    }
}

impl AsFieldReference for str {
    fn as_field_reference(&self) -> FieldReference {
        FieldReference::from(self)
    }
}

impl AsFieldReference for String {
    fn as_field_reference(&self) -> FieldReference {
        FieldReference::from(self.as_str())
    }
}

impl AsFieldReference for ProxyNode {
    fn as_field_reference(&self) -> FieldReference {
        self.field_reference()
    }
}

impl<V> AsFieldReference for PropertyProxy<V> {
    fn as_field_reference(&self) -> FieldReference {
        self.field_reference()
    }
}

impl<P> AsFieldReference for CollectionProxy<P> {
    fn as_field_reference(&self) -> FieldReference {
        self.node.field_reference()
    }
}

impl AsFieldReference for DynamicProxy {
    fn as_field_reference(&self) -> FieldReference {
        self.field_reference()
    }
}

impl<T: AsFieldReference + ?Sized> AsFieldReference for &T {
    fn as_field_reference(&self) -> FieldReference {
        (**self).as_field_reference()
    }
}

/// Ordered list of fields for `select`, `orderBy` and `expand`.
pub trait IntoFieldList {
    fn into_field_list(self) -> Vec<FieldReference>;
}

macro_rules! impl_single_field {
    ($($ty:ty => [$($g:ident),*]),* $(,)?) => {
        $(
            impl<$($g),*> IntoFieldList for $ty {
                fn into_field_list(self) -> Vec<FieldReference> {
                    vec![self.as_field_reference()]
                }
            }
        )*
    };
}

impl_single_field!(
    FieldReference => [],
    &str => [],
    String => [],
    ProxyNode => [],
    DynamicProxy => [],
    PropertyProxy<V> => [V],
    CollectionProxy<P> => [P],
);

impl<T: AsFieldReference> IntoFieldList for Vec<T> {
    fn into_field_list(self) -> Vec<FieldReference> {
        self.iter().map(AsFieldReference::as_field_reference).collect()
    }
}

impl<T: AsFieldReference, const N: usize> IntoFieldList for [T; N] {
    fn into_field_list(self) -> Vec<FieldReference> {
        self.iter().map(AsFieldReference::as_field_reference).collect()
    }
}

macro_rules! impl_tuple_fields {
    ($(($($name:ident),+)),* $(,)?) => {
        $(
            impl<$($name: AsFieldReference),+> IntoFieldList for ($($name,)+) {
                #[allow(non_snake_case)]
                fn into_field_list(self) -> Vec<FieldReference> {
                    let ($($name,)+) = self;
                    vec![$($name.as_field_reference()),+]
                }
            }
        )*
    };
}

impl_tuple_fields!((A, B), (A, B, C), (A, B, C, D), (A, B, C, D, E));
