//! Boolean predicate builders.
//!
//! [`PredicateBuilder`] addresses fields by name; the typed proxies in
//! [`crate::proxy`] produce the same [`BooleanPredicateBuilder`] values.

use std::marker::PhantomData;
use std::sync::Arc;

use crate::ast::{Expression, FieldReference, IntoODataValue, Literal, Operand, Operator};
use crate::errors::{Error, Result};

/// Conversion into the right-hand side of a comparison.
pub trait IntoOperand {
    fn into_operand(self) -> Operand;
}

impl<V: IntoODataValue> IntoOperand for V {
    fn into_operand(self) -> Operand {
        Operand::Literal(Literal::new(self))
    }
}

impl IntoOperand for Literal {
    fn into_operand(self) -> Operand {
        Operand::Literal(self)
    }
}

impl IntoOperand for FieldReference {
    fn into_operand(self) -> Operand {
        Operand::Field(self)
    }
}

impl IntoOperand for Expression {
    fn into_operand(self) -> Operand {
        Operand::Expression(Arc::new(self))
    }
}

impl IntoOperand for Operand {
    fn into_operand(self) -> Operand {
        self
    }
}

/// A boolean condition; always holds a predicate expression.
#[derive(Clone, Debug)]
pub struct BooleanPredicateBuilder {
    expression: Arc<Expression>,
}

impl BooleanPredicateBuilder {
    pub(crate) fn from_expression(expression: Expression) -> Self {
        Self {
            expression: Arc::new(expression),
        }
    }

    /// Wrap an existing predicate expression.
    ///
    /// # Errors
    /// Returns [`Error::InvalidPredicateComposition`] if the expression is a
    /// query-chain node or links to a previous chain step.
    pub fn try_from_expression(expression: Arc<Expression>) -> Result<Self> {
        if expression.previous().is_some() {
            return Err(Error::InvalidPredicateComposition(
                "filter expressions cannot have a value for 'previous', only operands".to_owned(),
            ));
        }
        if expression.operator().is_query_operator() {
            return Err(Error::InvalidPredicateComposition(format!(
                "'{}' is a query operator, not a predicate",
                expression.operator()
            )));
        }
        Ok(Self { expression })
    }

    /// Binary comparison of a field against an operand.
    pub(crate) fn compare(operator: Operator, field: FieldReference, right: Operand) -> Self {
        Self::from_expression(Expression::new(operator, vec![Operand::Field(field), right], None))
    }

    pub(crate) fn is_in<I, V>(field: FieldReference, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: IntoODataValue,
    {
        let list = values
            .into_iter()
            .map(|v| Operand::Literal(Literal::new(v)))
            .collect();
        Self::compare(Operator::In, field, Operand::List(list))
    }

    #[must_use]
    pub fn expression(&self) -> &Arc<Expression> {
        &self.expression
    }

    #[must_use]
    pub fn into_expression(self) -> Arc<Expression> {
        self.expression
    }

    fn combine(self, operator: Operator, other: Self) -> Self {
        Self::from_expression(Expression::new(
            operator,
            vec![
                Operand::Expression(self.expression),
                Operand::Expression(other.expression),
            ],
            None,
        ))
    }

    /// `self and other`
    #[must_use]
    pub fn and(self, other: BooleanPredicateBuilder) -> Self {
        self.combine(Operator::And, other)
    }

    /// `self or other`
    #[must_use]
    pub fn or(self, other: BooleanPredicateBuilder) -> Self {
        self.combine(Operator::Or, other)
    }

    /// `not self`
    #[must_use]
    #[allow(clippy::should_implement_trait)]
    pub fn not(self) -> Self {
        Self::from_expression(Expression::new(
            Operator::Not,
            vec![Operand::Expression(self.expression)],
            None,
        ))
    }

    /// Fold the predicates left to right with `and`.
    ///
    /// # Errors
    /// Returns [`Error::InvalidPredicateComposition`] if no predicate is given.
    pub fn all_of<I>(predicates: I) -> Result<Self>
    where
        I: IntoIterator<Item = BooleanPredicateBuilder>,
    {
        Self::fold(predicates, Operator::And)
    }

    /// Fold the predicates left to right with `or`.
    ///
    /// # Errors
    /// Returns [`Error::InvalidPredicateComposition`] if no predicate is given.
    pub fn any_of<I>(predicates: I) -> Result<Self>
    where
        I: IntoIterator<Item = BooleanPredicateBuilder>,
    {
        Self::fold(predicates, Operator::Or)
    }

    fn fold<I>(predicates: I, operator: Operator) -> Result<Self>
    where
        I: IntoIterator<Item = BooleanPredicateBuilder>,
    {
        predicates
            .into_iter()
            .reduce(|acc, next| acc.combine(operator, next))
            .ok_or_else(|| {
                Error::InvalidPredicateComposition(
                    "At least one predicate must be provided".to_owned(),
                )
            })
    }
}

impl std::ops::Not for BooleanPredicateBuilder {
    type Output = Self;

    fn not(self) -> Self::Output {
        BooleanPredicateBuilder::not(self)
    }
}

/// Anything a filter callback may return.
pub trait IntoPredicate {
    /// # Errors
    /// Propagates the construction error carried by the value.
    fn into_predicate(self) -> Result<BooleanPredicateBuilder>;
}

impl IntoPredicate for BooleanPredicateBuilder {
    fn into_predicate(self) -> Result<BooleanPredicateBuilder> {
        Ok(self)
    }
}

impl IntoPredicate for Result<BooleanPredicateBuilder> {
    fn into_predicate(self) -> Result<BooleanPredicateBuilder> {
        self
    }
}

/// Name-keyed predicate builder for entities of type `T`.
///
/// # Example
///
/// ```rust,ignore
/// let filter = |p: PredicateBuilder<User>| {
///     p.equals("firstName", "john")
///         .and(p.greater_than_or_equal_to("age", 30).or(p.not_equals("lastName", "Jones")))
/// };
/// ```
pub struct PredicateBuilder<T> {
    _entity: PhantomData<fn() -> T>,
}

impl<T> Clone for PredicateBuilder<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for PredicateBuilder<T> {}

impl<T> Default for PredicateBuilder<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> std::fmt::Debug for PredicateBuilder<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PredicateBuilder").finish()
    }
}

impl<T> PredicateBuilder<T> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            _entity: PhantomData,
        }
    }

    /// Field reference usable as a comparison operand, e.g. `firstName eq lastName`.
    #[must_use]
    pub fn field_reference(self, field: &str) -> Expression {
        Expression::field(field)
    }

    #[must_use]
    pub fn equals(self, field: &str, value: impl IntoOperand) -> BooleanPredicateBuilder {
        BooleanPredicateBuilder::compare(Operator::Equals, field.into(), value.into_operand())
    }

    #[must_use]
    pub fn not_equals(self, field: &str, value: impl IntoOperand) -> BooleanPredicateBuilder {
        BooleanPredicateBuilder::compare(Operator::NotEquals, field.into(), value.into_operand())
    }

    #[must_use]
    pub fn greater_than(self, field: &str, value: impl IntoOperand) -> BooleanPredicateBuilder {
        BooleanPredicateBuilder::compare(Operator::GreaterThan, field.into(), value.into_operand())
    }

    #[must_use]
    pub fn greater_than_or_equal_to(
        self,
        field: &str,
        value: impl IntoOperand,
    ) -> BooleanPredicateBuilder {
        BooleanPredicateBuilder::compare(
            Operator::GreaterThanOrEqualTo,
            field.into(),
            value.into_operand(),
        )
    }

    #[must_use]
    pub fn less_than(self, field: &str, value: impl IntoOperand) -> BooleanPredicateBuilder {
        BooleanPredicateBuilder::compare(Operator::LessThan, field.into(), value.into_operand())
    }

    #[must_use]
    pub fn less_than_or_equal_to(
        self,
        field: &str,
        value: impl IntoOperand,
    ) -> BooleanPredicateBuilder {
        BooleanPredicateBuilder::compare(
            Operator::LessThanOrEqualTo,
            field.into(),
            value.into_operand(),
        )
    }

    /// `contains(field,value)`
    #[must_use]
    pub fn contains(self, field: &str, value: impl IntoOperand) -> BooleanPredicateBuilder {
        BooleanPredicateBuilder::compare(Operator::Contains, field.into(), value.into_operand())
    }

    /// `startswith(field,value)`
    #[must_use]
    pub fn starts_with(self, field: &str, value: impl IntoOperand) -> BooleanPredicateBuilder {
        BooleanPredicateBuilder::compare(Operator::StartsWith, field.into(), value.into_operand())
    }

    /// `endswith(field,value)`
    #[must_use]
    pub fn ends_with(self, field: &str, value: impl IntoOperand) -> BooleanPredicateBuilder {
        BooleanPredicateBuilder::compare(Operator::EndsWith, field.into(), value.into_operand())
    }

    /// `field in (v1,v2,...)`
    #[must_use]
    pub fn is_in<I, V>(self, field: &str, values: I) -> BooleanPredicateBuilder
    where
        I: IntoIterator<Item = V>,
        V: IntoODataValue,
    {
        BooleanPredicateBuilder::is_in(field.into(), values)
    }

    #[must_use]
    pub fn not(self, predicate: BooleanPredicateBuilder) -> BooleanPredicateBuilder {
        predicate.not()
    }
}
