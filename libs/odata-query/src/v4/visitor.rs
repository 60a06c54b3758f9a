//! Translation of an expression chain into [`ODataV4QuerySegments`].

use bigdecimal::ToPrimitive;

use crate::ast::{Expression, FieldReference, Operand, Operator, Value};
use crate::errors::{Error, Result};
use crate::v4::literal::{render_literal, render_value};
use crate::v4::segments::{ODataV4QuerySegments, OrderKey, SortDir};

/// Reduced predicate: a token list plus the combinator joining it, if any.
///
/// `a eq 1 and b eq 2` is three tokens under `and`; any comparison or function
/// call is a single token.
#[derive(Debug)]
struct Fragment {
    tokens: Vec<String>,
    combinator: Option<Operator>,
}

impl Fragment {
    fn atom(token: String) -> Self {
        Self {
            tokens: vec![token],
            combinator: None,
        }
    }

    fn joined(&self) -> String {
        self.tokens.join(" ")
    }

    /// Text for embedding as an operand, grouped when compound.
    fn reduce(&self) -> String {
        match self.tokens.as_slice() {
            [single] => single.clone(),
            tokens => format!("({})", tokens.join(" ")),
        }
    }
}

/// Walks a query chain oldest to newest and fills the query segments.
#[derive(Debug, Default)]
pub struct ODataV4ExpressionVisitor {
    segments: ODataV4QuerySegments,
    expand_all: bool,
    filter_combinator: Option<Operator>,
}

impl ODataV4ExpressionVisitor {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// # Errors
    /// Returns a translation error for unsupported operators, malformed operands
    /// or unrenderable literals.
    pub fn visit(mut self, expression: Option<&Expression>) -> Result<ODataV4QuerySegments> {
        if let Some(head) = expression {
            let mut spine: Vec<&Expression> = head.chain().collect();
            spine.reverse();
            for node in spine {
                self.visit_node(node)?;
            }
        }
        Ok(self.segments)
    }

    fn visit_node(&mut self, node: &Expression) -> Result<()> {
        tracing::trace!(operator = %node.operator(), "visiting query node");
        match node.operator() {
            Operator::Select => self.select(node),
            Operator::Top => {
                self.segments.top = Some(count_operand(node)?);
                Ok(())
            }
            Operator::Skip => {
                self.segments.skip = Some(count_operand(node)?);
                Ok(())
            }
            Operator::OrderBy => self.order_by(node, SortDir::Asc),
            Operator::OrderByDescending => self.order_by(node, SortDir::Desc),
            Operator::Expand => self.expand(node),
            Operator::ExpandAll => {
                self.expand_all = true;
                self.segments.expand = Some(vec!["*".to_owned()]);
                Ok(())
            }
            Operator::GetWithCount => {
                self.segments.count = true;
                Ok(())
            }
            Operator::GetByKey => self.key(node),
            Operator::Value => {
                self.segments.value = true;
                Ok(())
            }
            Operator::Predicate => self.predicate(node),
            other => Err(Error::UnsupportedOperator(other)),
        }
    }

    fn select(&mut self, node: &Expression) -> Result<()> {
        let fields: Vec<String> = node
            .operands()
            .iter()
            .filter(|operand| !matches!(operand, Operand::Projector(_)))
            .map(|operand| field_operand(node.operator(), operand))
            .collect::<Result<_>>()?;

        self.segments.select = (!fields.is_empty()).then_some(fields);
        Ok(())
    }

    fn order_by(&mut self, node: &Expression, dir: SortDir) -> Result<()> {
        let keys = node
            .operands()
            .iter()
            .map(|operand| {
                field_operand(node.operator(), operand).map(|field| OrderKey { field, dir })
            })
            .collect::<Result<Vec<_>>>()?;

        self.segments.order_by.get_or_insert_with(Vec::new).extend(keys);
        Ok(())
    }

    fn expand(&mut self, node: &Expression) -> Result<()> {
        if self.expand_all {
            return Ok(());
        }
        let expand = self.segments.expand.get_or_insert_with(Vec::new);
        for operand in node.operands() {
            let field = field_operand(node.operator(), operand)?;
            if !expand.contains(&field) {
                expand.push(field);
            }
        }
        Ok(())
    }

    fn key(&mut self, node: &Expression) -> Result<()> {
        let [operand] = node.operands() else {
            return Err(Error::UnsupportedOperator(node.operator()));
        };
        let key = match operand {
            Operand::Literal(literal) => render_literal(literal)?,
            Operand::Value(value) => render_value(value)?,
            Operand::Expression(expression)
                if expression.operator() == Operator::Literal && expression.previous().is_none() =>
            {
                translate(expression)?.joined()
            }
            _ => {
                return Err(Error::InvalidExpression(
                    "an entity key must be a literal value".to_owned(),
                ));
            }
        };
        self.segments.key = Some(key);
        Ok(())
    }

    fn predicate(&mut self, node: &Expression) -> Result<()> {
        let [Operand::Expression(expression)] = node.operands() else {
            return Err(Error::InvalidExpression(
                "predicate expects a single predicate expression".to_owned(),
            ));
        };
        if expression.previous().is_some() {
            return Err(Error::InvalidPredicateComposition(
                "filter expressions cannot have a value for 'previous', only operands".to_owned(),
            ));
        }

        let fragment = translate(expression)?;
        let filter = match self.segments.filter.take() {
            None => {
                self.filter_combinator = fragment.combinator;
                fragment.joined()
            }
            Some(existing) => {
                let existing = if self.filter_combinator == Some(Operator::Or) {
                    format!("({existing})")
                } else {
                    existing
                };
                self.filter_combinator = Some(Operator::And);
                format!("{existing} and {}", fragment.reduce())
            }
        };
        self.segments.filter = Some(filter);
        Ok(())
    }
}

fn field_operand(operator: Operator, operand: &Operand) -> Result<String> {
    match operand {
        Operand::Field(field) => {
            field.validate()?;
            Ok(field.to_string())
        }
        other => Err(Error::InvalidExpression(format!(
            "'{operator}' expects field references, got {other:?}"
        ))),
    }
}

fn count_operand(node: &Expression) -> Result<u64> {
    let operator = node.operator();
    match node.operands() {
        [Operand::Value(Value::Number(n))] => n.to_u64().ok_or_else(|| Error::InvalidArgument {
            operator,
            reason: format!("{n} is not a non-negative integer"),
        }),
        _ => Err(Error::UnsupportedOperator(operator)),
    }
}

fn translate_operand(operand: &Operand) -> Result<Fragment> {
    match operand {
        Operand::Literal(literal) => Ok(Fragment::atom(render_literal(literal)?)),
        Operand::Field(field) => Ok(Fragment::atom(render_field(field)?)),
        Operand::Expression(expression) => {
            if expression.previous().is_some() {
                return Err(Error::InvalidPredicateComposition(format!(
                    "'{}' links to a query chain and cannot be used as an operand",
                    expression.operator()
                )));
            }
            translate(expression)
        }
        Operand::Value(value) => Ok(Fragment::atom(render_value(value)?)),
        Operand::List(items) => {
            let rendered = items
                .iter()
                .map(|item| translate_operand(item).map(|f| f.reduce()))
                .collect::<Result<Vec<_>>>()?;
            Ok(Fragment::atom(rendered.join(",")))
        }
        Operand::LambdaVariable(variable) => Ok(Fragment::atom(variable.clone())),
        Operand::Projector(_) => Err(Error::UnsupportedValue(
            "a projector cannot be rendered as a literal".to_owned(),
        )),
    }
}

fn render_field(field: &FieldReference) -> Result<String> {
    field.validate()?;
    Ok(field.to_string())
}

/// Reduce a predicate tree to tokens.
fn translate(expression: &Expression) -> Result<Fragment> {
    let operator = expression.operator();
    let operands = expression.operands();

    match operator {
        Operator::Literal | Operator::FieldReference => match operands {
            [operand] => translate_operand(operand),
            _ => Err(Error::UnsupportedOperator(operator)),
        },
        Operator::Not => match operands {
            [operand] => {
                let inner = translate_operand(operand)?;
                Ok(Fragment::atom(match inner.tokens.as_slice() {
                    [single] => format!("not {single}"),
                    _ => format!("not({})", inner.joined()),
                }))
            }
            _ => Err(Error::UnsupportedOperator(operator)),
        },
        Operator::And | Operator::Or => match operands {
            [left, right] => {
                let keyword = if operator == Operator::And { "and" } else { "or" };
                let mut tokens = Vec::new();
                embed(&mut tokens, translate_operand(left)?, operator);
                tokens.push(keyword.to_owned());
                embed(&mut tokens, translate_operand(right)?, operator);
                Ok(Fragment {
                    tokens,
                    combinator: Some(operator),
                })
            }
            _ => Err(Error::UnsupportedOperator(operator)),
        },
        Operator::Equals
        | Operator::NotEquals
        | Operator::GreaterThan
        | Operator::GreaterThanOrEqualTo
        | Operator::LessThan
        | Operator::LessThanOrEqualTo
        | Operator::Contains
        | Operator::StartsWith
        | Operator::EndsWith
        | Operator::In => match operands {
            [left, right] => {
                let left = translate_operand(left)?.reduce();
                let right = translate_operand(right)?.reduce();
                Ok(Fragment::atom(render_binary(operator, &left, &right)?))
            }
            _ => Err(Error::UnsupportedOperator(operator)),
        },
        Operator::Any | Operator::All => match operands {
            [field, Operand::LambdaVariable(variable), inner] => {
                let field = translate_operand(field)?.reduce();
                let inner = translate_operand(inner)?.joined();
                let quantifier = if operator == Operator::Any { "any" } else { "all" };
                Ok(Fragment::atom(format!("{field}/{quantifier}({variable}: {inner})")))
            }
            [_, _, _] => Err(Error::InvalidExpression(format!(
                "'{operator}' expects a lambda variable as its second operand"
            ))),
            _ => Err(Error::UnsupportedOperator(operator)),
        },
        query_operator => Err(Error::UnsupportedOperator(query_operator)),
    }
}

/// Append a combinator side; grouped only when it is compound under a different combinator.
fn embed(tokens: &mut Vec<String>, side: Fragment, parent: Operator) {
    if side.combinator == Some(parent) {
        tokens.extend(side.tokens);
    } else {
        tokens.push(side.reduce());
    }
}

fn render_binary(operator: Operator, left: &str, right: &str) -> Result<String> {
    let comparison = match operator {
        Operator::Equals => "eq",
        Operator::NotEquals => "ne",
        Operator::GreaterThan => "gt",
        Operator::GreaterThanOrEqualTo => "ge",
        Operator::LessThan => "lt",
        Operator::LessThanOrEqualTo => "le",
        Operator::Contains => return Ok(format!("contains({left},{right})")),
        Operator::StartsWith => return Ok(format!("startswith({left},{right})")),
        Operator::EndsWith => return Ok(format!("endswith({left},{right})")),
        Operator::In => return Ok(format!("{left} in ({right})")),
        other => return Err(Error::UnsupportedOperator(other)),
    };
    Ok(format!("{left} {comparison} {right}"))
}
