use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat};

use crate::ast::{Literal, LiteralType, Value};
use crate::errors::{Error, Result};

/// Render a literal as `OData` v4 text, honouring its semantic type tag.
///
/// # Errors
/// Returns [`Error::UnsupportedValue`] for non-finite floats and for date tags
/// on values that are not dates.
pub fn render_literal(literal: &Literal) -> Result<String> {
    match (literal.literal_type(), literal.value()) {
        (_, Value::Null) => Ok("null".to_owned()),
        (LiteralType::Date, value) => render_date(value),
        (LiteralType::Guid, Value::String(raw)) => Ok(raw.clone()),
        (_, value) => render_value(value),
    }
}

/// Render a value with the rules for its runtime kind.
///
/// # Errors
/// Returns [`Error::UnsupportedValue`] for non-finite floats.
pub fn render_value(value: &Value) -> Result<String> {
    Ok(match value {
        Value::Null => "null".to_owned(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::Float(f) if f.is_finite() => f.to_string(),
        Value::Float(f) => {
            return Err(Error::UnsupportedValue(format!("non-finite number {f}")));
        }
        Value::String(s) => quote(s),
        Value::Uuid(u) => u.hyphenated().to_string(),
        Value::DateTime(dt) => dt.to_rfc3339_opts(SecondsFormat::Millis, true),
        Value::Date(d) => d.format("%Y-%m-%d").to_string(),
        Value::Time(t) => t.format("%H:%M:%S%.f").to_string(),
    })
}

fn quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', "''"))
}

fn render_date(value: &Value) -> Result<String> {
    let date = match value {
        Value::Date(d) => *d,
        Value::DateTime(dt) => dt.date_naive(),
        Value::String(s) => parse_date(s)
            .ok_or_else(|| Error::UnsupportedValue(format!("'{s}' is not a date")))?,
        other => {
            return Err(Error::UnsupportedValue(format!(
                "{other:?} cannot be rendered as a date"
            )));
        }
    };
    Ok(date.format("%Y-%m-%d").to_string())
}

/// Accepts RFC 3339 timestamps (converted to UTC), bare dates and naive timestamps.
fn parse_date(s: &str) -> Option<NaiveDate> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.to_utc().date_naive());
    }
    if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return Some(date);
    }
    NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|dt| dt.date())
}
