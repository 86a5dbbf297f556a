//! The one place where evaluated values are converted to typed values and
//! compared, so every function reports type mismatches the same way.

use std::cmp::Ordering;
use std::fmt;

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, TimeZone, Utc};

use crate::context::JsonQlOptions;
use crate::errors::{JsonQlError, Position, Result};
use crate::evaluated::Evaluated;
use crate::parsed_value::{format_number, parse_number, ParsedValue};

/// Scalar value that operators can work with.
#[derive(Debug, Clone, PartialEq)]
pub enum Comparable {
    Boolean(bool),
    Double(f64),
    String(String),
    DateTime(DateTime<FixedOffset>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpectedType {
    Boolean,
    Number,
    String,
    DateTime,
}

impl fmt::Display for ExpectedType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ExpectedType::Boolean => "a boolean",
            ExpectedType::Number => "a number",
            ExpectedType::String => "a string",
            ExpectedType::DateTime => "a date-time",
        })
    }
}

fn mismatch(expected: ExpectedType, value: &Evaluated, position: Position) -> JsonQlError {
    JsonQlError::evaluation(format!("expected {expected} but the value is {}", value.describe()), position)
}

/// Scalar view of an evaluated value; `None` for no-value, objects,
/// arrays and collections.
pub fn to_comparable(value: &Evaluated) -> Option<Comparable> {
    match value {
        Evaluated::Boolean(b) => Some(Comparable::Boolean(*b)),
        Evaluated::Double(d) => Some(Comparable::Double(*d)),
        Evaluated::String(s) => Some(Comparable::String(s.clone())),
        Evaluated::DateTime(dt) => Some(Comparable::DateTime(*dt)),
        Evaluated::Json(parsed) => match parsed.as_ref() {
            ParsedValue::Simple(simple) if simple.is_string => Some(Comparable::String(simple.value.clone())),
            ParsedValue::Simple(simple) => {
                if let Some(b) = simple.as_bool() {
                    Some(Comparable::Boolean(b))
                } else {
                    simple.as_f64().map(Comparable::Double)
                }
            }
            _ => None,
        },
        Evaluated::Undefined | Evaluated::Null | Evaluated::Collection(_) => None,
    }
}

pub fn expect_boolean(value: &Evaluated, position: Position) -> Result<bool> {
    match to_comparable(value) {
        Some(Comparable::Boolean(b)) => Ok(b),
        _ => Err(mismatch(ExpectedType::Boolean, value, position)),
    }
}

/// Numbers, and strings holding a number.
pub fn expect_double(value: &Evaluated, position: Position) -> Result<f64> {
    match to_comparable(value) {
        Some(Comparable::Double(d)) => Ok(d),
        Some(Comparable::String(s)) => parse_number(s.trim()).ok_or_else(|| mismatch(ExpectedType::Number, value, position)),
        _ => Err(mismatch(ExpectedType::Number, value, position)),
    }
}

/// Any scalar, rendered as text.
pub fn expect_string(value: &Evaluated, position: Position) -> Result<String> {
    match to_comparable(value) {
        Some(comparable) => Ok(comparable_to_text(&comparable)),
        None => Err(mismatch(ExpectedType::String, value, position)),
    }
}

pub fn expect_date_time(value: &Evaluated, position: Position, options: &JsonQlOptions) -> Result<DateTime<FixedOffset>> {
    match to_comparable(value) {
        Some(Comparable::DateTime(dt)) => Ok(dt),
        Some(Comparable::String(s)) => {
            parse_date_time(&s, options).ok_or_else(|| mismatch(ExpectedType::DateTime, value, position))
        }
        _ => Err(mismatch(ExpectedType::DateTime, value, position)),
    }
}

/// Converts to the requested type; `None` when the value does not convert.
pub fn try_convert(value: &Evaluated, expected: ExpectedType, options: &JsonQlOptions) -> Option<Evaluated> {
    let position = Position::START;
    match expected {
        ExpectedType::Boolean => expect_boolean(value, position).ok().map(Evaluated::Boolean),
        ExpectedType::Number => expect_double(value, position).ok().map(Evaluated::Double),
        ExpectedType::String => expect_string(value, position).ok().map(Evaluated::String),
        ExpectedType::DateTime => expect_date_time(value, position, options).ok().map(Evaluated::DateTime),
    }
}

/// RFC 3339 first, then the configured formats (naive values are UTC).
pub fn parse_date_time(text: &str, options: &JsonQlOptions) -> Option<DateTime<FixedOffset>> {
    let text = text.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt);
    }
    let utc = |naive: NaiveDateTime| Utc.from_utc_datetime(&naive).fixed_offset();
    for format in &options.date_time_formats {
        if let Ok(naive) = NaiveDateTime::parse_from_str(text, format) {
            return Some(utc(naive));
        }
        if let Ok(date) = NaiveDate::parse_from_str(text, format) {
            return date.and_hms_opt(0, 0, 0).map(utc);
        }
    }
    None
}

pub fn comparable_to_text(value: &Comparable) -> String {
    match value {
        Comparable::Boolean(b) => b.to_string(),
        Comparable::Double(d) => format_number(*d),
        Comparable::String(s) => s.clone(),
        Comparable::DateTime(dt) => dt.to_rfc3339(),
    }
}

/// Text used by interpolation and `ToString`: scalars as text, `null` for
/// nulls, compact JSON for objects, arrays and collections.
pub fn to_display_text(value: &Evaluated, position: Position) -> Result<String> {
    if let Some(comparable) = to_comparable(value) {
        return Ok(comparable_to_text(&comparable));
    }
    match value {
        Evaluated::Undefined => Err(JsonQlError::evaluation("value is undefined", position)),
        Evaluated::Null => Ok("null".to_string()),
        Evaluated::Json(parsed) => Ok(parsed.to_json().to_string()),
        Evaluated::Collection(items) => {
            Ok(serde_json::Value::Array(items.iter().map(|i| i.to_json()).collect()).to_string())
        }
        _ => Err(JsonQlError::Internal(format!("{} has no text form", value.describe()))),
    }
}

fn order(a: &Comparable, b: &Comparable, options: &JsonQlOptions) -> Option<Ordering> {
    match (a, b) {
        (Comparable::Double(da), Comparable::Double(db)) => da.partial_cmp(db),
        (Comparable::String(sa), Comparable::String(sb)) => Some(sa.cmp(sb)),
        (Comparable::Boolean(ba), Comparable::Boolean(bb)) => Some(ba.cmp(bb)),
        (Comparable::DateTime(da), Comparable::DateTime(db)) => Some(da.cmp(db)),
        (Comparable::Double(d), Comparable::String(s)) => parse_number(s.trim()).and_then(|n| d.partial_cmp(&n)),
        (Comparable::String(s), Comparable::Double(d)) => parse_number(s.trim()).and_then(|n| n.partial_cmp(d)),
        (Comparable::DateTime(dt), Comparable::String(s)) => parse_date_time(s, options).map(|p| dt.cmp(&p)),
        (Comparable::String(s), Comparable::DateTime(dt)) => parse_date_time(s, options).map(|p| p.cmp(dt)),
        _ => None,
    }
}

/// `==` semantics. Null and undefined equal each other and nothing else;
/// type mismatches are unequal rather than errors.
pub fn values_equal(a: &Evaluated, b: &Evaluated, options: &JsonQlOptions) -> bool {
    match (a.is_no_value(), b.is_no_value()) {
        (true, true) => return true,
        (true, false) | (false, true) => return false,
        _ => {}
    }
    match (to_comparable(a), to_comparable(b)) {
        (Some(ca), Some(cb)) => order(&ca, &cb, options) == Some(Ordering::Equal),
        (None, None) => structural_json(a) == structural_json(b),
        _ => false,
    }
}

fn structural_json(value: &Evaluated) -> Option<serde_json::Value> {
    match value {
        Evaluated::Json(parsed) => Some(parsed.to_json()),
        Evaluated::Collection(items) => Some(serde_json::Value::Array(items.iter().map(|i| i.to_json()).collect())),
        _ => None,
    }
}

/// Ordering for `<`, `<=`, `>` and `>=`.
pub fn compare_values(a: &Evaluated, b: &Evaluated, position: Position, options: &JsonQlOptions) -> Result<Ordering> {
    let ca = to_comparable(a).ok_or_else(|| not_comparable(a, position))?;
    let cb = to_comparable(b).ok_or_else(|| not_comparable(b, position))?;
    order(&ca, &cb, options).ok_or_else(|| {
        JsonQlError::evaluation(format!("cannot compare {} with {}", a.describe(), b.describe()), position)
    })
}

fn not_comparable(value: &Evaluated, position: Position) -> JsonQlError {
    JsonQlError::evaluation(format!("cannot compare {}", value.describe()), position)
}
