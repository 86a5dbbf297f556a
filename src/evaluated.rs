use std::sync::Arc;

use chrono::{DateTime, FixedOffset};

use crate::errors::{JsonQlError, Position, Result};
use crate::parsed_value::{format_number, ParsedArrayValue, ParsedValue};
use crate::path::JsonPath;

/// Result of evaluating a function.
///
/// `Undefined` is a missing value (failed lookup); `Null` is an explicit
/// null. `Json` is a single value taken from a document, `Collection` the
/// result of a collection lookup.
#[derive(Debug, Clone, PartialEq)]
pub enum Evaluated {
    Undefined,
    Null,
    Boolean(bool),
    Double(f64),
    String(String),
    DateTime(DateTime<FixedOffset>),
    Json(Arc<ParsedValue>),
    Collection(Vec<Arc<ParsedValue>>),
}

impl Evaluated {
    /// Undefined, null, or a document `null`.
    pub fn is_no_value(&self) -> bool {
        match self {
            Evaluated::Undefined | Evaluated::Null => true,
            Evaluated::Json(value) => value.is_null(),
            _ => false,
        }
    }

    pub fn is_undefined(&self) -> bool {
        matches!(self, Evaluated::Undefined)
    }

    /// Short description used in error messages.
    pub fn describe(&self) -> &'static str {
        match self {
            Evaluated::Undefined => "undefined",
            Evaluated::Null => "null",
            Evaluated::Boolean(_) => "a boolean",
            Evaluated::Double(_) => "a number",
            Evaluated::String(_) => "a string",
            Evaluated::DateTime(_) => "a date-time",
            Evaluated::Collection(_) => "a collection",
            Evaluated::Json(value) => match value.as_ref() {
                ParsedValue::Json(_) => "an object",
                ParsedValue::Array(_) => "an array",
                ParsedValue::Simple(simple) if simple.is_null() => "null",
                ParsedValue::Simple(simple) if simple.is_string => "a string",
                ParsedValue::Simple(simple) if simple.as_bool().is_some() => "a boolean",
                ParsedValue::Simple(_) => "a number",
            },
        }
    }

    /// Items a collection function iterates: array items, collection items,
    /// a single document value as one item, nothing for undefined.
    pub fn into_items(self, function: &str, position: Position) -> Result<Vec<Arc<ParsedValue>>> {
        match self {
            Evaluated::Undefined => Ok(Vec::new()),
            Evaluated::Collection(items) => Ok(items),
            Evaluated::Json(value) => match value.as_ref() {
                ParsedValue::Array(array) => Ok(array.values.clone()),
                _ => Ok(vec![value]),
            },
            other => Err(JsonQlError::evaluation(
                format!("{function} expects a collection but the value is {}", other.describe()),
                position,
            )),
        }
    }

    /// Materializes the result as a document value at `path`.
    /// Returns `None` for undefined.
    pub fn to_parsed(&self, path: JsonPath) -> Option<Arc<ParsedValue>> {
        let value = match self {
            Evaluated::Undefined => return None,
            Evaluated::Null => ParsedValue::null(path),
            Evaluated::Boolean(b) => ParsedValue::simple(path, b.to_string(), false),
            Evaluated::Double(d) => ParsedValue::simple(path, format_number(*d), false),
            Evaluated::String(s) => ParsedValue::simple(path, s.clone(), true),
            Evaluated::DateTime(dt) => ParsedValue::simple(path, dt.to_rfc3339(), true),
            Evaluated::Json(value) => {
                if value.path() == &path {
                    return Some(Arc::clone(value));
                }
                value.copied_to(path)
            }
            Evaluated::Collection(items) => ParsedValue::Array(ParsedArrayValue {
                values: items
                    .iter()
                    .enumerate()
                    .map(|(i, item)| Arc::new(item.copied_to(path.child_index(i))))
                    .collect(),
                path_in_referenced_json: None,
                path,
            }),
        };
        Some(Arc::new(value))
    }
}

impl From<bool> for Evaluated {
    fn from(b: bool) -> Self {
        Evaluated::Boolean(b)
    }
}

impl From<f64> for Evaluated {
    fn from(d: f64) -> Self {
        Evaluated::Double(d)
    }
}

impl From<String> for Evaluated {
    fn from(s: String) -> Self {
        Evaluated::String(s)
    }
}
