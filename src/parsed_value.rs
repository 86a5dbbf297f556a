//! Immutable tree form of a compiled JSON document.
//!
//! Every node knows its own [`JsonPath`] and, when it was copied from an
//! ancestor document, the path it was copied from.

use std::sync::Arc;

use indexmap::IndexMap;
use serde_json::Value;

use crate::path::JsonPath;

#[derive(Debug, Clone, PartialEq)]
pub enum ParsedValue {
    Json(ParsedJson),
    Array(ParsedArrayValue),
    Simple(ParsedSimpleValue),
}

/// JSON object; property order is the order of the source text.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedJson {
    pub path: JsonPath,
    pub path_in_referenced_json: Option<JsonPath>,
    pub properties: IndexMap<String, Arc<ParsedValue>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParsedArrayValue {
    pub path: JsonPath,
    pub path_in_referenced_json: Option<JsonPath>,
    pub values: Vec<Arc<ParsedValue>>,
}

/// Scalar. `is_string` separates `"1"` from `1` and `"null"` from `null`.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedSimpleValue {
    pub path: JsonPath,
    pub path_in_referenced_json: Option<JsonPath>,
    pub value: String,
    pub is_string: bool,
}

impl ParsedSimpleValue {
    pub fn is_null(&self) -> bool {
        !self.is_string && self.value == "null"
    }

    pub fn as_bool(&self) -> Option<bool> {
        match (self.is_string, self.value.as_str()) {
            (false, "true") => Some(true),
            (false, "false") => Some(false),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        if self.is_string || self.is_null() || self.as_bool().is_some() {
            return None;
        }
        parse_number(&self.value)
    }
}

pub(crate) fn parse_number(text: &str) -> Option<f64> {
    let (negative, digits) = match text.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, text),
    };
    let value = match digits.strip_prefix("0x").or_else(|| digits.strip_prefix("0X")) {
        Some(hex) => i64::from_str_radix(hex, 16).ok()? as f64,
        None => digits.parse::<f64>().ok()?,
    };
    Some(if negative { -value } else { value })
}

/// Text form of a computed number: integers print without a fraction.
pub fn format_number(value: f64) -> String {
    if value.is_finite() && value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        format!("{value}")
    }
}

impl ParsedValue {
    pub fn path(&self) -> &JsonPath {
        match self {
            ParsedValue::Json(v) => &v.path,
            ParsedValue::Array(v) => &v.path,
            ParsedValue::Simple(v) => &v.path,
        }
    }

    pub fn path_in_referenced_json(&self) -> Option<&JsonPath> {
        match self {
            ParsedValue::Json(v) => v.path_in_referenced_json.as_ref(),
            ParsedValue::Array(v) => v.path_in_referenced_json.as_ref(),
            ParsedValue::Simple(v) => v.path_in_referenced_json.as_ref(),
        }
    }

    /// Where this value originally lives: the referenced path for copies,
    /// otherwise its own path.
    pub fn original_path(&self) -> &JsonPath {
        self.path_in_referenced_json().unwrap_or_else(|| self.path())
    }

    pub fn simple(path: JsonPath, value: impl Into<String>, is_string: bool) -> Self {
        ParsedValue::Simple(ParsedSimpleValue {
            path,
            path_in_referenced_json: None,
            value: value.into(),
            is_string,
        })
    }

    pub fn null(path: JsonPath) -> Self {
        Self::simple(path, "null", false)
    }

    /// Property lookup; `None` for missing properties and non-objects.
    pub fn get(&self, name: &str) -> Option<&Arc<ParsedValue>> {
        match self {
            ParsedValue::Json(json) => json.properties.get(name),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&ParsedJson> {
        match self {
            ParsedValue::Json(json) => Some(json),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[Arc<ParsedValue>]> {
        match self {
            ParsedValue::Array(array) => Some(&array.values),
            _ => None,
        }
    }

    pub fn as_simple(&self) -> Option<&ParsedSimpleValue> {
        match self {
            ParsedValue::Simple(simple) => Some(simple),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        self.as_simple().is_some_and(ParsedSimpleValue::is_null)
    }

    /// Copy placed at `path`. Nodes coming from another document remember
    /// their original location in `path_in_referenced_json`.
    pub fn copied_to(&self, path: JsonPath) -> ParsedValue {
        let reference = self.path_in_referenced_json().cloned().or_else(|| {
            (self.path().document_id() != path.document_id()).then(|| self.path().clone())
        });
        match self {
            ParsedValue::Json(json) => ParsedValue::Json(ParsedJson {
                properties: json
                    .properties
                    .iter()
                    .map(|(name, value)| (name.clone(), Arc::new(value.copied_to(path.child_property(name)))))
                    .collect(),
                path_in_referenced_json: reference,
                path,
            }),
            ParsedValue::Array(array) => ParsedValue::Array(ParsedArrayValue {
                values: array
                    .values
                    .iter()
                    .enumerate()
                    .map(|(i, value)| Arc::new(value.copied_to(path.child_index(i))))
                    .collect(),
                path_in_referenced_json: reference,
                path,
            }),
            ParsedValue::Simple(simple) => ParsedValue::Simple(ParsedSimpleValue {
                path,
                path_in_referenced_json: reference,
                value: simple.value.clone(),
                is_string: simple.is_string,
            }),
        }
    }

    /// Converts to a `serde_json::Value`. Numbers keep their source text.
    pub fn to_json(&self) -> Value {
        match self {
            ParsedValue::Json(json) => Value::Object(
                json.properties
                    .iter()
                    .map(|(name, value)| (name.clone(), value.to_json()))
                    .collect(),
            ),
            ParsedValue::Array(array) => Value::Array(array.values.iter().map(|v| v.to_json()).collect()),
            ParsedValue::Simple(simple) => {
                if simple.is_string {
                    return Value::String(simple.value.clone());
                }
                if simple.is_null() {
                    return Value::Null;
                }
                if let Some(b) = simple.as_bool() {
                    return Value::Bool(b);
                }
                if let Ok(number) = simple.value.parse::<serde_json::Number>() {
                    return Value::Number(number);
                }
                parse_number(&simple.value)
                    .and_then(serde_json::Number::from_f64)
                    .map(Value::Number)
                    .unwrap_or_else(|| Value::String(simple.value.clone()))
            }
        }
    }

    /// Builds a value tree from a `serde_json::Value`, rooted at `path`.
    pub fn from_json(value: &Value, path: JsonPath) -> ParsedValue {
        match value {
            Value::Object(map) => ParsedValue::Json(ParsedJson {
                properties: map
                    .iter()
                    .map(|(name, v)| (name.clone(), Arc::new(Self::from_json(v, path.child_property(name)))))
                    .collect(),
                path_in_referenced_json: None,
                path,
            }),
            Value::Array(items) => ParsedValue::Array(ParsedArrayValue {
                values: items
                    .iter()
                    .enumerate()
                    .map(|(i, v)| Arc::new(Self::from_json(v, path.child_index(i))))
                    .collect(),
                path_in_referenced_json: None,
                path,
            }),
            Value::String(s) => Self::simple(path, s.clone(), true),
            Value::Null => Self::null(path),
            Value::Bool(b) => Self::simple(path, b.to_string(), false),
            Value::Number(n) => Self::simple(path, n.to_string(), false),
        }
    }
}

/// Top-level value of one compiled document plus its ancestor documents,
/// closest first. Immutable once built.
#[derive(Debug, Clone)]
pub struct RootParsedValue {
    pub document_id: String,
    pub value: Arc<ParsedValue>,
    pub ancestors: Vec<Arc<RootParsedValue>>,
}

impl RootParsedValue {
    /// `parents` are the closest-first compiled parents; their own ancestors
    /// are appended so that `ancestors` is the full lookup chain.
    pub fn new(document_id: impl Into<String>, value: Arc<ParsedValue>, parents: &[Arc<RootParsedValue>]) -> Self {
        let mut ancestors: Vec<Arc<RootParsedValue>> = Vec::new();
        for parent in parents {
            for doc in std::iter::once(parent).chain(parent.ancestors.iter()) {
                if !ancestors.iter().any(|a| a.document_id == doc.document_id) {
                    ancestors.push(Arc::clone(doc));
                }
            }
        }
        Self { document_id: document_id.into(), value, ancestors }
    }

    pub fn to_json(&self) -> Value {
        self.value.to_json()
    }
}
