//! Built-in scalar functions called by name: `Lower(Name)`, `If(c, a, b)`.

use std::ops::RangeInclusive;

use chrono::Utc;
use itertools::Itertools;

use crate::comparison::{to_comparable, to_display_text, Comparable, ExpectedType};
use crate::context::EvaluationContext;
use crate::errors::{JsonQlError, Position, Result};
use crate::evaluated::Evaluated;
use crate::functions::{FunctionKind, FunctionRef, JsonFunction};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Builtin {
    Lower,
    Upper,
    Len,
    Concatenate,
    Contains,
    StartsWith,
    EndsWith,
    Trim,
    ToInt,
    ToDouble,
    ToString,
    ToBoolean,
    ToDateTime,
    Abs,
    IsEven,
    IsOdd,
    Now,
    IsNull,
    IsUndefined,
    HasValue,
    If,
}

impl Builtin {
    pub const ALL: &'static [Builtin] = &[
        Builtin::Lower,
        Builtin::Upper,
        Builtin::Len,
        Builtin::Concatenate,
        Builtin::Contains,
        Builtin::StartsWith,
        Builtin::EndsWith,
        Builtin::Trim,
        Builtin::ToInt,
        Builtin::ToDouble,
        Builtin::ToString,
        Builtin::ToBoolean,
        Builtin::ToDateTime,
        Builtin::Abs,
        Builtin::IsEven,
        Builtin::IsOdd,
        Builtin::Now,
        Builtin::IsNull,
        Builtin::IsUndefined,
        Builtin::HasValue,
        Builtin::If,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Builtin::Lower => "Lower",
            Builtin::Upper => "Upper",
            Builtin::Len => "Len",
            Builtin::Concatenate => "Concatenate",
            Builtin::Contains => "Contains",
            Builtin::StartsWith => "StartsWith",
            Builtin::EndsWith => "EndsWith",
            Builtin::Trim => "Trim",
            Builtin::ToInt => "ToInt",
            Builtin::ToDouble => "ToDouble",
            Builtin::ToString => "ToString",
            Builtin::ToBoolean => "ToBoolean",
            Builtin::ToDateTime => "ToDateTime",
            Builtin::Abs => "Abs",
            Builtin::IsEven => "IsEven",
            Builtin::IsOdd => "IsOdd",
            Builtin::Now => "Now",
            Builtin::IsNull => "IsNull",
            Builtin::IsUndefined => "IsUndefined",
            Builtin::HasValue => "HasValue",
            Builtin::If => "If",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|b| b.name() == name)
    }

    pub fn arity(self) -> RangeInclusive<usize> {
        match self {
            Builtin::Now => 0..=0,
            Builtin::Concatenate => 2..=usize::MAX,
            Builtin::Contains | Builtin::StartsWith | Builtin::EndsWith => 2..=2,
            Builtin::If => 3..=3,
            _ => 1..=1,
        }
    }

    fn kind(self) -> FunctionKind {
        match self {
            Builtin::Lower | Builtin::Upper | Builtin::Concatenate | Builtin::Trim | Builtin::ToString => {
                FunctionKind::String
            }
            Builtin::Len | Builtin::ToInt | Builtin::ToDouble | Builtin::Abs => FunctionKind::Double,
            Builtin::ToDateTime | Builtin::Now => FunctionKind::DateTime,
            Builtin::If => FunctionKind::Object,
            _ => FunctionKind::Boolean,
        }
    }
}

/// Message for a call with the wrong number of arguments.
pub fn arity_message(name: &str, arity: &RangeInclusive<usize>, actual: usize) -> String {
    let expected = match (*arity.start(), *arity.end()) {
        (min, usize::MAX) => format!("at least {min}"),
        (min, max) if min == max => min.to_string(),
        (min, max) => format!("{min} to {max}"),
    };
    let noun = if expected == "1" { "argument" } else { "arguments" };
    format!("{name} expects {expected} {noun} but got {actual}")
}

#[derive(Debug)]
pub struct BuiltinFunction {
    builtin: Builtin,
    arguments: Vec<FunctionRef>,
    position: Position,
}

impl BuiltinFunction {
    /// Fails with a syntax error when the argument count does not fit.
    pub fn new(builtin: Builtin, arguments: Vec<FunctionRef>, position: Position) -> Result<Self> {
        let arity = builtin.arity();
        if !arity.contains(&arguments.len()) {
            return Err(JsonQlError::syntax(arity_message(builtin.name(), &arity, arguments.len()), position));
        }
        Ok(Self { builtin, arguments, position })
    }

    fn argument(&self, i: usize) -> Result<&FunctionRef> {
        self.arguments
            .get(i)
            .ok_or_else(|| JsonQlError::Internal(format!("{} has no argument {i}", self.builtin.name())))
    }

    fn text(&self, i: usize, context: &EvaluationContext<'_>) -> Result<String> {
        self.argument(i)?.evaluate_string(context)
    }

    fn number(&self, i: usize, context: &EvaluationContext<'_>) -> Result<f64> {
        self.argument(i)?.evaluate_double(context)
    }

    fn integer(&self, i: usize, context: &EvaluationContext<'_>) -> Result<i64> {
        let argument = self.argument(i)?;
        let n = argument.evaluate_double(context)?;
        if n.fract() != 0.0 {
            return Err(JsonQlError::evaluation(
                format!("{} expects an integer but the value is {n}", self.builtin.name()),
                argument.position(),
            ));
        }
        Ok(n as i64)
    }
}

fn to_boolean(value: &Evaluated, position: Position) -> Result<bool> {
    match to_comparable(value) {
        Some(Comparable::Boolean(b)) => Ok(b),
        Some(Comparable::Double(d)) => Ok(d != 0.0),
        Some(Comparable::String(s)) if s.trim().eq_ignore_ascii_case("true") => Ok(true),
        Some(Comparable::String(s)) if s.trim().eq_ignore_ascii_case("false") => Ok(false),
        _ => Err(JsonQlError::evaluation(
            format!("expected {} but the value is {}", ExpectedType::Boolean, value.describe()),
            position,
        )),
    }
}

impl JsonFunction for BuiltinFunction {
    fn position(&self) -> Position {
        self.position
    }

    fn kind(&self) -> FunctionKind {
        self.builtin.kind()
    }

    fn evaluate(&self, context: &EvaluationContext<'_>) -> Result<Evaluated> {
        let result = match self.builtin {
            Builtin::Lower => Evaluated::String(self.text(0, context)?.to_lowercase()),
            Builtin::Upper => Evaluated::String(self.text(0, context)?.to_uppercase()),
            Builtin::Trim => Evaluated::String(self.text(0, context)?.trim().to_string()),
            Builtin::Len => Evaluated::Double(self.text(0, context)?.chars().count() as f64),
            Builtin::Concatenate => {
                let parts = self
                    .arguments
                    .iter()
                    .map(|a| a.evaluate_string(context))
                    .collect::<Result<Vec<_>>>()?;
                Evaluated::String(parts.iter().join(""))
            }
            Builtin::Contains => Evaluated::Boolean(self.text(0, context)?.contains(&self.text(1, context)?)),
            Builtin::StartsWith => Evaluated::Boolean(self.text(0, context)?.starts_with(&self.text(1, context)?)),
            Builtin::EndsWith => Evaluated::Boolean(self.text(0, context)?.ends_with(&self.text(1, context)?)),
            Builtin::ToInt => Evaluated::Double(self.number(0, context)?.trunc()),
            Builtin::ToDouble => Evaluated::Double(self.number(0, context)?),
            Builtin::ToString => {
                let argument = self.argument(0)?;
                Evaluated::String(to_display_text(&argument.evaluate(context)?, argument.position())?)
            }
            Builtin::ToBoolean => {
                let argument = self.argument(0)?;
                Evaluated::Boolean(to_boolean(&argument.evaluate(context)?, argument.position())?)
            }
            Builtin::ToDateTime => Evaluated::DateTime(self.argument(0)?.evaluate_date_time(context)?),
            Builtin::Abs => Evaluated::Double(self.number(0, context)?.abs()),
            Builtin::IsEven => Evaluated::Boolean(self.integer(0, context)? % 2 == 0),
            Builtin::IsOdd => Evaluated::Boolean(self.integer(0, context)? % 2 != 0),
            Builtin::Now => Evaluated::DateTime(Utc::now().fixed_offset()),
            Builtin::IsNull => Evaluated::Boolean(match self.argument(0)?.evaluate(context)? {
                Evaluated::Null => true,
                Evaluated::Json(value) => value.is_null(),
                _ => false,
            }),
            Builtin::IsUndefined => Evaluated::Boolean(self.argument(0)?.evaluate(context)?.is_undefined()),
            Builtin::HasValue => Evaluated::Boolean(!self.argument(0)?.evaluate(context)?.is_no_value()),
            Builtin::If => {
                if self.argument(0)?.evaluate_boolean(context)? {
                    self.argument(1)?.evaluate(context)?
                } else {
                    self.argument(2)?.evaluate(context)?
                }
            }
        };
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::JsonQlOptions;
    use crate::functions::literals::ConstantFunction;
    use crate::parsed_value::{ParsedValue, RootParsedValue};
    use crate::path::JsonPath;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::sync::Arc;

    fn call(builtin: Builtin, arguments: Vec<Evaluated>) -> Result<Evaluated> {
        let doc = RootParsedValue::new("d", Arc::new(ParsedValue::from_json(&json!({}), JsonPath::root("d"))), &[]);
        let options = JsonQlOptions::default();
        let arguments = arguments
            .into_iter()
            .enumerate()
            .map(|(i, v)| Arc::new(ConstantFunction::new(v, Position::new(1, i + 2))) as FunctionRef)
            .collect();
        BuiltinFunction::new(builtin, arguments, Position::START)?.evaluate(&EvaluationContext::new(&doc, &options))
    }

    fn text(s: &str) -> Evaluated {
        Evaluated::String(s.to_string())
    }

    #[test]
    fn text_functions() {
        assert_eq!(call(Builtin::Lower, vec![text("AbC")]).unwrap(), text("abc"));
        assert_eq!(call(Builtin::Upper, vec![text("AbC")]).unwrap(), text("ABC"));
        assert_eq!(call(Builtin::Trim, vec![text("  x ")]).unwrap(), text("x"));
        assert_eq!(call(Builtin::Len, vec![text("héllo")]).unwrap(), Evaluated::Double(5.0));
        assert_eq!(
            call(Builtin::Concatenate, vec![text("a"), Evaluated::Double(1.0), Evaluated::Boolean(true)]).unwrap(),
            text("a1true")
        );
        assert_eq!(call(Builtin::Contains, vec![text("abc"), text("b")]).unwrap(), Evaluated::Boolean(true));
        assert_eq!(call(Builtin::StartsWith, vec![text("abc"), text("b")]).unwrap(), Evaluated::Boolean(false));
        assert_eq!(call(Builtin::EndsWith, vec![text("abc"), text("bc")]).unwrap(), Evaluated::Boolean(true));
    }

    #[test]
    fn conversions() {
        assert_eq!(call(Builtin::ToInt, vec![text("3.9")]).unwrap(), Evaluated::Double(3.0));
        assert_eq!(call(Builtin::ToDouble, vec![text("0x10")]).unwrap(), Evaluated::Double(16.0));
        assert_eq!(call(Builtin::ToString, vec![Evaluated::Double(2.0)]).unwrap(), text("2"));
        assert_eq!(call(Builtin::ToBoolean, vec![text("TRUE")]).unwrap(), Evaluated::Boolean(true));
        assert_eq!(call(Builtin::Abs, vec![Evaluated::Double(-2.5)]).unwrap(), Evaluated::Double(2.5));
        assert_eq!(call(Builtin::IsEven, vec![Evaluated::Double(4.0)]).unwrap(), Evaluated::Boolean(true));
        assert_eq!(call(Builtin::IsOdd, vec![Evaluated::Double(4.0)]).unwrap(), Evaluated::Boolean(false));
        match call(Builtin::ToDateTime, vec![text("2024-05-01")]).unwrap() {
            Evaluated::DateTime(dt) => assert_eq!(dt.to_rfc3339(), "2024-05-01T00:00:00+00:00"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn value_checks_keep_null_and_undefined_apart() {
        assert_eq!(call(Builtin::IsNull, vec![Evaluated::Null]).unwrap(), Evaluated::Boolean(true));
        assert_eq!(call(Builtin::IsNull, vec![Evaluated::Undefined]).unwrap(), Evaluated::Boolean(false));
        assert_eq!(call(Builtin::IsUndefined, vec![Evaluated::Undefined]).unwrap(), Evaluated::Boolean(true));
        assert_eq!(call(Builtin::HasValue, vec![Evaluated::Null]).unwrap(), Evaluated::Boolean(false));
        assert_eq!(call(Builtin::HasValue, vec![text("")]).unwrap(), Evaluated::Boolean(true));
    }

    #[test]
    fn if_evaluates_one_branch() {
        assert_eq!(
            call(Builtin::If, vec![Evaluated::Boolean(true), text("yes"), Evaluated::Undefined]).unwrap(),
            text("yes")
        );
        assert_eq!(
            call(Builtin::If, vec![Evaluated::Boolean(false), text("yes"), Evaluated::Double(1.0)]).unwrap(),
            Evaluated::Double(1.0)
        );
    }

    #[test]
    fn argument_count_is_checked_when_built() {
        let err = call(Builtin::Lower, vec![text("a"), text("b")]).unwrap_err();
        assert!(err.is_syntax());
        assert_eq!(err.message(), "Lower expects 1 argument but got 2");
        let err = call(Builtin::Concatenate, vec![text("a")]).unwrap_err();
        assert_eq!(err.message(), "Concatenate expects at least 2 arguments but got 1");
    }

    #[test]
    fn type_errors_point_at_the_argument() {
        let err = call(Builtin::Abs, vec![text("abc")]).unwrap_err();
        assert_eq!(err.to_string(), "evaluation error at 1:2: expected a number but the value is a string");
    }
}
