use std::sync::Arc;

use crate::errors::{JsonQlError, Result};
use crate::factories::{BracesFunctionFactory, CompileScope};
use crate::functions::aggregates::{AggregateFunction, AggregateKind};
use crate::functions::builtins::{arity_message, Builtin, BuiltinFunction};
use crate::functions::FunctionRef;
use crate::syntax::{BraceKind, BracesExpression};

/// Aggregates and built-in functions, by name.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultBracesFunctionFactory;

impl DefaultBracesFunctionFactory {
    fn aggregate(kind: AggregateKind, braces: &BracesExpression, scope: &CompileScope<'_>) -> Result<FunctionRef> {
        let arity = kind.arity();
        if !arity.contains(&braces.arguments.len()) {
            return Err(JsonQlError::syntax(
                arity_message(kind.name(), &arity, braces.arguments.len()),
                braces.position,
            ));
        }
        let collection = scope.compile(&braces.arguments[0])?;
        let lambda = match braces.arguments.get(1) {
            Some(item) => Some(scope.compile_lambda(item, kind.name())?),
            None => None,
        };
        Ok(Arc::new(AggregateFunction::new(kind, collection, lambda, braces.position)))
    }
}

impl BracesFunctionFactory for DefaultBracesFunctionFactory {
    fn try_create(&self, braces: &BracesExpression, scope: &CompileScope<'_>) -> Result<Option<FunctionRef>> {
        let Some(name) = braces.name.as_deref() else {
            return Ok(None);
        };
        if braces.kind != BraceKind::Round {
            return Ok(None);
        }
        if let Some(kind) = AggregateKind::from_name(name) {
            return Self::aggregate(kind, braces, scope).map(Some);
        }
        let Some(builtin) = Builtin::from_name(name) else {
            return Ok(None);
        };
        let arguments = braces.arguments.iter().map(|a| scope.compile(a)).collect::<Result<Vec<_>>>()?;
        Ok(Some(Arc::new(BuiltinFunction::new(builtin, arguments, braces.position)?)))
    }
}

#[cfg(test)]
mod tests {
    use crate::errors::Position;
    use crate::factories::test_support::{eval_json, evaluate};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn aggregates_with_and_without_lambdas() {
        let doc = json!({"A": [1, 2, 3, 4], "P": [{"Age": 30}, {"Age": 12}]});
        assert_eq!(eval_json("Sum(A)", doc.clone()), json!(10));
        assert_eq!(eval_json("Count(A, x => x > 1)", doc.clone()), json!(3));
        assert_eq!(eval_json("All(P, p => p.Age > 10)", doc.clone()), json!(true));
        assert_eq!(eval_json("Any(P, p => p.Age > 40)", doc.clone()), json!(false));
        assert_eq!(eval_json("Max(P, p => p.Age)", doc.clone()), json!(30));
        assert_eq!(eval_json("Average(A)", doc.clone()), json!(2.5));
        assert_eq!(eval_json("Sum(A.Where(x => x > 2))", doc.clone()), json!(7));
        assert_eq!(eval_json("Min(Missing)", doc), json!("<undefined>"));
    }

    #[test]
    fn builtins_compose() {
        let doc = json!({"Name": "  Ada ", "N": 7});
        assert_eq!(eval_json("Upper(Trim(Name))", doc.clone()), json!("ADA"));
        assert_eq!(eval_json("If(IsOdd(N), 'odd', 'even')", doc.clone()), json!("odd"));
        assert_eq!(eval_json("Concatenate('n=', N)", doc), json!("n=7"));
    }

    #[test]
    fn wrong_argument_count_is_a_syntax_error() {
        let err = evaluate("All(A)", json!({})).unwrap_err();
        assert!(err.is_syntax());
        assert_eq!(err.message(), "All expects 2 arguments but got 1");
        let err = evaluate("1 + Upper()", json!({})).unwrap_err();
        assert_eq!(err.position(), Some(Position::new(1, 5)));
    }
}
