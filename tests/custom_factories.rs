use std::sync::Arc;

use jsonql as jql;
use jql::context::EvaluationContext;
use jql::factories::{
    BinaryOperatorFunctionFactory, BracesFunctionFactory, CompileScope, DefaultBinaryOperatorFunctionFactory,
    DefaultBracesFunctionFactory, FunctionFactories,
};
use jql::functions::{FunctionKind, FunctionRef, JsonFunction};
use jql::language::{OperatorInfo, OperatorKind};
use jql::syntax::{BracesExpression, OperatorExpression};
use jql::{Evaluated, JsonCompiler, JsonTextData, LanguageDefinition, Position};
use pretty_assertions::assert_eq;
use serde_json::json;

/// `Twice(x)`: x * 2.
#[derive(Debug)]
struct Twice {
    operand: FunctionRef,
    position: Position,
}

impl JsonFunction for Twice {
    fn position(&self) -> Position {
        self.position
    }

    fn kind(&self) -> FunctionKind {
        FunctionKind::Double
    }

    fn evaluate(&self, context: &EvaluationContext<'_>) -> jql::Result<Evaluated> {
        Ok(Evaluated::Double(self.operand.evaluate_double(context)? * 2.0))
    }
}

#[derive(Debug, Default)]
struct TwiceFactory(DefaultBracesFunctionFactory);

impl BracesFunctionFactory for TwiceFactory {
    fn try_create(&self, braces: &BracesExpression, scope: &CompileScope<'_>) -> jql::Result<Option<FunctionRef>> {
        match (braces.name.as_deref(), braces.arguments.as_slice()) {
            (Some("Twice"), [argument]) => Ok(Some(Arc::new(Twice {
                operand: scope.compile(argument)?,
                position: braces.position,
            }))),
            _ => self.0.try_create(braces, scope),
        }
    }
}

/// `a ** b`
#[derive(Debug)]
struct Power {
    base: FunctionRef,
    exponent: FunctionRef,
    position: Position,
}

impl JsonFunction for Power {
    fn position(&self) -> Position {
        self.position
    }

    fn kind(&self) -> FunctionKind {
        FunctionKind::Double
    }

    fn evaluate(&self, context: &EvaluationContext<'_>) -> jql::Result<Evaluated> {
        let base = self.base.evaluate_double(context)?;
        Ok(Evaluated::Double(base.powf(self.exponent.evaluate_double(context)?)))
    }
}

#[derive(Debug, Default)]
struct PowerFactory(DefaultBinaryOperatorFunctionFactory);

impl BinaryOperatorFunctionFactory for PowerFactory {
    fn try_create(&self, expression: &OperatorExpression, scope: &CompileScope<'_>) -> jql::Result<Option<FunctionRef>> {
        if expression.operator.name != "**" {
            return self.0.try_create(expression, scope);
        }
        Ok(Some(Arc::new(Power {
            base: scope.compile_operand(expression, 0)?,
            exponent: scope.compile_operand(expression, 1)?,
            position: expression.position,
        })))
    }
}

fn compiler() -> JsonCompiler {
    let language = LanguageDefinition::default().with_operator(OperatorInfo::new("**", OperatorKind::Binary, 75));
    let factories = FunctionFactories::default()
        .with_braces(Arc::new(TwiceFactory::default()))
        .with_binary(Arc::new(PowerFactory::default()));
    JsonCompiler::with_factories(factories, language)
}

#[test]
fn test_custom_function_and_defaults_side_by_side() {
    let data = JsonTextData::new("Doc", r#"{"A": [1, 2, 3], "B": "$value(Twice(Sum(A)))"}"#);
    let result = compiler().compile(&data);
    assert_eq!(result.errors, vec![]);
    assert_eq!(result.document("Doc").unwrap().to_json(), json!({"A": [1, 2, 3], "B": 12}));
}

#[test]
fn test_custom_operator_precedence() {
    let data = JsonTextData::new("Doc", r#"{"N": 3}"#);
    assert_eq!(compiler().query_text("2 * N ** 2 + 1", &data).to_json(), json!(19));
    assert_eq!(compiler().query_text("A.Select(x => x ** 2)", &JsonTextData::new("Doc", r#"{"A": [2, 3]}"#)).to_json(), json!([4, 9]));
}

#[test]
fn test_default_compiler_rejects_unknown_operator() {
    let result = JsonCompiler::new().query_text("2 ** 3", &JsonTextData::new("Doc", "{}"));
    assert_eq!(result.errors.len(), 1);
    assert_eq!(result.value, None);
}

#[test]
fn test_unknown_names_still_fail() {
    let result = compiler().query_text("Thrice(1)", &JsonTextData::new("Doc", "{}"));
    assert_eq!(result.errors[0].message, "unknown function 'Thrice'");
}
