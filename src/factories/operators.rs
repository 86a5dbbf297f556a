use std::sync::Arc;

use crate::errors::Result;
use crate::factories::{
    BinaryOperatorFunctionFactory, CompileScope, UnaryPostfixOperatorFunctionFactory,
    UnaryPrefixOperatorFunctionFactory,
};
use crate::functions::operators::{
    AssertFunction, BinaryOperator, BinaryOperatorFunction, DefaultValueFunction, PrefixOperator,
    PrefixOperatorFunction,
};
use crate::functions::FunctionRef;
use crate::language::operators;
use crate::syntax::OperatorExpression;

#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultBinaryOperatorFunctionFactory;

impl BinaryOperatorFunctionFactory for DefaultBinaryOperatorFunctionFactory {
    fn try_create(&self, expression: &OperatorExpression, scope: &CompileScope<'_>) -> Result<Option<FunctionRef>> {
        let name = expression.operator.name.as_str();
        if name == operators::DEFAULT_VALUE {
            let value = scope.compile_operand(expression, 0)?;
            let default = scope.compile_operand(expression, 1)?;
            return Ok(Some(Arc::new(DefaultValueFunction::new(value, default, expression.position))));
        }
        let Some(operator) = BinaryOperator::from_name(name) else {
            return Ok(None);
        };
        let left = scope.compile_operand(expression, 0)?;
        let right = scope.compile_operand(expression, 1)?;
        Ok(Some(Arc::new(BinaryOperatorFunction::new(operator, left, right, expression.position))))
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultUnaryPrefixOperatorFunctionFactory;

impl UnaryPrefixOperatorFunctionFactory for DefaultUnaryPrefixOperatorFunctionFactory {
    fn try_create(&self, expression: &OperatorExpression, scope: &CompileScope<'_>) -> Result<Option<FunctionRef>> {
        let operator = match expression.operator.name.as_str() {
            operators::NEGATE => PrefixOperator::Negate,
            operators::NOT => PrefixOperator::Not,
            _ => return Ok(None),
        };
        let operand = scope.compile_operand(expression, 0)?;
        Ok(Some(Arc::new(PrefixOperatorFunction::new(operator, operand, expression.position))))
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultUnaryPostfixOperatorFunctionFactory;

impl UnaryPostfixOperatorFunctionFactory for DefaultUnaryPostfixOperatorFunctionFactory {
    fn try_create(&self, expression: &OperatorExpression, scope: &CompileScope<'_>) -> Result<Option<FunctionRef>> {
        if expression.operator.name != operators::ASSERT {
            return Ok(None);
        }
        let operand = scope.compile_operand(expression, 0)?;
        Ok(Some(Arc::new(AssertFunction::new(operand, expression.position))))
    }
}

#[cfg(test)]
mod tests {
    use crate::errors::Position;
    use crate::factories::test_support::{eval_json, evaluate};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn operators_compile_with_precedence() {
        let doc = json!({"A": 4, "B": "x", "N": null});
        assert_eq!(eval_json("A * 2 + 1", doc.clone()), json!(9));
        assert_eq!(eval_json("-A % 3", doc.clone()), json!(-1));
        assert_eq!(eval_json("B + A", doc.clone()), json!("x4"));
        assert_eq!(eval_json("A > 3 && !(A == 5)", doc.clone()), json!(true));
        assert_eq!(eval_json("N == undefined", doc.clone()), json!(true));
        assert_eq!(eval_json("Missing : 'fallback'", doc.clone()), json!("fallback"));
        assert_eq!(eval_json("A : 0", doc), json!(4));
    }

    #[test]
    fn date_time_defaults_convert_the_value() {
        let doc = json!({"D": "2024-03-04", "B": "not a date"});
        assert_eq!(eval_json("Missing : ToDateTime('2024-01-02')", doc.clone()), json!("2024-01-02T00:00:00+00:00"));
        assert_eq!(eval_json("D : ToDateTime('2024-01-02')", doc.clone()), json!("2024-03-04T00:00:00+00:00"));
        assert_eq!(eval_json("B : ToDateTime('2024-01-02')", doc.clone()), json!("2024-01-02T00:00:00+00:00"));
        assert_eq!(eval_json("(D : ToDateTime('2024-01-02')) > ToDateTime('2024-02-01')", doc), json!(true));
    }

    #[test]
    fn assert_reports_at_the_operator() {
        let err = evaluate("Missing assert", json!({})).unwrap_err();
        assert_eq!(err.message(), "assertion failed: value is undefined");
        assert_eq!(err.position(), Some(Position::new(1, 9)));
        assert_eq!(eval_json("A assert", json!({"A": 1})), json!(1));
    }
}
