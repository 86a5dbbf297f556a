use std::sync::Arc;

use crate::errors::{JsonQlError, Result};
use crate::evaluated::Evaluated;
use crate::factories::{
    CompileScope, ConstantTextFunctionFactory, LiteralFunctionFactory, NumericValueFunctionFactory,
};
use crate::functions::literals::ConstantFunction;
use crate::functions::FunctionRef;
use crate::language::{keywords, NumericLiteralFormat};
use crate::parsed_value::parse_number;
use crate::syntax::{LiteralExpression, LiteralKind};

/// `true`, `false`, `null`, `undefined`.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultLiteralFunctionFactory;

impl LiteralFunctionFactory for DefaultLiteralFunctionFactory {
    fn try_create(&self, literal: &LiteralExpression, _scope: &CompileScope<'_>) -> Result<Option<FunctionRef>> {
        if literal.kind != LiteralKind::Identifier {
            return Ok(None);
        }
        let value = match literal.text.as_str() {
            keywords::TRUE => Evaluated::Boolean(true),
            keywords::FALSE => Evaluated::Boolean(false),
            keywords::NULL => Evaluated::Null,
            keywords::UNDEFINED => Evaluated::Undefined,
            _ => return Ok(None),
        };
        Ok(Some(Arc::new(ConstantFunction::new(value, literal.position))))
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultConstantTextFunctionFactory;

impl ConstantTextFunctionFactory for DefaultConstantTextFunctionFactory {
    fn try_create(&self, literal: &LiteralExpression, _scope: &CompileScope<'_>) -> Result<Option<FunctionRef>> {
        if literal.kind != LiteralKind::Text {
            return Ok(None);
        }
        Ok(Some(Arc::new(ConstantFunction::new(Evaluated::String(literal.text.clone()), literal.position))))
    }
}

/// Number literals in the formats the language definition enables.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultNumericValueFunctionFactory;

fn literal_format(text: &str) -> NumericLiteralFormat {
    let digits = text.trim_start_matches('-');
    if digits.starts_with("0x") || digits.starts_with("0X") {
        NumericLiteralFormat::Hexadecimal
    } else if digits.contains(['e', 'E']) {
        NumericLiteralFormat::Exponent
    } else {
        NumericLiteralFormat::Decimal
    }
}

impl NumericValueFunctionFactory for DefaultNumericValueFunctionFactory {
    fn try_create(&self, literal: &LiteralExpression, scope: &CompileScope<'_>) -> Result<Option<FunctionRef>> {
        if literal.kind != LiteralKind::Number {
            return Ok(None);
        }
        let format = literal_format(&literal.text);
        if !scope.language().supports(format) {
            return Err(JsonQlError::syntax(
                format!("number format of '{}' is not enabled", literal.text),
                literal.position,
            ));
        }
        let value = parse_number(&literal.text)
            .ok_or_else(|| JsonQlError::syntax(format!("invalid number '{}'", literal.text), literal.position))?;
        Ok(Some(Arc::new(ConstantFunction::new(Evaluated::Double(value), literal.position))))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::Position;
    use crate::factories::test_support::eval_json;
    use crate::factories::{FunctionCompiler, FunctionFactories};
    use crate::language::LanguageDefinition;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn literal_values() {
        assert_eq!(eval_json("true", json!({})), json!(true));
        assert_eq!(eval_json("null", json!({})), json!(null));
        assert_eq!(eval_json("undefined", json!({})), json!("<undefined>"));
        assert_eq!(eval_json("'it\\'s'", json!({})), json!("it's"));
        assert_eq!(eval_json("0x1F", json!({})), json!(31));
        assert_eq!(eval_json("2.5e1", json!({})), json!(25));
    }

    #[test]
    fn disabled_number_formats_are_rejected() {
        let language = LanguageDefinition::default().with_numeric_formats(vec![NumericLiteralFormat::Decimal]);
        let compiler = FunctionCompiler::new(FunctionFactories::default(), language);
        let err = compiler.compile_expression("0x10", Position::START).unwrap_err();
        assert_eq!(err.message(), "number format of '0x10' is not enabled");
        assert!(compiler.compile_expression("16", Position::START).is_ok());
    }
}
