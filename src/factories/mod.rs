//! Translation of syntax-tree nodes into compiled functions.
//!
//! Every syntax shape has its own factory trait. A factory returns
//! `Ok(None)` for input it does not handle, so a custom factory can wrap the
//! default one and delegate everything it does not recognize:
//!
//! ```
//! use std::sync::Arc;
//! use jsonql::factories::{BracesFunctionFactory, CompileScope, DefaultBracesFunctionFactory, FunctionFactories};
//! use jsonql::functions::FunctionRef;
//! use jsonql::syntax::BracesExpression;
//!
//! #[derive(Debug, Default)]
//! struct MyBraces(DefaultBracesFunctionFactory);
//!
//! impl BracesFunctionFactory for MyBraces {
//!     fn try_create(&self, e: &BracesExpression, scope: &CompileScope<'_>) -> jsonql::Result<Option<FunctionRef>> {
//!         // match custom names here
//!         self.0.try_create(e, scope)
//!     }
//! }
//!
//! let factories = FunctionFactories::default().with_braces(Arc::new(MyBraces::default()));
//! # let _ = factories;
//! ```

use std::fmt;
use std::sync::Arc;

use crate::context::LambdaId;
use crate::errors::{JsonQlError, Position, Result};
use crate::functions::path::ParameterBinding;
use crate::functions::selectors::{names as selector_names, CollectionSelector};
use crate::functions::{CompiledLambda, FunctionRef};
use crate::language::{operators as operator_names, LanguageDefinition, OperatorKind};
use crate::syntax::{parse_expression, BraceKind, BracesExpression, ExpressionItem, LiteralExpression, LiteralKind, OperatorExpression};

mod braces;
mod literals;
mod operators;
mod paths;
mod selectors;

pub use braces::DefaultBracesFunctionFactory;
pub use literals::{
    DefaultConstantTextFunctionFactory, DefaultLiteralFunctionFactory, DefaultNumericValueFunctionFactory,
};
pub use operators::{
    DefaultBinaryOperatorFunctionFactory, DefaultUnaryPostfixOperatorFunctionFactory,
    DefaultUnaryPrefixOperatorFunctionFactory,
};
pub use selectors::DefaultCollectionSelectorFactory;

/// Identifiers with a fixed meaning: `true`, `null`, ...
pub trait LiteralFunctionFactory: fmt::Debug + Send + Sync {
    fn try_create(&self, literal: &LiteralExpression, scope: &CompileScope<'_>) -> Result<Option<FunctionRef>>;
}

/// Quoted text literals.
pub trait ConstantTextFunctionFactory: fmt::Debug + Send + Sync {
    fn try_create(&self, literal: &LiteralExpression, scope: &CompileScope<'_>) -> Result<Option<FunctionRef>>;
}

pub trait NumericValueFunctionFactory: fmt::Debug + Send + Sync {
    fn try_create(&self, literal: &LiteralExpression, scope: &CompileScope<'_>) -> Result<Option<FunctionRef>>;
}

/// Named calls: `Sum(A)`, `Lower(Name)`.
pub trait BracesFunctionFactory: fmt::Debug + Send + Sync {
    fn try_create(&self, braces: &BracesExpression, scope: &CompileScope<'_>) -> Result<Option<FunctionRef>>;
}

pub trait BinaryOperatorFunctionFactory: fmt::Debug + Send + Sync {
    fn try_create(&self, expression: &OperatorExpression, scope: &CompileScope<'_>) -> Result<Option<FunctionRef>>;
}

pub trait UnaryPrefixOperatorFunctionFactory: fmt::Debug + Send + Sync {
    fn try_create(&self, expression: &OperatorExpression, scope: &CompileScope<'_>) -> Result<Option<FunctionRef>>;
}

pub trait UnaryPostfixOperatorFunctionFactory: fmt::Debug + Send + Sync {
    fn try_create(&self, expression: &OperatorExpression, scope: &CompileScope<'_>) -> Result<Option<FunctionRef>>;
}

/// Calls applied after `.` in a path: `A.Where(x => x > 1)`.
pub trait CollectionSelectorFactory: fmt::Debug + Send + Sync {
    fn try_create(
        &self,
        braces: &BracesExpression,
        scope: &CompileScope<'_>,
    ) -> Result<Option<Arc<dyn CollectionSelector>>>;

    /// Whether `name` is a selector, used to explain a selector called without a path.
    fn is_selector(&self, name: &str) -> bool {
        selector_names::ALL.contains(&name)
    }
}

/// One factory per syntax shape.
#[derive(Debug, Clone)]
pub struct FunctionFactories {
    pub literal: Arc<dyn LiteralFunctionFactory>,
    pub constant_text: Arc<dyn ConstantTextFunctionFactory>,
    pub numeric: Arc<dyn NumericValueFunctionFactory>,
    pub braces: Arc<dyn BracesFunctionFactory>,
    pub binary: Arc<dyn BinaryOperatorFunctionFactory>,
    pub prefix: Arc<dyn UnaryPrefixOperatorFunctionFactory>,
    pub postfix: Arc<dyn UnaryPostfixOperatorFunctionFactory>,
    pub selectors: Arc<dyn CollectionSelectorFactory>,
}

impl Default for FunctionFactories {
    fn default() -> Self {
        Self {
            literal: Arc::new(DefaultLiteralFunctionFactory),
            constant_text: Arc::new(DefaultConstantTextFunctionFactory),
            numeric: Arc::new(DefaultNumericValueFunctionFactory),
            braces: Arc::new(DefaultBracesFunctionFactory),
            binary: Arc::new(DefaultBinaryOperatorFunctionFactory),
            prefix: Arc::new(DefaultUnaryPrefixOperatorFunctionFactory),
            postfix: Arc::new(DefaultUnaryPostfixOperatorFunctionFactory),
            selectors: Arc::new(DefaultCollectionSelectorFactory),
        }
    }
}

impl FunctionFactories {
    pub fn with_literal(mut self, factory: Arc<dyn LiteralFunctionFactory>) -> Self {
        self.literal = factory;
        self
    }

    pub fn with_constant_text(mut self, factory: Arc<dyn ConstantTextFunctionFactory>) -> Self {
        self.constant_text = factory;
        self
    }

    pub fn with_numeric(mut self, factory: Arc<dyn NumericValueFunctionFactory>) -> Self {
        self.numeric = factory;
        self
    }

    pub fn with_braces(mut self, factory: Arc<dyn BracesFunctionFactory>) -> Self {
        self.braces = factory;
        self
    }

    pub fn with_binary(mut self, factory: Arc<dyn BinaryOperatorFunctionFactory>) -> Self {
        self.binary = factory;
        self
    }

    pub fn with_prefix(mut self, factory: Arc<dyn UnaryPrefixOperatorFunctionFactory>) -> Self {
        self.prefix = factory;
        self
    }

    pub fn with_postfix(mut self, factory: Arc<dyn UnaryPostfixOperatorFunctionFactory>) -> Self {
        self.postfix = factory;
        self
    }

    pub fn with_selectors(mut self, factory: Arc<dyn CollectionSelectorFactory>) -> Self {
        self.selectors = factory;
        self
    }
}

/// Compiles expression text into a function tree.
#[derive(Debug, Clone, Default)]
pub struct FunctionCompiler {
    factories: FunctionFactories,
    language: Arc<LanguageDefinition>,
}

impl FunctionCompiler {
    pub fn new(factories: FunctionFactories, language: LanguageDefinition) -> Self {
        Self { factories, language: Arc::new(language) }
    }

    pub fn factories(&self) -> &FunctionFactories {
        &self.factories
    }

    pub fn language(&self) -> &LanguageDefinition {
        &self.language
    }

    /// `origin` is where `text` starts in the enclosing document.
    pub fn compile_expression(&self, text: &str, origin: Position) -> Result<FunctionRef> {
        let item = parse_expression(text, origin, &self.language)?;
        CompileScope::new(self).compile(&item)
    }
}

#[derive(Debug)]
struct LambdaFrame {
    id: LambdaId,
    parameters: Vec<String>,
    outer: Option<Arc<LambdaFrame>>,
}

/// Compilation state of one expression: the compiler plus the lambda
/// parameters visible at the current point.
#[derive(Debug, Clone)]
pub struct CompileScope<'a> {
    compiler: &'a FunctionCompiler,
    frames: Option<Arc<LambdaFrame>>,
}

impl<'a> CompileScope<'a> {
    pub fn new(compiler: &'a FunctionCompiler) -> Self {
        Self { compiler, frames: None }
    }

    pub fn language(&self) -> &'a LanguageDefinition {
        &self.compiler.language
    }

    pub fn factories(&self) -> &'a FunctionFactories {
        &self.compiler.factories
    }

    /// Innermost lambda declaring `name`, with what the parameter binds to.
    pub fn resolve_variable(&self, name: &str) -> Option<(LambdaId, ParameterBinding)> {
        let mut current = self.frames.as_deref();
        while let Some(frame) = current {
            match frame.parameters.iter().position(|p| p == name) {
                Some(0) => return Some((frame.id, ParameterBinding::Item)),
                Some(_) => return Some((frame.id, ParameterBinding::Index)),
                None => current = frame.outer.as_deref(),
            }
        }
        None
    }

    /// Compiles `item`, which must be a lambda taking one item parameter and
    /// optionally an index parameter.
    pub fn compile_lambda(&self, item: &ExpressionItem, function: &str) -> Result<CompiledLambda> {
        let ExpressionItem::Lambda(lambda) = item else {
            return Err(JsonQlError::syntax(
                format!("{function} expects a lambda such as x => x > 0"),
                item.position(),
            ));
        };
        if lambda.parameters.is_empty() || lambda.parameters.len() > 2 {
            return Err(JsonQlError::syntax(
                format!("{function} expects a lambda with one or two parameters"),
                lambda.position,
            ));
        }
        let id = LambdaId::next();
        let parameters: Vec<String> = lambda.parameters.iter().map(|p| p.name.clone()).collect();
        let inner = CompileScope {
            compiler: self.compiler,
            frames: Some(Arc::new(LambdaFrame { id, parameters: parameters.clone(), outer: self.frames.clone() })),
        };
        let body = inner.compile(&lambda.body)?;
        Ok(CompiledLambda { id, parameters, body, position: lambda.position })
    }

    pub fn compile(&self, item: &ExpressionItem) -> Result<FunctionRef> {
        let factories = self.factories();
        match item {
            ExpressionItem::Literal(literal) => match literal.kind {
                LiteralKind::Identifier => match factories.literal.try_create(literal, self)? {
                    Some(function) => Ok(function),
                    None => self.compile_path(item),
                },
                LiteralKind::Number => factories.numeric.try_create(literal, self)?.ok_or_else(|| {
                    JsonQlError::syntax(format!("unsupported number '{}'", literal.text), literal.position)
                }),
                LiteralKind::Text => factories.constant_text.try_create(literal, self)?.ok_or_else(|| {
                    JsonQlError::syntax(format!("unsupported text '{}'", literal.text), literal.position)
                }),
            },
            ExpressionItem::Operator(expression) => {
                let operator = &expression.operator;
                let created = match operator.kind {
                    OperatorKind::Binary if operator.name == operator_names::PATH => return self.compile_path(item),
                    OperatorKind::Binary => factories.binary.try_create(expression, self)?,
                    OperatorKind::Prefix => factories.prefix.try_create(expression, self)?,
                    OperatorKind::Postfix => factories.postfix.try_create(expression, self)?,
                };
                created.ok_or_else(|| {
                    JsonQlError::syntax(format!("operator '{}' is not supported", operator.name), expression.position)
                })
            }
            ExpressionItem::Braces(braces) => match (&braces.name, braces.kind) {
                (None, _) => match braces.arguments.as_slice() {
                    [inner] => self.compile(inner),
                    _ => Err(JsonQlError::syntax("parentheses must contain exactly one expression", braces.position)),
                },
                (Some(_), BraceKind::Square) => self.compile_path(item),
                (Some(name), BraceKind::Round) => match factories.braces.try_create(braces, self)? {
                    Some(function) => Ok(function),
                    None if factories.selectors.is_selector(name) => Err(JsonQlError::syntax(
                        format!("{name} must be applied to a collection, as in Items.{name}(...)"),
                        braces.position,
                    )),
                    None => Err(JsonQlError::syntax(format!("unknown function '{name}'"), braces.position)),
                },
            },
            ExpressionItem::Lambda(lambda) => Err(JsonQlError::syntax(
                "a lambda can only be passed to a collection function",
                lambda.position,
            )),
        }
    }

    /// Operand `i` of an operator expression, compiled.
    pub fn compile_operand(&self, expression: &OperatorExpression, i: usize) -> Result<FunctionRef> {
        let operand = expression.operands.get(i).ok_or_else(|| {
            JsonQlError::syntax(format!("operator '{}' is missing an operand", expression.operator.name), expression.position)
        })?;
        self.compile(operand)
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn lambdas_resolve_innermost_parameter_first() {
        let doc = json!({"A": [1, 2, 3], "B": [2, 3]});
        assert_eq!(eval_json("A.Where(x => Any(B, y => y == x))", doc.clone()), json!([2, 3]));
        assert_eq!(eval_json("A.Select(x => B.Where(x => x > 2))", doc.clone()), json!([3, 3, 3]));
        assert_eq!(eval_json("A.Where((x, i) => i > 0)", doc), json!([2, 3]));
    }

    #[test]
    fn compile_errors_carry_positions() {
        let err = evaluate("Sum(A", json!({})).unwrap_err();
        assert_eq!(err, JsonQlError::syntax("missing closing ')'", Position::new(1, 1)));

        let err = evaluate("A.Where(1)", json!({})).unwrap_err();
        assert_eq!(err.message(), "Where expects a lambda such as x => x > 0");
        assert_eq!(err.position(), Some(Position::new(1, 9)));

        let err = evaluate("Frobnicate(1)", json!({})).unwrap_err();
        assert_eq!(err.message(), "unknown function 'Frobnicate'");

        let err = evaluate("Where(x => x)", json!({})).unwrap_err();
        assert_eq!(err.message(), "Where must be applied to a collection, as in Items.Where(...)");

        let err = evaluate("x => x", json!({})).unwrap_err();
        assert!(err.is_syntax());
    }

    #[test]
    fn grouping_compiles_the_inner_expression() {
        assert_eq!(eval_json("(1 + 2) * 3", json!({})), json!(9));
        assert_eq!(eval_json("(A).First()", json!({"A": [4, 5]})), json!(4));
    }
}
