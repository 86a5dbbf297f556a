//! Compiled, evaluable function tree.
//!
//! Every node is built once while an expression is compiled and evaluated
//! any number of times afterwards; evaluation never mutates a node.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, FixedOffset};

use crate::comparison::{expect_boolean, expect_date_time, expect_double, expect_string, ExpectedType};
use crate::context::{ContextData, EvaluationContext, LambdaId};
use crate::errors::{Position, Result};
use crate::evaluated::Evaluated;
use crate::parsed_value::ParsedValue;

pub mod aggregates;
pub mod builtins;
pub mod literals;
pub mod operators;
pub mod path;
pub mod selectors;

/// Static result type of a function.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FunctionKind {
    Object,
    Boolean,
    Double,
    String,
    DateTime,
    PathLookup,
}

impl FunctionKind {
    pub fn expected_type(self) -> Option<ExpectedType> {
        match self {
            FunctionKind::Boolean => Some(ExpectedType::Boolean),
            FunctionKind::Double => Some(ExpectedType::Number),
            FunctionKind::String => Some(ExpectedType::String),
            FunctionKind::DateTime => Some(ExpectedType::DateTime),
            FunctionKind::Object | FunctionKind::PathLookup => None,
        }
    }
}

pub trait JsonFunction: fmt::Debug + Send + Sync {
    fn position(&self) -> Position;

    fn kind(&self) -> FunctionKind {
        FunctionKind::Object
    }

    fn evaluate(&self, context: &EvaluationContext<'_>) -> Result<Evaluated>;

    fn evaluate_boolean(&self, context: &EvaluationContext<'_>) -> Result<bool> {
        expect_boolean(&self.evaluate(context)?, self.position())
    }

    fn evaluate_double(&self, context: &EvaluationContext<'_>) -> Result<f64> {
        expect_double(&self.evaluate(context)?, self.position())
    }

    fn evaluate_string(&self, context: &EvaluationContext<'_>) -> Result<String> {
        expect_string(&self.evaluate(context)?, self.position())
    }

    fn evaluate_date_time(&self, context: &EvaluationContext<'_>) -> Result<DateTime<FixedOffset>> {
        expect_date_time(&self.evaluate(context)?, self.position(), context.options())
    }
}

pub type FunctionRef = Arc<dyn JsonFunction>;

/// Lambda argument of a collection or aggregate function.
#[derive(Debug, Clone)]
pub struct CompiledLambda {
    pub id: LambdaId,
    pub parameters: Vec<String>,
    pub body: FunctionRef,
    pub position: Position,
}

impl CompiledLambda {
    /// Evaluates the body with the lambda's parameters bound to `item` and `index`.
    pub fn invoke(&self, item: &Arc<ParsedValue>, index: usize, context: &EvaluationContext<'_>) -> Result<Evaluated> {
        let scoped = context.with_binding(self.id, ContextData { item: Arc::clone(item), index });
        self.body.evaluate(&scoped)
    }

    /// Predicate form of [`invoke`](Self::invoke).
    pub fn test(&self, item: &Arc<ParsedValue>, index: usize, context: &EvaluationContext<'_>) -> Result<bool> {
        let value = self.invoke(item, index, context)?;
        expect_boolean(&value, self.body.position())
    }
}
