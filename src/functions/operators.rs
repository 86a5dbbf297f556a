use std::cmp::Ordering;

use crate::comparison::{
    compare_values, expect_boolean, expect_double, expect_string, to_comparable, try_convert, values_equal, Comparable,
};
use crate::context::EvaluationContext;
use crate::errors::{JsonQlError, Position, Result};
use crate::evaluated::Evaluated;
use crate::functions::{FunctionKind, FunctionRef, JsonFunction};
use crate::language::operators as names;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOperator {
    Add,
    Subtract,
    Multiply,
    Divide,
    Modulo,
    Equal,
    NotEqual,
    Less,
    LessOrEqual,
    Greater,
    GreaterOrEqual,
    And,
    Or,
}

impl BinaryOperator {
    pub fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            names::ADD => Self::Add,
            names::SUBTRACT => Self::Subtract,
            names::MULTIPLY => Self::Multiply,
            names::DIVIDE => Self::Divide,
            names::MODULO => Self::Modulo,
            names::EQUAL => Self::Equal,
            names::NOT_EQUAL => Self::NotEqual,
            names::LESS => Self::Less,
            names::LESS_OR_EQUAL => Self::LessOrEqual,
            names::GREATER => Self::Greater,
            names::GREATER_OR_EQUAL => Self::GreaterOrEqual,
            names::AND => Self::And,
            names::OR => Self::Or,
            _ => return None,
        })
    }

    fn kind(self) -> FunctionKind {
        match self {
            Self::Add => FunctionKind::Object,
            Self::Subtract | Self::Multiply | Self::Divide | Self::Modulo => FunctionKind::Double,
            _ => FunctionKind::Boolean,
        }
    }
}

#[derive(Debug)]
pub struct BinaryOperatorFunction {
    operator: BinaryOperator,
    left: FunctionRef,
    right: FunctionRef,
    position: Position,
}

impl BinaryOperatorFunction {
    pub fn new(operator: BinaryOperator, left: FunctionRef, right: FunctionRef, position: Position) -> Self {
        Self { operator, left, right, position }
    }

    fn arithmetic(&self, left: &Evaluated, right: &Evaluated) -> Result<Evaluated> {
        let a = expect_double(left, self.left.position())?;
        let b = expect_double(right, self.right.position())?;
        let result = match self.operator {
            BinaryOperator::Add => a + b,
            BinaryOperator::Subtract => a - b,
            BinaryOperator::Multiply => a * b,
            BinaryOperator::Divide | BinaryOperator::Modulo if b == 0.0 => {
                return Err(JsonQlError::evaluation("division by zero", self.position));
            }
            BinaryOperator::Divide => a / b,
            BinaryOperator::Modulo => a % b,
            _ => return Err(JsonQlError::Internal(format!("{:?} is not arithmetic", self.operator))),
        };
        Ok(Evaluated::Double(result))
    }

    fn add(&self, left: &Evaluated, right: &Evaluated) -> Result<Evaluated> {
        let is_text = |v: &Evaluated| matches!(to_comparable(v), Some(Comparable::String(_)));
        if is_text(left) || is_text(right) {
            let mut text = expect_string(left, self.left.position())?;
            text.push_str(&expect_string(right, self.right.position())?);
            return Ok(Evaluated::String(text));
        }
        self.arithmetic(left, right)
    }
}

impl JsonFunction for BinaryOperatorFunction {
    fn position(&self) -> Position {
        self.position
    }

    fn kind(&self) -> FunctionKind {
        self.operator.kind()
    }

    fn evaluate(&self, context: &EvaluationContext<'_>) -> Result<Evaluated> {
        match self.operator {
            BinaryOperator::And => {
                if !self.left.evaluate_boolean(context)? {
                    return Ok(false.into());
                }
                return Ok(self.right.evaluate_boolean(context)?.into());
            }
            BinaryOperator::Or => {
                if self.left.evaluate_boolean(context)? {
                    return Ok(true.into());
                }
                return Ok(self.right.evaluate_boolean(context)?.into());
            }
            _ => {}
        }

        let left = self.left.evaluate(context)?;
        let right = self.right.evaluate(context)?;
        let options = context.options();
        let ordering = |expected: &[Ordering]| -> Result<Evaluated> {
            let ord = compare_values(&left, &right, self.position, options)?;
            Ok(expected.contains(&ord).into())
        };
        match self.operator {
            BinaryOperator::Equal => Ok(values_equal(&left, &right, options).into()),
            BinaryOperator::NotEqual => Ok((!values_equal(&left, &right, options)).into()),
            BinaryOperator::Less => ordering(&[Ordering::Less]),
            BinaryOperator::LessOrEqual => ordering(&[Ordering::Less, Ordering::Equal]),
            BinaryOperator::Greater => ordering(&[Ordering::Greater]),
            BinaryOperator::GreaterOrEqual => ordering(&[Ordering::Greater, Ordering::Equal]),
            BinaryOperator::Add => self.add(&left, &right),
            _ => self.arithmetic(&left, &right),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrefixOperator {
    Negate,
    Not,
}

#[derive(Debug)]
pub struct PrefixOperatorFunction {
    operator: PrefixOperator,
    operand: FunctionRef,
    position: Position,
}

impl PrefixOperatorFunction {
    pub fn new(operator: PrefixOperator, operand: FunctionRef, position: Position) -> Self {
        Self { operator, operand, position }
    }
}

impl JsonFunction for PrefixOperatorFunction {
    fn position(&self) -> Position {
        self.position
    }

    fn kind(&self) -> FunctionKind {
        match self.operator {
            PrefixOperator::Negate => FunctionKind::Double,
            PrefixOperator::Not => FunctionKind::Boolean,
        }
    }

    fn evaluate(&self, context: &EvaluationContext<'_>) -> Result<Evaluated> {
        let value = self.operand.evaluate(context)?;
        match self.operator {
            PrefixOperator::Negate => Ok(Evaluated::Double(-expect_double(&value, self.operand.position())?)),
            PrefixOperator::Not => Ok(Evaluated::Boolean(!expect_boolean(&value, self.operand.position())?)),
        }
    }
}

/// Postfix `assert`: fails when the operand has no value.
#[derive(Debug)]
pub struct AssertFunction {
    operand: FunctionRef,
    position: Position,
}

impl AssertFunction {
    pub fn new(operand: FunctionRef, position: Position) -> Self {
        Self { operand, position }
    }
}

impl JsonFunction for AssertFunction {
    fn position(&self) -> Position {
        self.position
    }

    fn kind(&self) -> FunctionKind {
        self.operand.kind()
    }

    fn evaluate(&self, context: &EvaluationContext<'_>) -> Result<Evaluated> {
        let value = self.operand.evaluate(context)?;
        match &value {
            v if v.is_no_value() => Err(JsonQlError::evaluation(
                format!("assertion failed: value is {}", v.describe()),
                self.position,
            )),
            Evaluated::Collection(items) if items.is_empty() => {
                Err(JsonQlError::evaluation("assertion failed: collection is empty", self.position))
            }
            _ => Ok(value),
        }
    }
}

/// `value : default`
#[derive(Debug)]
pub struct DefaultValueFunction {
    value: FunctionRef,
    default: FunctionRef,
    position: Position,
}

impl DefaultValueFunction {
    pub fn new(value: FunctionRef, default: FunctionRef, position: Position) -> Self {
        Self { value, default, position }
    }
}

impl JsonFunction for DefaultValueFunction {
    fn position(&self) -> Position {
        self.position
    }

    fn kind(&self) -> FunctionKind {
        match self.default.kind() {
            FunctionKind::Object | FunctionKind::PathLookup => self.value.kind(),
            typed => typed,
        }
    }

    fn evaluate(&self, context: &EvaluationContext<'_>) -> Result<Evaluated> {
        let value = self.value.evaluate(context)?;
        if value.is_no_value() {
            return self.default.evaluate(context);
        }
        match self.default.kind().expected_type() {
            Some(expected) => match try_convert(&value, expected, context.options()) {
                Some(converted) => Ok(converted),
                None => self.default.evaluate(context),
            },
            None => Ok(value),
        }
    }
}
