use crate::context::EvaluationContext;
use crate::errors::{Position, Result};
use crate::evaluated::Evaluated;
use crate::functions::{FunctionKind, JsonFunction};

/// Literal value: `true`, `12.5`, `'text'`, `null`, `undefined`.
#[derive(Debug, Clone)]
pub struct ConstantFunction {
    value: Evaluated,
    position: Position,
}

impl ConstantFunction {
    pub fn new(value: Evaluated, position: Position) -> Self {
        Self { value, position }
    }

    pub fn value(&self) -> &Evaluated {
        &self.value
    }
}

impl JsonFunction for ConstantFunction {
    fn position(&self) -> Position {
        self.position
    }

    fn kind(&self) -> FunctionKind {
        match self.value {
            Evaluated::Boolean(_) => FunctionKind::Boolean,
            Evaluated::Double(_) => FunctionKind::Double,
            Evaluated::String(_) => FunctionKind::String,
            Evaluated::DateTime(_) => FunctionKind::DateTime,
            _ => FunctionKind::Object,
        }
    }

    fn evaluate(&self, _context: &EvaluationContext<'_>) -> Result<Evaluated> {
        Ok(self.value.clone())
    }
}
