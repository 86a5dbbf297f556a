//! Aggregate functions: one fold loop, per-function accumulator.

use std::ops::RangeInclusive;

use crate::comparison::{expect_boolean, expect_double};
use crate::context::EvaluationContext;
use crate::errors::{Position, Result};
use crate::evaluated::Evaluated;
use crate::functions::{CompiledLambda, FunctionKind, FunctionRef, JsonFunction};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregateKind {
    Count,
    Any,
    All,
    Sum,
    Average,
    Min,
    Max,
}

impl AggregateKind {
    pub fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "Count" => Self::Count,
            "Any" => Self::Any,
            "All" => Self::All,
            "Sum" => Self::Sum,
            "Average" => Self::Average,
            "Min" => Self::Min,
            "Max" => Self::Max,
            _ => return None,
        })
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Count => "Count",
            Self::Any => "Any",
            Self::All => "All",
            Self::Sum => "Sum",
            Self::Average => "Average",
            Self::Min => "Min",
            Self::Max => "Max",
        }
    }

    /// Collection plus an optional lambda; `All` needs its predicate.
    pub fn arity(self) -> RangeInclusive<usize> {
        match self {
            Self::All => 2..=2,
            _ => 1..=2,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Continue,
    Stop,
}

#[derive(Debug)]
enum Accumulator {
    Count(usize),
    Any(bool),
    All(bool),
    Sum(f64),
    Average { sum: f64, count: usize },
    Extreme { best: Option<f64>, max: bool },
}

impl Accumulator {
    fn new(kind: AggregateKind) -> Self {
        match kind {
            AggregateKind::Count => Accumulator::Count(0),
            AggregateKind::Any => Accumulator::Any(false),
            AggregateKind::All => Accumulator::All(true),
            AggregateKind::Sum => Accumulator::Sum(0.0),
            AggregateKind::Average => Accumulator::Average { sum: 0.0, count: 0 },
            AggregateKind::Min => Accumulator::Extreme { best: None, max: false },
            AggregateKind::Max => Accumulator::Extreme { best: None, max: true },
        }
    }

    fn accumulate(&mut self, value: &Evaluated, position: Position) -> Result<Flow> {
        match self {
            Accumulator::Count(count) => {
                if expect_boolean(value, position)? {
                    *count += 1;
                }
            }
            Accumulator::Any(found) => {
                if expect_boolean(value, position)? {
                    *found = true;
                    return Ok(Flow::Stop);
                }
            }
            Accumulator::All(all) => {
                if !expect_boolean(value, position)? {
                    *all = false;
                    return Ok(Flow::Stop);
                }
            }
            Accumulator::Sum(sum) => *sum += expect_double(value, position)?,
            Accumulator::Average { sum, count } => {
                *sum += expect_double(value, position)?;
                *count += 1;
            }
            Accumulator::Extreme { best, max } => {
                let d = expect_double(value, position)?;
                let better = match *best {
                    None => true,
                    Some(b) if *max => d > b,
                    Some(b) => d < b,
                };
                if better {
                    *best = Some(d);
                }
            }
        }
        Ok(Flow::Continue)
    }

    fn finish(self) -> Evaluated {
        match self {
            Accumulator::Count(count) => Evaluated::Double(count as f64),
            Accumulator::Any(b) | Accumulator::All(b) => Evaluated::Boolean(b),
            Accumulator::Sum(sum) => Evaluated::Double(sum),
            Accumulator::Average { count: 0, .. } => Evaluated::Undefined,
            Accumulator::Average { sum, count } => Evaluated::Double(sum / count as f64),
            Accumulator::Extreme { best, .. } => best.map(Evaluated::Double).unwrap_or(Evaluated::Undefined),
        }
    }
}

#[derive(Debug)]
pub struct AggregateFunction {
    kind: AggregateKind,
    collection: FunctionRef,
    lambda: Option<CompiledLambda>,
    position: Position,
}

impl AggregateFunction {
    pub fn new(kind: AggregateKind, collection: FunctionRef, lambda: Option<CompiledLambda>, position: Position) -> Self {
        Self { kind, collection, lambda, position }
    }
}

impl JsonFunction for AggregateFunction {
    fn position(&self) -> Position {
        self.position
    }

    fn kind(&self) -> FunctionKind {
        match self.kind {
            AggregateKind::Count | AggregateKind::Sum => FunctionKind::Double,
            AggregateKind::Any | AggregateKind::All => FunctionKind::Boolean,
            AggregateKind::Average | AggregateKind::Min | AggregateKind::Max => FunctionKind::Object,
        }
    }

    fn evaluate(&self, context: &EvaluationContext<'_>) -> Result<Evaluated> {
        let items = self.collection.evaluate(context)?.into_items(self.kind.name(), self.collection.position())?;

        match (&self.lambda, self.kind) {
            (None, AggregateKind::Count) => return Ok(Evaluated::Double(items.len() as f64)),
            (None, AggregateKind::Any) => return Ok(Evaluated::Boolean(!items.is_empty())),
            _ => {}
        }

        let mut accumulator = Accumulator::new(self.kind);
        for (index, item) in items.iter().enumerate() {
            let (value, position) = match &self.lambda {
                Some(lambda) => (lambda.invoke(item, index, context)?, lambda.body.position()),
                None => (Evaluated::Json(item.clone()), self.collection.position()),
            };
            if accumulator.accumulate(&value, position)? == Flow::Stop {
                break;
            }
        }
        Ok(accumulator.finish())
    }
}
