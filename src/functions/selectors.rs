//! Collection selectors applied as path steps: `A.Where(x => x > 1)`.

use std::fmt;
use std::sync::Arc;

use itertools::Itertools;

use crate::comparison::expect_double;
use crate::context::EvaluationContext;
use crate::errors::{JsonQlError, Result};
use crate::evaluated::Evaluated;
use crate::functions::path::LookupResult;
use crate::functions::{CompiledLambda, FunctionRef};
use crate::parsed_value::ParsedValue;

pub mod names {
    pub const WHERE: &str = "Where";
    pub const SELECT: &str = "Select";
    pub const FIRST: &str = "First";
    pub const LAST: &str = "Last";
    pub const FLATTEN: &str = "Flatten";
    pub const AT: &str = "At";
    pub const REVERSE: &str = "Reverse";
    pub const DISTINCT: &str = "Distinct";

    pub const ALL: &[&str] = &[WHERE, SELECT, FIRST, LAST, FLATTEN, AT, REVERSE, DISTINCT];
}

/// One step that turns a sequence of items into a lookup result.
pub trait CollectionSelector: fmt::Debug + Send + Sync {
    fn name(&self) -> &str;

    fn select(&self, items: Vec<Arc<ParsedValue>>, context: &EvaluationContext<'_>) -> Result<LookupResult>;
}

#[derive(Debug)]
pub struct WhereSelector {
    predicate: CompiledLambda,
}

impl WhereSelector {
    pub fn new(predicate: CompiledLambda) -> Self {
        Self { predicate }
    }
}

impl CollectionSelector for WhereSelector {
    fn name(&self) -> &str {
        names::WHERE
    }

    fn select(&self, items: Vec<Arc<ParsedValue>>, context: &EvaluationContext<'_>) -> Result<LookupResult> {
        let mut selected = Vec::new();
        for (index, item) in items.into_iter().enumerate() {
            if self.predicate.test(&item, index, context)? {
                selected.push(item);
            }
        }
        Ok(LookupResult::Collection(selected))
    }
}

/// Projection; arrays and collections returned by the projector are spliced
/// in, one level deep.
#[derive(Debug)]
pub struct SelectSelector {
    projector: CompiledLambda,
}

impl SelectSelector {
    pub fn new(projector: CompiledLambda) -> Self {
        Self { projector }
    }
}

impl CollectionSelector for SelectSelector {
    fn name(&self) -> &str {
        names::SELECT
    }

    fn select(&self, items: Vec<Arc<ParsedValue>>, context: &EvaluationContext<'_>) -> Result<LookupResult> {
        let mut projected = Vec::with_capacity(items.len());
        for (index, item) in items.iter().enumerate() {
            match self.projector.invoke(item, index, context)? {
                Evaluated::Undefined => {}
                Evaluated::Json(value) => match value.as_array() {
                    Some(values) => projected.extend(values.iter().cloned()),
                    None => projected.push(value),
                },
                Evaluated::Collection(values) => projected.extend(values),
                scalar => projected.extend(scalar.to_parsed(item.path().clone())),
            }
        }
        Ok(LookupResult::Collection(projected))
    }
}

#[derive(Debug)]
pub struct FirstSelector {
    predicate: Option<CompiledLambda>,
    last: bool,
}

impl FirstSelector {
    pub fn first(predicate: Option<CompiledLambda>) -> Self {
        Self { predicate, last: false }
    }

    pub fn last(predicate: Option<CompiledLambda>) -> Self {
        Self { predicate, last: true }
    }
}

impl CollectionSelector for FirstSelector {
    fn name(&self) -> &str {
        if self.last {
            names::LAST
        } else {
            names::FIRST
        }
    }

    fn select(&self, items: Vec<Arc<ParsedValue>>, context: &EvaluationContext<'_>) -> Result<LookupResult> {
        let indexed: Box<dyn Iterator<Item = (usize, Arc<ParsedValue>)>> = if self.last {
            Box::new(items.into_iter().enumerate().rev())
        } else {
            Box::new(items.into_iter().enumerate())
        };
        for (index, item) in indexed {
            let matches = match &self.predicate {
                Some(predicate) => predicate.test(&item, index, context)?,
                None => true,
            };
            if matches {
                return Ok(LookupResult::SingleItem(Some(item)));
            }
        }
        Ok(LookupResult::SingleItem(None))
    }
}

/// Splices array items into the sequence, one level deep.
#[derive(Debug, Default)]
pub struct FlattenSelector;

impl CollectionSelector for FlattenSelector {
    fn name(&self) -> &str {
        names::FLATTEN
    }

    fn select(&self, items: Vec<Arc<ParsedValue>>, _context: &EvaluationContext<'_>) -> Result<LookupResult> {
        let flattened = items
            .into_iter()
            .flat_map(|item| match item.as_array() {
                Some(values) => values.to_vec(),
                None => vec![item],
            })
            .collect();
        Ok(LookupResult::Collection(flattened))
    }
}

/// `At(i, j)`: item `i`, then item `j` of that item.
#[derive(Debug)]
pub struct AtSelector {
    indexes: Vec<FunctionRef>,
}

impl AtSelector {
    pub fn new(indexes: Vec<FunctionRef>) -> Self {
        Self { indexes }
    }
}

impl CollectionSelector for AtSelector {
    fn name(&self) -> &str {
        names::AT
    }

    fn select(&self, items: Vec<Arc<ParsedValue>>, context: &EvaluationContext<'_>) -> Result<LookupResult> {
        let mut current: Option<Arc<ParsedValue>> = None;
        for (depth, index) in self.indexes.iter().enumerate() {
            let n = expect_double(&index.evaluate(context)?, index.position())?;
            if n.fract() != 0.0 {
                return Err(JsonQlError::evaluation(
                    format!("index must be an integer but was {n}"),
                    index.position(),
                ));
            }
            if n < 0.0 {
                return Ok(LookupResult::SingleItem(None));
            }
            let i = n as usize;
            current = if depth == 0 {
                items.get(i).cloned()
            } else {
                current.as_deref().and_then(ParsedValue::as_array).and_then(|values| values.get(i)).cloned()
            };
            if current.is_none() {
                break;
            }
        }
        Ok(LookupResult::SingleItem(current))
    }
}

#[derive(Debug, Default)]
pub struct ReverseSelector;

impl CollectionSelector for ReverseSelector {
    fn name(&self) -> &str {
        names::REVERSE
    }

    fn select(&self, mut items: Vec<Arc<ParsedValue>>, _context: &EvaluationContext<'_>) -> Result<LookupResult> {
        items.reverse();
        Ok(LookupResult::Collection(items))
    }
}

/// Keeps the first occurrence of every distinct JSON value.
#[derive(Debug, Default)]
pub struct DistinctSelector;

impl CollectionSelector for DistinctSelector {
    fn name(&self) -> &str {
        names::DISTINCT
    }

    fn select(&self, items: Vec<Arc<ParsedValue>>, _context: &EvaluationContext<'_>) -> Result<LookupResult> {
        let distinct = items.into_iter().unique_by(|item| item.to_json().to_string()).collect();
        Ok(LookupResult::Collection(distinct))
    }
}
