//! Path lookups: `A.B[0].Where(x => x > 1).C`.
//!
//! A lookup resolves its start, then folds the remaining steps over the
//! current [`LookupResult`].

use std::sync::Arc;

use tracing::trace;

use crate::comparison::expect_double;
use crate::context::{EvaluationContext, LambdaId};
use crate::errors::{JsonQlError, Position, Result};
use crate::evaluated::Evaluated;
use crate::functions::selectors::CollectionSelector;
use crate::functions::{FunctionKind, FunctionRef, JsonFunction};
use crate::parsed_value::ParsedValue;
use crate::path::JsonPath;

/// Documents searched for the first property of a path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LookupScope {
    /// Current document, then the ancestors closest first.
    All,
    /// `this.X`
    ThisOnly,
    /// `parent.X`
    AncestorsOnly,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParameterBinding {
    Item,
    Index,
}

#[derive(Debug)]
pub enum PathStart {
    Property { name: String, scope: LookupScope },
    /// Root of the current document.
    This,
    /// Root of the closest ancestor.
    Parent,
    Variable { lambda: LambdaId, name: String, binding: ParameterBinding },
    Function(FunctionRef),
}

#[derive(Debug)]
pub enum PathStep {
    Property { name: String, position: Position },
    /// `[i, j]` is `[i][j]`.
    Index { indexes: Vec<FunctionRef>, position: Position },
    Selector { selector: Arc<dyn CollectionSelector>, position: Position },
}

/// Intermediate value of a lookup.
#[derive(Debug, Clone, PartialEq)]
pub enum LookupResult {
    SingleItem(Option<Arc<ParsedValue>>),
    Collection(Vec<Arc<ParsedValue>>),
}

impl LookupResult {
    fn values(&self) -> &[Arc<ParsedValue>] {
        match self {
            LookupResult::SingleItem(Some(value)) => std::slice::from_ref(value),
            LookupResult::SingleItem(None) => &[],
            LookupResult::Collection(items) => items,
        }
    }

    pub fn into_evaluated(self) -> Evaluated {
        match self {
            LookupResult::SingleItem(Some(value)) => Evaluated::Json(value),
            LookupResult::SingleItem(None) => Evaluated::Undefined,
            LookupResult::Collection(items) => Evaluated::Collection(items),
        }
    }

    /// Lookup view of an evaluated value. Scalars are materialized at `path`
    /// so later steps treat them like document values.
    pub fn from_evaluated(value: Evaluated, path: JsonPath) -> Self {
        match value {
            Evaluated::Json(value) => LookupResult::SingleItem(Some(value)),
            Evaluated::Collection(items) => LookupResult::Collection(items),
            Evaluated::Undefined | Evaluated::Null => LookupResult::SingleItem(None),
            scalar => LookupResult::SingleItem(scalar.to_parsed(path)),
        }
    }
}

#[derive(Debug)]
pub struct PathLookupFunction {
    start: PathStart,
    steps: Vec<PathStep>,
    position: Position,
}

impl PathLookupFunction {
    pub fn new(start: PathStart, steps: Vec<PathStep>, position: Position) -> Self {
        Self { start, steps, position }
    }

    fn resolve_start(&self, context: &EvaluationContext<'_>) -> Result<Evaluated> {
        let document = context.document();
        match &self.start {
            PathStart::Property { name, scope } => {
                if *scope != LookupScope::AncestorsOnly {
                    if let Some(value) = document.value.get(name) {
                        return Ok(Evaluated::Json(Arc::clone(value)));
                    }
                }
                if *scope != LookupScope::ThisOnly {
                    for ancestor in &document.ancestors {
                        if let Some(value) = ancestor.value.get(name) {
                            trace!(property = %name, ancestor = %ancestor.document_id, "resolved from ancestor");
                            return Ok(Evaluated::Json(Arc::clone(value)));
                        }
                    }
                }
                Ok(Evaluated::Undefined)
            }
            PathStart::This => Ok(Evaluated::Json(Arc::clone(&document.value))),
            PathStart::Parent => Ok(document
                .ancestors
                .first()
                .map(|a| Evaluated::Json(Arc::clone(&a.value)))
                .unwrap_or(Evaluated::Undefined)),
            PathStart::Variable { lambda, name, binding } => {
                let data = context.binding(*lambda).ok_or_else(|| {
                    JsonQlError::Internal(format!("lambda parameter '{name}' is not bound"))
                })?;
                Ok(match binding {
                    ParameterBinding::Item => Evaluated::Json(Arc::clone(&data.item)),
                    ParameterBinding::Index => Evaluated::Double(data.index as f64),
                })
            }
            PathStart::Function(function) => function.evaluate(context),
        }
    }

    fn apply_step(&self, step: &PathStep, current: LookupResult, context: &EvaluationContext<'_>) -> Result<LookupResult> {
        Ok(match step {
            PathStep::Property { name, .. } => match current {
                LookupResult::SingleItem(Some(value)) => match value.as_ref() {
                    ParsedValue::Array(array) => LookupResult::Collection(property_of_items(&array.values, name)),
                    other => LookupResult::SingleItem(other.get(name).cloned()),
                },
                LookupResult::SingleItem(None) => LookupResult::SingleItem(None),
                LookupResult::Collection(items) => LookupResult::Collection(property_of_items(&items, name)),
            },
            PathStep::Index { indexes, .. } => {
                let mut current = current;
                for index in indexes {
                    let i = evaluate_index(index, context)?;
                    current = LookupResult::SingleItem(match (&current, i) {
                        (_, None) => None,
                        (LookupResult::SingleItem(Some(value)), Some(i)) => {
                            value.as_array().and_then(|values| values.get(i)).cloned()
                        }
                        (LookupResult::SingleItem(None), _) => None,
                        (LookupResult::Collection(items), Some(i)) => items.get(i).cloned(),
                    });
                }
                current
            }
            PathStep::Selector { selector, position } => {
                let items = current.into_evaluated().into_items(selector.name(), *position)?;
                selector.select(items, context)?
            }
        })
    }
}

/// `name` of every item; array items are searched through their own items.
fn property_of_items(items: &[Arc<ParsedValue>], name: &str) -> Vec<Arc<ParsedValue>> {
    let mut found = Vec::new();
    collect_property(items, name, &mut found);
    found
}

fn collect_property(items: &[Arc<ParsedValue>], name: &str, found: &mut Vec<Arc<ParsedValue>>) {
    for item in items {
        match item.as_array() {
            Some(values) => collect_property(values, name, found),
            None => found.extend(item.get(name).cloned()),
        }
    }
}

/// `None` for negative indexes, which never match.
fn evaluate_index(index: &FunctionRef, context: &EvaluationContext<'_>) -> Result<Option<usize>> {
    let value = index.evaluate(context)?;
    let n = expect_double(&value, index.position())?;
    if n.fract() != 0.0 {
        return Err(JsonQlError::evaluation(format!("index must be an integer but was {n}"), index.position()));
    }
    Ok((n >= 0.0).then_some(n as usize))
}

impl JsonFunction for PathLookupFunction {
    fn position(&self) -> Position {
        self.position
    }

    fn kind(&self) -> FunctionKind {
        FunctionKind::PathLookup
    }

    fn evaluate(&self, context: &EvaluationContext<'_>) -> Result<Evaluated> {
        let start = self.resolve_start(context)?;
        // A function start records its own lookups.
        let tracked = !matches!(self.start, PathStart::Function(_));
        if self.steps.is_empty() {
            if tracked {
                context.note_read(&start);
            }
            return Ok(start);
        }
        let mut current = LookupResult::from_evaluated(start, JsonPath::root(context.document().document_id.as_str()));
        for step in &self.steps {
            if tracked {
                context.note_visit(current.values());
            }
            current = self.apply_step(step, current, context)?;
        }
        let result = current.into_evaluated();
        if tracked {
            context.note_read(&result);
        }
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{ContextData, JsonQlOptions};
    use crate::functions::literals::ConstantFunction;
    use crate::parsed_value::RootParsedValue;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn root(id: &str, value: serde_json::Value, parents: &[Arc<RootParsedValue>]) -> Arc<RootParsedValue> {
        Arc::new(RootParsedValue::new(id, Arc::new(ParsedValue::from_json(&value, JsonPath::root(id))), parents))
    }

    fn property(name: &str) -> PathStep {
        PathStep::Property { name: name.to_string(), position: Position::START }
    }

    fn index(i: f64) -> PathStep {
        PathStep::Index {
            indexes: vec![Arc::new(ConstantFunction::new(Evaluated::Double(i), Position::START))],
            position: Position::START,
        }
    }

    fn lookup(start: PathStart, steps: Vec<PathStep>, document: &RootParsedValue) -> Result<Evaluated> {
        let options = JsonQlOptions::default();
        PathLookupFunction::new(start, steps, Position::START).evaluate(&EvaluationContext::new(document, &options))
    }

    fn start(name: &str, scope: LookupScope) -> PathStart {
        PathStart::Property { name: name.to_string(), scope }
    }

    fn to_json(value: Evaluated) -> serde_json::Value {
        match value {
            Evaluated::Json(v) => v.to_json(),
            Evaluated::Collection(items) => serde_json::Value::Array(items.iter().map(|i| i.to_json()).collect()),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn nearest_document_wins() {
        let grand = root("g", json!({"A": 1, "G": "g"}), &[]);
        let parent = root("p", json!({"A": 2}), &[grand]);
        let child = root("c", json!({"B": 3}), &[parent]);

        assert_eq!(to_json(lookup(start("A", LookupScope::All), vec![], &child).unwrap()), json!(2));
        assert_eq!(to_json(lookup(start("G", LookupScope::All), vec![], &child).unwrap()), json!("g"));
        assert_eq!(lookup(start("A", LookupScope::ThisOnly), vec![], &child).unwrap(), Evaluated::Undefined);
        assert_eq!(lookup(start("B", LookupScope::AncestorsOnly), vec![], &child).unwrap(), Evaluated::Undefined);
        assert_eq!(to_json(lookup(PathStart::Parent, vec![property("A")], &child).unwrap()), json!(2));
    }

    #[test]
    fn steps_walk_objects_and_arrays() {
        let doc = root("d", json!({"A": [{"B": [10, 20]}, {"B": [30]}, {"C": 1}]}), &[]);
        assert_eq!(
            to_json(lookup(start("A", LookupScope::All), vec![index(0.0), property("B"), index(1.0)], &doc).unwrap()),
            json!(20)
        );
        assert_eq!(
            to_json(lookup(start("A", LookupScope::All), vec![property("B")], &doc).unwrap()),
            json!([[10, 20], [30]])
        );
        assert_eq!(
            lookup(start("A", LookupScope::All), vec![index(5.0)], &doc).unwrap(),
            Evaluated::Undefined
        );
        assert_eq!(
            lookup(start("A", LookupScope::All), vec![index(-1.0)], &doc).unwrap(),
            Evaluated::Undefined
        );
        assert_eq!(
            lookup(start("Missing", LookupScope::All), vec![property("X"), index(0.0)], &doc).unwrap(),
            Evaluated::Undefined
        );
    }

    #[test]
    fn properties_reach_through_nested_arrays() {
        let doc = root("d", json!({"A": [{"L": [{"X": 1}, {"X": 2}]}, {"L": [{"X": 3}]}, {"L": [[{"X": 4}]]}]}), &[]);
        assert_eq!(
            to_json(lookup(start("A", LookupScope::All), vec![property("L"), property("X")], &doc).unwrap()),
            json!([1, 2, 3, 4])
        );
        let matrix = root("m", json!({"M": [[{"X": 1}], [{"X": 2}, {"Y": 3}]]}), &[]);
        assert_eq!(to_json(lookup(start("M", LookupScope::All), vec![property("X")], &matrix).unwrap()), json!([1, 2]));
    }

    #[test]
    fn fractional_index_is_an_error() {
        let doc = root("d", json!({"A": [1]}), &[]);
        let err = lookup(start("A", LookupScope::All), vec![index(0.5)], &doc).unwrap_err();
        assert_eq!(err.message(), "index must be an integer but was 0.5");
    }

    #[test]
    fn variables_read_the_active_binding() {
        let doc = root("d", json!({"A": [{"X": 7}]}), &[]);
        let options = JsonQlOptions::default();
        let lambda = LambdaId::next();
        let item = Arc::clone(&doc.value.get("A").unwrap().as_array().unwrap()[0]);
        let ctx = EvaluationContext::new(&doc, &options).with_binding(lambda, ContextData { item, index: 4 });

        let x = PathLookupFunction::new(
            PathStart::Variable { lambda, name: "x".into(), binding: ParameterBinding::Item },
            vec![property("X")],
            Position::START,
        );
        assert_eq!(to_json(x.evaluate(&ctx).unwrap()), json!(7));

        let i = PathLookupFunction::new(
            PathStart::Variable { lambda, name: "i".into(), binding: ParameterBinding::Index },
            vec![],
            Position::START,
        );
        assert_eq!(i.evaluate(&ctx).unwrap(), Evaluated::Double(4.0));
    }
}
