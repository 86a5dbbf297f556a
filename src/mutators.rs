//! Compile-time rewrites of a document: `$copyFields`, `$merge(...)`,
//! `$value(...)` and `$(...)` string interpolation.
//!
//! Mutators are taken group by group (copy-fields, merge, value,
//! interpolation), each group in document order. Every mutator is evaluated
//! against a snapshot of the document as rewritten so far. A mutator that
//! reads a location another mutator has yet to rewrite waits for a later
//! round. When a round makes no progress the waiting mutators form a
//! reference cycle and each of them fails.

use std::sync::Arc;

use tracing::{trace, warn};

use crate::comparison::to_display_text;
use crate::context::{EvaluationContext, JsonQlOptions, PendingValues};
use crate::errors::{CompilationError, JsonQlError, Position, Result};
use crate::evaluated::Evaluated;
use crate::factories::FunctionCompiler;
use crate::functions::FunctionRef;
use crate::json_reader::{JsonArena, NodeId, NodeKind, Slot};
use crate::parsed_value::{ParsedValue, RootParsedValue};
use crate::path::JsonPath;

pub const VALUE_PREFIX: &str = "$value(";
pub const MERGE_PREFIX: &str = "$merge(";
pub const COPY_FIELDS: &str = "$copyFields";
pub const INTERPOLATION_START: &str = "$(";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Group {
    CopyFields,
    Merge,
    Value,
    Interpolation,
}

#[derive(Debug)]
enum Segment {
    Text(String),
    Expression(FunctionRef),
}

#[derive(Debug)]
enum Action {
    CopyFields(FunctionRef),
    Merge(FunctionRef),
    Value(FunctionRef),
    Interpolation(Vec<Segment>),
}

impl Action {
    fn group(&self) -> Group {
        match self {
            Action::CopyFields(_) => Group::CopyFields,
            Action::Merge(_) => Group::Merge,
            Action::Value(_) => Group::Value,
            Action::Interpolation(_) => Group::Interpolation,
        }
    }

    /// Position of the (first) expression.
    fn expression_position(&self) -> Option<Position> {
        match self {
            Action::CopyFields(function) | Action::Merge(function) | Action::Value(function) => {
                Some(function.position())
            }
            Action::Interpolation(segments) => segments.iter().find_map(|segment| match segment {
                Segment::Expression(function) => Some(function.position()),
                Segment::Text(_) => None,
            }),
        }
    }
}

#[derive(Debug)]
struct Mutator {
    node: NodeId,
    action: Action,
}

/// Raw piece of an interpolated string; `offset` counts characters.
#[derive(Debug, PartialEq)]
enum RawSegment<'a> {
    Text(&'a str),
    Expression { text: &'a str, offset: usize },
}

/// Byte index of the `)` closing the `(` at byte index `open`. Parentheses
/// inside quoted text are ignored.
fn closing_paren(text: &str, open: usize) -> Option<usize> {
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    let mut escaped = false;
    for (i, c) in text[open..].char_indices() {
        if let Some(q) = quote {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                _ if c == q => quote = None,
                _ => {}
            }
            continue;
        }
        match c {
            '\'' | '"' => quote = Some(c),
            '(' => depth += 1,
            ')' => {
                depth -= 1;
                if depth == 0 {
                    return Some(open + i);
                }
            }
            _ => {}
        }
    }
    None
}

/// Expression of a whole-string call such as `$value(A.B)`.
fn call_expression<'a>(text: &'a str, prefix: &str) -> Option<&'a str> {
    if !text.starts_with(prefix) {
        return None;
    }
    let open = prefix.len() - 1;
    match closing_paren(text, open) {
        Some(close) if close == text.len() - 1 => Some(&text[prefix.len()..close]),
        _ => None,
    }
}

fn split_interpolation(text: &str) -> std::result::Result<Vec<RawSegment<'_>>, usize> {
    let mut segments = Vec::new();
    let mut rest_start = 0;
    while let Some(found) = text[rest_start..].find(INTERPOLATION_START) {
        let start = rest_start + found;
        if start > rest_start {
            segments.push(RawSegment::Text(&text[rest_start..start]));
        }
        let open = start + 1;
        let close = closing_paren(text, open).ok_or(text[..start].chars().count())?;
        let expression_start = open + 1;
        segments.push(RawSegment::Expression {
            text: &text[expression_start..close],
            offset: text[..expression_start].chars().count(),
        });
        rest_start = close + 1;
    }
    if rest_start < text.len() {
        segments.push(RawSegment::Text(&text[rest_start..]));
    }
    Ok(segments)
}

fn detect(arena: &JsonArena, compiler: &FunctionCompiler) -> std::result::Result<Vec<Mutator>, Vec<JsonQlError>> {
    let mut mutators = Vec::new();
    let mut errors: Vec<JsonQlError> = Vec::new();
    let compile = |text: &str, origin: Position, errors: &mut Vec<JsonQlError>| -> Option<FunctionRef> {
        compiler.compile_expression(text, origin).map_err(|e| errors.push(e)).ok()
    };

    for id in arena.document_order() {
        let node = arena.node(id);
        let slot = arena.slot_of(id);
        if let Some(Slot::Property { name, .. }) = &slot {
            if name == COPY_FIELDS {
                match &node.kind {
                    NodeKind::Scalar { text, quoted: true } => {
                        if let Some(function) = compile(text, node.text_position(0), &mut errors) {
                            mutators.push(Mutator { node: id, action: Action::CopyFields(function) });
                        }
                    }
                    _ => errors.push(JsonQlError::syntax(
                        format!("{COPY_FIELDS} expects an expression string"),
                        node.position,
                    )),
                }
                continue;
            }
        }
        let NodeKind::Scalar { text, quoted: true } = &node.kind else {
            continue;
        };
        if let Some(prefix) = [VALUE_PREFIX, MERGE_PREFIX].into_iter().find(|p| text.starts_with(p)) {
            if closing_paren(text, prefix.len() - 1).is_none() {
                errors.push(JsonQlError::syntax(
                    format!("missing closing ')' in {}", &prefix[..prefix.len() - 1]),
                    node.text_position(prefix.len() - 1),
                ));
                continue;
            }
        }
        if let Some(expression) = call_expression(text, VALUE_PREFIX) {
            let origin = node.text_position(VALUE_PREFIX.len());
            if let Some(function) = compile(expression, origin, &mut errors) {
                mutators.push(Mutator { node: id, action: Action::Value(function) });
            }
        } else if let Some(expression) = call_expression(text, MERGE_PREFIX) {
            if !matches!(slot, Some(Slot::Item { .. })) {
                errors.push(JsonQlError::syntax("$merge can only be used as an array item", node.position));
                continue;
            }
            let origin = node.text_position(MERGE_PREFIX.len());
            if let Some(function) = compile(expression, origin, &mut errors) {
                mutators.push(Mutator { node: id, action: Action::Merge(function) });
            }
        } else if text.contains(INTERPOLATION_START) {
            let raw = match split_interpolation(text) {
                Ok(raw) => raw,
                Err(offset) => {
                    errors.push(JsonQlError::syntax(
                        "missing closing ')' in interpolation",
                        node.text_position(offset),
                    ));
                    continue;
                }
            };
            let mut segments = Vec::with_capacity(raw.len());
            for segment in raw {
                match segment {
                    RawSegment::Text(t) => segments.push(Segment::Text(t.to_string())),
                    RawSegment::Expression { text, offset } => {
                        if let Some(function) = compile(text, node.text_position(offset), &mut errors) {
                            segments.push(Segment::Expression(function));
                        }
                    }
                }
            }
            mutators.push(Mutator { node: id, action: Action::Interpolation(segments) });
        }
    }

    if errors.is_empty() {
        mutators.sort_by_key(|m| m.action.group());
        Ok(mutators)
    } else {
        Err(errors)
    }
}

/// Applies a document's mutators.
///
/// `Err` carries syntax errors, which abort the document; `Ok` carries the
/// evaluation errors of mutators that failed while the rest were applied.
pub(crate) fn apply_mutators(
    arena: &mut JsonArena,
    document_id: &str,
    parents: &[Arc<RootParsedValue>],
    compiler: &FunctionCompiler,
    options: &JsonQlOptions,
) -> std::result::Result<Vec<CompilationError>, Vec<CompilationError>> {
    let to_entries = |errors: Vec<JsonQlError>| -> Vec<CompilationError> {
        errors.iter().map(|e| CompilationError::from_error(document_id, e)).collect()
    };
    let mutators = detect(arena, compiler).map_err(to_entries)?;

    let mut applier = Applier { arena, document_id, parents, options, snapshot: None };
    let mut errors = Vec::new();
    let mut record = |result: Result<()>| {
        if let Err(error) = result {
            warn!(document = document_id, %error, "mutator failed");
            errors.push(CompilationError::from_error(document_id, &error));
        }
    };

    let mut waiting: Vec<&Mutator> = mutators.iter().collect();
    while !waiting.is_empty() {
        let mut deferred: Vec<&Mutator> = Vec::new();
        for (i, mutator) in waiting.iter().enumerate() {
            if !applier.arena.is_attached(mutator.node) {
                trace!(document = document_id, "mutator target was removed");
                continue;
            }
            let pending = PendingValues::new(applier.pending_paths(deferred.iter().chain(&waiting[i + 1..])));
            trace!(document = document_id, group = ?mutator.action.group(), "applying mutator");
            let computed = applier.compute(mutator, &pending);
            if pending.was_read() {
                trace!(document = document_id, "mutator waits for values that are not evaluated yet");
                deferred.push(*mutator);
                continue;
            }
            record(applier.write(mutator, computed));
        }
        if !deferred.is_empty() && deferred.len() == waiting.len() {
            for mutator in deferred.drain(..) {
                if !applier.arena.is_attached(mutator.node) {
                    continue;
                }
                let position = mutator.action.expression_position().unwrap_or(applier.arena.node(mutator.node).position);
                let error = JsonQlError::evaluation("circular reference between expressions", position);
                record(applier.write(mutator, Err(error)));
            }
        }
        waiting = deferred;
    }
    Ok(errors)
}

struct Applier<'a> {
    arena: &'a mut JsonArena,
    document_id: &'a str,
    parents: &'a [Arc<RootParsedValue>],
    options: &'a JsonQlOptions,
    snapshot: Option<RootParsedValue>,
}

impl Applier<'_> {
    /// Locations the given mutators will rewrite: the containing object of
    /// `$copyFields`, the containing array of `$merge(...)`, the value itself
    /// otherwise.
    fn pending_paths<'m>(&self, mutators: impl Iterator<Item = &'m &'m Mutator>) -> Vec<JsonPath> {
        let paths = self.arena.node_paths(self.document_id);
        mutators
            .filter_map(|mutator| {
                let path = paths.get(&mutator.node)?;
                match mutator.action {
                    Action::CopyFields(_) | Action::Merge(_) => path.parent(),
                    Action::Value(_) | Action::Interpolation(_) => Some(path.clone()),
                }
            })
            .collect()
    }

    fn evaluate(&mut self, function: &FunctionRef, pending: &PendingValues) -> Result<Evaluated> {
        if self.snapshot.is_none() {
            let value = self.arena.freeze(self.document_id);
            self.snapshot = Some(RootParsedValue::new(self.document_id, value, self.parents));
        }
        let snapshot = self
            .snapshot
            .as_ref()
            .ok_or_else(|| JsonQlError::Internal("document snapshot is missing".to_string()))?;
        function.evaluate(&EvaluationContext::new(snapshot, self.options).with_pending(pending))
    }

    fn import(&mut self, value: Arc<ParsedValue>, position: Position) -> NodeId {
        self.arena.add(NodeKind::Imported(value), position)
    }

    fn materialize(&self, value: &Evaluated) -> Option<Arc<ParsedValue>> {
        match value {
            Evaluated::Json(value) => Some(Arc::clone(value)),
            other => other.to_parsed(JsonPath::root(self.document_id)),
        }
    }

    /// Evaluates `mutator` without touching the arena. Interpolation yields
    /// the finished text.
    fn compute(&mut self, mutator: &Mutator, pending: &PendingValues) -> Result<Evaluated> {
        match &mutator.action {
            Action::CopyFields(function) | Action::Merge(function) | Action::Value(function) => {
                self.evaluate(function, pending)
            }
            Action::Interpolation(segments) => self.interpolated_text(segments, pending).map(Evaluated::String),
        }
    }

    /// Writes the outcome of `mutator` into the arena, applying its failure policy.
    fn write(&mut self, mutator: &Mutator, computed: Result<Evaluated>) -> Result<()> {
        let node = mutator.node;
        let position = self.arena.node(node).position;
        let result = match &mutator.action {
            Action::CopyFields(_) => self.copy_fields(node, computed, position),
            Action::Merge(_) => self.merge(node, computed, position),
            Action::Value(function) => self.value(node, computed, function.position()),
            Action::Interpolation(_) => self.interpolate(node, computed),
        };
        self.snapshot = None;
        result
    }

    fn copy_fields(&mut self, node: NodeId, evaluated: Result<Evaluated>, position: Position) -> Result<()> {
        let Some(Slot::Property { object, name }) = self.arena.slot_of(node) else {
            return Err(JsonQlError::Internal(format!("{COPY_FIELDS} is not a property")));
        };
        let sources: Vec<Arc<ParsedValue>> = match &evaluated {
            Ok(Evaluated::Undefined) | Err(_) => Vec::new(),
            Ok(Evaluated::Json(value)) if value.as_object().is_some() => vec![Arc::clone(value)],
            Ok(Evaluated::Json(value)) if value.as_array().is_some() => value.as_array().unwrap_or_default().to_vec(),
            Ok(Evaluated::Collection(items)) => items.clone(),
            Ok(other) => {
                let message = format!("{COPY_FIELDS} expects an object but the value is {}", other.describe());
                self.arena.splice_property(object, &name, Vec::new());
                return Err(JsonQlError::evaluation(message, position));
            }
        };
        if sources.iter().any(|source| source.as_object().is_none()) {
            self.arena.splice_property(object, &name, Vec::new());
            return Err(JsonQlError::evaluation(format!("{COPY_FIELDS} expects objects to copy from"), position));
        }

        let mut copied: Vec<(String, NodeId)> = Vec::new();
        for source in &sources {
            for (field, value) in source.as_object().map(|o| o.properties.iter()).into_iter().flatten() {
                if field == COPY_FIELDS
                    || self.arena.has_property(object, field)
                    || copied.iter().any(|(n, _)| n == field)
                {
                    continue;
                }
                let id = self.import(Arc::clone(value), position);
                copied.push((field.clone(), id));
            }
        }
        self.arena.splice_property(object, &name, copied);
        evaluated.map(|_| ())
    }

    fn merge(&mut self, node: NodeId, evaluated: Result<Evaluated>, position: Position) -> Result<()> {
        let evaluated = match evaluated {
            Ok(value) => value,
            Err(error) => {
                self.arena.remove(node);
                return Err(error);
            }
        };
        let values: Vec<Arc<ParsedValue>> = match evaluated {
            Evaluated::Undefined => Vec::new(),
            Evaluated::Collection(items) => items,
            Evaluated::Json(value) => match value.as_array() {
                Some(items) => items.to_vec(),
                None => vec![value],
            },
            scalar => self.materialize(&scalar).into_iter().collect(),
        };
        let ids = values.into_iter().map(|v| self.import(v, position)).collect();
        self.arena.splice(node, ids)
    }

    fn value(&mut self, node: NodeId, evaluated: Result<Evaluated>, expression: Position) -> Result<()> {
        match self.materialize(&evaluated?) {
            Some(value) => {
                self.arena.set_kind(node, NodeKind::Imported(value));
                Ok(())
            }
            None if self.options.remove_undefined_values => {
                if node == self.arena.root() {
                    self.arena.set_kind(node, NodeKind::Scalar { text: "null".to_string(), quoted: false });
                } else {
                    self.arena.remove(node);
                }
                Ok(())
            }
            None => Err(JsonQlError::evaluation("value is undefined", expression)),
        }
    }

    fn interpolated_text(&mut self, segments: &[Segment], pending: &PendingValues) -> Result<String> {
        let mut text = String::new();
        for segment in segments {
            match segment {
                Segment::Text(t) => text.push_str(t),
                Segment::Expression(function) => {
                    let value = self.evaluate(function, pending)?;
                    text.push_str(&to_display_text(&value, function.position())?);
                }
            }
        }
        Ok(text)
    }

    fn interpolate(&mut self, node: NodeId, text: Result<Evaluated>) -> Result<()> {
        let Evaluated::String(text) = text? else {
            return Err(JsonQlError::Internal("interpolation did not produce text".to_string()));
        };
        self.arena.set_kind(node, NodeKind::Scalar { text, quoted: true });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::json_reader::read_json;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn run(text: &str, parents: &[Arc<RootParsedValue>]) -> (serde_json::Value, Vec<String>) {
        let mut arena = read_json(text).unwrap();
        let compiler = FunctionCompiler::default();
        let options = JsonQlOptions::default();
        let errors = apply_mutators(&mut arena, "doc", parents, &compiler, &options).unwrap();
        (arena.freeze("doc").to_json(), errors.iter().map(|e| e.to_string()).collect())
    }

    #[test]
    fn splits_interpolated_text() {
        assert_eq!(
            split_interpolation("a $(X) b $(F(')'))").unwrap(),
            vec![
                RawSegment::Text("a "),
                RawSegment::Expression { text: "X", offset: 4 },
                RawSegment::Text(" b "),
                RawSegment::Expression { text: "F(')')", offset: 11 },
            ]
        );
        assert_eq!(split_interpolation("x $(A").unwrap_err(), 2);
        assert_eq!(call_expression("$value(A) + $value(B)", VALUE_PREFIX), None);
        assert_eq!(call_expression("$value(F(A))", VALUE_PREFIX), Some("F(A)"));
    }

    #[test]
    fn value_merge_and_interpolation() {
        let (value, errors) = run(
            r#"{"A": [1, 2], "S": "$value(Sum(A))", "L": [0, "$merge(A)", 3], "T": "n=$(Count(A))!"}"#,
            &[],
        );
        assert!(errors.is_empty(), "{errors:?}");
        assert_eq!(value, json!({"A": [1, 2], "S": 3, "L": [0, 1, 2, 3], "T": "n=2!"}));
    }

    #[test]
    fn copy_fields_skips_existing_names() {
        let (value, _) = run(r#"{"Base": {"X": 1, "Y": 2}, "Obj": {"Y": 5, "$copyFields": "Base"}}"#, &[]);
        assert_eq!(value, json!({"Base": {"X": 1, "Y": 2}, "Obj": {"Y": 5, "X": 1}}));
    }

    #[test]
    fn undefined_value_removes_the_target() {
        let (value, errors) = run(r#"{"A": "$value(Missing)", "B": ["$value(Missing)", 1]}"#, &[]);
        assert!(errors.is_empty());
        assert_eq!(value, json!({"B": [1]}));
    }

    #[test]
    fn failures_are_recorded_and_keep_going() {
        let (value, errors) = run(
            r#"{"A": "$value(1 / 0)", "L": ["$merge(Missing assert)", 2], "T": "x$(Missing)", "B": "$value(2)"}"#,
            &[],
        );
        assert_eq!(value, json!({"A": "$value(1 / 0)", "L": [2], "T": "x$(Missing)", "B": 2}));
        assert_eq!(
            errors,
            vec![
                "doc:1:46: assertion failed: value is undefined".to_string(),
                "doc:1:17: division by zero".to_string(),
                "doc:1:69: value is undefined".to_string(),
            ]
        );
    }

    #[test]
    fn copies_wait_for_the_values_they_read() {
        let (value, errors) =
            run(r#"{"Base": {"X": "$value(1 + 1)"}, "Obj": {"$copyFields": "Base"}, "L": ["$merge(Base.X)"]}"#, &[]);
        assert!(errors.is_empty(), "{errors:?}");
        assert_eq!(value, json!({"Base": {"X": 2}, "Obj": {"X": 2}, "L": [2]}));
    }

    #[test]
    fn values_may_reference_later_values() {
        let (value, errors) = run(r#"{"B": "$value(A * 2)", "A": "$value(1 + 1)", "T": "$(B)-$(A)"}"#, &[]);
        assert!(errors.is_empty(), "{errors:?}");
        assert_eq!(value, json!({"B": 4, "A": 2, "T": "4-2"}));
    }

    #[test]
    fn reference_cycles_fail_every_member() {
        let (value, errors) = run(r#"{"A": "$value(B + 1)", "B": "$value(A + 1)", "C": "$value(2)"}"#, &[]);
        assert_eq!(value, json!({"A": "$value(B + 1)", "B": "$value(A + 1)", "C": 2}));
        assert_eq!(
            errors,
            vec![
                "doc:1:17: circular reference between expressions".to_string(),
                "doc:1:39: circular reference between expressions".to_string(),
            ]
        );
    }

    #[test]
    fn escapes_do_not_shift_reported_columns() {
        let (_, errors) = run(r#"{"A": "a\"b$(1 / 0)"}"#, &[]);
        assert_eq!(errors, vec!["doc:1:16: division by zero".to_string()]);
    }

    #[test]
    fn copy_fields_rejects_scalars() {
        let (value, errors) = run(r#"{"N": 1, "Obj": {"$copyFields": "N", "K": 2}}"#, &[]);
        assert_eq!(value, json!({"N": 1, "Obj": {"K": 2}}));
        assert_eq!(errors, vec!["doc:1:33: $copyFields expects an object but the value is a number".to_string()]);
    }

    #[test]
    fn later_mutators_see_earlier_rewrites() {
        let (value, _) = run(r#"{"Obj": {"$copyFields": "Base"}, "Base": {"X": 4}, "V": "$value(Obj.X * 2)"}"#, &[]);
        assert_eq!(value["V"], json!(8));
    }

    #[test]
    fn unterminated_value_aborts() {
        let mut arena = read_json(r#"{"A": [1], "S": "$value(Sum(A)"}"#).unwrap();
        let errors = apply_mutators(&mut arena, "doc", &[], &FunctionCompiler::default(), &JsonQlOptions::default())
            .unwrap_err();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].to_string(), "doc:1:24: missing closing ')' in $value");
    }

    #[test]
    fn misplaced_merge_aborts() {
        let mut arena = read_json(r#"{"A": "$merge(B)"}"#).unwrap();
        let errors = apply_mutators(&mut arena, "doc", &[], &FunctionCompiler::default(), &JsonQlOptions::default())
            .unwrap_err();
        assert_eq!(errors[0].message, "$merge can only be used as an array item");
    }

    #[test]
    fn copied_values_remember_their_origin() {
        let parent_value = read_json(r#"{"Shared": {"K": 1}}"#).unwrap().freeze("parent");
        let parent = Arc::new(RootParsedValue::new("parent", parent_value, &[]));
        let mut arena = read_json(r#"{"Copy": "$value(Shared)"}"#).unwrap();
        apply_mutators(&mut arena, "child", &[parent], &FunctionCompiler::default(), &JsonQlOptions::default())
            .unwrap();
        let child = arena.freeze("child");
        let copy = child.get("Copy").unwrap();
        assert_eq!(copy.path().to_string(), "Copy");
        assert_eq!(copy.path_in_referenced_json().unwrap().to_string(), "Shared");
        assert_eq!(copy.get("K").unwrap().path_in_referenced_json().unwrap().document_id(), "parent");
    }
}
