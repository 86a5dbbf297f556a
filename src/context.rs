//! Evaluation context and options.
//!
//! Lambda parameters are bound by extending an immutable chain of bindings;
//! a child context shares its parent's chain, so leaving a lambda is just
//! dropping the child context.

use std::cell::Cell;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::evaluated::Evaluated;
use crate::parsed_value::{ParsedValue, RootParsedValue};
use crate::path::{JsonPath, PathRelation};

/// Engine options shared by every evaluation.
#[derive(Debug, Clone)]
pub struct JsonQlOptions {
    /// chrono formats tried (after RFC 3339) when text is converted to a date-time.
    pub date_time_formats: Vec<String>,
    /// When true a `$value(...)` evaluating to undefined removes its target;
    /// otherwise it is reported as an error.
    pub remove_undefined_values: bool,
}

impl Default for JsonQlOptions {
    fn default() -> Self {
        Self {
            date_time_formats: vec![
                "%Y-%m-%d %H:%M:%S".to_string(),
                "%Y-%m-%dT%H:%M:%S".to_string(),
                "%Y-%m-%d".to_string(),
            ],
            remove_undefined_values: true,
        }
    }
}

/// Identity of one compiled lambda (one syntax occurrence).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LambdaId(u64);

impl LambdaId {
    pub fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        LambdaId(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

/// Item currently iterated by a collection function, with its index.
#[derive(Debug, Clone)]
pub struct ContextData {
    pub item: Arc<ParsedValue>,
    pub index: usize,
}

/// Locations of the current document that still hold unevaluated
/// expressions. Looking one of them up marks the evaluation as premature.
#[derive(Debug, Default)]
pub struct PendingValues {
    paths: Vec<JsonPath>,
    read: Cell<bool>,
}

impl PendingValues {
    pub fn new(paths: Vec<JsonPath>) -> Self {
        Self { paths, read: Cell::new(false) }
    }

    /// Whether any lookup so far touched a pending location.
    pub fn was_read(&self) -> bool {
        self.read.get()
    }

    /// `whole` values count when they contain a pending location too;
    /// values a lookup only stepped through count when they are inside one.
    fn note(&self, value: &ParsedValue, whole: bool) {
        if self.read.get() {
            return;
        }
        let touched = self.paths.iter().any(|path| match value.path().compare(path) {
            PathRelation::Equal | PathRelation::Child => true,
            PathRelation::Parent => whole,
            PathRelation::Sibling | PathRelation::None => false,
        });
        if touched {
            self.read.set(true);
        }
    }
}

#[derive(Debug)]
struct LambdaBinding {
    lambda: LambdaId,
    data: ContextData,
    outer: Option<Arc<LambdaBinding>>,
}

#[derive(Clone)]
pub struct EvaluationContext<'a> {
    document: &'a RootParsedValue,
    options: &'a JsonQlOptions,
    bindings: Option<Arc<LambdaBinding>>,
    pending: Option<&'a PendingValues>,
}

impl<'a> EvaluationContext<'a> {
    pub fn new(document: &'a RootParsedValue, options: &'a JsonQlOptions) -> Self {
        Self { document, options, bindings: None, pending: None }
    }

    /// Context that records lookups of `pending` locations.
    pub fn with_pending(mut self, pending: &'a PendingValues) -> Self {
        self.pending = Some(pending);
        self
    }

    pub fn document(&self) -> &'a RootParsedValue {
        self.document
    }

    pub fn options(&self) -> &'a JsonQlOptions {
        self.options
    }

    /// Context in which `lambda`'s parameters resolve to `data`.
    /// Bindings of enclosing lambdas stay visible.
    pub fn with_binding(&self, lambda: LambdaId, data: ContextData) -> EvaluationContext<'a> {
        EvaluationContext {
            document: self.document,
            options: self.options,
            bindings: Some(Arc::new(LambdaBinding { lambda, data, outer: self.bindings.clone() })),
            pending: self.pending,
        }
    }

    /// Records that a lookup produced `value`.
    pub fn note_read(&self, value: &Evaluated) {
        let Some(pending) = self.pending else { return };
        match value {
            Evaluated::Json(value) => pending.note(value, true),
            Evaluated::Collection(items) => items.iter().for_each(|item| pending.note(item, true)),
            _ => {}
        }
    }

    /// Records that a lookup stepped through `values`.
    pub fn note_visit(&self, values: &[Arc<ParsedValue>]) {
        if let Some(pending) = self.pending {
            values.iter().for_each(|value| pending.note(value, false));
        }
    }

    /// Innermost active binding of `lambda`.
    pub fn binding(&self, lambda: LambdaId) -> Option<&ContextData> {
        let mut current = self.bindings.as_deref();
        while let Some(binding) = current {
            if binding.lambda == lambda {
                return Some(&binding.data);
            }
            current = binding.outer.as_deref();
        }
        None
    }

    /// Number of active lambda bindings.
    pub fn depth(&self) -> usize {
        std::iter::successors(self.bindings.as_deref(), |b| b.outer.as_deref()).count()
    }
}

impl std::fmt::Debug for EvaluationContext<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EvaluationContext")
            .field("document", &self.document.document_id)
            .field("depth", &self.depth())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::path::JsonPath;
    use serde_json::json;

    fn item(n: i64) -> ContextData {
        ContextData { item: Arc::new(ParsedValue::from_json(&json!(n), JsonPath::root("d"))), index: n as usize }
    }

    #[test]
    fn nested_bindings_shadow_and_restore() {
        let root = RootParsedValue::new("d", Arc::new(ParsedValue::from_json(&json!({}), JsonPath::root("d"))), &[]);
        let options = JsonQlOptions::default();
        let ctx = EvaluationContext::new(&root, &options);
        let outer = LambdaId::next();
        let inner = LambdaId::next();

        let c1 = ctx.with_binding(outer, item(1));
        let c2 = c1.with_binding(inner, item(2));
        let c3 = c2.with_binding(outer, item(3));

        assert_eq!(c3.binding(outer).unwrap().index, 3);
        assert_eq!(c3.binding(inner).unwrap().index, 2);
        assert_eq!(c2.binding(outer).unwrap().index, 1);
        assert!(ctx.binding(outer).is_none());
        assert_eq!(c3.depth(), 3);
    }

    #[test]
    fn pending_locations_are_noticed_through_lambdas() {
        let value = Arc::new(ParsedValue::from_json(&json!({"A": {"B": 1}, "C": 2}), JsonPath::root("d")));
        let root = RootParsedValue::new("d", Arc::clone(&value), &[]);
        let options = JsonQlOptions::default();
        let pending = PendingValues::new(vec![JsonPath::root("d").child_property("A").child_property("B")]);
        let ctx = EvaluationContext::new(&root, &options).with_pending(&pending);

        ctx.note_read(&Evaluated::Json(Arc::clone(value.get("C").unwrap())));
        ctx.note_read(&Evaluated::Double(1.0));
        ctx.note_visit(&[Arc::clone(&value), Arc::clone(value.get("A").unwrap())]);
        assert!(!pending.was_read());

        let inner = ctx.with_binding(LambdaId::next(), item(0));
        inner.note_read(&Evaluated::Collection(vec![Arc::clone(value.get("A").unwrap())]));
        assert!(pending.was_read());
    }
}
