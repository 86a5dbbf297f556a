//! Document compilation and queries.
//!
//! A document is read, its mutators are applied, and the result is frozen
//! into a [`RootParsedValue`] whose ancestors are the compiled parents.
//! Queries are evaluated against an empty document whose ancestors are the
//! queried documents, so unqualified names resolve nearest-first.

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::debug;

use crate::context::{EvaluationContext, JsonQlOptions};
use crate::errors::{CompilationError, Position};
use crate::factories::{FunctionCompiler, FunctionFactories};
use crate::json_reader::read_json;
use crate::language::LanguageDefinition;
use crate::mutators::apply_mutators;
use crate::parsed_value::{ParsedValue, RootParsedValue};
use crate::path::JsonPath;

/// Document id used for the synthetic document a query runs against.
pub const QUERY_DOCUMENT_ID: &str = "Query";

/// Named JSON text with an optional parent chain (closest parent first).
#[derive(Debug, Clone, PartialEq)]
pub struct JsonTextData {
    pub identifier: String,
    pub text: String,
    pub parent: Option<Box<JsonTextData>>,
}

impl JsonTextData {
    pub fn new(identifier: impl Into<String>, text: impl Into<String>) -> Self {
        Self { identifier: identifier.into(), text: text.into(), parent: None }
    }

    pub fn with_parent(mut self, parent: JsonTextData) -> Self {
        self.parent = Some(Box::new(parent));
        self
    }

    /// This document followed by its ancestors, closest first.
    pub fn chain(&self) -> Vec<&JsonTextData> {
        let mut chain = vec![self];
        let mut current = self.parent.as_deref();
        while let Some(data) = current {
            chain.push(data);
            current = data.parent.as_deref();
        }
        chain
    }
}

#[derive(Debug, Clone)]
pub struct CompiledJsonData {
    pub identifier: String,
    pub root: Arc<RootParsedValue>,
}

/// Compiled documents (ancestors first) and every error collected.
#[derive(Debug, Clone, Default)]
pub struct CompilationResult {
    pub documents: Vec<CompiledJsonData>,
    pub errors: Vec<CompilationError>,
}

impl CompilationResult {
    pub fn document(&self, identifier: &str) -> Option<&Arc<RootParsedValue>> {
        self.documents.iter().find(|d| d.identifier == identifier).map(|d| &d.root)
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }
}

/// Result of a query. `value` is `None` when the expression evaluated to
/// undefined or failed.
#[derive(Debug, Clone, Default)]
pub struct QueryResult {
    pub value: Option<Arc<ParsedValue>>,
    pub errors: Vec<CompilationError>,
}

impl QueryResult {
    /// JSON form of the value; `null` when there is none.
    pub fn to_json(&self) -> Value {
        self.value.as_ref().map(|v| v.to_json()).unwrap_or(Value::Null)
    }

    /// Converts the value into `T` with serde.
    pub fn deserialize<T: DeserializeOwned>(&self) -> serde_json::Result<T> {
        serde_json::from_value(self.to_json())
    }
}

#[derive(Debug, Clone, Default)]
pub struct JsonCompiler {
    compiler: FunctionCompiler,
    options: JsonQlOptions,
}

impl JsonCompiler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_factories(factories: FunctionFactories, language: LanguageDefinition) -> Self {
        Self { compiler: FunctionCompiler::new(factories, language), options: JsonQlOptions::default() }
    }

    pub fn with_options(mut self, options: JsonQlOptions) -> Self {
        self.options = options;
        self
    }

    pub fn options(&self) -> &JsonQlOptions {
        &self.options
    }

    /// Compiles `data` and its parent chain, deepest ancestor first.
    pub fn compile(&self, data: &JsonTextData) -> CompilationResult {
        let mut result = CompilationResult::default();
        let mut parent: Option<Arc<RootParsedValue>> = None;
        let mut failed: Option<&str> = None;
        for document in data.chain().into_iter().rev() {
            if let Some(failed_id) = failed {
                result.errors.push(CompilationError::new(
                    &document.identifier,
                    format!("parent document '{failed_id}' failed to compile"),
                    None,
                ));
                continue;
            }
            let parents: Vec<Arc<RootParsedValue>> = parent.take().into_iter().collect();
            match self.compile_document(document, &parents, &mut result.errors) {
                Some(root) => {
                    result.documents.push(CompiledJsonData {
                        identifier: document.identifier.clone(),
                        root: Arc::clone(&root),
                    });
                    parent = Some(root);
                }
                None => failed = Some(&document.identifier),
            }
        }
        result
    }

    /// Compiles `data` alone against already compiled `parents` (closest first).
    pub fn compile_with_parents(&self, data: &JsonTextData, parents: &[Arc<RootParsedValue>]) -> CompilationResult {
        let mut result = CompilationResult::default();
        if let Some(root) = self.compile_document(data, parents, &mut result.errors) {
            result.documents.push(CompiledJsonData { identifier: data.identifier.clone(), root });
        }
        result
    }

    fn compile_document(
        &self,
        data: &JsonTextData,
        parents: &[Arc<RootParsedValue>],
        errors: &mut Vec<CompilationError>,
    ) -> Option<Arc<RootParsedValue>> {
        let id = data.identifier.as_str();
        debug!(document = id, parents = parents.len(), "compiling document");
        let mut arena = match read_json(&data.text) {
            Ok(arena) => arena,
            Err(error) => {
                debug!(document = id, %error, "document is not valid JSON");
                errors.push(CompilationError::from_error(id, &error));
                return None;
            }
        };
        match apply_mutators(&mut arena, id, parents, &self.compiler, &self.options) {
            Ok(mutator_errors) => {
                debug!(document = id, errors = mutator_errors.len(), "compiled document");
                errors.extend(mutator_errors);
                Some(Arc::new(RootParsedValue::new(id, arena.freeze(id), parents)))
            }
            Err(syntax_errors) => {
                debug!(document = id, errors = syntax_errors.len(), "document has syntax errors");
                errors.extend(syntax_errors);
                None
            }
        }
    }

    /// Evaluates `expression` against `documents` (closest first).
    pub fn query(&self, expression: &str, documents: &[Arc<RootParsedValue>]) -> QueryResult {
        debug!(expression, documents = documents.len(), "running query");
        let empty = ParsedValue::from_json(&Value::Object(Default::default()), JsonPath::root(QUERY_DOCUMENT_ID));
        let root = RootParsedValue::new(QUERY_DOCUMENT_ID, Arc::new(empty), documents);
        let evaluated = self
            .compiler
            .compile_expression(expression, Position::START)
            .and_then(|function| function.evaluate(&EvaluationContext::new(&root, &self.options)));
        let result = match evaluated {
            Ok(value) => QueryResult { value: value.to_parsed(JsonPath::root(QUERY_DOCUMENT_ID)), errors: Vec::new() },
            Err(error) => QueryResult {
                value: None,
                errors: vec![CompilationError::from_error(QUERY_DOCUMENT_ID, &error)],
            },
        };
        debug!(expression, errors = result.errors.len(), "query finished");
        result
    }

    /// Compiles `data` and queries it; compilation errors are returned
    /// alongside the query's own.
    pub fn query_text(&self, expression: &str, data: &JsonTextData) -> QueryResult {
        let compiled = self.compile(data);
        let Some(root) = compiled.document(&data.identifier) else {
            return QueryResult { value: None, errors: compiled.errors };
        };
        let mut result = self.query(expression, &[Arc::clone(root)]);
        let mut errors = compiled.errors;
        errors.append(&mut result.errors);
        result.errors = errors;
        result
    }
}
