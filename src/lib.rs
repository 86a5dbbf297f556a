//! JsonQL: query expressions embedded in JSON documents.
//!
//! Documents are compiled with their ancestor documents; string values such
//! as `"$value(Sum(Orders.Total))"` are evaluated at compile time, and
//! standalone expressions can be queried against compiled documents.
//!
//! ```
//! use jsonql::{JsonCompiler, JsonTextData};
//!
//! let data = JsonTextData::new("Doc", r#"{"A": [1, 2, 3, 4], "Total": "$value(Sum(A))"}"#);
//! let result = JsonCompiler::new().query_text("A.Where(x => x > Total / 4)", &data);
//! assert!(result.errors.is_empty());
//! assert_eq!(result.to_json(), serde_json::json!([3, 4]));
//! ```

pub mod comparison;
pub mod compiler;
pub mod context;
pub mod errors;
pub mod evaluated;
pub mod factories;
pub mod functions;
pub mod json_reader;
pub mod language;
mod mutators;
pub mod parsed_value;
pub mod parser;
pub mod path;
pub mod syntax;

use std::sync::Arc;

pub use compiler::{CompilationResult, CompiledJsonData, JsonCompiler, JsonTextData, QueryResult};
pub use context::JsonQlOptions;
pub use errors::{CompilationError, JsonQlError, Position, Result};
pub use evaluated::Evaluated;
pub use factories::{FunctionCompiler, FunctionFactories};
pub use language::LanguageDefinition;
pub use parsed_value::{ParsedValue, RootParsedValue};
pub use path::JsonPath;

/// Compiles `data` and its parents with the default compiler.
pub fn compile(data: &JsonTextData) -> CompilationResult {
    JsonCompiler::new().compile(data)
}

/// Evaluates `expression` against compiled documents (closest first) with
/// the default compiler.
pub fn query(expression: &str, documents: &[Arc<RootParsedValue>]) -> QueryResult {
    JsonCompiler::new().query(expression, documents)
}
