use std::fmt;

use serde::Serialize;
use thiserror::Error;

/// 1-based line/column inside a JSON text (or inside a standalone query).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct Position {
    pub line: usize,
    pub column: usize,
}

impl Position {
    pub const START: Position = Position { line: 1, column: 1 };

    pub fn new(line: usize, column: usize) -> Self {
        Self { line, column }
    }

    /// Position `offset` characters to the right on the same line.
    pub fn shifted(self, offset: usize) -> Self {
        Self { line: self.line, column: self.column + offset }
    }
}

impl Default for Position {
    fn default() -> Self {
        Self::START
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum JsonQlError {
    // Malformed JSON or expression text, unknown functions, arity mismatches
    #[error("syntax error at {position}: {message}")]
    Syntax { message: String, position: Position },

    // Type mismatches, failed assertions, division by zero
    #[error("evaluation error at {position}: {message}")]
    Evaluation { message: String, position: Position },

    // Broken engine invariant; never caused by user input
    #[error("internal error: {0}")]
    Internal(String),
}

impl JsonQlError {
    pub fn syntax(message: impl Into<String>, position: Position) -> Self {
        Self::Syntax { message: message.into(), position }
    }

    pub fn evaluation(message: impl Into<String>, position: Position) -> Self {
        Self::Evaluation { message: message.into(), position }
    }

    pub fn position(&self) -> Option<Position> {
        match self {
            Self::Syntax { position, .. } | Self::Evaluation { position, .. } => Some(*position),
            Self::Internal(_) => None,
        }
    }

    /// Message without the position prefix.
    pub fn message(&self) -> &str {
        match self {
            Self::Syntax { message, .. } | Self::Evaluation { message, .. } => message,
            Self::Internal(message) => message,
        }
    }

    pub fn is_syntax(&self) -> bool {
        matches!(self, Self::Syntax { .. })
    }
}

pub type Result<T> = std::result::Result<T, JsonQlError>;

/// One entry of a compilation/query error list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CompilationError {
    pub document_id: String,
    pub message: String,
    pub position: Option<Position>,
}

impl CompilationError {
    pub fn new(document_id: impl Into<String>, message: impl Into<String>, position: Option<Position>) -> Self {
        Self { document_id: document_id.into(), message: message.into(), position }
    }

    pub fn from_error(document_id: &str, error: &JsonQlError) -> Self {
        Self::new(document_id, error.message(), error.position())
    }
}

impl fmt::Display for CompilationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.position {
            Some(position) => write!(f, "{}:{}: {}", self.document_id, position, self.message),
            None => write!(f, "{}: {}", self.document_id, self.message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn compilation_error_display_includes_location() {
        let err = JsonQlError::evaluation("value is null", Position::new(3, 14));
        let entry = CompilationError::from_error("Doc1", &err);
        assert_eq!(entry.to_string(), "Doc1:3:14: value is null");
        assert_eq!(err.to_string(), "evaluation error at 3:14: value is null");
    }

    #[test]
    fn internal_errors_have_no_position() {
        let err = JsonQlError::Internal("root must be an object".into());
        assert_eq!(err.position(), None);
        assert_eq!(CompilationError::from_error("Doc1", &err).to_string(), "Doc1: root must be an object");
    }
}
