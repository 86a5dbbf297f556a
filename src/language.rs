//! Language definition consumed by the tokenizer and parser: operators,
//! keywords and accepted numeric literal formats.

use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperatorKind {
    Binary,
    Prefix,
    Postfix,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperatorInfo {
    pub name: String,
    pub kind: OperatorKind,
    /// Higher binds tighter.
    pub precedence: u8,
}

impl OperatorInfo {
    pub fn new(name: impl Into<String>, kind: OperatorKind, precedence: u8) -> Self {
        Self { name: name.into(), kind, precedence }
    }

    /// Word operators (`assert`) are spelled like identifiers.
    pub fn is_word(&self) -> bool {
        self.name.chars().all(|c| c == '_' || c.is_alphanumeric())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NumericLiteralFormat {
    /// `12`, `-3.5`
    Decimal,
    /// `1e3`, `2.5E-2`
    Exponent,
    /// `0x1F`
    Hexadecimal,
}

pub mod operators {
    pub const PATH: &str = ".";
    pub const ASSERT: &str = "assert";
    pub const NOT: &str = "!";
    pub const NEGATE: &str = "-";
    pub const MULTIPLY: &str = "*";
    pub const DIVIDE: &str = "/";
    pub const MODULO: &str = "%";
    pub const ADD: &str = "+";
    pub const SUBTRACT: &str = "-";
    pub const LESS: &str = "<";
    pub const LESS_OR_EQUAL: &str = "<=";
    pub const GREATER: &str = ">";
    pub const GREATER_OR_EQUAL: &str = ">=";
    pub const EQUAL: &str = "==";
    pub const NOT_EQUAL: &str = "!=";
    pub const AND: &str = "&&";
    pub const OR: &str = "||";
    pub const DEFAULT_VALUE: &str = ":";
}

pub mod keywords {
    pub const TRUE: &str = "true";
    pub const FALSE: &str = "false";
    pub const NULL: &str = "null";
    pub const UNDEFINED: &str = "undefined";
    pub const THIS: &str = "this";
    pub const PARENT: &str = "parent";
}

#[derive(Debug, Clone)]
pub struct LanguageDefinition {
    operators: Vec<Arc<OperatorInfo>>,
    keywords: Vec<String>,
    numeric_formats: Vec<NumericLiteralFormat>,
    pub lambda_arrow: String,
}

impl Default for LanguageDefinition {
    fn default() -> Self {
        use operators::*;
        use OperatorKind::*;

        let table = [
            (PATH, Binary, 100),
            (ASSERT, Postfix, 90),
            (NOT, Prefix, 80),
            (NEGATE, Prefix, 80),
            (MULTIPLY, Binary, 70),
            (DIVIDE, Binary, 70),
            (MODULO, Binary, 70),
            (ADD, Binary, 60),
            (SUBTRACT, Binary, 60),
            (LESS, Binary, 50),
            (LESS_OR_EQUAL, Binary, 50),
            (GREATER, Binary, 50),
            (GREATER_OR_EQUAL, Binary, 50),
            (EQUAL, Binary, 40),
            (NOT_EQUAL, Binary, 40),
            (AND, Binary, 30),
            (OR, Binary, 20),
            (DEFAULT_VALUE, Binary, 10),
        ];
        Self {
            operators: table
                .into_iter()
                .map(|(name, kind, precedence)| Arc::new(OperatorInfo::new(name, kind, precedence)))
                .collect(),
            keywords: [
                keywords::TRUE,
                keywords::FALSE,
                keywords::NULL,
                keywords::UNDEFINED,
                keywords::THIS,
                keywords::PARENT,
            ]
            .iter()
            .map(|k| k.to_string())
            .collect(),
            numeric_formats: vec![
                NumericLiteralFormat::Decimal,
                NumericLiteralFormat::Exponent,
                NumericLiteralFormat::Hexadecimal,
            ],
            lambda_arrow: "=>".to_string(),
        }
    }
}

impl LanguageDefinition {
    /// Adds an operator, replacing an existing one with the same name and kind.
    pub fn with_operator(mut self, operator: OperatorInfo) -> Self {
        self.operators.retain(|o| !(o.name == operator.name && o.kind == operator.kind));
        self.operators.push(Arc::new(operator));
        self
    }

    pub fn with_keyword(mut self, keyword: impl Into<String>) -> Self {
        let keyword = keyword.into();
        if !self.keywords.contains(&keyword) {
            self.keywords.push(keyword);
        }
        self
    }

    pub fn with_numeric_formats(mut self, formats: Vec<NumericLiteralFormat>) -> Self {
        self.numeric_formats = formats;
        self
    }

    pub fn operator(&self, name: &str, kind: OperatorKind) -> Option<&Arc<OperatorInfo>> {
        self.operators.iter().find(|o| o.name == name && o.kind == kind)
    }

    pub fn operators(&self) -> &[Arc<OperatorInfo>] {
        &self.operators
    }

    /// Symbol operator names, longest first, for greedy tokenizing.
    pub fn symbol_operators(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self
            .operators
            .iter()
            .filter(|o| !o.is_word())
            .map(|o| o.name.as_str())
            .collect();
        names.sort_by_key(|n| std::cmp::Reverse(n.len()));
        names.dedup();
        names
    }

    pub fn is_keyword(&self, word: &str) -> bool {
        self.keywords.iter().any(|k| k == word)
    }

    pub fn supports(&self, format: NumericLiteralFormat) -> bool {
        self.numeric_formats.contains(&format)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minus_is_both_prefix_and_binary() {
        let language = LanguageDefinition::default();
        assert!(language.operator("-", OperatorKind::Prefix).is_some());
        assert!(language.operator("-", OperatorKind::Binary).is_some());
        assert!(language.operator("-", OperatorKind::Postfix).is_none());
    }

    #[test]
    fn symbol_operators_are_longest_first() {
        let language = LanguageDefinition::default().with_operator(OperatorInfo::new("**", OperatorKind::Binary, 75));
        let symbols = language.symbol_operators();
        let pos = |s: &str| symbols.iter().position(|n| *n == s).unwrap();
        assert!(pos("**") < pos("*"));
        assert!(pos("<=") < pos("<"));
        assert!(!symbols.contains(&"assert"));
    }
}
