// src/syntax.rs
//! Expression syntax tree and the default parser producing it.
//!
//! The function compiler only consumes [`ExpressionItem`]; any parser that
//! produces this tree can be used instead.

use std::fmt;
use std::sync::Arc;

use crate::errors::{JsonQlError, Position, Result};
use crate::language::{LanguageDefinition, OperatorInfo, OperatorKind};
use crate::parser::{Scanner, MAX_NESTING};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LiteralKind {
    Identifier,
    Number,
    Text,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LiteralExpression {
    pub kind: LiteralKind,
    pub text: String,
    pub position: Position,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OperatorExpression {
    pub operator: Arc<OperatorInfo>,
    pub operands: Vec<ExpressionItem>,
    pub position: Position,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BraceKind {
    Round,
    Square,
}

/// `Name(args)`, `Name[args]` or a parenthesized group `(expr)`.
#[derive(Debug, Clone, PartialEq)]
pub struct BracesExpression {
    pub name: Option<String>,
    pub kind: BraceKind,
    pub arguments: Vec<ExpressionItem>,
    pub position: Position,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LambdaParameter {
    pub name: String,
    pub position: Position,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LambdaExpression {
    pub parameters: Vec<LambdaParameter>,
    pub body: Box<ExpressionItem>,
    pub position: Position,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExpressionItem {
    Literal(LiteralExpression),
    Operator(OperatorExpression),
    Braces(BracesExpression),
    Lambda(LambdaExpression),
}

impl ExpressionItem {
    pub fn position(&self) -> Position {
        match self {
            ExpressionItem::Literal(e) => e.position,
            ExpressionItem::Operator(e) => e.position,
            ExpressionItem::Braces(e) => e.position,
            ExpressionItem::Lambda(e) => e.position,
        }
    }

    pub fn as_identifier(&self) -> Option<&str> {
        match self {
            ExpressionItem::Literal(LiteralExpression { kind: LiteralKind::Identifier, text, .. }) => Some(text),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum TokenKind {
    Identifier(String),
    Number(String),
    Text(String),
    Operator(String),
    LeftParen,
    RightParen,
    LeftBracket,
    RightBracket,
    Comma,
    Arrow,
    End,
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenKind::Identifier(s) | TokenKind::Number(s) | TokenKind::Operator(s) => write!(f, "'{s}'"),
            TokenKind::Text(s) => write!(f, "string '{s}'"),
            TokenKind::LeftParen => write!(f, "'('"),
            TokenKind::RightParen => write!(f, "')'"),
            TokenKind::LeftBracket => write!(f, "'['"),
            TokenKind::RightBracket => write!(f, "']'"),
            TokenKind::Comma => write!(f, "','"),
            TokenKind::Arrow => write!(f, "'=>'"),
            TokenKind::End => write!(f, "end of expression"),
        }
    }
}

#[derive(Debug, Clone)]
struct Token {
    kind: TokenKind,
    position: Position,
}

fn tokenize(text: &str, origin: Position, language: &LanguageDefinition) -> Result<Vec<Token>> {
    let mut s = Scanner::with_origin(text, origin);
    let symbols = language.symbol_operators();
    let mut tokens = Vec::new();
    loop {
        s.skip_ws();
        let position = s.position();
        let Some(c) = s.peek_char() else {
            tokens.push(Token { kind: TokenKind::End, position });
            return Ok(tokens);
        };
        let kind = if c.is_ascii_digit() {
            TokenKind::Number(s.scan_number_text()?.to_string())
        } else if c == '\'' || c == '"' {
            TokenKind::Text(s.parse_quoted_string()?)
        } else if c == '_' || c.is_alphabetic() {
            TokenKind::Identifier(s.parse_identifier()?)
        } else if s.consume_str(&language.lambda_arrow) {
            TokenKind::Arrow
        } else if s.consume_char('(') {
            TokenKind::LeftParen
        } else if s.consume_char(')') {
            TokenKind::RightParen
        } else if s.consume_char('[') {
            TokenKind::LeftBracket
        } else if s.consume_char(']') {
            TokenKind::RightBracket
        } else if s.consume_char(',') {
            TokenKind::Comma
        } else if let Some(op) = symbols.iter().find(|op| s.peek_str(op)) {
            s.consume_str(op);
            TokenKind::Operator(op.to_string())
        } else {
            return Err(s.error(format!("unexpected character '{c}'")));
        };
        tokens.push(Token { kind, position });
    }
}

/// Parses `text` into a syntax tree. `origin` is the position of the first
/// character of `text` inside the enclosing JSON document.
pub fn parse_expression(text: &str, origin: Position, language: &LanguageDefinition) -> Result<ExpressionItem> {
    let tokens = tokenize(text, origin, language)?;
    let mut parser = ExpressionParser { language, tokens, pos: 0, depth: 0 };
    if parser.peek().kind == TokenKind::End {
        return Err(JsonQlError::syntax("expression is empty", origin));
    }
    let item = parser.parse_binary(0)?;
    let next = parser.peek();
    if next.kind != TokenKind::End {
        return Err(JsonQlError::syntax(format!("unexpected {}", next.kind), next.position));
    }
    check_depth(&item)?;
    Ok(item)
}

/// Rejects trees deeper than [`MAX_NESTING`]; long operator chains nest
/// without nesting the parser.
fn check_depth(item: &ExpressionItem) -> Result<()> {
    let mut stack = vec![(item, 1usize)];
    while let Some((item, depth)) = stack.pop() {
        if depth > MAX_NESTING {
            return Err(JsonQlError::syntax("nesting too deep", item.position()));
        }
        match item {
            ExpressionItem::Literal(_) => {}
            ExpressionItem::Operator(e) => stack.extend(e.operands.iter().map(|o| (o, depth + 1))),
            ExpressionItem::Braces(e) => stack.extend(e.arguments.iter().map(|a| (a, depth + 1))),
            ExpressionItem::Lambda(e) => stack.push((e.body.as_ref(), depth + 1)),
        }
    }
    Ok(())
}

struct ExpressionParser<'a> {
    language: &'a LanguageDefinition,
    tokens: Vec<Token>,
    pos: usize,
    depth: usize,
}

impl<'a> ExpressionParser<'a> {
    fn peek(&self) -> &Token {
        // The token list always ends with `End`.
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn peek_kind_at(&self, offset: usize) -> &TokenKind {
        &self.tokens[(self.pos + offset).min(self.tokens.len() - 1)].kind
    }

    fn bump(&mut self) -> Token {
        let token = self.peek().clone();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        token
    }

    fn operator_at(&self, kind: OperatorKind) -> Option<Arc<OperatorInfo>> {
        let name = match &self.peek().kind {
            TokenKind::Operator(name) | TokenKind::Identifier(name) => name,
            _ => return None,
        };
        self.language.operator(name, kind).cloned()
    }

    fn parse_binary(&mut self, min_precedence: u8) -> Result<ExpressionItem> {
        if self.depth == MAX_NESTING {
            return Err(JsonQlError::syntax("nesting too deep", self.peek().position));
        }
        self.depth += 1;
        let item = self.parse_operations(min_precedence);
        self.depth -= 1;
        item
    }

    fn parse_operations(&mut self, min_precedence: u8) -> Result<ExpressionItem> {
        let mut left = self.parse_unary()?;
        loop {
            if let Some(op) = self.operator_at(OperatorKind::Postfix) {
                if op.precedence >= min_precedence {
                    let position = self.bump().position;
                    left = ExpressionItem::Operator(OperatorExpression { operator: op, operands: vec![left], position });
                    continue;
                }
            }
            let Some(op) = self.operator_at(OperatorKind::Binary) else { break };
            if op.precedence < min_precedence {
                break;
            }
            let position = self.bump().position;
            let right = self.parse_binary(op.precedence.saturating_add(1))?;
            left = ExpressionItem::Operator(OperatorExpression { operator: op, operands: vec![left, right], position });
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<ExpressionItem> {
        if let Some(op) = self.operator_at(OperatorKind::Prefix) {
            // A word prefix operator followed by a call or index is a plain name.
            let is_name = matches!(self.peek().kind, TokenKind::Identifier(_))
                && matches!(self.peek_kind_at(1), TokenKind::LeftParen | TokenKind::LeftBracket | TokenKind::Arrow);
            if !is_name {
                let position = self.bump().position;
                let operand = self.parse_binary(op.precedence)?;
                return Ok(ExpressionItem::Operator(OperatorExpression { operator: op, operands: vec![operand], position }));
            }
        }
        self.parse_primary()
    }

    fn parse_primary(&mut self) -> Result<ExpressionItem> {
        let token = self.peek().clone();
        match token.kind {
            TokenKind::Number(text) => {
                self.bump();
                Ok(ExpressionItem::Literal(LiteralExpression { kind: LiteralKind::Number, text, position: token.position }))
            }
            TokenKind::Text(text) => {
                self.bump();
                Ok(ExpressionItem::Literal(LiteralExpression { kind: LiteralKind::Text, text, position: token.position }))
            }
            TokenKind::Identifier(name) => {
                self.bump();
                match self.peek().kind {
                    TokenKind::Arrow => {
                        self.bump();
                        let parameters = vec![LambdaParameter { name, position: token.position }];
                        self.parse_lambda_body(parameters, token.position)
                    }
                    TokenKind::LeftParen => {
                        self.bump();
                        let arguments = self.parse_arguments(TokenKind::RightParen, token.position)?;
                        Ok(ExpressionItem::Braces(BracesExpression {
                            name: Some(name),
                            kind: BraceKind::Round,
                            arguments,
                            position: token.position,
                        }))
                    }
                    TokenKind::LeftBracket => {
                        self.bump();
                        let arguments = self.parse_arguments(TokenKind::RightBracket, token.position)?;
                        if arguments.is_empty() {
                            return Err(JsonQlError::syntax("indexer requires at least one index", token.position));
                        }
                        Ok(ExpressionItem::Braces(BracesExpression {
                            name: Some(name),
                            kind: BraceKind::Square,
                            arguments,
                            position: token.position,
                        }))
                    }
                    _ => Ok(ExpressionItem::Literal(LiteralExpression {
                        kind: LiteralKind::Identifier,
                        text: name,
                        position: token.position,
                    })),
                }
            }
            TokenKind::LeftParen => {
                if let Some(parameters) = self.try_lambda_parameters() {
                    return self.parse_lambda_body(parameters, token.position);
                }
                self.bump();
                let arguments = self.parse_arguments(TokenKind::RightParen, token.position)?;
                if arguments.len() != 1 {
                    return Err(JsonQlError::syntax("parentheses must contain exactly one expression", token.position));
                }
                Ok(ExpressionItem::Braces(BracesExpression {
                    name: None,
                    kind: BraceKind::Round,
                    arguments,
                    position: token.position,
                }))
            }
            TokenKind::End => Err(JsonQlError::syntax("unexpected end of expression", token.position)),
            other => Err(JsonQlError::syntax(format!("unexpected {other}"), token.position)),
        }
    }

    /// Consumes `(a, b) =>` and returns the parameters, or leaves the
    /// position untouched when the parentheses are not a lambda head.
    fn try_lambda_parameters(&mut self) -> Option<Vec<LambdaParameter>> {
        let mut offset = 1;
        let mut parameters = Vec::new();
        loop {
            match self.peek_kind_at(offset) {
                TokenKind::RightParen if parameters.is_empty() => break,
                TokenKind::Identifier(name) => {
                    let position = self.tokens[self.pos + offset].position;
                    parameters.push(LambdaParameter { name: name.clone(), position });
                    offset += 1;
                    match self.peek_kind_at(offset) {
                        TokenKind::Comma => offset += 1,
                        TokenKind::RightParen => break,
                        _ => return None,
                    }
                }
                _ => return None,
            }
        }
        if self.peek_kind_at(offset + 1) != &TokenKind::Arrow {
            return None;
        }
        self.pos += offset + 2;
        Some(parameters)
    }

    fn parse_lambda_body(&mut self, parameters: Vec<LambdaParameter>, position: Position) -> Result<ExpressionItem> {
        for (i, parameter) in parameters.iter().enumerate() {
            if self.language.is_keyword(&parameter.name) {
                return Err(JsonQlError::syntax(
                    format!("keyword '{}' cannot be a lambda parameter", parameter.name),
                    parameter.position,
                ));
            }
            if parameters[..i].iter().any(|p| p.name == parameter.name) {
                return Err(JsonQlError::syntax(
                    format!("duplicate lambda parameter '{}'", parameter.name),
                    parameter.position,
                ));
            }
        }
        let body = self.parse_binary(0)?;
        Ok(ExpressionItem::Lambda(LambdaExpression { parameters, body: Box::new(body), position }))
    }

    fn parse_arguments(&mut self, close: TokenKind, open_position: Position) -> Result<Vec<ExpressionItem>> {
        let mut out = Vec::new();
        if self.peek().kind == close {
            self.bump();
            return Ok(out);
        }
        loop {
            out.push(self.parse_binary(0)?);
            let token = self.bump();
            match token.kind {
                TokenKind::Comma => continue,
                ref kind if *kind == close => return Ok(out),
                TokenKind::End => {
                    return Err(JsonQlError::syntax(format!("missing closing {close}"), open_position));
                }
                other => {
                    return Err(JsonQlError::syntax(format!("expected ',' or {close} but found {other}"), token.position));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn parse(text: &str) -> Result<ExpressionItem> {
        parse_expression(text, Position::START, &LanguageDefinition::default())
    }

    /// Compact s-expression rendering for assertions.
    fn render(item: &ExpressionItem) -> String {
        match item {
            ExpressionItem::Literal(l) => match l.kind {
                LiteralKind::Text => format!("'{}'", l.text),
                _ => l.text.clone(),
            },
            ExpressionItem::Operator(o) => {
                let operands: Vec<String> = o.operands.iter().map(render).collect();
                format!("({} {})", o.operator.name, operands.join(" "))
            }
            ExpressionItem::Braces(b) => {
                let args: Vec<String> = b.arguments.iter().map(render).collect();
                let (open, close) = if b.kind == BraceKind::Round { ("(", ")") } else { ("[", "]") };
                format!("{}{open}{}{close}", b.name.clone().unwrap_or_default(), args.join(", "))
            }
            ExpressionItem::Lambda(l) => {
                let names: Vec<&str> = l.parameters.iter().map(|p| p.name.as_str()).collect();
                format!("<{}> => {}", names.join(","), render(&l.body))
            }
        }
    }

    #[test]
    fn precedence_and_associativity() {
        assert_eq!(render(&parse("1 + 2 * 3 - 4").unwrap()), "(- (+ 1 (* 2 3)) 4)");
        assert_eq!(render(&parse("a || b && !c").unwrap()), "(|| a (&& b (! c)))");
        assert_eq!(render(&parse("-A.B * 2").unwrap()), "(* (- (. A B)) 2)");
        assert_eq!(render(&parse("A.B : 5 + 1").unwrap()), "(: (. A B) (+ 5 1))");
    }

    #[test]
    fn paths_calls_and_lambdas() {
        assert_eq!(
            render(&parse("A.Where(x => x > 2).Select((x, i) => x + i)").unwrap()),
            "(. (. A Where(<x> => (> x 2))) Select(<x,i> => (+ x i)))"
        );
        assert_eq!(render(&parse("Matrix[1, 0]").unwrap()), "Matrix[1, 0]");
        assert_eq!(render(&parse("Count(A, () => true)").unwrap()), "Count(A, <> => true)");
        assert_eq!(render(&parse("(1 + 2) * 3").unwrap()), "(* ((+ 1 2)) 3)");
    }

    #[test]
    fn postfix_assert_binds_after_path() {
        assert_eq!(render(&parse("A.B assert + 1").unwrap()), "(+ (assert (. A B)) 1)");
    }

    #[test]
    fn positions_are_absolute() {
        let item = parse_expression("Sum(A)", Position::new(3, 20), &LanguageDefinition::default()).unwrap();
        let ExpressionItem::Braces(call) = item else { panic!("expected call") };
        assert_eq!(call.position, Position::new(3, 20));
        assert_eq!(call.arguments[0].position(), Position::new(3, 24));
    }

    #[test]
    fn syntax_errors() {
        let err = parse("Sum(A").unwrap_err();
        assert_eq!(err.message(), "missing closing ')'");
        assert_eq!(err.position(), Some(Position::new(1, 1)));

        assert_eq!(parse("").unwrap_err().message(), "expression is empty");
        assert_eq!(parse("A B").unwrap_err().message(), "unexpected 'B'");
        assert_eq!(parse("1 +").unwrap_err().message(), "unexpected end of expression");
        assert_eq!(parse("A # 1").unwrap_err().message(), "unexpected character '#'");
        assert_eq!(parse("(x, x) => x").unwrap_err().message(), "duplicate lambda parameter 'x'");
        assert_eq!(parse("this => 1").unwrap_err().message(), "keyword 'this' cannot be a lambda parameter");
    }

    #[test]
    fn deep_nesting_is_an_error() {
        let parens = format!("{}1{}", "(".repeat(10_000), ")".repeat(10_000));
        assert_eq!(parse(&parens).unwrap_err().message(), "nesting too deep");
        assert_eq!(parse(&"-".repeat(10_000)).unwrap_err().message(), "nesting too deep");
        assert_eq!(parse(&vec!["1"; 300].join(" + ")).unwrap_err().message(), "nesting too deep");

        assert!(parse(&vec!["1"; 100].join(" + ")).is_ok());
        assert!(parse(&format!("{}1{}", "(".repeat(60), ")".repeat(60))).is_ok());
    }
}
