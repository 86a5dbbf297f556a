// src/parser.rs
use crate::errors::{JsonQlError, Position, Result};

/// Deepest nesting accepted in JSON text and in expressions.
pub const MAX_NESTING: usize = 128;

/// Character scanner shared by the JSON text reader and the expression tokenizer.
/// Tracks the 1-based line/column of the next character.
pub struct Scanner<'a> {
    s: &'a str,
    i: usize,
    position: Position,
}

impl<'a> Scanner<'a> {
    pub fn new(s: &'a str) -> Self {
        Self::with_origin(s, Position::START)
    }

    /// Scanner whose first character sits at `origin` in the enclosing text.
    pub fn with_origin(s: &'a str, origin: Position) -> Self {
        Self { s, i: 0, position: origin }
    }

    pub fn position(&self) -> Position {
        self.position
    }

    pub fn error(&self, message: impl Into<String>) -> JsonQlError {
        JsonQlError::syntax(message, self.position)
    }

    pub fn parse_identifier(&mut self) -> Result<String> {
        let start = self.i;
        while let Some(c) = self.peek_char() {
            if c == '_' || c == '$' || c.is_alphanumeric() {
                self.advance();
            } else {
                break;
            }
        }
        if self.i == start {
            return Err(self.error("identifier expected"));
        }
        Ok(self.s[start..self.i].to_string())
    }

    /// Scans a number and returns its raw text. Accepts an optional leading
    /// minus, fraction and exponent; validation is left to the caller.
    pub fn scan_number_text(&mut self) -> Result<&'a str> {
        let start = self.i;
        let start_position = self.position;
        self.consume_char('-');
        if self.peek_str("0x") || self.peek_str("0X") {
            self.advance();
            self.advance();
            while self.peek_char().is_some_and(|c| c.is_ascii_hexdigit()) {
                self.advance();
            }
            return Ok(&self.s[start..self.i]);
        }
        self.skip_digits();
        if self.peek_char() == Some('.') && self.peek_nth(1).is_some_and(|c| c.is_ascii_digit()) {
            self.advance();
            self.skip_digits();
        }
        if matches!(self.peek_char(), Some('e') | Some('E')) {
            let exponent_follows = match self.peek_nth(1) {
                Some('+') | Some('-') => self.peek_nth(2).is_some_and(|c| c.is_ascii_digit()),
                Some(c) => c.is_ascii_digit(),
                None => false,
            };
            if exponent_follows {
                self.advance();
                if matches!(self.peek_char(), Some('+') | Some('-')) {
                    self.advance();
                }
                self.skip_digits();
            }
        }
        let text = &self.s[start..self.i];
        if text.is_empty() || text == "-" {
            return Err(JsonQlError::syntax("number expected", start_position));
        }
        Ok(text)
    }

    fn skip_digits(&mut self) {
        while self.peek_char().is_some_and(|c| c.is_ascii_digit()) {
            self.advance();
        }
    }

    /// Parses a `'…'` or `"…"` string with backslash escapes (JSON escapes plus `\'`).
    pub fn parse_quoted_string(&mut self) -> Result<String> {
        self.parse_quoted_string_with_columns().map(|(text, _)| text)
    }

    /// Like [`parse_quoted_string`](Self::parse_quoted_string), also returning
    /// the source column of every decoded character followed by the column
    /// of the closing quote.
    pub fn parse_quoted_string_with_columns(&mut self) -> Result<(String, Vec<usize>)> {
        let start_position = self.position;
        let quote = self.peek_char().ok_or_else(|| self.error("string expected"))?;
        if quote != '\'' && quote != '"' {
            return Err(self.error("expected quoted string"));
        }
        self.advance();
        let mut out = String::new();
        let mut columns = Vec::new();
        while let Some(c) = self.peek_char() {
            if c == '\n' {
                break;
            }
            let column = self.position.column;
            columns.push(column);
            self.advance();
            if c == quote {
                return Ok((out, columns));
            }
            if c == '\\' {
                let escape_position = self.position;
                let Some(nc) = self.peek_char() else { break };
                self.advance();
                match nc {
                    'n' => out.push('\n'),
                    't' => out.push('\t'),
                    'r' => out.push('\r'),
                    'b' => out.push('\u{8}'),
                    'f' => out.push('\u{c}'),
                    '/' => out.push('/'),
                    '\\' => out.push('\\'),
                    '"' => out.push('"'),
                    '\'' => out.push('\''),
                    'u' => out.push(self.parse_unicode_escape(escape_position)?),
                    _ => {
                        return Err(JsonQlError::syntax(
                            format!("invalid escape sequence '\\{nc}'"),
                            escape_position,
                        ))
                    }
                }
            } else {
                out.push(c);
            }
        }
        Err(JsonQlError::syntax("unterminated string", start_position))
    }

    fn parse_unicode_escape(&mut self, escape_position: Position) -> Result<char> {
        let high = self.parse_hex4(escape_position)?;
        if (0xD800..0xDC00).contains(&high) {
            if self.peek_str("\\u") {
                self.advance();
                self.advance();
                let low = self.parse_hex4(escape_position)?;
                let code = 0x10000 + ((high - 0xD800) << 10) + (low.wrapping_sub(0xDC00) & 0x3FF);
                return char::from_u32(code)
                    .ok_or_else(|| JsonQlError::syntax("invalid unicode escape", escape_position));
            }
            return Err(JsonQlError::syntax("unpaired surrogate in unicode escape", escape_position));
        }
        char::from_u32(high).ok_or_else(|| JsonQlError::syntax("invalid unicode escape", escape_position))
    }

    fn parse_hex4(&mut self, escape_position: Position) -> Result<u32> {
        let mut value = 0u32;
        for _ in 0..4 {
            let digit = self
                .peek_char()
                .and_then(|c| c.to_digit(16))
                .ok_or_else(|| JsonQlError::syntax("invalid unicode escape", escape_position))?;
            self.advance();
            value = value * 16 + digit;
        }
        Ok(value)
    }

    pub fn expect(&mut self, c: char) -> Result<()> {
        if self.consume_char(c) {
            Ok(())
        } else {
            Err(self.error(format!("expected '{}'", c)))
        }
    }

    pub fn consume_char(&mut self, c: char) -> bool {
        if self.peek_char() == Some(c) {
            self.advance();
            true
        } else {
            false
        }
    }

    pub fn consume_str(&mut self, lit: &str) -> bool {
        if self.peek_str(lit) {
            for _ in lit.chars() {
                self.advance();
            }
            true
        } else {
            false
        }
    }

    pub fn advance(&mut self) -> Option<char> {
        let c = self.peek_char()?;
        self.i += c.len_utf8();
        if c == '\n' {
            self.position.line += 1;
            self.position.column = 1;
        } else {
            self.position.column += 1;
        }
        Some(c)
    }

    pub fn peek_char(&self) -> Option<char> {
        self.s[self.i..].chars().next()
    }

    pub fn peek_nth(&self, n: usize) -> Option<char> {
        self.s[self.i..].chars().nth(n)
    }

    pub fn peek_str(&self, lit: &str) -> bool {
        self.s[self.i..].starts_with(lit)
    }

    pub fn skip_ws(&mut self) {
        while let Some(c) = self.peek_char() {
            if c.is_whitespace() {
                self.advance();
            } else {
                break;
            }
        }
    }

    pub fn eof(&self) -> bool {
        self.i >= self.s.len()
    }
}
