//! JSON text reader.
//!
//! Documents are read into an arena of positioned nodes so the compiler can
//! rewrite them in place (mutators) before freezing them into an immutable
//! [`ParsedValue`] tree.

use std::collections::HashMap;
use std::sync::Arc;

use crate::errors::{JsonQlError, Position, Result};
use crate::parsed_value::{ParsedArrayValue, ParsedJson, ParsedValue};
use crate::parser::{Scanner, MAX_NESTING};
use crate::path::JsonPath;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(usize);

#[derive(Debug, Clone)]
pub enum NodeKind {
    Object(Vec<(String, NodeId)>),
    Array(Vec<NodeId>),
    Scalar { text: String, quoted: bool },
    /// Value produced by a mutator; placed at the node's path when frozen.
    Imported(Arc<ParsedValue>),
}

#[derive(Debug, Clone)]
pub struct JsonNode {
    pub kind: NodeKind,
    pub position: Position,
    /// Source columns of a quoted scalar's characters when escapes make
    /// them differ from the decoded text.
    columns: Option<Vec<usize>>,
}

impl JsonNode {
    fn new(kind: NodeKind, position: Position) -> Self {
        Self { kind, position, columns: None }
    }

    /// Source position of character `offset` of a quoted scalar.
    pub fn text_position(&self, offset: usize) -> Position {
        match &self.columns {
            Some(columns) => {
                let column = columns.get(offset).or(columns.last()).copied().unwrap_or(self.position.column);
                Position::new(self.position.line, column)
            }
            None => self.position.shifted(1 + offset),
        }
    }
}

/// Where a node sits inside its container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Slot {
    Property { object: NodeId, name: String },
    Item { array: NodeId, index: usize },
}

#[derive(Debug, Clone)]
pub struct JsonArena {
    nodes: Vec<JsonNode>,
    root: NodeId,
}

impl JsonArena {
    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn node(&self, id: NodeId) -> &JsonNode {
        &self.nodes[id.0]
    }

    pub fn add(&mut self, kind: NodeKind, position: Position) -> NodeId {
        self.nodes.push(JsonNode::new(kind, position));
        NodeId(self.nodes.len() - 1)
    }

    pub fn set_kind(&mut self, id: NodeId, kind: NodeKind) {
        let node = &mut self.nodes[id.0];
        node.kind = kind;
        node.columns = None;
    }

    /// Nodes reachable from the root, parents before children, in text order.
    pub fn document_order(&self) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack = vec![self.root];
        while let Some(id) = stack.pop() {
            out.push(id);
            match &self.node(id).kind {
                NodeKind::Object(properties) => stack.extend(properties.iter().rev().map(|(_, child)| *child)),
                NodeKind::Array(items) => stack.extend(items.iter().rev().copied()),
                _ => {}
            }
        }
        out
    }

    /// Paths of the nodes reachable from the root.
    pub fn node_paths(&self, document_id: &str) -> HashMap<NodeId, JsonPath> {
        let mut paths = HashMap::new();
        let mut stack = vec![(self.root, JsonPath::root(document_id))];
        while let Some((id, path)) = stack.pop() {
            match &self.node(id).kind {
                NodeKind::Object(properties) => {
                    stack.extend(properties.iter().map(|(name, child)| (*child, path.child_property(name))));
                }
                NodeKind::Array(items) => {
                    stack.extend(items.iter().enumerate().map(|(i, child)| (*child, path.child_index(i))));
                }
                _ => {}
            }
            paths.insert(id, path);
        }
        paths
    }

    pub fn is_attached(&self, id: NodeId) -> bool {
        id == self.root || self.slot_of(id).is_some()
    }

    pub fn slot_of(&self, id: NodeId) -> Option<Slot> {
        self.nodes.iter().enumerate().find_map(|(i, node)| match &node.kind {
            NodeKind::Object(properties) => properties
                .iter()
                .find(|(_, child)| *child == id)
                .map(|(name, _)| Slot::Property { object: NodeId(i), name: name.clone() }),
            NodeKind::Array(items) => {
                items.iter().position(|child| *child == id).map(|index| Slot::Item { array: NodeId(i), index })
            }
            _ => None,
        })
    }

    /// Detaches `id` from its container. Returns false for the root.
    pub fn remove(&mut self, id: NodeId) -> bool {
        match self.slot_of(id) {
            Some(Slot::Property { object, name }) => {
                if let NodeKind::Object(properties) = &mut self.nodes[object.0].kind {
                    properties.retain(|(n, _)| *n != name);
                }
                true
            }
            Some(Slot::Item { array, index }) => {
                if let NodeKind::Array(items) = &mut self.nodes[array.0].kind {
                    items.remove(index);
                }
                true
            }
            None => false,
        }
    }

    /// Replaces array item `id` with `replacement`, in place.
    pub fn splice(&mut self, id: NodeId, replacement: Vec<NodeId>) -> Result<()> {
        let Some(Slot::Item { array, index }) = self.slot_of(id) else {
            return Err(JsonQlError::Internal("splice target is not an array item".to_string()));
        };
        if let NodeKind::Array(items) = &mut self.nodes[array.0].kind {
            items.splice(index..=index, replacement);
        }
        Ok(())
    }

    /// Replaces property `name` of `object` with `replacement`, at the same place.
    pub fn splice_property(&mut self, object: NodeId, name: &str, replacement: Vec<(String, NodeId)>) {
        if let NodeKind::Object(properties) = &mut self.nodes[object.0].kind {
            if let Some(index) = properties.iter().position(|(n, _)| n == name) {
                properties.splice(index..=index, replacement);
            }
        }
    }

    pub fn has_property(&self, object: NodeId, name: &str) -> bool {
        matches!(&self.node(object).kind, NodeKind::Object(properties) if properties.iter().any(|(n, _)| n == name))
    }

    /// Immutable value tree of the current state, rooted in `document_id`.
    pub fn freeze(&self, document_id: &str) -> Arc<ParsedValue> {
        self.build(self.root, JsonPath::root(document_id))
    }

    fn build(&self, id: NodeId, path: JsonPath) -> Arc<ParsedValue> {
        let value = match &self.node(id).kind {
            NodeKind::Object(properties) => ParsedValue::Json(ParsedJson {
                properties: properties
                    .iter()
                    .map(|(name, child)| (name.clone(), self.build(*child, path.child_property(name))))
                    .collect(),
                path_in_referenced_json: None,
                path,
            }),
            NodeKind::Array(items) => ParsedValue::Array(ParsedArrayValue {
                values: items.iter().enumerate().map(|(i, child)| self.build(*child, path.child_index(i))).collect(),
                path_in_referenced_json: None,
                path,
            }),
            NodeKind::Scalar { text, quoted } => ParsedValue::simple(path, text.clone(), *quoted),
            NodeKind::Imported(value) => {
                if value.path() == &path {
                    return Arc::clone(value);
                }
                value.copied_to(path)
            }
        };
        Arc::new(value)
    }
}

/// Reads `text` into an arena. Any malformed input is a syntax error.
pub fn read_json(text: &str) -> Result<JsonArena> {
    let mut reader = Reader { s: Scanner::new(text), nodes: Vec::new(), depth: 0 };
    let root = reader.value()?;
    reader.s.skip_ws();
    if !reader.s.eof() {
        return Err(reader.s.error("unexpected content after the JSON value"));
    }
    Ok(JsonArena { nodes: reader.nodes, root })
}

struct Reader<'a> {
    s: Scanner<'a>,
    nodes: Vec<JsonNode>,
    depth: usize,
}

impl Reader<'_> {
    fn push(&mut self, kind: NodeKind, position: Position) -> NodeId {
        self.nodes.push(JsonNode::new(kind, position));
        NodeId(self.nodes.len() - 1)
    }

    fn container(&mut self, open: char, position: Position) -> Result<NodeId> {
        if self.depth == MAX_NESTING {
            return Err(JsonQlError::syntax("nesting too deep", position));
        }
        self.depth += 1;
        let node = if open == '{' { self.object(position) } else { self.array(position) };
        self.depth -= 1;
        node
    }

    fn value(&mut self) -> Result<NodeId> {
        self.s.skip_ws();
        let position = self.s.position();
        match self.s.peek_char() {
            Some(open @ ('{' | '[')) => self.container(open, position),
            Some('"') => {
                let (text, columns) = self.s.parse_quoted_string_with_columns()?;
                let id = self.push(NodeKind::Scalar { text, quoted: true }, position);
                let plain = columns.iter().enumerate().all(|(i, column)| *column == position.column + 1 + i);
                if !plain {
                    self.nodes[id.0].columns = Some(columns);
                }
                Ok(id)
            }
            Some(c) if c == '-' || c.is_ascii_digit() => {
                let text = self.s.scan_number_text()?;
                if text.parse::<serde_json::Number>().is_err() {
                    return Err(JsonQlError::syntax(format!("invalid number '{text}'"), position));
                }
                Ok(self.push(NodeKind::Scalar { text: text.to_string(), quoted: false }, position))
            }
            Some(c) if c.is_alphabetic() => {
                let word = self.s.parse_identifier()?;
                if !matches!(word.as_str(), "true" | "false" | "null") {
                    return Err(JsonQlError::syntax(format!("invalid literal '{word}'"), position));
                }
                Ok(self.push(NodeKind::Scalar { text: word, quoted: false }, position))
            }
            Some(c) => Err(self.s.error(format!("unexpected character '{c}'"))),
            None => Err(self.s.error("unexpected end of JSON text")),
        }
    }

    fn object(&mut self, position: Position) -> Result<NodeId> {
        self.s.expect('{')?;
        let mut properties: Vec<(String, NodeId)> = Vec::new();
        self.s.skip_ws();
        if self.s.consume_char('}') {
            return Ok(self.push(NodeKind::Object(properties), position));
        }
        loop {
            self.s.skip_ws();
            let key_position = self.s.position();
            if self.s.peek_char() != Some('"') {
                return Err(self.s.error("expected a property name"));
            }
            let name = self.s.parse_quoted_string()?;
            if properties.iter().any(|(n, _)| *n == name) {
                return Err(JsonQlError::syntax(format!("duplicate property '{name}'"), key_position));
            }
            self.s.skip_ws();
            self.s.expect(':')?;
            let value = self.value()?;
            properties.push((name, value));
            self.s.skip_ws();
            if self.s.consume_char(',') {
                continue;
            }
            if self.s.consume_char('}') {
                return Ok(self.push(NodeKind::Object(properties), position));
            }
            return Err(if self.s.eof() {
                JsonQlError::syntax("missing closing '}'", position)
            } else {
                self.s.error("expected ',' or '}'")
            });
        }
    }

    fn array(&mut self, position: Position) -> Result<NodeId> {
        self.s.expect('[')?;
        let mut items = Vec::new();
        self.s.skip_ws();
        if self.s.consume_char(']') {
            return Ok(self.push(NodeKind::Array(items), position));
        }
        loop {
            items.push(self.value()?);
            self.s.skip_ws();
            if self.s.consume_char(',') {
                continue;
            }
            if self.s.consume_char(']') {
                return Ok(self.push(NodeKind::Array(items), position));
            }
            return Err(if self.s.eof() {
                JsonQlError::syntax("missing closing ']'", position)
            } else {
                self.s.error("expected ',' or ']'")
            });
        }
    }
}
