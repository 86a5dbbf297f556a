use std::fmt;
use std::sync::Arc;

use itertools::Itertools;

/// One logical step of a path inside a document.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PathElement {
    Property(String),
    /// Indexes into nested arrays: `[1, 0]` addresses `value[1][0]`.
    Indexes(Vec<usize>),
}

/// Relation of one path to another, see [`JsonPath::compare`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathRelation {
    None,
    Child,
    Parent,
    Equal,
    Sibling,
}

/// Location of a value inside the document `document_id`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct JsonPath {
    document_id: Arc<str>,
    pub segments: Vec<PathElement>,
}

impl JsonPath {
    pub fn root(document_id: impl Into<Arc<str>>) -> Self {
        Self { document_id: document_id.into(), segments: Vec::new() }
    }

    pub fn document_id(&self) -> &str {
        &self.document_id
    }

    pub fn child_property(&self, name: impl Into<String>) -> Self {
        let mut path = self.clone();
        path.segments.push(PathElement::Property(name.into()));
        path
    }

    /// Path of item `index` of the array at this path. Nested arrays extend
    /// the trailing index list instead of adding a new element.
    pub fn child_index(&self, index: usize) -> Self {
        let mut path = self.clone();
        match path.segments.last_mut() {
            Some(PathElement::Indexes(indexes)) => indexes.push(index),
            _ => path.segments.push(PathElement::Indexes(vec![index])),
        }
        path
    }

    /// Path of the containing object or array; `None` for the root.
    pub fn parent(&self) -> Option<JsonPath> {
        let mut path = self.clone();
        if let PathElement::Indexes(mut indexes) = path.segments.pop()? {
            if indexes.len() > 1 {
                indexes.pop();
                path.segments.push(PathElement::Indexes(indexes));
            }
        }
        Some(path)
    }

    /// Compares `self` (A) with `other` (B) by prefix matching:
    /// `Child` means A is a descendant of B, `Parent` the reverse.
    pub fn compare(&self, other: &JsonPath) -> PathRelation {
        if self.document_id != other.document_id {
            return PathRelation::None;
        }
        let (a, b) = (self.steps(), other.steps());
        let common = a.iter().zip(b.iter()).take_while(|(x, y)| x == y).count();

        if a.len() == b.len() {
            if common == a.len() {
                return PathRelation::Equal;
            }
            if common + 1 == a.len() {
                return PathRelation::Sibling;
            }
            return PathRelation::None;
        }
        if common == b.len() {
            return PathRelation::Child;
        }
        if common == a.len() {
            return PathRelation::Parent;
        }
        PathRelation::None
    }

    /// Segments with index lists split into single indexes.
    fn steps(&self) -> Vec<Step<'_>> {
        self.segments
            .iter()
            .flat_map(|segment| match segment {
                PathElement::Property(name) => vec![Step::Property(name)],
                PathElement::Indexes(indexes) => indexes.iter().map(|i| Step::Index(*i)).collect(),
            })
            .collect()
    }
}

#[derive(Debug, PartialEq)]
enum Step<'a> {
    Property(&'a str),
    Index(usize),
}

impl fmt::Display for JsonPath {
    /// Renders `Companies[0].Employees[1,2]`; the root renders as `$`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.segments.is_empty() {
            return write!(f, "$");
        }
        let mut first = true;
        for segment in &self.segments {
            match segment {
                PathElement::Property(name) => {
                    if !first {
                        write!(f, ".")?;
                    }
                    write!(f, "{name}")?;
                }
                PathElement::Indexes(indexes) => write!(f, "[{}]", indexes.iter().join(","))?,
            }
            first = false;
        }
        Ok(())
    }
}
