//! Builds path lookups from `.` chains: `this.A[0].Where(x => x.B).C`.

use std::sync::Arc;

use crate::errors::{JsonQlError, Result};
use crate::factories::CompileScope;
use crate::functions::path::{LookupScope, PathLookupFunction, PathStart, PathStep};
use crate::functions::FunctionRef;
use crate::language::{keywords, operators};
use crate::syntax::{BraceKind, BracesExpression, ExpressionItem, LiteralExpression, LiteralKind};

/// Operands of nested `.` operators, left to right.
fn flatten_chain<'e>(item: &'e ExpressionItem, chain: &mut Vec<&'e ExpressionItem>) {
    match item {
        ExpressionItem::Operator(expression) if expression.operator.name == operators::PATH => {
            for operand in &expression.operands {
                flatten_chain(operand, chain);
            }
        }
        other => chain.push(other),
    }
}

/// Property name of a path element written as `Name` or `'Name'`.
fn property_name(item: &ExpressionItem) -> Option<&str> {
    match item {
        ExpressionItem::Literal(LiteralExpression { kind: LiteralKind::Identifier | LiteralKind::Text, text, .. }) => {
            Some(text)
        }
        _ => None,
    }
}

impl CompileScope<'_> {
    pub(super) fn compile_path(&self, item: &ExpressionItem) -> Result<FunctionRef> {
        let mut chain = Vec::new();
        flatten_chain(item, &mut chain);
        let Some((first, rest)) = chain.split_first() else {
            return Err(JsonQlError::syntax("empty path", item.position()));
        };

        let mut steps = Vec::new();
        let (start, rest) = match (first.as_identifier(), rest.split_first()) {
            (Some(qualifier @ (keywords::THIS | keywords::PARENT)), Some((next, remaining))) => {
                let scope = if qualifier == keywords::THIS { LookupScope::ThisOnly } else { LookupScope::AncestorsOnly };
                match next {
                    ExpressionItem::Braces(BracesExpression { name: Some(name), kind: BraceKind::Square, .. }) => {
                        steps.extend(self.path_step(next)?.into_iter().skip(1));
                        (PathStart::Property { name: name.clone(), scope }, remaining)
                    }
                    _ => match property_name(next) {
                        Some(name) => (PathStart::Property { name: name.to_string(), scope }, remaining),
                        None if qualifier == keywords::THIS => (PathStart::This, rest),
                        None => (PathStart::Parent, rest),
                    },
                }
            }
            (Some(keywords::THIS), None) => (PathStart::This, rest),
            (Some(keywords::PARENT), None) => (PathStart::Parent, rest),
            _ => (self.path_start(first, &mut steps)?, rest),
        };

        for element in rest {
            steps.extend(self.path_step(element)?);
        }
        if let (PathStart::Function(function), true) = (&start, steps.is_empty()) {
            return Ok(Arc::clone(function));
        }
        Ok(Arc::new(PathLookupFunction::new(start, steps, first.position())))
    }

    /// Start of a path that is not qualified by `this` or `parent`.
    fn path_start(&self, first: &ExpressionItem, steps: &mut Vec<PathStep>) -> Result<PathStart> {
        let named_start = |name: &str| match self.resolve_variable(name) {
            Some((lambda, binding)) => PathStart::Variable { lambda, name: name.to_string(), binding },
            None => PathStart::Property { name: name.to_string(), scope: LookupScope::All },
        };
        match first {
            ExpressionItem::Literal(literal @ LiteralExpression { kind: LiteralKind::Identifier, .. }) => {
                match self.factories().literal.try_create(literal, self)? {
                    Some(function) => Ok(PathStart::Function(function)),
                    None => Ok(named_start(&literal.text)),
                }
            }
            ExpressionItem::Braces(BracesExpression { name: Some(name), kind: BraceKind::Square, .. }) => {
                steps.extend(self.path_step(first)?.into_iter().skip(1));
                Ok(named_start(name))
            }
            other => Ok(PathStart::Function(self.compile(other)?)),
        }
    }

    /// Steps for one element after a `.`.
    fn path_step(&self, element: &ExpressionItem) -> Result<Vec<PathStep>> {
        if let Some(name) = property_name(element) {
            return Ok(vec![PathStep::Property { name: name.to_string(), position: element.position() }]);
        }
        let ExpressionItem::Braces(braces @ BracesExpression { name: Some(name), .. }) = element else {
            return Err(JsonQlError::syntax(
                "expected a property name or a collection function after '.'",
                element.position(),
            ));
        };
        match braces.kind {
            BraceKind::Square => {
                let indexes = braces.arguments.iter().map(|a| self.compile(a)).collect::<Result<Vec<_>>>()?;
                Ok(vec![
                    PathStep::Property { name: name.clone(), position: braces.position },
                    PathStep::Index { indexes, position: braces.position },
                ])
            }
            BraceKind::Round => match self.factories().selectors.try_create(braces, self)? {
                Some(selector) => Ok(vec![PathStep::Selector { selector, position: braces.position }]),
                None => Err(JsonQlError::syntax(format!("unknown collection function '{name}'"), braces.position)),
            },
        }
    }
}
