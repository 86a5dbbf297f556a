use std::sync::Arc;

use crate::errors::{JsonQlError, Result};
use crate::factories::{CollectionSelectorFactory, CompileScope};
use crate::functions::builtins::arity_message;
use crate::functions::selectors::{
    names, AtSelector, CollectionSelector, DistinctSelector, FirstSelector, FlattenSelector, ReverseSelector,
    SelectSelector, WhereSelector,
};
use crate::syntax::{BraceKind, BracesExpression};

#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultCollectionSelectorFactory;

fn check_arity(braces: &BracesExpression, name: &str, min: usize, max: usize) -> Result<()> {
    let actual = braces.arguments.len();
    if actual < min || actual > max {
        return Err(JsonQlError::syntax(arity_message(name, &(min..=max), actual), braces.position));
    }
    Ok(())
}

impl CollectionSelectorFactory for DefaultCollectionSelectorFactory {
    fn try_create(
        &self,
        braces: &BracesExpression,
        scope: &CompileScope<'_>,
    ) -> Result<Option<Arc<dyn CollectionSelector>>> {
        let Some(name) = braces.name.as_deref() else {
            return Ok(None);
        };
        if braces.kind != BraceKind::Round {
            return Ok(None);
        }
        let optional_lambda = || -> Result<_> {
            braces.arguments.first().map(|item| scope.compile_lambda(item, name)).transpose()
        };
        let selector: Arc<dyn CollectionSelector> = match name {
            names::WHERE => {
                check_arity(braces, name, 1, 1)?;
                Arc::new(WhereSelector::new(scope.compile_lambda(&braces.arguments[0], name)?))
            }
            names::SELECT => {
                check_arity(braces, name, 1, 1)?;
                Arc::new(SelectSelector::new(scope.compile_lambda(&braces.arguments[0], name)?))
            }
            names::FIRST => {
                check_arity(braces, name, 0, 1)?;
                Arc::new(FirstSelector::first(optional_lambda()?))
            }
            names::LAST => {
                check_arity(braces, name, 0, 1)?;
                Arc::new(FirstSelector::last(optional_lambda()?))
            }
            names::FLATTEN => {
                check_arity(braces, name, 0, 0)?;
                Arc::new(FlattenSelector)
            }
            names::REVERSE => {
                check_arity(braces, name, 0, 0)?;
                Arc::new(ReverseSelector)
            }
            names::DISTINCT => {
                check_arity(braces, name, 0, 0)?;
                Arc::new(DistinctSelector)
            }
            names::AT => {
                check_arity(braces, name, 1, usize::MAX)?;
                let indexes = braces.arguments.iter().map(|a| scope.compile(a)).collect::<Result<Vec<_>>>()?;
                Arc::new(AtSelector::new(indexes))
            }
            _ => return Ok(None),
        };
        Ok(Some(selector))
    }
}
