//! Renders the relational model and XR expressions to tokens
//!
//! One [`Tokenizer`] serves one compilation. Subqueries nested in
//! expressions are flattened and post-processed on the way, with the same
//! tracer.

mod action;
mod expr;
mod functions;
mod query;

pub use action::ActionTokens;

use crate::dialect::SqlDialect;
use crate::flatten::Flattener;
use crate::post;
use crate::token::Token;
use qx_core::error::CompileResult;
use qx_core::trace::Tracer;
use qx_core::xr::{Ident, Query};
use qx_norm::FreshNames;
use std::collections::HashMap;

/// How references through an identifier are rendered
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Qualifier {
    /// `name.column`
    Named(String),
    /// `column`
    Bare,
    /// `VALUES(column)`, MySQL's reference to the row that failed to insert
    Values,
}

/// Dialect-aware renderer
pub struct Tokenizer<'d, 't> {
    dialect: &'d dyn SqlDialect,
    tracer: &'t mut Tracer,
    qualifiers: HashMap<String, Qualifier>,
    fresh: FreshNames,
}

impl<'d, 't> Tokenizer<'d, 't> {
    pub fn new(dialect: &'d dyn SqlDialect, tracer: &'t mut Tracer) -> Self {
        Self {
            dialect,
            tracer,
            qualifiers: HashMap::new(),
            fresh: FreshNames::new(),
        }
    }

    /// Mint names for nested subqueries from an existing counter
    pub fn with_names(mut self, fresh: FreshNames) -> Self {
        self.fresh = fresh;
        self
    }

    pub fn dialect(&self) -> &dyn SqlDialect {
        self.dialect
    }

    /// Flatten, post-process and render a query nested in an expression
    fn subquery(&mut self, q: &Query) -> CompileResult<Token> {
        let mut flattener = Flattener::new(self.tracer).with_names(std::mem::take(&mut self.fresh));
        let flat = flattener.apply(q);
        self.fresh = flattener.into_names();
        let prepared = post::prepare(flat?, false, self.tracer)?;
        self.tokenize_query(&prepared)
    }

    /// Render `f` with `aliases` bound by a FROM clause, hiding any action
    /// qualifier of the same name
    fn shadowing<T>(
        &mut self,
        aliases: &[&Ident],
        f: impl FnOnce(&mut Self) -> CompileResult<T>,
    ) -> CompileResult<T> {
        let saved: Vec<(String, Qualifier)> = aliases
            .iter()
            .filter_map(|a| self.qualifiers.remove_entry(&a.name))
            .collect();
        let out = f(self);
        self.qualifiers.extend(saved);
        out
    }

    /// Render `f` with extra qualifiers in scope
    fn qualified<T>(
        &mut self,
        bindings: Vec<(&Ident, Qualifier)>,
        f: impl FnOnce(&mut Self) -> CompileResult<T>,
    ) -> CompileResult<T> {
        let names: Vec<String> = bindings.iter().map(|(id, _)| id.name.clone()).collect();
        let saved: Vec<(String, Option<Qualifier>)> = bindings
            .into_iter()
            .map(|(id, q)| (id.name.clone(), self.qualifiers.insert(id.name.clone(), q)))
            .collect();
        let out = f(self);
        for name in names {
            self.qualifiers.remove(&name);
        }
        for (name, previous) in saved {
            if let Some(q) = previous {
                self.qualifiers.insert(name, q);
            }
        }
        out
    }
}

#[cfg(test)]
#[path = "tokenize_test.rs"]
mod tests;
