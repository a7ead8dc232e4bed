//! Read-only analyses over XR trees

use super::expr::{CallKind, Expr};
use super::ident::Ident;
use super::query::Query;
use super::visit::{walk_expr_ref, walk_query_ref, Visit};
use std::collections::HashSet;

/// Collects free identifiers, respecting every binder
struct FreeIdents {
    bound: Vec<String>,
    found: Vec<Ident>,
}

impl FreeIdents {
    fn scoped<F: FnOnce(&mut Self)>(&mut self, binders: &[&Ident], f: F) {
        let depth = self.bound.len();
        self.bound.extend(binders.iter().map(|b| b.name.clone()));
        f(self);
        self.bound.truncate(depth);
    }
}

impl Visit for FreeIdents {
    fn visit_query(&mut self, q: &Query) {
        match q {
            Query::Filter {
                source,
                alias,
                body,
            }
            | Query::Map {
                source,
                alias,
                body,
            }
            | Query::ConcatMap {
                source,
                alias,
                body,
            } => {
                self.visit_query(source);
                self.scoped(&[alias], |s| s.visit_expr(body));
            }
            Query::SortBy {
                source,
                alias,
                criteria,
                ..
            } => {
                self.visit_query(source);
                self.scoped(&[alias], |s| s.visit_expr(criteria));
            }
            Query::DistinctOn { source, alias, by } => {
                self.visit_query(source);
                self.scoped(&[alias], |s| s.visit_expr(by));
            }
            Query::FlatMap {
                source,
                alias,
                body,
            } => {
                self.visit_query(source);
                self.scoped(&[alias], |s| s.visit_query(body));
            }
            Query::GroupByMap {
                source,
                by_alias,
                by,
                map_alias,
                map,
            } => {
                self.visit_query(source);
                self.scoped(&[by_alias], |s| s.visit_expr(by));
                self.scoped(&[map_alias], |s| s.visit_expr(map));
            }
            Query::FlatJoin {
                source, alias, on, ..
            } => {
                self.visit_query(source);
                self.scoped(&[alias], |s| s.visit_expr(on));
            }
            other => walk_query_ref(self, other),
        }
    }

    fn visit_expr(&mut self, e: &Expr) {
        match e {
            Expr::Ident(id) => {
                if !self.bound.iter().any(|b| b == &id.name) && !self.found.contains(id) {
                    self.found.push(id.clone());
                }
            }
            Expr::Function { params, body } => {
                let binders: Vec<&Ident> = params.iter().collect();
                self.scoped(&binders, |s| s.visit_expr(body));
            }
            Expr::Block { bindings, output } => {
                let depth = self.bound.len();
                for (id, value) in bindings {
                    self.visit_expr(value);
                    self.bound.push(id.name.clone());
                }
                self.visit_expr(output);
                self.bound.truncate(depth);
            }
            other => walk_expr_ref(self, other),
        }
    }
}

/// Free identifiers of an expression, in first-occurrence order
pub fn free_idents(e: &Expr) -> Vec<Ident> {
    let mut c = FreeIdents {
        bound: Vec::new(),
        found: Vec::new(),
    };
    c.visit_expr(e);
    c.found
}

/// Free identifiers of a query, in first-occurrence order
pub fn free_idents_query(q: &Query) -> Vec<Ident> {
    let mut c = FreeIdents {
        bound: Vec::new(),
        found: Vec::new(),
    };
    c.visit_query(q);
    c.found
}

/// Returns true if `ident` occurs free in `e`
pub fn references(e: &Expr, ident: &Ident) -> bool {
    free_idents(e).contains(ident)
}

/// Returns true if `ident` occurs free in `q`
pub fn references_query(q: &Query, ident: &Ident) -> bool {
    free_idents_query(q).contains(ident)
}

/// Collects the names every binder in a tree introduces
#[derive(Default)]
struct BoundNames {
    found: HashSet<String>,
}

impl Visit for BoundNames {
    fn visit_query(&mut self, q: &Query) {
        match q {
            Query::Filter { alias, .. }
            | Query::Map { alias, .. }
            | Query::ConcatMap { alias, .. }
            | Query::SortBy { alias, .. }
            | Query::DistinctOn { alias, .. }
            | Query::FlatMap { alias, .. }
            | Query::FlatJoin { alias, .. } => {
                self.found.insert(alias.name.clone());
            }
            Query::GroupByMap {
                by_alias,
                map_alias,
                ..
            } => {
                self.found.insert(by_alias.name.clone());
                self.found.insert(map_alias.name.clone());
            }
            _ => {}
        }
        walk_query_ref(self, q)
    }

    fn visit_expr(&mut self, e: &Expr) {
        match e {
            Expr::Function { params, .. } => {
                self.found.extend(params.iter().map(|p| p.name.clone()));
            }
            Expr::Block { bindings, .. } => {
                self.found.extend(bindings.iter().map(|(id, _)| id.name.clone()));
            }
            _ => {}
        }
        walk_expr_ref(self, e)
    }
}

/// Names bound anywhere inside `q`, at any depth
pub fn bound_names_query(q: &Query) -> HashSet<String> {
    let mut c = BoundNames::default();
    c.visit_query(q);
    c.found
}

/// Finds calls of given kinds. `QueryAsExpr` bodies are only searched when
/// `into_queries` is set.
struct CallFinder {
    kinds: &'static [CallKind],
    into_queries: bool,
    found: bool,
}

impl Visit for CallFinder {
    fn visit_query(&mut self, q: &Query) {
        if !self.found {
            walk_query_ref(self, q)
        }
    }

    fn visit_expr(&mut self, e: &Expr) {
        if self.found {
            return;
        }
        match e {
            Expr::MethodCall { kind, .. } | Expr::GlobalCall { kind, .. }
                if self.kinds.contains(kind) =>
            {
                self.found = true
            }
            Expr::QueryAsExpr(_) if !self.into_queries => {}
            other => walk_expr_ref(self, other),
        }
    }
}

/// Returns true if the expression aggregates at its own level.
///
/// Aggregates inside a correlated subquery belong to that subquery and are
/// not counted.
pub fn contains_aggregation(e: &Expr) -> bool {
    let mut f = CallFinder {
        kinds: &[CallKind::Aggregator, CallKind::QueryAggregator],
        into_queries: false,
        found: false,
    };
    f.visit_expr(e);
    f.found
}

/// Returns true if the expression contains an impure call anywhere or an
/// aggregation at its own level
pub fn is_impure(e: &Expr) -> bool {
    let mut f = CallFinder {
        kinds: &[CallKind::ImpureFunction],
        into_queries: true,
        found: false,
    };
    f.visit_expr(e);
    f.found || contains_aggregation(e)
}

/// Returns true if any expression inside the query is impure
pub fn query_is_impure(q: &Query) -> bool {
    let mut f = CallFinder {
        kinds: &[CallKind::ImpureFunction],
        into_queries: true,
        found: false,
    };
    f.visit_query(q);
    f.found
}
