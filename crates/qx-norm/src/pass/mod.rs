//! Normalization passes over XR query trees

pub mod adhoc;
pub mod alias_push;
pub mod apply_map;
pub(crate) mod attach;
pub mod dealias;
pub mod desugar;
pub mod null_checks;
pub mod repropagate;
pub mod symbolic;

use crate::beta::{substitute, FreshNames};
use qx_core::error::CompileResult;
use qx_core::trace::{TraceType, Tracer};
use qx_core::xr::collect::free_idents;
use qx_core::xr::visit::{walk_query, Rewrite};
use qx_core::xr::{Expr, Ident, Query};

/// Mutable state shared by passes during one compilation
pub struct PassContext<'t> {
    /// Fresh identifier source
    pub fresh: FreshNames,
    /// Trace side channel
    pub tracer: &'t mut Tracer,
}

impl<'t> PassContext<'t> {
    pub fn new(tracer: &'t mut Tracer) -> Self {
        Self {
            fresh: FreshNames::new(),
            tracer,
        }
    }
}

/// A normalization pass
pub trait NormalizePass: Send + Sync {
    /// Pass name (used in traces and phase errors)
    fn name(&self) -> &'static str;
    /// Human-readable description
    fn description(&self) -> &'static str;
    /// Rewrite the tree, returning `None` when nothing changed
    fn apply(&self, q: &Query, ctx: &mut PassContext<'_>) -> CompileResult<Option<Query>>;
}

/// A single local rewrite rule
pub(crate) type Rule = fn(&Query, &mut PassContext<'_>) -> CompileResult<Option<Query>>;

/// Upper bound on consecutive firings of one rule at a single node
const MAX_LOCAL_FIRINGS: usize = 32;

/// Applies a rule bottom-up at every query node, including queries nested
/// inside expressions
struct BottomUp<'c, 't> {
    rule: Rule,
    rule_name: &'static str,
    ctx: &'c mut PassContext<'t>,
    changed: bool,
}

impl Rewrite for BottomUp<'_, '_> {
    fn rewrite_query(&mut self, q: &Query) -> CompileResult<Query> {
        let mut node = walk_query(self, q)?;
        for _ in 0..MAX_LOCAL_FIRINGS {
            match (self.rule)(&node, self.ctx)? {
                Some(next) => {
                    let name = self.rule_name;
                    self.ctx
                        .tracer
                        .trace(TraceType::SqlNormalizations, || format!("{name}: {node} -> {next}"));
                    node = next;
                    self.changed = true;
                }
                None => break,
            }
        }
        Ok(node)
    }
}

/// Run a local rule bottom-up over the whole tree
pub(crate) fn apply_bottom_up(
    rule: Rule,
    rule_name: &'static str,
    q: &Query,
    ctx: &mut PassContext<'_>,
) -> CompileResult<Option<Query>> {
    let mut pass = BottomUp {
        rule,
        rule_name,
        ctx,
        changed: false,
    };
    let out = pass.rewrite_query(q)?;
    Ok(pass.changed.then_some(out))
}

/// Rename `alias` in `body` when moving `body` into a scope where `outside`
/// expressions would be captured by it
pub(crate) fn avoid_capture(
    alias: &Ident,
    body: &Expr,
    outside: &[Ident],
    ctx: &mut PassContext<'_>,
) -> CompileResult<(Ident, Expr)> {
    if !outside.contains(alias) {
        return Ok((alias.clone(), body.clone()));
    }
    let mut avoid: std::collections::HashSet<String> =
        outside.iter().map(|i| i.name.clone()).collect();
    avoid.extend(free_idents(body).into_iter().map(|i| i.name));
    let renamed = ctx.fresh.fresh(alias, &avoid);
    let body = substitute(body, alias, &Expr::Ident(renamed.clone()), &mut ctx.fresh)?;
    Ok((renamed, body))
}

/// Free identifiers of `e` other than `bound`
pub(crate) fn free_except(e: &Expr, bound: &Ident) -> Vec<Ident> {
    free_idents(e).into_iter().filter(|i| i != bound).collect()
}

/// Free identifiers of `q` other than `bound`
pub(crate) fn free_except_query(q: &Query, bound: &Ident) -> Vec<Ident> {
    qx_core::xr::collect::free_idents_query(q)
        .into_iter()
        .filter(|i| i != bound)
        .collect()
}

/// Returns true for a query whose chain starts with a join or flat-unit marker
pub(crate) fn headed_by_join_or_unit(q: &Query) -> bool {
    match q {
        Query::FlatJoin { .. } => true,
        q if q.is_flat_unit() => true,
        Query::FlatMap { source, .. } => source.is_flat_join() || source.is_flat_unit(),
        _ => false,
    }
}

#[cfg(test)]
#[path = "pass_test.rs"]
mod tests;
