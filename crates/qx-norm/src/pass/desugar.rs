//! Custom-query desugaring

use super::{NormalizePass, PassContext};
use qx_core::error::CompileResult;
use qx_core::trace::TraceType;
use qx_core::xr::visit::{walk_query, Rewrite};
use qx_core::xr::{Query, QueryPosition};

/// Lowers every custom query to core nodes.
///
/// Only a custom query at the root of the tree is lowered as outermost; any
/// other occurrence is a sub-select and lowers as nested.
pub struct DesugarCustom;

impl NormalizePass for DesugarCustom {
    fn name(&self) -> &'static str {
        "desugar"
    }

    fn description(&self) -> &'static str {
        "Lowers pluggable query sugar to core query nodes"
    }

    fn apply(&self, q: &Query, ctx: &mut PassContext<'_>) -> CompileResult<Option<Query>> {
        let mut rewrite = Desugar {
            ctx,
            depth: 0,
            changed: false,
        };
        let out = rewrite.rewrite_query(q)?;
        Ok(rewrite.changed.then_some(out))
    }
}

struct Desugar<'c, 't> {
    ctx: &'c mut PassContext<'t>,
    depth: usize,
    changed: bool,
}

impl Rewrite for Desugar<'_, '_> {
    fn rewrite_query(&mut self, q: &Query) -> CompileResult<Query> {
        let node = match q {
            Query::Custom(custom) => {
                let position = if self.depth == 0 {
                    QueryPosition::Outermost
                } else {
                    QueryPosition::Nested
                };
                let lowered = custom.0.lower(position)?;
                self.ctx.tracer.trace(TraceType::Normalizations, || {
                    format!("desugar {}: {q} -> {lowered}", custom.0.name())
                });
                self.changed = true;
                lowered
            }
            other => other.clone(),
        };
        // the lowered tree may contain custom sub-selects of its own
        self.depth += 1;
        let out = walk_query(self, &node);
        self.depth -= 1;
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use qx_core::test_utils::*;
    use qx_core::trace::Tracer;
    use qx_core::xr::{Expr, Ordering, SelectClause};

    fn run(q: &Query) -> Option<Query> {
        let mut tracer = Tracer::disabled();
        let mut ctx = PassContext::new(&mut tracer);
        DesugarCustom.apply(q, &mut ctx).unwrap()
    }

    #[test]
    fn test_outermost_select_lowers_without_boundary() {
        let p = ident("p");
        let q = SelectClause::new(prop(&p, "name"))
            .from(p.clone(), person_entity())
            .sort_by(prop(&p, "age"), Ordering::Asc)
            .into_query();
        let out = run(&q).unwrap();
        assert!(matches!(out, Query::FlatMap { .. }));
    }

    #[test]
    fn test_nested_select_gets_boundary() {
        let p = ident("p");
        let inner = SelectClause::new(prop(&p, "name"))
            .from(p.clone(), person_entity())
            .sort_by(prop(&p, "age"), Ordering::Asc)
            .into_query();
        let x = ident("x");
        let q = inner.clone().filter(x.clone(), Expr::boolean(true));
        let Some(Query::Filter { source, .. }) = run(&q) else {
            panic!("expected filter");
        };
        assert!(matches!(*source, Query::Nested { .. }));
    }

    #[test]
    fn test_query_without_sugar_is_unchanged() {
        let p = ident("p");
        let q = person_entity().map(p.clone(), prop(&p, "name"));
        assert_eq!(run(&q), None);
    }

    #[test]
    fn test_select_without_from_fails() {
        let q = SelectClause::new(Expr::int(1)).into_query();
        let mut tracer = Tracer::disabled();
        let mut ctx = PassContext::new(&mut tracer);
        let err = DesugarCustom.apply(&q, &mut ctx).unwrap_err();
        assert!(err.to_string().contains("[Q001]"));
    }
}
