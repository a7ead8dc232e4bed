//! Ad-hoc fusions: filter chains and trailing operations on `flatMap`

use super::{
    apply_bottom_up, avoid_capture, free_except, headed_by_join_or_unit, NormalizePass,
    PassContext,
};
use crate::beta::substitute;
use qx_core::error::CompileResult;
use qx_core::xr::collect::free_idents_query;
use qx_core::xr::{Expr, Ident, Query};

/// Fuses filter-filter pairs and pushes trailing maps and filters into the
/// continuation of a `flatMap`
pub struct AdHocReduction;

impl NormalizePass for AdHocReduction {
    fn name(&self) -> &'static str {
        "adhoc_reduction"
    }

    fn description(&self) -> &'static str {
        "Fuses consecutive filters and moves trailing map/filter into flatMap bodies"
    }

    fn apply(&self, q: &Query, ctx: &mut PassContext<'_>) -> CompileResult<Option<Query>> {
        apply_bottom_up(reduce, self.name(), q, ctx)
    }
}

/// Rename the binder of a `flatMap` whose body is about to receive `outside`
/// expressions
fn open_flat_map(
    binder: &Ident,
    body: &Query,
    outside: &[Ident],
    ctx: &mut PassContext<'_>,
) -> CompileResult<(Ident, Query)> {
    if !outside.contains(binder) {
        return Ok((binder.clone(), body.clone()));
    }
    let mut avoid: std::collections::HashSet<String> =
        outside.iter().map(|i| i.name.clone()).collect();
    avoid.extend(free_idents_query(body).into_iter().map(|i| i.name));
    let renamed = ctx.fresh.fresh(binder, &avoid);
    let body = crate::beta::substitute_query(
        body,
        binder,
        &Expr::Ident(renamed.clone()),
        &mut ctx.fresh,
    )?;
    Ok((renamed, body))
}

fn reduce(q: &Query, ctx: &mut PassContext<'_>) -> CompileResult<Option<Query>> {
    match q {
        Query::Filter {
            source,
            alias: d,
            body: e,
        } => match source.as_ref() {
            // a.filter(b => c).filter(d => e) => a.filter(b => c && e[d := b])
            Query::Filter {
                source: a,
                alias: b,
                body: c,
            } => {
                let (b, c) = avoid_capture(b, c, &free_except(e, d), ctx)?;
                let e = substitute(e, d, &Expr::Ident(b.clone()), &mut ctx.fresh)?;
                Ok(Some(a.as_ref().clone().filter(b, c.and(e))))
            }
            // a.flatMap(b => c).filter(d => e) => a.flatMap(b => c.filter(d => e))
            Query::FlatMap {
                source: a,
                alias: b,
                body: c,
            } if !headed_by_join_or_unit(c) => {
                let (b, c) = open_flat_map(b, c, &free_except(e, d), ctx)?;
                Ok(Some(Query::FlatMap {
                    source: a.clone(),
                    alias: b,
                    body: Box::new(c.filter(d.clone(), e.clone())),
                }))
            }
            // expr.filter(d => e) => sql.filter(e[d := expr]).flatMap(_ => expr)
            Query::ExprAsQuery { expr: x } => {
                let cond = substitute(e, d, x, &mut ctx.fresh)?;
                Ok(Some(Query::FlatMap {
                    source: Box::new(Query::FlatFilter { by: cond }),
                    alias: Ident::unit(),
                    body: source.clone(),
                }))
            }
            _ => Ok(None),
        },

        // a.flatMap(b => c).map(d => e) => a.flatMap(b => c.map(d => e))
        Query::Map {
            source,
            alias: d,
            body: e,
        } => match source.as_ref() {
            Query::FlatMap {
                source: a,
                alias: b,
                body: c,
            } if !headed_by_join_or_unit(c) => {
                let (b, c) = open_flat_map(b, c, &free_except(e, d), ctx)?;
                Ok(Some(Query::FlatMap {
                    source: a.clone(),
                    alias: b,
                    body: Box::new(c.map(d.clone(), e.clone())),
                }))
            }
            _ => Ok(None),
        },

        _ => Ok(None),
    }
}
