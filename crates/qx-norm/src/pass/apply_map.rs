//! Map fusion: pushes consumers underneath detachable maps

use super::{apply_bottom_up, avoid_capture, free_except, free_except_query, NormalizePass, PassContext};
use crate::beta::{substitute, substitute_query};
use qx_core::error::CompileResult;
use qx_core::trace::TraceType;
use qx_core::xr::collect::is_impure;
use qx_core::xr::{Expr, Ident, Query};

/// Fuses detachable maps into the combinator that consumes them
pub struct ApplyMap;

impl NormalizePass for ApplyMap {
    fn name(&self) -> &'static str {
        "apply_map"
    }

    fn description(&self) -> &'static str {
        "Fuses pure maps into following maps, filters, sorts and groupings"
    }

    fn apply(&self, q: &Query, ctx: &mut PassContext<'_>) -> CompileResult<Option<Query>> {
        apply_bottom_up(fuse, self.name(), q, ctx)
    }
}

/// A map that can be fused into its consumer: its body neither aggregates
/// nor calls impure functions, and its source needs no boundary of its own
pub(crate) fn detachable(q: &Query) -> Option<(&Query, &Ident, &Expr)> {
    match q {
        Query::Map {
            source,
            alias,
            body,
        } if !matches!(
            source.as_ref(),
            Query::DistinctOn { .. } | Query::FlatJoin { .. }
        ) && !source.is_flat_unit()
            && !is_impure(body) =>
        {
            Some((source, alias, body))
        }
        _ => None,
    }
}

fn map(source: Query, alias: Ident, body: Expr) -> Query {
    Query::Map {
        source: Box::new(source),
        alias,
        body,
    }
}

fn is_identity(alias: &Ident, body: &Expr) -> bool {
    matches!(body, Expr::Ident(id) if id == alias)
}

fn fuse(q: &Query, ctx: &mut PassContext<'_>) -> CompileResult<Option<Query>> {
    match q {
        // a.map(b => b) => a
        Query::Map {
            source,
            alias,
            body,
        } if is_identity(alias, body)
            && !matches!(
                source.as_ref(),
                Query::Nested { .. } | Query::GroupByMap { .. }
            ) =>
        {
            ctx.tracer
                .trace(TraceType::ApplyMap, || format!("identity map removed: {q}"));
            Ok(Some(*source.clone()))
        }

        Query::Map {
            source,
            alias: d,
            body: e,
        } => match source.as_ref() {
            // expr.map(d => e) => e[d := expr]
            Query::ExprAsQuery { expr: x } if !is_impure(x) => {
                let e = substitute(e, d, x, &mut ctx.fresh)?;
                Ok(Some(Query::ExprAsQuery { expr: e }))
            }
            // j.map(b => c).map(d => e) => j.map(b => e[d := c]) over a join
            Query::Map {
                source: j,
                alias: b,
                body: c,
            } if j.is_flat_join() && !is_impure(c) => {
                let (b, c) = avoid_capture(b, c, &free_except(e, d), ctx)?;
                let e = substitute(e, d, &c, &mut ctx.fresh)?;
                Ok(Some(map(*j.clone(), b, e)))
            }
            // a.map(b => c).map(d => e) => a.map(b => e[d := c])
            inner => match detachable(inner) {
                Some((a, b, c)) => {
                    let (b, c) = avoid_capture(b, c, &free_except(e, d), ctx)?;
                    let e = substitute(e, d, &c, &mut ctx.fresh)?;
                    Ok(Some(map(a.clone(), b, e)))
                }
                None => Ok(None),
            },
        },

        // a.map(b => c).flatMap(d => e) => a.flatMap(b => e[d := c])
        Query::FlatMap {
            source,
            alias: d,
            body: e,
        } => match detachable(source) {
            Some((a, b, c)) => {
                let (b, c) = avoid_capture(b, c, &free_except_query(e, d), ctx)?;
                let e = substitute_query(e, d, &c, &mut ctx.fresh)?;
                Ok(Some(Query::FlatMap {
                    source: Box::new(a.clone()),
                    alias: b,
                    body: Box::new(e),
                }))
            }
            None => Ok(None),
        },

        // a.map(b => c).filter(d => e) => a.filter(b => e[d := c]).map(b => c)
        Query::Filter {
            source,
            alias: d,
            body: e,
        } => match detachable(source) {
            Some((a, b, c)) => {
                let (b, c) = avoid_capture(b, c, &free_except(e, d), ctx)?;
                let e = substitute(e, d, &c, &mut ctx.fresh)?;
                Ok(Some(map(a.clone().filter(b.clone(), e), b, c)))
            }
            None => Ok(None),
        },

        Query::SortBy {
            source,
            alias: d,
            criteria: e,
            ordering,
        } => {
            // a.map(b => c).sortBy(d => e) => a.sortBy(b => e[d := c]).map(b => c)
            if let Some((a, b, c)) = detachable(source) {
                let (b, c) = avoid_capture(b, c, &free_except(e, d), ctx)?;
                let e = substitute(e, d, &c, &mut ctx.fresh)?;
                return Ok(Some(map(
                    a.clone().sort_by(b.clone(), e, ordering.clone()),
                    b,
                    c,
                )));
            }
            // a.map(b => c).distinct.sortBy(d => e) => a.sortBy(b => e[d := c]).map(b => c).distinct
            if let Query::Distinct { source: inner } = source.as_ref() {
                if let Some((a, b, c)) = detachable(inner) {
                    let (b, c) = avoid_capture(b, c, &free_except(e, d), ctx)?;
                    let e = substitute(e, d, &c, &mut ctx.fresh)?;
                    return Ok(Some(
                        map(a.clone().sort_by(b.clone(), e, ordering.clone()), b, c).distinct(),
                    ));
                }
            }
            Ok(None)
        }

        // a.map(b => c).groupByMap(d => e)(f => g)
        //   => a.groupByMap(b => e[d := c])(b => g[f := c])
        Query::GroupByMap {
            source,
            by_alias: d,
            by: e,
            map_alias: f,
            map: g,
        } => match detachable(source) {
            Some((a, b, c)) => {
                let mut outside = free_except(e, d);
                outside.extend(free_except(g, f));
                let (b, c) = avoid_capture(b, c, &outside, ctx)?;
                let e = substitute(e, d, &c, &mut ctx.fresh)?;
                let g = substitute(g, f, &c, &mut ctx.fresh)?;
                Ok(Some(a.clone().group_by_map(b.clone(), e, b, g)))
            }
            None => Ok(None),
        },

        // a.map(b => c).take(n) => a.take(n).map(b => c)
        Query::Take { source, count } => Ok(detachable(source)
            .map(|(a, b, c)| map(a.clone().take(count.clone()), b.clone(), c.clone()))),
        Query::Drop { source, count } => Ok(detachable(source)
            .map(|(a, b, c)| map(a.clone().drop(count.clone()), b.clone(), c.clone()))),
        // a.map(b => c).nested => a.nested.map(b => c)
        Query::Nested { source } => {
            Ok(detachable(source).map(|(a, b, c)| map(a.clone().nested(), b.clone(), c.clone())))
        }

        _ => Ok(None),
    }
}
