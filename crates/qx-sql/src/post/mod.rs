//! Post-processing of the relational model
//!
//! Runs after flattening and before tokenization, in a fixed order:
//! value aliases for single-column subqueries, expansion of structured
//! projections into leaf columns, then removal of redundant aliases.

pub mod expand;
pub mod remove_alias;
pub mod valueize;

use crate::model::{Distinct, FlattenSqlQuery, FromContext, OrderByCriteria, SelectValue, SqlQuery};
use qx_core::error::CompileResult;
use qx_core::trace::Tracer;
use qx_core::xr::{Expr, Rewrite};

pub use expand::expand;
pub use remove_alias::remove_alias;
pub use valueize::valueize;

/// Run every post-processing step.
///
/// `outermost` is true for the statement being rendered and false for
/// queries embedded in expressions, which keep their column aliases.
pub fn prepare(q: SqlQuery, outermost: bool, tracer: &mut Tracer) -> CompileResult<SqlQuery> {
    let q = valueize(q)?;
    let q = expand(q, tracer)?;
    Ok(remove_alias(q, outermost))
}

/// Apply `f` to every subquery of a FROM clause, including join targets
pub(crate) fn map_subqueries(
    from: Vec<FromContext>,
    f: &mut impl FnMut(SqlQuery) -> CompileResult<SqlQuery>,
) -> CompileResult<Vec<FromContext>> {
    from.into_iter().map(|ctx| map_context(ctx, f)).collect()
}

fn map_context(
    ctx: FromContext,
    f: &mut impl FnMut(SqlQuery) -> CompileResult<SqlQuery>,
) -> CompileResult<FromContext> {
    Ok(match ctx {
        FromContext::Subquery { query, alias } => FromContext::Subquery {
            query: Box::new(f(*query)?),
            alias,
        },
        FromContext::Join { kind, context, on } => FromContext::Join {
            kind,
            context: Box::new(map_context(*context, f)?),
            on,
        },
        other => other,
    })
}

/// Rewrite every expression held by one SELECT level
pub(crate) fn rewrite_clauses<R: Rewrite>(
    q: FlattenSqlQuery,
    r: &mut R,
) -> CompileResult<FlattenSqlQuery> {
    let from = q
        .from
        .into_iter()
        .map(|ctx| rewrite_context(ctx, r))
        .collect::<CompileResult<Vec<_>>>()?;
    let opt = |r: &mut R, e: Option<Expr>| e.map(|e| r.rewrite_expr(&e)).transpose();
    let where_ = opt(r, q.where_)?;
    let group_by = opt(r, q.group_by)?;
    let limit = opt(r, q.limit)?;
    let offset = opt(r, q.offset)?;
    let order_by = q
        .order_by
        .into_iter()
        .map(|c| {
            Ok(OrderByCriteria {
                expr: r.rewrite_expr(&c.expr)?,
                ordering: c.ordering,
            })
        })
        .collect::<CompileResult<Vec<_>>>()?;
    let select = q
        .select
        .into_iter()
        .map(|s| {
            Ok(SelectValue {
                expr: r.rewrite_expr(&s.expr)?,
                ..s
            })
        })
        .collect::<CompileResult<Vec<_>>>()?;
    let distinct = match q.distinct {
        Distinct::On(items) => Distinct::On(
            items
                .iter()
                .map(|e| r.rewrite_expr(e))
                .collect::<CompileResult<Vec<_>>>()?,
        ),
        other => other,
    };
    Ok(FlattenSqlQuery {
        from,
        where_,
        group_by,
        order_by,
        limit,
        offset,
        select,
        distinct,
    })
}

fn rewrite_context<R: Rewrite>(ctx: FromContext, r: &mut R) -> CompileResult<FromContext> {
    Ok(match ctx {
        FromContext::RawExpression { expr, alias } => FromContext::RawExpression {
            expr: r.rewrite_expr(&expr)?,
            alias,
        },
        FromContext::Join { kind, context, on } => FromContext::Join {
            kind,
            context: Box::new(rewrite_context(*context, r)?),
            on: r.rewrite_expr(&on)?,
        },
        other => other,
    })
}

#[cfg(test)]
#[path = "post_test.rs"]
mod tests;
