//! Names the single column of scalar subqueries `value`
//!
//! `SELECT x FROM (SELECT p.age FROM Person p) x` has nothing to qualify:
//! the inner column gets the alias `value` and outer references to `x`
//! become `x.value`.

use super::{map_subqueries, rewrite_clauses};
use crate::model::{FlattenSqlQuery, FromContext, SqlQuery};
use qx_core::error::CompileResult;
use qx_core::xr::visit::walk_expr;
use qx_core::xr::{Expr, Ident, Rewrite};

/// Column alias given to scalar subqueries
pub const VALUE_ALIAS: &str = "value";

/// Add `value` aliases throughout a query
pub fn valueize(q: SqlQuery) -> CompileResult<SqlQuery> {
    Ok(match q {
        SqlQuery::Flatten(f) => SqlQuery::Flatten(valueize_flatten(f)?),
        SqlQuery::SetOperation { a, op, b } => SqlQuery::SetOperation {
            a: Box::new(valueize(*a)?),
            op,
            b: Box::new(valueize(*b)?),
        },
        SqlQuery::UnaryOperation { op, query } => SqlQuery::UnaryOperation {
            op,
            query: Box::new(valueize(*query)?),
        },
    })
}

fn valueize_flatten(q: FlattenSqlQuery) -> CompileResult<FlattenSqlQuery> {
    let from = map_subqueries(q.from, &mut valueize)?;
    let mut scalar = Vec::new();
    let from = from
        .into_iter()
        .map(|ctx| name_scalar(ctx, &mut scalar))
        .collect();
    let q = FlattenSqlQuery { from, ..q };
    if scalar.is_empty() {
        return Ok(q);
    }
    rewrite_clauses(q, &mut ValueRefs { aliases: scalar })
}

fn name_scalar(ctx: FromContext, scalar: &mut Vec<Ident>) -> FromContext {
    match ctx {
        FromContext::Subquery { query, alias } if is_scalar(&query) => {
            scalar.push(alias.clone());
            FromContext::Subquery {
                query: Box::new(with_value_alias(*query)),
                alias,
            }
        }
        FromContext::Join { kind, context, on } => FromContext::Join {
            kind,
            context: Box::new(name_scalar(*context, scalar)),
            on,
        },
        other => other,
    }
}

/// One unnamed, non-structured column
fn is_scalar(q: &SqlQuery) -> bool {
    match q {
        SqlQuery::Flatten(f) => match f.select.as_slice() {
            [single] => {
                single.alias.is_empty()
                    && !single.concat
                    && !matches!(single.expr, Expr::Ident(_) | Expr::Product { .. })
                    && !single.expr.tpe().is_product()
            }
            _ => false,
        },
        SqlQuery::SetOperation { a, b, .. } => is_scalar(a) && is_scalar(b),
        SqlQuery::UnaryOperation { .. } => false,
    }
}

fn with_value_alias(q: SqlQuery) -> SqlQuery {
    match q {
        SqlQuery::Flatten(mut f) => {
            for s in &mut f.select {
                s.alias = vec![VALUE_ALIAS.to_string()];
            }
            SqlQuery::Flatten(f)
        }
        SqlQuery::SetOperation { a, op, b } => SqlQuery::SetOperation {
            a: Box::new(with_value_alias(*a)),
            op,
            b: Box::new(with_value_alias(*b)),
        },
        other => other,
    }
}

/// Rewrites bare references to scalar subquery aliases. Nested queries
/// are left alone: they are post-processed when they are rendered.
struct ValueRefs {
    aliases: Vec<Ident>,
}

impl Rewrite for ValueRefs {
    fn rewrite_expr(&mut self, e: &Expr) -> CompileResult<Expr> {
        match e {
            Expr::Ident(id) if self.aliases.contains(id) => Ok(Expr::id(id).dot(VALUE_ALIAS)),
            Expr::QueryAsExpr(_) => Ok(e.clone()),
            other => walk_expr(self, other),
        }
    }
}
