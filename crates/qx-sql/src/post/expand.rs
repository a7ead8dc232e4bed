//! Expands structured projections into one column per leaf

use super::map_subqueries;
use crate::model::{leaves, Distinct, FlattenSqlQuery, SelectValue, SqlQuery};
use qx_core::error::CompileResult;
use qx_core::trace::{TraceType, Tracer};

/// Replace every product-valued select item by its leaf columns.
///
/// Each leaf is aliased with the item's alias followed by its field path,
/// so `(p.name, a)` selects `p.name AS _1, a.personId AS _2_personId, ...`.
pub fn expand(q: SqlQuery, tracer: &mut Tracer) -> CompileResult<SqlQuery> {
    Ok(match q {
        SqlQuery::Flatten(f) => SqlQuery::Flatten(expand_flatten(f, tracer)?),
        SqlQuery::SetOperation { a, op, b } => SqlQuery::SetOperation {
            a: Box::new(expand(*a, tracer)?),
            op,
            b: Box::new(expand(*b, tracer)?),
        },
        SqlQuery::UnaryOperation { op, query } => SqlQuery::UnaryOperation {
            op,
            query: Box::new(expand(*query, tracer)?),
        },
    })
}

fn expand_flatten(q: FlattenSqlQuery, tracer: &mut Tracer) -> CompileResult<FlattenSqlQuery> {
    let from = map_subqueries(q.from, &mut |sub| expand(sub, tracer))?;
    let select: Vec<SelectValue> = q.select.into_iter().flat_map(expand_value).collect();
    let distinct = match q.distinct {
        Distinct::On(items) => Distinct::On(
            items
                .iter()
                .flat_map(|e| leaves(e).into_iter().map(|(_, leaf)| leaf))
                .collect(),
        ),
        other => other,
    };
    if distinct.is_distinct() {
        tracer.trace(TraceType::ExpandDistinct, || {
            format!("{} distinct columns", select.len())
        });
    }
    Ok(FlattenSqlQuery {
        from,
        select,
        distinct,
        ..q
    })
}

fn expand_value(s: SelectValue) -> Vec<SelectValue> {
    if s.concat {
        return vec![s];
    }
    leaves(&s.expr)
        .into_iter()
        .map(|(path, expr)| {
            let mut alias = s.alias.clone();
            alias.extend(path);
            SelectValue {
                expr,
                alias,
                concat: false,
            }
        })
        .collect()
}
