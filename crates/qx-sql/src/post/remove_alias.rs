//! Drops column aliases nothing reads

use crate::model::{FlattenSqlQuery, FromContext, SelectValue, SqlQuery};
use qx_core::xr::Expr;

/// Remove redundant select aliases.
///
/// The outermost query is read positionally, so every alias goes. Nested
/// queries keep an alias unless it equals the name the column already has.
pub fn remove_alias(q: SqlQuery, outermost: bool) -> SqlQuery {
    match q {
        SqlQuery::Flatten(f) => SqlQuery::Flatten(remove_flatten(f, outermost)),
        SqlQuery::SetOperation { a, op, b } => SqlQuery::SetOperation {
            a: Box::new(remove_alias(*a, outermost)),
            op,
            b: Box::new(remove_alias(*b, outermost)),
        },
        SqlQuery::UnaryOperation { op, query } => SqlQuery::UnaryOperation {
            op,
            query: Box::new(remove_alias(*query, false)),
        },
    }
}

fn remove_flatten(q: FlattenSqlQuery, outermost: bool) -> FlattenSqlQuery {
    let from = q.from.into_iter().map(nested_context).collect();
    let select = q
        .select
        .into_iter()
        .map(|s| {
            if outermost || natural_name(&s.expr).as_deref() == s.alias_name().as_deref() {
                SelectValue {
                    alias: Vec::new(),
                    ..s
                }
            } else {
                s
            }
        })
        .collect();
    FlattenSqlQuery { from, select, ..q }
}

fn nested_context(ctx: FromContext) -> FromContext {
    match ctx {
        FromContext::Subquery { query, alias } => FromContext::Subquery {
            query: Box::new(remove_alias(*query, false)),
            alias,
        },
        FromContext::Join { kind, context, on } => FromContext::Join {
            kind,
            context: Box::new(nested_context(*context)),
            on,
        },
        other => other,
    }
}

/// Column name a property chain renders with, `p.address.street` is
/// `address_street`
fn natural_name(e: &Expr) -> Option<String> {
    match e.property_path() {
        (Expr::Ident(_), path) if !path.is_empty() => Some(path.join("_")),
        _ => None,
    }
}
