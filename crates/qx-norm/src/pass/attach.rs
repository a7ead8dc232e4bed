//! Wrap the innermost table of a query with an extra operation

use qx_core::xr::{Ident, Query, XrType};

/// Rebuild `q` with `wrap(base, alias)` in place of its innermost source.
///
/// The alias handed to `wrap` is the one bound over that source by the
/// closest enclosing combinator, or `default_alias` when there is none.
/// Returns `None` when the innermost source cannot take a wrapper: joins,
/// flat-unit markers, one-row expressions and unlowered nodes.
pub(crate) fn attach_to_entity(
    q: &Query,
    default_alias: &Ident,
    wrap: &dyn Fn(Query, Ident) -> Query,
) -> Option<Query> {
    attach(q, None, default_alias, wrap)
}

fn attach(
    q: &Query,
    alias: Option<&Ident>,
    default_alias: &Ident,
    wrap: &dyn Fn(Query, Ident) -> Query,
) -> Option<Query> {
    let here = || alias.cloned().unwrap_or_else(|| default_alias.clone());
    let inner = |source: &Query, a: Option<&Ident>| {
        attach(source, a.or(alias), default_alias, wrap).map(Box::new)
    };
    Some(match q {
        Query::Entity { .. } | Query::Union { .. } | Query::UnionAll { .. } => {
            let a = here();
            wrap(q.clone(), a.with_type(q.tpe()))
        }
        Query::Map {
            source,
            alias: a,
            body,
        } => Query::Map {
            source: inner(source, Some(a))?,
            alias: a.clone(),
            body: body.clone(),
        },
        Query::Filter {
            source,
            alias: a,
            body,
        } => Query::Filter {
            source: inner(source, Some(a))?,
            alias: a.clone(),
            body: body.clone(),
        },
        Query::FlatMap {
            source,
            alias: a,
            body,
        } => Query::FlatMap {
            source: inner(source, Some(a))?,
            alias: a.clone(),
            body: body.clone(),
        },
        Query::ConcatMap {
            source,
            alias: a,
            body,
        } => Query::ConcatMap {
            source: inner(source, Some(a))?,
            alias: a.clone(),
            body: body.clone(),
        },
        Query::SortBy {
            source,
            alias: a,
            criteria,
            ordering,
        } => Query::SortBy {
            source: inner(source, Some(a))?,
            alias: a.clone(),
            criteria: criteria.clone(),
            ordering: ordering.clone(),
        },
        Query::DistinctOn {
            source,
            alias: a,
            by,
        } => Query::DistinctOn {
            source: inner(source, Some(a))?,
            alias: a.clone(),
            by: by.clone(),
        },
        Query::GroupByMap {
            source,
            by_alias,
            by,
            map_alias,
            map,
        } => Query::GroupByMap {
            source: inner(source, Some(by_alias))?,
            by_alias: by_alias.clone(),
            by: by.clone(),
            map_alias: map_alias.clone(),
            map: map.clone(),
        },
        Query::Take { source, count } => Query::Take {
            source: inner(source, None)?,
            count: count.clone(),
        },
        Query::Drop { source, count } => Query::Drop {
            source: inner(source, None)?,
            count: count.clone(),
        },
        Query::Distinct { source } => Query::Distinct {
            source: inner(source, None)?,
        },
        Query::Nested { source } => Query::Nested {
            source: inner(source, None)?,
        },
        Query::FlatJoin { .. }
        | Query::FlatFilter { .. }
        | Query::FlatGroupBy { .. }
        | Query::FlatSortBy { .. }
        | Query::ExprAsQuery { .. }
        | Query::TagForSqlQuery { .. }
        | Query::Custom(_) => return None,
    })
}

/// Default alias for an attached wrapper over an anonymous source
pub(crate) fn default_alias() -> Ident {
    Ident::new("x", XrType::Unknown)
}
