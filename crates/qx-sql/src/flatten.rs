//! Relational flattening
//!
//! Two mutually recursive steps build the model: `base` decides how the next
//! combinator folds onto the accumulating SELECT, `flatten` dispatches on the
//! combinator itself. Every decision either merges into the current
//! accumulator or nests it as a subquery and starts a fresh one.

use crate::model::{
    leaves, Distinct, FlattenSqlQuery, FromContext, OrderByCriteria, PropertyOrdering,
    SelectValue, SetOperation, SqlQuery, UnaryOperation,
};
use qx_core::error::{CompileError, CompileResult};
use qx_core::trace::{TraceType, Tracer};
use qx_core::xr::collect::{free_idents, is_impure, references};
use qx_core::xr::{CallKind, Expr, Ident, Ordering, Query, UnaryOperator, XrType};
use qx_norm::{substitute, FreshNames};

/// Alias of the outermost SELECT when no combinator names one
const ROOT_ALIAS: &str = "x";

/// Comprehension clauses collected from a `flatMap` chain
#[derive(Debug, Default)]
struct Sources {
    from: Vec<FromContext>,
    where_: Option<Expr>,
    group_by: Option<Expr>,
    order_by: Vec<OrderByCriteria>,
}

impl Sources {
    fn is_empty(&self) -> bool {
        self.from.is_empty()
            && self.where_.is_none()
            && self.group_by.is_none()
            && self.order_by.is_empty()
    }

    fn with(mut self, ctx: FromContext) -> Self {
        self.from.push(ctx);
        self
    }

    fn append(&mut self, other: Sources) {
        self.from.extend(other.from);
        self.where_ = conjoin(self.where_.take(), other.where_);
        if other.group_by.is_some() {
            self.group_by = other.group_by;
        }
        self.order_by.extend(other.order_by);
    }

    fn into_query(self, select: Vec<SelectValue>) -> FlattenSqlQuery {
        FlattenSqlQuery {
            from: self.from,
            where_: self.where_,
            group_by: self.group_by,
            order_by: self.order_by,
            select,
            ..FlattenSqlQuery::default()
        }
    }
}

fn conjoin(a: Option<Expr>, b: Option<Expr>) -> Option<Expr> {
    match (a, b) {
        (Some(a), Some(b)) => Some(a.and(b)),
        (a, None) => a,
        (None, b) => b,
    }
}

fn select_alias(alias: &Ident) -> Vec<SelectValue> {
    vec![SelectValue::new(Expr::id(alias))]
}

/// True when expressions bound to `alias` can be evaluated at the level of `b`.
///
/// Either they never mention the alias, or the accumulator still selects
/// exactly the rows the alias ranges over.
fn mergeable(b: &FlattenSqlQuery, alias: &Ident, exprs: &[&Expr]) -> bool {
    if exprs.iter().all(|e| !references(e, alias)) {
        return true;
    }
    let selects_alias = matches!(
        b.select.as_slice(),
        [SelectValue { expr: Expr::Ident(id), concat: false, .. }] if id == alias
    );
    selects_alias && b.from_aliases().contains(&alias)
}

/// Nothing but FROM / WHERE / ORDER BY has been set
fn plain(b: &FlattenSqlQuery) -> bool {
    b.limit.is_none()
        && b.offset.is_none()
        && b.group_by.is_none()
        && !b.distinct.is_distinct()
        && !b.select.iter().any(|s| is_impure(&s.expr))
}

/// `name(query)` with an aggregator kind, in either call form
fn query_aggregation(e: &Expr) -> Option<(&str, &Query, &XrType)> {
    match e {
        Expr::GlobalCall {
            name,
            args,
            kind: CallKind::QueryAggregator,
            tpe,
        } => match args.as_slice() {
            [Expr::QueryAsExpr(q)] => Some((name, q, tpe)),
            _ => None,
        },
        Expr::MethodCall {
            head,
            name,
            args,
            kind: CallKind::QueryAggregator,
            tpe,
        } if args.is_empty() => match head.as_ref() {
            Expr::QueryAsExpr(q) => Some((name, q, tpe)),
            _ => None,
        },
        _ => None,
    }
}

fn aggregator(name: &str, arg: Expr, tpe: &XrType) -> Expr {
    Expr::GlobalCall {
        name: name.to_string(),
        args: vec![arg],
        kind: CallKind::Aggregator,
        tpe: tpe.clone(),
    }
}

fn property_ordering(o: &Ordering) -> Option<PropertyOrdering> {
    Some(match o {
        Ordering::Asc => PropertyOrdering::Asc,
        Ordering::Desc => PropertyOrdering::Desc,
        Ordering::AscNullsFirst => PropertyOrdering::AscNullsFirst,
        Ordering::DescNullsFirst => PropertyOrdering::DescNullsFirst,
        Ordering::AscNullsLast => PropertyOrdering::AscNullsLast,
        Ordering::DescNullsLast => PropertyOrdering::DescNullsLast,
        Ordering::Tuple(_) => return None,
    })
}

/// ORDER BY criteria for a sort key.
///
/// A structured key sorts by each of its leaves in declaration order; a
/// tuple ordering pairs one direction with each tuple element.
pub fn order_criteria(e: &Expr, ordering: &Ordering) -> CompileResult<Vec<OrderByCriteria>> {
    match (e, ordering) {
        (Expr::Product { fields, .. }, Ordering::Tuple(items)) => {
            if fields.len() != items.len() {
                return Err(CompileError::invariant(
                    "flatten",
                    format!(
                        "ordering has {} directions for {} sort keys",
                        items.len(),
                        fields.len()
                    ),
                    e,
                ));
            }
            let mut out = Vec::new();
            for ((_, field), o) in fields.iter().zip(items) {
                out.extend(order_criteria(field, o)?);
            }
            Ok(out)
        }
        (_, Ordering::Tuple(_)) => Err(CompileError::invariant(
            "flatten",
            "tuple ordering over a single sort key",
            e,
        )),
        (e, o) => {
            let ordering = property_ordering(o).ok_or_else(|| {
                CompileError::invariant("flatten", "unexpected tuple ordering", e)
            })?;
            Ok(leaves(e)
                .into_iter()
                .map(|(_, expr)| OrderByCriteria { expr, ordering })
                .collect())
        }
    }
}

/// Split a `flatMap` chain into its FROM / WHERE / GROUP BY / ORDER BY
/// contributions and the final body
fn contexts(f: &mut Flattener<'_>, q: &Query) -> CompileResult<(Sources, Query)> {
    let Query::FlatMap {
        source,
        alias,
        body,
    } = q
    else {
        return Ok((Sources::default(), q.clone()));
    };
    let mut sources = Sources::default();
    match source.as_ref() {
        Query::FlatFilter { by } => sources.where_ = Some(by.clone()),
        Query::FlatGroupBy { by } => sources.group_by = Some(by.clone()),
        Query::FlatSortBy { by, ordering } => sources.order_by = order_criteria(by, ordering)?,
        other => sources.from.push(f.source_context(other, alias)?),
    }
    // a trailing join selects its own rows
    let body = match body.as_ref() {
        Query::FlatJoin { alias: inner, .. } => {
            body.as_ref().clone().map(inner.clone(), Expr::id(inner))
        }
        other => other.clone(),
    };
    let (rest, last) = contexts(f, &body)?;
    sources.append(rest);
    Ok((sources, last))
}

/// Flattens normalized queries into the relational model
pub struct Flattener<'t> {
    tracer: &'t mut Tracer,
    fresh: FreshNames,
}

impl<'t> Flattener<'t> {
    pub fn new(tracer: &'t mut Tracer) -> Self {
        Self {
            tracer,
            fresh: FreshNames::new(),
        }
    }

    /// Continue minting names from a counter already used by normalization
    pub fn with_names(mut self, fresh: FreshNames) -> Self {
        self.fresh = fresh;
        self
    }

    /// Hand the name counter on to the next phase
    pub fn into_names(self) -> FreshNames {
        self.fresh
    }

    /// The binder a combinator over a join source should use.
    ///
    /// A join's rows are only addressable through the join's own alias, so a
    /// differently named binder is substituted with it.
    fn join_binder(&mut self, source: &Query, alias: &Ident, body: &Expr) -> CompileResult<(Ident, Expr)> {
        match source {
            Query::FlatJoin { alias: inner, .. }
                if inner.name != alias.name
                    && !free_idents(body).iter().any(|i| i.name == inner.name) =>
            {
                self.tracer.trace(TraceType::AvoidAliasConflict, || {
                    format!("flatten: {alias} -> join alias {inner}")
                });
                let body = substitute(body, alias, &Expr::id(inner), &mut self.fresh)?;
                Ok((inner.clone(), body))
            }
            _ => Ok((alias.clone(), body.clone())),
        }
    }

    /// Flatten a normalized query
    pub fn apply(&mut self, q: &Query) -> CompileResult<SqlQuery> {
        match q {
            Query::Union { a, b } => self.set_operation(a, SetOperation::Union, b),
            Query::UnionAll { a, b } => self.set_operation(a, SetOperation::UnionAll, b),
            Query::Map {
                source,
                alias,
                body: Expr::Ident(id),
            } if id == alias => self.apply(source),
            Query::Nested { source } => self.apply(source),
            Query::ExprAsQuery {
                expr: Expr::UnaryOp { op, expr },
            } if matches!(op, UnaryOperator::IsEmpty | UnaryOperator::NonEmpty) => {
                let Expr::QueryAsExpr(inner) = expr.as_ref() else {
                    return Err(CompileError::invariant(
                        "flatten",
                        "EXISTS over a non-query operand",
                        q,
                    ));
                };
                let op = match op {
                    UnaryOperator::IsEmpty => UnaryOperation::NotExists,
                    _ => UnaryOperation::Exists,
                };
                Ok(SqlQuery::UnaryOperation {
                    op,
                    query: Box::new(self.apply(inner)?),
                })
            }
            other => {
                let alias = Ident::new(ROOT_ALIAS, other.tpe());
                Ok(SqlQuery::Flatten(self.flatten_root(other, &alias)?))
            }
        }
    }

    fn set_operation(&mut self, a: &Query, op: SetOperation, b: &Query) -> CompileResult<SqlQuery> {
        Ok(SqlQuery::SetOperation {
            a: Box::new(self.apply(a)?),
            op,
            b: Box::new(self.apply(b)?),
        })
    }

    fn flatten_root(&mut self, q: &Query, alias: &Ident) -> CompileResult<FlattenSqlQuery> {
        let (sources, last) = contexts(self, q)?;
        let out = self.flatten(sources, &last, alias)?;
        if let Some(FromContext::Join { .. }) = out.from.first() {
            return Err(CompileError::invariant(
                "flatten",
                "join without a preceding source",
                &out,
            ));
        }
        Ok(out)
    }

    /// Wrap an accumulator as a subquery bound to `alias`
    fn nest(&mut self, b: FlattenSqlQuery, alias: &Ident) -> FromContext {
        self.tracer
            .trace(TraceType::Flattening, || format!("nest as {alias}: {b}"));
        FromContext::Subquery {
            query: Box::new(SqlQuery::Flatten(b)),
            alias: alias.clone(),
        }
    }

    fn source_context(&mut self, q: &Query, alias: &Ident) -> CompileResult<FromContext> {
        Ok(match q {
            Query::Entity { name, .. } => FromContext::Table {
                name: name.clone(),
                alias: alias.clone(),
            },
            Query::FlatJoin {
                kind,
                source,
                alias: inner,
                on,
            } => FromContext::Join {
                kind: *kind,
                context: Box::new(self.source_context(source, inner)?),
                on: on.clone(),
            },
            Query::Nested { source } => FromContext::Subquery {
                query: Box::new(self.apply(source)?),
                alias: alias.clone(),
            },
            Query::ExprAsQuery { expr } => FromContext::RawExpression {
                expr: expr.clone(),
                alias: alias.clone(),
            },
            Query::TagForSqlQuery { bid, .. } => {
                return Err(CompileError::MissingSplice { bid: bid.clone() })
            }
            Query::FlatFilter { .. }
            | Query::FlatGroupBy { .. }
            | Query::FlatSortBy { .. }
            | Query::Custom(_) => {
                return Err(CompileError::invariant(
                    "flatten",
                    "node cannot be used as a FROM source",
                    q,
                ))
            }
            other => FromContext::Subquery {
                query: Box::new(self.apply(other)?),
                alias: alias.clone(),
            },
        })
    }

    fn base(&mut self, sources: Sources, q: &Query, alias: &Ident) -> CompileResult<FlattenSqlQuery> {
        match q {
            Query::GroupByMap { .. } | Query::ConcatMap { .. } => {
                let inner = self.apply(q)?;
                let ctx = FromContext::Subquery {
                    query: Box::new(inner),
                    alias: alias.clone(),
                };
                Ok(sources.with(ctx).into_query(select_alias(alias)))
            }
            Query::Nested { source } => {
                let ctx = FromContext::Subquery {
                    query: Box::new(self.apply(source)?),
                    alias: alias.clone(),
                };
                Ok(sources.with(ctx).into_query(select_alias(alias)))
            }
            Query::Map { .. } | Query::Filter { .. } | Query::Entity { .. } => {
                self.flatten(sources, q, alias)
            }
            _ if sources.is_empty() => self.flatten(sources, q, alias),
            other => {
                let ctx = self.source_context(other, alias)?;
                Ok(sources.with(ctx).into_query(select_alias(alias)))
            }
        }
    }

    fn flatten(&mut self, mut sources: Sources, q: &Query, alias: &Ident) -> CompileResult<FlattenSqlQuery> {
        match q {
            Query::FlatMap { .. } => {
                let (more, last) = contexts(self, q)?;
                sources.append(more);
                self.flatten(sources, &last, alias)
            }

            Query::ExprAsQuery { expr } => match query_aggregation(expr) {
                Some((name, inner, tpe)) if sources.is_empty() => {
                    self.aggregate(name, inner, tpe, alias)
                }
                _ => Ok(sources.into_query(vec![SelectValue::new(expr.clone())])),
            },

            Query::ConcatMap {
                source,
                alias: a,
                body,
            } => {
                let ctx = self.source_context(source, a)?;
                Ok(sources.with(ctx).into_query(vec![SelectValue {
                    expr: body.clone(),
                    alias: Vec::new(),
                    concat: true,
                }]))
            }

            Query::GroupByMap {
                source,
                by_alias,
                by,
                map_alias,
                map,
            } => {
                let b = self.base(sources, source, by_alias)?;
                let map = if map_alias == by_alias {
                    map.clone()
                } else {
                    substitute(map, map_alias, &Expr::id(by_alias), &mut self.fresh)?
                };
                let select = vec![SelectValue::new(map.clone())];
                if plain(&b) && mergeable(&b, by_alias, &[by, &map]) {
                    Ok(FlattenSqlQuery {
                        group_by: Some(by.clone()),
                        select,
                        ..b
                    })
                } else {
                    let from = vec![self.nest(b, by_alias)];
                    Ok(FlattenSqlQuery {
                        group_by: Some(by.clone()),
                        ..FlattenSqlQuery::select_from(from, select)
                    })
                }
            }

            Query::Map {
                source,
                alias: a,
                body,
            } => {
                let (binder, rebound) = self.join_binder(source, a, body)?;
                let (a, body) = (&binder, &rebound);
                let b = self.base(sources, source, a)?;
                let shaped = b.limit.is_some()
                    || b.offset.is_some()
                    || b.group_by.is_some()
                    || !b.order_by.is_empty();
                let select = vec![SelectValue::new(body.clone())];
                if !b.distinct.is_distinct()
                    && !b.select.iter().any(|s| is_impure(&s.expr))
                    && !(is_impure(body) && shaped)
                    && mergeable(&b, a, &[body])
                {
                    Ok(FlattenSqlQuery { select, ..b })
                } else {
                    let from = vec![self.nest(b, a)];
                    Ok(FlattenSqlQuery::select_from(from, select))
                }
            }

            Query::Filter {
                source,
                alias: a,
                body,
            } => {
                let (binder, rebound) = self.join_binder(source, a, body)?;
                let (a, body) = (&binder, &rebound);
                let b = self.base(sources, source, a)?;
                if plain(&b) && mergeable(&b, a, &[body]) {
                    let where_ = conjoin(b.where_.clone(), Some(body.clone()));
                    Ok(FlattenSqlQuery { where_, ..b })
                } else {
                    let from = vec![self.nest(b, a)];
                    Ok(FlattenSqlQuery {
                        where_: Some(body.clone()),
                        ..FlattenSqlQuery::select_from(from, select_alias(a))
                    })
                }
            }

            Query::SortBy {
                source,
                alias: a,
                criteria,
                ordering,
            } => {
                let (binder, rebound) = self.join_binder(source, a, criteria)?;
                let (a, criteria) = (&binder, &rebound);
                let b = self.base(sources, source, a)?;
                let order_by = order_criteria(criteria, ordering)?;
                if b.order_by.is_empty() && plain(&b) && mergeable(&b, a, &[criteria]) {
                    Ok(FlattenSqlQuery { order_by, ..b })
                } else {
                    let from = vec![self.nest(b, a)];
                    Ok(FlattenSqlQuery {
                        order_by,
                        ..FlattenSqlQuery::select_from(from, select_alias(a))
                    })
                }
            }

            Query::Take { source, count } => {
                let b = self.base(sources, source, alias)?;
                if b.limit.is_none() {
                    Ok(FlattenSqlQuery {
                        limit: Some(count.clone()),
                        ..b
                    })
                } else {
                    let from = vec![self.nest(b, alias)];
                    Ok(FlattenSqlQuery {
                        limit: Some(count.clone()),
                        ..FlattenSqlQuery::select_from(from, select_alias(alias))
                    })
                }
            }

            Query::Drop { source, count } => {
                let b = self.base(sources, source, alias)?;
                if b.offset.is_none() && b.limit.is_none() {
                    Ok(FlattenSqlQuery {
                        offset: Some(count.clone()),
                        ..b
                    })
                } else {
                    let from = vec![self.nest(b, alias)];
                    Ok(FlattenSqlQuery {
                        offset: Some(count.clone()),
                        ..FlattenSqlQuery::select_from(from, select_alias(alias))
                    })
                }
            }

            Query::Distinct { source } => {
                let b = self.base(sources, source, alias)?;
                if b.limit.is_none() && b.offset.is_none() && !matches!(b.distinct, Distinct::On(_)) {
                    Ok(FlattenSqlQuery {
                        distinct: Distinct::All,
                        ..b
                    })
                } else {
                    let from = vec![self.nest(b, alias)];
                    Ok(FlattenSqlQuery {
                        distinct: Distinct::All,
                        ..FlattenSqlQuery::select_from(from, select_alias(alias))
                    })
                }
            }

            Query::DistinctOn {
                source,
                alias: a,
                by,
            } => {
                let on = Distinct::On(leaves(by).into_iter().map(|(_, e)| e).collect());
                let b = self.base(sources, source, a)?;
                if matches!(source.as_ref(), Query::Entity { .. }) && plain(&b) {
                    Ok(FlattenSqlQuery { distinct: on, ..b })
                } else {
                    let from = vec![self.nest(b, a)];
                    Ok(FlattenSqlQuery {
                        distinct: on,
                        ..FlattenSqlQuery::select_from(from, select_alias(a))
                    })
                }
            }

            Query::Entity { .. }
            | Query::Nested { .. }
            | Query::Union { .. }
            | Query::UnionAll { .. }
            | Query::FlatJoin { .. } => {
                let ctx = self.source_context(q, alias)?;
                Ok(sources.with(ctx).into_query(select_alias(alias)))
            }

            Query::TagForSqlQuery { bid, .. } => Err(CompileError::MissingSplice { bid: bid.clone() }),

            Query::FlatFilter { .. }
            | Query::FlatGroupBy { .. }
            | Query::FlatSortBy { .. }
            | Query::Custom(_) => Err(CompileError::invariant(
                "flatten",
                "node has no relational shape",
                q,
            )),
        }
    }

    /// `name(query)`: wrap the single projection in place, or aggregate over
    /// the nested query's rows
    fn aggregate(
        &mut self,
        name: &str,
        inner: &Query,
        tpe: &XrType,
        alias: &Ident,
    ) -> CompileResult<FlattenSqlQuery> {
        let alias = alias.with_type(inner.tpe());
        let b = self.flatten_root(inner, &alias)?;
        let in_place = b.limit.is_none() && b.offset.is_none() && !b.distinct.is_distinct();
        match b.select.as_slice() {
            [single] if in_place && !single.concat => {
                let select = vec![SelectValue::new(aggregator(name, single.expr.clone(), tpe))];
                Ok(FlattenSqlQuery { select, ..b })
            }
            _ => {
                let from = vec![self.nest(b, &alias)];
                // a nested count sizes the subquery's rows, NULL values included
                let counted = match name {
                    "count" => Expr::GlobalCall {
                        name: name.to_string(),
                        args: Vec::new(),
                        kind: CallKind::Aggregator,
                        tpe: tpe.clone(),
                    },
                    _ => aggregator(name, Expr::id(&alias), tpe),
                };
                let select = vec![SelectValue::new(counted)];
                Ok(FlattenSqlQuery::select_from(from, select))
            }
        }
    }
}

/// Flatten a normalized query without tracing
pub fn flatten(q: &Query) -> CompileResult<SqlQuery> {
    let mut tracer = Tracer::disabled();
    Flattener::new(&mut tracer).apply(q)
}

#[cfg(test)]
#[path = "flatten_test.rs"]
mod tests;
