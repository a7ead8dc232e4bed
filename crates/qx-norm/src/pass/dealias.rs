//! De-aliasing: one canonical identifier per chain of combinators
//!
//! `query[Person].filter(p => ..).map(x => x.name)` becomes
//! `query[Person].filter(p => ..).map(p => p.name)`.

use super::{NormalizePass, PassContext};
use crate::beta::{substitute, substitute_query};
use qx_core::error::CompileResult;
use qx_core::trace::TraceType;
use qx_core::xr::collect::{bound_names_query, free_idents, free_idents_query};
use qx_core::xr::visit::{walk_query, Rewrite};
use qx_core::xr::{Expr, Ident, Query};

/// Renames chained bound identifiers to the alias of their source
pub struct Dealias;

impl NormalizePass for Dealias {
    fn name(&self) -> &'static str {
        "dealias"
    }

    fn description(&self) -> &'static str {
        "Uses a single canonical alias along each chain of combinators"
    }

    fn apply(&self, q: &Query, ctx: &mut PassContext<'_>) -> CompileResult<Option<Query>> {
        let out = DealiasRewrite { ctx }.rewrite_query(q)?;
        Ok((&out != q).then_some(out))
    }
}

struct DealiasRewrite<'c, 't> {
    ctx: &'c mut PassContext<'t>,
}

/// Result of de-aliasing one binder: the rewritten source, the binder to
/// use, the rewritten bodies and the state handed to the consumer
type Dealiased = (Query, Ident, Vec<Expr>, Option<Ident>);

impl DealiasRewrite<'_, '_> {
    fn chain(&mut self, source: &Query, alias: &Ident, bodies: &[&Expr]) -> CompileResult<Dealiased> {
        let (source, state) = self.dealias(source)?;
        let mut rewritten = bodies
            .iter()
            .map(|b| self.rewrite_expr(b))
            .collect::<CompileResult<Vec<_>>>()?;
        match state {
            Some(canonical) if canonical != *alias => {
                let captured = rewritten.iter().any(|b| {
                    free_idents(b)
                        .iter()
                        .any(|i| i == &canonical)
                });
                if captured {
                    return Ok((source, alias.clone(), rewritten, Some(alias.clone())));
                }
                let renamed = canonical.with_type(alias.tpe.clone());
                self.ctx.tracer.trace(TraceType::AvoidAliasConflict, || {
                    format!("dealias: {alias} -> {renamed}")
                });
                for body in rewritten.iter_mut() {
                    *body = substitute(body, alias, &Expr::Ident(renamed.clone()), &mut self.ctx.fresh)?;
                }
                Ok((source, renamed.clone(), rewritten, Some(renamed)))
            }
            _ => Ok((source, alias.clone(), rewritten, Some(alias.clone()))),
        }
    }

    /// One name for a join and the `flatMap` consuming it.
    ///
    /// The consumer normally takes the join's alias. When its body already
    /// binds or references that name, the join is renamed to the consumer's
    /// binder instead so that sibling joins keep distinct aliases.
    fn join_binder(&mut self, source: Query, alias: &Ident, body: Query) -> CompileResult<(Query, Ident, Query)> {
        let (kind, joined, join_alias, on) = match source {
            Query::FlatJoin {
                kind,
                source,
                alias,
                on,
            } => (kind, source, alias, on),
            other => return Ok((other, alias.clone(), body)),
        };
        let unchanged = |joined, join_alias, on| Query::FlatJoin {
            kind,
            source: joined,
            alias: join_alias,
            on,
        };
        if join_alias.name == alias.name {
            return Ok((unchanged(joined, join_alias, on), alias.clone(), body));
        }
        let taken = bound_names_query(&body).contains(&join_alias.name)
            || free_idents_query(&body).iter().any(|i| i.name == join_alias.name);
        if !taken {
            let renamed = join_alias.with_type(alias.tpe.clone());
            let body = substitute_query(&body, alias, &Expr::Ident(renamed.clone()), &mut self.ctx.fresh)?;
            return Ok((unchanged(joined, join_alias, on), renamed, body));
        }
        if free_idents(&on).iter().any(|i| i.name == alias.name) {
            return Ok((unchanged(joined, join_alias, on), alias.clone(), body));
        }
        let renamed = alias.with_type(join_alias.tpe.clone());
        self.ctx.tracer.trace(TraceType::AvoidAliasConflict, || {
            format!("dealias: join {join_alias} -> {renamed}")
        });
        let on = substitute(&on, &join_alias, &Expr::Ident(renamed.clone()), &mut self.ctx.fresh)?;
        Ok((joined.join(kind, renamed, on), alias.clone(), body))
    }

    fn dealias(&mut self, q: &Query) -> CompileResult<(Query, Option<Ident>)> {
        match q {
            Query::Filter {
                source,
                alias,
                body,
            } => {
                let (source, alias, mut bodies, state) = self.chain(source, alias, &[body])?;
                let body = bodies.remove(0);
                Ok((source.filter(alias, body), state))
            }
            Query::Map {
                source,
                alias,
                body,
            } => {
                let (source, alias, mut bodies, state) = self.chain(source, alias, &[body])?;
                let body = bodies.remove(0);
                Ok((source.map(alias, body), state))
            }
            Query::ConcatMap {
                source,
                alias,
                body,
            } => {
                let (source, alias, mut bodies, state) = self.chain(source, alias, &[body])?;
                let body = bodies.remove(0);
                Ok((source.concat_map(alias, body), state))
            }
            Query::SortBy {
                source,
                alias,
                criteria,
                ordering,
            } => {
                let (source, alias, mut bodies, state) = self.chain(source, alias, &[criteria])?;
                let criteria = bodies.remove(0);
                Ok((source.sort_by(alias, criteria, ordering.clone()), state))
            }
            Query::DistinctOn { source, alias, by } => {
                let (source, alias, mut bodies, state) = self.chain(source, alias, &[by])?;
                let by = bodies.remove(0);
                Ok((source.distinct_on(alias, by), state))
            }
            Query::GroupByMap {
                source,
                by_alias,
                by,
                map_alias,
                map,
            } => {
                let (source, by_alias, mut bodies, state) = self.chain(source, by_alias, &[by])?;
                let by = bodies.remove(0);
                let map = self.rewrite_expr(map)?;
                let (map_alias, map) = match &state {
                    Some(canonical)
                        if canonical != map_alias
                            && !free_idents(&map).iter().any(|i| i == canonical) =>
                    {
                        let renamed = canonical.with_type(map_alias.tpe.clone());
                        let map = substitute(
                            &map,
                            map_alias,
                            &Expr::Ident(renamed.clone()),
                            &mut self.ctx.fresh,
                        )?;
                        (renamed, map)
                    }
                    _ => (map_alias.clone(), map),
                };
                Ok((source.group_by_map(by_alias, by, map_alias, map), state))
            }
            Query::FlatMap {
                source,
                alias,
                body,
            } => {
                let (source, _) = self.dealias(source)?;
                let (body, state) = self.dealias(body)?;
                let (source, alias, body) = self.join_binder(source, alias, body)?;
                Ok((source.flat_map(alias, body), state))
            }
            Query::FlatJoin {
                kind,
                source,
                alias,
                on,
            } => {
                let (source, _) = self.dealias(source)?;
                let on = self.rewrite_expr(on)?;
                Ok((source.join(*kind, alias.clone(), on), Some(alias.clone())))
            }
            Query::Take { source, count } => {
                let (source, state) = self.dealias(source)?;
                Ok((source.take(self.rewrite_expr(count)?), state))
            }
            Query::Drop { source, count } => {
                let (source, state) = self.dealias(source)?;
                Ok((source.drop(self.rewrite_expr(count)?), state))
            }
            Query::Distinct { source } => {
                let (source, state) = self.dealias(source)?;
                Ok((source.distinct(), state))
            }
            other => Ok((walk_query(self, other)?, None)),
        }
    }
}

impl Rewrite for DealiasRewrite<'_, '_> {
    fn rewrite_query(&mut self, q: &Query) -> CompileResult<Query> {
        Ok(self.dealias(q)?.0)
    }
}
