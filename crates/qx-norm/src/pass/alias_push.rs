//! Alias pushing: an outer binder names the rows of the chain it ranges over
//!
//! Two joins over the same filtered fragment would otherwise both render with
//! the fragment's own alias. After this pass
//! `query[A].flatMap(x => ...)` over `query[A].filter(a => ..)` renders with `x`.

use super::{apply_bottom_up, NormalizePass, PassContext};
use crate::beta::substitute;
use qx_core::error::CompileResult;
use qx_core::trace::TraceType;
use qx_core::xr::collect::free_idents_query;
use qx_core::xr::{Expr, Ident, Query};

/// Propagates the outer binder name into the chain it consumes
pub struct AliasPush;

impl NormalizePass for AliasPush {
    fn name(&self) -> &'static str {
        "alias_push"
    }

    fn description(&self) -> &'static str {
        "Renames a consumed chain's alias to the binder of its flatMap or join"
    }

    fn apply(&self, q: &Query, ctx: &mut PassContext<'_>) -> CompileResult<Option<Query>> {
        apply_bottom_up(push, self.name(), q, ctx)
    }
}

/// Alias shared along the spine of a chain
fn canonical_alias(q: &Query) -> Option<&Ident> {
    match q {
        Query::Filter { alias, .. }
        | Query::Map { alias, .. }
        | Query::SortBy { alias, .. }
        | Query::DistinctOn { alias, .. } => Some(alias),
        Query::Take { source, .. } | Query::Drop { source, .. } | Query::Distinct { source } => {
            canonical_alias(source)
        }
        _ => None,
    }
}

fn rename_spine(q: &Query, from: &Ident, to: &Ident, ctx: &mut PassContext<'_>) -> CompileResult<Query> {
    let to_expr = |alias: &Ident| Expr::Ident(to.with_type(alias.tpe.clone()));
    Ok(match q {
        Query::Filter {
            source,
            alias,
            body,
        } if alias == from => rename_spine(source, from, to, ctx)?.filter(
            to.with_type(alias.tpe.clone()),
            substitute(body, alias, &to_expr(alias), &mut ctx.fresh)?,
        ),
        Query::Map {
            source,
            alias,
            body,
        } if alias == from => rename_spine(source, from, to, ctx)?.map(
            to.with_type(alias.tpe.clone()),
            substitute(body, alias, &to_expr(alias), &mut ctx.fresh)?,
        ),
        Query::SortBy {
            source,
            alias,
            criteria,
            ordering,
        } if alias == from => rename_spine(source, from, to, ctx)?.sort_by(
            to.with_type(alias.tpe.clone()),
            substitute(criteria, alias, &to_expr(alias), &mut ctx.fresh)?,
            ordering.clone(),
        ),
        Query::DistinctOn { source, alias, by } if alias == from => rename_spine(source, from, to, ctx)?
            .distinct_on(
                to.with_type(alias.tpe.clone()),
                substitute(by, alias, &to_expr(alias), &mut ctx.fresh)?,
            ),
        Query::Take { source, count } => rename_spine(source, from, to, ctx)?.take(count.clone()),
        Query::Drop { source, count } => rename_spine(source, from, to, ctx)?.drop(count.clone()),
        Query::Distinct { source } => rename_spine(source, from, to, ctx)?.distinct(),
        other => other.clone(),
    })
}

fn pushed(head: &Query, binder: &Ident, ctx: &mut PassContext<'_>) -> CompileResult<Option<Query>> {
    if binder.is_hidden() {
        return Ok(None);
    }
    let Some(current) = canonical_alias(head) else {
        return Ok(None);
    };
    if current == binder || free_idents_query(head).contains(binder) {
        return Ok(None);
    }
    let current = current.clone();
    ctx.tracer.trace(TraceType::AvoidAliasConflict, || {
        format!("alias push: {current} -> {binder}")
    });
    Ok(Some(rename_spine(head, &current, binder, ctx)?))
}

fn push(q: &Query, ctx: &mut PassContext<'_>) -> CompileResult<Option<Query>> {
    match q {
        Query::FlatMap {
            source,
            alias,
            body,
        } => Ok(pushed(source, alias, ctx)?.map(|source| Query::FlatMap {
            source: Box::new(source),
            alias: alias.clone(),
            body: body.clone(),
        })),
        Query::FlatJoin {
            kind,
            source,
            alias,
            on,
        } => Ok(pushed(source, alias, ctx)?.map(|source| Query::FlatJoin {
            kind: *kind,
            source: Box::new(source),
            alias: alias.clone(),
            on: on.clone(),
        })),
        _ => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use qx_core::test_utils::*;
    use qx_core::trace::Tracer;
    use qx_core::xr::JoinKind;

    fn run(q: &Query) -> Option<Query> {
        let mut tracer = Tracer::disabled();
        let mut ctx = PassContext::new(&mut tracer);
        AliasPush.apply(q, &mut ctx).unwrap()
    }

    fn active_addresses() -> Query {
        let x = ident("x");
        address_entity().filter(x.clone(), eq(prop(&x, "street"), Expr::string("Main")))
    }

    #[test]
    fn test_join_alias_pushed_into_filtered_fragment() {
        let p = ident("p");
        let a = ident("a");
        let b = ident("b");
        let q = person_entity().flat_map(
            p.clone(),
            active_addresses()
                .join(JoinKind::Inner, a.clone(), eq(prop(&a, "personId"), prop(&p, "id")))
                .flat_map(
                    a.clone(),
                    active_addresses()
                        .join(JoinKind::Left, b.clone(), eq(prop(&b, "personId"), prop(&p, "id")))
                        .flat_map(b.clone(), Query::of_expr(Expr::tuple(vec![Expr::id(&a), Expr::id(&b)]))),
                ),
        );
        let out = run(&q).unwrap();
        let rendered = out.to_string();
        assert!(rendered.contains("query[Address].filter(a => (a.street == \"Main\"))"));
        assert!(rendered.contains("query[Address].filter(b => (b.street == \"Main\"))"));
        assert!(!rendered.contains("filter(x =>"));
    }

    #[test]
    fn test_push_skipped_when_binder_free_in_head() {
        let x = ident("x");
        let p = ident("p");
        let head = address_entity().filter(x.clone(), eq(prop(&x, "personId"), prop(&p, "id")));
        let q = head.flat_map(p.clone(), Query::of_expr(Expr::id(&p)));
        assert_eq!(run(&q), None);
    }
}
