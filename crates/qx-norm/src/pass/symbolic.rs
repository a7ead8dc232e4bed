//! Symbolic reduction: monad-comprehension laws over `flatMap`

use super::attach::{attach_to_entity, default_alias};
use super::{apply_bottom_up, avoid_capture, free_except_query, NormalizePass, PassContext};
use crate::beta::{substitute, substitute_query};
use qx_core::error::CompileResult;
use qx_core::xr::collect::{free_idents, is_impure, query_is_impure};
use qx_core::xr::{Expr, Ident, Query};
use std::collections::HashSet;

/// Flattens nested comprehensions into a single `flatMap` chain
pub struct SymbolicReduction;

impl NormalizePass for SymbolicReduction {
    fn name(&self) -> &'static str {
        "symbolic_reduction"
    }

    fn description(&self) -> &'static str {
        "Moves filters into continuations and associates nested flatMaps"
    }

    fn apply(&self, q: &Query, ctx: &mut PassContext<'_>) -> CompileResult<Option<Query>> {
        apply_bottom_up(reduce, self.name(), q, ctx)
    }
}

fn flat_map(source: Query, alias: Ident, body: Query) -> Query {
    Query::FlatMap {
        source: Box::new(source),
        alias,
        body: Box::new(body),
    }
}

fn reduce(q: &Query, ctx: &mut PassContext<'_>) -> CompileResult<Option<Query>> {
    let Query::FlatMap {
        source,
        alias: d,
        body: e,
    } = q
    else {
        return Ok(None);
    };

    // a.flatMap(b => expr) => a.map(b => expr)
    if let Query::ExprAsQuery { expr } = e.as_ref() {
        if !source.is_flat_unit() && !source.is_flat_join() {
            return Ok(Some(Query::Map {
                source: source.clone(),
                alias: d.clone(),
                body: expr.clone(),
            }));
        }
    }

    match source.as_ref() {
        // a.filter(b => c).flatMap(d => e) => a.flatMap(d => e.filter(_ => c[b := d]))
        Query::Filter {
            source: a,
            alias: b,
            body: c,
        } => {
            let cr = substitute(c, b, &Expr::Ident(d.clone()), &mut ctx.fresh)?;
            let cr_free = free_idents(&cr);
            let avoid: HashSet<String> = cr_free.iter().map(|i| i.name.clone()).collect();
            let spare = ctx.fresh.fresh(&default_alias(), &avoid);
            let wrap = |base: Query, alias: Ident| {
                let alias = if cr_free.contains(&alias) {
                    spare.with_type(base.tpe())
                } else {
                    alias
                };
                base.filter(alias, cr.clone())
            };
            let body = match attach_to_entity(e, &default_alias(), &wrap) {
                Some(attached) => attached,
                None => flat_map(Query::FlatFilter { by: cr.clone() }, Ident::unit(), *e.clone()),
            };
            Ok(Some(flat_map(*a.clone(), d.clone(), body)))
        }

        Query::FlatMap {
            source: a,
            alias: b,
            body: c,
        } => {
            let outside = free_except_query(e, d);
            match c.as_ref() {
                // a.flatMap(b => j.map(y => p)).flatMap(d => e)
                //   => a.flatMap(b => j.flatMap(y => e[d := p]))
                Query::Map {
                    source: j,
                    alias: y,
                    body: p,
                } if j.is_flat_join() => {
                    if is_impure(p) {
                        return Ok(None);
                    }
                    let (b, c) = rename_query_binder(b, c, &outside, ctx)?;
                    let Query::Map {
                        source: j,
                        alias: y,
                        body: p,
                    } = &c
                    else {
                        return Ok(None);
                    };
                    let (y, p) = avoid_capture(y, p, &outside, ctx)?;
                    let e = substitute_query(e, d, &p, &mut ctx.fresh)?;
                    Ok(Some(flat_map(
                        *a.clone(),
                        b,
                        flat_map(*j.clone(), y, e),
                    )))
                }
                // a.flatMap(b => c).flatMap(d => e) => a.flatMap(b => c.flatMap(d => e))
                _ => {
                    let (b, c) = rename_query_binder(b, c, &outside, ctx)?;
                    Ok(Some(flat_map(*a.clone(), b, flat_map(c, d.clone(), *e.clone()))))
                }
            }
        }

        // j.map(y => p).flatMap(d => e) => j.flatMap(y => e[d := p])
        Query::Map {
            source: j,
            alias: y,
            body: p,
        } if j.is_flat_join() && !is_impure(p) => {
            let outside = free_except_query(e, d);
            let (y, p) = avoid_capture(y, p, &outside, ctx)?;
            let e = substitute_query(e, d, &p, &mut ctx.fresh)?;
            Ok(Some(flat_map(*j.clone(), y, e)))
        }

        // (a union b).flatMap(d => e) => a.flatMap(d => e) union b.flatMap(d => e)
        Query::Union { a, b } if !query_is_impure(e) => Ok(Some(Query::Union {
            a: Box::new(flat_map(*a.clone(), d.clone(), *e.clone())),
            b: Box::new(flat_map(*b.clone(), d.clone(), *e.clone())),
        })),
        Query::UnionAll { a, b } if !query_is_impure(e) => Ok(Some(Query::UnionAll {
            a: Box::new(flat_map(*a.clone(), d.clone(), *e.clone())),
            b: Box::new(flat_map(*b.clone(), d.clone(), *e.clone())),
        })),

        _ => Ok(None),
    }
}

/// Rename the binder of a query body when the body is about to enclose
/// expressions that reference a same-named outer variable
fn rename_query_binder(
    binder: &Ident,
    body: &Query,
    outside: &[Ident],
    ctx: &mut PassContext<'_>,
) -> CompileResult<(Ident, Query)> {
    if !outside.contains(binder) {
        return Ok((binder.clone(), body.clone()));
    }
    let mut avoid: HashSet<String> = outside.iter().map(|i| i.name.clone()).collect();
    avoid.extend(
        qx_core::xr::collect::free_idents_query(body)
            .into_iter()
            .map(|i| i.name),
    );
    let renamed = ctx.fresh.fresh(binder, &avoid);
    let body = substitute_query(body, binder, &Expr::Ident(renamed.clone()), &mut ctx.fresh)?;
    Ok((renamed, body))
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
        SymbolicReduction.apply(q, &mut ctx).unwrap()
    }

    #[test]
    fn test_flat_map_of_expression_becomes_map() {
        let p = ident("p");
        let q = person_entity().flat_map(p.clone(), Query::of_expr(prop(&p, "name")));
        assert_eq!(run(&q), Some(person_entity().map(p.clone(), prop(&p, "name"))));
    }

    #[test]
    fn test_filter_moves_into_continuation() {
        let p = ident("p");
        let a = ident("a");
        let q = person_entity()
            .filter(p.clone(), gt(prop(&p, "age"), Expr::int(18)))
            .flat_map(
                p.clone(),
                address_entity().filter(a.clone(), eq(prop(&a, "personId"), prop(&p, "id"))),
            );
        let out = run(&q).unwrap();
        let expected = person_entity().flat_map(
            p.clone(),
            address_entity()
                .filter(a.clone(), gt(prop(&p, "age"), Expr::int(18)))
                .filter(a.clone(), eq(prop(&a, "personId"), prop(&p, "id"))),
        );
        assert_eq!(out, expected);
    }

    #[test]
    fn test_filter_falls_back_to_flat_filter_before_join() {
        let p = ident("p");
        let a = ident("a");
        let join = address_entity().join(
            JoinKind::Inner,
            a.clone(),
            eq(prop(&a, "personId"), prop(&p, "id")),
        );
        let q = person_entity()
            .filter(p.clone(), gt(prop(&p, "age"), Expr::int(18)))
            .flat_map(p.clone(), join.clone());
        let out = run(&q).unwrap();
        let expected = person_entity().flat_map(
            p.clone(),
            Query::FlatFilter {
                by: gt(prop(&p, "age"), Expr::int(18)),
            }
            .flat_map(Ident::unit(), join),
        );
        assert_eq!(out, expected);
    }

    #[test]
    fn test_nested_flat_maps_associate() {
        let p = ident("p");
        let a = ident("a");
        let x = ident("x");
        let inner = person_entity().flat_map(p.clone(), address_entity());
        let q = inner.flat_map(a.clone(), person_entity().filter(x.clone(), eq(prop(&x, "id"), prop(&a, "personId"))));
        let Some(Query::FlatMap { alias, body, .. }) = run(&q) else {
            panic!("expected flatMap");
        };
        assert_eq!(alias, p);
        assert!(matches!(*body, Query::FlatMap { .. }));
    }

    #[test]
    fn test_trailing_join_projection_is_pulled_out() {
        let p = ident("p");
        let a = ident("a");
        let t = ident("t");
        let x = ident("x");
        let join = address_entity().join(
            JoinKind::Inner,
            a.clone(),
            eq(prop(&a, "personId"), prop(&p, "id")),
        );
        let c = join
            .clone()
            .map(a.clone(), Expr::tuple(vec![Expr::id(&p), Expr::id(&a)]));
        let q = person_entity().flat_map(p.clone(), c).flat_map(
            t.clone(),
            address_entity().filter(
                x.clone(),
                eq(prop(&x, "street"), Expr::id(&t).dot("_2").dot("street")),
            ),
        );
        let out = run(&q).unwrap();
        let expected = person_entity().flat_map(
            p.clone(),
            join.flat_map(
                a.clone(),
                address_entity().filter(x.clone(), eq(prop(&x, "street"), prop(&a, "street"))),
            ),
        );
        assert_eq!(out, expected);
    }

    #[test]
    fn test_impure_union_continuation_is_kept() {
        let p = ident("p");
        let random = Expr::GlobalCall {
            name: "random".into(),
            args: vec![],
            kind: qx_core::xr::CallKind::ImpureFunction,
            tpe: qx_core::XrType::Value,
        };
        let union = person_entity().union(person_entity());
        let q = union.flat_map(p.clone(), address_entity().filter(ident("a"), gt(random, Expr::int(1))));
        assert_eq!(run(&q), None);
    }
}
