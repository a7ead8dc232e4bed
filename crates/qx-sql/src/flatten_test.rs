use super::*;
use qx_core::test_utils::*;
use qx_core::xr::JoinKind;

fn flat(q: &Query) -> FlattenSqlQuery {
    match flatten(q).unwrap() {
        SqlQuery::Flatten(f) => f,
        other => panic!("expected a single SELECT, got {other}"),
    }
}

#[test]
fn test_filter_then_map_is_one_select() {
    let p = person_ident("p");
    let q = person_entity()
        .filter(p.clone(), gt(prop(&p, "age"), Expr::int(18)))
        .map(p.clone(), prop(&p, "name"));
    let out = flat(&q);
    assert_eq!(out.from.len(), 1);
    assert!(matches!(&out.from[0], FromContext::Table { name, alias } if name == "Person" && alias == &p));
    assert_eq!(out.where_, Some(gt(prop(&p, "age"), Expr::int(18))));
    assert_eq!(out.select, vec![SelectValue::new(prop(&p, "name"))]);
}

#[test]
fn test_entity_selects_root_alias() {
    let out = flat(&person_entity());
    assert_eq!(out.from_aliases().len(), 1);
    assert_eq!(out.from_aliases()[0].name, "x");
    assert!(matches!(&out.select[0].expr, Expr::Ident(id) if id.name == "x"));
}

#[test]
fn test_identity_map_is_transparent() {
    let x = person_ident("x");
    let q = person_entity().map(x.clone(), Expr::id(&x));
    assert_eq!(flatten(&q).unwrap(), flatten(&person_entity()).unwrap());
}

#[test]
fn test_flat_map_chain_collects_contexts() {
    let p = person_ident("p");
    let a = address_ident("a");
    let on = eq(prop(&a, "personId"), prop(&p, "id"));
    let q = person_entity().flat_map(
        p.clone(),
        address_entity()
            .join(JoinKind::Inner, a.clone(), on.clone())
            .map(a.clone(), Expr::tuple(vec![Expr::id(&p), Expr::id(&a)])),
    );
    let out = flat(&q);
    assert_eq!(out.from.len(), 2);
    assert!(matches!(&out.from[1], FromContext::Join { kind: JoinKind::Inner, on: o, .. } if o == &on));
    assert_eq!(out.from_aliases(), vec![&p, &a]);
}

#[test]
fn test_trailing_join_selects_joined_rows() {
    let p = person_ident("p");
    let a = address_ident("a");
    let q = person_entity().flat_map(
        p.clone(),
        address_entity().join(JoinKind::Left, a.clone(), eq(prop(&a, "personId"), prop(&p, "id"))),
    );
    let out = flat(&q);
    assert_eq!(out.select, vec![SelectValue::new(Expr::id(&a))]);
}

#[test]
fn test_map_over_join_uses_join_alias() {
    let p = person_ident("p");
    let a = address_ident("a");
    let a1 = address_ident("a1");
    let q = person_entity().flat_map(
        p.clone(),
        address_entity()
            .join(JoinKind::Left, a.clone(), eq(prop(&a, "personId"), prop(&p, "id")))
            .map(a1.clone(), prop(&a1, "street")),
    );
    let out = flat(&q);
    let names: Vec<&str> = out.from_aliases().iter().map(|i| i.name.as_str()).collect();
    assert_eq!(names, vec!["p", "a"]);
    assert!(!out.from.iter().any(|c| matches!(c, FromContext::Subquery { .. })));
    assert_eq!(out.select, vec![SelectValue::new(prop(&a, "street"))]);
}

#[test]
fn test_flat_filter_becomes_where() {
    let p = person_ident("p");
    let a = address_ident("a");
    let cond = eq(prop(&a, "personId"), prop(&p, "id"));
    let q = person_entity().flat_map(
        p.clone(),
        address_entity().flat_map(
            a.clone(),
            Query::FlatFilter { by: cond.clone() }.flat_map(
                Ident::unit(),
                Query::of_expr(Expr::tuple(vec![prop(&p, "name"), prop(&a, "street")])),
            ),
        ),
    );
    let out = flat(&q);
    assert_eq!(out.from.len(), 2);
    assert_eq!(out.where_, Some(cond));
    assert_eq!(out.select.len(), 1);
}

#[test]
fn test_map_after_take_is_merged() {
    let p = person_ident("p");
    let q = person_entity()
        .take(Expr::int(5))
        .map(p.clone(), prop(&p, "name"));
    let out = flat(&q);
    assert_eq!(out.limit, Some(Expr::int(5)));
    assert!(matches!(&out.from[0], FromContext::Table { .. }));
}

#[test]
fn test_filter_after_take_is_nested() {
    let p = person_ident("p");
    let q = person_entity()
        .take(Expr::int(5))
        .filter(p.clone(), gt(prop(&p, "age"), Expr::int(18)));
    let out = flat(&q);
    assert!(out.limit.is_none());
    assert!(matches!(&out.from[0], FromContext::Subquery { alias, .. } if alias == &p));
    assert_eq!(out.where_, Some(gt(prop(&p, "age"), Expr::int(18))));
}

#[test]
fn test_second_take_is_nested() {
    let q = person_entity().take(Expr::int(10)).take(Expr::int(5));
    let out = flat(&q);
    assert_eq!(out.limit, Some(Expr::int(5)));
    let FromContext::Subquery { query, .. } = &out.from[0] else {
        panic!("expected subquery");
    };
    let SqlQuery::Flatten(inner) = query.as_ref() else {
        panic!("expected flatten");
    };
    assert_eq!(inner.limit, Some(Expr::int(10)));
}

#[test]
fn test_drop_then_take_share_a_level() {
    let out = flat(&person_entity().drop(Expr::int(10)).take(Expr::int(5)));
    assert_eq!(out.offset, Some(Expr::int(10)));
    assert_eq!(out.limit, Some(Expr::int(5)));
}

#[test]
fn test_distinct_value_is_nested_under_filter() {
    let p = person_ident("p");
    let x = Ident::new("x", XrType::Value);
    let q = person_entity()
        .map(p.clone(), prop(&p, "age"))
        .distinct()
        .filter(x.clone(), gt(Expr::id(&x), Expr::int(18)));
    let out = flat(&q);
    let FromContext::Subquery { query, alias } = &out.from[0] else {
        panic!("expected subquery");
    };
    assert_eq!(alias, &x);
    let SqlQuery::Flatten(inner) = query.as_ref() else {
        panic!("expected flatten");
    };
    assert_eq!(inner.distinct, Distinct::All);
    assert_eq!(inner.select, vec![SelectValue::new(prop(&p, "age"))]);
}

#[test]
fn test_sort_by_tuple_ordering() {
    let p = person_ident("p");
    let q = person_entity().sort_by(
        p.clone(),
        Expr::tuple(vec![prop(&p, "name"), prop(&p, "age")]),
        Ordering::Tuple(vec![Ordering::Asc, Ordering::DescNullsLast]),
    );
    let out = flat(&q);
    assert_eq!(
        out.order_by,
        vec![
            OrderByCriteria {
                expr: prop(&p, "name"),
                ordering: PropertyOrdering::Asc
            },
            OrderByCriteria {
                expr: prop(&p, "age"),
                ordering: PropertyOrdering::DescNullsLast
            },
        ]
    );
}

#[test]
fn test_tuple_ordering_arity_mismatch() {
    let p = person_ident("p");
    let key = Expr::tuple(vec![prop(&p, "name"), prop(&p, "age")]);
    let err = order_criteria(&key, &Ordering::Tuple(vec![Ordering::Asc])).unwrap_err();
    assert!(matches!(err, CompileError::InvariantViolation { .. }));
}

#[test]
fn test_group_by_map_sets_group_by() {
    let p = person_ident("p");
    let g = person_ident("g");
    let count = Expr::GlobalCall {
        name: "count".into(),
        args: vec![Expr::id(&g)],
        kind: CallKind::Aggregator,
        tpe: XrType::Value,
    };
    let q = person_entity().group_by_map(
        p.clone(),
        prop(&p, "age"),
        g.clone(),
        Expr::tuple(vec![prop(&g, "age"), count]),
    );
    let out = flat(&q);
    assert_eq!(out.group_by, Some(prop(&p, "age")));
    let Expr::Product { fields, .. } = &out.select[0].expr else {
        panic!("expected tuple projection");
    };
    assert_eq!(fields[0].1, prop(&p, "age"));
}

#[test]
fn test_query_aggregation_wraps_projection() {
    let p = person_ident("p");
    let inner = person_entity().map(p.clone(), prop(&p, "age"));
    let q = Query::of_expr(Expr::GlobalCall {
        name: "max".into(),
        args: vec![Expr::query(inner)],
        kind: CallKind::QueryAggregator,
        tpe: XrType::Value,
    });
    let out = flat(&q);
    assert!(matches!(&out.from[0], FromContext::Table { .. }));
    assert!(matches!(
        &out.select[0].expr,
        Expr::GlobalCall { name, kind: CallKind::Aggregator, args, .. } if name == "max" && args == &vec![prop(&p, "age")]
    ));
}

#[test]
fn test_nested_count_counts_rows() {
    let p = person_ident("p");
    let ages = person_entity().map(p.clone(), prop(&p, "age")).distinct();
    let aggregate = |name: &str| {
        Query::of_expr(Expr::GlobalCall {
            name: name.into(),
            args: vec![Expr::query(ages.clone())],
            kind: CallKind::QueryAggregator,
            tpe: XrType::Value,
        })
    };

    let out = flat(&aggregate("count"));
    assert!(matches!(&out.from[0], FromContext::Subquery { .. }));
    assert!(matches!(
        &out.select[0].expr,
        Expr::GlobalCall { name, args, .. } if name == "count" && args.is_empty()
    ));

    let out = flat(&aggregate("max"));
    assert!(matches!(
        &out.select[0].expr,
        Expr::GlobalCall { name, args, .. } if name == "max" && args.len() == 1
    ));
}

#[test]
fn test_name_counter_carries_across_phases() {
    let avoid = std::collections::HashSet::new();
    let mut fresh = FreshNames::new();
    assert_eq!(fresh.fresh(&ident("x"), &avoid).name, "x1");

    let mut tracer = Tracer::disabled();
    let mut flattener = Flattener::new(&mut tracer).with_names(fresh);
    flattener.apply(&person_entity()).unwrap();
    let mut fresh = flattener.into_names();
    assert_eq!(fresh.fresh(&ident("x"), &avoid).name, "x2");
}

#[test]
fn test_union_is_set_operation() {
    let out = flatten(&person_entity().union_all(person_entity())).unwrap();
    assert!(matches!(out, SqlQuery::SetOperation { op: SetOperation::UnionAll, .. }));
}

#[test]
fn test_non_empty_is_exists() {
    let q = Query::of_expr(Expr::unary(
        UnaryOperator::NonEmpty,
        Expr::query(person_entity()),
    ));
    assert!(matches!(
        flatten(&q).unwrap(),
        SqlQuery::UnaryOperation { op: UnaryOperation::Exists, .. }
    ));
}

#[test]
fn test_tag_without_splice_fails() {
    let q = Query::TagForSqlQuery {
        bid: "t1".into(),
        tpe: XrType::Unknown,
    };
    assert_eq!(
        flatten(&q).unwrap_err(),
        CompileError::MissingSplice { bid: "t1".into() }
    );
}

#[test]
fn test_flat_unit_at_top_is_rejected() {
    let q = Query::FlatFilter {
        by: Expr::boolean(true),
    };
    assert!(matches!(
        flatten(&q).unwrap_err(),
        CompileError::InvariantViolation { .. }
    ));
}

#[test]
fn test_nesting_is_traced() {
    use qx_core::config::TraceConfig;
    let p = person_ident("p");
    let q = person_entity()
        .take(Expr::int(5))
        .filter(p.clone(), gt(prop(&p, "age"), Expr::int(18)));
    let mut tracer = Tracer::new(&TraceConfig {
        enabled: true,
        types: vec![TraceType::Flattening],
    });
    Flattener::new(&mut tracer).apply(&q).unwrap();
    assert!(tracer
        .events()
        .iter()
        .any(|e| e.kind == TraceType::Flattening));
}
