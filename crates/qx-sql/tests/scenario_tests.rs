//! End-to-end query compilation scenarios

use qx_core::test_utils::*;
use qx_core::{CompilerConfig, DialectKind, Expr, Ident, ProductType, Query, Tracer, XrType};
use qx_norm::{Normalizer, PassContext};
use qx_sql::{flatten, SqlCompiler, SqlQuery};

fn compiler(dialect: DialectKind) -> SqlCompiler {
    SqlCompiler::new(CompilerConfig {
        dialect,
        validate_output: true,
        ..CompilerConfig::default()
    })
}

fn sql(dialect: DialectKind, q: &Query) -> String {
    compiler(dialect)
        .compile_query(q, None)
        .and_then(|out| out.sql())
        .unwrap_or_else(|e| panic!("{dialect}: {e}"))
}

fn normalize(q: &Query) -> Query {
    let mut tracer = Tracer::disabled();
    Normalizer::with_defaults()
        .normalize(q, &mut PassContext::new(&mut tracer))
        .unwrap()
}

fn account_type() -> ProductType {
    ProductType::new(
        "Account",
        vec![
            ("id".to_string(), XrType::Value),
            ("active".to_string(), XrType::BooleanValue),
        ],
    )
}

fn account_ident(name: &str) -> Ident {
    Ident::new(name, XrType::Product(account_type()))
}

#[test]
fn test_filter_then_map() {
    let p = person_ident("p");
    let q = person_entity()
        .filter(p.clone(), gt(prop(&p, "age"), Expr::int(18)))
        .map(p.clone(), prop(&p, "name"));
    for dialect in DialectKind::ALL {
        assert_eq!(sql(dialect, &q), "SELECT p.name FROM Person p WHERE p.age > 18");
    }
}

#[test]
fn test_identity_map_removed() {
    let p = person_ident("p");
    let n = ident("n");
    let q = person_entity()
        .map(p.clone(), prop(&p, "name"))
        .map(n.clone(), Expr::id(&n));
    assert_eq!(sql(DialectKind::Generic, &q), "SELECT p.name FROM Person p");
}

#[test]
fn test_join_flattens_to_one_level() {
    let p = person_ident("p");
    let a = address_ident("a");
    let q = person_entity().flat_map(
        p.clone(),
        address_entity()
            .join(
                qx_core::xr::JoinKind::Inner,
                a.clone(),
                eq(prop(&a, "personId"), prop(&p, "id")),
            )
            .map(a.clone(), Expr::tuple(vec![Expr::id(&p), Expr::id(&a)])),
    );
    assert_eq!(
        sql(DialectKind::Postgres, &q),
        "SELECT p.id, p.name, p.age, a.personId, a.street FROM Person p INNER JOIN Address a ON a.personId = p.id"
    );
}

#[test]
fn test_sibling_joins_with_same_binder_get_distinct_aliases() {
    let p = person_ident("p");
    let a = address_ident("a");
    let a1 = address_ident("a1");
    let x = address_ident("x");
    let on = |alias: &Ident| eq(prop(alias, "personId"), prop(&p, "id"));
    let q = person_entity().flat_map(
        p.clone(),
        address_entity()
            .join(qx_core::xr::JoinKind::Inner, x.clone(), on(&x))
            .flat_map(
                a.clone(),
                address_entity()
                    .join(qx_core::xr::JoinKind::Left, x.clone(), on(&x))
                    .map(
                        a1.clone(),
                        Expr::tuple(vec![Expr::id(&p), Expr::id(&a), Expr::id(&a1)]),
                    ),
            ),
    );

    let SqlQuery::Flatten(out) = flatten(&normalize(&q)).unwrap() else {
        panic!("expected a single SELECT");
    };
    let names: Vec<&str> = out.from_aliases().iter().map(|i| i.name.as_str()).collect();
    assert_eq!(names, vec!["p", "a", "x"]);

    assert_eq!(
        sql(DialectKind::Postgres, &q),
        "SELECT p.id, p.name, p.age, a.personId, a.street, x.personId, x.street \
         FROM Person p \
         INNER JOIN Address a ON a.personId = p.id \
         LEFT JOIN Address x ON x.personId = p.id"
    );
}

#[test]
fn test_count_of_distinct_values_counts_rows() {
    let p = person_ident("p");
    let ages = person_entity().map(p.clone(), prop(&p, "age")).distinct();
    let aggregate = |name: &str| {
        Query::of_expr(Expr::GlobalCall {
            name: name.into(),
            args: vec![Expr::query(ages.clone())],
            kind: qx_core::xr::CallKind::QueryAggregator,
            tpe: XrType::Value,
        })
    };
    assert_eq!(
        sql(DialectKind::Postgres, &aggregate("count")),
        "SELECT COUNT(*) FROM (SELECT DISTINCT p.age AS value FROM Person p) x"
    );
    assert_eq!(
        sql(DialectKind::Postgres, &aggregate("max")),
        "SELECT MAX(x.value) FROM (SELECT DISTINCT p.age AS value FROM Person p) x"
    );
}

#[test]
fn test_flat_map_chain_keeps_one_context_per_source() {
    let p = person_ident("p");
    let a = address_ident("a");
    let q = person_entity().flat_map(
        p.clone(),
        address_entity().map(
            a.clone(),
            Expr::tuple(vec![prop(&p, "name"), prop(&a, "street")]),
        ),
    );
    let SqlQuery::Flatten(out) = flatten(&normalize(&q)).unwrap() else {
        panic!("expected a single SELECT");
    };
    assert_eq!(out.from.len(), 2);
    let names: Vec<&str> = out.from_aliases().iter().map(|i| i.name.as_str()).collect();
    assert_eq!(names, vec!["p", "a"]);
}

#[test]
fn test_scalar_subquery_column_named_value() {
    let p = person_ident("p");
    let x = Ident::new("x", XrType::Value);
    let q = person_entity()
        .map(p.clone(), prop(&p, "age"))
        .distinct()
        .filter(x.clone(), gt(Expr::id(&x), Expr::int(18)));
    assert_eq!(
        sql(DialectKind::Generic, &q),
        "SELECT p.value FROM (SELECT DISTINCT p.age AS value FROM Person p) p WHERE p.value > 18"
    );
}

#[test]
fn test_paging_per_dialect() {
    let take = person_entity().take(Expr::int(5));
    let drop = person_entity().drop(Expr::int(10));

    assert_eq!(
        sql(DialectKind::Sqlite, &take),
        "SELECT x.id, x.name, x.age FROM Person x LIMIT 5"
    );
    assert_eq!(
        sql(DialectKind::Sqlite, &drop),
        "SELECT x.id, x.name, x.age FROM Person x LIMIT -1 OFFSET 10"
    );
    assert_eq!(
        sql(DialectKind::Generic, &drop),
        "SELECT x.id, x.name, x.age FROM Person x OFFSET 10"
    );
}

#[test]
fn test_map_fusion_matches_hand_fused_map() {
    let p = person_ident("p");
    let t = ident("t");
    let chained = person_entity()
        .map(
            p.clone(),
            Expr::tuple(vec![prop(&p, "name"), prop(&p, "age")]),
        )
        .map(t.clone(), Expr::id(&t).dot("_1"));
    let fused = person_entity().map(p.clone(), prop(&p, "name"));

    assert_eq!(flatten(&normalize(&chained)), flatten(&normalize(&fused)));
    for dialect in DialectKind::ALL {
        assert_eq!(sql(dialect, &chained), sql(dialect, &fused));
    }
}

#[test]
fn test_boolean_column_filter_vendorized() {
    let a = account_ident("a");
    let active = person_entity_like_accounts()
        .filter(a.clone(), prop(&a, "active"))
        .map(a.clone(), prop(&a, "id"));
    let inactive = person_entity_like_accounts()
        .filter(a.clone(), eq(prop(&a, "active"), Expr::boolean(false)))
        .map(a.clone(), prop(&a, "id"));

    assert_eq!(
        sql(DialectKind::Sqlite, &active),
        "SELECT a.id FROM Account a WHERE a.active = 1"
    );
    let rendered = sql(DialectKind::SqlServer, &inactive);
    assert_eq!(rendered, "SELECT a.id FROM Account a WHERE a.active = 0");
    assert!(!rendered.contains("FALSE"));

    assert_eq!(
        sql(DialectKind::Postgres, &active),
        "SELECT a.id FROM Account a WHERE a.active"
    );
}

#[test]
fn test_predicate_projected_as_value_without_native_booleans() {
    let a = account_ident("a");
    let q = person_entity_like_accounts().map(a.clone(), gt(prop(&a, "id"), Expr::int(1)));
    assert_eq!(
        sql(DialectKind::Sqlite, &q),
        "SELECT CASE WHEN a.id > 1 THEN 1 ELSE 0 END FROM Account a"
    );
    assert_eq!(
        sql(DialectKind::Postgres, &q),
        "SELECT a.id > 1 FROM Account a"
    );
}

fn person_entity_like_accounts() -> Query {
    Query::entity(account_type())
}

#[test]
fn test_sorted_page_on_sqlserver() {
    let p = person_ident("p");
    let q = person_entity()
        .sort_by(p.clone(), prop(&p, "name"), qx_core::xr::Ordering::Asc)
        .map(p.clone(), prop(&p, "name"))
        .take(Expr::int(3));
    assert_eq!(
        sql(DialectKind::SqlServer, &q),
        "SELECT TOP (3) p.name FROM Person p ORDER BY p.name ASC"
    );
}
