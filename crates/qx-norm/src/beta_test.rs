use super::*;
use qx_core::test_utils::*;
use qx_core::xr::{ProductType, XrType};

fn reduce(e: &Expr) -> Expr {
    reduce_expr(e, HashMap::new(), &mut FreshNames::new()).unwrap()
}

#[test]
fn test_function_apply_substitutes_parameter() {
    let x = ident("x");
    let body = plus(Expr::id(&x), Expr::int(1));
    let apply = Expr::FunctionApply {
        function: Box::new(Expr::Function {
            params: vec![x.clone()],
            body: Box::new(body),
        }),
        args: vec![Expr::int(41)],
    };
    assert_eq!(reduce(&apply), plus(Expr::int(41), Expr::int(1)));
}

#[test]
fn test_nested_function_application_reaches_fixpoint() {
    let x = ident("x");
    let y = ident("y");
    let inner = Expr::Function {
        params: vec![y.clone()],
        body: Box::new(Expr::id(&y)),
    };
    // (x => x.apply(41)).apply(y => y)
    let outer = Expr::FunctionApply {
        function: Box::new(Expr::Function {
            params: vec![x.clone()],
            body: Box::new(Expr::FunctionApply {
                function: Box::new(Expr::id(&x)),
                args: vec![Expr::int(41)],
            }),
        }),
        args: vec![inner],
    };
    assert_eq!(reduce(&outer), Expr::int(41));
}

#[test]
fn test_property_of_product_projects_field() {
    let product = Expr::tuple(vec![Expr::string("a"), Expr::int(2)]);
    assert_eq!(reduce(&product.clone().dot("_2")), Expr::int(2));
    assert_eq!(
        reduce(&product.dot("_3")),
        Expr::tuple(vec![Expr::string("a"), Expr::int(2)]).dot("_3")
    );
}

#[test]
fn test_block_reduces_right_to_left() {
    let a = ident("a");
    let b = ident("b");
    // { val a = 1; val b = a + 1; b + b }
    let block = Expr::Block {
        bindings: vec![
            (a.clone(), Expr::int(1)),
            (b.clone(), plus(Expr::id(&a), Expr::int(1))),
        ],
        output: Box::new(plus(Expr::id(&b), Expr::id(&b))),
    };
    let one_plus_one = plus(Expr::int(1), Expr::int(1));
    assert_eq!(reduce(&block), plus(one_plus_one.clone(), one_plus_one));
}

#[test]
fn test_substitution_avoids_capture() {
    // (p => query[Person].filter(x => x.age > p)) applied with p := x.limit
    let p = ident("p");
    let x = ident("x");
    let filter = person_entity().filter(x.clone(), gt(prop(&x, "age"), Expr::id(&p)));
    let replacement = prop(&x, "limit");
    let out = substitute_query(&filter, &p, &replacement, &mut FreshNames::new()).unwrap();
    let Query::Filter { alias, body, .. } = &out else {
        panic!("expected filter, got {out}");
    };
    assert_ne!(alias.name, "x");
    assert_eq!(body, &gt(prop(alias, "age"), prop(&x, "limit")));
}

#[test]
fn test_shadowed_binder_is_not_substituted() {
    let p = ident("p");
    let q = person_entity().map(p.clone(), prop(&p, "name"));
    let out = substitute_query(&q, &p, &Expr::int(1), &mut FreshNames::new()).unwrap();
    assert_eq!(out, q);
}

#[test]
fn test_query_expr_wrappers_cancel() {
    let e = Expr::int(5);
    let wrapped = Expr::query(Query::of_expr(e.clone()));
    assert_eq!(reduce(&wrapped), e);

    let q = person_entity();
    let doubly = Query::of_expr(Expr::query(q.clone()));
    let out = reduce_query(&doubly, HashMap::new(), &mut FreshNames::new()).unwrap();
    assert_eq!(out, q);
}

#[test]
fn test_incompatible_replacement_is_rejected() {
    let p = person_ident("p");
    let other = Ident::new(
        "a",
        XrType::Product(ProductType::of_values("Address", &["street"])),
    );
    let err = substitute(&Expr::id(&p), &p, &Expr::id(&other), &mut FreshNames::new()).unwrap_err();
    assert!(matches!(err, CompileError::TypeMismatch { .. }));
    assert!(err.to_string().starts_with("[Q003]"));
}

#[test]
fn test_boolean_value_replaces_boolean_expression() {
    let flag = Ident::new("f", XrType::BooleanExpression);
    let out = substitute(&Expr::id(&flag), &flag, &Expr::boolean(true), &mut FreshNames::new())
        .unwrap();
    assert_eq!(out, Expr::boolean(true));
}

#[test]
fn test_fresh_names_are_monotonic_and_avoid_set() {
    let mut fresh = FreshNames::new();
    let avoid: HashSet<String> = ["x1".to_string()].into_iter().collect();
    let a = fresh.fresh(&ident("x"), &avoid);
    let b = fresh.fresh(&ident("x"), &avoid);
    assert_eq!(a.name, "x2");
    assert_eq!(b.name, "x3");
}
