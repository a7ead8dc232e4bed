use super::*;
use qx_core::config::TraceConfig;
use qx_core::error::CompileError;
use qx_core::test_utils::*;
use qx_core::trace::Tracer;
use qx_core::xr::{Ident, JoinKind, Ordering, SelectClause, XrType};

fn normalize(q: &Query) -> Query {
    let mut tracer = Tracer::disabled();
    let mut ctx = PassContext::new(&mut tracer);
    Normalizer::with_defaults().normalize(q, &mut ctx).unwrap()
}

fn samples() -> Vec<Query> {
    let p = ident("p");
    let a = ident("a");
    let n = ident("n");
    let x = ident("x");
    vec![
        person_entity()
            .filter(p.clone(), gt(prop(&p, "age"), Expr::int(18)))
            .map(p.clone(), prop(&p, "name")),
        person_entity()
            .map(p.clone(), prop(&p, "name"))
            .map(n.clone(), Expr::id(&n)),
        person_entity()
            .filter(p.clone(), gt(prop(&p, "age"), Expr::int(18)))
            .flat_map(
                p.clone(),
                address_entity()
                    .filter(a.clone(), eq(prop(&a, "personId"), prop(&p, "id")))
                    .map(a.clone(), Expr::tuple(vec![prop(&p, "name"), prop(&a, "street")])),
            ),
        person_entity().flat_map(
            p.clone(),
            address_entity()
                .join(JoinKind::Left, a.clone(), eq(prop(&a, "personId"), prop(&p, "id")))
                .map(a.clone(), Expr::tuple(vec![Expr::id(&p), Expr::id(&a)])),
        ),
        person_entity()
            .map(p.clone(), prop(&p, "age"))
            .sort_by(x.clone(), Expr::id(&x), Ordering::Desc)
            .take(Expr::int(3)),
        person_entity().union_all(person_entity()).filter(
            x.clone(),
            lt(prop(&x, "age"), Expr::int(30)),
        ),
    ]
}

#[test]
fn test_normalization_is_idempotent() {
    for q in samples() {
        let once = normalize(&q);
        let twice = normalize(&once);
        assert_eq!(once, twice, "not idempotent for {q}");
    }
}

#[test]
fn test_identity_map_is_removed() {
    let p = ident("p");
    let n = ident("n");
    let q = person_entity()
        .map(p.clone(), prop(&p, "name"))
        .map(n.clone(), Expr::id(&n));
    assert_eq!(normalize(&q), person_entity().map(p.clone(), prop(&p, "name")));
}

#[test]
fn test_double_map_matches_hand_fused_map() {
    let p = ident("p");
    let n = ident("n");
    let twice = person_entity()
        .map(p.clone(), prop(&p, "age"))
        .map(n.clone(), plus(Expr::id(&n), Expr::int(1)));
    let fused = person_entity().map(p.clone(), plus(prop(&p, "age"), Expr::int(1)));
    assert_eq!(normalize(&twice), normalize(&fused));
}

#[test]
fn test_function_application_is_reduced_first() {
    let p = ident("p");
    let x = Ident::new("x", XrType::Value);
    let inc = Expr::Function {
        params: vec![x.clone()],
        body: Box::new(plus(Expr::id(&x), Expr::int(1))),
    };
    let q = person_entity().map(
        p.clone(),
        Expr::FunctionApply {
            function: Box::new(inc),
            args: vec![prop(&p, "age")],
        },
    );
    assert_eq!(
        normalize(&q),
        person_entity().map(p.clone(), plus(prop(&p, "age"), Expr::int(1)))
    );
}

#[test]
fn test_select_clause_normalizes_to_flat_chain() {
    let p = ident("p");
    let a = ident("a");
    let q = SelectClause::new(Expr::tuple(vec![prop(&p, "name"), prop(&a, "street")]))
        .from(p.clone(), person_entity())
        .join(
            JoinKind::Inner,
            a.clone(),
            address_entity(),
            eq(prop(&a, "personId"), prop(&p, "id")),
        )
        .filter(gt(prop(&p, "age"), Expr::int(18)))
        .into_query();
    let out = normalize(&q);
    let Query::FlatMap { source, body, .. } = &out else {
        panic!("expected flatMap, got {out}");
    };
    assert!(matches!(source.as_ref(), Query::Entity { .. }));
    assert!(matches!(body.as_ref(), Query::FlatMap { source, .. } if source.is_flat_join()));
    assert_eq!(normalize(&out), out);
}

#[test]
fn test_beta_failure_is_tagged_with_phase() {
    let p = ident("p");
    let x = Ident::new("x", XrType::Value);
    let bad = Expr::FunctionApply {
        function: Box::new(Expr::Function {
            params: vec![x.clone()],
            body: Box::new(Expr::id(&x)),
        }),
        args: vec![Expr::tuple(vec![Expr::int(1)])],
    };
    let q = person_entity().map(p.clone(), bad);
    let mut tracer = Tracer::disabled();
    let mut ctx = PassContext::new(&mut tracer);
    let err = Normalizer::with_defaults().normalize(&q, &mut ctx).unwrap_err();
    assert_eq!(err.phases(), vec!["beta"]);
    assert!(matches!(err.root_cause(), CompileError::TypeMismatch { .. }));
}

#[test]
fn test_iteration_bound_is_an_invariant_violation() {
    let p = ident("p");
    let q = person_entity().map(p.clone(), prop(&p, "name"));
    let mut tracer = Tracer::disabled();
    let mut ctx = PassContext::new(&mut tracer);
    let err = Normalizer::with_defaults()
        .with_max_iterations(0)
        .normalize(&q, &mut ctx)
        .unwrap_err();
    assert!(matches!(err, CompileError::InvariantViolation { ref phase, .. } if phase == "normalize"));
}

#[test]
fn test_phases_are_traced() {
    let p = ident("p");
    let n = ident("n");
    let q = person_entity()
        .map(p.clone(), prop(&p, "name"))
        .map(n.clone(), Expr::id(&n));
    let mut tracer = Tracer::new(&TraceConfig {
        enabled: true,
        types: vec![TraceType::Normalizations],
    });
    let mut ctx = PassContext::new(&mut tracer);
    Normalizer::with_defaults().normalize(&q, &mut ctx).unwrap();
    let events = tracer.flush();
    assert!(events
        .iter()
        .any(|e| e.kind == TraceType::Normalizations && e.message.starts_with("apply_map:")));
}

#[test]
fn test_pass_names_in_order() {
    assert_eq!(
        Normalizer::with_defaults().pass_names(),
        vec![
            "symbolic_reduction",
            "apply_map",
            "adhoc_reduction",
            "dealias",
            "alias_push",
            "null_checks"
        ]
    );
}

#[test]
fn test_nested_query_in_action_is_normalized() {
    let p = ident("p");
    let n = ident("n");
    let x = ident("x");
    let names = person_entity()
        .map(p.clone(), prop(&p, "name"))
        .map(n.clone(), Expr::id(&n));
    let action = Action::FilteredAction {
        action: Box::new(Action::Delete {
            entity: person_entity(),
        }),
        alias: x.clone(),
        filter: Expr::binary(
            prop(&x, "name"),
            qx_core::xr::BinaryOperator::In,
            Expr::query(names),
        ),
    };
    let mut tracer = Tracer::disabled();
    let mut ctx = PassContext::new(&mut tracer);
    let out = Normalizer::with_defaults()
        .normalize_action(&action, &mut ctx)
        .unwrap();
    let Action::FilteredAction { filter, .. } = out else {
        panic!("expected filtered action");
    };
    let Expr::BinaryOp { b, .. } = filter else {
        panic!("expected IN");
    };
    assert_eq!(
        *b,
        Expr::query(person_entity().map(p.clone(), prop(&p, "name")))
    );
}
