use super::*;
use crate::token::ParamValue;
use qx_core::config::TraceConfig;
use qx_core::test_utils::*;
use qx_core::xr::{BinaryOperator, ParamKind, XrType};

fn compiler(dialect: DialectKind) -> SqlCompiler {
    SqlCompiler::new(CompilerConfig::default().with_dialect(dialect))
}

fn adults() -> Query {
    let p = person_ident("p");
    person_entity()
        .filter(p.clone(), gt(prop(&p, "age"), Expr::int(18)))
        .map(p.clone(), prop(&p, "name"))
}

fn older_than_param() -> Query {
    let p = person_ident("p");
    person_entity()
        .filter(
            p.clone(),
            gt(
                prop(&p, "age"),
                Expr::param("min", ParamKind::Single, XrType::Value),
            ),
        )
        .map(p.clone(), prop(&p, "name"))
}

fn ids_in_list() -> Query {
    let p = person_ident("p");
    person_entity()
        .filter(
            p.clone(),
            Expr::binary(
                prop(&p, "id"),
                BinaryOperator::In,
                Expr::param("ids", ParamKind::List, XrType::Value),
            ),
        )
        .map(p.clone(), prop(&p, "name"))
}

#[test]
fn test_compile_filter_map() {
    let out = compiler(DialectKind::Generic)
        .compile_query(&adults(), Some("adults"))
        .unwrap();
    assert_eq!(
        out.sql().unwrap(),
        "SELECT p.name FROM Person p WHERE p.age > 18"
    );
    assert_eq!(out.label.as_deref(), Some("adults"));
    assert_eq!(out.dialect, DialectKind::Generic);
    assert!(out.params().is_empty());
}

#[test]
fn test_label_falls_back_to_config() {
    let config = CompilerConfig {
        label: Some("default".into()),
        ..CompilerConfig::default()
    };
    let out = SqlCompiler::new(config)
        .compile_query(&adults(), None)
        .unwrap();
    assert_eq!(out.label.as_deref(), Some("default"));
}

#[test]
fn test_numbered_placeholders() {
    let config = CompilerConfig {
        dialect: DialectKind::Postgres,
        param_style: ParamStyle::Numbered,
        ..CompilerConfig::default()
    };
    let out = SqlCompiler::new(config)
        .compile_query(&older_than_param(), None)
        .unwrap();
    assert_eq!(
        out.sql().unwrap(),
        "SELECT p.name FROM Person p WHERE p.age > $1"
    );
    assert_eq!(
        out.params(),
        vec![BoundParam {
            bid: "min".into(),
            value: None
        }]
    );
}

#[test]
fn test_list_param_realized_after_compile() {
    let out = compiler(DialectKind::Generic)
        .compile_query(&ids_in_list(), None)
        .unwrap();
    assert!(matches!(
        out.sql(),
        Err(CompileError::UnrealizedParam { .. })
    ));
    assert_eq!(
        out.debug_sql(false),
        "SELECT p.name FROM Person p WHERE p.id IN (:ids[list])"
    );

    let realized = out.realize(&ParamSet::new().list("ids", [3, 5]));
    assert_eq!(
        realized.sql().unwrap(),
        "SELECT p.name FROM Person p WHERE p.id IN (?, ?)"
    );
    let values: Vec<Option<ParamValue>> = realized.params().into_iter().map(|p| p.value).collect();
    assert_eq!(
        values,
        vec![Some(ParamValue::Int(3)), Some(ParamValue::Int(5))]
    );
}

#[test]
fn test_validation_accepts_output_and_skips_unrealized_lists() {
    for kind in DialectKind::ALL {
        let config = CompilerConfig {
            dialect: kind,
            validate_output: true,
            ..CompilerConfig::default()
        };
        let compiler = SqlCompiler::new(config);
        compiler
            .compile_query(&adults(), None)
            .unwrap_or_else(|e| panic!("{kind}: {e}"));
        compiler
            .compile_query(&ids_in_list(), None)
            .unwrap_or_else(|e| panic!("{kind}: {e}"));
    }
}

#[test]
fn test_validation_accepts_bound_params_in_every_dialect() {
    for kind in DialectKind::ALL {
        let config = CompilerConfig {
            dialect: kind,
            validate_output: true,
            ..CompilerConfig::default()
        };
        let out = SqlCompiler::new(config)
            .compile_query(&older_than_param(), None)
            .unwrap_or_else(|e| panic!("{kind}: {e}"));
        assert_eq!(
            out.sql().unwrap(),
            "SELECT p.name FROM Person p WHERE p.age > ?"
        );
    }
    assert_eq!(
        dialect_for(DialectKind::Postgres).validation_param_style(),
        ParamStyle::Numbered
    );
}

#[test]
fn test_missing_splice_fails_in_splice_phase() {
    let q = Query::TagForSqlQuery {
        bid: "people".into(),
        tpe: XrType::Product(person_type()),
    };
    let err = compiler(DialectKind::Generic)
        .compile_query(&q, None)
        .unwrap_err();
    assert_eq!(err.phases(), vec!["splice"]);
    assert_eq!(
        err.root_cause(),
        &CompileError::MissingSplice {
            bid: "people".into()
        }
    );
}

#[test]
fn test_splices_resolved_before_normalization() {
    let p = person_ident("p");
    let q = person_entity()
        .filter(
            p.clone(),
            gt(
                prop(&p, "age"),
                Expr::TagForSqlExpr {
                    bid: "min".into(),
                    tpe: XrType::Value,
                },
            ),
        )
        .map(p.clone(), prop(&p, "name"));
    let splices = SpliceMap::new().with_expr("min", Expr::int(18));
    let out = compiler(DialectKind::Generic)
        .compile_query_with(&q, &splices, None)
        .unwrap();
    assert_eq!(
        out.sql().unwrap(),
        "SELECT p.name FROM Person p WHERE p.age > 18"
    );
}

#[test]
fn test_unsupported_construct_tagged_with_tokenize() {
    let p = person_ident("p");
    let q = person_entity().concat_map(p.clone(), prop(&p, "name"));
    let err = compiler(DialectKind::Generic)
        .compile_query(&q, None)
        .unwrap_err();
    assert_eq!(err.phases(), vec!["tokenize"]);
    assert!(matches!(
        err.root_cause(),
        CompileError::Unsupported { construct, .. } if construct == "concatMap"
    ));

    let out = compiler(DialectKind::Postgres)
        .compile_query(&q, None)
        .unwrap();
    assert_eq!(out.sql().unwrap(), "SELECT UNNEST(p.name) FROM Person p");
}

#[test]
fn test_compile_expr_without_source() {
    let e = plus(Expr::int(1), Expr::int(2));
    assert_eq!(
        compiler(DialectKind::Generic)
            .compile_expr(&e, None)
            .unwrap()
            .sql()
            .unwrap(),
        "SELECT 1 + 2"
    );
    assert_eq!(
        compiler(DialectKind::Oracle)
            .compile_expr(&e, None)
            .unwrap()
            .sql()
            .unwrap(),
        "SELECT 1 + 2 FROM DUAL"
    );
}

#[test]
fn test_trace_events_returned_in_order() {
    let config = CompilerConfig {
        trace: TraceConfig {
            enabled: true,
            types: vec![TraceType::Standard],
        },
        ..CompilerConfig::default()
    };
    let out = SqlCompiler::new(config)
        .compile_query(&adults(), Some("q1"))
        .unwrap();
    let messages: Vec<&str> = out.trace.iter().map(|e| e.message.as_str()).collect();
    assert_eq!(
        messages,
        vec![
            "compiling q1 for generic",
            "compiled q1: SELECT p.name FROM Person p WHERE p.age > 18",
        ]
    );
}

#[test]
fn test_tracing_off_records_nothing() {
    let out = compiler(DialectKind::Generic)
        .compile_query(&adults(), None)
        .unwrap();
    assert!(out.trace.is_empty());
}

#[test]
fn test_statement_serializes_to_json() {
    let out = compiler(DialectKind::Postgres)
        .compile_query(&older_than_param(), Some("older"))
        .unwrap();
    let json = out.to_statement().unwrap().to_json().unwrap();
    let value: serde_json::Value = serde_json::from_str(&json).unwrap();
    assert_eq!(value["sql"], "SELECT p.name FROM Person p WHERE p.age > ?");
    assert_eq!(value["label"], "older");
    assert_eq!(value["dialect"], "postgres");
    assert_eq!(value["params"][0]["bid"], "min");
    assert!(value.get("returning_columns").is_none());
}

#[test]
fn test_custom_dialect_replaces_configured_one() {
    let compiler = compiler(DialectKind::Generic)
        .with_dialect(Box::new(crate::dialect::MySqlDialect::new()));
    assert_eq!(compiler.dialect().name(), "mysql");
    let out = compiler.compile_query(&adults(), None).unwrap();
    assert_eq!(out.dialect, DialectKind::MySql);
}
