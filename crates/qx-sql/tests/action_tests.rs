//! End-to-end action compilation: inserts, updates, deletes and upserts

use qx_core::test_utils::*;
use qx_core::xr::{Assignment, ConflictResolution, ConflictTarget, ParamKind};
use qx_core::{Action, CompileError, CompilerConfig, DialectKind, Expr, Ident, ProductType, XrType};
use qx_sql::{CompiledQuery, ParamSet, ParamValue, SqlCompiler};

fn compile(dialect: DialectKind, validate: bool, a: &Action) -> CompiledQuery {
    let config = CompilerConfig {
        dialect,
        validate_output: validate,
        ..CompilerConfig::default()
    };
    SqlCompiler::new(config)
        .compile_action(a, None)
        .unwrap_or_else(|e| panic!("{dialect}: {e}"))
}

fn set(alias: &Ident, column: &str, value: Expr) -> Assignment {
    Assignment {
        alias: alias.clone(),
        property: prop(alias, column),
        value,
    }
}

fn param(bid: &str, kind: ParamKind) -> Expr {
    Expr::param(bid, kind, XrType::Value)
}

fn insert_person(kind: ParamKind) -> Action {
    let p = person_ident("p");
    Action::Insert {
        entity: person_entity(),
        assignments: vec![
            set(&p, "name", param("name", kind)),
            set(&p, "age", param("age", kind)),
        ],
    }
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

#[test]
fn test_insert_returning_generated_id() {
    let p = person_ident("p");
    let action = Action::Returning {
        action: Box::new(insert_person(ParamKind::Single)),
        alias: p.clone(),
        output: prop(&p, "id"),
    };

    let pg = compile(DialectKind::Postgres, true, &action);
    assert_eq!(
        pg.sql().unwrap(),
        "INSERT INTO Person (name, age) VALUES (?, ?) RETURNING id"
    );
    assert_eq!(pg.returning_columns, vec!["id"]);
    let bids: Vec<String> = pg.params().into_iter().map(|p| p.bid).collect();
    assert_eq!(bids, vec!["name", "age"]);

    let mssql = compile(DialectKind::SqlServer, false, &action);
    assert_eq!(
        mssql.sql().unwrap(),
        "INSERT INTO Person (name, age) OUTPUT INSERTED.id VALUES (?, ?)"
    );

    let mysql = compile(DialectKind::MySql, true, &action);
    assert_eq!(
        mysql.sql().unwrap(),
        "INSERT INTO Person (name, age) VALUES (?, ?)"
    );
    assert_eq!(mysql.returning_columns, vec!["id"]);
}

#[test]
fn test_upsert_per_dialect() {
    let existing = person_ident("e");
    let excluded = person_ident("x");
    let action = Action::OnConflict {
        insert: Box::new(insert_person(ParamKind::Single)),
        target: ConflictTarget::Properties(vec![prop(&person_ident("p"), "id")]),
        resolution: ConflictResolution::Update {
            existing: existing.clone(),
            excluded: excluded.clone(),
            assignments: vec![set(&existing, "name", prop(&excluded, "name"))],
        },
    };

    assert_eq!(
        compile(DialectKind::Postgres, true, &action).sql().unwrap(),
        "INSERT INTO Person (name, age) VALUES (?, ?) ON CONFLICT (id) DO UPDATE SET name = EXCLUDED.name"
    );
    assert_eq!(
        compile(DialectKind::MySql, true, &action).sql().unwrap(),
        "INSERT INTO Person (name, age) VALUES (?, ?) ON DUPLICATE KEY UPDATE name = VALUES(name)"
    );

    let err = SqlCompiler::new(CompilerConfig::default().with_dialect(DialectKind::SqlServer))
        .compile_action(&action, None)
        .unwrap_err();
    assert_eq!(err.phases(), vec!["tokenize"]);
    assert!(matches!(err.root_cause(), CompileError::Unsupported { .. }));
}

#[test]
fn test_filtered_delete_on_boolean_column() {
    let a = Ident::new("a", XrType::Product(account_type()));
    let action = Action::FilteredAction {
        action: Box::new(Action::Delete {
            entity: qx_core::Query::entity(account_type()),
        }),
        alias: a.clone(),
        filter: prop(&a, "active"),
    };

    assert_eq!(
        compile(DialectKind::Sqlite, true, &action).sql().unwrap(),
        "DELETE FROM Account WHERE active = 1"
    );
    assert_eq!(
        compile(DialectKind::Postgres, true, &action).sql().unwrap(),
        "DELETE FROM Account AS a WHERE a.active"
    );
}

#[test]
fn test_batch_insert_realized_per_row() {
    let out = compile(DialectKind::Postgres, true, &insert_person(ParamKind::Batch));
    assert!(matches!(
        out.sql(),
        Err(CompileError::UnrealizedParam { .. })
    ));

    let rows = ParamSet::new()
        .row([("name", ParamValue::from("ann")), ("age", ParamValue::from(31))])
        .row([("name", ParamValue::from("bob")), ("age", ParamValue::from(42))]);
    let realized = out.realize(&rows);
    assert_eq!(
        realized.sql().unwrap(),
        "INSERT INTO Person (name, age) VALUES (?, ?), (?, ?)"
    );
    let values: Vec<Option<ParamValue>> = realized.params().into_iter().map(|p| p.value).collect();
    assert_eq!(
        values,
        vec![
            Some(ParamValue::from("ann")),
            Some(ParamValue::from(31)),
            Some(ParamValue::from("bob")),
            Some(ParamValue::from(42)),
        ]
    );
}

#[test]
fn test_statement_carries_returning_columns() {
    let p = person_ident("p");
    let action = Action::Returning {
        action: Box::new(insert_person(ParamKind::Single)),
        alias: p.clone(),
        output: prop(&p, "id"),
    };
    let json = compile(DialectKind::Postgres, false, &action)
        .to_statement()
        .unwrap()
        .to_json()
        .unwrap();
    let value: serde_json::Value = serde_json::from_str(&json).unwrap();
    assert_eq!(value["returning_columns"][0], "id");
    assert_eq!(value["params"].as_array().map(Vec::len), Some(2));
}
