use super::*;
use qx_core::config::ParamStyle;

fn paging_sql(p: &Paging) -> (Option<String>, Option<String>) {
    let build = |t: &Option<Token>| t.as_ref().map(|t| t.build(ParamStyle::Question).unwrap());
    (build(&p.top), build(&p.tail))
}

#[test]
fn test_dialect_for_every_kind() {
    for kind in DialectKind::ALL {
        let dialect = dialect_for(kind);
        assert_eq!(dialect.kind(), kind);
        assert_eq!(dialect.name(), kind.to_string());
    }
}

#[test]
fn test_parse_with_each_dialect() {
    for kind in DialectKind::ALL {
        let stmts = dialect_for(kind).parse("SELECT p.name FROM Person p").unwrap();
        assert_eq!(stmts.len(), 1);
    }
}

#[test]
fn test_parse_error_location() {
    let err = GenericDialect::new().parse("SELECT * FROM\nWHERE").unwrap_err();
    let CompileError::SqlSyntax {
        dialect,
        line,
        message,
        ..
    } = err
    else {
        panic!("expected syntax error");
    };
    assert_eq!(dialect, "generic");
    assert_eq!(line, 2, "message: {message}");
}

#[test]
fn test_parse_location_extraction() {
    assert_eq!(
        parse_location_from_error("Expected: something at Line: 5, Column: 10"),
        (5, 10)
    );
    assert_eq!(parse_location_from_error("Some error without location"), (0, 0));
}

#[test]
fn test_quote_ident() {
    assert_eq!(GenericDialect::new().quote_ident("user\"name"), "\"user\"\"name\"");
    assert_eq!(MySqlDialect::new().quote_ident("order"), "`order`");
    assert_eq!(SqlServerDialect::new().quote_ident("a]b"), "[a]]b]");
}

#[test]
fn test_escape_ident_quotes_reserved_and_odd_names() {
    let d = PostgresDialect::new();
    assert_eq!(d.escape_ident("name"), "name");
    assert_eq!(d.escape_ident("order"), "\"order\"");
    assert_eq!(d.escape_ident("first name"), "\"first name\"");
    assert_eq!(d.escape_ident("1st"), "\"1st\"");
}

#[test]
fn test_limit_offset_placement() {
    let l = || Some(Token::lit("5"));
    let o = || Some(Token::lit("10"));

    let generic = GenericDialect::new();
    assert_eq!(paging_sql(&generic.paging(l(), None, false)), (None, Some("LIMIT 5".into())));
    assert_eq!(paging_sql(&generic.paging(None, o(), false)), (None, Some("OFFSET 10".into())));
    assert_eq!(
        paging_sql(&generic.paging(l(), o(), false)),
        (None, Some("LIMIT 5 OFFSET 10".into()))
    );

    let sqlite = SqliteDialect::new();
    assert_eq!(
        paging_sql(&sqlite.paging(None, o(), false)),
        (None, Some("LIMIT -1 OFFSET 10".into()))
    );

    let mysql = MySqlDialect::new();
    assert_eq!(
        paging_sql(&mysql.paging(None, o(), false)),
        (None, Some("LIMIT 18446744073709551615 OFFSET 10".into()))
    );

    let mssql = SqlServerDialect::new();
    assert_eq!(paging_sql(&mssql.paging(l(), None, false)), (Some("TOP (5)".into()), None));
    let p = mssql.paging(l(), o(), false);
    assert!(p.order_fallback);
    assert_eq!(
        paging_sql(&p),
        (None, Some("OFFSET 10 ROWS FETCH FIRST 5 ROWS ONLY".into()))
    );
    assert!(!mssql.paging(l(), o(), true).order_fallback);

    let oracle = OracleDialect::new();
    assert_eq!(
        paging_sql(&oracle.paging(l(), None, false)),
        (None, Some("FETCH FIRST 5 ROWS ONLY".into()))
    );
}

#[test]
fn test_boolean_literals() {
    assert_eq!(PostgresDialect::new().boolean_literal(true), "TRUE");
    assert_eq!(SqliteDialect::new().boolean_literal(true), "1");
    assert_eq!(SqlServerDialect::new().boolean_literal(false), "0");
}

#[test]
fn test_write_capabilities() {
    assert_eq!(PostgresDialect::new().upsert(), UpsertStyle::OnConflict);
    assert_eq!(MySqlDialect::new().upsert(), UpsertStyle::OnDuplicateKey);
    assert_eq!(SqlServerDialect::new().upsert(), UpsertStyle::Unsupported);
    assert_eq!(SqlServerDialect::new().returning(), ReturningStyle::Output);
    assert_eq!(MySqlDialect::new().returning(), ReturningStyle::GeneratedKeys);
}

#[test]
fn test_json_extract_per_dialect() {
    let t = || Token::lit("p.doc");
    let path = || Token::lit("'$.a'");
    let render = |t: Option<Token>| t.map(|t| t.render(false));
    assert_eq!(
        render(PostgresDialect::new().json_extract(t(), path())),
        Some("(p.doc ->> '$.a')".into())
    );
    assert_eq!(
        render(MySqlDialect::new().json_extract(t(), path())),
        Some("JSON_UNQUOTE(JSON_EXTRACT(p.doc, '$.a'))".into())
    );
    assert_eq!(render(H2Dialect::new().json_extract(t(), path())), None);
}
