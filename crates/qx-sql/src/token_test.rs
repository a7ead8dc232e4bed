use super::*;

fn select_in() -> Token {
    Token::spaced(vec![
        Token::lit("SELECT p.name FROM Person p WHERE p.age >"),
        Token::Param { bid: "a".into() },
        Token::lit("AND p.id IN"),
        Token::parens(Token::ParamList { bid: "ids".into() }),
    ])
}

#[test]
fn test_unrealized_list_renders_but_does_not_build() {
    let t = select_in();
    assert_eq!(
        t.render(false),
        "SELECT p.name FROM Person p WHERE p.age > ? AND p.id IN (:ids[list])"
    );
    let err = t.build(ParamStyle::Question).unwrap_err();
    assert_eq!(
        err,
        CompileError::UnrealizedParam {
            bid: "ids".into(),
            kind: "list".into()
        }
    );
}

#[test]
fn test_realized_list_expands_placeholders() {
    let params = ParamSet::new().value("a", 18).list("ids", [1, 2, 3]);
    let t = select_in().realize(&params);
    assert_eq!(
        t.build(ParamStyle::Question).unwrap(),
        "SELECT p.name FROM Person p WHERE p.age > ? AND p.id IN (?, ?, ?)"
    );
    assert_eq!(
        t.build(ParamStyle::Numbered).unwrap(),
        "SELECT p.name FROM Person p WHERE p.age > $1 AND p.id IN ($2, $3, $4)"
    );
}

#[test]
fn test_empty_list_renders_null() {
    let params = ParamSet::new().list("ids", Vec::<i64>::new());
    let t = select_in().realize(&params);
    assert!(t.build(ParamStyle::Question).unwrap().ends_with("IN (NULL)"));
}

#[test]
fn test_extract_params_follows_placeholder_order() {
    let params = ParamSet::new().value("a", 18).list("ids", [7, 9]);
    let bound = select_in().realize(&params).extract_params();
    let order: Vec<(&str, Option<ParamValue>)> = bound
        .iter()
        .map(|p| (p.bid.as_str(), p.value.clone()))
        .collect();
    assert_eq!(
        order,
        vec![
            ("a", Some(ParamValue::Int(18))),
            ("ids", Some(ParamValue::Int(7))),
            ("ids", Some(ParamValue::Int(9))),
        ]
    );
}

#[test]
fn test_unbound_single_param_still_builds() {
    let t = Token::spaced(vec![Token::lit("SELECT"), Token::Param { bid: "x".into() }]);
    assert_eq!(t.build(ParamStyle::Question).unwrap(), "SELECT ?");
    assert_eq!(t.render(true), "SELECT :x");
    assert_eq!(t.extract_params()[0].value, None);
}

#[test]
fn test_inline_render_quotes_strings() {
    let t = Token::spaced(vec![Token::lit("SELECT"), Token::Param { bid: "s".into() }]);
    let t = t.realize(&ParamSet::new().value("s", "O'Brien"));
    assert_eq!(t.render(true), "SELECT 'O''Brien'");
}

fn insert_values() -> Token {
    Token::seq(vec![
        Token::lit("INSERT INTO Person (name, age) VALUES "),
        Token::Context(Box::new(Token::parens(Token::join(
            vec![
                Token::BatchParam { bid: "name".into() },
                Token::BatchParam { bid: "age".into() },
            ],
            ", ",
        )))),
    ])
}

#[test]
fn test_batch_context_repeats_per_row() {
    let params = ParamSet::new()
        .row([("name", ParamValue::from("a")), ("age", ParamValue::from(1))])
        .row([("name", ParamValue::from("b")), ("age", ParamValue::from(2))]);
    let t = insert_values().realize(&params);
    assert_eq!(
        t.build(ParamStyle::Question).unwrap(),
        "INSERT INTO Person (name, age) VALUES (?, ?), (?, ?)"
    );
    let values: Vec<ParamValue> = t
        .extract_params()
        .into_iter()
        .filter_map(|p| p.value)
        .collect();
    assert_eq!(
        values,
        vec!["a".into(), 1.into(), "b".into(), 2.into()]
    );
}

#[test]
fn test_unrealized_batch_fails_to_build() {
    let err = insert_values().build(ParamStyle::Question).unwrap_err();
    assert!(matches!(err, CompileError::UnrealizedParam { ref kind, .. } if kind == "batch"));
    assert_eq!(
        insert_values().render(false),
        "INSERT INTO Person (name, age) VALUES (:name[batch], :age[batch])"
    );
}

#[test]
fn test_batch_outside_context_needs_single_row() {
    let t = Token::BatchParam { bid: "v".into() };
    let two = ParamSet::new().row([("v", 1)]).row([("v", 2)]);
    assert_eq!(t.realize(&two), t);
    let one = ParamSet::new().row([("v", 1)]);
    assert!(matches!(t.realize(&one), Token::BatchParamRealized { row: 0, .. }));
}

#[test]
fn test_param_set_from_json() {
    let params: ParamSet =
        serde_json::from_str(r#"{"values": {"a": 1, "b": "x", "c": null}, "lists": {"ids": [1.5, true]}}"#)
            .unwrap();
    assert_eq!(params.values["a"], ParamValue::Int(1));
    assert_eq!(params.values["b"], ParamValue::String("x".into()));
    assert_eq!(params.values["c"], ParamValue::Null);
    assert_eq!(
        params.lists["ids"],
        vec![ParamValue::Double(1.5), ParamValue::Bool(true)]
    );
}
