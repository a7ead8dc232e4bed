use super::*;

fn person() -> XrType {
    XrType::Product(ProductType::of_values("Person", &["name", "age"]))
}

#[test]
fn test_absorbing_types_join_to_other_side() {
    for absorbing in [XrType::Unknown, XrType::Generic, XrType::Null] {
        assert_eq!(absorbing.least_upper_type(&XrType::Value), Some(XrType::Value));
        assert_eq!(person().least_upper_type(&absorbing), Some(person()));
    }
}

#[test]
fn test_boolean_value_wins_over_expression() {
    assert_eq!(
        XrType::BooleanExpression.least_upper_type(&XrType::BooleanValue),
        Some(XrType::BooleanValue)
    );
    assert_eq!(
        XrType::BooleanValue.least_upper_type(&XrType::BooleanExpression),
        Some(XrType::BooleanValue)
    );
}

#[test]
fn test_mismatched_leaves_have_no_upper_bound() {
    assert_eq!(XrType::Value.least_upper_type(&XrType::BooleanValue), None);
    assert_eq!(person().least_upper_type(&XrType::Value), None);
}

#[test]
fn test_products_join_field_by_field() {
    let a = XrType::Product(ProductType::new(
        "Person",
        vec![
            ("name".into(), XrType::Unknown),
            ("active".into(), XrType::BooleanExpression),
        ],
    ));
    let b = XrType::Product(ProductType::new(
        "Person",
        vec![
            ("active".into(), XrType::BooleanValue),
            ("name".into(), XrType::Value),
            ("age".into(), XrType::Value),
        ],
    ));
    let joined = a.least_upper_type(&b).unwrap();
    let p = joined.as_product().unwrap();
    let names: Vec<_> = p.field_names().collect();
    assert_eq!(names, vec!["name", "active", "age"]);
    assert_eq!(p.field("name"), Some(&XrType::Value));
    assert_eq!(p.field("active"), Some(&XrType::BooleanValue));
}

#[test]
fn test_products_with_different_names_do_not_join() {
    let other = XrType::Product(ProductType::of_values("Address", &["name", "age"]));
    assert_eq!(person().least_upper_type(&other), None);
}

#[test]
fn test_leaf_paths_follow_declaration_order() {
    let nested = XrType::Product(ProductType::new(
        "Tuple2",
        vec![
            ("_1".into(), person()),
            ("_2".into(), XrType::Value),
        ],
    ));
    let paths: Vec<_> = nested
        .leaf_paths()
        .into_iter()
        .map(|(p, _)| p.join("_"))
        .collect();
    assert_eq!(paths, vec!["_1_name", "_1_age", "_2"]);
    assert_eq!(XrType::Value.leaf_paths(), vec![(vec![], XrType::Value)]);
}

#[test]
fn test_display_product() {
    assert_eq!(person().to_string(), "Person(name: Value, age: Value)");
}
