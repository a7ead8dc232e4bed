//! Shared test utilities for building XR trees

use crate::xr::{BinaryOperator, Expr, Ident, ProductType, Query, XrType};

/// `Person(id, name, age)`
pub fn person_type() -> ProductType {
    ProductType::of_values("Person", &["id", "name", "age"])
}

/// `Address(personId, street)`
pub fn address_type() -> ProductType {
    ProductType::of_values("Address", &["personId", "street"])
}

/// `query[Person]`
pub fn person_entity() -> Query {
    Query::entity(person_type())
}

/// `query[Address]`
pub fn address_entity() -> Query {
    Query::entity(address_type())
}

/// An identifier of unknown type
pub fn ident(name: &str) -> Ident {
    Ident::new(name, XrType::Unknown)
}

/// An identifier ranging over `Person` rows
pub fn person_ident(name: &str) -> Ident {
    Ident::new(name, XrType::Product(person_type()))
}

/// An identifier ranging over `Address` rows
pub fn address_ident(name: &str) -> Ident {
    Ident::new(name, XrType::Product(address_type()))
}

/// `of.name`
pub fn prop(of: &Ident, name: &str) -> Expr {
    Expr::id(of).dot(name)
}

pub fn eq(a: Expr, b: Expr) -> Expr {
    Expr::binary(a, BinaryOperator::Eq, b)
}

pub fn gt(a: Expr, b: Expr) -> Expr {
    Expr::binary(a, BinaryOperator::Gt, b)
}

pub fn lt(a: Expr, b: Expr) -> Expr {
    Expr::binary(a, BinaryOperator::Lt, b)
}

pub fn plus(a: Expr, b: Expr) -> Expr {
    Expr::binary(a, BinaryOperator::Plus, b)
}
