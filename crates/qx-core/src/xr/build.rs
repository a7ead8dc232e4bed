//! Builder helpers for assembling XR trees by hand

use super::expr::{BinaryOperator, Branch, CallKind, Constant, Expr, ParamKind, UnaryOperator};
use super::ident::{Ident, Visibility};
use super::query::{JoinKind, Ordering, Query};
use super::types::{ProductType, XrType};

impl Query {
    /// `Entity(name)` with its row type
    pub fn entity(tpe: ProductType) -> Query {
        Query::Entity {
            name: tpe.name.clone(),
            tpe,
        }
    }

    pub fn filter(self, alias: Ident, body: Expr) -> Query {
        Query::Filter {
            source: Box::new(self),
            alias,
            body,
        }
    }

    pub fn map(self, alias: Ident, body: Expr) -> Query {
        Query::Map {
            source: Box::new(self),
            alias,
            body,
        }
    }

    pub fn flat_map(self, alias: Ident, body: Query) -> Query {
        Query::FlatMap {
            source: Box::new(self),
            alias,
            body: Box::new(body),
        }
    }

    pub fn concat_map(self, alias: Ident, body: Expr) -> Query {
        Query::ConcatMap {
            source: Box::new(self),
            alias,
            body,
        }
    }

    pub fn sort_by(self, alias: Ident, criteria: Expr, ordering: Ordering) -> Query {
        Query::SortBy {
            source: Box::new(self),
            alias,
            criteria,
            ordering,
        }
    }

    pub fn group_by_map(self, by_alias: Ident, by: Expr, map_alias: Ident, map: Expr) -> Query {
        Query::GroupByMap {
            source: Box::new(self),
            by_alias,
            by,
            map_alias,
            map,
        }
    }

    pub fn take(self, count: Expr) -> Query {
        Query::Take {
            source: Box::new(self),
            count,
        }
    }

    pub fn drop(self, count: Expr) -> Query {
        Query::Drop {
            source: Box::new(self),
            count,
        }
    }

    pub fn distinct(self) -> Query {
        Query::Distinct {
            source: Box::new(self),
        }
    }

    pub fn distinct_on(self, alias: Ident, by: Expr) -> Query {
        Query::DistinctOn {
            source: Box::new(self),
            alias,
            by,
        }
    }

    pub fn nested(self) -> Query {
        Query::Nested {
            source: Box::new(self),
        }
    }

    pub fn union(self, other: Query) -> Query {
        Query::Union {
            a: Box::new(self),
            b: Box::new(other),
        }
    }

    pub fn union_all(self, other: Query) -> Query {
        Query::UnionAll {
            a: Box::new(self),
            b: Box::new(other),
        }
    }

    /// `kind join(self) on (alias => on)`
    pub fn join(self, kind: JoinKind, alias: Ident, on: Expr) -> Query {
        Query::FlatJoin {
            kind,
            source: Box::new(self),
            alias,
            on,
        }
    }

    /// Wrap an expression as a one-row query
    pub fn of_expr(expr: Expr) -> Query {
        Query::ExprAsQuery { expr }
    }
}

impl Expr {
    /// Reference an identifier
    pub fn id(ident: &Ident) -> Expr {
        Expr::Ident(ident.clone())
    }

    /// `self.name`
    pub fn dot(self, name: impl Into<String>) -> Expr {
        Expr::Property {
            of: Box::new(self),
            name: name.into(),
            visibility: Visibility::Visible,
        }
    }

    pub fn binary(a: Expr, op: BinaryOperator, b: Expr) -> Expr {
        Expr::BinaryOp {
            a: Box::new(a),
            op,
            b: Box::new(b),
        }
    }

    pub fn unary(op: UnaryOperator, expr: Expr) -> Expr {
        Expr::UnaryOp {
            op,
            expr: Box::new(expr),
        }
    }

    pub fn and(self, other: Expr) -> Expr {
        Expr::binary(self, BinaryOperator::And, other)
    }

    pub fn or(self, other: Expr) -> Expr {
        Expr::binary(self, BinaryOperator::Or, other)
    }

    pub fn not(self) -> Expr {
        Expr::unary(UnaryOperator::Not, self)
    }

    pub fn int(v: i32) -> Expr {
        Expr::Const(Constant::Int(v))
    }

    pub fn long(v: i64) -> Expr {
        Expr::Const(Constant::Long(v))
    }

    pub fn string(v: impl Into<String>) -> Expr {
        Expr::Const(Constant::String(v.into()))
    }

    pub fn boolean(v: bool) -> Expr {
        Expr::Const(Constant::Bool(v))
    }

    pub fn null() -> Expr {
        Expr::Const(Constant::Null)
    }

    /// Tuple with positional field names `_1`, `_2`, ...
    pub fn tuple(items: Vec<Expr>) -> Expr {
        Expr::Product {
            name: format!("Tuple{}", items.len()),
            fields: items
                .into_iter()
                .enumerate()
                .map(|(i, e)| (format!("_{}", i + 1), e))
                .collect(),
        }
    }

    /// Single-branch CASE WHEN
    pub fn when(cond: Expr, then: Expr, or_else: Expr) -> Expr {
        Expr::When {
            branches: vec![Branch { cond, then }],
            or_else: Box::new(or_else),
        }
    }

    /// Pure global function call
    pub fn call(name: impl Into<String>, args: Vec<Expr>, tpe: XrType) -> Expr {
        Expr::GlobalCall {
            name: name.into(),
            args,
            kind: CallKind::PureFunction,
            tpe,
        }
    }

    /// `head.name(args)` with a call kind
    pub fn method(
        head: Expr,
        name: impl Into<String>,
        args: Vec<Expr>,
        kind: CallKind,
        tpe: XrType,
    ) -> Expr {
        Expr::MethodCall {
            head: Box::new(head),
            name: name.into(),
            args,
            kind,
            tpe,
        }
    }

    /// A runtime parameter
    pub fn param(bid: impl Into<String>, kind: ParamKind, tpe: XrType) -> Expr {
        Expr::Param {
            bid: bid.into(),
            kind,
            tpe,
        }
    }

    /// A query used as a scalar
    pub fn query(q: Query) -> Expr {
        Expr::QueryAsExpr(Box::new(q))
    }

    /// Conjunction of all items; `None` for an empty list
    pub fn conjunction(items: impl IntoIterator<Item = Expr>) -> Option<Expr> {
        items.into_iter().reduce(Expr::and)
    }

    /// Disjunction of all items; `None` for an empty list
    pub fn disjunction(items: impl IntoIterator<Item = Expr>) -> Option<Expr> {
        items.into_iter().reduce(Expr::or)
    }
}
