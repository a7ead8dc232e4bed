//! Query family of the XR tree

use super::expr::Expr;
use super::ident::Ident;
use super::types::{ProductType, XrType};
use crate::error::CompileResult;
use std::fmt;
use std::sync::Arc;

/// Join kind for `FlatJoin`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JoinKind {
    Inner,
    Left,
    Right,
    Full,
}

impl fmt::Display for JoinKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JoinKind::Inner => write!(f, "inner"),
            JoinKind::Left => write!(f, "left"),
            JoinKind::Right => write!(f, "right"),
            JoinKind::Full => write!(f, "full"),
        }
    }
}

/// Sort direction, optionally with explicit null placement
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Ordering {
    Asc,
    Desc,
    AscNullsFirst,
    DescNullsFirst,
    AscNullsLast,
    DescNullsLast,
    /// One ordering per element of a tuple criteria
    Tuple(Vec<Ordering>),
}

impl fmt::Display for Ordering {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Ordering::Asc => write!(f, "Ord.asc"),
            Ordering::Desc => write!(f, "Ord.desc"),
            Ordering::AscNullsFirst => write!(f, "Ord.ascNullsFirst"),
            Ordering::DescNullsFirst => write!(f, "Ord.descNullsFirst"),
            Ordering::AscNullsLast => write!(f, "Ord.ascNullsLast"),
            Ordering::DescNullsLast => write!(f, "Ord.descNullsLast"),
            Ordering::Tuple(items) => {
                write!(f, "Ord(")?;
                for (i, o) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{o}")?;
                }
                write!(f, ")")
            }
        }
    }
}

/// Where a custom query is being lowered
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryPosition {
    /// The top of the compiled tree
    Outermost,
    /// Inside another query or expression
    Nested,
}

/// Pluggable query sugar that lowers to core nodes before normalization
pub trait CustomQuery: fmt::Debug + Send + Sync {
    /// Short name used in traces and error messages
    fn name(&self) -> &str;

    /// Row type produced by the lowered query
    fn tpe(&self) -> XrType;

    /// Convert to core query nodes
    fn lower(&self, position: QueryPosition) -> CompileResult<Query>;
}

/// Shared handle to a custom query node
#[derive(Debug, Clone)]
pub struct CustomQueryRef(pub Arc<dyn CustomQuery>);

impl CustomQueryRef {
    /// Wrap a custom query
    pub fn new(query: impl CustomQuery + 'static) -> Self {
        Self(Arc::new(query))
    }
}

impl PartialEq for CustomQueryRef {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0) || format!("{:?}", self.0) == format!("{:?}", other.0)
    }
}

/// XR query
#[derive(Debug, Clone, PartialEq)]
pub enum Query {
    /// A table
    Entity { name: String, tpe: ProductType },
    /// `source.filter(alias => body)`
    Filter {
        source: Box<Query>,
        alias: Ident,
        body: Expr,
    },
    /// `source.map(alias => body)`
    Map {
        source: Box<Query>,
        alias: Ident,
        body: Expr,
    },
    /// `source.flatMap(alias => body)`
    FlatMap {
        source: Box<Query>,
        alias: Ident,
        body: Box<Query>,
    },
    /// `source.concatMap(alias => body)`, unnests a collection-valued body
    ConcatMap {
        source: Box<Query>,
        alias: Ident,
        body: Expr,
    },
    /// `source.sortBy(alias => criteria)(ordering)`
    SortBy {
        source: Box<Query>,
        alias: Ident,
        criteria: Expr,
        ordering: Ordering,
    },
    /// `source.groupByMap(by_alias => by)(map_alias => map)`
    GroupByMap {
        source: Box<Query>,
        by_alias: Ident,
        by: Expr,
        map_alias: Ident,
        map: Expr,
    },
    /// `source.take(count)`
    Take { source: Box<Query>, count: Expr },
    /// `source.drop(count)`
    Drop { source: Box<Query>, count: Expr },
    /// `source.distinct`
    Distinct { source: Box<Query> },
    /// `source.distinctOn(alias => by)`
    DistinctOn {
        source: Box<Query>,
        alias: Ident,
        by: Expr,
    },
    /// Forces a subquery boundary
    Nested { source: Box<Query> },
    /// `a.union(b)`
    Union { a: Box<Query>, b: Box<Query> },
    /// `a.unionAll(b)`
    UnionAll { a: Box<Query>, b: Box<Query> },
    /// A join used as a comprehension generator
    FlatJoin {
        kind: JoinKind,
        source: Box<Query>,
        alias: Ident,
        on: Expr,
    },
    /// Comprehension-level WHERE marker
    FlatFilter { by: Expr },
    /// Comprehension-level GROUP BY marker
    FlatGroupBy { by: Expr },
    /// Comprehension-level ORDER BY marker
    FlatSortBy { by: Expr, ordering: Ordering },
    /// An expression used as a one-row query
    ExprAsQuery { expr: Expr },
    /// A sub-query the front end will splice in later
    TagForSqlQuery { bid: String, tpe: XrType },
    /// Pluggable sugar, lowered before normalization
    Custom(CustomQueryRef),
}

impl Query {
    /// Row type produced by this query
    pub fn tpe(&self) -> XrType {
        match self {
            Query::Entity { tpe, .. } => XrType::Product(tpe.clone()),
            Query::Filter { source, .. }
            | Query::SortBy { source, .. }
            | Query::Take { source, .. }
            | Query::Drop { source, .. }
            | Query::Distinct { source }
            | Query::DistinctOn { source, .. }
            | Query::Nested { source }
            | Query::FlatJoin { source, .. } => source.tpe(),
            Query::Map { body, .. } | Query::ConcatMap { body, .. } => body.tpe(),
            Query::FlatMap { body, .. } => body.tpe(),
            Query::GroupByMap { map, .. } => map.tpe(),
            Query::Union { a, b } | Query::UnionAll { a, b } => {
                let (ta, tb) = (a.tpe(), b.tpe());
                ta.least_upper_type(&tb).unwrap_or(ta)
            }
            Query::FlatFilter { .. } | Query::FlatGroupBy { .. } | Query::FlatSortBy { .. } => {
                XrType::Unknown
            }
            Query::ExprAsQuery { expr } => expr.tpe(),
            Query::TagForSqlQuery { tpe, .. } => tpe.clone(),
            Query::Custom(c) => c.0.tpe(),
        }
    }

    /// Returns true for the comprehension-level markers
    pub fn is_flat_unit(&self) -> bool {
        matches!(
            self,
            Query::FlatFilter { .. } | Query::FlatGroupBy { .. } | Query::FlatSortBy { .. }
        )
    }

    /// Returns true for `FlatJoin`
    pub fn is_flat_join(&self) -> bool {
        matches!(self, Query::FlatJoin { .. })
    }

    /// The identifier this node binds over its source, for single-binder combinators
    pub fn alias(&self) -> Option<&Ident> {
        match self {
            Query::Filter { alias, .. }
            | Query::Map { alias, .. }
            | Query::FlatMap { alias, .. }
            | Query::ConcatMap { alias, .. }
            | Query::SortBy { alias, .. }
            | Query::DistinctOn { alias, .. }
            | Query::FlatJoin { alias, .. } => Some(alias),
            Query::GroupByMap { by_alias, .. } => Some(by_alias),
            _ => None,
        }
    }

    /// The source this node consumes, for unary combinators
    pub fn source(&self) -> Option<&Query> {
        match self {
            Query::Filter { source, .. }
            | Query::Map { source, .. }
            | Query::FlatMap { source, .. }
            | Query::ConcatMap { source, .. }
            | Query::SortBy { source, .. }
            | Query::GroupByMap { source, .. }
            | Query::Take { source, .. }
            | Query::Drop { source, .. }
            | Query::Distinct { source }
            | Query::DistinctOn { source, .. }
            | Query::Nested { source }
            | Query::FlatJoin { source, .. } => Some(source),
            _ => None,
        }
    }
}
