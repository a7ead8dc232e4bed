//! Relational model produced by flattening
//!
//! A [`SqlQuery`] is a SELECT skeleton whose clauses still hold XR
//! expressions. Post-processing rewrites it in place; the tokenizer renders
//! it.

use qx_core::xr::{Expr, Ident, JoinKind, XrType};
use std::fmt;

/// Set operator between two queries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetOperation {
    Union,
    UnionAll,
}

/// Unary operator over a whole query
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOperation {
    Exists,
    NotExists,
}

/// DISTINCT clause
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Distinct {
    #[default]
    None,
    All,
    On(Vec<Expr>),
}

impl Distinct {
    pub fn is_distinct(&self) -> bool {
        !matches!(self, Distinct::None)
    }
}

/// Direction of a single ORDER BY criterion
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PropertyOrdering {
    Asc,
    Desc,
    AscNullsFirst,
    DescNullsFirst,
    AscNullsLast,
    DescNullsLast,
}

impl PropertyOrdering {
    pub fn is_descending(&self) -> bool {
        matches!(
            self,
            PropertyOrdering::Desc | PropertyOrdering::DescNullsFirst | PropertyOrdering::DescNullsLast
        )
    }

    /// `Some(true)` for NULLS FIRST, `Some(false)` for NULLS LAST
    pub fn nulls_first(&self) -> Option<bool> {
        match self {
            PropertyOrdering::AscNullsFirst | PropertyOrdering::DescNullsFirst => Some(true),
            PropertyOrdering::AscNullsLast | PropertyOrdering::DescNullsLast => Some(false),
            PropertyOrdering::Asc | PropertyOrdering::Desc => None,
        }
    }
}

/// One ORDER BY criterion
#[derive(Debug, Clone, PartialEq)]
pub struct OrderByCriteria {
    pub expr: Expr,
    pub ordering: PropertyOrdering,
}

/// One contributor to a FROM clause
#[derive(Debug, Clone, PartialEq)]
pub enum FromContext {
    /// `name alias`
    Table { name: String, alias: Ident },
    /// `(query) alias`
    Subquery { query: Box<SqlQuery>, alias: Ident },
    /// `(expr) alias`
    RawExpression { expr: Expr, alias: Ident },
    /// `kind JOIN context ON on`, attached to the context before it
    Join {
        kind: JoinKind,
        context: Box<FromContext>,
        on: Expr,
    },
}

impl FromContext {
    /// Aliases this context introduces
    pub fn aliases(&self) -> Vec<&Ident> {
        match self {
            FromContext::Table { alias, .. }
            | FromContext::Subquery { alias, .. }
            | FromContext::RawExpression { alias, .. } => vec![alias],
            FromContext::Join { context, .. } => context.aliases(),
        }
    }
}

/// A projected value.
///
/// `alias` is the path of field names leading to this value in the row
/// type; it renders joined by `_`.
#[derive(Debug, Clone, PartialEq)]
pub struct SelectValue {
    pub expr: Expr,
    pub alias: Vec<String>,
    /// Unnests a collection-valued expression
    pub concat: bool,
}

impl SelectValue {
    pub fn new(expr: Expr) -> Self {
        Self {
            expr,
            alias: Vec::new(),
            concat: false,
        }
    }

    /// Rendered column alias, if any
    pub fn alias_name(&self) -> Option<String> {
        (!self.alias.is_empty()).then(|| self.alias.join("_"))
    }
}

/// A single SELECT level
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FlattenSqlQuery {
    pub from: Vec<FromContext>,
    pub where_: Option<Expr>,
    pub group_by: Option<Expr>,
    pub order_by: Vec<OrderByCriteria>,
    pub limit: Option<Expr>,
    pub offset: Option<Expr>,
    pub select: Vec<SelectValue>,
    pub distinct: Distinct,
}

impl FlattenSqlQuery {
    /// A query selecting `select` from `from` and nothing else
    pub fn select_from(from: Vec<FromContext>, select: Vec<SelectValue>) -> Self {
        Self {
            from,
            select,
            ..Self::default()
        }
    }

    /// Every alias bound by the FROM clause
    pub fn from_aliases(&self) -> Vec<&Ident> {
        self.from.iter().flat_map(|c| c.aliases()).collect()
    }
}

/// Relational model of a query
#[derive(Debug, Clone, PartialEq)]
pub enum SqlQuery {
    Flatten(FlattenSqlQuery),
    SetOperation {
        a: Box<SqlQuery>,
        op: SetOperation,
        b: Box<SqlQuery>,
    },
    UnaryOperation {
        op: UnaryOperation,
        query: Box<SqlQuery>,
    },
}

/// Leaf values of an expression with their field paths.
///
/// Product literals contribute one entry per field, recursively; a
/// product-typed expression is projected through every leaf of its type.
/// Anything else is a single leaf with an empty path.
pub fn leaves(e: &Expr) -> Vec<(Vec<String>, Expr)> {
    match e {
        Expr::Product { fields, .. } => fields
            .iter()
            .flat_map(|(name, value)| {
                leaves(value).into_iter().map(move |(mut path, leaf)| {
                    path.insert(0, name.clone());
                    (path, leaf)
                })
            })
            .collect(),
        other => match other.tpe() {
            XrType::Product(p) if !p.fields.is_empty() => XrType::Product(p)
                .leaf_paths()
                .into_iter()
                .map(|(path, _)| {
                    let leaf = path
                        .iter()
                        .fold(other.clone(), |acc, field| acc.dot(field.clone()));
                    (path, leaf)
                })
                .collect(),
            _ => vec![(Vec::new(), other.clone())],
        },
    }
}

fn list<T: fmt::Display>(f: &mut fmt::Formatter<'_>, items: &[T]) -> fmt::Result {
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            write!(f, ", ")?;
        }
        write!(f, "{item}")?;
    }
    Ok(())
}

impl fmt::Display for SelectValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.concat {
            write!(f, "unnest({})", self.expr)?;
        } else {
            write!(f, "{}", self.expr)?;
        }
        match self.alias_name() {
            Some(alias) => write!(f, " as {alias}"),
            None => Ok(()),
        }
    }
}

impl fmt::Display for FromContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FromContext::Table { name, alias } => write!(f, "{name} {alias}"),
            FromContext::Subquery { query, alias } => write!(f, "({query}) {alias}"),
            FromContext::RawExpression { expr, alias } => write!(f, "({expr}) {alias}"),
            FromContext::Join { kind, context, on } => write!(f, "{kind} join {context} on {on}"),
        }
    }
}

impl fmt::Display for FlattenSqlQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "select ")?;
        match &self.distinct {
            Distinct::None => {}
            Distinct::All => write!(f, "distinct ")?,
            Distinct::On(items) => {
                write!(f, "distinct on (")?;
                list(f, items)?;
                write!(f, ") ")?;
            }
        }
        list(f, &self.select)?;
        if !self.from.is_empty() {
            write!(f, " from ")?;
            list(f, &self.from)?;
        }
        if let Some(w) = &self.where_ {
            write!(f, " where {w}")?;
        }
        if let Some(g) = &self.group_by {
            write!(f, " group by {g}")?;
        }
        if !self.order_by.is_empty() {
            write!(f, " order by ")?;
            for (i, c) in self.order_by.iter().enumerate() {
                if i > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "{} {:?}", c.expr, c.ordering)?;
            }
        }
        if let Some(l) = &self.limit {
            write!(f, " limit {l}")?;
        }
        if let Some(o) = &self.offset {
            write!(f, " offset {o}")?;
        }
        Ok(())
    }
}

impl fmt::Display for SqlQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SqlQuery::Flatten(q) => write!(f, "{q}"),
            SqlQuery::SetOperation { a, op, b } => {
                let op = match op {
                    SetOperation::Union => "union",
                    SetOperation::UnionAll => "union all",
                };
                write!(f, "({a}) {op} ({b})")
            }
            SqlQuery::UnaryOperation { op, query } => {
                let op = match op {
                    UnaryOperation::Exists => "exists",
                    UnaryOperation::NotExists => "not exists",
                };
                write!(f, "{op} ({query})")
            }
        }
    }
}
