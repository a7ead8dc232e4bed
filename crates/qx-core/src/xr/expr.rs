//! Expression family of the XR tree

use super::ident::{Ident, Visibility};
use super::query::Query;
use super::types::{ProductType, XrType};

/// Binary operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOperator {
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    And,
    Or,
    Plus,
    Minus,
    Multiply,
    Divide,
    Modulo,
    /// String concatenation
    Concat,
    /// Membership in a list parameter or a subquery
    In,
}

impl BinaryOperator {
    /// Returns true for operators that produce a predicate
    pub fn is_predicate(&self) -> bool {
        matches!(
            self,
            BinaryOperator::Eq
                | BinaryOperator::NotEq
                | BinaryOperator::Lt
                | BinaryOperator::LtEq
                | BinaryOperator::Gt
                | BinaryOperator::GtEq
                | BinaryOperator::And
                | BinaryOperator::Or
                | BinaryOperator::In
        )
    }

    /// Returns true for comparisons whose operands are values
    pub fn is_comparison(&self) -> bool {
        self.is_predicate() && !self.is_logical()
    }

    /// Returns true for AND / OR
    pub fn is_logical(&self) -> bool {
        matches!(self, BinaryOperator::And | BinaryOperator::Or)
    }
}

impl std::fmt::Display for BinaryOperator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            BinaryOperator::Eq => "==",
            BinaryOperator::NotEq => "!=",
            BinaryOperator::Lt => "<",
            BinaryOperator::LtEq => "<=",
            BinaryOperator::Gt => ">",
            BinaryOperator::GtEq => ">=",
            BinaryOperator::And => "&&",
            BinaryOperator::Or => "||",
            BinaryOperator::Plus => "+",
            BinaryOperator::Minus => "-",
            BinaryOperator::Multiply => "*",
            BinaryOperator::Divide => "/",
            BinaryOperator::Modulo => "%",
            BinaryOperator::Concat => "++",
            BinaryOperator::In => "in",
        };
        write!(f, "{s}")
    }
}

/// Unary operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnaryOperator {
    Not,
    Minus,
    /// `NOT EXISTS` over a query
    IsEmpty,
    /// `EXISTS` over a query
    NonEmpty,
}

impl std::fmt::Display for UnaryOperator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            UnaryOperator::Not => "!",
            UnaryOperator::Minus => "-",
            UnaryOperator::IsEmpty => "isEmpty",
            UnaryOperator::NonEmpty => "nonEmpty",
        };
        write!(f, "{s}")
    }
}

/// Literal constants
#[derive(Debug, Clone, PartialEq)]
pub enum Constant {
    Int(i32),
    Long(i64),
    Double(f64),
    String(String),
    Bool(bool),
    Null,
}

/// Call classification, decides fusability and aggregation handling
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CallKind {
    /// Deterministic, side-effect free
    PureFunction,
    /// Non-deterministic or side-effecting (e.g. `random()`)
    ImpureFunction,
    /// Row aggregate inside a grouped projection
    Aggregator,
    /// Aggregate applied over a whole query
    QueryAggregator,
}

/// Arity of a runtime parameter placeholder
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParamKind {
    /// A single value, one `?`
    Single,
    /// Variable-arity list for `IN (...)`
    List,
    /// Per-row value of a batch action
    Batch,
}

impl std::fmt::Display for ParamKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ParamKind::Single => write!(f, "single"),
            ParamKind::List => write!(f, "list"),
            ParamKind::Batch => write!(f, "batch"),
        }
    }
}

/// A CASE WHEN arm
#[derive(Debug, Clone, PartialEq)]
pub struct Branch {
    pub cond: Expr,
    pub then: Expr,
}

/// XR expression
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// Binary operation
    BinaryOp {
        a: Box<Expr>,
        op: BinaryOperator,
        b: Box<Expr>,
    },
    /// Unary operation
    UnaryOp { op: UnaryOperator, expr: Box<Expr> },
    /// Literal constant
    Const(Constant),
    /// Variable reference
    Ident(Ident),
    /// Field access
    Property {
        of: Box<Expr>,
        name: String,
        visibility: Visibility,
    },
    /// Tuple or case-class construction, fields in declaration order
    Product {
        name: String,
        fields: Vec<(String, Expr)>,
    },
    /// CASE WHEN
    When {
        branches: Vec<Branch>,
        or_else: Box<Expr>,
    },
    /// `head.name(args)`
    MethodCall {
        head: Box<Expr>,
        name: String,
        args: Vec<Expr>,
        kind: CallKind,
        tpe: XrType,
    },
    /// `name(args)`
    GlobalCall {
        name: String,
        args: Vec<Expr>,
        kind: CallKind,
        tpe: XrType,
    },
    /// A query used as a scalar (correlated subquery, EXISTS operand)
    QueryAsExpr(Box<Query>),
    /// Lambda abstraction
    Function { params: Vec<Ident>, body: Box<Expr> },
    /// Lambda application
    FunctionApply {
        function: Box<Expr>,
        args: Vec<Expr>,
    },
    /// Sequence of `val` bindings followed by an output expression
    Block {
        bindings: Vec<(Ident, Expr)>,
        output: Box<Expr>,
    },
    /// Runtime parameter placeholder
    Param {
        bid: String,
        kind: ParamKind,
        tpe: XrType,
    },
    /// A sub-expression the front end will splice in later
    TagForSqlExpr { bid: String, tpe: XrType },
}

impl Expr {
    /// Derived type of this expression
    pub fn tpe(&self) -> XrType {
        match self {
            Expr::BinaryOp { op, .. } => {
                if op.is_predicate() {
                    XrType::BooleanExpression
                } else {
                    XrType::Value
                }
            }
            Expr::UnaryOp { op, .. } => match op {
                UnaryOperator::Minus => XrType::Value,
                _ => XrType::BooleanExpression,
            },
            Expr::Const(c) => match c {
                Constant::Bool(_) => XrType::BooleanValue,
                Constant::Null => XrType::Null,
                _ => XrType::Value,
            },
            Expr::Ident(id) => id.tpe.clone(),
            Expr::Property { of, name, .. } => match of.tpe() {
                XrType::Product(p) => p.field(name).cloned().unwrap_or(XrType::Unknown),
                _ => XrType::Unknown,
            },
            Expr::Product { name, fields } => XrType::Product(ProductType::new(
                name.clone(),
                fields.iter().map(|(n, e)| (n.clone(), e.tpe())).collect(),
            )),
            Expr::When { branches, or_else } => {
                let mut acc = or_else.tpe();
                for branch in branches {
                    let t = branch.then.tpe();
                    acc = acc.least_upper_type(&t).unwrap_or(t);
                }
                acc
            }
            Expr::MethodCall { tpe, .. } | Expr::GlobalCall { tpe, .. } => tpe.clone(),
            Expr::QueryAsExpr(q) => q.tpe(),
            Expr::Function { body, .. } => body.tpe(),
            Expr::FunctionApply { function, .. } => match function.as_ref() {
                Expr::Function { body, .. } => body.tpe(),
                _ => XrType::Unknown,
            },
            Expr::Block { output, .. } => output.tpe(),
            Expr::Param { tpe, .. } | Expr::TagForSqlExpr { tpe, .. } => tpe.clone(),
        }
    }

    /// Returns true for the `null` literal
    pub fn is_null(&self) -> bool {
        matches!(self, Expr::Const(Constant::Null))
    }

    /// Borrow the identifier, if this is one
    pub fn as_ident(&self) -> Option<&Ident> {
        match self {
            Expr::Ident(id) => Some(id),
            _ => None,
        }
    }

    /// Split a property chain into its root and field path.
    ///
    /// `p.address.street` yields `(p, ["address", "street"])`; a non-property
    /// yields itself with an empty path.
    pub fn property_path(&self) -> (&Expr, Vec<&str>) {
        match self {
            Expr::Property { of, name, .. } => {
                let (root, mut path) = of.property_path();
                path.push(name.as_str());
                (root, path)
            }
            other => (other, Vec::new()),
        }
    }
}
